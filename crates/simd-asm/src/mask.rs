//! Mask and predicate helpers shared by the backends.
//!
//! Two realizations exist: vector-held masks (all-ones / all-zeros lanes in
//! an ordinary vector register) and dedicated predicate registers. Every
//! mask-consuming instruction receives its mask explicitly.
//!
//! Whole-vector reductions ("mkj") never branch per sub-register. The
//! partial masks of a logical register are first folded into one physical
//! register (OR for "none set", AND for "all set") and only the folded
//! value is tested.

use alloc::vec::Vec;

use crate::backend::Cx;
use crate::error::Fault;

/// Pairwise fold of partial masks into an accumulator register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fold {
    /// `(dst, a, b)` combine steps, executed in order.
    pub(crate) steps: Vec<(u8, u8, u8)>,
    /// Register holding the folded mask.
    pub(crate) result: u8,
}

/// Fold `parts` (low sub-register first) into `acc`.
///
/// A single part needs no combining and is tested in place.
pub(crate) fn fold(parts: &[u8], acc: u8) -> Fold {
    match parts {
        [] => Fold {
            steps: Vec::new(),
            result: acc,
        },
        [only] => Fold {
            steps: Vec::new(),
            result: *only,
        },
        [first, second, rest @ ..] => {
            let mut steps = Vec::with_capacity(1 + rest.len());
            steps.push((acc, *first, *second));
            for &p in rest {
                steps.push((acc, acc, p));
            }
            Fold { steps, result: acc }
        }
    }
}

/// Bitwise primitives needed to blend through a vector-held mask on an
/// ISA without a native select.
pub(crate) trait BitOps {
    /// `d = a & b`
    fn and(&self, cx: &mut Cx<'_>, d: u8, a: u8, b: u8);
    /// `d = a & !b`
    fn and_not(&self, cx: &mut Cx<'_>, d: u8, a: u8, b: u8);
    /// `d = a | b`
    fn or(&self, cx: &mut Cx<'_>, d: u8, a: u8, b: u8);
}

/// `kept = (kept & !mask) | (incoming & mask)` for one sub-register, using
/// `tmp` for the incoming half.
pub(crate) fn blend_synth<O: BitOps>(
    ops: &O,
    cx: &mut Cx<'_>,
    kept: u8,
    incoming: u8,
    mask: u8,
    tmp: u8,
) -> Result<(), Fault> {
    if tmp == kept || tmp == mask {
        return Err(Fault::role("blend temporary aliases an operand"));
    }
    ops.and(cx, tmp, incoming, mask);
    ops.and_not(cx, kept, kept, mask);
    ops.or(cx, kept, kept, tmp);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn fold_single_part_tests_in_place() {
        let f = fold(&[3], 7);
        assert!(f.steps.is_empty());
        assert_eq!(f.result, 3);
    }

    #[test]
    fn fold_pair_combines_once() {
        let f = fold(&[1, 2], 7);
        assert_eq!(f.steps, vec![(7, 1, 2)]);
        assert_eq!(f.result, 7);
    }

    #[test]
    fn fold_four_parts_chains_through_acc() {
        let f = fold(&[1, 9, 17, 25], 30);
        assert_eq!(f.steps, vec![(30, 1, 9), (30, 30, 17), (30, 30, 25)]);
        assert_eq!(f.result, 30);
    }
}
