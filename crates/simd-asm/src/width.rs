//! Register-width adapter.
//!
//! A logical register is wider than the hardware by an integer ratio of 1, 2
//! or 4. Each logical register carries (or receives from the backend's
//! default rule) an explicit, ordered list of physical registers, lowest
//! sub-register first. Lane-local operations are replayed once per entry of
//! that list in order; `ratio == 1` is a plain passthrough.

use alloc::format;
use core::fmt;

use crate::backend::Backend;
use crate::error::Fault;

/// Ordered physical register numbers backing one logical register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysList {
    regs: [u8; 4],
    len: u8,
}

impl PhysList {
    /// Build a list from physical register numbers, low sub-register first.
    ///
    /// Lists longer than four entries are kept only as a length, so the
    /// backend rejects them when the operand is validated.
    pub fn new(regs: &[u8]) -> Self {
        let mut out = [0u8; 4];
        for (slot, r) in out.iter_mut().zip(regs) {
            *slot = *r;
        }
        Self {
            regs: out,
            len: regs.len().min(u8::MAX as usize) as u8,
        }
    }

    /// Number of physical registers named.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The physical register numbers.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.regs[..self.len().min(4)]
    }

    /// Sub-register `k` (0 = lowest).
    #[inline]
    pub(crate) fn at(&self, k: usize) -> u8 {
        self.regs[k]
    }

    /// Iterate over the physical registers, low to high.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.as_slice().iter().copied()
    }
}

impl fmt::Display for PhysList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, r) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", r)?;
        }
        f.write_str("}")
    }
}

/// A logical vector register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VReg {
    id: u8,
    phys: Option<PhysList>,
}

impl VReg {
    /// Logical register `id`, mapped by the backend's default pairing rule.
    pub const fn logical(id: u8) -> Self {
        Self { id, phys: None }
    }

    /// Logical register `id` backed by an explicit physical list.
    pub fn mapped(id: u8, phys: &[u8]) -> Self {
        Self {
            id,
            phys: Some(PhysList::new(phys)),
        }
    }

    /// The logical id.
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// The explicit physical list, if one was given.
    pub const fn explicit(&self) -> Option<&PhysList> {
        self.phys.as_ref()
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.id)?;
        if let Some(p) = &self.phys {
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

/// A logical predicate (mask) register group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PReg {
    id: u8,
    phys: Option<PhysList>,
}

impl PReg {
    /// Logical predicate `id`, mapped by the backend's default rule.
    pub const fn logical(id: u8) -> Self {
        Self { id, phys: None }
    }

    /// Logical predicate `id` backed by an explicit physical list.
    pub fn mapped(id: u8, phys: &[u8]) -> Self {
        Self {
            id,
            phys: Some(PhysList::new(phys)),
        }
    }

    /// The logical id.
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// The explicit physical list, if one was given.
    pub const fn explicit(&self) -> Option<&PhysList> {
        self.phys.as_ref()
    }
}

impl fmt::Display for PReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.id)?;
        if let Some(p) = &self.phys {
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

/// Width and register-file shape of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shape {
    /// Width of one physical vector register in bits.
    pub native_bits: u32,
    /// Physical registers per logical register (1, 2 or 4).
    pub ratio: u8,
    /// Number of architectural vector registers.
    pub vector_regs: u8,
    /// Number of architectural predicate registers (0 when the ISA has none).
    pub pred_regs: u8,
}

impl Shape {
    /// Width of one logical register in bits.
    #[inline]
    pub const fn logical_bits(&self) -> u32 {
        self.native_bits * self.ratio as u32
    }

    /// Width of one physical register in bytes.
    #[inline]
    pub const fn native_bytes(&self) -> u32 {
        self.native_bits / 8
    }

    /// Width of one logical register in bytes.
    #[inline]
    pub const fn logical_bytes(&self) -> u32 {
        self.logical_bits() / 8
    }

    /// Whether the ISA has dedicated predicate registers.
    #[inline]
    pub const fn has_predicates(&self) -> bool {
        self.pred_regs > 0
    }
}

fn check_list(
    kind: char,
    id: u8,
    list: PhysList,
    ratio: u8,
    count: u8,
    reserved: &[u8],
) -> Result<PhysList, Fault> {
    if list.len() != ratio as usize {
        return Err(Fault::role(format!(
            "{}{}: {} physical registers given, {} required",
            kind,
            id,
            list.len(),
            ratio
        )));
    }
    let regs = list.as_slice();
    for (i, &r) in regs.iter().enumerate() {
        if r >= count {
            return Err(Fault::role(format!(
                "{}{}: physical register {} out of range (0..{})",
                kind, id, r, count
            )));
        }
        if reserved.contains(&r) {
            return Err(Fault::role(format!(
                "{}{}: physical register {}{} is reserved",
                kind, id, kind, r
            )));
        }
        if regs[..i].contains(&r) {
            return Err(Fault::role(format!(
                "{}{}: physical register {} listed twice",
                kind, id, r
            )));
        }
    }
    Ok(list)
}

/// Reject a source whose sub-register `j` is the destination's sub-register
/// `i` for some `i < j`.
///
/// Sub-registers are lowered low to high, so such a source would be read
/// after the destination half that aliases it has already been written.
/// Equal positions (in-place updates) are fine.
pub(crate) fn check_clobber(
    (dst, d): (&VReg, &PhysList),
    (src, s): (&VReg, &PhysList),
) -> Result<(), Fault> {
    for (i, r) in d.iter().enumerate() {
        if let Some(j) = s.iter().skip(i + 1).position(|x| x == r) {
            return Err(Fault::role(format!(
                "{} part {} overwrites physical register {} before {} part {} reads it",
                dst,
                i,
                r,
                src,
                i + 1 + j
            )));
        }
    }
    Ok(())
}

/// Resolve a logical vector register to its validated physical list.
pub(crate) fn vector<B: Backend + ?Sized>(b: &B, r: &VReg) -> Result<PhysList, Fault> {
    let shape = b.shape();
    let list = match r.explicit() {
        Some(p) => *p,
        None => b.default_vector(r.id()).ok_or_else(|| {
            Fault::role(format!("v{}: no default physical mapping", r.id()))
        })?,
    };
    check_list(
        'v',
        r.id(),
        list,
        shape.ratio,
        shape.vector_regs,
        b.reserved().vector,
    )
}

/// Resolve a logical predicate group to its validated physical list.
pub(crate) fn pred<B: Backend + ?Sized>(b: &B, p: &PReg) -> Result<PhysList, Fault> {
    let shape = b.shape();
    if !shape.has_predicates() {
        return Err(Fault::role(format!(
            "p{}: predicate masks are not available, use a vector mask",
            p.id()
        )));
    }
    let list = match p.explicit() {
        Some(l) => *l,
        None => b.default_pred(p.id()).ok_or_else(|| {
            Fault::role(format!("p{}: no default physical mapping", p.id()))
        })?,
    };
    check_list(
        'p',
        p.id(),
        list,
        shape.ratio,
        shape.pred_regs,
        b.reserved().pred,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn phys_list_keeps_order() {
        let l = PhysList::new(&[7, 3]);
        assert_eq!(l.as_slice(), &[7, 3]);
        assert_eq!(l.at(0), 7);
        assert_eq!(l.at(1), 3);
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn overlong_list_is_kept_as_length() {
        let l = PhysList::new(&[0, 1, 2, 3, 4, 5]);
        assert_eq!(l.len(), 6);
        assert_eq!(l.as_slice(), &[0, 1, 2, 3]);
        assert!(check_list('v', 0, l, 4, 32, &[]).is_err());
    }

    #[test]
    fn check_rejects_reserved_duplicate_and_range() {
        let reserved = [30, 31];
        assert!(check_list('v', 1, PhysList::new(&[2, 3]), 2, 32, &reserved).is_ok());
        assert!(matches!(
            check_list('v', 1, PhysList::new(&[2, 30]), 2, 32, &reserved),
            Err(Fault::Role(_))
        ));
        assert!(check_list('v', 1, PhysList::new(&[2, 2]), 2, 32, &reserved).is_err());
        assert!(check_list('v', 1, PhysList::new(&[2, 40]), 2, 32, &reserved).is_err());
        assert!(check_list('v', 1, PhysList::new(&[2]), 2, 32, &reserved).is_err());
    }

    fn clobber(d: &[u8], s: &[u8]) -> Result<(), Fault> {
        let (dst, src) = (VReg::mapped(0, d), VReg::mapped(1, s));
        check_clobber((&dst, &PhysList::new(d)), (&src, &PhysList::new(s)))
    }

    #[test]
    fn clobber_only_for_later_source_parts() {
        assert!(clobber(&[2, 5], &[2, 5]).is_ok());
        assert!(clobber(&[2, 5], &[5, 0]).is_ok());
        match clobber(&[2, 5], &[0, 2]) {
            Err(Fault::Role(detail)) => {
                assert_eq!(
                    detail,
                    "v0{2,5} part 0 overwrites physical register 2 before v1{0,2} part 1 reads it"
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(clobber(&[1, 2, 3, 4], &[9, 8, 7, 3]).is_err());
        assert!(clobber(&[1, 2, 3, 4], &[4, 3, 2, 1]).is_err());
        assert!(clobber(&[1, 2, 3, 4], &[2, 3, 4, 9]).is_ok());
    }

    #[test]
    fn shape_widths() {
        let s = Shape {
            native_bits: 512,
            ratio: 4,
            vector_regs: 32,
            pred_regs: 8,
        };
        assert_eq!(s.logical_bits(), 2048);
        assert_eq!(s.logical_bytes(), 256);
        assert_eq!(s.native_bytes(), 64);
        assert!(s.has_predicates());
    }

    #[test]
    fn display_shows_explicit_mapping() {
        assert_eq!(VReg::logical(3).to_string(), "v3");
        assert_eq!(VReg::mapped(3, &[6, 9]).to_string(), "v3{6,9}");
        assert_eq!(PReg::mapped(0, &[1, 2]).to_string(), "p0{1,2}");
    }
}
