//! The static backend capability trait.
//!
//! The set of backends is closed: [`NeonPair`](crate::NeonPair),
//! [`SvePair`](crate::SvePair), [`VsxPair`](crate::VsxPair),
//! [`VmxPair`](crate::VmxPair) and [`Avx512`](crate::Avx512) at ratios 1, 2
//! and 4. The generator is monomorphized over one of them, so the choice is
//! made at build time and never dispatched at run time.

use crate::emulate::Scratch;
use crate::error::{BackendName, Fault};
use crate::generator::Limits;
use crate::ir::{Count, Mask, Pseudo, Src};
use crate::stream::{CodeStream, Endian};
use crate::width::{self, PReg, PhysList, Shape, VReg};

/// Registers a backend keeps for its own lowering sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserved {
    /// Vector registers (scratch for memory sources, splats, masks).
    pub vector: &'static [u8],
    /// Predicate / opmask registers.
    pub pred: &'static [u8],
    /// General-purpose registers (address and scalar temporaries).
    pub gpr: &'static [u8],
}

/// Lowering context handed to a backend for one pseudo-instruction.
pub struct Cx<'a> {
    pub(crate) out: &'a mut CodeStream,
    pub(crate) scratch: Option<Scratch>,
    pub(crate) limits: Limits,
}

impl Cx<'_> {
    /// The scratch arena, required by every emulated sequence.
    pub(crate) fn scratch(&self) -> Result<Scratch, Fault> {
        self.scratch.ok_or_else(|| {
            Fault::unsupported("lane emulation needs a scratch arena; configure Generator::scratch")
        })
    }
}

pub(crate) mod sealed {
    use super::Cx;
    use crate::error::Fault;
    use crate::ir::Pseudo;

    pub trait Lower {
        fn lower(&self, cx: &mut Cx<'_>, op: &Pseudo) -> Result<(), Fault>;
    }
}

/// A SIMD encoder backend.
pub trait Backend: sealed::Lower {
    /// Name reported in diagnostics.
    const NAME: BackendName;

    /// Native width, ratio and register-file size.
    fn shape(&self) -> Shape;

    /// Registers reserved for the backend's own sequences.
    fn reserved(&self) -> Reserved;

    /// Default physical list for logical vector register `id`.
    fn default_vector(&self, id: u8) -> Option<PhysList>;

    /// Default physical list for logical predicate `id`.
    fn default_pred(&self, _id: u8) -> Option<PhysList> {
        None
    }

    /// Byte order of emitted instruction words.
    fn byte_order(&self) -> Endian {
        Endian::Little
    }
}

/// Operand resolution shared by every backend.
pub(crate) trait Operands: Backend {
    fn v(&self, r: &VReg) -> Result<PhysList, Fault> {
        width::vector(self, r)
    }

    fn p(&self, p: &PReg) -> Result<PhysList, Fault> {
        width::pred(self, p)
    }

    /// Resolve a mask that must be vector-held (predicate-less backends).
    fn vector_mask(&self, mask: &Mask) -> Result<PhysList, Fault> {
        match mask {
            Mask::Vector(v) => self.v(v),
            Mask::Pred(p) => Err(Fault::role(alloc::format!(
                "p{}: {} has no predicate registers, pass a vector mask",
                p.id(),
                Self::NAME
            ))),
        }
    }
}

impl<B: Backend> Operands for B {}

/// Reject explicit mappings where a sub-register write would clobber a
/// source part that is read later in the same expansion.
///
/// Only vector registers can collide: predicate writes (compares into
/// `Mask::Pred`) never read another predicate, and mask jumps write only
/// reserved registers.
pub(crate) fn check_aliasing<B: Backend>(b: &B, op: &Pseudo) -> Result<(), Fault> {
    let reg = |src: &Src| match src {
        Src::Reg(r) => Some(*r),
        Src::Mem(_) => None,
    };
    let vmask = |m: &Mask| match m {
        Mask::Vector(v) => Some(*v),
        Mask::Pred(_) => None,
    };
    let (dst, sources): (Option<VReg>, [Option<VReg>; 3]) = match op {
        Pseudo::Move { dst, src } => (Some(*dst), [reg(src), None, None]),
        Pseudo::Not { dst, src } => (Some(*dst), [Some(*src), None, None]),
        Pseudo::Logic {
            dst, src1, src2, ..
        }
        | Pseudo::Arith {
            dst, src1, src2, ..
        } => (Some(*dst), [Some(*src1), reg(src2), None]),
        Pseudo::Shift {
            dst, src, count, ..
        } => {
            let lanes = match count {
                Count::Lanes(c) => reg(c),
                Count::Imm(_) | Count::Gpr(_) => None,
            };
            (Some(*dst), [Some(*src), lanes, None])
        }
        Pseudo::Compare {
            mask, src1, src2, ..
        } => (vmask(mask), [Some(*src1), reg(src2), None]),
        Pseudo::Merge {
            dst, src, mask, ..
        } => (Some(*dst), [reg(src), vmask(mask), None]),
        Pseudo::Store { .. } | Pseudo::MaskJump { .. } => (None, [None; 3]),
    };
    let Some(dst) = dst else {
        return Ok(());
    };
    let d = b.v(&dst)?;
    for src in sources.iter().flatten() {
        width::check_clobber((&dst, &d), (src, &b.v(src)?))?;
    }
    Ok(())
}

/// A second source resolved for per-sub-register replay.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Operand2 {
    Reg(PhysList),
    Mem(crate::mem::Mem),
}

impl Operand2 {
    pub(crate) fn resolve<B: Backend>(b: &B, src: &Src) -> Result<Self, Fault> {
        Ok(match src {
            Src::Reg(r) => Operand2::Reg(b.v(r)?),
            Src::Mem(m) => Operand2::Mem(*m),
        })
    }
}
