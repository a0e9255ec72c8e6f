//! Lane-by-lane scalar emulation through caller-owned scratch memory.
//!
//! Operations with no native vector instruction (8-bit multiply on every
//! backend that lacks it, GPR-count shifts on VMX, 8-bit variable shifts on
//! AVX-512) are expanded into one unrolled sequence:
//!
//! 1. store the first source to `scratch.first` (and a vector second source
//!    to `scratch.second`);
//! 2. per lane: load both elements into scalar temporaries, apply the
//!    scalar operation, store the result back over the first source;
//! 3. reload the destination from `scratch.first`.
//!
//! A memory second source is read in place; a GPR count is moved into a
//! temporary once.

use core::fmt;

use crate::backend::{Backend, Cx};
use crate::error::Fault;
use crate::ir::{Elem, Gpr, Pseudo, Src};
use crate::mem::{classify, Mem, Plan, Quantum};
use crate::width::{PhysList, VReg};

/// Two scratch regions, each at least one logical vector long.
///
/// The generator never allocates them; they are ordinary memory operands
/// owned by the caller and clobbered by every emulated sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scratch {
    /// Receives the first source and accumulates the result.
    pub first: Mem,
    /// Receives a vector-held second source.
    pub second: Mem,
}

impl Scratch {
    /// Two independent regions.
    pub const fn new(first: Mem, second: Mem) -> Self {
        Self { first, second }
    }

    /// Split one arena of at least `2 * logical_bytes` bytes in half.
    pub const fn arena(base: Mem, logical_bytes: u32) -> Self {
        Self {
            first: base,
            second: base.offset(logical_bytes as i64),
        }
    }
}

impl fmt::Display for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.first, self.second)
    }
}

/// Scalar operation applied per lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LaneOp {
    Mul,
    Shl,
    /// Arithmetic for signed elements.
    Shr,
}

/// Second operand of an emulated sequence.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LaneSrc {
    Vector(PhysList),
    Mem(Mem),
    Gpr(Gpr),
}

impl LaneSrc {
    pub(crate) fn from_src<B: Backend>(b: &B, src: &Src) -> Result<Self, Fault> {
        use crate::backend::Operands;
        Ok(match src {
            Src::Reg(r) => LaneSrc::Vector(b.v(r)?),
            Src::Mem(m) => LaneSrc::Mem(*m),
        })
    }
}

/// Scalar load/op/store primitives of one ISA.
pub(crate) trait ScalarIsa: Backend {
    /// Displacement rule of scalar loads and stores.
    const QUANTUM: Quantum;
    /// Address temporaries for the first and second region.
    const ADDR: [u8; 2];
    /// Scalar temporaries for the two lane operands.
    const TMP: [u8; 2];

    /// Validate a caller-supplied memory operand read lane by lane.
    fn check_mem(&self, m: &Mem) -> Result<(), Fault>;

    /// `rd = base + (index << shift) + disp`
    fn set_addr(&self, cx: &mut Cx<'_>, rd: u8, m: &Mem) -> Result<(), Fault>;

    /// Load one element, zero- or sign-extended to the register width.
    fn load_lane(&self, cx: &mut Cx<'_>, rt: u8, m: &Mem, elem: Elem, signed: bool);

    fn store_lane(&self, cx: &mut Cx<'_>, rt: u8, m: &Mem, elem: Elem);

    /// `rd = rd op rb`, with shift counts reduced modulo the element width.
    fn lane_op(&self, cx: &mut Cx<'_>, op: LaneOp, elem: Elem, rd: u8, rb: u8);

    fn move_gpr(&self, cx: &mut Cx<'_>, rd: u8, rs: Gpr) -> Result<(), Fault>;
}

fn spill<I: ScalarIsa>(isa: &I, cx: &mut Cx<'_>, v: PhysList, m: Mem) -> Result<(), Fault> {
    let src = VReg::mapped(0, v.as_slice());
    crate::backend::sealed::Lower::lower(isa, cx, &Pseudo::Store { src, mem: m })
}

fn fill<I: ScalarIsa>(isa: &I, cx: &mut Cx<'_>, v: PhysList, m: Mem) -> Result<(), Fault> {
    let dst = VReg::mapped(0, v.as_slice());
    crate::backend::sealed::Lower::lower(
        isa,
        cx,
        &Pseudo::Move {
            dst,
            src: Src::Mem(m),
        },
    )
}

/// Address every lane of `m` directly, or through address temporary `slot`.
fn region<I: ScalarIsa>(
    isa: &I,
    cx: &mut Cx<'_>,
    slot: usize,
    m: &Mem,
    last: i64,
) -> Result<Mem, Fault> {
    match classify(I::QUANTUM, m, &[0, last])? {
        Plan::Inline => Ok(*m),
        Plan::Materialize => {
            isa.set_addr(cx, I::ADDR[slot], m)?;
            Ok(Mem::base(Gpr(I::ADDR[slot])))
        }
    }
}

/// Emit the unrolled scalar sequence for `dst = a op b`.
pub(crate) fn run<I: ScalarIsa>(
    isa: &I,
    cx: &mut Cx<'_>,
    op: LaneOp,
    elem: Elem,
    dst: PhysList,
    a: PhysList,
    b: LaneSrc,
) -> Result<(), Fault> {
    let scratch = cx.scratch()?;
    let span = isa.shape().logical_bytes() as i64;
    let step = elem.bytes() as i64;
    let lanes = (span / step) as usize;
    if lanes > cx.limits.max_emulated_lanes {
        return Err(Fault::Limit {
            resource: "emulated lanes",
            limit: cx.limits.max_emulated_lanes,
        });
    }
    log::debug!(
        "{}: emulating {:?}.{} over {} lanes via [{}]",
        I::NAME,
        op,
        elem,
        lanes,
        scratch
    );

    spill(isa, cx, a, scratch.first)?;
    let second = match b {
        LaneSrc::Vector(v) => {
            spill(isa, cx, v, scratch.second)?;
            Some(scratch.second)
        }
        LaneSrc::Mem(m) => {
            isa.check_mem(&m)?;
            Some(m)
        }
        LaneSrc::Gpr(_) => None,
    };

    // Address temporaries are set after the spills, which may use them.
    let last = span - step;
    let first = region(isa, cx, 0, &scratch.first, last)?;
    let second = match second {
        Some(m) => Some(region(isa, cx, 1, &m, last)?),
        None => None,
    };
    let [ta, tb] = I::TMP;
    if let LaneSrc::Gpr(r) = b {
        isa.move_gpr(cx, tb, r)?;
    }

    let signed = op == LaneOp::Shr && elem.is_signed();
    for lane in 0..lanes as i64 {
        let off = lane * step;
        isa.load_lane(cx, ta, &first.offset(off), elem, signed);
        if let Some(m) = second {
            isa.load_lane(cx, tb, &m.offset(off), elem, false);
        }
        isa.lane_op(cx, op, elem, ta, tb);
        isa.store_lane(cx, ta, &first.offset(off), elem);
    }

    fill(isa, cx, dst, scratch.first)
}
