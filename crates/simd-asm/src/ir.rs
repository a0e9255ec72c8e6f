//! Pseudo-instruction contract.
//!
//! A [`Pseudo`] is a plain value: a mnemonic, an element suffix where the
//! operation is lane-typed, and a fixed set of operand roles. Every backend
//! lowers the same values and must reproduce the same lane results bit for
//! bit (see [`crate::lanes`] for the reference semantics).

use alloc::string::String;
use core::fmt;

use crate::mem::Mem;
pub use crate::width::{PReg, VReg};

/// Lane element type, written as a mnemonic suffix (`add.u8`, `cmp.gt.i16`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Elem {
    /// Unsigned 8-bit lanes.
    U8,
    /// Signed 8-bit lanes.
    I8,
    /// Unsigned 16-bit lanes.
    U16,
    /// Signed 16-bit lanes.
    I16,
}

impl Elem {
    /// Lane width in bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            Elem::U8 | Elem::I8 => 8,
            Elem::U16 | Elem::I16 => 16,
        }
    }

    /// Lane width in bytes.
    #[inline]
    pub const fn bytes(self) -> u32 {
        self.bits() / 8
    }

    /// Whether the lanes are two's-complement signed.
    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(self, Elem::I8 | Elem::I16)
    }

    /// All-ones value of one lane.
    #[inline]
    pub const fn lane_mask(self) -> u16 {
        match self {
            Elem::U8 | Elem::I8 => 0xFF,
            Elem::U16 | Elem::I16 => 0xFFFF,
        }
    }

    /// Whether this is an 8-bit element type.
    #[inline]
    pub const fn is_byte(self) -> bool {
        self.bits() == 8
    }

    pub(crate) const fn suffix(self) -> &'static str {
        match self {
            Elem::U8 => "u8",
            Elem::I8 => "i8",
            Elem::U16 => "u16",
            Elem::I16 => "i16",
        }
    }
}

impl fmt::Display for Elem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A general-purpose register by architectural number.
///
/// On AArch64 `31` is the stack pointer when used as a base. On x86-64 the
/// numbering is `rax = 0 … r15 = 15`. On POWER it is `r0 … r31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gpr(pub u8);

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A branch target created by [`Generator::new_label`](crate::Generator::new_label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(pub(crate) u32);

impl Label {
    /// The numeric id of this label.
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Second-source operand: a register, or memory for the ternary-memory form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Src {
    /// A logical vector register.
    Reg(VReg),
    /// A logical-width memory operand.
    Mem(Mem),
}

impl From<VReg> for Src {
    fn from(r: VReg) -> Self {
        Src::Reg(r)
    }
}

impl From<Mem> for Src {
    fn from(m: Mem) -> Self {
        Src::Mem(m)
    }
}

impl fmt::Display for Src {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Src::Reg(r) => write!(f, "{}", r),
            Src::Mem(m) => write!(f, "{}", m),
        }
    }
}

/// Shift count. Every form is taken modulo the lane width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Count {
    /// Uniform immediate count.
    Imm(u32),
    /// Uniform count held in a general-purpose register.
    Gpr(Gpr),
    /// Per-lane counts held in a vector (or loaded from memory).
    Lanes(Src),
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Count::Imm(n) => write!(f, "#{}", n),
            Count::Gpr(r) => write!(f, "{}", r),
            Count::Lanes(s) => write!(f, "{}", s),
        }
    }
}

/// A lane mask, passed explicitly to every mask-consuming instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mask {
    /// A vector register whose lanes are all-ones or all-zeros.
    Vector(VReg),
    /// Dedicated predicate registers (SVE `p`, AVX-512 `k`).
    Pred(PReg),
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mask::Vector(v) => write!(f, "{}", v),
            Mask::Pred(p) => write!(f, "{}", p),
        }
    }
}

/// Bitwise operations. `AndNot` computes `!src1 & src2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogicOp {
    And,
    AndNot,
    Or,
    Xor,
}

/// Lane-typed arithmetic. `Add`, `Sub` and `Mul` wrap; `AddSat` and `SubSat`
/// clamp according to the element signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArithOp {
    Add,
    Sub,
    AddSat,
    SubSat,
    Mul,
    Min,
    Max,
}

/// Shift direction. `Shr` is arithmetic for signed elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShiftOp {
    Shl,
    Shr,
}

/// Comparison condition; signedness comes from the element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cond {
    /// The condition that holds for `(b, a)` whenever `self` holds for `(a, b)`.
    pub const fn swapped(self) -> Self {
        match self {
            Cond::Eq => Cond::Eq,
            Cond::Ne => Cond::Ne,
            Cond::Lt => Cond::Gt,
            Cond::Le => Cond::Ge,
            Cond::Gt => Cond::Lt,
            Cond::Ge => Cond::Le,
        }
    }

    /// The logical negation.
    pub const fn negated(self) -> Self {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Le => Cond::Gt,
            Cond::Gt => Cond::Le,
            Cond::Ge => Cond::Lt,
        }
    }
}

/// Branch condition of a mask jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MaskCond {
    /// Taken when no lane of the mask is set.
    None,
    /// Taken when every lane of the mask is set.
    Full,
}

/// An architecture-neutral SIMD pseudo-instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Pseudo {
    /// Register copy, or a load when `src` is memory.
    Move { dst: VReg, src: Src },
    /// Store a logical vector to memory.
    Store { src: VReg, mem: Mem },
    /// Bitwise logic.
    Logic {
        op: LogicOp,
        dst: VReg,
        src1: VReg,
        src2: Src,
    },
    /// Bitwise complement.
    Not { dst: VReg, src: VReg },
    /// Lane-typed arithmetic.
    Arith {
        op: ArithOp,
        elem: Elem,
        dst: VReg,
        src1: VReg,
        src2: Src,
    },
    /// Lane-typed shift.
    Shift {
        op: ShiftOp,
        elem: Elem,
        dst: VReg,
        src: VReg,
        count: Count,
    },
    /// Compare each lane pair; the mask lane becomes all-ones where `cond` holds.
    Compare {
        cond: Cond,
        elem: Elem,
        mask: Mask,
        src1: VReg,
        src2: Src,
    },
    /// `dst[i] = mask[i] ? src[i] : dst[i]`.
    Merge {
        elem: Elem,
        dst: VReg,
        src: Src,
        mask: Mask,
    },
    /// Reduce the whole mask and branch to `target` when `when` holds.
    MaskJump {
        elem: Elem,
        mask: Mask,
        when: MaskCond,
        target: Label,
    },
}

impl Pseudo {
    /// The mnemonic with its element suffix, e.g. `"adds.i16"` or `"mkj.full.u8"`.
    pub fn mnemonic(&self) -> String {
        use alloc::format;
        match self {
            Pseudo::Move { src: Src::Mem(_), .. } => String::from("load"),
            Pseudo::Move { .. } => String::from("mov"),
            Pseudo::Store { .. } => String::from("store"),
            Pseudo::Logic { op, .. } => String::from(match op {
                LogicOp::And => "and",
                LogicOp::AndNot => "andn",
                LogicOp::Or => "or",
                LogicOp::Xor => "xor",
            }),
            Pseudo::Not { .. } => String::from("not"),
            Pseudo::Arith { op, elem, .. } => {
                let m = match op {
                    ArithOp::Add => "add",
                    ArithOp::Sub => "sub",
                    ArithOp::AddSat => "adds",
                    ArithOp::SubSat => "subs",
                    ArithOp::Mul => "mul",
                    ArithOp::Min => "min",
                    ArithOp::Max => "max",
                };
                format!("{}.{}", m, elem)
            }
            Pseudo::Shift { op, elem, .. } => {
                let m = match op {
                    ShiftOp::Shl => "shl",
                    ShiftOp::Shr => "shr",
                };
                format!("{}.{}", m, elem)
            }
            Pseudo::Compare { cond, elem, .. } => {
                let c = match cond {
                    Cond::Eq => "eq",
                    Cond::Ne => "ne",
                    Cond::Lt => "lt",
                    Cond::Le => "le",
                    Cond::Gt => "gt",
                    Cond::Ge => "ge",
                };
                format!("cmp.{}.{}", c, elem)
            }
            Pseudo::Merge { elem, .. } => format!("merge.{}", elem),
            Pseudo::MaskJump { elem, when, .. } => match when {
                MaskCond::None => format!("mkj.none.{}", elem),
                MaskCond::Full => format!("mkj.full.{}", elem),
            },
        }
    }
}

impl fmt::Display for Pseudo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic())?;
        match self {
            Pseudo::Move { dst, src } => write!(f, " {}, {}", dst, src),
            Pseudo::Store { src, mem } => write!(f, " {}, {}", mem, src),
            Pseudo::Logic {
                dst, src1, src2, ..
            }
            | Pseudo::Arith {
                dst, src1, src2, ..
            } => write!(f, " {}, {}, {}", dst, src1, src2),
            Pseudo::Not { dst, src } => write!(f, " {}, {}", dst, src),
            Pseudo::Shift {
                dst, src, count, ..
            } => write!(f, " {}, {}, {}", dst, src, count),
            Pseudo::Compare {
                mask, src1, src2, ..
            } => write!(f, " {}, {}, {}", mask, src1, src2),
            Pseudo::Merge { dst, src, mask, .. } => write!(f, " {}, {}, {}", dst, src, mask),
            Pseudo::MaskJump { mask, target, .. } => write!(f, " {}, {}", mask, target),
        }
    }
}
