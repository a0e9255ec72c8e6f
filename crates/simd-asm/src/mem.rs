//! Memory operands and displacement classification.
//!
//! A logical-width access touches `ratio` consecutive native-width slots.
//! [`classify`] decides, for one backend's [`Quantum`], whether every slot
//! can be encoded straight from the caller's base register or whether the
//! effective address must first be built in the backend's reserved address
//! temporary.

use alloc::format;
use core::fmt;

use crate::error::Fault;
use crate::ir::Gpr;

/// A memory operand: `base + (index << shift) + disp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mem {
    /// Base register.
    pub base: Gpr,
    /// Optional index register and its left shift (scale = `1 << shift`).
    pub index: Option<(Gpr, u8)>,
    /// Signed byte displacement.
    pub disp: i64,
}

impl Mem {
    /// `[base]`.
    pub const fn base(base: Gpr) -> Self {
        Self {
            base,
            index: None,
            disp: 0,
        }
    }

    /// Replace the displacement.
    pub const fn disp(mut self, disp: i64) -> Self {
        self.disp = disp;
        self
    }

    /// Add a scaled index register. `shift` must be 0..=3.
    pub const fn index(mut self, index: Gpr, shift: u8) -> Self {
        self.index = Some((index, shift));
        self
    }

    /// The same operand moved by `by` bytes.
    pub const fn offset(mut self, by: i64) -> Self {
        self.disp = self.disp.saturating_add(by);
        self
    }
}

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.base)?;
        if let Some((idx, shift)) = self.index {
            write!(f, "+{}*{}", idx, 1u32 << shift)?;
        }
        if self.disp > 0 {
            write!(f, "+{}", self.disp)?;
        } else if self.disp < 0 {
            write!(f, "{}", self.disp)?;
        }
        f.write_str("]")
    }
}

/// Displacement rule of one addressing form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Quantum {
    /// x86 ModR/M: any signed 32-bit displacement, native index and scale.
    X86Disp32,
    /// A64 `ldr/str q`: unsigned offset scaled by 16 (`0..=65520`), or the
    /// unscaled signed 9-bit `ldur/stur` form.
    A64Vector,
    /// SVE `ldr/str z`: signed 9-bit multiple of the vector length.
    SveMulVl {
        /// Vector length in bytes.
        vl_bytes: u32,
    },
    /// POWER DQ-form (`lxv/stxv`): signed 16-bit, multiple of 16.
    PpcDq,
    /// POWER X-form (`lvx/stvx`): offset travels in an index temporary; the
    /// hardware drops the low four address bits, so it must be 16-aligned.
    PpcIndexed,
    /// POWER D-form scalar access: signed 16-bit.
    PpcD,
}

impl Quantum {
    /// Whether `disp` encodes directly in this form.
    pub fn fits(self, disp: i64) -> bool {
        match self {
            Quantum::X86Disp32 => i32::try_from(disp).is_ok(),
            Quantum::A64Vector => {
                ((0..=65520).contains(&disp) && disp % 16 == 0) || (-256..=255).contains(&disp)
            }
            Quantum::SveMulVl { vl_bytes } => {
                let vl = vl_bytes as i64;
                vl > 0 && disp % vl == 0 && (-256..=255).contains(&(disp / vl))
            }
            Quantum::PpcDq => disp % 16 == 0 && (-32768..=32752).contains(&disp),
            Quantum::PpcIndexed => disp % 16 == 0 && i32::try_from(disp).is_ok(),
            Quantum::PpcD => (-32768..=32767).contains(&disp),
        }
    }

    /// Whether the form takes a scaled index register itself.
    pub const fn native_index(self) -> bool {
        matches!(self, Quantum::X86Disp32)
    }
}

/// How a logical-width access is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Every slot encodes from the caller's base (and index, if native).
    Inline,
    /// Build the address in the reserved temporary first.
    Materialize,
}

/// Classify an access whose slots sit at `mem.disp + offsets[k]`.
pub(crate) fn classify(q: Quantum, mem: &Mem, offsets: &[i64]) -> Result<Plan, Fault> {
    if let Some((_, shift)) = mem.index {
        if shift > 3 {
            return Err(Fault::role(format!(
                "index scale 1<<{} is not one of 1, 2, 4, 8",
                shift
            )));
        }
    }

    let mut inline = mem.index.is_none() || q.native_index();
    for &off in offsets {
        let disp = mem.disp.checked_add(off).ok_or_else(|| {
            Fault::unrepresentable(mem.disp, "displacement overflows 64 bits")
        })?;
        if q == Quantum::PpcIndexed {
            if disp % 16 != 0 {
                return Err(Fault::unrepresentable(
                    disp,
                    "lvx/stvx ignore the low four address bits; displacement must be 16-byte aligned",
                ));
            }
            if i32::try_from(disp).is_err() {
                return Err(Fault::unrepresentable(
                    disp,
                    "displacement exceeds the 32-bit reach of lis/ori",
                ));
            }
        }
        inline &= q.fits(disp);
    }

    if inline {
        Ok(Plan::Inline)
    } else {
        log::trace!("materializing address for {} ({:?})", mem, q);
        Ok(Plan::Materialize)
    }
}

/// Split a 32-bit signed value into the `lis`/`ori` halves.
#[cfg(any(feature = "vmx", feature = "vsx"))]
pub(crate) fn split_hi_lo(value: i32) -> (u16, u16) {
    ((value as u32 >> 16) as u16, value as u32 as u16)
}
