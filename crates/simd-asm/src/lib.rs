//! # simd-asm: Retargetable SIMD Pseudo-Instruction Encoder
//!
//! `simd-asm` turns a fixed, architecture-neutral set of packed-integer
//! pseudo-instructions into machine code for one of several SIMD backends.
//! Logical vectors may be wider than the hardware: a 256-bit logical
//! register on NEON is a pair of 128-bit `q` registers, a 2048-bit logical
//! register on AVX-512 is four `zmm` registers.
//!
//! ## Quick Start
//!
//! ```rust
//! use simd_asm::{Elem, Generator, VReg, Avx512x1};
//!
//! let mut gen = Generator::new(Avx512x1::new());
//! gen.add3(Elem::U8, VReg::logical(0), VReg::logical(1), VReg::logical(2))?;
//! let code = gen.finish()?;
//! assert_eq!(code.bytes(), &[0x62, 0xF1, 0x75, 0x48, 0xFC, 0xC2]); // vpaddb zmm0, zmm1, zmm2
//! # Ok::<(), simd_asm::GenError>(())
//! ```
//!
//! ## Backends
//!
//! | Backend | Native | Logical | Feature |
//! |---------|--------|---------|---------|
//! | [`NeonPair`] | 128 | 256 | `neon` |
//! | [`SvePair`] | VL | 2×VL | `sve` |
//! | [`VmxPair`] | 128 | 256 | `vmx` |
//! | [`VsxPair`] | 128 | 256 | `vsx` |
//! | [`Avx512x1`] / [`Avx512x2`] / [`Avx512x4`] | 512 | 512 / 1024 / 2048 | `avx512` |
//!
//! A product normally enables exactly one backend feature; the generator is
//! monomorphized over it and there is no runtime dispatch.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// An encoder packs bit fields all day: narrowing casts between integer widths
// and long hex literals are the norm here.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::too_many_arguments,
    clippy::many_single_char_names,
    clippy::unused_self,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc
)]

extern crate alloc;

#[cfg(any(feature = "neon", feature = "sve"))]
mod aarch64;
mod backend;
mod emulate;
/// Error types and backend names.
pub mod error;
/// Public generator API: builder pattern, labels, and finished `Code`.
pub mod generator;
/// Pseudo-instruction contract: element types, operands, and the `Pseudo` enum.
pub mod ir;
/// Reference per-lane semantics of every pseudo-instruction.
pub mod lanes;
mod mask;
/// Memory operands and the per-backend displacement rules.
pub mod mem;
#[cfg(feature = "neon")]
mod neon;
#[cfg(any(feature = "vmx", feature = "vsx"))]
mod power;
mod stream;
#[cfg(feature = "sve")]
mod sve;
#[cfg(feature = "vmx")]
mod vmx;
#[cfg(feature = "vsx")]
mod vsx;
/// Logical-to-physical register mapping.
pub mod width;
#[cfg(feature = "avx512")]
mod x86;
#[cfg(feature = "avx512")]
mod avx512;

// Re-exports
#[cfg(feature = "avx512")]
pub use avx512::{Avx512, Avx512x1, Avx512x2, Avx512x4};
pub use backend::{Backend, Reserved};
pub use emulate::Scratch;
pub use error::{BackendName, GenError};
pub use generator::{Code, Generator, Limits};
pub use ir::{ArithOp, Cond, Count, Elem, Gpr, Label, LogicOp, Mask, MaskCond, Pseudo, ShiftOp, Src};
pub use mem::{Mem, Quantum};
#[cfg(feature = "neon")]
pub use neon::NeonPair;
pub use stream::Endian;
#[cfg(feature = "sve")]
pub use sve::SvePair;
#[cfg(feature = "vmx")]
pub use vmx::VmxPair;
#[cfg(feature = "vsx")]
pub use vsx::VsxPair;
pub use width::{PReg, PhysList, Shape, VReg};
