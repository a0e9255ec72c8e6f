//! Reference per-lane semantics.
//!
//! Every backend must reproduce these results bit for bit. Lane values are
//! carried as `u16`; 8-bit lanes use the low byte and inputs are truncated to
//! the element width before use.
//!
//! ```
//! use simd_asm::lanes;
//! use simd_asm::{ArithOp, Cond, Elem};
//!
//! assert_eq!(lanes::arith(ArithOp::AddSat, Elem::U8, 200, 100), 255);
//! assert_eq!(lanes::compare(Cond::Lt, Elem::I16, 0xFFFF, 0), 0xFFFF);
//! ```

use alloc::vec::Vec;

use crate::ir::{ArithOp, Cond, Elem, LogicOp, MaskCond, ShiftOp};

#[inline]
fn trunc(elem: Elem, v: u16) -> u16 {
    v & elem.lane_mask()
}

/// Sign- or zero-extend a lane according to `elem`.
#[inline]
pub fn widen(elem: Elem, v: u16) -> i32 {
    match elem {
        Elem::U8 => (v & 0xFF) as i32,
        Elem::I8 => (v as u8 as i8) as i32,
        Elem::U16 => v as i32,
        Elem::I16 => (v as i16) as i32,
    }
}

fn clamp(elem: Elem, v: i32) -> u16 {
    let (lo, hi) = match elem {
        Elem::U8 => (0, 0xFF),
        Elem::I8 => (-0x80, 0x7F),
        Elem::U16 => (0, 0xFFFF),
        Elem::I16 => (-0x8000, 0x7FFF),
    };
    trunc(elem, v.clamp(lo, hi) as u16)
}

/// One lane of `op` on `a` and `b`.
pub fn arith(op: ArithOp, elem: Elem, a: u16, b: u16) -> u16 {
    let (a, b) = (trunc(elem, a), trunc(elem, b));
    let (wa, wb) = (widen(elem, a), widen(elem, b));
    match op {
        ArithOp::Add => trunc(elem, a.wrapping_add(b)),
        ArithOp::Sub => trunc(elem, a.wrapping_sub(b)),
        ArithOp::Mul => trunc(elem, a.wrapping_mul(b)),
        ArithOp::AddSat => clamp(elem, wa + wb),
        ArithOp::SubSat => clamp(elem, wa - wb),
        ArithOp::Min => trunc(elem, wa.min(wb) as u16),
        ArithOp::Max => trunc(elem, wa.max(wb) as u16),
    }
}

/// One lane shifted by `count` modulo the element width.
pub fn shift(op: ShiftOp, elem: Elem, a: u16, count: u32) -> u16 {
    let n = count % elem.bits();
    match op {
        ShiftOp::Shl => trunc(elem, trunc(elem, a) << n),
        ShiftOp::Shr => trunc(elem, (widen(elem, a) >> n) as u16),
    }
}

/// All-ones when `cond` holds for `(a, b)`, zero otherwise.
pub fn compare(cond: Cond, elem: Elem, a: u16, b: u16) -> u16 {
    let (a, b) = (widen(elem, a), widen(elem, b));
    let holds = match cond {
        Cond::Eq => a == b,
        Cond::Ne => a != b,
        Cond::Lt => a < b,
        Cond::Le => a <= b,
        Cond::Gt => a > b,
        Cond::Ge => a >= b,
    };
    if holds {
        elem.lane_mask()
    } else {
        0
    }
}

/// Bitwise logic. `AndNot` is `!a & b`.
pub fn logic(op: LogicOp, a: u16, b: u16) -> u16 {
    match op {
        LogicOp::And => a & b,
        LogicOp::AndNot => !a & b,
        LogicOp::Or => a | b,
        LogicOp::Xor => a ^ b,
    }
}

/// `mask ? src : dst`, bitwise.
pub fn merge(mask: u16, src: u16, dst: u16) -> u16 {
    (src & mask) | (dst & !mask)
}

/// Whether a mask jump over `mask` is taken.
pub fn mask_jump(when: MaskCond, elem: Elem, mask: &[u16]) -> bool {
    let m = elem.lane_mask();
    match when {
        MaskCond::None => mask.iter().all(|&l| l & m == 0),
        MaskCond::Full => mask.iter().all(|&l| l & m == m),
    }
}

// ── Whole-vector helpers ────────────────────────────────────────────────

pub fn arith_all(op: ArithOp, elem: Elem, a: &[u16], b: &[u16]) -> Vec<u16> {
    a.iter().zip(b).map(|(&x, &y)| arith(op, elem, x, y)).collect()
}

/// Per-lane variable shift.
pub fn shift_all(op: ShiftOp, elem: Elem, a: &[u16], counts: &[u16]) -> Vec<u16> {
    a.iter()
        .zip(counts)
        .map(|(&x, &c)| shift(op, elem, x, trunc(elem, c) as u32))
        .collect()
}

pub fn compare_all(cond: Cond, elem: Elem, a: &[u16], b: &[u16]) -> Vec<u16> {
    a.iter().zip(b).map(|(&x, &y)| compare(cond, elem, x, y)).collect()
}

pub fn merge_all(mask: &[u16], src: &[u16], dst: &[u16]) -> Vec<u16> {
    mask.iter()
        .zip(src)
        .zip(dst)
        .map(|((&m, &s), &d)| merge(m, s, d))
        .collect()
}

/// Lay lanes out as little-endian memory bytes.
pub fn to_bytes(elem: Elem, lanes: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(lanes.len() * elem.bytes() as usize);
    for &l in lanes {
        if elem.is_byte() {
            out.push(l as u8);
        } else {
            out.extend_from_slice(&l.to_le_bytes());
        }
    }
    out
}

/// Read lanes back from little-endian memory bytes.
pub fn from_bytes(elem: Elem, bytes: &[u8]) -> Vec<u16> {
    if elem.is_byte() {
        bytes.iter().map(|&b| b as u16).collect()
    } else {
        bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect()
    }
}
