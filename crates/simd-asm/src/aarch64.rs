//! Shared AArch64 encoding helpers for the NEON and SVE backends.
//!
//! All A64 instructions are 32 bits, little-endian. Both vector backends
//! reserve `x17` as the address temporary and `w16` as the scalar
//! temporary (the two intra-procedure-call scratch registers).

use alloc::format;

use crate::error::Fault;
use crate::ir::Gpr;
use crate::mem::Mem;
use crate::stream::CodeStream;

/// Address temporary.
pub(crate) const X_ADDR: u8 = 17;
/// Scalar temporary (shift counts, reductions).
pub(crate) const W_TMP: u8 = 16;
pub(crate) const GPR_RESERVED: &[u8] = &[16, 17];

/// Condition code `eq`.
pub(crate) const COND_EQ: u32 = 0x0;

#[inline]
pub(crate) fn emit32(out: &mut CodeStream, word: u32) {
    out.word(word);
}

// ── Move wide ───────────────────────────────────────────────────────────

#[inline]
fn movz(rd: u8, imm16: u16, hw: u32) -> u32 {
    0xD2800000 | (hw << 21) | ((imm16 as u32) << 5) | rd as u32
}

#[inline]
fn movn(rd: u8, imm16: u16, hw: u32) -> u32 {
    0x92800000 | (hw << 21) | ((imm16 as u32) << 5) | rd as u32
}

#[inline]
fn movk(rd: u8, imm16: u16, hw: u32) -> u32 {
    0xF2800000 | (hw << 21) | ((imm16 as u32) << 5) | rd as u32
}

/// Load any 64-bit constant into `Xd` with one `movz`/`movn` and up to
/// three `movk`.
pub(crate) fn mov_imm64(out: &mut CodeStream, rd: u8, value: u64) {
    let chunks = [
        value as u16,
        (value >> 16) as u16,
        (value >> 32) as u16,
        (value >> 48) as u16,
    ];
    let ones = chunks.iter().filter(|&&c| c == 0xFFFF).count();
    let zeros = chunks.iter().filter(|&&c| c == 0).count();

    if ones > zeros {
        // Start from all-ones and patch the chunks that differ.
        let first = chunks.iter().position(|&c| c != 0xFFFF).unwrap_or(0);
        emit32(out, movn(rd, !chunks[first], first as u32));
        for (hw, &c) in chunks.iter().enumerate().skip(first + 1) {
            if c != 0xFFFF {
                emit32(out, movk(rd, c, hw as u32));
            }
        }
    } else {
        let first = chunks.iter().position(|&c| c != 0).unwrap_or(0);
        emit32(out, movz(rd, chunks[first], first as u32));
        for (hw, &c) in chunks.iter().enumerate().skip(first + 1) {
            if c != 0 {
                emit32(out, movk(rd, c, hw as u32));
            }
        }
    }
}

// ── Integer helpers ─────────────────────────────────────────────────────

/// `add Xd, Xn|SP, Xm, uxtx #shift`
#[inline]
pub(crate) fn add_ext(rd: u8, rn: u8, rm: u8, shift: u8) -> u32 {
    0x8B206000 | ((rm as u32) << 16) | ((shift as u32) << 10) | ((rn as u32) << 5) | rd as u32
}

/// `and Wd, Wn, #((1 << ones) - 1)`
#[inline]
pub(crate) fn and_w_low_ones(rd: u8, rn: u8, ones: u32) -> u32 {
    0x12000000 | ((ones - 1) << 10) | ((rn as u32) << 5) | rd as u32
}

/// `neg Wd, Wm`
#[inline]
pub(crate) fn neg_w(rd: u8, rm: u8) -> u32 {
    0x4B0003E0 | ((rm as u32) << 16) | rd as u32
}

/// `b.cond` with a zero offset, patched by the linker.
#[inline]
pub(crate) fn b_cond(cond: u32) -> u32 {
    0x54000000 | cond
}

/// `cbz Wt` with a zero offset, patched by the linker.
#[inline]
pub(crate) fn cbz_w(rt: u8) -> u32 {
    0x34000000 | rt as u32
}

// ── Operand checks and addressing ───────────────────────────────────────

/// Validate a uniform-count register (`w0`–`w30`, not a temporary).
pub(crate) fn check_count(r: Gpr) -> Result<(), Fault> {
    if r.0 > 30 {
        return Err(Fault::role(format!("w{} cannot hold a shift count", r.0)));
    }
    if GPR_RESERVED.contains(&r.0) {
        return Err(Fault::role(format!(
            "w{} is reserved as a scalar temporary",
            r.0
        )));
    }
    Ok(())
}

/// Validate base (`x0`–`x30` or `sp`) and index (`x0`–`x30`) registers.
pub(crate) fn check_mem(mem: &Mem) -> Result<(), Fault> {
    if mem.base.0 > 31 {
        return Err(Fault::role(format!("base x{} out of range", mem.base.0)));
    }
    if GPR_RESERVED.contains(&mem.base.0) {
        return Err(Fault::role(format!(
            "base x{} is reserved as an address temporary",
            mem.base.0
        )));
    }
    if let Some((idx, _)) = mem.index {
        if idx.0 > 30 {
            return Err(Fault::role(format!("index x{} out of range", idx.0)));
        }
        if GPR_RESERVED.contains(&idx.0) {
            return Err(Fault::role(format!(
                "index x{} is reserved as an address temporary",
                idx.0
            )));
        }
    }
    Ok(())
}

/// Build `base + (index << shift) + disp` in `x17`.
pub(crate) fn materialize(out: &mut CodeStream, mem: &Mem) {
    match (mem.disp, mem.index) {
        (0, Some((idx, shift))) => {
            emit32(out, add_ext(X_ADDR, mem.base.0, idx.0, shift));
        }
        (disp, index) => {
            mov_imm64(out, X_ADDR, disp as u64);
            emit32(out, add_ext(X_ADDR, mem.base.0, X_ADDR, 0));
            if let Some((idx, shift)) = index {
                emit32(out, add_ext(X_ADDR, X_ADDR, idx.0, shift));
            }
        }
    }
}
