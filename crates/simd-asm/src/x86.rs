//! x86-64 encoding helpers for the AVX-512 backend.
//!
//! ## Forms
//!
//! - **EVEX.512**: every vector instruction. The ModR/M.rm operand is a
//!   register or a memory operand; memory displacements use the disp8×64
//!   compression when the displacement is a multiple of the vector size.
//! - **VEX**: opmask logic (`korq`, `kandq`, `kortest*`) and the BMI2
//!   shifts (`shlx`, `shrx`, `sarx`).
//! - **Legacy**: the scalar loads, stores and arithmetic of the lane
//!   emulation, plus the `mov r64, imm64` constant load.
//!
//! Reserved GPRs: `r8`/`r9` (scalar temporaries, splat values) and
//! `r10`/`r11` (address temporaries).

use alloc::format;

use crate::error::Fault;
use crate::ir::{Elem, Gpr};
use crate::mem::Mem;
use crate::stream::CodeStream;

pub(crate) const R_T0: u8 = 8;
pub(crate) const R_T1: u8 = 9;
pub(crate) const R_ADDR: u8 = 10;
pub(crate) const R_ADDR2: u8 = 11;
pub(crate) const GPR_RESERVED: &[u8] = &[R_T0, R_T1, R_ADDR, R_ADDR2];

/// Opcode maps.
pub(crate) const MAP_0F: u8 = 1;
pub(crate) const MAP_0F38: u8 = 2;
pub(crate) const MAP_0F3A: u8 = 3;

/// Implied mandatory prefixes.
pub(crate) const PP_NONE: u8 = 0;
pub(crate) const PP_66: u8 = 1;
pub(crate) const PP_F3: u8 = 2;
pub(crate) const PP_F2: u8 = 3;

/// One EVEX- or VEX-encoded opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Op {
    pub(crate) map: u8,
    pub(crate) pp: u8,
    pub(crate) w: bool,
    pub(crate) code: u8,
}

impl Op {
    pub(crate) const fn new(map: u8, pp: u8, w: bool, code: u8) -> Self {
        Self { map, pp, w, code }
    }
}

/// The ModR/M.rm operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rm {
    Reg(u8),
    Mem(Mem),
}

#[inline]
fn bit(v: u8, n: u8) -> u8 {
    (v >> n) & 1
}

/// Validate a caller-supplied memory operand.
pub(crate) fn check_mem(m: &Mem) -> Result<(), Fault> {
    check_gpr("base", m.base)?;
    if let Some((idx, _)) = m.index {
        check_gpr("index", idx)?;
        if idx.0 == 4 {
            return Err(Fault::role("rsp cannot be an index register"));
        }
    }
    Ok(())
}

/// Reject GPRs outside `r0`–`r15` and the reserved temporaries.
pub(crate) fn check_gpr(what: &str, r: Gpr) -> Result<(), Fault> {
    if r.0 > 15 {
        return Err(Fault::role(format!("{} register r{} out of range", what, r.0)));
    }
    if GPR_RESERVED.contains(&r.0) {
        return Err(Fault::role(format!(
            "{} register r{} is reserved as a temporary",
            what, r.0
        )));
    }
    Ok(())
}

/// ModR/M, SIB and displacement for `reg` against `rm`. Displacements that
/// are multiples of `scale` and fit `i8` after division use the short form.
fn modrm(out: &mut CodeStream, reg: u8, rm: &Rm, scale: i64) {
    let reg = (reg & 7) << 3;
    let m = match rm {
        Rm::Reg(r) => {
            out.byte(0xC0 | reg | (r & 7));
            return;
        }
        Rm::Mem(m) => m,
    };
    let base = m.base.0 & 7;
    let short = m.disp % scale == 0 && i8::try_from(m.disp / scale).is_ok();
    // rbp/r13 have no displacement-free form.
    let md = if m.disp == 0 && base != 5 {
        0b00
    } else if short {
        0b01
    } else {
        0b10
    };
    match m.index {
        Some((idx, shift)) => {
            out.byte((md << 6) | reg | 0b100);
            out.byte((shift << 6) | ((idx.0 & 7) << 3) | base);
        }
        None if base == 4 => {
            out.byte((md << 6) | reg | 0b100);
            out.byte(0x24);
        }
        None => out.byte((md << 6) | reg | base),
    }
    match md {
        0b01 => out.byte((m.disp / scale) as i8 as u8),
        0b10 => out.bytes(&(m.disp as i32).to_le_bytes()),
        _ => {}
    }
}

/// `(X, B)` extension bits for the rm operand; register form uses X for
/// register bit 4.
fn rm_ext(rm: &Rm) -> (u8, u8) {
    match rm {
        Rm::Reg(r) => (bit(*r, 4), bit(*r, 3)),
        Rm::Mem(m) => (m.index.map_or(0, |(i, _)| bit(i.0, 3)), bit(m.base.0, 3)),
    }
}

/// EVEX.512 instruction with opmask `aaa` (0 = unmasked).
pub(crate) fn evex(out: &mut CodeStream, op: Op, reg: u8, vvvv: u8, rm: Rm, aaa: u8) {
    let (x, b) = rm_ext(&rm);
    // P0: ~R ~X ~B ~R' 0 0 mm
    let p0 = ((1 - bit(reg, 3)) << 7)
        | ((1 - x) << 6)
        | ((1 - b) << 5)
        | ((1 - bit(reg, 4)) << 4)
        | op.map;
    // P1: W ~vvvv 1 pp
    let p1 = ((op.w as u8) << 7) | ((!vvvv & 0x0F) << 3) | 0x04 | op.pp;
    // P2: z L'L b ~V' aaa, with L'L = 512 bits
    let p2 = (0b10 << 5) | ((1 - bit(vvvv, 4)) << 3) | (aaa & 7);
    out.bytes(&[0x62, p0, p1, p2, op.code]);
    modrm(out, reg, &rm, 64);
}

/// EVEX.512 instruction with a trailing immediate byte.
pub(crate) fn evex_imm(out: &mut CodeStream, op: Op, reg: u8, vvvv: u8, rm: Rm, imm: u8) {
    evex(out, op, reg, vvvv, rm, 0);
    out.byte(imm);
}

/// Three-byte VEX instruction on registers; `l` selects L=1.
pub(crate) fn vex(out: &mut CodeStream, op: Op, l: bool, reg: u8, vvvv: u8, rm: u8) {
    let b1 = ((1 - bit(reg, 3)) << 7) | (1 << 6) | ((1 - bit(rm, 3)) << 5) | op.map;
    let b2 = ((op.w as u8) << 7) | ((!vvvv & 0x0F) << 3) | ((l as u8) << 2) | op.pp;
    out.bytes(&[0xC4, b1, b2, op.code]);
    modrm(out, reg, &Rm::Reg(rm), 1);
}

/// Legacy REX prefix, emitted only when some bit is set.
fn rex(out: &mut CodeStream, w: bool, reg: u8, rm: &Rm) {
    let (x, b) = match rm {
        Rm::Reg(r) => (0, bit(*r, 3)),
        Rm::Mem(m) => (m.index.map_or(0, |(i, _)| bit(i.0, 3)), bit(m.base.0, 3)),
    };
    let v = ((w as u8) << 3) | (bit(reg, 3) << 2) | (x << 1) | b;
    if v != 0 {
        out.byte(0x40 | v);
    }
}

fn legacy(out: &mut CodeStream, w: bool, opcode: &[u8], reg: u8, rm: Rm) {
    rex(out, w, reg, &rm);
    out.bytes(opcode);
    modrm(out, reg, &rm, 1);
}

// ── Scalar instructions ─────────────────────────────────────────────────

/// `movzx`/`movsx r32, byte/word [m]`
pub(crate) fn load_lane(out: &mut CodeStream, rt: u8, m: &Mem, elem: Elem, signed: bool) {
    let code = match (elem.is_byte(), signed) {
        (true, false) => 0xB6,
        (true, true) => 0xBE,
        (false, false) => 0xB7,
        (false, true) => 0xBF,
    };
    legacy(out, false, &[0x0F, code], rt, Rm::Mem(*m));
}

/// `mov byte/word [m], r`
pub(crate) fn store_lane(out: &mut CodeStream, rt: u8, m: &Mem, elem: Elem) {
    if elem.is_byte() {
        legacy(out, false, &[0x88], rt, Rm::Mem(*m));
    } else {
        out.byte(0x66);
        legacy(out, false, &[0x89], rt, Rm::Mem(*m));
    }
}

/// `imul rd, rb` (32-bit)
pub(crate) fn imul(out: &mut CodeStream, rd: u8, rb: u8) {
    legacy(out, false, &[0x0F, 0xAF], rd, Rm::Reg(rb));
}

/// `and r32, imm8`
pub(crate) fn and_imm8(out: &mut CodeStream, rd: u8, imm: i8) {
    legacy(out, false, &[0x83], 4, Rm::Reg(rd));
    out.byte(imm as u8);
}

/// BMI2 shift by register: `shlx`/`shrx`/`sarx rd, rs, rc` (32-bit).
pub(crate) fn shiftx(out: &mut CodeStream, pp: u8, rd: u8, rs: u8, rc: u8) {
    vex(out, Op::new(MAP_0F38, pp, false, 0xF7), false, rd, rc, rs);
}

/// `mov r32, r32`
pub(crate) fn mov32(out: &mut CodeStream, rd: u8, rs: u8) {
    legacy(out, false, &[0x89], rs, Rm::Reg(rd));
}

/// `mov r32, imm32`
pub(crate) fn mov_imm32(out: &mut CodeStream, rd: u8, imm: u32) {
    if rd >= 8 {
        out.byte(0x41);
    }
    out.byte(0xB8 | (rd & 7));
    out.bytes(&imm.to_le_bytes());
}

/// `mov r64, imm64`
pub(crate) fn mov_imm64(out: &mut CodeStream, rd: u8, imm: i64) {
    out.byte(0x48 | bit(rd, 3));
    out.byte(0xB8 | (rd & 7));
    out.bytes(&imm.to_le_bytes());
}

/// `rd = base + (index << shift) + disp` for displacements beyond disp32.
pub(crate) fn materialize(out: &mut CodeStream, rd: u8, m: &Mem) {
    mov_imm64(out, rd, m.disp);
    // add rd, base
    legacy(out, true, &[0x01], m.base.0, Rm::Reg(rd));
    if let Some(idx) = m.index {
        // lea rd, [rd + index << shift]
        let sum = Mem {
            base: Gpr(rd),
            index: Some(idx),
            disp: 0,
        };
        legacy(out, true, &[0x8D], rd, Rm::Mem(sum));
    }
}
