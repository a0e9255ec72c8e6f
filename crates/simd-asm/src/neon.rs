//! ARM NEON backend: each logical register is a pair of 128-bit `q`
//! registers.
//!
//! NEON has no predicate registers, so every mask is vector-held. `v30` and
//! `v31` are reserved for memory sources, splatted shift counts and the
//! mask reduction accumulator.

use crate::aarch64::{self, emit32, X_ADDR, W_TMP};
use crate::backend::{sealed::Lower, Backend, Cx, Operand2, Operands, Reserved};
use crate::error::{BackendName, Fault};
use crate::ir::*;
use crate::mask;
use crate::mem::{self, Mem, Plan, Quantum};
use crate::stream::FixupKind;
use crate::width::{PhysList, Shape};

const V_TMP: u8 = 30;
const V_TMP2: u8 = 31;

/// NEON, 256-bit logical registers as `q` register pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeonPair {
    _priv: (),
}

impl NeonPair {
    /// Create the backend.
    pub const fn new() -> Self {
        Self { _priv: () }
    }
}

impl Backend for NeonPair {
    const NAME: BackendName = BackendName::NeonPair;

    fn shape(&self) -> Shape {
        Shape {
            native_bits: 128,
            ratio: 2,
            vector_regs: 32,
            pred_regs: 0,
        }
    }

    fn reserved(&self) -> Reserved {
        Reserved {
            vector: &[V_TMP, V_TMP2],
            pred: &[],
            gpr: aarch64::GPR_RESERVED,
        }
    }

    /// `v{n}` maps to `[q2n, q2n+1]`.
    fn default_vector(&self, id: u8) -> Option<PhysList> {
        (id <= 14).then(|| PhysList::new(&[2 * id, 2 * id + 1]))
    }
}

// ── Encodings ───────────────────────────────────────────────────────────

/// AdvSIMD three-same, Q=1: `0|1|U|01110|size|1|Rm|opcode|1|Rn|Rd`
#[inline]
fn three_same(u: u32, size: u32, opcode: u32, rd: u8, rn: u8, rm: u8) -> u32 {
    0x4E200400
        | (u << 29)
        | (size << 22)
        | ((rm as u32) << 16)
        | (opcode << 11)
        | ((rn as u32) << 5)
        | rd as u32
}

/// AdvSIMD two-register misc, Q=1: `0|1|U|01110|size|10000|opcode|10|Rn|Rd`
#[inline]
fn two_misc(u: u32, size: u32, opcode: u32, rd: u8, rn: u8) -> u32 {
    0x4E200800 | (u << 29) | (size << 22) | (opcode << 12) | ((rn as u32) << 5) | rd as u32
}

/// Bitwise three-same (opcode `00011`); `size` selects and/bic/orr/orn or
/// eor/bsl/bit/bif.
#[inline]
fn bitwise(u: u32, size: u32, rd: u8, rn: u8, rm: u8) -> u32 {
    three_same(u, size, 0b00011, rd, rn, rm)
}

#[inline]
fn orr(rd: u8, rn: u8, rm: u8) -> u32 {
    bitwise(0, 0b10, rd, rn, rm)
}

#[inline]
fn and(rd: u8, rn: u8, rm: u8) -> u32 {
    bitwise(0, 0b00, rd, rn, rm)
}

#[inline]
fn not(rd: u8, rn: u8) -> u32 {
    0x6E205800 | ((rn as u32) << 5) | rd as u32
}

/// Element size field: 0 for bytes, 1 for halfwords.
#[inline]
fn size(elem: Elem) -> u32 {
    if elem.is_byte() {
        0b00
    } else {
        0b01
    }
}

fn ldr_q(rt: u8, rn: u8, disp: i64) -> u32 {
    if (0..=65520).contains(&disp) && disp % 16 == 0 {
        0x3DC00000 | (((disp / 16) as u32) << 10) | ((rn as u32) << 5) | rt as u32
    } else {
        0x3CC00000 | ((disp as u32 & 0x1FF) << 12) | ((rn as u32) << 5) | rt as u32
    }
}

fn str_q(rt: u8, rn: u8, disp: i64) -> u32 {
    if (0..=65520).contains(&disp) && disp % 16 == 0 {
        0x3D800000 | (((disp / 16) as u32) << 10) | ((rn as u32) << 5) | rt as u32
    } else {
        0x3C800000 | ((disp as u32 & 0x1FF) << 12) | ((rn as u32) << 5) | rt as u32
    }
}

/// `(U, opcode)` of the three-same arithmetic form.
fn arith_opcode(op: ArithOp, elem: Elem) -> (u32, u32) {
    let s = elem.is_signed();
    match op {
        ArithOp::Add => (0, 0b10000),
        ArithOp::Sub => (1, 0b10000),
        ArithOp::AddSat if s => (0, 0b00001), // sqadd
        ArithOp::AddSat => (1, 0b00001),      // uqadd
        ArithOp::SubSat if s => (0, 0b00101), // sqsub
        ArithOp::SubSat => (1, 0b00101),      // uqsub
        ArithOp::Mul => (0, 0b10011),
        ArithOp::Max if s => (0, 0b01100),
        ArithOp::Max => (1, 0b01100),
        ArithOp::Min if s => (0, 0b01101),
        ArithOp::Min => (1, 0b01101),
    }
}

/// Resolved memory base after optional materialization into `x17`.
#[derive(Debug, Clone, Copy)]
struct Addr {
    base: u8,
    disp: i64,
}

impl Addr {
    fn at(self, k: usize) -> i64 {
        self.disp + 16 * k as i64
    }
}

enum Rhs {
    Reg(PhysList),
    Mem(Addr),
}

impl NeonPair {
    fn address(&self, cx: &mut Cx<'_>, m: &Mem) -> Result<Addr, Fault> {
        aarch64::check_mem(m)?;
        match mem::classify(Quantum::A64Vector, m, &[0, 16])? {
            Plan::Inline => Ok(Addr {
                base: m.base.0,
                disp: m.disp,
            }),
            Plan::Materialize => {
                aarch64::materialize(cx.out, m);
                Ok(Addr {
                    base: X_ADDR,
                    disp: 0,
                })
            }
        }
    }

    fn rhs(&self, cx: &mut Cx<'_>, src: &Src) -> Result<Rhs, Fault> {
        Ok(match Operand2::resolve(self, src)? {
            Operand2::Reg(r) => Rhs::Reg(r),
            Operand2::Mem(m) => Rhs::Mem(self.address(cx, &m)?),
        })
    }

    /// Sub-register `k` of the second source, loading memory into `tmp`.
    fn rhs_at(&self, cx: &mut Cx<'_>, rhs: &Rhs, k: usize, tmp: u8) -> u8 {
        match rhs {
            Rhs::Reg(r) => r.at(k),
            Rhs::Mem(a) => {
                emit32(cx.out, ldr_q(tmp, a.base, a.at(k)));
                tmp
            }
        }
    }

    fn ratio(&self) -> usize {
        self.shape().ratio as usize
    }

    fn shift(
        &self,
        cx: &mut Cx<'_>,
        op: ShiftOp,
        elem: Elem,
        d: PhysList,
        s: PhysList,
        count: &Count,
    ) -> Result<(), Fault> {
        let bits = elem.bits();
        // ushl/sshl shift right for negative per-lane counts.
        let (u, negate) = match op {
            ShiftOp::Shl => (1, false),
            ShiftOp::Shr => (u32::from(!elem.is_signed()), true),
        };
        match count {
            Count::Imm(c) => {
                let n = c % bits;
                for k in 0..self.ratio() {
                    let (rd, rn) = (d.at(k), s.at(k));
                    let word = match (op, n) {
                        (_, 0) if rd == rn => continue,
                        (_, 0) => orr(rd, rn, rn),
                        (ShiftOp::Shl, n) => {
                            0x4F005400 | ((bits + n) << 16) | ((rn as u32) << 5) | rd as u32
                        }
                        (ShiftOp::Shr, n) => {
                            0x4F000400
                                | (u << 29)
                                | ((2 * bits - n) << 16)
                                | ((rn as u32) << 5)
                                | rd as u32
                        }
                    };
                    emit32(cx.out, word);
                }
            }
            Count::Gpr(r) => {
                aarch64::check_count(*r)?;
                emit32(cx.out, aarch64::and_w_low_ones(W_TMP, r.0, bits.trailing_zeros()));
                if negate {
                    emit32(cx.out, aarch64::neg_w(W_TMP, W_TMP));
                }
                let imm5 = if elem.is_byte() { 0b00001 } else { 0b00010 };
                emit32(
                    cx.out,
                    0x4E000C00 | (imm5 << 16) | ((W_TMP as u32) << 5) | V_TMP as u32,
                );
                for k in 0..self.ratio() {
                    emit32(cx.out, three_same(u, size(elem), 0b01000, d.at(k), s.at(k), V_TMP));
                }
            }
            Count::Lanes(src) => {
                let rhs = self.rhs(cx, src)?;
                // movi v31.16b, #7 / movi v31.8h, #15
                let movi = if elem.is_byte() {
                    0x4F00E400 | (7 << 5) | V_TMP2 as u32
                } else {
                    0x4F008400 | (15 << 5) | V_TMP2 as u32
                };
                emit32(cx.out, movi);
                for k in 0..self.ratio() {
                    let c = self.rhs_at(cx, &rhs, k, V_TMP);
                    emit32(cx.out, and(V_TMP, c, V_TMP2));
                    if negate {
                        emit32(cx.out, two_misc(1, size(elem), 0b01011, V_TMP, V_TMP));
                    }
                    emit32(cx.out, three_same(u, size(elem), 0b01000, d.at(k), s.at(k), V_TMP));
                }
            }
        }
        Ok(())
    }

    fn compare(
        &self,
        cx: &mut Cx<'_>,
        cond: Cond,
        elem: Elem,
        d: PhysList,
        a: PhysList,
        rhs: &Rhs,
    ) {
        let s = elem.is_signed();
        let sz = size(elem);
        for k in 0..self.ratio() {
            let b = self.rhs_at(cx, rhs, k, V_TMP);
            let a = a.at(k);
            let rd = d.at(k);
            // cmgt/cmhi and cmge/cmhs exist; lt/le swap operands.
            let (u, opcode, rn, rm) = match cond {
                Cond::Eq | Cond::Ne => (1, 0b10001, a, b),
                Cond::Gt => (u32::from(!s), 0b00110, a, b),
                Cond::Ge => (u32::from(!s), 0b00111, a, b),
                Cond::Lt => (u32::from(!s), 0b00110, b, a),
                Cond::Le => (u32::from(!s), 0b00111, b, a),
            };
            emit32(cx.out, three_same(u, sz, opcode, rd, rn, rm));
            if cond == Cond::Ne {
                emit32(cx.out, not(rd, rd));
            }
        }
    }

    fn mask_jump(
        &self,
        cx: &mut Cx<'_>,
        parts: PhysList,
        when: MaskCond,
        target: Label,
    ) {
        let f = mask::fold(parts.as_slice(), V_TMP);
        for &(d, a, b) in &f.steps {
            let w = match when {
                MaskCond::None => orr(d, a, b),
                MaskCond::Full => and(d, a, b),
            };
            emit32(cx.out, w);
        }
        // Reduce to "any lane set": for FULL, test the complement.
        let mut acc = f.result;
        if when == MaskCond::Full {
            emit32(cx.out, not(V_TMP, acc));
            acc = V_TMP;
        }
        emit32(cx.out, 0x6E30A800 | ((acc as u32) << 5) | V_TMP as u32); // umaxv b30
        emit32(cx.out, 0x0E013C00 | ((V_TMP as u32) << 5) | W_TMP as u32); // umov w16, v30.b[0]
        cx.out.branch_word(aarch64::cbz_w(W_TMP), FixupKind::A64Imm19, target);
    }
}

impl Lower for NeonPair {
    fn lower(&self, cx: &mut Cx<'_>, op: &Pseudo) -> Result<(), Fault> {
        let n = self.ratio();
        match op {
            Pseudo::Move { dst, src } => {
                let d = self.v(dst)?;
                match self.rhs(cx, src)? {
                    Rhs::Reg(s) => {
                        for k in 0..n {
                            if d.at(k) != s.at(k) {
                                emit32(cx.out, orr(d.at(k), s.at(k), s.at(k)));
                            }
                        }
                    }
                    Rhs::Mem(a) => {
                        for k in 0..n {
                            emit32(cx.out, ldr_q(d.at(k), a.base, a.at(k)));
                        }
                    }
                }
            }
            Pseudo::Store { src, mem } => {
                let s = self.v(src)?;
                let a = self.address(cx, mem)?;
                for k in 0..n {
                    emit32(cx.out, str_q(s.at(k), a.base, a.at(k)));
                }
            }
            Pseudo::Logic {
                op,
                dst,
                src1,
                src2,
            } => {
                let (d, a) = (self.v(dst)?, self.v(src1)?);
                let rhs = self.rhs(cx, src2)?;
                for k in 0..n {
                    let b = self.rhs_at(cx, &rhs, k, V_TMP);
                    let (rd, ra) = (d.at(k), a.at(k));
                    let w = match op {
                        LogicOp::And => and(rd, ra, b),
                        LogicOp::Or => orr(rd, ra, b),
                        LogicOp::Xor => bitwise(1, 0b00, rd, ra, b),
                        LogicOp::AndNot => bitwise(0, 0b01, rd, b, ra), // bic
                    };
                    emit32(cx.out, w);
                }
            }
            Pseudo::Not { dst, src } => {
                let (d, s) = (self.v(dst)?, self.v(src)?);
                for k in 0..n {
                    emit32(cx.out, not(d.at(k), s.at(k)));
                }
            }
            Pseudo::Arith {
                op,
                elem,
                dst,
                src1,
                src2,
            } => {
                let (d, a) = (self.v(dst)?, self.v(src1)?);
                let rhs = self.rhs(cx, src2)?;
                let (u, opcode) = arith_opcode(*op, *elem);
                for k in 0..n {
                    let b = self.rhs_at(cx, &rhs, k, V_TMP);
                    emit32(cx.out, three_same(u, size(*elem), opcode, d.at(k), a.at(k), b));
                }
            }
            Pseudo::Shift {
                op,
                elem,
                dst,
                src,
                count,
            } => {
                let (d, s) = (self.v(dst)?, self.v(src)?);
                self.shift(cx, *op, *elem, d, s, count)?;
            }
            Pseudo::Compare {
                cond,
                elem,
                mask,
                src1,
                src2,
            } => {
                let d = self.vector_mask(mask)?;
                let a = self.v(src1)?;
                let rhs = self.rhs(cx, src2)?;
                self.compare(cx, *cond, *elem, d, a, &rhs);
            }
            Pseudo::Merge {
                dst, src, mask, ..
            } => {
                let d = self.v(dst)?;
                let m = self.vector_mask(mask)?;
                let rhs = self.rhs(cx, src)?;
                for k in 0..n {
                    let s = self.rhs_at(cx, &rhs, k, V_TMP);
                    // bit: insert Vn into Vd where Vm is set.
                    emit32(cx.out, bitwise(1, 0b10, d.at(k), s, m.at(k)));
                }
            }
            Pseudo::MaskJump {
                mask, when, target, ..
            } => {
                let m = self.vector_mask(mask)?;
                self.mask_jump(cx, m, *when, *target);
            }
        }
        Ok(())
    }
}
