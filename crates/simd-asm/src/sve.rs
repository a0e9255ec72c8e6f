//! ARM SVE backend: each logical register is a pair of scalable `z`
//! registers, each logical predicate a pair of `p` registers.
//!
//! Reserved: `z30` (memory sources, shift counts), `z31` (blend
//! temporary), `p5`/`p6` (mask staging and reduction) and `p7` (all-true
//! governing predicate, set by each sequence that needs it).

use alloc::format;

use crate::aarch64::{self, emit32, COND_EQ, W_TMP, X_ADDR};
use crate::backend::{sealed::Lower, Backend, Cx, Operand2, Operands, Reserved};
use crate::error::{BackendName, Fault, GenError};
use crate::ir::*;
use crate::mask::{self, BitOps};
use crate::mem::{self, Mem, Plan, Quantum};
use crate::stream::FixupKind;
use crate::width::{PhysList, Shape};

const Z_TMP: u8 = 30;
const Z_TMP2: u8 = 31;
const P_STAGE: u8 = 5;
const P_ACC: u8 = 6;
const P_ALL: u8 = 7;

/// SVE at a fixed vector length, logical registers of twice that length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvePair {
    vl_bits: u32,
}

impl SvePair {
    /// Create the backend for a vector length of `vl_bits`.
    ///
    /// The length must be a power of two between 128 and 2048.
    ///
    /// ```
    /// use simd_asm::SvePair;
    ///
    /// assert!(SvePair::new(256).is_ok());
    /// assert!(SvePair::new(384).is_err());
    /// ```
    pub fn new(vl_bits: u32) -> Result<Self, GenError> {
        if !vl_bits.is_power_of_two() || !(128..=2048).contains(&vl_bits) {
            return Err(GenError::InvalidConfiguration {
                backend: BackendName::SvePair,
                detail: format!(
                    "vector length {} is not a power of two in 128..=2048",
                    vl_bits
                ),
            });
        }
        Ok(Self { vl_bits })
    }

    /// Vector length in bits.
    pub const fn vl_bits(&self) -> u32 {
        self.vl_bits
    }

    fn vl_bytes(&self) -> i64 {
        (self.vl_bits / 8) as i64
    }
}

impl Backend for SvePair {
    const NAME: BackendName = BackendName::SvePair;

    fn shape(&self) -> Shape {
        Shape {
            native_bits: self.vl_bits,
            ratio: 2,
            vector_regs: 32,
            pred_regs: 16,
        }
    }

    fn reserved(&self) -> Reserved {
        Reserved {
            vector: &[Z_TMP, Z_TMP2],
            pred: &[P_STAGE, P_ACC, P_ALL],
            gpr: aarch64::GPR_RESERVED,
        }
    }

    /// `v{n}` maps to `[z2n, z2n+1]`.
    fn default_vector(&self, id: u8) -> Option<PhysList> {
        (id <= 14).then(|| PhysList::new(&[2 * id, 2 * id + 1]))
    }

    /// `p{n}` maps to `[p{n}, p{n+8}]`.
    fn default_pred(&self, id: u8) -> Option<PhysList> {
        (id <= 4).then(|| PhysList::new(&[id, id + 8]))
    }
}

// ── Encodings ───────────────────────────────────────────────────────────

#[inline]
fn size(elem: Elem) -> u32 {
    if elem.is_byte() {
        0
    } else {
        1
    }
}

#[inline]
fn r(n: u8) -> u32 {
    n as u32
}

/// `ptrue Pd.<T>` (pattern ALL)
fn ptrue(pd: u8, elem: Elem) -> u32 {
    0x2518E3E0 | (size(elem) << 22) | r(pd)
}

/// `movprfx Zd, Zn`
fn movprfx(zd: u8, zn: u8) -> u32 {
    0x0420BC00 | (r(zn) << 5) | r(zd)
}

/// Unpredicated bitwise `and/orr/eor/bic Zd.D, Zn.D, Zm.D`.
fn logic(base: u32, zd: u8, zn: u8, zm: u8) -> u32 {
    base | (r(zm) << 16) | (r(zn) << 5) | r(zd)
}

const AND: u32 = 0x04203000;
const ORR: u32 = 0x04603000;
const EOR: u32 = 0x04A03000;
const BIC: u32 = 0x04E03000;

/// Unpredicated arithmetic `add/sub/sqadd/uqadd/sqsub/uqsub`.
fn arith_unpred(opc: u32, elem: Elem, zd: u8, zn: u8, zm: u8) -> u32 {
    0x04200000 | (size(elem) << 22) | (r(zm) << 16) | (opc << 10) | (r(zn) << 5) | r(zd)
}

/// Destructive predicated `op Zdn, Pg/M, Zdn, Zm`.
fn pred_op(base: u32, elem: Elem, zdn: u8, pg: u8, zm: u8) -> u32 {
    base | (size(elem) << 22) | (r(pg) << 10) | (r(zm) << 5) | r(zdn)
}

const MUL: u32 = 0x04100000;
const SMAX: u32 = 0x04080000;
const UMAX: u32 = 0x04090000;
const SMIN: u32 = 0x040A0000;
const UMIN: u32 = 0x040B0000;
const ASR_V: u32 = 0x04108000;
const LSR_V: u32 = 0x04118000;
const LSL_V: u32 = 0x04138000;

/// Integer compare vectors: `cmp<cc> Pd.<T>, Pg/Z, Zn.<T>, Zm.<T>`.
fn cmp(base: u32, elem: Elem, pd: u8, pg: u8, zn: u8, zm: u8) -> u32 {
    base | (size(elem) << 22) | (r(zm) << 16) | (r(pg) << 10) | (r(zn) << 5) | r(pd)
}

const CMPHS: u32 = 0x24000000;
const CMPHI: u32 = 0x24000010;
const CMPGE: u32 = 0x24008000;
const CMPGT: u32 = 0x24008010;
const CMPEQ: u32 = 0x2400A000;
const CMPNE: u32 = 0x2400A010;

/// `cmpne Pd.<T>, Pg/Z, Zn.<T>, #0`
fn cmpne_zero(elem: Elem, pd: u8, pg: u8, zn: u8) -> u32 {
    0x25008010 | (size(elem) << 22) | (r(pg) << 10) | (r(zn) << 5) | r(pd)
}

/// `mov Zd.<T>, Pg/Z, #-1`
fn cpy_ones(elem: Elem, zd: u8, pg: u8) -> u32 {
    0x05100000 | (size(elem) << 22) | (r(pg) << 16) | (0xFF << 5) | r(zd)
}

/// `sel Zd.<T>, Pg, Zn.<T>, Zm.<T>`
fn sel(elem: Elem, zd: u8, pg: u8, zn: u8, zm: u8) -> u32 {
    0x0520C000 | (size(elem) << 22) | (r(zm) << 16) | (r(pg) << 10) | (r(zn) << 5) | r(zd)
}

/// Predicate logic `op Pd.B, Pg/Z, Pn.B, Pm.B`.
fn plogic(base: u32, pd: u8, pg: u8, pn: u8, pm: u8) -> u32 {
    base | (r(pm) << 16) | (r(pg) << 10) | (r(pn) << 5) | r(pd)
}

const P_AND: u32 = 0x25004000;
const P_ORRS: u32 = 0x25C04000;
const P_EORS: u32 = 0x25404200;

/// `ldr/str Zt, [Xn, #imm, mul vl]`
fn ldst_z(base: u32, zt: u8, xn: u8, imm9: i64) -> u32 {
    let imm = imm9 as u32 & 0x1FF;
    base | ((imm >> 3) << 16) | ((imm & 7) << 10) | (r(xn) << 5) | r(zt)
}

const LDR_Z: u32 = 0x85804000;
const STR_Z: u32 = 0xE5804000;

#[derive(Debug, Clone, Copy)]
struct Addr {
    base: u8,
    /// Offset of the low half, in vector lengths.
    vl: i64,
}

enum Rhs {
    Reg(PhysList),
    Mem(Addr),
}

impl BitOps for SvePair {
    fn and(&self, cx: &mut Cx<'_>, d: u8, a: u8, b: u8) {
        emit32(cx.out, logic(AND, d, a, b));
    }

    fn and_not(&self, cx: &mut Cx<'_>, d: u8, a: u8, b: u8) {
        emit32(cx.out, logic(BIC, d, a, b));
    }

    fn or(&self, cx: &mut Cx<'_>, d: u8, a: u8, b: u8) {
        emit32(cx.out, logic(ORR, d, a, b));
    }
}

impl SvePair {
    fn address(&self, cx: &mut Cx<'_>, m: &Mem) -> Result<Addr, Fault> {
        aarch64::check_mem(m)?;
        let vl = self.vl_bytes();
        let q = Quantum::SveMulVl {
            vl_bytes: vl as u32,
        };
        match mem::classify(q, m, &[0, vl])? {
            Plan::Inline => Ok(Addr {
                base: m.base.0,
                vl: m.disp / vl,
            }),
            Plan::Materialize => {
                aarch64::materialize(cx.out, m);
                Ok(Addr {
                    base: X_ADDR,
                    vl: 0,
                })
            }
        }
    }

    fn rhs(&self, cx: &mut Cx<'_>, src: &Src) -> Result<Rhs, Fault> {
        Ok(match Operand2::resolve(self, src)? {
            Operand2::Reg(p) => Rhs::Reg(p),
            Operand2::Mem(m) => Rhs::Mem(self.address(cx, &m)?),
        })
    }

    fn rhs_at(&self, cx: &mut Cx<'_>, rhs: &Rhs, k: usize) -> u8 {
        match rhs {
            Rhs::Reg(p) => p.at(k),
            Rhs::Mem(a) => {
                emit32(cx.out, ldst_z(LDR_Z, Z_TMP, a.base, a.vl + k as i64));
                Z_TMP
            }
        }
    }

    /// `Zd = Zd op Zm` for a commutative destructive op, with `Zd = a`
    /// established first (by `movprfx` when needed).
    fn destructive(&self, cx: &mut Cx<'_>, base: u32, elem: Elem, d: u8, a: u8, b: u8) {
        if d == a {
            emit32(cx.out, pred_op(base, elem, d, P_ALL, b));
        } else if d == b {
            emit32(cx.out, pred_op(base, elem, d, P_ALL, a));
        } else {
            emit32(cx.out, movprfx(d, a));
            emit32(cx.out, pred_op(base, elem, d, P_ALL, b));
        }
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
        let sz = size(elem);
        let by_vector = match (op, elem.is_signed()) {
            (ShiftOp::Shl, _) => LSL_V,
            (ShiftOp::Shr, true) => ASR_V,
            (ShiftOp::Shr, false) => LSR_V,
        };
        match count {
            Count::Imm(c) => {
                let n = c % bits;
                for k in 0..2 {
                    let (zd, zn) = (d.at(k), s.at(k));
                    let w = match (op, elem.is_signed()) {
                        _ if n == 0 && zd == zn => continue,
                        _ if n == 0 => logic(ORR, zd, zn, zn),
                        (ShiftOp::Shl, _) => 0x04209C00 | ((bits + n) << 16),
                        (ShiftOp::Shr, true) => 0x04209000 | ((2 * bits - n) << 16),
                        (ShiftOp::Shr, false) => 0x04209400 | ((2 * bits - n) << 16),
                    };
                    let w = if n == 0 { w } else { w | (r(zn) << 5) | r(zd) };
                    emit32(cx.out, w);
                }
                return Ok(());
            }
            Count::Gpr(g) => {
                aarch64::check_count(*g)?;
                emit32(cx.out, aarch64::and_w_low_ones(W_TMP, g.0, bits.trailing_zeros()));
                // dup Z30.<T>, W16
                emit32(cx.out, 0x05203800 | (sz << 22) | (r(W_TMP) << 5) | r(Z_TMP));
                emit32(cx.out, ptrue(P_ALL, elem));
                for k in 0..2 {
                    if d.at(k) != s.at(k) {
                        emit32(cx.out, movprfx(d.at(k), s.at(k)));
                    }
                    emit32(cx.out, pred_op(by_vector, elem, d.at(k), P_ALL, Z_TMP));
                }
            }
            Count::Lanes(src) => {
                let rhs = self.rhs(cx, src)?;
                // and Z30.<T>, Z30.<T>, #(bits - 1)
                let imm13: u32 = if elem.is_byte() { 0x32 } else { 0x23 };
                emit32(cx.out, ptrue(P_ALL, elem));
                for k in 0..2 {
                    if let Rhs::Reg(p) = &rhs {
                        emit32(cx.out, logic(ORR, Z_TMP, p.at(k), p.at(k)));
                    } else {
                        self.rhs_at(cx, &rhs, k);
                    }
                    emit32(cx.out, 0x05800000 | (imm13 << 5) | r(Z_TMP));
                    if d.at(k) != s.at(k) {
                        emit32(cx.out, movprfx(d.at(k), s.at(k)));
                    }
                    emit32(cx.out, pred_op(by_vector, elem, d.at(k), P_ALL, Z_TMP));
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
        mask: &Mask,
        a: PhysList,
        rhs: &Rhs,
    ) -> Result<(), Fault> {
        let s = elem.is_signed();
        let (base, swap) = match cond {
            Cond::Eq => (CMPEQ, false),
            Cond::Ne => (CMPNE, false),
            Cond::Gt => (if s { CMPGT } else { CMPHI }, false),
            Cond::Ge => (if s { CMPGE } else { CMPHS }, false),
            Cond::Lt => (if s { CMPGT } else { CMPHI }, true),
            Cond::Le => (if s { CMPGE } else { CMPHS }, true),
        };
        // Vector masks are staged in p5 and expanded to lanes.
        let (preds, lanes) = match mask {
            Mask::Pred(p) => (Some(self.p(p)?), None),
            Mask::Vector(v) => (None, Some(self.v(v)?)),
        };
        emit32(cx.out, ptrue(P_ALL, elem));
        for k in 0..2 {
            let b = self.rhs_at(cx, rhs, k);
            let (zn, zm) = if swap { (b, a.at(k)) } else { (a.at(k), b) };
            let pd = preds.map_or(P_STAGE, |p| p.at(k));
            emit32(cx.out, cmp(base, elem, pd, P_ALL, zn, zm));
            if let Some(z) = lanes {
                emit32(cx.out, cpy_ones(elem, z.at(k), P_STAGE));
            }
        }
        Ok(())
    }

    fn mask_jump(
        &self,
        cx: &mut Cx<'_>,
        elem: Elem,
        mask: &Mask,
        when: MaskCond,
        target: Label,
    ) -> Result<(), Fault> {
        emit32(cx.out, ptrue(P_ALL, elem));
        let parts = match mask {
            Mask::Pred(p) => self.p(p)?,
            Mask::Vector(v) => {
                let z = self.v(v)?;
                emit32(cx.out, cmpne_zero(elem, P_STAGE, P_ALL, z.at(0)));
                emit32(cx.out, cmpne_zero(elem, P_ACC, P_ALL, z.at(1)));
                PhysList::new(&[P_STAGE, P_ACC])
            }
        };
        let f = mask::fold(parts.as_slice(), P_ACC);
        match when {
            // Z is set when no active element of the result is true.
            MaskCond::None => {
                for &(d, a, b) in &f.steps {
                    emit32(cx.out, plogic(P_ORRS, d, P_ALL, a, b));
                }
            }
            MaskCond::Full => {
                for &(d, a, b) in &f.steps {
                    emit32(cx.out, plogic(P_AND, d, P_ALL, a, b));
                }
                // nots: eors with the governing predicate.
                emit32(cx.out, plogic(P_EORS, P_ACC, P_ALL, f.result, P_ALL));
            }
        }
        cx.out
            .branch_word(aarch64::b_cond(COND_EQ), FixupKind::A64Imm19, target);
        Ok(())
    }
}

impl Lower for SvePair {
    fn lower(&self, cx: &mut Cx<'_>, op: &Pseudo) -> Result<(), Fault> {
        match op {
            Pseudo::Move { dst, src } => {
                let d = self.v(dst)?;
                match self.rhs(cx, src)? {
                    Rhs::Reg(s) => {
                        for k in 0..2 {
                            if d.at(k) != s.at(k) {
                                emit32(cx.out, logic(ORR, d.at(k), s.at(k), s.at(k)));
                            }
                        }
                    }
                    Rhs::Mem(a) => {
                        for k in 0..2 {
                            emit32(cx.out, ldst_z(LDR_Z, d.at(k), a.base, a.vl + k as i64));
                        }
                    }
                }
            }
            Pseudo::Store { src, mem } => {
                let s = self.v(src)?;
                let a = self.address(cx, mem)?;
                for k in 0..2 {
                    emit32(cx.out, ldst_z(STR_Z, s.at(k), a.base, a.vl + k as i64));
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
                for k in 0..2 {
                    let b = self.rhs_at(cx, &rhs, k);
                    let w = match op {
                        LogicOp::And => logic(AND, d.at(k), a.at(k), b),
                        LogicOp::Or => logic(ORR, d.at(k), a.at(k), b),
                        LogicOp::Xor => logic(EOR, d.at(k), a.at(k), b),
                        LogicOp::AndNot => logic(BIC, d.at(k), b, a.at(k)),
                    };
                    emit32(cx.out, w);
                }
            }
            Pseudo::Not { dst, src } => {
                let (d, s) = (self.v(dst)?, self.v(src)?);
                emit32(cx.out, ptrue(P_ALL, Elem::U8));
                for k in 0..2 {
                    // not Zd.B, P7/M, Zn.B
                    emit32(cx.out, 0x041EA000 | (r(P_ALL) << 10) | (r(s.at(k)) << 5) | r(d.at(k)));
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
                let s = elem.is_signed();
                let unpred = match op {
                    ArithOp::Add => Some(0b000),
                    ArithOp::Sub => Some(0b001),
                    ArithOp::AddSat => Some(if s { 0b100 } else { 0b101 }),
                    ArithOp::SubSat => Some(if s { 0b110 } else { 0b111 }),
                    _ => None,
                };
                match unpred {
                    Some(opc) => {
                        for k in 0..2 {
                            let b = self.rhs_at(cx, &rhs, k);
                            emit32(cx.out, arith_unpred(opc, *elem, d.at(k), a.at(k), b));
                        }
                    }
                    None => {
                        let base = match op {
                            ArithOp::Mul => MUL,
                            ArithOp::Max if s => SMAX,
                            ArithOp::Max => UMAX,
                            ArithOp::Min if s => SMIN,
                            _ => UMIN,
                        };
                        emit32(cx.out, ptrue(P_ALL, *elem));
                        for k in 0..2 {
                            let b = self.rhs_at(cx, &rhs, k);
                            self.destructive(cx, base, *elem, d.at(k), a.at(k), b);
                        }
                    }
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
                let a = self.v(src1)?;
                let rhs = self.rhs(cx, src2)?;
                self.compare(cx, *cond, *elem, mask, a, &rhs)?;
            }
            Pseudo::Merge {
                elem,
                dst,
                src,
                mask,
            } => {
                let d = self.v(dst)?;
                match mask {
                    Mask::Pred(p) => {
                        let p = self.p(p)?;
                        let rhs = self.rhs(cx, src)?;
                        for k in 0..2 {
                            let s = self.rhs_at(cx, &rhs, k);
                            emit32(cx.out, sel(*elem, d.at(k), p.at(k), s, d.at(k)));
                        }
                    }
                    Mask::Vector(m) => {
                        let m = self.v(m)?;
                        let rhs = self.rhs(cx, src)?;
                        for k in 0..2 {
                            let s = self.rhs_at(cx, &rhs, k);
                            mask::blend_synth(self, cx, d.at(k), s, m.at(k), Z_TMP2)?;
                        }
                    }
                }
            }
            Pseudo::MaskJump {
                elem,
                mask,
                when,
                target,
            } => self.mask_jump(cx, *elem, mask, *when, *target)?,
        }
        Ok(())
    }
}
