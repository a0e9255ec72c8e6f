//! Shared POWER support for the VMX and VSX backends.
//!
//! Both backends operate on the 32 AltiVec registers (`v0`–`v31`, which VSX
//! addresses as `vs32`–`vs63`), so lane arithmetic, shifts and compares use
//! the same VX/VC/VA-form instructions. They differ in how memory is
//! reached, which logic and select forms are used, and whether a GPR can be
//! moved into a vector register; those hooks are the [`VectorUnit`] trait.
//!
//! Reserved GPRs: `r9`/`r10` (scalar lane temporaries), `r11` (address)
//! and `r12` (offset or second address). `r0` reads as literal zero in
//! every base-register position and is rejected as a base.

use alloc::format;

use crate::backend::{Cx, Operand2, Operands};
use crate::emulate::{self, LaneOp, LaneSrc, ScalarIsa};
use crate::error::Fault;
use crate::ir::*;
use crate::mask;
use crate::mem::{split_hi_lo, Mem};
use crate::stream::{CodeStream, FixupKind};
use crate::width::PhysList;

pub(crate) const R_T0: u8 = 9;
pub(crate) const R_T1: u8 = 10;
pub(crate) const R_ADDR: u8 = 11;
pub(crate) const R_OFF: u8 = 12;
pub(crate) const GPR_RESERVED: &[u8] = &[R_T0, R_T1, R_ADDR, R_OFF];

pub(crate) const V_TMP: u8 = 30;
pub(crate) const V_TMP2: u8 = 31;

/// CR6 bit set by a recording compare when every element compared true.
const CR6_ALL: u32 = 24;
/// CR6 bit set when no element compared true.
const CR6_NONE: u32 = 26;

#[inline]
fn r(n: u8) -> u32 {
    n as u32
}

// ── Vector forms ────────────────────────────────────────────────────────

/// VX-form: `4 | VRT | VRA | VRB | XO(11)`
#[inline]
pub(crate) fn vx(xo: u32, vd: u8, va: u8, vb: u8) -> u32 {
    (4 << 26) | (r(vd) << 21) | (r(va) << 16) | (r(vb) << 11) | xo
}

/// VC-form compare; `rc` records the all/none summary in CR6.
#[inline]
pub(crate) fn vc(xo: u32, vd: u8, va: u8, vb: u8, rc: bool) -> u32 {
    vx(xo, vd, va, vb) | ((rc as u32) << 10)
}

/// VA-form: `4 | VRT | VRA | VRB | VRC | XO(6)`
#[inline]
pub(crate) fn va(xo: u32, vd: u8, va: u8, vb: u8, vc: u8) -> u32 {
    (4 << 26) | (r(vd) << 21) | (r(va) << 16) | (r(vb) << 11) | (r(vc) << 6) | xo
}

pub(crate) const VAND: u32 = 1028;
pub(crate) const VANDC: u32 = 1092;
pub(crate) const VOR: u32 = 1156;
pub(crate) const VXOR: u32 = 1220;
pub(crate) const VNOR: u32 = 1284;
const VSPLTISB: u32 = 780;
const VSPLTISH: u32 = 844;
const VMLADDUHM: u32 = 34;
pub(crate) const VSEL: u32 = 42;
const VCMPEQUB: u32 = 6;

/// `vspltisb`/`vspltish VRT, SIMM`
#[inline]
fn vsplti(elem: Elem, vd: u8, simm: i8) -> u32 {
    let xo = if elem.is_byte() { VSPLTISB } else { VSPLTISH };
    vx(xo, vd, (simm as u8) & 0x1F, 0)
}

fn arith_xo(op: ArithOp, elem: Elem) -> u32 {
    let h = !elem.is_byte();
    let s = elem.is_signed();
    let pick = |b: u32, hw: u32| if h { hw } else { b };
    match op {
        ArithOp::Add => pick(0, 64),
        ArithOp::Sub => pick(1024, 1088),
        ArithOp::AddSat if s => pick(768, 832),
        ArithOp::AddSat => pick(512, 576),
        ArithOp::SubSat if s => pick(1792, 1856),
        ArithOp::SubSat => pick(1536, 1600),
        ArithOp::Max if s => pick(258, 322),
        ArithOp::Max => pick(2, 66),
        ArithOp::Min if s => pick(770, 834),
        ArithOp::Min => pick(514, 578),
        // Multiplies have no single VX form.
        ArithOp::Mul => 0,
    }
}

fn shift_xo(op: ShiftOp, elem: Elem) -> u32 {
    let h = !elem.is_byte();
    match (op, elem.is_signed()) {
        (ShiftOp::Shl, _) => if h { 324 } else { 260 },
        (ShiftOp::Shr, false) => if h { 580 } else { 516 },
        (ShiftOp::Shr, true) => if h { 836 } else { 772 },
    }
}

/// `vcmpequ{b,h}` and `vcmpgt{u,s}{b,h}`.
pub(crate) fn cmp_xo(gt: bool, elem: Elem) -> u32 {
    let h = !elem.is_byte();
    match (gt, elem.is_signed()) {
        (false, _) => if h { 70 } else { 6 },
        (true, false) => if h { 582 } else { 518 },
        (true, true) => if h { 838 } else { 774 },
    }
}

// ── GPR forms ───────────────────────────────────────────────────────────

#[inline]
fn d_form(opcd: u32, rt: u8, ra: u8, d: u16) -> u32 {
    (opcd << 26) | (r(rt) << 21) | (r(ra) << 16) | d as u32
}

#[inline]
fn x_form(xo: u32, rt: u8, ra: u8, rb: u8) -> u32 {
    (31 << 26) | (r(rt) << 21) | (r(ra) << 16) | (r(rb) << 11) | (xo << 1)
}

#[inline]
pub(crate) fn addi(rt: u8, ra: u8, si: i16) -> u32 {
    d_form(14, rt, ra, si as u16)
}

#[inline]
fn addis(rt: u8, ra: u8, si: i16) -> u32 {
    d_form(15, rt, ra, si as u16)
}

#[inline]
fn ori(ra: u8, rs: u8, ui: u16) -> u32 {
    d_form(24, rs, ra, ui)
}

#[inline]
fn add(rt: u8, ra: u8, rb: u8) -> u32 {
    x_form(266, rt, ra, rb)
}

/// `sldi RA, RS, sh` (`rldicr RA, RS, sh, 63 - sh`)
fn sldi(ra: u8, rs: u8, sh: u32) -> u32 {
    let me = 63 - sh;
    (30 << 26)
        | (r(rs) << 21)
        | (r(ra) << 16)
        | ((sh & 0x1F) << 11)
        | ((((me & 0x1F) << 1) | (me >> 5)) << 5)
        | (1 << 2)
        | ((sh >> 5) << 1)
}

/// `lvx`/`stvx VRT, RA, RB`
#[inline]
pub(crate) fn lvx(vt: u8, ra: u8, rb: u8) -> u32 {
    x_form(103, vt, ra, rb)
}

#[inline]
pub(crate) fn stvx(vs: u8, ra: u8, rb: u8) -> u32 {
    x_form(231, vs, ra, rb)
}

/// `bc 12, BI, 0`, patched by the linker.
#[inline]
fn bc_true(bi: u32) -> u32 {
    (16 << 26) | (12 << 21) | (bi << 16)
}

#[inline]
pub(crate) fn emit32(out: &mut CodeStream, word: u32) {
    out.word(word);
}

/// `li` or `lis` + `ori`; POWER constants reach 32 bits signed.
pub(crate) fn load_const(out: &mut CodeStream, rd: u8, value: i64) -> Result<(), Fault> {
    if let Ok(v) = i16::try_from(value) {
        emit32(out, addi(rd, 0, v));
        return Ok(());
    }
    let v = i32::try_from(value)
        .map_err(|_| Fault::unrepresentable(value, "lis/ori reach only 32-bit signed values"))?;
    let (hi, lo) = split_hi_lo(v);
    emit32(out, addis(rd, 0, hi as i16));
    if lo != 0 {
        emit32(out, ori(rd, rd, lo));
    }
    Ok(())
}

/// `rd = ra + disp` with `addi`, or `addis` + `addi` for 32-bit reach.
///
/// The top `0x8000` of the i32 range needs a high half of `0x8000`, which
/// `addis` cannot encode; there the high half stops at `0x7FFF` and the
/// remainder takes extra `addi` steps.
fn add_disp(out: &mut CodeStream, rd: u8, ra: u8, disp: i64) -> Result<(), Fault> {
    if let Ok(d) = i16::try_from(disp) {
        if d != 0 || rd != ra {
            emit32(out, addi(rd, ra, d));
        }
        return Ok(());
    }
    let disp32 = i32::try_from(disp)
        .map_err(|_| Fault::unrepresentable(disp, "addis/addi reach only 32-bit signed offsets"))?;
    let hi = ((i64::from(disp32) + 0x8000) >> 16).min(i64::from(i16::MAX)) as i16;
    emit32(out, addis(rd, ra, hi));
    let mut rest = disp - (i64::from(hi) << 16);
    while rest != 0 {
        let step = rest.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16;
        emit32(out, addi(rd, rd, step));
        rest -= i64::from(step);
    }
    Ok(())
}

/// Validate a memory operand: `r0` and the reserved temporaries cannot be
/// a base, reserved temporaries cannot be an index.
pub(crate) fn check_mem(m: &Mem) -> Result<(), Fault> {
    if m.base.0 > 31 {
        return Err(Fault::role(format!("base r{} out of range", m.base.0)));
    }
    if m.base.0 == 0 {
        return Err(Fault::role("r0 reads as zero in a base position"));
    }
    if GPR_RESERVED.contains(&m.base.0) {
        return Err(Fault::role(format!(
            "base r{} is reserved as a temporary",
            m.base.0
        )));
    }
    if let Some((idx, _)) = m.index {
        if idx.0 > 31 || GPR_RESERVED.contains(&idx.0) {
            return Err(Fault::role(format!(
                "index r{} is out of range or reserved",
                idx.0
            )));
        }
    }
    Ok(())
}

/// Build `base + (index << shift)` and, with `with_disp`, `+ disp` in `rd`.
/// Returns the register holding the partial address.
pub(crate) fn materialize(
    out: &mut CodeStream,
    rd: u8,
    m: &Mem,
    with_disp: bool,
) -> Result<u8, Fault> {
    let mut cur = m.base.0;
    if let Some((idx, sh)) = m.index {
        if sh == 0 {
            emit32(out, add(rd, m.base.0, idx.0));
        } else {
            emit32(out, sldi(rd, idx.0, sh as u32));
            emit32(out, add(rd, rd, m.base.0));
        }
        cur = rd;
    }
    if with_disp {
        add_disp(out, rd, cur, m.disp)?;
        cur = rd;
    }
    Ok(cur)
}

// ── Scalar lane primitives ──────────────────────────────────────────────

pub(crate) fn scalar_load(out: &mut CodeStream, rt: u8, m: &Mem, elem: Elem, signed: bool) {
    let (ra, d) = (m.base.0, m.disp as u16);
    match (elem.is_byte(), signed) {
        (true, false) => emit32(out, d_form(34, rt, ra, d)), // lbz
        (true, true) => {
            emit32(out, d_form(34, rt, ra, d));
            emit32(out, x_form(954, rt, rt, 0)); // extsb
        }
        (false, false) => emit32(out, d_form(40, rt, ra, d)), // lhz
        (false, true) => emit32(out, d_form(42, rt, ra, d)),  // lha
    }
}

pub(crate) fn scalar_store(out: &mut CodeStream, rt: u8, m: &Mem, elem: Elem) {
    let opcd = if elem.is_byte() { 38 } else { 44 }; // stb / sth
    emit32(out, d_form(opcd, rt, m.base.0, m.disp as u16));
}

pub(crate) fn scalar_op(out: &mut CodeStream, op: LaneOp, elem: Elem, rd: u8, rb: u8) {
    let xo = match op {
        LaneOp::Mul => {
            emit32(out, x_form(235, rd, rd, rb)); // mullw
            return;
        }
        LaneOp::Shl => 24,
        LaneOp::Shr if elem.is_signed() => 792,
        LaneOp::Shr => 536,
    };
    // andi. RB, RB, bits-1
    emit32(out, d_form(28, rb, rb, (elem.bits() - 1) as u16));
    // slw/srw/sraw RD, RD, RB (X-form with RS in the first field)
    emit32(out, x_form(xo, rd, rd, rb));
}

pub(crate) fn check_count(rs: Gpr) -> Result<(), Fault> {
    if rs.0 > 31 || GPR_RESERVED.contains(&rs.0) {
        return Err(Fault::role(format!(
            "count register r{} is out of range or reserved",
            rs.0
        )));
    }
    Ok(())
}

/// `mr rd, rs`
pub(crate) fn scalar_move(out: &mut CodeStream, rd: u8, rs: Gpr) -> Result<(), Fault> {
    check_count(rs)?;
    emit32(out, x_form(444, rs.0, rd, rs.0));
    Ok(())
}

// ── Shared lowering ─────────────────────────────────────────────────────

/// A resolved vector memory operand: slots at `base + disp + 16k`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Addr {
    pub(crate) base: u8,
    pub(crate) disp: i64,
}

/// ISA-specific parts of a POWER vector backend.
pub(crate) trait VectorUnit: ScalarIsa {
    fn address(&self, cx: &mut Cx<'_>, m: &Mem) -> Result<Addr, Fault>;
    fn load(&self, cx: &mut Cx<'_>, vt: u8, a: &Addr, k: usize) -> Result<(), Fault>;
    fn store(&self, cx: &mut Cx<'_>, vs: u8, a: &Addr, k: usize) -> Result<(), Fault>;
    /// `d = a op b`, with `AndNot` meaning `!a & b`.
    fn logic(&self, cx: &mut Cx<'_>, op: LogicOp, d: u8, a: u8, b: u8);
    fn not(&self, cx: &mut Cx<'_>, d: u8, s: u8);
    fn copy(&self, cx: &mut Cx<'_>, d: u8, s: u8);
    /// `d = mask ? incoming : kept`, bitwise.
    fn select(&self, cx: &mut Cx<'_>, d: u8, kept: u8, incoming: u8, mask: u8);
    fn not_equal(&self, cx: &mut Cx<'_>, elem: Elem, d: u8, a: u8, b: u8);
    /// Splat a GPR count into `v30`. Returns `false` when the ISA has no
    /// GPR-to-vector move and the shift must be emulated.
    fn splat_count(&self, cx: &mut Cx<'_>, elem: Elem, r: Gpr) -> Result<bool, Fault>;
    /// One step of the mask-jump fold: `vor`/`vand` or their VSX forms.
    fn combine(&self, cx: &mut Cx<'_>, when: MaskCond, d: u8, a: u8, b: u8);
}

enum Rhs {
    Reg(PhysList),
    Mem(Addr),
}

fn rhs<U: VectorUnit>(u: &U, cx: &mut Cx<'_>, src: &Src) -> Result<Rhs, Fault> {
    Ok(match Operand2::resolve(u, src)? {
        Operand2::Reg(p) => Rhs::Reg(p),
        Operand2::Mem(m) => Rhs::Mem(u.address(cx, &m)?),
    })
}

fn rhs_at<U: VectorUnit>(u: &U, cx: &mut Cx<'_>, rhs: &Rhs, k: usize) -> Result<u8, Fault> {
    match rhs {
        Rhs::Reg(p) => Ok(p.at(k)),
        Rhs::Mem(a) => {
            u.load(cx, V_TMP, a, k)?;
            Ok(V_TMP)
        }
    }
}

pub(crate) fn lower<U: VectorUnit>(u: &U, cx: &mut Cx<'_>, op: &Pseudo) -> Result<(), Fault> {
    match op {
        Pseudo::Move { dst, src } => {
            let d = u.v(dst)?;
            match rhs(u, cx, src)? {
                Rhs::Reg(s) => {
                    for k in 0..2 {
                        if d.at(k) != s.at(k) {
                            u.copy(cx, d.at(k), s.at(k));
                        }
                    }
                }
                Rhs::Mem(a) => {
                    for k in 0..2 {
                        u.load(cx, d.at(k), &a, k)?;
                    }
                }
            }
        }
        Pseudo::Store { src, mem } => {
            let s = u.v(src)?;
            let a = u.address(cx, mem)?;
            for k in 0..2 {
                u.store(cx, s.at(k), &a, k)?;
            }
        }
        Pseudo::Logic {
            op,
            dst,
            src1,
            src2,
        } => {
            let (d, a) = (u.v(dst)?, u.v(src1)?);
            let rhs = rhs(u, cx, src2)?;
            for k in 0..2 {
                let b = rhs_at(u, cx, &rhs, k)?;
                u.logic(cx, *op, d.at(k), a.at(k), b);
            }
        }
        Pseudo::Not { dst, src } => {
            let (d, s) = (u.v(dst)?, u.v(src)?);
            for k in 0..2 {
                u.not(cx, d.at(k), s.at(k));
            }
        }
        Pseudo::Arith {
            op: ArithOp::Mul,
            elem,
            dst,
            src1,
            src2,
        } if elem.is_byte() => {
            let (d, a) = (u.v(dst)?, u.v(src1)?);
            let b = LaneSrc::from_src(u, src2)?;
            emulate::run(u, cx, LaneOp::Mul, *elem, d, a, b)?;
        }
        Pseudo::Arith {
            op,
            elem,
            dst,
            src1,
            src2,
        } => {
            let (d, a) = (u.v(dst)?, u.v(src1)?);
            let rhs = rhs(u, cx, src2)?;
            if *op == ArithOp::Mul {
                // vmladduhm d, a, b, zero
                emit32(cx.out, vsplti(Elem::U8, V_TMP2, 0));
                for k in 0..2 {
                    let b = rhs_at(u, cx, &rhs, k)?;
                    emit32(cx.out, va(VMLADDUHM, d.at(k), a.at(k), b, V_TMP2));
                }
            } else {
                let xo = arith_xo(*op, *elem);
                for k in 0..2 {
                    let b = rhs_at(u, cx, &rhs, k)?;
                    emit32(cx.out, vx(xo, d.at(k), a.at(k), b));
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
            let (d, s) = (u.v(dst)?, u.v(src)?);
            let xo = shift_xo(*op, *elem);
            match count {
                Count::Imm(c) => {
                    let n = c % elem.bits();
                    if n == 0 {
                        for k in 0..2 {
                            if d.at(k) != s.at(k) {
                                u.copy(cx, d.at(k), s.at(k));
                            }
                        }
                    } else {
                        emit32(cx.out, vsplti(*elem, V_TMP, n as i8));
                        for k in 0..2 {
                            emit32(cx.out, vx(xo, d.at(k), s.at(k), V_TMP));
                        }
                    }
                }
                Count::Gpr(g) => {
                    if u.splat_count(cx, *elem, *g)? {
                        for k in 0..2 {
                            emit32(cx.out, vx(xo, d.at(k), s.at(k), V_TMP));
                        }
                    } else {
                        let lane = match op {
                            ShiftOp::Shl => LaneOp::Shl,
                            ShiftOp::Shr => LaneOp::Shr,
                        };
                        emulate::run(u, cx, lane, *elem, d, s, LaneSrc::Gpr(*g))?;
                    }
                }
                Count::Lanes(c) => {
                    // Vector shifts use only the low bits of each count.
                    let rhs = rhs(u, cx, c)?;
                    for k in 0..2 {
                        let c = rhs_at(u, cx, &rhs, k)?;
                        emit32(cx.out, vx(xo, d.at(k), s.at(k), c));
                    }
                }
            }
        }
        Pseudo::Compare {
            cond,
            elem,
            mask,
            src1,
            src2,
        } => {
            let d = u.vector_mask(mask)?;
            let a = u.v(src1)?;
            let rhs = rhs(u, cx, src2)?;
            for k in 0..2 {
                let b = rhs_at(u, cx, &rhs, k)?;
                let (dk, ak) = (d.at(k), a.at(k));
                match cond {
                    Cond::Eq => emit32(cx.out, vc(cmp_xo(false, *elem), dk, ak, b, false)),
                    Cond::Ne => u.not_equal(cx, *elem, dk, ak, b),
                    Cond::Gt => emit32(cx.out, vc(cmp_xo(true, *elem), dk, ak, b, false)),
                    Cond::Lt => emit32(cx.out, vc(cmp_xo(true, *elem), dk, b, ak, false)),
                    // a >= b is !(b > a); a <= b is !(a > b).
                    Cond::Ge => {
                        emit32(cx.out, vc(cmp_xo(true, *elem), dk, b, ak, false));
                        emit32(cx.out, vx(VNOR, dk, dk, dk));
                    }
                    Cond::Le => {
                        emit32(cx.out, vc(cmp_xo(true, *elem), dk, ak, b, false));
                        emit32(cx.out, vx(VNOR, dk, dk, dk));
                    }
                }
            }
        }
        Pseudo::Merge {
            dst, src, mask, ..
        } => {
            let d = u.v(dst)?;
            let m = u.vector_mask(mask)?;
            let rhs = rhs(u, cx, src)?;
            for k in 0..2 {
                let s = rhs_at(u, cx, &rhs, k)?;
                u.select(cx, d.at(k), d.at(k), s, m.at(k));
            }
        }
        Pseudo::MaskJump {
            mask, when, target, ..
        } => {
            let parts = u.vector_mask(mask)?;
            let f = mask::fold(parts.as_slice(), V_TMP);
            for &(d, a, b) in &f.steps {
                u.combine(cx, *when, d, a, b);
            }
            // Mask lanes are all-ones or zero, so "no byte equals zero"
            // means every lane is set.
            emit32(cx.out, vsplti(Elem::U8, V_TMP2, 0));
            emit32(cx.out, vc(VCMPEQUB, V_TMP2, f.result, V_TMP2, true));
            let bi = match when {
                MaskCond::None => CR6_ALL,
                MaskCond::Full => CR6_NONE,
            };
            cx.out.branch_word(bc_true(bi), FixupKind::PpcBd14, *target);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Endian;
    use alloc::vec::Vec;

    fn words(f: impl FnOnce(&mut CodeStream) -> Result<(), Fault>) -> Result<Vec<u32>, Fault> {
        let mut s = CodeStream::new(Endian::Big);
        f(&mut s)?;
        let (bytes, _) = s.link().map_err(|_| Fault::unsupported("link"))?;
        Ok(bytes
            .chunks(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    #[test]
    fn vector_forms() {
        assert_eq!(vx(arith_xo(ArithOp::Add, Elem::U8), 0, 2, 4), 0x10022000); // vaddubm
        assert_eq!(vx(arith_xo(ArithOp::AddSat, Elem::I16), 0, 2, 4), 0x10022340); // vaddshs
        assert_eq!(vx(arith_xo(ArithOp::SubSat, Elem::U16), 0, 2, 4), 0x10022640); // vsubuhs
        assert_eq!(vx(arith_xo(ArithOp::Min, Elem::I8), 0, 2, 4), 0x10022302); // vminsb
        assert_eq!(va(VMLADDUHM, 0, 2, 4, 31), 0x100227E2);
        assert_eq!(vx(shift_xo(ShiftOp::Shr, Elem::I16), 0, 2, 30), 0x1002F344); // vsrah
        assert_eq!(vc(cmp_xo(true, Elem::I16), 6, 2, 0, false), 0x10C20346); // vcmpgtsh
        assert_eq!(vc(VCMPEQUB, 31, 30, 31, true), 0x13FEFC06); // vcmpequb.
        assert_eq!(vsplti(Elem::U16, 30, 15), 0x13CF034C);
        assert_eq!(va(VSEL, 0, 0, 2, 4), 0x1000112A);
    }

    #[test]
    fn gpr_forms() {
        assert_eq!(sldi(11, 4, 2), 0x788B1764);
        assert_eq!(add(11, 3, 4), 0x7D632214);
        assert_eq!(lvx(1, 3, 12), 0x7C2360CE);
        assert_eq!(stvx(0, 0, 3), 0x7C0019CE);
        assert_eq!(bc_true(CR6_NONE), 0x419A0000);
    }

    #[test]
    fn constants_use_li_or_lis_ori() {
        assert_eq!(words(|s| load_const(s, 12, 16)).unwrap(), [0x39800010]);
        assert_eq!(words(|s| load_const(s, 12, -32)).unwrap(), [0x3980FFE0]);
        assert_eq!(
            words(|s| load_const(s, 12, 0x2_0010)).unwrap(),
            [0x3D800002, 0x618C0010]
        );
        assert!(matches!(
            words(|s| load_const(s, 12, 1 << 32)),
            Err(Fault::Unrepresentable { .. })
        ));
    }

    #[test]
    fn materialize_index_and_displacement() {
        let m = Mem::base(Gpr(3)).index(Gpr(4), 2).disp(64);
        assert_eq!(
            words(|s| materialize(s, 11, &m, true).map(|_| ())).unwrap(),
            [0x788B1764, 0x7D6B1A14, 0x396B0040]
        );
    }

    #[test]
    fn materialize_far_displacement_uses_addis() {
        // 0x8000 = (1 << 16) - 0x8000: addis r11, r3, 1; addi r11, r11, -32768
        let m = Mem::base(Gpr(3)).disp(0x8000);
        assert_eq!(
            words(|s| materialize(s, 11, &m, true).map(|_| ())).unwrap(),
            [0x3D630001, 0x396B8000]
        );
        let m = Mem::base(Gpr(3)).disp(-0x8000_0000);
        assert_eq!(
            words(|s| materialize(s, 11, &m, true).map(|_| ())).unwrap(),
            [0x3D638000]
        );
        let m = Mem::base(Gpr(3)).disp(i64::from(i32::MAX) + 1);
        assert!(words(|s| materialize(s, 11, &m, true).map(|_| ())).is_err());
    }

    #[test]
    fn materialize_top_of_i32_range() {
        // addis r11, r3, 0x7FFF ; addi r11, r11, 0x7FFF (x2) ; addi r11, r11, 1
        let m = Mem::base(Gpr(3)).disp(i64::from(i32::MAX));
        assert_eq!(
            words(|s| materialize(s, 11, &m, true).map(|_| ())).unwrap(),
            [0x3D637FFF, 0x396B7FFF, 0x396B7FFF, 0x396B0001]
        );
        // 0x7FFF_8000 would need a high half of 0x8000.
        let m = Mem::base(Gpr(3)).disp(0x7FFF_8000);
        assert_eq!(
            words(|s| materialize(s, 11, &m, true).map(|_| ())).unwrap(),
            [0x3D637FFF, 0x396B7FFF, 0x396B0001]
        );
        // Just below the boundary the two-instruction form still applies.
        let m = Mem::base(Gpr(3)).disp(0x7FFF_7FFF);
        assert_eq!(
            words(|s| materialize(s, 11, &m, true).map(|_| ())).unwrap(),
            [0x3D637FFF, 0x396B7FFF]
        );
    }

    #[test]
    fn scalar_primitives() {
        let at = |d| Mem::base(Gpr(1)).disp(d);
        assert_eq!(
            words(|s| {
                scalar_load(s, 9, &at(64), Elem::I8, true);
                scalar_load(s, 9, &at(66), Elem::U16, false);
                scalar_store(s, 9, &at(64), Elem::U8);
                Ok(())
            })
            .unwrap(),
            [0x89210040, 0x7D290774, 0xA1210042, 0x99210040]
        );
        assert_eq!(
            words(|s| {
                scalar_op(s, LaneOp::Mul, Elem::U8, 9, 10);
                scalar_op(s, LaneOp::Shr, Elem::I16, 9, 10);
                Ok(())
            })
            .unwrap(),
            [0x7D2951D6, 0x714A000F, 0x7D295630]
        );
        assert_eq!(words(|s| scalar_move(s, 10, Gpr(5))).unwrap(), [0x7CAA2B78]);
        assert!(words(|s| scalar_move(s, 10, Gpr(11))).is_err());
    }

    #[test]
    fn r0_base_rejected() {
        assert!(matches!(check_mem(&Mem::base(Gpr(0))), Err(Fault::Role(_))));
        assert!(check_mem(&Mem::base(Gpr(12))).is_err());
        assert!(check_mem(&Mem::base(Gpr(3)).index(Gpr(9), 0)).is_err());
        assert!(check_mem(&Mem::base(Gpr(3)).index(Gpr(4), 3)).is_ok());
    }
}
