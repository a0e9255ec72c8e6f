//! AVX-512 backend at one, two or four `zmm` registers per logical vector.
//!
//! Predicate masks live in opmask registers `k1`–`k5`; `k0` cannot be used
//! as a write mask, `k6` receives compares that feed a vector-held mask and
//! `k7` accumulates mask-jump folds. `zmm30`/`zmm31` hold broadcast
//! constants and shift counts.
//!
//! AVX-512BW has no byte multiply and no byte shifts. Immediate byte shifts
//! are synthesized from word shifts and a broadcast lane mask; byte
//! multiplies and register-count byte shifts are emulated.

use crate::backend::{sealed::Lower, Backend, Cx, Operands, Reserved};
use crate::emulate::{self, LaneOp, LaneSrc, ScalarIsa};
use crate::error::{BackendName, Fault};
use crate::ir::*;
use crate::mask;
use crate::mem::{classify, Mem, Plan, Quantum};
use crate::width::{PhysList, Shape};
use crate::x86::{
    self, evex, evex_imm, vex, Op, Rm, MAP_0F, MAP_0F38, MAP_0F3A, PP_66, PP_F2, PP_F3, PP_NONE,
    R_ADDR, R_T0,
};

const Z_TMP: u8 = 30;
const Z_TMP2: u8 = 31;
/// Compare target for vector-held masks.
const K_CMP: u8 = 6;
/// Mask-jump accumulator.
const K_ACC: u8 = 7;

/// Byte offsets of the sub-registers of a logical vector.
const SLOTS: [i64; 4] = [0, 64, 128, 192];

const VMOVDQU64: Op = Op::new(MAP_0F, PP_F3, true, 0x6F);
const VMOVDQU64_STORE: Op = Op::new(MAP_0F, PP_F3, true, 0x7F);
const VPTERNLOGQ: Op = Op::new(MAP_0F3A, PP_66, true, 0x25);
const VPANDQ: Op = Op::new(MAP_0F, PP_66, true, 0xDB);
const VPXORQ: Op = Op::new(MAP_0F, PP_66, true, 0xEF);
const VPSUBB: Op = Op::new(MAP_0F, PP_66, false, 0xF8);
const VPBROADCASTB: Op = Op::new(MAP_0F38, PP_66, false, 0x7A);
const VPBROADCASTW: Op = Op::new(MAP_0F38, PP_66, false, 0x7B);
const VPSHIFTW_IMM: Op = Op::new(MAP_0F, PP_66, false, 0x71);
const VPMOVB2M: Op = Op::new(MAP_0F38, PP_F3, false, 0x29);
const KORQ: Op = Op::new(MAP_0F, PP_NONE, true, 0x45);
const KANDQ: Op = Op::new(MAP_0F, PP_NONE, true, 0x41);

/// AVX-512 with `N` `zmm` registers per logical vector (1, 2 or 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Avx512<const N: usize> {
    _priv: (),
}

/// 512-bit logical registers.
pub type Avx512x1 = Avx512<1>;
/// 1024-bit logical registers.
pub type Avx512x2 = Avx512<2>;
/// 2048-bit logical registers.
pub type Avx512x4 = Avx512<4>;

macro_rules! ratios {
    ($($n:literal),*) => {$(
        impl Avx512<$n> {
            /// Create the backend.
            pub const fn new() -> Self {
                Self { _priv: () }
            }
        }

        impl Default for Avx512<$n> {
            fn default() -> Self {
                Self::new()
            }
        }
    )*};
}

ratios!(1, 2, 4);

impl<const N: usize> Backend for Avx512<N> {
    const NAME: BackendName = match N {
        1 => BackendName::Avx512x1,
        2 => BackendName::Avx512x2,
        _ => BackendName::Avx512x4,
    };

    fn shape(&self) -> Shape {
        Shape {
            native_bits: 512,
            ratio: N as u8,
            vector_regs: 32,
            pred_regs: 8,
        }
    }

    fn reserved(&self) -> Reserved {
        Reserved {
            vector: &[Z_TMP, Z_TMP2],
            pred: &[0, K_CMP, K_ACC],
            gpr: x86::GPR_RESERVED,
        }
    }

    /// ×1: `[n]`; ×2: `[n, n+16]`; ×4: `[n, n+8, n+16, n+24]`.
    fn default_vector(&self, id: u8) -> Option<PhysList> {
        match N {
            1 => (id <= 29).then(|| PhysList::new(&[id])),
            2 => (id <= 13).then(|| PhysList::new(&[id, id + 16])),
            _ => (id <= 5).then(|| PhysList::new(&[id, id + 8, id + 16, id + 24])),
        }
    }

    /// ×1: `[k(n+1)]`; ×2: `[k(2n+1), k(2n+2)]`; ×4: `[k1..k4]`.
    fn default_pred(&self, id: u8) -> Option<PhysList> {
        match N {
            1 => (id <= 4).then(|| PhysList::new(&[id + 1])),
            2 => (id <= 1).then(|| PhysList::new(&[2 * id + 1, 2 * id + 2])),
            _ => (id == 0).then(|| PhysList::new(&[1, 2, 3, 4])),
        }
    }
}

// ── Opcode selection ────────────────────────────────────────────────────

fn arith_op(op: ArithOp, elem: Elem) -> Op {
    let h = !elem.is_byte();
    let s = elem.is_signed();
    let pick = |b: u8, w: u8| if h { w } else { b };
    let (map, code) = match op {
        ArithOp::Add => (MAP_0F, pick(0xFC, 0xFD)),
        ArithOp::Sub => (MAP_0F, pick(0xF8, 0xF9)),
        ArithOp::AddSat if s => (MAP_0F, pick(0xEC, 0xED)),
        ArithOp::AddSat => (MAP_0F, pick(0xDC, 0xDD)),
        ArithOp::SubSat if s => (MAP_0F, pick(0xE8, 0xE9)),
        ArithOp::SubSat => (MAP_0F, pick(0xD8, 0xD9)),
        // Byte multiplies never reach here.
        ArithOp::Mul => (MAP_0F, 0xD5),
        ArithOp::Max => match (h, s) {
            (false, false) => (MAP_0F, 0xDE),
            (false, true) => (MAP_0F38, 0x3C),
            (true, false) => (MAP_0F38, 0x3E),
            (true, true) => (MAP_0F, 0xEE),
        },
        ArithOp::Min => match (h, s) {
            (false, false) => (MAP_0F, 0xDA),
            (false, true) => (MAP_0F38, 0x38),
            (true, false) => (MAP_0F38, 0x3A),
            (true, true) => (MAP_0F, 0xEA),
        },
    };
    Op::new(map, PP_66, false, code)
}

fn logic_op(op: LogicOp) -> Op {
    let code = match op {
        LogicOp::And => 0xDB,
        // vpandnq computes !src1 & src2.
        LogicOp::AndNot => 0xDF,
        LogicOp::Or => 0xEB,
        LogicOp::Xor => 0xEF,
    };
    Op::new(MAP_0F, PP_66, true, code)
}

/// `vpsllvw`/`vpsrlvw`/`vpsravw`
fn variable_shift_op(op: ShiftOp, elem: Elem) -> Op {
    let code = match (op, elem.is_signed()) {
        (ShiftOp::Shl, _) => 0x12,
        (ShiftOp::Shr, false) => 0x10,
        (ShiftOp::Shr, true) => 0x11,
    };
    Op::new(MAP_0F38, PP_66, true, code)
}

/// ModR/M digit of `vpsllw`/`vpsrlw`/`vpsraw` by immediate.
fn imm_shift_digit(op: ShiftOp, signed: bool) -> u8 {
    match (op, signed) {
        (ShiftOp::Shl, _) => 6,
        (ShiftOp::Shr, false) => 2,
        (ShiftOp::Shr, true) => 4,
    }
}

/// `vpcmp{,u}{b,w}` and its predicate immediate.
fn cmp_op(cond: Cond, elem: Elem) -> (Op, u8) {
    let code = if elem.is_signed() { 0x3F } else { 0x3E };
    let pred = match cond {
        Cond::Eq => 0,
        Cond::Lt => 1,
        Cond::Le => 2,
        Cond::Ne => 4,
        Cond::Ge => 5,
        Cond::Gt => 6,
    };
    (Op::new(MAP_0F3A, PP_66, !elem.is_byte(), code), pred)
}

/// Second operand per sub-register: a register, or memory read in place.
#[derive(Clone, Copy)]
enum Rhs {
    Reg(PhysList),
    Mem(Mem),
}

impl Rhs {
    fn at(&self, k: usize) -> Rm {
        match self {
            Rhs::Reg(p) => Rm::Reg(p.at(k)),
            Rhs::Mem(m) => Rm::Mem(m.offset(SLOTS[k])),
        }
    }
}

impl<const N: usize> Avx512<N> {
    /// Resolve a memory operand covering all `N` slots.
    fn address(&self, cx: &mut Cx<'_>, m: &Mem) -> Result<Mem, Fault> {
        x86::check_mem(m)?;
        match classify(Quantum::X86Disp32, m, &SLOTS[..N])? {
            Plan::Inline => Ok(*m),
            Plan::Materialize => {
                x86::materialize(cx.out, R_ADDR, m);
                Ok(Mem::base(Gpr(R_ADDR)))
            }
        }
    }

    fn rhs(&self, cx: &mut Cx<'_>, src: &Src) -> Result<Rhs, Fault> {
        Ok(match src {
            Src::Reg(r) => Rhs::Reg(self.v(r)?),
            Src::Mem(m) => Rhs::Mem(self.address(cx, m)?),
        })
    }

    fn copy(&self, cx: &mut Cx<'_>, d: PhysList, s: PhysList) {
        for k in 0..N {
            if d.at(k) != s.at(k) {
                evex(cx.out, VMOVDQU64, d.at(k), 0, Rm::Reg(s.at(k)), 0);
            }
        }
    }

    /// Broadcast the low byte or word of `value` into `zd` through `r8`.
    fn splat(&self, cx: &mut Cx<'_>, word: bool, zd: u8, value: u32) {
        x86::mov_imm32(cx.out, R_T0, value);
        let op = if word { VPBROADCASTW } else { VPBROADCASTB };
        evex(cx.out, op, zd, 0, Rm::Reg(R_T0), 0);
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
        let lane = match op {
            ShiftOp::Shl => LaneOp::Shl,
            ShiftOp::Shr => LaneOp::Shr,
        };
        match count {
            Count::Imm(c) => {
                let n = c % elem.bits();
                if n == 0 {
                    self.copy(cx, d, s);
                } else if elem.is_byte() {
                    self.byte_shift_imm(cx, op, elem.is_signed(), d, s, n);
                } else {
                    let digit = imm_shift_digit(op, elem.is_signed());
                    for k in 0..N {
                        evex_imm(cx.out, VPSHIFTW_IMM, digit, d.at(k), Rm::Reg(s.at(k)), n as u8);
                    }
                }
            }
            Count::Gpr(r) if !elem.is_byte() => {
                x86::check_gpr("count", *r)?;
                x86::mov32(cx.out, R_T0, r.0);
                x86::and_imm8(cx.out, R_T0, 15);
                evex(cx.out, VPBROADCASTW, Z_TMP, 0, Rm::Reg(R_T0), 0);
                let vop = variable_shift_op(op, elem);
                for k in 0..N {
                    evex(cx.out, vop, d.at(k), s.at(k), Rm::Reg(Z_TMP), 0);
                }
            }
            Count::Lanes(c) if !elem.is_byte() => {
                // Variable word shifts saturate instead of wrapping.
                let rhs = self.rhs(cx, c)?;
                self.splat(cx, true, Z_TMP2, 15);
                let vop = variable_shift_op(op, elem);
                for k in 0..N {
                    evex(cx.out, VPANDQ, Z_TMP, Z_TMP2, rhs.at(k), 0);
                    evex(cx.out, vop, d.at(k), s.at(k), Rm::Reg(Z_TMP), 0);
                }
            }
            Count::Gpr(r) => {
                emulate::run(self, cx, lane, elem, d, s, LaneSrc::Gpr(*r))?;
            }
            Count::Lanes(c) => {
                let b = LaneSrc::from_src(self, c)?;
                emulate::run(self, cx, lane, elem, d, s, b)?;
            }
        }
        Ok(())
    }

    /// Word shift, then clear the bits that crossed a byte boundary. A
    /// signed right shift sign-extends with `(x ^ m) - m`, `m = 0x80 >> n`.
    fn byte_shift_imm(&self, cx: &mut Cx<'_>, op: ShiftOp, signed: bool, d: PhysList, s: PhysList, n: u32) {
        let keep = match op {
            ShiftOp::Shl => (0xFFu32 << n) & 0xFF,
            ShiftOp::Shr => 0xFF >> n,
        };
        let sign_fix = op == ShiftOp::Shr && signed;
        self.splat(cx, false, Z_TMP2, keep);
        if sign_fix {
            self.splat(cx, false, Z_TMP, 0x80 >> n);
        }
        let digit = imm_shift_digit(op, false);
        for k in 0..N {
            let dk = d.at(k);
            evex_imm(cx.out, VPSHIFTW_IMM, digit, dk, Rm::Reg(s.at(k)), n as u8);
            evex(cx.out, VPANDQ, dk, dk, Rm::Reg(Z_TMP2), 0);
            if sign_fix {
                evex(cx.out, VPXORQ, dk, dk, Rm::Reg(Z_TMP), 0);
                evex(cx.out, VPSUBB, dk, dk, Rm::Reg(Z_TMP), 0);
            }
        }
    }

    fn mask_jump(&self, cx: &mut Cx<'_>, elem: Elem, m: &Mask, when: MaskCond, target: Label) -> Result<(), Fault> {
        let fold = match when {
            MaskCond::None => KORQ,
            MaskCond::Full => KANDQ,
        };
        // kortestq, or kortestd when only 32 word lanes exist.
        let (test, result) = match m {
            Mask::Pred(p) => {
                let parts = self.p(p)?;
                let f = mask::fold(parts.as_slice(), K_ACC);
                for &(d, a, b) in &f.steps {
                    vex(cx.out, fold, true, d, a, b);
                }
                let pp = if elem.is_byte() { PP_NONE } else { PP_66 };
                (Op::new(MAP_0F, pp, true, 0x98), f.result)
            }
            Mask::Vector(v) => {
                let parts = self.v(v)?;
                evex(cx.out, VPMOVB2M, K_ACC, 0, Rm::Reg(parts.at(0)), 0);
                for k in 1..N {
                    evex(cx.out, VPMOVB2M, K_CMP, 0, Rm::Reg(parts.at(k)), 0);
                    vex(cx.out, fold, true, K_ACC, K_ACC, K_CMP);
                }
                (Op::new(MAP_0F, PP_NONE, true, 0x98), K_ACC)
            }
        };
        vex(cx.out, test, false, result, 0, result);
        // jz when nothing is set, jc when everything is.
        let jcc = match when {
            MaskCond::None => 0x84,
            MaskCond::Full => 0x82,
        };
        cx.out.bytes(&[0x0F, jcc]);
        cx.out.rel32(target);
        Ok(())
    }
}

impl<const N: usize> ScalarIsa for Avx512<N> {
    const QUANTUM: Quantum = Quantum::X86Disp32;
    const ADDR: [u8; 2] = [R_ADDR, x86::R_ADDR2];
    const TMP: [u8; 2] = [R_T0, x86::R_T1];

    fn check_mem(&self, m: &Mem) -> Result<(), Fault> {
        x86::check_mem(m)
    }

    fn set_addr(&self, cx: &mut Cx<'_>, rd: u8, m: &Mem) -> Result<(), Fault> {
        x86::materialize(cx.out, rd, m);
        Ok(())
    }

    fn load_lane(&self, cx: &mut Cx<'_>, rt: u8, m: &Mem, elem: Elem, signed: bool) {
        x86::load_lane(cx.out, rt, m, elem, signed);
    }

    fn store_lane(&self, cx: &mut Cx<'_>, rt: u8, m: &Mem, elem: Elem) {
        x86::store_lane(cx.out, rt, m, elem);
    }

    fn lane_op(&self, cx: &mut Cx<'_>, op: LaneOp, elem: Elem, rd: u8, rb: u8) {
        let pp = match op {
            LaneOp::Mul => {
                x86::imul(cx.out, rd, rb);
                return;
            }
            LaneOp::Shl => PP_66,
            LaneOp::Shr if elem.is_signed() => PP_F3,
            LaneOp::Shr => PP_F2,
        };
        x86::and_imm8(cx.out, rb, (elem.bits() - 1) as i8);
        x86::shiftx(cx.out, pp, rd, rd, rb);
    }

    fn move_gpr(&self, cx: &mut Cx<'_>, rd: u8, rs: Gpr) -> Result<(), Fault> {
        x86::check_gpr("count", rs)?;
        x86::mov32(cx.out, rd, rs.0);
        Ok(())
    }
}

impl<const N: usize> Lower for Avx512<N> {
    fn lower(&self, cx: &mut Cx<'_>, op: &Pseudo) -> Result<(), Fault> {
        match op {
            Pseudo::Move { dst, src } => {
                let d = self.v(dst)?;
                match self.rhs(cx, src)? {
                    Rhs::Reg(s) => self.copy(cx, d, s),
                    rhs @ Rhs::Mem(_) => {
                        for k in 0..N {
                            evex(cx.out, VMOVDQU64, d.at(k), 0, rhs.at(k), 0);
                        }
                    }
                }
            }
            Pseudo::Store { src, mem } => {
                let s = self.v(src)?;
                let m = self.address(cx, mem)?;
                for k in 0..N {
                    evex(cx.out, VMOVDQU64_STORE, s.at(k), 0, Rm::Mem(m.offset(SLOTS[k])), 0);
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
                for k in 0..N {
                    evex(cx.out, logic_op(*op), d.at(k), a.at(k), rhs.at(k), 0);
                }
            }
            Pseudo::Not { dst, src } => {
                let (d, s) = (self.v(dst)?, self.v(src)?);
                for k in 0..N {
                    evex_imm(cx.out, VPTERNLOGQ, d.at(k), s.at(k), Rm::Reg(s.at(k)), 0x55);
                }
            }
            Pseudo::Arith {
                op: ArithOp::Mul,
                elem,
                dst,
                src1,
                src2,
            } if elem.is_byte() => {
                let (d, a) = (self.v(dst)?, self.v(src1)?);
                let b = LaneSrc::from_src(self, src2)?;
                emulate::run(self, cx, LaneOp::Mul, *elem, d, a, b)?;
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
                let aop = arith_op(*op, *elem);
                for k in 0..N {
                    evex(cx.out, aop, d.at(k), a.at(k), rhs.at(k), 0);
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
                let (cop, pred) = cmp_op(*cond, *elem);
                match mask {
                    Mask::Pred(p) => {
                        let kd = self.p(p)?;
                        let rhs = self.rhs(cx, src2)?;
                        for k in 0..N {
                            evex_imm(cx.out, cop, kd.at(k), a.at(k), rhs.at(k), pred);
                        }
                    }
                    Mask::Vector(v) => {
                        let d = self.v(v)?;
                        let rhs = self.rhs(cx, src2)?;
                        // vpmovm2b / vpmovm2w
                        let expand = Op::new(MAP_0F38, PP_F3, !elem.is_byte(), 0x28);
                        for k in 0..N {
                            evex_imm(cx.out, cop, K_CMP, a.at(k), rhs.at(k), pred);
                            evex(cx.out, expand, d.at(k), 0, Rm::Reg(K_CMP), 0);
                        }
                    }
                }
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
                        let m = self.p(p)?;
                        let rhs = self.rhs(cx, src)?;
                        // vpblendmb / vpblendmw: k ? rm : vvvv
                        let blend = Op::new(MAP_0F38, PP_66, !elem.is_byte(), 0x66);
                        for k in 0..N {
                            evex(cx.out, blend, d.at(k), d.at(k), rhs.at(k), m.at(k));
                        }
                    }
                    Mask::Vector(v) => {
                        let m = self.v(v)?;
                        let rhs = self.rhs(cx, src)?;
                        // 0xB8: B ? C : A with A = dst, B = mask, C = src.
                        for k in 0..N {
                            evex_imm(cx.out, VPTERNLOGQ, d.at(k), m.at(k), rhs.at(k), 0xB8);
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
