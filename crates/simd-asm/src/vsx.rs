//! POWER VSX backend (POWER9): each logical register is a pair of 128-bit
//! VSRs from the upper half of the file (`vs32`–`vs63`, aliasing the VRs).
//!
//! Memory goes through the DQ-form `lxv`/`stxv`, which take any alignment.
//! Logic and select use the XX3/XX4 forms; lane arithmetic shares the VMX
//! encodings.

use crate::backend::{sealed::Lower, Backend, Cx, Reserved};
use crate::emulate::{LaneOp, ScalarIsa};
use crate::error::{BackendName, Fault};
use crate::ir::*;
use crate::mem::{classify, Mem, Plan, Quantum};
use crate::power::{self, emit32, vc, vx, Addr, VectorUnit, R_ADDR, V_TMP};
use crate::stream::Endian;
use crate::width::{PhysList, Shape};

const XXLAND: u32 = 130;
const XXLANDC: u32 = 138;
const XXLOR: u32 = 146;
const XXLXOR: u32 = 154;
const XXLNOR: u32 = 162;

/// XX3-form on `vs32+t`, `vs32+a`, `vs32+b`.
#[inline]
fn xx3(xo: u32, t: u8, a: u8, b: u8) -> u32 {
    (60 << 26)
        | ((t as u32) << 21)
        | ((a as u32) << 16)
        | ((b as u32) << 11)
        | (xo << 3)
        | 0b111
}

/// `xxsel vs32+t, vs32+a, vs32+b, vs32+c`
#[inline]
fn xxsel(t: u8, a: u8, b: u8, c: u8) -> u32 {
    (60 << 26)
        | ((t as u32) << 21)
        | ((a as u32) << 16)
        | ((b as u32) << 11)
        | ((c as u32) << 6)
        | (3 << 4)
        | 0b1111
}

/// `lxv`/`stxv` (DQ-form); `disp` must be a multiple of 16.
#[inline]
fn dq(store: bool, t: u8, ra: u8, disp: i64) -> u32 {
    (61 << 26)
        | ((t as u32) << 21)
        | ((ra as u32) << 16)
        | (disp as u32 & 0xFFF0)
        | (1 << 3)
        | if store { 0b101 } else { 0b001 }
}

/// `mtvsrwz vs32+t, ra`
#[inline]
fn mtvsrwz(t: u8, ra: u8) -> u32 {
    (31 << 26) | ((t as u32) << 21) | ((ra as u32) << 16) | (243 << 1) | 1
}

/// VSX, 256-bit logical registers as VSR pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsxPair {
    order: Endian,
}

impl VsxPair {
    /// Create the backend emitting words in `order`.
    pub const fn new(order: Endian) -> Self {
        Self { order }
    }
}

impl Default for VsxPair {
    fn default() -> Self {
        Self::new(Endian::Little)
    }
}

impl Backend for VsxPair {
    const NAME: BackendName = BackendName::VsxPair;

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
            vector: &[power::V_TMP, power::V_TMP2],
            pred: &[],
            gpr: power::GPR_RESERVED,
        }
    }

    /// `v{n}` maps to `[vs32+2n, vs32+2n+1]`; physical numbers count from
    /// `vs32`.
    fn default_vector(&self, id: u8) -> Option<PhysList> {
        (id <= 14).then(|| PhysList::new(&[2 * id, 2 * id + 1]))
    }

    fn byte_order(&self) -> Endian {
        self.order
    }
}

impl VectorUnit for VsxPair {
    fn address(&self, cx: &mut Cx<'_>, m: &Mem) -> Result<Addr, Fault> {
        power::check_mem(m)?;
        match classify(Quantum::PpcDq, m, &[0, 16])? {
            Plan::Inline => Ok(Addr {
                base: m.base.0,
                disp: m.disp,
            }),
            Plan::Materialize => {
                let base = power::materialize(cx.out, R_ADDR, m, true)?;
                Ok(Addr { base, disp: 0 })
            }
        }
    }

    fn load(&self, cx: &mut Cx<'_>, vt: u8, a: &Addr, k: usize) -> Result<(), Fault> {
        emit32(cx.out, dq(false, vt, a.base, a.disp + 16 * k as i64));
        Ok(())
    }

    fn store(&self, cx: &mut Cx<'_>, vs: u8, a: &Addr, k: usize) -> Result<(), Fault> {
        emit32(cx.out, dq(true, vs, a.base, a.disp + 16 * k as i64));
        Ok(())
    }

    fn logic(&self, cx: &mut Cx<'_>, op: LogicOp, d: u8, a: u8, b: u8) {
        let w = match op {
            LogicOp::And => xx3(XXLAND, d, a, b),
            LogicOp::AndNot => xx3(XXLANDC, d, b, a),
            LogicOp::Or => xx3(XXLOR, d, a, b),
            LogicOp::Xor => xx3(XXLXOR, d, a, b),
        };
        emit32(cx.out, w);
    }

    fn not(&self, cx: &mut Cx<'_>, d: u8, s: u8) {
        emit32(cx.out, xx3(XXLNOR, d, s, s));
    }

    fn copy(&self, cx: &mut Cx<'_>, d: u8, s: u8) {
        emit32(cx.out, xx3(XXLOR, d, s, s));
    }

    fn select(&self, cx: &mut Cx<'_>, d: u8, kept: u8, incoming: u8, mask: u8) {
        emit32(cx.out, xxsel(d, kept, incoming, mask));
    }

    /// POWER9 `vcmpneb`/`vcmpneh`.
    fn not_equal(&self, cx: &mut Cx<'_>, elem: Elem, d: u8, a: u8, b: u8) {
        let xo = if elem.is_byte() { 7 } else { 71 };
        emit32(cx.out, vc(xo, d, a, b, false));
    }

    fn splat_count(&self, cx: &mut Cx<'_>, elem: Elem, r: Gpr) -> Result<bool, Fault> {
        power::check_count(r)?;
        emit32(cx.out, mtvsrwz(V_TMP, r.0));
        // The count lands in the low-order word of doubleword 0.
        let (xo, uimm) = if elem.is_byte() { (524, 7) } else { (588, 3) };
        emit32(cx.out, vx(xo, V_TMP, uimm, V_TMP));
        Ok(true)
    }

    fn combine(&self, cx: &mut Cx<'_>, when: MaskCond, d: u8, a: u8, b: u8) {
        let xo = match when {
            MaskCond::None => XXLOR,
            MaskCond::Full => XXLAND,
        };
        emit32(cx.out, xx3(xo, d, a, b));
    }
}

impl ScalarIsa for VsxPair {
    const QUANTUM: Quantum = Quantum::PpcD;
    const ADDR: [u8; 2] = [R_ADDR, power::R_OFF];
    const TMP: [u8; 2] = [power::R_T0, power::R_T1];

    fn check_mem(&self, m: &Mem) -> Result<(), Fault> {
        power::check_mem(m)
    }

    fn set_addr(&self, cx: &mut Cx<'_>, rd: u8, m: &Mem) -> Result<(), Fault> {
        power::materialize(cx.out, rd, m, true).map(|_| ())
    }

    fn load_lane(&self, cx: &mut Cx<'_>, rt: u8, m: &Mem, elem: Elem, signed: bool) {
        power::scalar_load(cx.out, rt, m, elem, signed);
    }

    fn store_lane(&self, cx: &mut Cx<'_>, rt: u8, m: &Mem, elem: Elem) {
        power::scalar_store(cx.out, rt, m, elem);
    }

    fn lane_op(&self, cx: &mut Cx<'_>, op: LaneOp, elem: Elem, rd: u8, rb: u8) {
        power::scalar_op(cx.out, op, elem, rd, rb);
    }

    fn move_gpr(&self, cx: &mut Cx<'_>, rd: u8, rs: Gpr) -> Result<(), Fault> {
        power::scalar_move(cx.out, rd, rs)
    }
}

impl Lower for VsxPair {
    fn lower(&self, cx: &mut Cx<'_>, op: &Pseudo) -> Result<(), Fault> {
        power::lower(self, cx, op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulate::Scratch;
    use crate::{GenError, Generator};
    use alloc::vec::Vec;

    fn words_of(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn run(f: impl FnOnce(&mut Generator<VsxPair>) -> Result<(), GenError>) -> Vec<u32> {
        let mut g = Generator::new(VsxPair::default());
        f(&mut g).unwrap();
        words_of(g.finish().unwrap().bytes())
    }

    fn v(n: u8) -> VReg {
        VReg::logical(n)
    }

    #[test]
    fn load_uses_dq_form() {
        let w = run(|g| g.load(v(0), Mem::base(Gpr(3))).map(|_| ()));
        assert_eq!(w, [0xF4030009, 0xF4230019]);
    }

    #[test]
    fn store_scales_displacement() {
        let w = run(|g| g.store(v(0), Mem::base(Gpr(3)).disp(32)).map(|_| ()));
        assert_eq!(w, [0xF403002D, 0xF423003D]);
    }

    #[test]
    fn far_displacement_materializes_into_r11() {
        let w = run(|g| g.load(v(0), Mem::base(Gpr(3)).disp(0x1_0000)).map(|_| ()));
        // addis r11, r3, 1 ; lxv vs32, 0(r11) ; lxv vs33, 16(r11)
        assert_eq!(w, [0x3D630001, 0xF40B0009, 0xF42B0019]);
    }

    #[test]
    fn misaligned_displacement_is_materialized() {
        let w = run(|g| g.load(v(0), Mem::base(Gpr(3)).disp(8)).map(|_| ()));
        // addi r11, r3, 8
        assert_eq!(w, [0x39630008, 0xF40B0009, 0xF42B0019]);
    }

    #[test]
    fn logic_uses_xxl_forms() {
        let w = run(|g| {
            g.and3(v(0), v(1), v(2))?;
            g.andn3(v(0), v(1), v(2))?;
            g.not2(v(0), v(1))?;
            g.mov(v(0), v(1))?;
            Ok(())
        });
        assert_eq!(w[0], 0xF0022417);
        assert_eq!(w[2], 0xF0041457);
        assert_eq!(w[4], 0xF0021517);
        assert_eq!(w[6], 0xF0021497);
    }

    #[test]
    fn xor_form() {
        let w = run(|g| g.xor3(v(0), v(1), v(2)).map(|_| ()));
        assert_eq!(w[0], 0xF00224D7);
    }

    #[test]
    fn merge_is_xxsel() {
        let w = run(|g| g.merge(Elem::I16, v(0), v(1), Mask::Vector(v(2))).map(|_| ()));
        assert_eq!(w[0], 0xF000113F);
    }

    #[test]
    fn compare_ne_is_native() {
        let w = run(|g| {
            g.cmp(Cond::Ne, Elem::U8, Mask::Vector(v(3)), v(0), v(1))?;
            g.cmp(Cond::Ne, Elem::U16, Mask::Vector(v(3)), v(0), v(1))?;
            Ok(())
        });
        assert_eq!(w.len(), 4);
        assert_eq!(w[0], 0x10C01007);
        assert_eq!(w[2], 0x10C01047);
    }

    #[test]
    fn gpr_shift_splats_through_mtvsrwz() {
        let w = run(|g| g.shl3(Elem::U16, v(0), v(1), Count::Gpr(Gpr(5))).map(|_| ()));
        // mtvsrwz vs62, r5 ; vsplth v30, v30, 3 ; vslh v0, v2, v30 ; vslh v1, v3, v30
        assert_eq!(w[..3], [0x7FC501E7, 0x13C3F24C, 0x1002F144]);
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn gpr_shift_count_reserved() {
        let mut g = Generator::new(VsxPair::default());
        let err = g.shr3(Elem::I8, v(0), v(1), Count::Gpr(Gpr(12))).unwrap_err();
        assert!(matches!(err, GenError::OperandRoleViolation { .. }));
    }

    #[test]
    fn mask_jump_folds_with_xxlor() {
        let w = run(|g| {
            let l = g.new_label()?;
            g.mkj(Elem::U8, Mask::Vector(v(1)), MaskCond::None, l)?;
            g.bind(l)?;
            Ok(())
        });
        // xxlor vs62, vs34, vs35 ; vspltisb v31, 0 ; vcmpequb. v31, v30, v31 ; bc 12, 24, +4
        assert_eq!(w, [0xF3C21C97, 0x13E0030C, 0x13FEFC06, 0x41980004]);
    }

    #[test]
    fn byte_mul_emulates_through_scratch() {
        let w = run(|g| {
            g.scratch(Scratch::arena(Mem::base(Gpr(1)).disp(64), 32));
            g.mul3(Elem::U8, v(0), v(1), v(2))?;
            Ok(())
        });
        // stxv vs34, 64(r1) ; stxv vs35, 80(r1) ; stxv vs36, 96(r1) ; stxv vs37, 112(r1)
        assert_eq!(w[..4], [0xF441004D, 0xF461005D, 0xF481006D, 0xF4A1007D]);
        // lbz r9, 64(r1) ; lbz r10, 96(r1) ; mullw r9, r9, r10 ; stb r9, 64(r1)
        assert_eq!(w[4..8], [0x89210040, 0x89410060, 0x7D2951D6, 0x99210040]);
        assert_eq!(w.len(), 4 + 32 * 4 + 2);
    }
}
