//! POWER VMX (AltiVec) backend: each logical register is a pair of 128-bit
//! VRs.
//!
//! `lvx`/`stvx` are X-form only, so a nonzero displacement travels in `r12`
//! and the effective address is truncated to 16 bytes by the hardware.
//! VMX has no GPR-to-VR move, which makes GPR-count shifts an emulated
//! sequence.

use crate::backend::{sealed::Lower, Backend, Cx, Reserved};
use crate::emulate::{LaneOp, ScalarIsa};
use crate::error::{BackendName, Fault};
use crate::ir::*;
use crate::mem::{classify, Mem, Plan, Quantum};
use crate::power::{self, emit32, vc, vx, Addr, VectorUnit, R_ADDR, R_OFF};
use crate::stream::Endian;
use crate::width::{PhysList, Shape};

/// VMX, 256-bit logical registers as VR pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmxPair {
    order: Endian,
}

impl VmxPair {
    /// Create the backend emitting words in `order`.
    pub const fn new(order: Endian) -> Self {
        Self { order }
    }
}

impl Default for VmxPair {
    fn default() -> Self {
        Self::new(Endian::Big)
    }
}

impl Backend for VmxPair {
    const NAME: BackendName = BackendName::VmxPair;

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

    /// `v{n}` maps to `[v2n, v2n+1]`.
    fn default_vector(&self, id: u8) -> Option<PhysList> {
        (id <= 14).then(|| PhysList::new(&[2 * id, 2 * id + 1]))
    }

    fn byte_order(&self) -> Endian {
        self.order
    }
}

impl VectorUnit for VmxPair {
    fn address(&self, cx: &mut Cx<'_>, m: &Mem) -> Result<Addr, Fault> {
        power::check_mem(m)?;
        match classify(Quantum::PpcIndexed, m, &[0, 16])? {
            Plan::Inline => Ok(Addr {
                base: m.base.0,
                disp: m.disp,
            }),
            Plan::Materialize => {
                let base = power::materialize(cx.out, R_ADDR, m, false)?;
                Ok(Addr { base, disp: m.disp })
            }
        }
    }

    fn load(&self, cx: &mut Cx<'_>, vt: u8, a: &Addr, k: usize) -> Result<(), Fault> {
        let off = a.disp + 16 * k as i64;
        if off == 0 {
            emit32(cx.out, power::lvx(vt, 0, a.base));
        } else {
            power::load_const(cx.out, R_OFF, off)?;
            emit32(cx.out, power::lvx(vt, a.base, R_OFF));
        }
        Ok(())
    }

    fn store(&self, cx: &mut Cx<'_>, vs: u8, a: &Addr, k: usize) -> Result<(), Fault> {
        let off = a.disp + 16 * k as i64;
        if off == 0 {
            emit32(cx.out, power::stvx(vs, 0, a.base));
        } else {
            power::load_const(cx.out, R_OFF, off)?;
            emit32(cx.out, power::stvx(vs, a.base, R_OFF));
        }
        Ok(())
    }

    fn logic(&self, cx: &mut Cx<'_>, op: LogicOp, d: u8, a: u8, b: u8) {
        let w = match op {
            LogicOp::And => vx(power::VAND, d, a, b),
            // vandc computes VRA & !VRB.
            LogicOp::AndNot => vx(power::VANDC, d, b, a),
            LogicOp::Or => vx(power::VOR, d, a, b),
            LogicOp::Xor => vx(power::VXOR, d, a, b),
        };
        emit32(cx.out, w);
    }

    fn not(&self, cx: &mut Cx<'_>, d: u8, s: u8) {
        emit32(cx.out, vx(power::VNOR, d, s, s));
    }

    fn copy(&self, cx: &mut Cx<'_>, d: u8, s: u8) {
        emit32(cx.out, vx(power::VOR, d, s, s));
    }

    fn select(&self, cx: &mut Cx<'_>, d: u8, kept: u8, incoming: u8, mask: u8) {
        emit32(cx.out, power::va(power::VSEL, d, kept, incoming, mask));
    }

    fn not_equal(&self, cx: &mut Cx<'_>, elem: Elem, d: u8, a: u8, b: u8) {
        emit32(cx.out, vc(power::cmp_xo(false, elem), d, a, b, false));
        emit32(cx.out, vx(power::VNOR, d, d, d));
    }

    fn splat_count(&self, _cx: &mut Cx<'_>, _elem: Elem, _r: Gpr) -> Result<bool, Fault> {
        Ok(false)
    }

    fn combine(&self, cx: &mut Cx<'_>, when: MaskCond, d: u8, a: u8, b: u8) {
        let xo = match when {
            MaskCond::None => power::VOR,
            MaskCond::Full => power::VAND,
        };
        emit32(cx.out, vx(xo, d, a, b));
    }
}

impl ScalarIsa for VmxPair {
    const QUANTUM: Quantum = Quantum::PpcD;
    const ADDR: [u8; 2] = [R_ADDR, R_OFF];
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

impl Lower for VmxPair {
    fn lower(&self, cx: &mut Cx<'_>, op: &Pseudo) -> Result<(), Fault> {
        power::lower(self, cx, op)
    }
}
