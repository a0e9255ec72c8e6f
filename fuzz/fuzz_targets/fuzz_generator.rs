#![no_main]
use libfuzzer_sys::fuzz_target;

use simd_asm::{
    ArithOp, Backend, Cond, Count, Elem, Generator, Gpr, LogicOp, Mask, MaskCond, Mem, PReg,
    Pseudo, Scratch, ShiftOp, Src, VReg,
};

const ELEMS: [Elem; 4] = [Elem::U8, Elem::I8, Elem::U16, Elem::I16];
const CONDS: [Cond; 6] = [Cond::Eq, Cond::Ne, Cond::Lt, Cond::Le, Cond::Gt, Cond::Ge];
const ARITH: [ArithOp; 7] = [
    ArithOp::Add,
    ArithOp::Sub,
    ArithOp::AddSat,
    ArithOp::SubSat,
    ArithOp::Mul,
    ArithOp::Min,
    ArithOp::Max,
];
const LOGIC: [LogicOp; 4] = [LogicOp::And, LogicOp::AndNot, LogicOp::Or, LogicOp::Xor];

/// Reads one pseudo-instruction per 8-byte chunk.
fn decode(c: &[u8], labels: &[simd_asm::Label]) -> Pseudo {
    let elem = ELEMS[c[1] as usize % 4];
    let (dst, a, b) = (VReg::logical(c[2] % 40), VReg::logical(c[3] % 40), VReg::logical(c[4] % 40));
    let disp = i64::from(i32::from_le_bytes([c[5], c[6], c[7], c[4]])) << (c[1] >> 4);
    let mem = Mem::base(Gpr(c[3] % 32)).disp(disp);
    let src = if c[1] & 8 != 0 { Src::Mem(mem) } else { Src::Reg(b) };
    let mask = if c[5] & 1 != 0 {
        Mask::Pred(PReg::logical(c[6] % 8))
    } else {
        Mask::Vector(VReg::logical(c[6] % 40))
    };
    match c[0] % 9 {
        0 => Pseudo::Move { dst, src },
        1 => Pseudo::Store { src: dst, mem },
        2 => Pseudo::Logic { op: LOGIC[c[5] as usize % 4], dst, src1: a, src2: src },
        3 => Pseudo::Not { dst, src: a },
        4 => Pseudo::Arith { op: ARITH[c[5] as usize % 7], elem, dst, src1: a, src2: src },
        5 => Pseudo::Shift {
            op: if c[5] & 2 != 0 { ShiftOp::Shl } else { ShiftOp::Shr },
            elem,
            dst,
            src: a,
            count: match c[7] % 3 {
                0 => Count::Imm(u32::from(c[6])),
                1 => Count::Gpr(Gpr(c[6] % 32)),
                _ => Count::Lanes(src),
            },
        },
        6 => Pseudo::Compare { cond: CONDS[c[7] as usize % 6], elem, mask, src1: a, src2: src },
        7 => Pseudo::Merge { elem, dst, src, mask },
        _ => Pseudo::MaskJump {
            elem,
            mask,
            when: if c[7] & 1 != 0 { MaskCond::Full } else { MaskCond::None },
            target: labels[c[2] as usize % labels.len()],
        },
    }
}

/// Drives `backend` with the decoded stream; must never panic, only return Ok/Err.
fn drive<B: Backend>(backend: B, data: &[u8]) {
    let mut g = Generator::new(backend);
    if data.first().is_some_and(|b| b & 1 != 0) {
        g.scratch(Scratch::arena(Mem::base(Gpr(4)), 512));
    }
    let labels: Vec<_> = (0..4).filter_map(|_| g.new_label().ok()).collect();
    for (i, chunk) in data.chunks_exact(8).enumerate() {
        if i % 5 == 0 {
            let _ = g.bind(labels[i / 5 % labels.len()]);
        }
        let before = g.len();
        if g.emit(&decode(chunk, &labels)).is_err() {
            assert_eq!(g.len(), before, "failed emit left bytes behind");
        }
    }
    for &l in &labels {
        let _ = g.bind(l);
    }
    let _ = g.finish();
}

fuzz_target!(|data: &[u8]| {
    drive(simd_asm::NeonPair::new(), data);
    drive(simd_asm::VmxPair::default(), data);
    drive(simd_asm::VsxPair::default(), data);
    drive(simd_asm::Avx512x2::new(), data);
    if let Ok(sve) = simd_asm::SvePair::new(128 << (data.len() % 5)) {
        drive(sve, data);
    }
});
