//! Performance benchmarks for `simd_asm`.
//!
//! Measures:
//! - Single pseudo-instruction expansion latency (per backend)
//! - Kernel throughput (pseudo-instructions per second)
//! - Label-heavy workloads (mask jumps to many labels)
//! - Scalar emulation fallback cost
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use simd_asm::{
    Avx512x1, Avx512x4, Backend, Cond, Count, Elem, Generator, Gpr, Mask, MaskCond, Mem,
    NeonPair, PReg, Pseudo, Scratch, Src, SvePair, VReg, VmxPair, VsxPair,
};

fn v(n: u8) -> VReg {
    VReg::logical(n)
}

fn add_u8() -> Pseudo {
    Pseudo::Arith {
        op: simd_asm::ArithOp::Add,
        elem: Elem::U8,
        dst: v(0),
        src1: v(1),
        src2: Src::Reg(v(2)),
    }
}

fn expand_one<B: Backend>(backend: B, op: &Pseudo) -> usize {
    let mut g = Generator::new(backend);
    g.emit(op).unwrap();
    g.finish().unwrap().len()
}

// ─── Single-Instruction Latency ──────────────────────────────────────────────

fn bench_single_instruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_instruction");
    let op = add_u8();

    group.bench_function("neon_add_u8", |b| {
        b.iter(|| expand_one(NeonPair::new(), black_box(&op)))
    });

    group.bench_function("sve_add_u8", |b| {
        let sve = SvePair::new(256).unwrap();
        b.iter(|| expand_one(sve, black_box(&op)))
    });

    group.bench_function("vmx_add_u8", |b| {
        b.iter(|| expand_one(VmxPair::default(), black_box(&op)))
    });

    group.bench_function("vsx_add_u8", |b| {
        b.iter(|| expand_one(VsxPair::default(), black_box(&op)))
    });

    group.bench_function("avx512x1_add_u8", |b| {
        b.iter(|| expand_one(Avx512x1::new(), black_box(&op)))
    });

    group.bench_function("avx512x4_add_u8", |b| {
        b.iter(|| expand_one(Avx512x4::new(), black_box(&op)))
    });

    group.bench_function("avx512x1_far_load", |b| {
        let op = Pseudo::Move {
            dst: v(0),
            src: Src::Mem(Mem::base(Gpr(7)).disp(1 << 36)),
        };
        b.iter(|| expand_one(Avx512x1::new(), black_box(&op)))
    });

    group.finish();
}

// ─── Kernel Throughput ───────────────────────────────────────────────────────

fn kernel<B: Backend>(g: &mut Generator<B>, mask: Mask, rounds: usize) {
    let done = g.new_label().unwrap();
    for i in 0..rounds {
        let disp = (i as i64 % 64) * 256;
        g.load(v(0), Mem::base(Gpr(3)).disp(disp)).unwrap();
        g.adds3(Elem::U16, v(2), v(0), v(1)).unwrap();
        g.shl(Elem::U16, v(2), Count::Imm(3)).unwrap();
        g.cmp(Cond::Gt, Elem::I16, mask, v(2), v(0)).unwrap();
        g.merge(Elem::U16, v(0), v(2), mask).unwrap();
        g.store(v(0), Mem::base(Gpr(4)).disp(disp)).unwrap();
        g.mkj(Elem::U16, mask, MaskCond::None, done).unwrap();
    }
    g.bind(done).unwrap();
}

fn bench_kernel(c: &mut Criterion) {
    const ROUNDS: usize = 1000;
    let mut group = c.benchmark_group("kernel");
    group.throughput(Throughput::Elements((ROUNDS * 7) as u64));

    group.bench_function("neon", |b| {
        b.iter(|| {
            let mut g = Generator::new(NeonPair::new());
            kernel(&mut g, Mask::Vector(v(3)), ROUNDS);
            g.finish().unwrap()
        })
    });

    group.bench_function("vsx", |b| {
        b.iter(|| {
            let mut g = Generator::new(VsxPair::default());
            kernel(&mut g, Mask::Vector(v(3)), ROUNDS);
            g.finish().unwrap()
        })
    });

    group.bench_function("avx512x2", |b| {
        b.iter(|| {
            let mut g = Generator::new(simd_asm::Avx512x2::new());
            kernel(&mut g, Mask::Pred(PReg::logical(0)), ROUNDS);
            g.finish().unwrap()
        })
    });

    group.finish();
}

// ─── Label-Heavy Workloads ───────────────────────────────────────────────────

fn bench_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("labels");

    group.bench_function("avx512_500_backward_jumps", |b| {
        b.iter(|| {
            let mut g = Generator::new(Avx512x1::new());
            let mask = Mask::Pred(PReg::logical(0));
            for _ in 0..500 {
                let l = g.new_label().unwrap();
                g.bind(l).unwrap();
                g.not(v(0)).unwrap();
                g.mkj(Elem::U8, mask, MaskCond::Full, l).unwrap();
            }
            g.finish().unwrap()
        })
    });

    group.finish();
}

// ─── Emulation Fallback ──────────────────────────────────────────────────────

fn bench_emulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("emulation");

    group.bench_function("avx512x4_mul_u8", |b| {
        b.iter(|| {
            let mut g = Generator::new(Avx512x4::new());
            g.scratch(Scratch::arena(Mem::base(Gpr(4)), 256));
            g.mul3(Elem::U8, v(0), v(1), v(2)).unwrap();
            g.finish().unwrap()
        })
    });

    group.bench_function("vmx_gpr_shift_u16", |b| {
        b.iter(|| {
            let mut g = Generator::new(VmxPair::default());
            g.scratch(Scratch::arena(Mem::base(Gpr(1)).disp(64), 32));
            g.shr3(Elem::U16, v(0), v(1), Count::Gpr(Gpr(5))).unwrap();
            g.finish().unwrap()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_instruction,
    bench_kernel,
    bench_labels,
    bench_emulation
);
criterion_main!(benches);
