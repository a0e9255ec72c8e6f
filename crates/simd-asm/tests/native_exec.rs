#![cfg(all(feature = "avx512", target_arch = "x86_64", target_os = "linux"))]
//! Execution tests: run generated AVX-512 code on the host and compare every
//! lane against [`simd_asm::lanes`].
//!
//! Each case is wrapped as `extern "sysv64" fn(data: *mut u8, count: u64)`:
//! `rdi` points at a data block laid out in fixed regions and `rsi` carries
//! the GPR shift count. Cases are skipped on hosts without AVX-512BW.

use std::ptr;

use simd_asm::lanes;
use simd_asm::{
    ArithOp, Avx512, Avx512x1, Avx512x2, Avx512x4, Cond, Count, Elem, GenError, Generator, Gpr,
    LogicOp, Mask, MaskCond, Mem, PReg, Scratch, ShiftOp, VReg,
};

// ─── Harness ──────────────────────────────────────────────────────────────────

/// Region offsets inside the data block. Every region fits the widest
/// logical vector (4 × 64 bytes).
const A: i64 = 0;
const B: i64 = 256;
const C: i64 = 512;
const D: i64 = 768;
const OUT: i64 = 1024;
const FLAG: i64 = 1280;
const ONES: i64 = 1536;
const SCRATCH: i64 = 1792;
const DATA_LEN: usize = 2304;

/// `vzeroupper; ret`
const EPILOGUE: [u8; 4] = [0xC5, 0xF8, 0x77, 0xC3];

/// A page-aligned executable copy of one code blob.
///
/// Written once while mapped read-write, then flipped to read-execute.
struct ExecutableBuffer {
    ptr: *mut libc::c_void,
    len: usize,
}

impl ExecutableBuffer {
    fn new(code: &[u8]) -> Self {
        let len = code.len().max(1);
        unsafe {
            let ptr = libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            assert_ne!(ptr, libc::MAP_FAILED, "mmap failed");
            ptr::copy_nonoverlapping(code.as_ptr(), ptr.cast::<u8>(), code.len());
            assert_eq!(
                libc::mprotect(ptr, len, libc::PROT_READ | libc::PROT_EXEC),
                0,
                "mprotect failed"
            );
            Self { ptr, len }
        }
    }

    fn call(&self, data: &mut [u8], count: u64) {
        assert_eq!(data.len(), DATA_LEN);
        let f: extern "sysv64" fn(*mut u8, u64) = unsafe { std::mem::transmute(self.ptr) };
        f(data.as_mut_ptr(), count);
    }
}

impl Drop for ExecutableBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}

fn avx512bw() -> bool {
    std::arch::is_x86_feature_detected!("avx512f") && std::arch::is_x86_feature_detected!("avx512bw")
}

macro_rules! require_avx512bw {
    () => {
        if !avx512bw() {
            eprintln!("skipping: host has no AVX-512BW");
            return;
        }
    };
}

fn v(n: u8) -> VReg {
    VReg::logical(n)
}

/// `[rdi + off]`
fn at(off: i64) -> Mem {
    Mem::base(Gpr(7)).disp(off)
}

/// The GPR holding the second argument.
const COUNT: Gpr = Gpr(6);

/// Lower `body`, run it over `data` and return the bytes at `OUT`.
fn run<const N: usize>(
    backend: Avx512<N>,
    data: &mut [u8],
    count: u64,
    body: impl FnOnce(&mut Generator<Avx512<N>>) -> Result<(), GenError>,
) -> Vec<u8> {
    let width = 64 * N;
    let mut g = Generator::new(backend);
    g.scratch(Scratch::arena(at(SCRATCH), width as u32));
    body(&mut g).unwrap();
    let mut code = g.finish().unwrap().into_bytes();
    code.extend_from_slice(&EPILOGUE);
    ExecutableBuffer::new(&code).call(data, count);
    data[OUT as usize..OUT as usize + width].to_vec()
}

/// Deterministic xorshift input with an edge value every seventh byte.
struct Inputs(u64);

impl Inputs {
    fn bytes(&mut self, n: usize) -> Vec<u8> {
        const EDGES: [u8; 6] = [0x00, 0x01, 0x7F, 0x80, 0xFE, 0xFF];
        (0..n)
            .map(|i| {
                self.0 ^= self.0 << 13;
                self.0 ^= self.0 >> 7;
                self.0 ^= self.0 << 17;
                if i % 7 == 3 {
                    EDGES[(self.0 % EDGES.len() as u64) as usize]
                } else {
                    self.0 as u8
                }
            })
            .collect()
    }

    fn lanes(&mut self, elem: Elem, width: usize) -> Vec<u16> {
        lanes::from_bytes(elem, &self.bytes(width))
    }
}

/// A zeroed data block with `ONES` filled and the given regions written.
fn block(elem: Elem, regions: &[(i64, &[u16])]) -> Vec<u8> {
    let mut data = vec![0u8; DATA_LEN];
    data[ONES as usize..ONES as usize + 256].fill(0xFF);
    for &(off, l) in regions {
        let bytes = lanes::to_bytes(elem, l);
        data[off as usize..off as usize + bytes.len()].copy_from_slice(&bytes);
    }
    data
}

const ELEMS: [Elem; 4] = [Elem::U8, Elem::I8, Elem::U16, Elem::I16];
const ARITH: [ArithOp; 7] = [
    ArithOp::Add,
    ArithOp::Sub,
    ArithOp::AddSat,
    ArithOp::SubSat,
    ArithOp::Mul,
    ArithOp::Min,
    ArithOp::Max,
];
const CONDS: [Cond; 6] = [Cond::Eq, Cond::Ne, Cond::Lt, Cond::Le, Cond::Gt, Cond::Ge];

// ─── Cases, generic over the ratio ───────────────────────────────────────────

fn arith_matches_lanes<const N: usize>(backend: Avx512<N>, seed: u64) {
    let width = 64 * N;
    let mut inputs = Inputs(seed);
    for elem in ELEMS {
        for op in ARITH {
            let a = inputs.lanes(elem, width);
            let b = inputs.lanes(elem, width);
            let want = lanes::to_bytes(elem, &lanes::arith_all(op, elem, &a, &b));

            let mut data = block(elem, &[(A, &a), (B, &b)]);
            let got = run(backend, &mut data, 0, |g| {
                g.load(v(0), at(A))?.load(v(1), at(B))?;
                g.arith3(op, elem, v(2), v(0), v(1))?;
                g.store(v(2), at(OUT)).map(drop)
            });
            assert_eq!(got, want, "{op:?}.{elem} x{N} register form");

            // In place with the second source read from memory.
            let mut data = block(elem, &[(A, &a), (B, &b)]);
            let got = run(backend, &mut data, 0, |g| {
                g.load(v(0), at(A))?;
                g.arith3(op, elem, v(0), v(0), at(B))?;
                g.store(v(0), at(OUT)).map(drop)
            });
            assert_eq!(got, want, "{op:?}.{elem} x{N} memory form");
        }
    }
}

fn shifts_match_lanes<const N: usize>(backend: Avx512<N>, seed: u64) {
    let width = 64 * N;
    let mut inputs = Inputs(seed);
    for elem in ELEMS {
        for op in [ShiftOp::Shl, ShiftOp::Shr] {
            let a = inputs.lanes(elem, width);
            let by = |n: u32| -> Vec<u8> {
                let r: Vec<u16> = a.iter().map(|&x| lanes::shift(op, elem, x, n)).collect();
                lanes::to_bytes(elem, &r)
            };

            for n in [0, 1, 3, 7, 9, 15, 16, 17, 33] {
                let mut data = block(elem, &[(A, &a)]);
                let got = run(backend, &mut data, 0, |g| {
                    g.load(v(0), at(A))?;
                    g.emit(&simd_asm::Pseudo::Shift {
                        op,
                        elem,
                        dst: v(1),
                        src: v(0),
                        count: Count::Imm(n),
                    })?;
                    g.store(v(1), at(OUT)).map(drop)
                });
                assert_eq!(got, by(n), "{op:?}.{elem} x{N} #{n}");
            }

            for n in [1u32, 5, 17, 33] {
                let mut data = block(elem, &[(A, &a)]);
                let got = run(backend, &mut data, u64::from(n), |g| {
                    g.load(v(0), at(A))?;
                    g.emit(&simd_asm::Pseudo::Shift {
                        op,
                        elem,
                        dst: v(1),
                        src: v(0),
                        count: Count::Gpr(COUNT),
                    })?;
                    g.store(v(1), at(OUT)).map(drop)
                });
                assert_eq!(got, by(n), "{op:?}.{elem} x{N} by rsi = {n}");
            }

            let counts = inputs.lanes(elem, width);
            let want = lanes::to_bytes(elem, &lanes::shift_all(op, elem, &a, &counts));
            let mut data = block(elem, &[(A, &a), (C, &counts)]);
            let got = run(backend, &mut data, 0, |g| {
                g.load(v(0), at(A))?.load(v(2), at(C))?;
                g.emit(&simd_asm::Pseudo::Shift {
                    op,
                    elem,
                    dst: v(1),
                    src: v(0),
                    count: Count::Lanes(v(2).into()),
                })?;
                g.store(v(1), at(OUT)).map(drop)
            });
            assert_eq!(got, want, "{op:?}.{elem} x{N} per-lane counts");
        }
    }
}

/// Inputs for compares: equal, near and unrelated lanes mixed.
fn compare_inputs(inputs: &mut Inputs, elem: Elem, width: usize) -> (Vec<u16>, Vec<u16>) {
    let a = inputs.lanes(elem, width);
    let mut b = inputs.lanes(elem, width);
    for (i, lane) in b.iter_mut().enumerate() {
        match i % 4 {
            0 => *lane = a[i],
            1 => *lane = a[i].wrapping_add(1) & elem.lane_mask(),
            _ => {}
        }
    }
    (a, b)
}

fn compares_match_lanes<const N: usize>(backend: Avx512<N>, seed: u64) {
    let width = 64 * N;
    let mut inputs = Inputs(seed);
    for elem in ELEMS {
        for cond in CONDS {
            let (a, b) = compare_inputs(&mut inputs, elem, width);
            let d = inputs.lanes(elem, width);
            let mask = lanes::compare_all(cond, elem, &a, &b);

            let mut data = block(elem, &[(A, &a), (B, &b)]);
            let got = run(backend, &mut data, 0, |g| {
                g.load(v(0), at(A))?;
                g.cmp(cond, elem, Mask::Vector(v(3)), v(0), at(B))?;
                g.store(v(3), at(OUT)).map(drop)
            });
            assert_eq!(got, lanes::to_bytes(elem, &mask), "{cond:?}.{elem} x{N} vector mask");

            // A predicate mask is observed through the merge it drives.
            let want = lanes::to_bytes(elem, &lanes::merge_all(&mask, &a, &d));
            let mut data = block(elem, &[(A, &a), (B, &b), (D, &d)]);
            let got = run(backend, &mut data, 0, |g| {
                g.load(v(0), at(A))?.load(v(1), at(B))?.load(v(2), at(D))?;
                g.cmp(cond, elem, Mask::Pred(PReg::logical(0)), v(0), v(1))?;
                g.merge(elem, v(2), v(0), Mask::Pred(PReg::logical(0)))?;
                g.store(v(2), at(OUT)).map(drop)
            });
            assert_eq!(got, want, "{cond:?}.{elem} x{N} predicate merge");
        }
    }
}

fn logic_and_merge_match_lanes<const N: usize>(backend: Avx512<N>, seed: u64) {
    let width = 64 * N;
    let mut inputs = Inputs(seed);
    let elem = Elem::U16;
    let a = inputs.lanes(elem, width);
    let b = inputs.lanes(elem, width);
    let c = inputs.lanes(elem, width);

    for op in [LogicOp::And, LogicOp::AndNot, LogicOp::Or, LogicOp::Xor] {
        let want: Vec<u16> = a.iter().zip(&b).map(|(&x, &y)| lanes::logic(op, x, y)).collect();
        let mut data = block(elem, &[(A, &a), (B, &b)]);
        let got = run(backend, &mut data, 0, |g| {
            g.load(v(0), at(A))?.load(v(1), at(B))?;
            g.logic3(op, v(2), v(0), v(1))?;
            g.store(v(2), at(OUT)).map(drop)
        });
        assert_eq!(got, lanes::to_bytes(elem, &want), "{op:?} x{N}");
    }

    let not: Vec<u16> = a.iter().map(|&x| !x).collect();
    let mut data = block(elem, &[(A, &a)]);
    let got = run(backend, &mut data, 0, |g| {
        g.load(v(0), at(A))?.not(v(0))?.store(v(0), at(OUT)).map(drop)
    });
    assert_eq!(got, lanes::to_bytes(elem, &not), "not x{N}");

    // Vector-held masks select bit by bit.
    let want = lanes::merge_all(&c, &a, &b);
    let mut data = block(elem, &[(A, &a), (B, &b), (C, &c)]);
    let got = run(backend, &mut data, 0, |g| {
        g.load(v(1), at(B))?.load(v(3), at(C))?;
        g.merge(elem, v(1), at(A), Mask::Vector(v(3)))?;
        g.store(v(1), at(OUT)).map(drop)
    });
    assert_eq!(got, lanes::to_bytes(elem, &want), "vector merge x{N}");
}

/// Run a compare then a mask jump over it. The fall-through path writes
/// `ONES` to `FLAG`, so an untouched flag means the branch was taken.
fn mask_jumps_match_lanes<const N: usize>(backend: Avx512<N>, seed: u64) {
    let width = 64 * N;
    let mut inputs = Inputs(seed);
    for elem in ELEMS {
        let a = inputs.lanes(elem, width);
        let complement: Vec<u16> = a.iter().map(|&x| !x & elem.lane_mask()).collect();
        let mut one_off = a.clone();
        one_off[a.len() - 1] ^= 1;
        let mut one_on = complement.clone();
        one_on[a.len() / 2] = a[a.len() / 2];

        for b in [&a, &complement, &one_off, &one_on] {
            let mask = lanes::compare_all(Cond::Eq, elem, &a, b);
            for when in [MaskCond::None, MaskCond::Full] {
                let taken = lanes::mask_jump(when, elem, &mask);
                for pred in [false, true] {
                    let m = if pred {
                        Mask::Pred(PReg::logical(0))
                    } else {
                        Mask::Vector(v(3))
                    };
                    let mut data = block(elem, &[(A, &a), (B, b)]);
                    run(backend, &mut data, 0, |g| {
                        let done = g.new_label()?;
                        g.load(v(0), at(A))?;
                        g.cmp(Cond::Eq, elem, m, v(0), at(B))?;
                        g.mkj(elem, m, when, done)?;
                        g.load(v(4), at(ONES))?.store(v(4), at(FLAG))?;
                        g.bind(done).map(drop)
                    });
                    let flag = &data[FLAG as usize..FLAG as usize + width];
                    assert_eq!(
                        flag.iter().all(|&x| x == 0),
                        taken,
                        "{when:?}.{elem} x{N} pred={pred} mask={mask:04X?}"
                    );
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn arith_x1() {
    require_avx512bw!();
    arith_matches_lanes(Avx512x1::new(), 0x9E37_79B9_7F4A_7C15);
}

#[test]
fn arith_x2() {
    require_avx512bw!();
    arith_matches_lanes(Avx512x2::new(), 0xD1B5_4A32_D192_ED03);
}

#[test]
fn arith_x4() {
    require_avx512bw!();
    arith_matches_lanes(Avx512x4::new(), 0x8CB9_2BA7_2F3D_8DD7);
}

#[test]
fn shifts_x1() {
    require_avx512bw!();
    shifts_match_lanes(Avx512x1::new(), 0x2545_F491_4F6C_DD1D);
}

#[test]
fn shifts_x2() {
    require_avx512bw!();
    shifts_match_lanes(Avx512x2::new(), 0x5851_F42D_4C95_7F2D);
}

#[test]
fn shifts_x4() {
    require_avx512bw!();
    shifts_match_lanes(Avx512x4::new(), 0x1405_7B7E_F767_814F);
}

#[test]
fn compares_x1() {
    require_avx512bw!();
    compares_match_lanes(Avx512x1::new(), 0xA076_1D64_78BD_642F);
}

#[test]
fn compares_x2() {
    require_avx512bw!();
    compares_match_lanes(Avx512x2::new(), 0xE703_7ED1_A0B4_28DB);
}

#[test]
fn compares_x4() {
    require_avx512bw!();
    compares_match_lanes(Avx512x4::new(), 0x8EBC_6AF0_9C88_C6E3);
}

#[test]
fn logic_and_merge_all_ratios() {
    require_avx512bw!();
    logic_and_merge_match_lanes(Avx512x1::new(), 0x5899_65CC_7537_4CC3);
    logic_and_merge_match_lanes(Avx512x2::new(), 0x1D8E_4E27_C47D_124F);
    logic_and_merge_match_lanes(Avx512x4::new(), 0x7E3D_2CE1_9B2D_4A51);
}

#[test]
fn mask_jumps_all_ratios() {
    require_avx512bw!();
    mask_jumps_match_lanes(Avx512x1::new(), 0x3C6E_F372_FE94_F82B);
    mask_jumps_match_lanes(Avx512x2::new(), 0xA54F_F53A_5F1D_36F1);
    mask_jumps_match_lanes(Avx512x4::new(), 0x510E_527F_ADE6_82D1);
}

/// Equal-compare scenario from the lane reference, run on the hardware.
#[test]
fn compare_eq_scenario_runs() {
    require_avx512bw!();
    let elem = Elem::U16;
    let mut a = vec![0u16; 32];
    let mut b = vec![0u16; 32];
    a[..4].copy_from_slice(&[3, 5, 5, 9]);
    b[..4].copy_from_slice(&[3, 2, 5, 9]);
    let mut data = block(elem, &[(A, &a), (B, &b)]);
    let got = run(Avx512x1::new(), &mut data, 0, |g| {
        g.load(v(0), at(A))?;
        g.cmp(Cond::Eq, elem, Mask::Vector(v(1)), v(0), at(B))?;
        g.store(v(1), at(OUT)).map(drop)
    });
    assert_eq!(lanes::from_bytes(elem, &got)[..4], [0xFFFF, 0, 0xFFFF, 0xFFFF]);
}

#[test]
fn saturating_add_clamps_on_hardware() {
    require_avx512bw!();
    let elem = Elem::U8;
    let a = vec![200u16; 128];
    let b = vec![100u16; 128];
    let mut data = block(elem, &[(A, &a), (B, &b)]);
    let got = run(Avx512x2::new(), &mut data, 0, |g| {
        g.load(v(0), at(A))?;
        g.adds(elem, v(0), at(B))?;
        g.store(v(0), at(OUT)).map(drop)
    });
    assert!(got.iter().all(|&x| x == 255), "{got:?}");
}

/// A destination half may reuse a source half that was already read.
#[test]
fn half_swap_runs() {
    require_avx512bw!();
    let elem = Elem::U8;
    let a: Vec<u16> = (0..128).collect();
    let mut data = block(elem, &[(A, &a)]);
    let got = run(Avx512x2::new(), &mut data, 0, |g| {
        let src = VReg::mapped(1, &[5, 0]);
        g.load(src, at(A))?;
        g.not2(VReg::mapped(0, &[2, 5]), src)?;
        g.store(VReg::mapped(0, &[2, 5]), at(OUT)).map(drop)
    });
    let want: Vec<u16> = a.iter().map(|&x| !x & 0xFF).collect();
    assert_eq!(got, lanes::to_bytes(elem, &want));
}
