#![cfg(not(target_arch = "wasm32"))]
//! Multi-architecture cross-validation: lower with simd_asm, decode the
//! AArch64 backends' output with bad64 (Binary Ninja's decoder).
//!
//! The POWER backends have no decoder in the dev stack; their encodings are
//! pinned word by word in the unit tests.

#[cfg(any(feature = "neon", feature = "sve"))]
mod aarch64_bad64_xval {
    use bad64::Op;
    use simd_asm::{Backend, GenError, Generator};

    /// Decode every little-endian word; return ops and a listing.
    pub fn decode_all(bytes: &[u8]) -> (Vec<Op>, String) {
        assert_eq!(bytes.len() % 4, 0, "A64 output must be whole words: {bytes:02X?}");
        let mut ops = Vec::new();
        let mut listing = String::new();
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            let word = u32::from_le_bytes(chunk.try_into().unwrap());
            let inst = bad64::decode(word, (i * 4) as u64)
                .unwrap_or_else(|e| panic!("bad64 failed on word {i} ({word:#010X}): {e}"));
            listing.push_str(&format!("{inst}\n"));
            ops.push(inst.op());
        }
        (ops, listing)
    }

    /// Lower with `f`, decode, and compare the op stream.
    pub fn verify<B: Backend>(
        backend: B,
        f: impl FnOnce(&mut Generator<B>) -> Result<(), GenError>,
        expected: &[Op],
    ) {
        let mut g = Generator::new(backend);
        f(&mut g).unwrap_or_else(|e| panic!("lowering failed: {e}"));
        let code = g.finish().unwrap();
        let (ops, listing) = decode_all(code.bytes());
        assert_eq!(ops, expected, "decoded:\n{listing}");
    }

    /// Lower with `f` and return the bad64 listing.
    pub fn listing<B: Backend>(
        backend: B,
        f: impl FnOnce(&mut Generator<B>) -> Result<(), GenError>,
    ) -> String {
        let mut g = Generator::new(backend);
        f(&mut g).unwrap_or_else(|e| panic!("lowering failed: {e}"));
        decode_all(g.finish().unwrap().bytes()).1
    }
}

// ============================================================================
// NEON pair
// ============================================================================

#[cfg(feature = "neon")]
mod neon {
    use super::aarch64_bad64_xval::{listing, verify};
    use bad64::Op;
    use simd_asm::{Cond, Count, Elem, Generator, Gpr, Mask, MaskCond, Mem, NeonPair, VReg};

    fn v(n: u8) -> VReg {
        VReg::logical(n)
    }

    #[test]
    fn arith_pairs() {
        verify(
            NeonPair::new(),
            |g| {
                g.add3(Elem::U8, v(0), v(1), v(2))?;
                g.adds3(Elem::U8, v(0), v(1), v(2))?;
                g.andn3(v(0), v(1), v(2))?;
                Ok(())
            },
            &[Op::ADD, Op::ADD, Op::UQADD, Op::UQADD, Op::BIC, Op::BIC],
        );
    }

    #[test]
    fn pair_uses_adjacent_q_registers() {
        let text = listing(NeonPair::new(), |g| g.add3(Elem::U16, v(0), v(1), v(2)).map(drop));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "add v0.8h, v2.8h, v4.8h", "{text}");
        assert_eq!(lines[1], "add v1.8h, v3.8h, v5.8h", "{text}");
    }

    #[test]
    fn memory_moves() {
        verify(
            NeonPair::new(),
            |g| {
                g.load(v(0), Mem::base(Gpr(1)).disp(32))?;
                g.store(v(0), Mem::base(Gpr(2)))?;
                Ok(())
            },
            &[Op::LDR, Op::LDR, Op::STR, Op::STR],
        );
    }

    #[test]
    fn memory_source_goes_through_v30() {
        verify(
            NeonPair::new(),
            |g| g.add3(Elem::U16, v(0), v(1), Mem::base(Gpr(1)).disp(32)).map(drop),
            &[Op::LDR, Op::ADD, Op::LDR, Op::ADD],
        );
    }

    #[test]
    fn shifts() {
        verify(
            NeonPair::new(),
            |g| g.shr3(Elem::I8, v(0), v(1), Count::Imm(1)).map(drop),
            &[Op::SSHR, Op::SSHR],
        );
        verify(
            NeonPair::new(),
            |g| g.shr3(Elem::U16, v(0), v(1), Count::Gpr(Gpr(5))).map(drop),
            &[Op::AND, Op::NEG, Op::DUP, Op::USHL, Op::USHL],
        );
    }

    #[test]
    fn compare_gt_and_merge() {
        verify(
            NeonPair::new(),
            |g| {
                g.cmp(Cond::Gt, Elem::I16, Mask::Vector(v(3)), v(0), v(1))?;
                g.merge(Elem::U8, v(0), v(1), Mask::Vector(v(2)))?;
                Ok(())
            },
            &[Op::CMGT, Op::CMGT, Op::BIT, Op::BIT],
        );
    }

    #[test]
    fn mask_jump_reduces_and_branches() {
        verify(
            NeonPair::new(),
            |g| {
                let l = g.new_label()?;
                g.bind(l)?;
                g.mkj(Elem::U8, Mask::Vector(v(1)), MaskCond::None, l)?;
                Ok(())
            },
            &[Op::ORR, Op::UMAXV, Op::UMOV, Op::CBZ],
        );
    }

    #[test]
    fn branch_target_decodes_to_label() {
        let mut g = Generator::new(NeonPair::new());
        let top = g.new_label().unwrap();
        g.bind(top).unwrap();
        g.add3(Elem::U8, v(0), v(1), v(2)).unwrap();
        g.mkj(Elem::U8, Mask::Vector(v(1)), MaskCond::None, top).unwrap();
        let code = g.finish().unwrap();
        let bytes = code.bytes();
        let last = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        let inst = bad64::decode(last, (bytes.len() - 4) as u64).unwrap();
        assert_eq!(inst.op(), Op::CBZ);
    }
}

// ============================================================================
// SVE pair
// ============================================================================

#[cfg(feature = "sve")]
mod sve {
    use super::aarch64_bad64_xval::verify;
    use bad64::Op;
    use simd_asm::{Elem, Gpr, Mask, MaskCond, Mem, PReg, SvePair, VReg};

    fn v(n: u8) -> VReg {
        VReg::logical(n)
    }

    fn sve() -> SvePair {
        SvePair::new(256).unwrap()
    }

    #[test]
    fn unpredicated_arith() {
        verify(
            sve(),
            |g| {
                g.add3(Elem::U8, v(0), v(1), v(2))?;
                g.adds3(Elem::U8, v(0), v(1), v(2))?;
                Ok(())
            },
            &[Op::ADD, Op::ADD, Op::UQADD, Op::UQADD],
        );
    }

    #[test]
    fn destructive_ops_use_movprfx() {
        verify(
            sve(),
            |g| g.mul3(Elem::U16, v(0), v(1), v(2)).map(drop),
            &[Op::PTRUE, Op::MOVPRFX, Op::MUL, Op::MOVPRFX, Op::MUL],
        );
    }

    #[test]
    fn vector_length_memory() {
        verify(
            sve(),
            |g| {
                g.load(v(0), Mem::base(Gpr(3)).disp(-32))?;
                g.store(v(0), Mem::base(Gpr(3)).disp(64))?;
                Ok(())
            },
            &[Op::LDR, Op::LDR, Op::STR, Op::STR],
        );
    }

    #[test]
    fn predicate_mask_jump() {
        verify(
            sve(),
            |g| {
                let l = g.new_label()?;
                g.bind(l)?;
                g.mkj(Elem::U8, Mask::Pred(PReg::logical(0)), MaskCond::None, l)?;
                Ok(())
            },
            &[Op::PTRUE, Op::ORRS, Op::B_EQ],
        );
    }
}
