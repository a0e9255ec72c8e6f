//! Public generator API: builder pattern, labels and finished code.
//!
//! A [`Generator`] owns the output stream for one backend. Every
//! [`emit`](Generator::emit) expands one pseudo-instruction completely; if
//! lowering fails, the stream is rolled back so no partial sequence is left
//! behind.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::backend::{self, Backend, Cx};
use crate::emulate::Scratch;
use crate::error::GenError;
use crate::ir::*;
use crate::mem::Mem;
use crate::stream::CodeStream;
use crate::width::VReg;

/// Finished machine code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct Code {
    bytes: Vec<u8>,
    /// Bound labels with their absolute addresses.
    labels: Vec<(Label, u64)>,
    base_address: u64,
    /// `(address, rendered pseudo-instruction)` when listing is enabled.
    annotations: Vec<(u64, String)>,
}

impl Code {
    /// The generated bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use simd_asm::{Generator, NeonPair, VReg};
    ///
    /// let mut gen = Generator::new(NeonPair::new());
    /// gen.not(VReg::logical(0))?;
    /// let code = gen.finish()?;
    /// // mvn v0.16b, v0.16b ; mvn v1.16b, v1.16b
    /// assert_eq!(code.bytes(), &[0x00, 0x58, 0x20, 0x6E, 0x21, 0x58, 0x20, 0x6E]);
    /// # Ok::<(), simd_asm::GenError>(())
    /// ```
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume and return the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of bytes generated.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing was generated.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bound labels and their absolute addresses, in creation order.
    pub fn labels(&self) -> &[(Label, u64)] {
        &self.labels
    }

    /// Absolute address of a bound label.
    pub fn label_address(&self, label: Label) -> Option<u64> {
        self.labels
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, addr)| *addr)
    }

    /// Address of the first byte.
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Render address, hex bytes and (when listing was enabled) the
    /// pseudo-instruction each sequence came from.
    ///
    /// ```text
    /// 00000000                  L0:
    /// 00000000  0058206E2158206E  not v0, v0
    /// ```
    pub fn listing(&self) -> String {
        use core::fmt::Write;

        let base = self.base_address;
        let mut label_at: BTreeMap<u64, Vec<Label>> = BTreeMap::new();
        for (label, addr) in &self.labels {
            label_at.entry(*addr).or_default().push(*label);
        }
        let text_at: BTreeMap<u64, &str> = self
            .annotations
            .iter()
            .map(|(addr, text)| (*addr, text.as_str()))
            .collect();
        let splits: BTreeSet<u64> = label_at.keys().chain(text_at.keys()).copied().collect();

        let mut out = String::new();
        let mut addr = base;
        let mut i = 0;
        while i < self.bytes.len() {
            for label in label_at.get(&addr).into_iter().flatten() {
                let _ = writeln!(out, "{:08X}                  {}:", addr, label);
            }

            // Rows of up to 8 bytes, broken at labels and sequence starts.
            let mut end = (i + 8).min(self.bytes.len());
            if let Some(&next) = splits.range(addr + 1..base + end as u64).next() {
                end = (next - base) as usize;
            }
            let hex = self.bytes[i..end].iter().fold(String::new(), |mut acc, b| {
                let _ = write!(acc, "{:02X}", b);
                acc
            });
            match text_at.get(&addr) {
                Some(text) => {
                    let _ = writeln!(out, "{:08X}  {:<16}  {}", addr, hex, text);
                }
                None => {
                    let _ = writeln!(out, "{:08X}  {:<16}", addr, hex);
                }
            }
            addr += (end - i) as u64;
            i = end;
        }
        for label in label_at.get(&addr).into_iter().flatten() {
            let _ = writeln!(out, "{:08X}                  {}:", addr, label);
        }
        out
    }
}

/// Caps on what one generator may produce.
///
/// ```rust
/// use simd_asm::{Generator, Limits, NeonPair};
///
/// let mut gen = Generator::new(NeonPair::new());
/// gen.limits(Limits {
///     max_output_bytes: 4096,
///     ..Limits::default()
/// });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Limits {
    /// Maximum output size in bytes. Default: 16 MiB.
    pub max_output_bytes: usize,
    /// Maximum number of labels. Default: 100,000.
    pub max_labels: usize,
    /// Maximum lanes unrolled by one emulated sequence. Default: 256.
    pub max_emulated_lanes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_output_bytes: 16 * 1024 * 1024,
            max_labels: 100_000,
            max_emulated_lanes: 256,
        }
    }
}

/// Builder-style code generator over one backend.
///
/// # Examples
///
/// ```rust
/// use simd_asm::{Elem, Generator, Mask, MaskCond, NeonPair, VReg};
///
/// let mut gen = Generator::new(NeonPair::new());
/// let done = gen.new_label()?;
/// let (a, b, m) = (VReg::logical(0), VReg::logical(1), VReg::logical(2));
/// gen.cmp(simd_asm::Cond::Eq, Elem::U16, Mask::Vector(m), a, b)?;
/// gen.mkj(Elem::U16, Mask::Vector(m), MaskCond::None, done)?;
/// gen.add(Elem::U16, a, b)?;
/// gen.bind(done)?;
/// let code = gen.finish()?;
/// assert_eq!(code.label_address(done), Some(code.len() as u64));
/// # Ok::<(), simd_asm::GenError>(())
/// ```
#[derive(Debug)]
pub struct Generator<B: Backend> {
    backend: B,
    out: CodeStream,
    scratch: Option<Scratch>,
    limits: Limits,
    listing_enabled: bool,
    base_address: u64,
    /// Stream offset and rendered text of every expanded sequence.
    annotations: Vec<(usize, String)>,
}

impl<B: Backend> Generator<B> {
    /// Create a generator emitting for `backend`.
    pub fn new(backend: B) -> Self {
        let order = backend.byte_order();
        Self {
            backend,
            out: CodeStream::new(order),
            scratch: None,
            limits: Limits::default(),
            listing_enabled: false,
            base_address: 0,
            annotations: Vec::new(),
        }
    }

    /// The backend this generator lowers for.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Provide the scratch regions used by lane-by-lane emulation.
    pub fn scratch(&mut self, scratch: Scratch) -> &mut Self {
        self.scratch = Some(scratch);
        self
    }

    /// Set resource limits. See [`Limits`] for the defaults.
    pub fn limits(&mut self, limits: Limits) -> &mut Self {
        self.limits = limits;
        self
    }

    /// Record each pseudo-instruction for [`Code::listing`].
    pub fn enable_listing(&mut self) -> &mut Self {
        self.listing_enabled = true;
        self
    }

    /// Address of the first generated byte, used for label addresses.
    pub fn base_address(&mut self, addr: u64) -> &mut Self {
        self.base_address = addr;
        self
    }

    /// Bytes generated so far.
    pub fn len(&self) -> usize {
        self.out.len()
    }

    /// Whether nothing has been generated yet.
    pub fn is_empty(&self) -> bool {
        self.out.len() == 0
    }

    /// Create a fresh, unbound label.
    pub fn new_label(&mut self) -> Result<Label, GenError> {
        if self.out.label_count() >= self.limits.max_labels {
            return Err(GenError::ResourceLimitExceeded {
                resource: String::from("labels"),
                limit: self.limits.max_labels,
            });
        }
        Ok(self.out.new_label())
    }

    /// Bind `label` to the current position.
    pub fn bind(&mut self, label: Label) -> Result<&mut Self, GenError> {
        self.out.bind(label)?;
        Ok(self)
    }

    /// Expand one pseudo-instruction.
    ///
    /// On error the output is left exactly as it was before the call.
    pub fn emit(&mut self, op: &Pseudo) -> Result<&mut Self, GenError> {
        if let Pseudo::MaskJump { target, .. } = op {
            if !self.out.knows(*target) {
                return Err(GenError::UnknownLabel { label: target.id() });
            }
        }

        let cp = self.out.checkpoint();
        let start = self.out.len();
        let mut cx = Cx {
            out: &mut self.out,
            scratch: self.scratch,
            limits: self.limits,
        };
        let lowered = backend::check_aliasing(&self.backend, op)
            .and_then(|()| self.backend.lower(&mut cx, op));
        if let Err(fault) = lowered {
            self.out.rollback(cp);
            let err = fault.into_error(op.to_string(), B::NAME);
            log::debug!("{}: {}", B::NAME, err);
            return Err(err);
        }

        if self.out.len() > self.limits.max_output_bytes {
            self.out.rollback(cp);
            return Err(GenError::ResourceLimitExceeded {
                resource: String::from("output bytes"),
                limit: self.limits.max_output_bytes,
            });
        }

        log::debug!(
            "{} -> {} ({} bytes)",
            op,
            B::NAME,
            self.out.len() - start
        );
        if self.listing_enabled {
            self.annotations.push((start, op.to_string()));
        }
        Ok(self)
    }

    /// Link branches and return the finished code.
    pub fn finish(self) -> Result<Code, GenError> {
        let base = self.base_address;
        let (bytes, labels) = self.out.link()?;
        Ok(Code {
            bytes,
            labels: labels
                .into_iter()
                .map(|(l, at)| (l, base + at as u64))
                .collect(),
            base_address: base,
            annotations: self
                .annotations
                .into_iter()
                .map(|(at, text)| (base + at as u64, text))
                .collect(),
        })
    }

    // ── Convenience forms ───────────────────────────────────────────────
    //
    // Two-operand forms are exactly `op(g, s) == op3(g, g, s)`.

    /// Register copy.
    pub fn mov(&mut self, dst: VReg, src: VReg) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Move {
            dst,
            src: Src::Reg(src),
        })
    }

    /// Load a logical vector.
    pub fn load(&mut self, dst: VReg, mem: Mem) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Move {
            dst,
            src: Src::Mem(mem),
        })
    }

    /// Store a logical vector.
    pub fn store(&mut self, src: VReg, mem: Mem) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Store { src, mem })
    }

    /// Bitwise logic, three-operand form.
    pub fn logic3(
        &mut self,
        op: LogicOp,
        dst: VReg,
        src1: VReg,
        src2: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Logic {
            op,
            dst,
            src1,
            src2: src2.into(),
        })
    }

    pub fn and3(&mut self, dst: VReg, a: VReg, b: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.logic3(LogicOp::And, dst, a, b)
    }

    pub fn and(&mut self, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.and3(g, g, s)
    }

    /// `dst = !a & b`
    pub fn andn3(&mut self, dst: VReg, a: VReg, b: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.logic3(LogicOp::AndNot, dst, a, b)
    }

    pub fn andn(&mut self, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.andn3(g, g, s)
    }

    pub fn or3(&mut self, dst: VReg, a: VReg, b: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.logic3(LogicOp::Or, dst, a, b)
    }

    pub fn or(&mut self, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.or3(g, g, s)
    }

    pub fn xor3(&mut self, dst: VReg, a: VReg, b: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.logic3(LogicOp::Xor, dst, a, b)
    }

    pub fn xor(&mut self, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.xor3(g, g, s)
    }

    /// Bitwise complement in place.
    pub fn not(&mut self, g: VReg) -> Result<&mut Self, GenError> {
        self.not2(g, g)
    }

    /// Bitwise complement.
    pub fn not2(&mut self, dst: VReg, src: VReg) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Not { dst, src })
    }

    /// Lane arithmetic, three-operand form.
    pub fn arith3(
        &mut self,
        op: ArithOp,
        elem: Elem,
        dst: VReg,
        src1: VReg,
        src2: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Arith {
            op,
            elem,
            dst,
            src1,
            src2: src2.into(),
        })
    }

    pub fn add3(
        &mut self,
        elem: Elem,
        dst: VReg,
        a: VReg,
        b: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.arith3(ArithOp::Add, elem, dst, a, b)
    }

    pub fn add(&mut self, elem: Elem, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.add3(elem, g, g, s)
    }

    pub fn sub3(
        &mut self,
        elem: Elem,
        dst: VReg,
        a: VReg,
        b: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.arith3(ArithOp::Sub, elem, dst, a, b)
    }

    pub fn sub(&mut self, elem: Elem, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.sub3(elem, g, g, s)
    }

    /// Saturating add.
    pub fn adds3(
        &mut self,
        elem: Elem,
        dst: VReg,
        a: VReg,
        b: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.arith3(ArithOp::AddSat, elem, dst, a, b)
    }

    pub fn adds(&mut self, elem: Elem, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.adds3(elem, g, g, s)
    }

    /// Saturating subtract.
    pub fn subs3(
        &mut self,
        elem: Elem,
        dst: VReg,
        a: VReg,
        b: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.arith3(ArithOp::SubSat, elem, dst, a, b)
    }

    pub fn subs(&mut self, elem: Elem, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.subs3(elem, g, g, s)
    }

    /// Low-half multiply.
    pub fn mul3(
        &mut self,
        elem: Elem,
        dst: VReg,
        a: VReg,
        b: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.arith3(ArithOp::Mul, elem, dst, a, b)
    }

    pub fn mul(&mut self, elem: Elem, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.mul3(elem, g, g, s)
    }

    pub fn min3(
        &mut self,
        elem: Elem,
        dst: VReg,
        a: VReg,
        b: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.arith3(ArithOp::Min, elem, dst, a, b)
    }

    pub fn min(&mut self, elem: Elem, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.min3(elem, g, g, s)
    }

    pub fn max3(
        &mut self,
        elem: Elem,
        dst: VReg,
        a: VReg,
        b: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.arith3(ArithOp::Max, elem, dst, a, b)
    }

    pub fn max(&mut self, elem: Elem, g: VReg, s: impl Into<Src>) -> Result<&mut Self, GenError> {
        self.max3(elem, g, g, s)
    }

    pub fn shl3(
        &mut self,
        elem: Elem,
        dst: VReg,
        src: VReg,
        count: Count,
    ) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Shift {
            op: ShiftOp::Shl,
            elem,
            dst,
            src,
            count,
        })
    }

    pub fn shl(&mut self, elem: Elem, g: VReg, count: Count) -> Result<&mut Self, GenError> {
        self.shl3(elem, g, g, count)
    }

    /// Shift right; arithmetic for signed elements.
    pub fn shr3(
        &mut self,
        elem: Elem,
        dst: VReg,
        src: VReg,
        count: Count,
    ) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Shift {
            op: ShiftOp::Shr,
            elem,
            dst,
            src,
            count,
        })
    }

    pub fn shr(&mut self, elem: Elem, g: VReg, count: Count) -> Result<&mut Self, GenError> {
        self.shr3(elem, g, g, count)
    }

    /// Compare lanes into `mask`.
    pub fn cmp(
        &mut self,
        cond: Cond,
        elem: Elem,
        mask: Mask,
        src1: VReg,
        src2: impl Into<Src>,
    ) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Compare {
            cond,
            elem,
            mask,
            src1,
            src2: src2.into(),
        })
    }

    /// `dst[i] = mask[i] ? src[i] : dst[i]`
    pub fn merge(
        &mut self,
        elem: Elem,
        dst: VReg,
        src: impl Into<Src>,
        mask: Mask,
    ) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::Merge {
            elem,
            dst,
            src: src.into(),
            mask,
        })
    }

    /// Branch to `target` when no lane (`None`) or every lane (`Full`) of
    /// `mask` is set.
    pub fn mkj(
        &mut self,
        elem: Elem,
        mask: Mask,
        when: MaskCond,
        target: Label,
    ) -> Result<&mut Self, GenError> {
        self.emit(&Pseudo::MaskJump {
            elem,
            mask,
            when,
            target,
        })
    }
}
