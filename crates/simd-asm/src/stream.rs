//! Output code stream with labels and branch fixups.
//!
//! The stream is the single writer of generated code. Branches to labels
//! that are not yet bound are recorded as fixups and patched when the
//! stream is linked. [`Checkpoint`]s let the generator undo a partially
//! lowered pseudo-instruction so a failing `emit` leaves no bytes behind.

use alloc::vec::Vec;

use crate::error::GenError;
use crate::ir::Label;

/// Byte order of fixed-width instruction words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endian {
    Little,
    Big,
}

/// Branch displacement field to patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FixupKind {
    /// A64 `b.cond` / `cbz` / `cbnz`: signed word offset in bits 23:5.
    A64Imm19,
    /// POWER `bc`: signed byte offset in bits 15:2.
    PpcBd14,
    /// x86 `jcc rel32`: relative to the end of the 4-byte field.
    X86Rel32,
}

impl FixupKind {
    /// Largest forward displacement in bytes.
    fn max(self) -> i64 {
        match self {
            FixupKind::A64Imm19 => (1 << 20) - 4,
            FixupKind::PpcBd14 => (1 << 15) - 4,
            FixupKind::X86Rel32 => i32::MAX as i64,
        }
    }

    fn min(self) -> i64 {
        match self {
            FixupKind::A64Imm19 => -(1 << 20),
            FixupKind::PpcBd14 => -(1 << 15),
            FixupKind::X86Rel32 => i32::MIN as i64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    at: usize,
    kind: FixupKind,
    label: Label,
}

/// Undo point for [`CodeStream::rollback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Checkpoint {
    bytes: usize,
    fixups: usize,
}

/// Linked output: bytes plus `(label, offset)` for every bound label.
pub(crate) type Linked = (Vec<u8>, Vec<(Label, usize)>);

#[derive(Debug, Clone)]
pub(crate) struct CodeStream {
    bytes: Vec<u8>,
    order: Endian,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

impl CodeStream {
    pub(crate) fn new(order: Endian) -> Self {
        Self {
            bytes: Vec::new(),
            order,
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Append one fixed-width instruction word in the stream's byte order.
    #[inline]
    pub(crate) fn word(&mut self, word: u32) {
        match self.order {
            Endian::Little => self.bytes.extend_from_slice(&word.to_le_bytes()),
            Endian::Big => self.bytes.extend_from_slice(&word.to_be_bytes()),
        }
    }

    #[inline]
    pub(crate) fn bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    #[inline]
    pub(crate) fn byte(&mut self, b: u8) {
        self.bytes.push(b);
    }

    /// Append a branch word whose displacement field is patched at link time.
    pub(crate) fn branch_word(&mut self, word: u32, kind: FixupKind, label: Label) {
        self.fixups.push(Fixup {
            at: self.bytes.len(),
            kind,
            label,
        });
        self.word(word);
    }

    /// Append a zeroed rel32 field patched at link time.
    pub(crate) fn rel32(&mut self, label: Label) {
        self.fixups.push(Fixup {
            at: self.bytes.len(),
            kind: FixupKind::X86Rel32,
            label,
        });
        self.bytes.extend_from_slice(&[0; 4]);
    }

    pub(crate) fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    pub(crate) fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Bind `label` to the current offset.
    pub(crate) fn bind(&mut self, label: Label) -> Result<(), GenError> {
        let here = self.bytes.len();
        match self.labels.get_mut(label.0 as usize) {
            None => Err(GenError::UnknownLabel { label: label.0 }),
            Some(Some(first)) => Err(GenError::DuplicateLabel {
                label: label.0,
                first: *first,
            }),
            Some(slot) => {
                *slot = Some(here);
                Ok(())
            }
        }
    }

    /// Whether `label` was created by this stream.
    pub(crate) fn knows(&self, label: Label) -> bool {
        (label.0 as usize) < self.labels.len()
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            bytes: self.bytes.len(),
            fixups: self.fixups.len(),
        }
    }

    pub(crate) fn rollback(&mut self, cp: Checkpoint) {
        self.bytes.truncate(cp.bytes);
        self.fixups.truncate(cp.fixups);
    }

    fn read_word(&self, at: usize) -> u32 {
        let mut w = [0u8; 4];
        w.copy_from_slice(&self.bytes[at..at + 4]);
        match self.order {
            Endian::Little => u32::from_le_bytes(w),
            Endian::Big => u32::from_be_bytes(w),
        }
    }

    fn write_word(&mut self, at: usize, word: u32) {
        let w = match self.order {
            Endian::Little => word.to_le_bytes(),
            Endian::Big => word.to_be_bytes(),
        };
        self.bytes[at..at + 4].copy_from_slice(&w);
    }

    /// Patch every fixup and return the final bytes and label offsets.
    pub(crate) fn link(mut self) -> Result<Linked, GenError> {
        let fixups = core::mem::take(&mut self.fixups);
        for f in &fixups {
            let target = self
                .labels
                .get(f.label.0 as usize)
                .copied()
                .flatten()
                .ok_or(GenError::UndefinedLabel { label: f.label.0 })?;
            let origin = match f.kind {
                FixupKind::X86Rel32 => f.at + 4,
                _ => f.at,
            };
            let disp = target as i64 - origin as i64;
            if disp < f.kind.min() || disp > f.kind.max() {
                return Err(GenError::BranchOutOfRange {
                    label: f.label.0,
                    disp,
                    max: f.kind.max(),
                });
            }
            log::trace!("fixup {:?} at {:#x} -> L{} ({:+})", f.kind, f.at, f.label.0, disp);
            match f.kind {
                FixupKind::A64Imm19 => {
                    let w = self.read_word(f.at) & !(0x7FFFF << 5);
                    self.write_word(f.at, w | (((disp >> 2) as u32 & 0x7FFFF) << 5));
                }
                FixupKind::PpcBd14 => {
                    let w = self.read_word(f.at) & !0xFFFC;
                    self.write_word(f.at, w | (disp as u32 & 0xFFFC));
                }
                FixupKind::X86Rel32 => {
                    self.bytes[f.at..f.at + 4].copy_from_slice(&(disp as i32).to_le_bytes());
                }
            }
        }

        let labels = self
            .labels
            .iter()
            .enumerate()
            .filter_map(|(i, at)| at.map(|at| (Label(i as u32), at)))
            .collect();
        Ok((self.bytes, labels))
    }
}
