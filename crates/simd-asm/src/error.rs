//! Error types for pseudo-instruction generation.
//!
//! Every failure happens at generation time. Backends report a context-free
//! [`Fault`]; the generator wraps it into a [`GenError`] that names the
//! rendered pseudo-instruction and the backend it was lowered for.

use alloc::string::String;
use core::fmt;

/// The backend that failed, carried in every lowering error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendName {
    /// ARM NEON, two 128-bit `q` registers per logical vector.
    NeonPair,
    /// ARM SVE, two scalable `z` registers per logical vector.
    SvePair,
    /// POWER VSX, two 128-bit VSRs per logical vector.
    VsxPair,
    /// POWER VMX (AltiVec), two 128-bit VRs per logical vector.
    VmxPair,
    /// AVX-512, one `zmm` per logical vector.
    Avx512x1,
    /// AVX-512, two `zmm` per logical vector.
    Avx512x2,
    /// AVX-512, four `zmm` per logical vector.
    Avx512x4,
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendName::NeonPair => "neon-pair",
            BackendName::SvePair => "sve-pair",
            BackendName::VsxPair => "vsx-pair",
            BackendName::VmxPair => "vmx-pair",
            BackendName::Avx512x1 => "avx512-x1",
            BackendName::Avx512x2 => "avx512-x2",
            BackendName::Avx512x4 => "avx512-x4",
        })
    }
}

/// Generation error.
///
/// The three lowering variants carry the offending pseudo-instruction as
/// rendered text (`instr`, e.g. `"add.u8 v0, v1, [r3+20]"`) and the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GenError {
    /// An immediate or displacement cannot be encoded, even through the
    /// backend's temporary-register fallback.
    #[error("{backend}: `{instr}`: immediate {value} is not representable: {detail}")]
    UnrepresentableImmediate {
        /// The rendered pseudo-instruction.
        instr: String,
        /// The backend the instruction was lowered for.
        backend: BackendName,
        /// The value that did not fit.
        value: i64,
        /// Which encoding rule rejected it.
        detail: String,
    },

    /// The operation has no native or emulated lowering in this configuration.
    #[error("{backend}: `{instr}`: unsupported operation: {detail}")]
    UnsupportedOperation {
        /// The rendered pseudo-instruction.
        instr: String,
        /// The backend the instruction was lowered for.
        backend: BackendName,
        /// What is missing.
        detail: String,
    },

    /// An operand has the wrong kind, the wrong physical count, or collides
    /// with a reserved register.
    #[error("{backend}: `{instr}`: operand role violation: {detail}")]
    OperandRoleViolation {
        /// The rendered pseudo-instruction.
        instr: String,
        /// The backend the instruction was lowered for.
        backend: BackendName,
        /// Which operand is wrong and why.
        detail: String,
    },

    /// A branch targets a label that was never bound.
    #[error("undefined label L{label}")]
    UndefinedLabel {
        /// The label id.
        label: u32,
    },

    /// A label was bound twice.
    #[error("label L{label} bound twice (first at offset {first})")]
    DuplicateLabel {
        /// The label id.
        label: u32,
        /// Offset of the first binding.
        first: usize,
    },

    /// A label id that this generator did not create.
    #[error("unknown label L{label}")]
    UnknownLabel {
        /// The label id.
        label: u32,
    },

    /// The branch displacement does not fit the instruction's offset field.
    #[error("branch to L{label} out of range: displacement {disp} exceeds ±{max}")]
    BranchOutOfRange {
        /// The target label id.
        label: u32,
        /// The actual byte displacement.
        disp: i64,
        /// Maximum allowed displacement.
        max: i64,
    },

    /// A backend was constructed with parameters the ISA does not allow.
    #[error("{backend}: invalid configuration: {detail}")]
    InvalidConfiguration {
        /// The backend being configured.
        backend: BackendName,
        /// What is wrong.
        detail: String,
    },

    /// A configurable resource limit was exceeded.
    #[error("resource limit exceeded: {resource} (limit: {limit})")]
    ResourceLimitExceeded {
        /// Human-readable name of the resource.
        resource: String,
        /// The configured limit.
        limit: usize,
    },
}

/// A lowering failure before the generator attaches instruction context.
#[doc(hidden)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Unrepresentable { value: i64, detail: String },
    Unsupported(String),
    Role(String),
    Limit { resource: &'static str, limit: usize },
}

impl Fault {
    pub(crate) fn role(detail: impl Into<String>) -> Self {
        Fault::Role(detail.into())
    }

    pub(crate) fn unsupported(detail: impl Into<String>) -> Self {
        Fault::Unsupported(detail.into())
    }

    pub(crate) fn unrepresentable(value: i64, detail: impl Into<String>) -> Self {
        Fault::Unrepresentable {
            value,
            detail: detail.into(),
        }
    }

    /// Attach the rendered instruction and backend name.
    pub(crate) fn into_error(self, instr: String, backend: BackendName) -> GenError {
        match self {
            Fault::Unrepresentable { value, detail } => GenError::UnrepresentableImmediate {
                instr,
                backend,
                value,
                detail,
            },
            Fault::Unsupported(detail) => GenError::UnsupportedOperation {
                instr,
                backend,
                detail,
            },
            Fault::Role(detail) => GenError::OperandRoleViolation {
                instr,
                backend,
                detail,
            },
            Fault::Limit { resource, limit } => GenError::ResourceLimitExceeded {
                resource: String::from(resource),
                limit,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_names_instruction_and_backend() {
        let err = Fault::unrepresentable(17, "lvx needs 16-byte alignment")
            .into_error(String::from("mov v0, [r3+17]"), BackendName::VmxPair);
        assert_eq!(
            err.to_string(),
            "vmx-pair: `mov v0, [r3+17]`: immediate 17 is not representable: lvx needs 16-byte alignment"
        );
    }

    #[test]
    fn role_fault_maps_to_operand_role_violation() {
        let err = Fault::role("v30 is reserved").into_error(String::from("not v15"), BackendName::NeonPair);
        assert!(matches!(
            err,
            GenError::OperandRoleViolation {
                backend: BackendName::NeonPair,
                ..
            }
        ));
        assert!(err.to_string().contains("v30 is reserved"));
    }

    #[test]
    fn limit_fault_drops_instruction_context() {
        let err = Fault::Limit {
            resource: "emulated lanes",
            limit: 8,
        }
        .into_error(String::from("mul.u8 v0, v1, v2"), BackendName::Avx512x1);
        assert_eq!(
            err,
            GenError::ResourceLimitExceeded {
                resource: String::from("emulated lanes"),
                limit: 8
            }
        );
    }

    #[test]
    fn backend_names_render_lowercase() {
        assert_eq!(BackendName::Avx512x4.to_string(), "avx512-x4");
        assert_eq!(BackendName::SvePair.to_string(), "sve-pair");
    }
}
