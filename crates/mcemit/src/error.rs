//! Error type for the checked construction/validation surface.
//!
//! The emitters themselves fail fast on invariant violations — continuing
//! would silently produce wrong machine code, so those paths `assert!`.
//! [`EmitError`] exists for the *checked* entry points (`Address::try_new`
//! and friends) that fuzz targets and property tests drive with
//! arbitrary inputs.

use core::fmt;

/// Why a checked constructor or validation rejected its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EmitError {
    /// The index register uses the encoding reserved for "no index, SIB
    /// present" (the stack-pointer encoding, 0b100).
    ReservedIndexEncoding {
        /// The offending register encoding.
        num: u8,
    },

    /// Scale factor is not 1, 2, 4, or 8.
    InvalidScale {
        /// The rejected scale factor.
        scale: u8,
    },

    /// Displacement does not fit the signed 32-bit addressing field.
    DisplacementOverflow {
        /// The rejected displacement.
        disp: i64,
    },

    /// Immediate value exceeds the allowed range for the selected form.
    ImmediateOverflow {
        /// The rejected immediate.
        value: i64,
        /// Minimum representable value.
        min: i64,
        /// Maximum representable value.
        max: i64,
    },

    /// The requested encoding needs a CPU feature tier above the one the
    /// emitter was configured with (e.g. EVEX semantics without AVX-512).
    FeatureUnavailable,

    /// A register from the wrong bank was supplied (e.g. a mask register
    /// as an addressing base).
    WrongRegisterClass,
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::ReservedIndexEncoding { num } => write!(
                f,
                "register encoding {num} is reserved to mean \"no index\" and cannot be an index"
            ),
            EmitError::InvalidScale { scale } => {
                write!(f, "scale factor {scale} is not one of 1, 2, 4, 8")
            }
            EmitError::DisplacementOverflow { disp } => {
                write!(f, "displacement {disp:#x} does not fit a signed 32-bit field")
            }
            EmitError::ImmediateOverflow { value, min, max } => {
                write!(f, "immediate {value} outside allowed range [{min}, {max}]")
            }
            EmitError::FeatureUnavailable => {
                write!(f, "encoding requires a CPU feature tier above the configured one")
            }
            EmitError::WrongRegisterClass => {
                write!(f, "register bank not valid in this position")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EmitError {}
