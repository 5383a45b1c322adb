//! Value codec errors.

use thiserror::Error;

/// Errors raised while converting between wire bytes and Rust values.
///
/// These are attached to the value or parameter in which they arise; the
/// connection and the running exchange continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// No codec accepts the column type / target kind pair.
    #[error("cannot decode {server_type} as {target}")]
    TypeMismatch {
        /// The column's formal type name.
        server_type: &'static str,
        /// The requested target kind.
        target: &'static str,
    },

    /// No codec can encode the given value.
    #[error("cannot encode value of kind {0}")]
    Unencodable(&'static str),

    /// Fewer value bytes than the type requires.
    #[error("value truncated: need {needed} bytes, have {available}")]
    UnexpectedEof {
        /// Bytes the value shape requires.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// A fractional-second scale outside 0..=7.
    #[error("invalid time scale {0}")]
    InvalidScale(u8),

    /// A decimal wider than 38 digits, or a value outside the target domain.
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),

    /// A byte pattern outside the value domain.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// Malformed character data.
    #[error("invalid string encoding")]
    InvalidEncoding,
}
