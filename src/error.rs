//! Crate-wide error type.
//!
//! Every fallible operation in the crate reports through [`Error`]. Errors
//! surface synchronously to the caller of the operation that triggered them;
//! none are retried or silently downgraded, and each variant names the
//! violated contract so failures stay diagnosable without inspecting
//! internals.

use core::fmt;

/// All errors returned by `ragbox`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// More than one construction hint was supplied.
    ConflictingHints {
        /// Names of the hints that were given.
        given: Vec<&'static str>,
    },

    /// A type string could not be parsed.
    TypeParse {
        /// The offending input.
        input: String,
        /// Byte offset where parsing failed.
        offset: usize,
        /// What went wrong.
        reason: &'static str,
    },

    /// A resolved or declared type is incompatible with the supplied value,
    /// buffer, or operand.
    TypeMismatch {
        /// The type (or operation) involved.
        context: String,
        /// What went wrong.
        reason: String,
    },

    /// A device string is malformed.
    DeviceParse {
        /// The offending input.
        input: String,
        /// What went wrong.
        reason: &'static str,
    },

    /// The operation is explicitly disallowed on arrays.
    UnsupportedOperation {
        /// The operation that was requested.
        op: &'static str,
        /// Why it is not available.
        reason: &'static str,
    },

    /// A universal-function bridge operand is not an array.
    OperandType {
        /// What the bridge expected.
        expected: &'static str,
        /// The kind of operand that was actually given.
        found: String,
    },

    /// A validated buffer import found a size mismatch.
    BufferValidation {
        /// The declared type.
        type_str: String,
        /// Bytes the type requires.
        expected: usize,
        /// Bytes the exporter provided.
        got: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictingHints { given } => {
                write!(
                    f,
                    "the 'type', 'dtype', 'levels', 'typedef' and 'dtypedef' hints are \
                     mutually exclusive, got {}",
                    given.join(" and ")
                )
            }
            Self::TypeParse {
                input,
                offset,
                reason,
            } => {
                write!(f, "invalid type string {input:?} at offset {offset}: {reason}")
            }
            Self::TypeMismatch { context, reason } => {
                write!(f, "type mismatch for '{context}': {reason}")
            }
            Self::DeviceParse { input, reason } => {
                write!(f, "invalid device string {input:?}: {reason}")
            }
            Self::UnsupportedOperation { op, reason } => {
                write!(f, "{op} is not supported: {reason}")
            }
            Self::OperandType { expected, found } => {
                write!(f, "all operands must be {expected}, got {found}")
            }
            Self::BufferValidation {
                type_str,
                expected,
                got,
            } => {
                write!(
                    f,
                    "buffer does not fit type '{type_str}': expected {expected} bytes, \
                     exporter provided {got}"
                )
            }
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
