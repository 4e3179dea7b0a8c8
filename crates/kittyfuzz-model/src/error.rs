//! Error types for the data model and mutation engine.
//!
//! All failures here are deterministic and surface while a template is
//! constructed or first initialised. Rendering itself does not fail.

use thiserror::Error;

/// Failure raised by an encoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The value does not fit in the configured bit length.
    #[error("value {value} does not fit in {length} bits (signed={signed})")]
    OutOfRange {
        value: i128,
        length: u32,
        signed: bool,
    },
    /// Endian encodings are only defined for whole bytes.
    #[error("endian encoding requires a byte-aligned length, got {0} bits")]
    NotByteAligned(u32),
    /// The encoding exists but does not support the requested shape.
    #[error("unsupported encoding: {0}")]
    Unsupported(String),
    /// A block cipher could not be configured.
    #[error("cipher error: {0}")]
    Cipher(String),
}

/// Failure raised while building a template tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A field was constructed with inconsistent parameters.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A named dependency could not be resolved in any enclosing scope.
    #[error("unresolved dependency: {0}")]
    UnresolvedDependency(String),
    /// An encoder rejected a default value or its configuration.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl ModelError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ModelError::InvalidParameter(msg.into())
    }
}
