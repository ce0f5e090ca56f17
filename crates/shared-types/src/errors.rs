//! Error types shared across the workspace boundary.

use thiserror::Error;

/// Errors raised while encoding or decoding RLP.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RlpError {
    #[error("unexpected end of input while decoding RLP")]
    UnexpectedEof,
    #[error("trailing bytes after a complete RLP item")]
    TrailingBytes,
    #[error("expected the other RLP item kind (bytes vs list)")]
    UnexpectedType,
    #[error("integer exceeds the maximum representable width")]
    IntegerTooLarge,
    #[error("field count mismatch while decoding a fixed-shape list")]
    ArityMismatch,
}
