//! Error types for rollsync operations.

use thiserror::Error;

use crate::protocol::{MAX_DATA_LEN, MAX_STRONG_HASH_LEN};

/// Errors that can occur while generating, encoding, or applying deltas.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from an underlying stream. Surfaced unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream does not start with the rsync magic value.
    #[error("corrupt stream: bad magic value")]
    BadMagic,

    /// Stream header carries a different type than the caller expected.
    #[error("incorrect stream type: expecting {expected}, got {actual}")]
    UnexpectedType {
        /// Type the caller asked for.
        expected: u8,
        /// Type found in the header.
        actual: u8,
    },

    /// Stream header names a compression scheme this build does not know.
    #[error("unknown compression scheme: {0}")]
    UnknownCompression(u8),

    /// Varint field was truncated or overflowed 64 bits.
    #[error("corrupt stream: bad varint")]
    Varint,

    /// Strong hash length field exceeds the wire bound.
    #[error("strong hash too long: {0} bytes, max {MAX_STRONG_HASH_LEN}")]
    HashTooLong(usize),

    /// DATA payload length field exceeds the wire bound.
    #[error("data payload too long: {0} bytes, max {MAX_DATA_LEN}")]
    DataTooLong(usize),

    /// Delta body contains an operation tag this build does not know.
    #[error("unknown operation tag: {0}")]
    UnknownOp(u8),

    /// Reconstructed output hashed to a different digest than the delta
    /// carried.
    #[error("content hash mismatch: expected {expected:02x?}, got {actual:02x?}")]
    HashMismatch {
        /// Digest transmitted in the terminal HASH op.
        expected: Vec<u8>,
        /// Digest computed over the reconstructed output.
        actual: Vec<u8>,
    },

    /// Verification was requested but the delta carried no HASH op.
    #[error("verification requested but delta carries no content hash")]
    MissingHash,

    /// The consumer side of an operation pipeline hung up early.
    #[error("operation pipeline closed by consumer")]
    PipelineClosed,
}

/// Result type for rollsync operations.
pub type Result<T> = std::result::Result<T, Error>;
