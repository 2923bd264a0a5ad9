//! # rollsync
//!
//! Streaming delta encoding with the rsync algorithm, in pure Rust.
//!
//! Given a *basis* (what the receiver already has) and a *source* (what
//! the receiver wants), rollsync produces a compact delta that rebuilds
//! the source from the basis, without either side ever holding both
//! files at once.
//!
//! ## Pipeline
//!
//! 1. **Signature**: the receiver hashes its basis in fixed-size blocks
//!    (a cheap rolling checksum plus a strong digest per block).
//! 2. **Delta**: the sender slides a window over the source, matching
//!    blocks against the signature, and emits BLOCK references for
//!    matches and DATA literals for everything else.
//! 3. **Patch**: the receiver replays the operations against the basis
//!    to reconstruct the source, optionally verifying a terminal
//!    content hash.
//!
//! ## Example
//!
//! ```rust
//! use std::io::Cursor;
//! use rollsync::SyncBuilder;
//!
//! let sync = SyncBuilder::new().block_size(2048).build();
//!
//! let basis = b"the original file contents";
//! let source = b"the modified file contents";
//!
//! let signature = sync.signature(Cursor::new(basis.as_slice())).unwrap();
//! let delta = sync.delta(Cursor::new(source.as_slice()), &signature).unwrap();
//!
//! let mut output = Vec::new();
//! sync.apply_delta(&mut Cursor::new(basis.as_slice()), delta, &mut output, None)
//!     .unwrap();
//! assert_eq!(output, source);
//! ```
//!
//! The engine is I/O-agnostic: it reads and writes plain [`std::io`]
//! streams and never retries or seeks behind the caller's back (the
//! patch basis is the one seekable input). The wire format for shipping
//! signatures and deltas between machines lives in [`protocol`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

mod checksum;
mod delta;
mod error;
mod hash;
pub mod protocol;
mod sbuffer;
mod signature;
mod sync;
mod varint;

pub use checksum::RollingChecksum;
pub use delta::Operation;
pub use error::{Error, Result};
pub use hash::{Blake3Hasher, Md5Hasher, StrongHashKind, StrongHasher};
pub use protocol::{Compression, FrameReader, FrameWriter, StreamKind};
pub use sbuffer::ShiftBuffer;
pub use signature::{BlockHash, SignatureIndex};
pub use sync::{RollSync, SyncBuilder, SyncConfig, DEFAULT_BLOCK_SIZE};
