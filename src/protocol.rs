//! Binary wire format for signature and delta streams.
//!
//! Every stream opens with a fixed 10-byte header:
//!
//! ```text
//! ┌───────────┬──────┬─────────────┬────────────┐
//! │   MAGIC   │ TYPE │ COMPRESSION │ BLOCK SIZE │
//! │ 4 (BE)    │  1   │      1      │   4 (BE)   │
//! └───────────┴──────┴─────────────┴────────────┘
//! ```
//!
//! The remainder of the stream (optionally gzip-wrapped) is a sequence
//! of records to EOF. Signature records are `uvarint index · u32 BE weak
//! hash · uvarint length · strong hash`. Delta records start with a tag
//! byte (`0` BLOCK, `1` BLOCK_RANGE, `2` DATA, `3` HASH) followed by
//! uvarint fields and, for DATA/HASH, a length-prefixed payload.

use std::borrow::Cow;
use std::cmp;
use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::delta::Operation;
use crate::error::{Error, Result};
use crate::sbuffer::ShiftBuffer;
use crate::signature::BlockHash;
use crate::varint;

/// Magic value opening every stream, big-endian.
pub const STREAM_MAGIC: u32 = 0x7273_0136;

/// Strong hashes on the wire may not exceed this many bytes.
pub const MAX_STRONG_HASH_LEN: usize = 1024 * 6;

/// DATA and HASH payloads on the wire may not exceed this many bytes.
pub const MAX_DATA_LEN: usize = 1024 * 1024;

/// Decode-side scratch capacity. Several times the largest record head
/// so compaction copies stay rare.
const DECODE_BUFFER: usize = 32 * 1024;

/// Maximum encoded size of a signature record head:
/// index varint + weak hash + length varint.
const SIG_RECORD_HEAD: usize = varint::MAX_VARINT_LEN + 4 + varint::MAX_VARINT_LEN;

/// Maximum encoded size of an operation record head:
/// tag + two varints (BLOCK_RANGE is the widest).
const OP_RECORD_HEAD: usize = 1 + 2 * varint::MAX_VARINT_LEN;

const TAG_BLOCK: u8 = 0;
const TAG_BLOCK_RANGE: u8 = 1;
const TAG_DATA: u8 = 2;
const TAG_HASH: u8 = 3;

/// Stream type carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamKind {
    /// Signature stream: per-block hash records.
    Signature = 1,
    /// Delta stream: operation records.
    Delta = 2,
    /// Reserved for patched payload streams.
    Patch = 3,
}

impl StreamKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Signature),
            2 => Some(Self::Delta),
            3 => Some(Self::Patch),
            _ => None,
        }
    }
}

/// Body compression named in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Compression {
    /// No wrapping.
    #[default]
    None = 0,
    /// Gzip-wrapped body.
    Gzip = 1,
}

impl Compression {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Gzip),
            _ => None,
        }
    }
}

enum WriteBody<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> Write for WriteBody<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
        }
    }
}

/// Framed stream writer.
///
/// The header goes out at construction, so a stream can never carry two
/// headers or records before a header. Record writers are typed:
/// calling the wrong one for the stream kind is a programmer fault and
/// panics.
pub struct FrameWriter<W: Write> {
    body: WriteBody<W>,
    kind: StreamKind,
}

impl<W: Write> FrameWriter<W> {
    /// Write the stream header and set up the (possibly compressed)
    /// body.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn new(
        mut inner: W,
        kind: StreamKind,
        compression: Compression,
        block_size: u32,
    ) -> Result<Self> {
        let mut header = [0u8; 10];
        header[0..4].copy_from_slice(&STREAM_MAGIC.to_be_bytes());
        header[4] = kind as u8;
        header[5] = compression as u8;
        header[6..10].copy_from_slice(&block_size.to_be_bytes());
        inner.write_all(&header)?;

        let body = match compression {
            Compression::None => WriteBody::Plain(inner),
            Compression::Gzip => {
                WriteBody::Gzip(GzEncoder::new(inner, flate2::Compression::best()))
            }
        };
        Ok(Self { body, kind })
    }

    /// Append one signature record.
    ///
    /// # Errors
    ///
    /// Propagates write errors; rejects oversized strong hashes.
    ///
    /// # Panics
    ///
    /// Panics if this is not a signature stream.
    pub fn write_block_hash(&mut self, block: &BlockHash) -> Result<()> {
        assert_eq!(
            self.kind,
            StreamKind::Signature,
            "block hash written to a non-signature stream"
        );
        if block.strong_hash.len() > MAX_STRONG_HASH_LEN {
            return Err(Error::HashTooLong(block.strong_hash.len()));
        }

        let mut head = [0u8; SIG_RECORD_HEAD];
        let mut at = {
            let mut scratch = [0u8; varint::MAX_VARINT_LEN];
            let n = varint::encode(block.index, &mut scratch);
            head[..n].copy_from_slice(&scratch[..n]);
            n
        };
        head[at..at + 4].copy_from_slice(&block.weak_hash.to_be_bytes());
        at += 4;
        {
            let mut scratch = [0u8; varint::MAX_VARINT_LEN];
            let n = varint::encode(block.strong_hash.len() as u64, &mut scratch);
            head[at..at + n].copy_from_slice(&scratch[..n]);
            at += n;
        }

        self.body.write_all(&head[..at])?;
        self.body.write_all(&block.strong_hash)?;
        Ok(())
    }

    /// Append one delta operation record.
    ///
    /// # Errors
    ///
    /// Propagates write errors; rejects oversized payloads.
    ///
    /// # Panics
    ///
    /// Panics if this is not a delta stream.
    pub fn write_operation(&mut self, op: &Operation<'_>) -> Result<()> {
        assert_eq!(
            self.kind,
            StreamKind::Delta,
            "operation written to a non-delta stream"
        );

        let mut head = [0u8; OP_RECORD_HEAD];
        match op {
            Operation::Block { index } => {
                head[0] = TAG_BLOCK;
                let mut scratch = [0u8; varint::MAX_VARINT_LEN];
                let n = varint::encode(*index, &mut scratch);
                head[1..1 + n].copy_from_slice(&scratch[..n]);
                self.body.write_all(&head[..1 + n])?;
            }
            Operation::BlockRange { index, end } => {
                head[0] = TAG_BLOCK_RANGE;
                let mut at = 1;
                let mut scratch = [0u8; varint::MAX_VARINT_LEN];
                let n = varint::encode(*index, &mut scratch);
                head[at..at + n].copy_from_slice(&scratch[..n]);
                at += n;
                let n = varint::encode(*end, &mut scratch);
                head[at..at + n].copy_from_slice(&scratch[..n]);
                at += n;
                self.body.write_all(&head[..at])?;
            }
            Operation::Data(bytes) | Operation::Hash(bytes) => {
                if bytes.len() > MAX_DATA_LEN {
                    return Err(Error::DataTooLong(bytes.len()));
                }
                head[0] = if op.is_data() { TAG_DATA } else { TAG_HASH };
                let mut scratch = [0u8; varint::MAX_VARINT_LEN];
                let n = varint::encode(bytes.len() as u64, &mut scratch);
                head[1..1 + n].copy_from_slice(&scratch[..n]);
                self.body.write_all(&head[..1 + n])?;
                self.body.write_all(bytes)?;
            }
        }
        Ok(())
    }

    /// Flush the body (finishing the gzip member when compressed) and
    /// return the inner writer.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn finish(self) -> Result<W> {
        match self.body {
            WriteBody::Plain(mut w) => {
                w.flush()?;
                Ok(w)
            }
            WriteBody::Gzip(gz) => Ok(gz.finish()?),
        }
    }
}

enum ReadBody<R: Read> {
    Plain(R),
    Gzip(GzDecoder<R>),
}

impl<R: Read> Read for ReadBody<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzip(r) => r.read(buf),
        }
    }
}

/// Framed stream reader.
///
/// Construction validates the header against the expected stream kind;
/// the typed body readers then drain records to EOF.
pub struct FrameReader<R: Read> {
    body: ReadBody<R>,
    kind: StreamKind,
    block_size: u32,
}

impl<R: Read> FrameReader<R> {
    /// Read and validate the stream header.
    ///
    /// # Errors
    ///
    /// Fails on short streams, bad magic, a stream type other than
    /// `expect`, or an unknown compression scheme.
    pub fn new(mut inner: R, expect: StreamKind) -> Result<Self> {
        let mut header = [0u8; 10];
        inner.read_exact(&mut header)?;

        let magic = u32::from_be_bytes(header[0..4].try_into().expect("fixed slice"));
        if magic != STREAM_MAGIC {
            return Err(Error::BadMagic);
        }
        match StreamKind::from_u8(header[4]) {
            Some(kind) if kind == expect => {}
            _ => {
                return Err(Error::UnexpectedType {
                    expected: expect as u8,
                    actual: header[4],
                })
            }
        }
        let compression =
            Compression::from_u8(header[5]).ok_or(Error::UnknownCompression(header[5]))?;
        let block_size = u32::from_be_bytes(header[6..10].try_into().expect("fixed slice"));

        let body = match compression {
            Compression::None => ReadBody::Plain(inner),
            Compression::Gzip => ReadBody::Gzip(GzDecoder::new(inner)),
        };
        Ok(Self {
            body,
            kind: expect,
            block_size,
        })
    }

    /// Block size announced in the header.
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Read every signature record to end of stream.
    ///
    /// # Errors
    ///
    /// Fails on stream errors, truncated records, bad varints, or
    /// oversized strong hashes.
    ///
    /// # Panics
    ///
    /// Panics if this is not a signature stream.
    pub fn read_signature(&mut self) -> Result<Vec<BlockHash>> {
        assert_eq!(
            self.kind,
            StreamKind::Signature,
            "signature read from a non-signature stream"
        );

        let mut reader = ShiftBuffer::new(&mut self.body, DECODE_BUFFER);
        let mut blocks = Vec::new();

        loop {
            let head = reader.next(SIG_RECORD_HEAD)?;
            if head.is_empty() {
                return Ok(blocks);
            }

            let (index, mut at) = varint::decode(head)?;
            if head.len() < at + 4 {
                return Err(truncated_record());
            }
            let weak_hash =
                u32::from_be_bytes(head[at..at + 4].try_into().expect("bounds checked"));
            at += 4;
            let (hash_len, n) = varint::decode(&head[at..])?;
            at += n;
            if hash_len > MAX_STRONG_HASH_LEN as u64 {
                return Err(Error::HashTooLong(hash_len as usize));
            }
            reader.consume(at);

            let mut strong_hash = vec![0u8; hash_len as usize];
            read_payload(&mut reader, &mut strong_hash)?;
            blocks.push(BlockHash {
                index,
                weak_hash,
                strong_hash,
            });
        }
    }

    /// Stream delta operations to end of stream.
    ///
    /// Regular operations go to `op`; the terminal HASH is routed to
    /// `hash_op` so a bounded op queue can close before verification
    /// runs.
    ///
    /// # Errors
    ///
    /// Fails on stream errors, truncated records, bad varints,
    /// oversized payloads, unknown tags, or a sink error.
    ///
    /// # Panics
    ///
    /// Panics if this is not a delta stream.
    pub fn read_operations<F, G>(&mut self, mut op: F, mut hash_op: G) -> Result<()>
    where
        F: FnMut(Operation<'static>) -> Result<()>,
        G: FnMut(Operation<'static>) -> Result<()>,
    {
        assert_eq!(
            self.kind,
            StreamKind::Delta,
            "operations read from a non-delta stream"
        );

        let mut reader = ShiftBuffer::new(&mut self.body, DECODE_BUFFER);

        loop {
            let head = reader.next(OP_RECORD_HEAD)?;
            if head.is_empty() {
                return Ok(());
            }

            let tag = head[0];
            match tag {
                TAG_BLOCK => {
                    let (index, n) = varint::decode(&head[1..])?;
                    reader.consume(1 + n);
                    op(Operation::Block { index })?;
                }
                TAG_BLOCK_RANGE => {
                    let (index, n) = varint::decode(&head[1..])?;
                    let mut at = 1 + n;
                    let (end, n) = varint::decode(&head[at..])?;
                    at += n;
                    reader.consume(at);
                    op(Operation::BlockRange { index, end })?;
                }
                TAG_DATA | TAG_HASH => {
                    let (len, n) = varint::decode(&head[1..])?;
                    if len > MAX_DATA_LEN as u64 {
                        return Err(Error::DataTooLong(len as usize));
                    }
                    reader.consume(1 + n);

                    let mut payload = vec![0u8; len as usize];
                    read_payload(&mut reader, &mut payload)?;
                    if tag == TAG_HASH {
                        hash_op(Operation::Hash(Cow::Owned(payload)))?;
                    } else {
                        op(Operation::Data(Cow::Owned(payload)))?;
                    }
                }
                unknown => return Err(Error::UnknownOp(unknown)),
            }
        }
    }
}

/// Fill `out` from the record stream, in chunks the scratch buffer can
/// hold.
fn read_payload<R: Read>(reader: &mut ShiftBuffer<R>, out: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < out.len() {
        let want = cmp::min(out.len() - filled, DECODE_BUFFER / 2);
        let chunk = reader.next(want)?;
        if chunk.is_empty() {
            return Err(truncated_record());
        }
        let take = cmp::min(chunk.len(), out.len() - filled);
        out[filled..filled + take].copy_from_slice(&chunk[..take]);
        reader.consume(take);
        filled += take;
    }
    Ok(())
}

fn truncated_record() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "record truncated mid-stream",
    ))
}
