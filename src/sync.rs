//! Core engine: signature generation, delta generation, delta application.
//!
//! The three operations are streaming and callback-driven: records and
//! operations are handed to a sink as they are produced, so neither side
//! of a synchronization ever holds both files in memory.

use std::cmp;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::checksum::RollingChecksum;
use crate::delta::Operation;
use crate::error::Result;
use crate::hash::{StrongHashKind, StrongHasher};
use crate::signature::{BlockHash, SignatureIndex};

/// Configuration for one synchronization session.
///
/// Immutable once built; a single configuration may serve concurrent
/// calls because the strong-hash factory mints a fresh hasher per use.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Basis block size in bytes. Strictly positive.
    pub block_size: usize,
    /// Upper bound on a single DATA payload. Longer literal runs are
    /// split.
    pub max_data_op: usize,
    /// Strong hash algorithm for block confirmation and stream
    /// verification.
    pub strong_hash: StrongHashKind,
}

/// Default block size: 64 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_data_op: DEFAULT_BLOCK_SIZE * 10,
            strong_hash: StrongHashKind::Md5,
        }
    }
}

/// Builder for [`RollSync`] engines.
///
/// Unless pinned explicitly, the DATA bound tracks the block size at ten
/// times its value.
///
/// # Example
///
/// ```rust
/// use rollsync::SyncBuilder;
///
/// let sync = SyncBuilder::new().block_size(4096).build();
/// assert_eq!(sync.block_size(), 4096);
/// assert_eq!(sync.config().max_data_op, 40960);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyncBuilder {
    block_size: Option<usize>,
    max_data_op: Option<usize>,
    strong_hash: StrongHashKind,
}

impl SyncBuilder {
    /// Create a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    #[must_use]
    pub fn block_size(mut self, size: usize) -> Self {
        assert!(size > 0, "block size must be positive");
        self.block_size = Some(size);
        self
    }

    /// Set the maximum DATA payload size.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    #[must_use]
    pub fn max_data_op(mut self, size: usize) -> Self {
        assert!(size > 0, "max data op must be positive");
        self.max_data_op = Some(size);
        self
    }

    /// Select the strong hash algorithm.
    #[must_use]
    pub fn strong_hash(mut self, kind: StrongHashKind) -> Self {
        self.strong_hash = kind;
        self
    }

    /// Build the engine.
    #[must_use]
    pub fn build(self) -> RollSync {
        let block_size = self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
        RollSync {
            config: SyncConfig {
                block_size,
                max_data_op: self.max_data_op.unwrap_or(block_size * 10),
                strong_hash: self.strong_hash,
            },
        }
    }
}

/// Streaming rsync engine.
///
/// # Example
///
/// ```rust
/// use std::io::Cursor;
/// use rollsync::RollSync;
///
/// let sync = RollSync::with_block_size(4);
///
/// let basis = b"AAAABBBBCCCC";
/// let source = b"AAAAZZZZCCCC";
///
/// let signature = sync.signature(Cursor::new(basis.as_slice())).unwrap();
/// let delta = sync.delta(Cursor::new(source.as_slice()), &signature).unwrap();
///
/// let mut output = Vec::new();
/// sync.apply_delta(&mut Cursor::new(basis.as_slice()), delta, &mut output, None)
///     .unwrap();
/// assert_eq!(output, source);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RollSync {
    config: SyncConfig,
}

impl RollSync {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        SyncBuilder::new().build()
    }

    /// Create an engine with a custom block size.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    #[must_use]
    pub fn with_block_size(block_size: usize) -> Self {
        SyncBuilder::new().block_size(block_size).build()
    }

    /// Configured block size.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// The full configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Number of signature records an input of `len` bytes produces.
    #[must_use]
    pub const fn block_count(&self, len: u64) -> u64 {
        len.div_ceil(self.config.block_size as u64)
    }

    /// Segment `basis` into blocks and emit one [`BlockHash`] per block
    /// through `emit`, in index order.
    ///
    /// The final block may be shorter than the block size; an empty
    /// basis emits nothing.
    ///
    /// # Errors
    ///
    /// Propagates read errors and any error returned by the sink.
    pub fn create_signature<R, F>(&self, mut basis: R, mut emit: F) -> Result<()>
    where
        R: Read,
        F: FnMut(BlockHash) -> Result<()>,
    {
        let mut buffer = vec![0u8; self.config.block_size];
        let mut index = 0u64;
        loop {
            let n = read_full(&mut basis, &mut buffer)?;
            if n == 0 {
                return Ok(());
            }
            emit(BlockHash::compute(
                index,
                &buffer[..n],
                self.config.strong_hash,
            ))?;
            index += 1;
            if n < buffer.len() {
                return Ok(());
            }
        }
    }

    /// Collect the signature of `basis` into a vector.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn signature<R: Read>(&self, basis: R) -> Result<Vec<BlockHash>> {
        let mut blocks = Vec::new();
        self.create_signature(basis, |block| {
            blocks.push(block);
            Ok(())
        })?;
        Ok(blocks)
    }

    /// Scan `source` against `signature` and emit the operation stream
    /// through `emit`.
    ///
    /// Operations come out in source order: literal runs are flushed
    /// just before each matched block, when they reach the configured
    /// DATA bound, and at end of stream. When several basis blocks share
    /// both hashes the lowest index is referenced. If `hasher` is given
    /// it is fed every source byte as it is read, so the caller can
    /// finish it into a terminal [`Operation::Hash`].
    ///
    /// # Errors
    ///
    /// Propagates read errors and any error returned by the sink.
    pub fn create_delta<R, F>(
        &self,
        mut source: R,
        signature: &[BlockHash],
        mut emit: F,
        mut hasher: Option<&mut dyn StrongHasher>,
    ) -> Result<()>
    where
        R: Read,
        F: FnMut(Operation<'_>) -> Result<()>,
    {
        let block_size = self.config.block_size;
        let max_data = self.config.max_data_op;
        let index = SignatureIndex::new(signature);

        // Room for one refill, the sliding window, and a maximal pending
        // literal run without any of them aliasing.
        let mut buffer = vec![0u8; block_size * 3 + max_data];

        // High-water mark of populated bytes.
        let mut valid_to = 0usize;
        // Window [sum_tail, sum_head); head is recomputed every pass.
        let mut sum_tail = 0usize;
        // Pending literal run [data_tail, data_head); data_head trails
        // the window tail.
        let mut data_tail = 0usize;
        let mut data_head = 0usize;

        let mut weak = RollingChecksum::empty();
        // Whether `weak` currently describes the window, making the O(1)
        // slide valid. Cleared after a match and after a buffer reset.
        let mut rolling = false;
        // Byte that leaves the window on the next slide.
        let mut alpha_pop = 0u8;
        let mut last_run = false;

        loop {
            if !last_run && sum_tail + block_size > valid_to {
                if valid_to + block_size > buffer.len() {
                    // Out of room: flush the pending run together with
                    // the unconsumed window bytes (they are given up as
                    // literals) and restart at the front.
                    if valid_to > data_tail {
                        emit_data(&mut emit, &buffer[data_tail..valid_to], max_data)?;
                    }
                    valid_to = 0;
                    sum_tail = 0;
                    data_tail = 0;
                    data_head = 0;
                    rolling = false;
                }
                let n = read_full(&mut source, &mut buffer[valid_to..valid_to + block_size])?;
                if let Some(h) = hasher.as_mut() {
                    h.update(&buffer[valid_to..valid_to + n]);
                }
                valid_to += n;
                if n < block_size {
                    last_run = true;
                }
            }

            let sum_head = cmp::min(sum_tail + block_size, valid_to);
            if sum_head <= sum_tail {
                // Source drained; whatever literals remain go out now.
                if data_head > data_tail {
                    emit_data(&mut emit, &buffer[data_tail..data_head], max_data)?;
                }
                return Ok(());
            }

            let window = &buffer[sum_tail..sum_head];
            if window.len() < block_size {
                // Tail windows shrink instead of sliding, so the
                // constant-length incremental update no longer applies.
                weak = RollingChecksum::new(window);
            } else if rolling {
                weak.roll(alpha_pop, buffer[sum_head - 1]);
            } else {
                weak = RollingChecksum::new(window);
                rolling = true;
            }

            let mut matched = None;
            if index.contains(weak.digest()) {
                let strong = self.config.strong_hash.digest(window);
                matched = index.find(weak.digest(), &strong);
            }

            if matched.is_some() || data_head - data_tail >= max_data {
                if data_head > data_tail {
                    emit_data(&mut emit, &buffer[data_tail..data_head], max_data)?;
                }
                data_tail = data_head;
            }

            if let Some(block_index) = matched {
                emit(Operation::Block { index: block_index })?;
                sum_tail = sum_head;
                data_tail = sum_head;
                data_head = sum_head;
                rolling = false;
            } else {
                alpha_pop = buffer[sum_tail];
                sum_tail += 1;
                data_head = sum_tail;
            }
        }
    }

    /// Collect the delta of `source` against `signature` into a vector
    /// of owned operations.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn delta<R: Read>(
        &self,
        source: R,
        signature: &[BlockHash],
    ) -> Result<Vec<Operation<'static>>> {
        let mut ops = Vec::new();
        self.create_delta(
            source,
            signature,
            |op| {
                ops.push(op.into_owned());
                Ok(())
            },
            None,
        )?;
        Ok(ops)
    }

    /// Replay `ops` against a seekable `basis`, writing the
    /// reconstructed source to `output`.
    ///
    /// A short read at the final basis block is expected and not an
    /// error. If `hasher` is given it is fed every written byte; an
    /// inline [`Operation::Hash`] is then checked against it, erroring
    /// on mismatch. Without a hasher, hash ops are ignored.
    ///
    /// # Errors
    ///
    /// Propagates stream errors and reports digest mismatches as
    /// [`crate::Error::HashMismatch`].
    pub fn apply_delta<'o, B, W, I>(
        &self,
        basis: &mut B,
        ops: I,
        output: &mut W,
        mut hasher: Option<&mut dyn StrongHasher>,
    ) -> Result<()>
    where
        B: Read + Seek,
        W: Write,
        I: IntoIterator<Item = Operation<'o>>,
    {
        let block_size = self.config.block_size;
        let mut scratch = vec![0u8; block_size];

        for op in ops {
            match op {
                Operation::Block { index } => {
                    copy_block(basis, output, &mut scratch, index, &mut hasher)?;
                }
                Operation::BlockRange { index, end } => {
                    for block in index..end {
                        copy_block(basis, output, &mut scratch, block, &mut hasher)?;
                    }
                }
                Operation::Data(bytes) => {
                    output.write_all(&bytes)?;
                    if let Some(h) = hasher.as_mut() {
                        h.update(&bytes);
                    }
                }
                Operation::Hash(expected) => {
                    if let Some(h) = hasher.as_mut() {
                        let actual = h.finish();
                        if expected.as_ref() != actual.as_slice() {
                            return Err(crate::Error::HashMismatch {
                                expected: expected.into_owned(),
                                actual,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Copy one basis block to the output. Blocks past the end of the basis
/// copy nothing; corruption from a bogus index is caught by the terminal
/// hash check when enabled.
fn copy_block<B, W>(
    basis: &mut B,
    output: &mut W,
    scratch: &mut [u8],
    index: u64,
    hasher: &mut Option<&mut dyn StrongHasher>,
) -> Result<()>
where
    B: Read + Seek,
    W: Write,
{
    let offset = index.saturating_mul(scratch.len() as u64);
    basis.seek(SeekFrom::Start(offset))?;
    let n = read_full(basis, scratch)?;
    output.write_all(&scratch[..n])?;
    if let Some(h) = hasher.as_mut() {
        h.update(&scratch[..n]);
    }
    Ok(())
}

/// Emit a literal run, split into payloads the configured bound allows.
fn emit_data<F>(emit: &mut F, run: &[u8], max_data: usize) -> Result<()>
where
    F: FnMut(Operation<'_>) -> Result<()>,
{
    for chunk in run.chunks(max_data) {
        emit(Operation::data(chunk))?;
    }
    Ok(())
}

/// Read until `buf` is full or the stream ends; short counts mean EOF.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Cursor;

    fn engine(block_size: usize) -> RollSync {
        RollSync::with_block_size(block_size)
    }

    fn ops_for(sync: &RollSync, basis: &[u8], source: &[u8]) -> Vec<Operation<'static>> {
        let sig = sync.signature(Cursor::new(basis)).unwrap();
        sync.delta(Cursor::new(source), &sig).unwrap()
    }

    fn roundtrip(sync: &RollSync, basis: &[u8], source: &[u8]) {
        let ops = ops_for(sync, basis, source);
        let mut output = Vec::new();
        sync.apply_delta(&mut Cursor::new(basis), ops, &mut output, None)
            .unwrap();
        assert_eq!(output, source, "block_size={}", sync.block_size());
    }

    // ==========================================================================
    // SIGNATURE TESTS
    // ==========================================================================

    #[test]
    fn signature_empty_input() {
        let sig = engine(4).signature(Cursor::new(b"")).unwrap();
        assert!(sig.is_empty());
    }

    #[test]
    fn signature_block_segmentation() {
        let sig = engine(4).signature(Cursor::new(b"AAAABBBBCC")).unwrap();
        assert_eq!(sig.len(), 3);
        assert_eq!(sig[0], BlockHash::compute(0, b"AAAA", StrongHashKind::Md5));
        assert_eq!(sig[1], BlockHash::compute(1, b"BBBB", StrongHashKind::Md5));
        assert_eq!(sig[2], BlockHash::compute(2, b"CC", StrongHashKind::Md5));
    }

    #[test]
    fn signature_exact_multiple_has_no_empty_tail() {
        let sig = engine(4).signature(Cursor::new(b"AAAABBBB")).unwrap();
        assert_eq!(sig.len(), 2);
    }

    #[test]
    fn signature_indices_contiguous() {
        let data = vec![7u8; 100];
        let sig = engine(8).signature(Cursor::new(data.as_slice())).unwrap();
        for (i, block) in sig.iter().enumerate() {
            assert_eq!(block.index, i as u64);
        }
    }

    #[test]
    fn signature_sink_error_propagates() {
        let result = engine(4).create_signature(Cursor::new(b"AAAABBBB"), |_| {
            Err(Error::PipelineClosed)
        });
        assert!(matches!(result, Err(Error::PipelineClosed)));
    }

    #[test]
    fn block_count_matches_signature() {
        let sync = engine(4);
        for len in 0..40u64 {
            let data = vec![1u8; len as usize];
            let sig = sync.signature(Cursor::new(data.as_slice())).unwrap();
            assert_eq!(sync.block_count(len), sig.len() as u64);
        }
    }

    // ==========================================================================
    // DELTA SCENARIO TESTS
    // ==========================================================================

    #[test]
    fn scenario_identity() {
        let ops = ops_for(&engine(4), b"ABCDEFGHIJKLMNOP", b"ABCDEFGHIJKLMNOP");
        assert_eq!(
            ops,
            vec![
                Operation::Block { index: 0 },
                Operation::Block { index: 1 },
                Operation::Block { index: 2 },
                Operation::Block { index: 3 },
            ]
        );
    }

    #[test]
    fn scenario_pure_append() {
        let ops = ops_for(&engine(5), b"HELLO", b"HELLO WORLD");
        assert_eq!(
            ops,
            vec![Operation::Block { index: 0 }, Operation::data(b" WORLD").into_owned()]
        );
    }

    #[test]
    fn scenario_prefix_insert() {
        let ops = ops_for(&engine(5), b"WORLD", b"XYZWORLD");
        assert_eq!(
            ops,
            vec![Operation::data(b"XYZ").into_owned(), Operation::Block { index: 0 }]
        );
    }

    #[test]
    fn scenario_middle_mutation() {
        let ops = ops_for(&engine(4), b"AAAABBBBCCCC", b"AAAAZZZZCCCC");
        assert_eq!(
            ops,
            vec![
                Operation::Block { index: 0 },
                Operation::data(b"ZZZZ").into_owned(),
                Operation::Block { index: 2 },
            ]
        );
    }

    #[test]
    fn scenario_block_reorder() {
        let ops = ops_for(&engine(4), b"AAAABBBB", b"BBBBAAAA");
        assert_eq!(
            ops,
            vec![Operation::Block { index: 1 }, Operation::Block { index: 0 }]
        );
    }

    #[test]
    fn scenario_short_tail() {
        let ops = ops_for(&engine(4), b"AAAABB", b"AAAABB");
        assert_eq!(
            ops,
            vec![Operation::Block { index: 0 }, Operation::Block { index: 1 }]
        );
    }

    #[test]
    fn scenario_weak_collision_strong_miss() {
        // Both blocks produce the same weak hash; contents differ, so no
        // false block reference may appear.
        let basis = [1u8, 0, 0, 1];
        let source = [0u8, 1, 1, 0];
        assert_eq!(
            RollingChecksum::new(&basis).digest(),
            RollingChecksum::new(&source).digest()
        );

        let ops = ops_for(&engine(4), &basis, &source);
        assert!(ops.iter().all(Operation::is_data));
        assert_eq!(ops, vec![Operation::data(&source).into_owned()]);
    }

    // ==========================================================================
    // DELTA LAW TESTS
    // ==========================================================================

    #[test]
    fn empty_signature_single_literal() {
        let source = b"brand new content";
        let ops = ops_for(&engine(4), b"", source);
        assert_eq!(ops, vec![Operation::data(source).into_owned()]);
    }

    #[test]
    fn empty_signature_block_multiple_length() {
        // The literal run must survive a source that ends exactly on a
        // block boundary.
        let source = b"ABCDEFGH";
        let ops = ops_for(&engine(4), b"", source);
        assert_eq!(ops, vec![Operation::data(source).into_owned()]);
    }

    #[test]
    fn empty_source_no_ops() {
        let ops = ops_for(&engine(4), b"AAAABBBB", b"");
        assert!(ops.is_empty());
    }

    #[test]
    fn self_copy_all_blocks() {
        let sync = engine(4);
        for len in 1..=33usize {
            let basis: Vec<u8> = (0..len).map(|i| (i * 37 % 251) as u8).collect();
            let ops = ops_for(&sync, &basis, &basis);
            assert!(
                ops.iter().all(Operation::is_copy),
                "len={len}: expected only block ops, got {ops:?}"
            );
            assert_eq!(ops.len() as u64, sync.block_count(len as u64), "len={len}");
        }
    }

    #[test]
    fn tie_break_prefers_lowest_index() {
        // Three identical basis blocks; the delta must reference block 0.
        let basis = b"SAMESAMESAME";
        let ops = ops_for(&engine(4), basis, b"SAME");
        assert_eq!(ops, vec![Operation::Block { index: 0 }]);
    }

    #[test]
    fn literal_runs_split_at_max_data_op() {
        let sync = SyncBuilder::new().block_size(4).max_data_op(8).build();
        let source: Vec<u8> = (0..50u8).collect();
        let ops = sync.delta(Cursor::new(source.as_slice()), &[]).unwrap();

        let mut total = 0u64;
        for op in &ops {
            match op {
                Operation::Data(bytes) => {
                    assert!(bytes.len() <= 8);
                    total += bytes.len() as u64;
                }
                other => panic!("unexpected op {other:?}"),
            }
        }
        assert_eq!(total, 50);
    }

    #[test]
    fn buffer_wrap_preserves_content() {
        // block 4, max data 8: the scan buffer is 20 bytes, so a long
        // non-matching source forces repeated wraps.
        let sync = SyncBuilder::new().block_size(4).max_data_op(8).build();
        let basis = b"MTCH";
        let sig = sync.signature(Cursor::new(basis.as_slice())).unwrap();

        let mut source = Vec::new();
        for i in 0..10u8 {
            source.extend_from_slice(&[i.wrapping_mul(31); 7]);
            source.extend_from_slice(b"MTCH");
        }
        let ops = sync.delta(Cursor::new(source.as_slice()), &sig).unwrap();
        assert!(ops.iter().any(Operation::is_copy));

        let mut output = Vec::new();
        sync.apply_delta(&mut Cursor::new(basis.as_slice()), ops, &mut output, None)
            .unwrap();
        assert_eq!(output, source);
    }

    #[test]
    fn delta_feeds_hasher_with_whole_source() {
        let sync = engine(4);
        let basis = b"AAAABBBB";
        let source = b"AAAAXXBBBBYY";
        let sig = sync.signature(Cursor::new(basis.as_slice())).unwrap();

        let mut hasher = StrongHashKind::Md5.hasher();
        sync.create_delta(
            Cursor::new(source.as_slice()),
            &sig,
            |_| Ok(()),
            Some(hasher.as_mut()),
        )
        .unwrap();
        assert_eq!(hasher.finish(), StrongHashKind::Md5.digest(source));
    }

    #[test]
    fn delta_sink_error_propagates() {
        let result = engine(4).create_delta(
            Cursor::new(b"some source".as_slice()),
            &[],
            |_| Err(Error::PipelineClosed),
            None,
        );
        assert!(matches!(result, Err(Error::PipelineClosed)));
    }

    // ==========================================================================
    // BOUNDARY COVERAGE
    // ==========================================================================

    #[test]
    fn roundtrip_source_length_residues() {
        let sync = engine(8);
        for extra in [0usize, 1, 7] {
            let source: Vec<u8> = (0..(4 * 8 + extra)).map(|i| (i % 253) as u8).collect();
            let basis: Vec<u8> = source.iter().map(|b| b.wrapping_add(1)).collect();
            roundtrip(&sync, &basis, &source);
            roundtrip(&sync, &source, &source);
        }
    }

    #[test]
    fn roundtrip_edits_at_block_offsets() {
        let sync = engine(8);
        let basis: Vec<u8> = (0..64u8).collect();
        for offset in [0usize, 8, 15, 64] {
            // Insertion at the offset.
            let mut inserted = basis.clone();
            for (i, b) in [0xF0u8, 0xF1, 0xF2].iter().enumerate() {
                inserted.insert(offset + i, *b);
            }
            roundtrip(&sync, &basis, &inserted);

            // Deletion at the offset (when there is something to remove).
            let mut deleted = basis.clone();
            let take = deleted.len().saturating_sub(offset).min(3);
            for _ in 0..take {
                deleted.remove(offset.min(deleted.len() - 1));
            }
            roundtrip(&sync, &basis, &deleted);
        }
    }

    #[test]
    fn roundtrip_block_size_one() {
        let sync = engine(1);
        roundtrip(&sync, b"abc", b"cba");
        roundtrip(&sync, b"", b"abc");
        roundtrip(&sync, b"abc", b"");
    }

    #[test]
    fn roundtrip_block_larger_than_inputs() {
        let sync = engine(64);
        roundtrip(&sync, b"short basis", b"short source");
        roundtrip(&sync, b"same", b"same");
    }

    // ==========================================================================
    // APPLY TESTS
    // ==========================================================================

    #[test]
    fn apply_block_range() {
        let sync = engine(4);
        let basis = b"AAAABBBBCCCC";
        let mut output = Vec::new();
        sync.apply_delta(
            &mut Cursor::new(basis.as_slice()),
            vec![Operation::BlockRange { index: 0, end: 3 }],
            &mut output,
            None,
        )
        .unwrap();
        assert_eq!(output, basis);
    }

    #[test]
    fn apply_block_range_short_tail() {
        let sync = engine(4);
        let basis = b"AAAABB";
        let mut output = Vec::new();
        sync.apply_delta(
            &mut Cursor::new(basis.as_slice()),
            vec![Operation::BlockRange { index: 0, end: 2 }],
            &mut output,
            None,
        )
        .unwrap();
        assert_eq!(output, basis);
    }

    #[test]
    fn apply_block_past_eof_copies_nothing() {
        let sync = engine(4);
        let mut output = Vec::new();
        sync.apply_delta(
            &mut Cursor::new(b"AAAA".as_slice()),
            vec![Operation::Block { index: 9 }],
            &mut output,
            None,
        )
        .unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn apply_verifies_matching_hash() {
        let sync = engine(4);
        let source = b"reconstructed bytes";
        let digest = StrongHashKind::Md5.digest(source);

        let mut hasher = StrongHashKind::Md5.hasher();
        let mut output = Vec::new();
        sync.apply_delta(
            &mut Cursor::new(b"".as_slice()),
            vec![Operation::data(source), Operation::hash(digest)],
            &mut output,
            Some(hasher.as_mut()),
        )
        .unwrap();
        assert_eq!(output, source);
    }

    #[test]
    fn apply_rejects_wrong_hash() {
        let sync = engine(4);
        let mut hasher = StrongHashKind::Md5.hasher();
        let mut output = Vec::new();
        let result = sync.apply_delta(
            &mut Cursor::new(b"".as_slice()),
            vec![
                Operation::data(b"actual bytes"),
                Operation::hash(vec![0u8; 16]),
            ],
            &mut output,
            Some(hasher.as_mut()),
        );
        assert!(matches!(result, Err(Error::HashMismatch { .. })));
    }

    #[test]
    fn apply_ignores_hash_without_hasher() {
        let sync = engine(4);
        let mut output = Vec::new();
        sync.apply_delta(
            &mut Cursor::new(b"".as_slice()),
            vec![Operation::data(b"bytes"), Operation::hash(vec![0u8; 16])],
            &mut output,
            None,
        )
        .unwrap();
        assert_eq!(output, b"bytes");
    }

    // ==========================================================================
    // CONFIG TESTS
    // ==========================================================================

    #[test]
    fn builder_defaults() {
        let sync = RollSync::new();
        assert_eq!(sync.block_size(), DEFAULT_BLOCK_SIZE);
        assert_eq!(sync.config().max_data_op, DEFAULT_BLOCK_SIZE * 10);
        assert_eq!(sync.config().strong_hash, StrongHashKind::Md5);
    }

    #[test]
    fn builder_options() {
        let sync = SyncBuilder::new()
            .block_size(512)
            .max_data_op(4096)
            .strong_hash(StrongHashKind::Blake3)
            .build();
        assert_eq!(sync.block_size(), 512);
        assert_eq!(sync.config().max_data_op, 4096);
        assert_eq!(sync.config().strong_hash, StrongHashKind::Blake3);
    }

    #[test]
    #[should_panic(expected = "block size must be positive")]
    fn builder_rejects_zero_block() {
        let _ = SyncBuilder::new().block_size(0);
    }

    #[test]
    #[should_panic(expected = "max data op must be positive")]
    fn builder_rejects_zero_max_data() {
        let _ = SyncBuilder::new().max_data_op(0);
    }

    #[test]
    fn blake3_engine_roundtrip() {
        let sync = SyncBuilder::new()
            .block_size(4)
            .strong_hash(StrongHashKind::Blake3)
            .build();
        roundtrip(&sync, b"AAAABBBBCCCC", b"AAAAZZZZCCCC");
    }
}
