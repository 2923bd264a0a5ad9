//! Block signatures and the lookup index used during delta generation.
//!
//! A signature is the per-block hash list derived from the basis. The
//! scanner probes it through [`SignatureIndex`], a weak-hash bucket map
//! that preserves signature order so collisions resolve deterministically.

use rustc_hash::FxHashMap;

use crate::checksum::RollingChecksum;
use crate::hash::StrongHashKind;

/// Hashes for a single basis block.
///
/// All blocks are full-size except the final one, which may be shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHash {
    /// Block ordinal, 0-based and contiguous.
    pub index: u64,
    /// Rolling weak checksum of the block bytes.
    pub weak_hash: u32,
    /// Strong digest of the block bytes.
    pub strong_hash: Vec<u8>,
}

impl BlockHash {
    /// Compute both hashes for a block.
    #[must_use]
    pub fn compute(index: u64, block: &[u8], strong: StrongHashKind) -> Self {
        Self {
            index,
            weak_hash: RollingChecksum::new(block).digest(),
            strong_hash: strong.digest(block),
        }
    }
}

/// Weak-hash lookup table over a signature.
///
/// Buckets keep signature order, so when several blocks share both
/// hashes the lowest index wins.
#[derive(Debug)]
pub struct SignatureIndex<'a> {
    buckets: FxHashMap<u32, Vec<&'a BlockHash>>,
}

impl<'a> SignatureIndex<'a> {
    /// Build the index over a signature list.
    #[must_use]
    pub fn new(signature: &'a [BlockHash]) -> Self {
        let mut buckets: FxHashMap<u32, Vec<&'a BlockHash>> =
            FxHashMap::with_capacity_and_hasher(signature.len(), rustc_hash::FxBuildHasher);
        for block in signature {
            buckets.entry(block.weak_hash).or_default().push(block);
        }
        Self { buckets }
    }

    /// Whether any block carries this weak hash. Cheap pre-filter before
    /// paying for a strong digest.
    #[must_use]
    pub fn contains(&self, weak: u32) -> bool {
        self.buckets.contains_key(&weak)
    }

    /// Find the first block matching both hashes, in signature order.
    #[must_use]
    pub fn find(&self, weak: u32, strong: &[u8]) -> Option<u64> {
        if strong.is_empty() {
            return None;
        }
        self.buckets
            .get(&weak)?
            .iter()
            .find(|block| block.strong_hash == strong)
            .map(|block| block.index)
    }

    /// Number of distinct weak hashes.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the index holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
