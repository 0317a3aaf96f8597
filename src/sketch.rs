//! Public sketch type and the encoding state machine.

use std::fmt::{Debug, Formatter};
use std::mem::{size_of, swap};

use crate::codec;
use crate::codec::CodecError;
use crate::explicit::ExplicitSet;
use crate::registers::Registers;
use crate::sparse::SparseRegisters;
use crate::{EXPLICIT_CAP, MAX_SERIALIZED_SIZE, NUM_REGISTERS};

/// The four encodings a sketch moves through, in upgrade order. The
/// discriminants are the persisted type-tag values; they must never change.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Encoding {
    Empty = 0,
    Explicit = 1,
    Sparse = 2,
    Full = 3,
}

#[derive(Clone, PartialEq)]
pub(crate) enum Repr {
    Empty,
    Explicit(ExplicitSet),
    Sparse(SparseRegisters),
    Full(Registers),
}

/// Adaptive distinct-count sketch over pre-hashed 64-bit values.
///
/// Starts [`Encoding::Empty`], keeps small sets exactly, and upgrades to
/// HyperLogLog registers once the set outgrows [`EXPLICIT_CAP`] hashes.
/// Encodings only ever move forward; [`HyperLogLog::clear`] is the sole way
/// back to empty.
///
/// A sketch is an ordinary owned value: cloning duplicates the payload,
/// moving transfers it, dropping releases it. A single instance must not be
/// mutated concurrently; share immutable references freely and merge
/// per-thread sketches at aggregation boundaries instead.
#[derive(Clone, PartialEq)]
pub struct HyperLogLog {
    pub(crate) repr: Repr,
}

impl HyperLogLog {
    /// Create an empty sketch.
    pub fn new() -> Self {
        Self { repr: Repr::Empty }
    }

    /// Create a sketch holding a single hash.
    pub fn from_hash(hash: u64) -> Self {
        Self {
            repr: Repr::Explicit(ExplicitSet::with_hash(hash)),
        }
    }

    /// Decode a sketch from its persisted encoding. The buffer fully
    /// determines the result; no prior state is involved.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, CodecError> {
        codec::deserialize(buf)
    }

    /// Cheap check that `buf` plausibly holds a serialized sketch. O(1);
    /// [`HyperLogLog::from_bytes`] performs the full validation.
    pub fn is_valid(buf: &[u8]) -> bool {
        codec::is_valid(buf)
    }

    /// The canonical one-byte encoding of an empty sketch, as written for
    /// absent column values.
    pub fn empty_serialized() -> Vec<u8> {
        codec::empty_serialized()
    }

    /// The encoding the sketch is currently in.
    pub fn encoding(&self) -> Encoding {
        match &self.repr {
            Repr::Empty => Encoding::Empty,
            Repr::Explicit(_) => Encoding::Explicit,
            Repr::Sparse(_) => Encoding::Sparse,
            Repr::Full(_) => Encoding::Full,
        }
    }

    /// Absorb one pre-hashed value, upgrading the encoding when it
    /// overflows: the explicit set converts to dense registers past
    /// [`EXPLICIT_CAP`] distinct hashes, and a decoded sparse sketch
    /// promotes to dense on its first update.
    pub fn update(&mut self, hash: u64) {
        match &mut self.repr {
            Repr::Empty => {
                self.repr = Repr::Explicit(ExplicitSet::with_hash(hash));
            }
            Repr::Explicit(set) => {
                if set.insert(hash) && set.len() > EXPLICIT_CAP {
                    let registers = Registers::from_hashes(set.hashes());
                    self.repr = Repr::Full(registers);
                }
            }
            Repr::Sparse(sparse) => {
                let mut registers = sparse.to_registers();
                registers.update(hash);
                self.repr = Repr::Full(registers);
            }
            Repr::Full(registers) => registers.update(hash),
        }
    }

    /// Absorb everything `other` has absorbed. Equivalent to having
    /// inserted the union of both hash streams; commutative and associative
    /// in the resulting estimates. The result's encoding is the larger of
    /// the two operands', with explicit overflow promoting further.
    pub fn merge(&mut self, other: &Self) {
        match &other.repr {
            Repr::Empty => {}
            Repr::Explicit(rhs) => {
                if matches!(self.repr, Repr::Empty) {
                    self.repr = Repr::Explicit(rhs.clone());
                } else {
                    for &hash in rhs.hashes() {
                        self.update(hash);
                    }
                }
            }
            Repr::Sparse(rhs) => {
                if matches!(self.repr, Repr::Empty) {
                    self.repr = Repr::Sparse(rhs.clone());
                } else {
                    let mut registers = self.take_dense();
                    for (idx, value) in rhs.entries() {
                        registers.apply(usize::from(idx), value);
                    }
                    self.repr = Repr::Full(registers);
                }
            }
            Repr::Full(rhs) => {
                if matches!(self.repr, Repr::Empty) {
                    self.repr = Repr::Full(rhs.clone());
                } else {
                    let mut registers = self.take_dense();
                    registers.merge(rhs);
                    self.repr = Repr::Full(registers);
                }
            }
        }
    }

    /// Estimate the number of distinct hashes absorbed so far. Exact for
    /// the empty and explicit encodings.
    pub fn estimate_cardinality(&self) -> u64 {
        match &self.repr {
            Repr::Empty => 0,
            Repr::Explicit(set) => set.len() as u64,
            Repr::Sparse(sparse) => sparse.estimate(),
            Repr::Full(registers) => registers.estimate(),
        }
    }

    /// Write the persisted encoding into `dst` and return the number of
    /// bytes written. Fails with [`CodecError::BufferTooSmall`] if `dst`
    /// cannot hold the current state; [`HyperLogLog::max_serialized_size`]
    /// is always enough.
    pub fn serialize(&self, dst: &mut [u8]) -> Result<usize, CodecError> {
        codec::serialize(self, dst)
    }

    /// The persisted encoding as a freshly allocated buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::to_bytes(self)
    }

    /// Upper bound on the serialized size of any sketch, for pre-sizing
    /// buffers.
    pub fn max_serialized_size(&self) -> usize {
        MAX_SERIALIZED_SIZE
    }

    /// Advisory memory footprint in bytes, including payload buffers.
    pub fn memory_consumed(&self) -> usize {
        size_of::<Self>()
            + match &self.repr {
                Repr::Empty => 0,
                Repr::Explicit(set) => set.capacity() * size_of::<u64>(),
                Repr::Sparse(sparse) => sparse.len() * size_of::<(u16, u8)>(),
                Repr::Full(_) => NUM_REGISTERS,
            }
    }

    /// Return to the empty encoding, releasing the payload. The only
    /// backwards transition.
    pub fn clear(&mut self) {
        self.repr = Repr::Empty;
    }

    /// Take the current state as dense registers, folding the explicit
    /// hashes or expanding the sparse map as needed. Leaves the sketch
    /// empty; callers put the registers back.
    fn take_dense(&mut self) -> Registers {
        let mut repr = Repr::Empty;
        swap(&mut self.repr, &mut repr);
        match repr {
            Repr::Empty => Registers::new(),
            Repr::Explicit(set) => Registers::from_hashes(set.hashes()),
            Repr::Sparse(sparse) => sparse.to_registers(),
            Repr::Full(registers) => registers,
        }
    }
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for HyperLogLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperLogLog")
            .field("encoding", &self.encoding())
            .field("estimate", &self.estimate_cardinality())
            .field("memory", &self.memory_consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // splitmix64, good enough to stand in for a real hash function.
    fn hash64(x: u64) -> u64 {
        let mut z = x.wrapping_add(0x9e3779b97f4a7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    fn build(hashes: impl IntoIterator<Item = u64>) -> HyperLogLog {
        let mut sketch = HyperLogLog::new();
        for hash in hashes {
            sketch.update(hash);
        }
        sketch
    }

    #[test]
    fn test_new_is_empty() {
        let sketch = HyperLogLog::new();
        assert_eq!(sketch.encoding(), Encoding::Empty);
        assert_eq!(sketch.estimate_cardinality(), 0);
        assert_eq!(sketch, HyperLogLog::default());
    }

    #[test]
    fn test_from_hash_is_explicit() {
        let sketch = HyperLogLog::from_hash(42);
        assert_eq!(sketch.encoding(), Encoding::Explicit);
        assert_eq!(sketch.estimate_cardinality(), 1);
    }

    #[test_case(1)]
    #[test_case(2)]
    #[test_case(159)]
    #[test_case(160)]
    fn test_explicit_range_is_exact(n: u64) {
        let sketch = build((0..n).map(hash64));
        assert_eq!(sketch.encoding(), Encoding::Explicit);
        assert_eq!(sketch.estimate_cardinality(), n);
    }

    #[test]
    fn test_explicit_overflow_upgrades_to_full() {
        let mut sketch = build((0..160).map(hash64));
        assert_eq!(sketch.encoding(), Encoding::Explicit);
        sketch.update(hash64(160));
        assert_eq!(sketch.encoding(), Encoding::Full);
        let estimate = sketch.estimate_cardinality();
        assert!((158..=164).contains(&estimate), "estimate: {estimate}");
    }

    #[test]
    fn test_duplicate_update_is_noop() {
        let mut sketch = HyperLogLog::new();
        for round in 0..3 {
            for i in 0..200 {
                sketch.update(hash64(i));
            }
            let estimate = sketch.estimate_cardinality();
            assert!((195..=205).contains(&estimate), "round {round}: {estimate}");
        }
        // Duplicates never push the explicit set over its cap.
        let mut sketch = build((0..160).map(hash64));
        sketch.update(hash64(0));
        assert_eq!(sketch.encoding(), Encoding::Explicit);
        assert_eq!(sketch.estimate_cardinality(), 160);
    }

    #[test]
    fn test_sparse_promotes_on_update() {
        let source = build((0..1000).map(hash64));
        let decoded = HyperLogLog::from_bytes(&source.to_bytes()).unwrap();
        assert_eq!(decoded.encoding(), Encoding::Sparse);

        let before = decoded.estimate_cardinality();
        let mut promoted = decoded.clone();
        promoted.update(hash64(0));
        assert_eq!(promoted.encoding(), Encoding::Full);
        // hash64(0) was already absorbed, so the estimate is unchanged.
        assert_eq!(promoted.estimate_cardinality(), before);
    }

    #[test]
    fn test_merge_into_empty_copies_other() {
        let explicit = build((0..10).map(hash64));
        let full = build((0..1000).map(hash64));
        let sparse = HyperLogLog::from_bytes(&full.to_bytes()).unwrap();

        for other in [&explicit, &sparse, &full] {
            let mut sketch = HyperLogLog::new();
            sketch.merge(other);
            assert_eq!(sketch.encoding(), other.encoding());
            assert_eq!(
                sketch.estimate_cardinality(),
                other.estimate_cardinality()
            );

            let mut sketch = other.clone();
            sketch.merge(&HyperLogLog::new());
            assert_eq!(sketch, *other);
        }
    }

    #[test]
    fn test_merge_explicit_overlap_is_exact() {
        let lhs = build((0..100).map(hash64));
        let rhs = build((50..150).map(hash64));
        let mut merged = lhs.clone();
        merged.merge(&rhs);
        assert_eq!(merged.encoding(), Encoding::Explicit);
        assert_eq!(merged.estimate_cardinality(), 150);
    }

    #[test]
    fn test_merge_explicit_overflow_promotes() {
        let lhs = build((0..100).map(hash64));
        let rhs = build((100..200).map(hash64));
        let mut merged = lhs.clone();
        merged.merge(&rhs);
        assert_eq!(merged.encoding(), Encoding::Full);
        let estimate = merged.estimate_cardinality();
        assert!((195..=205).contains(&estimate), "estimate: {estimate}");
    }

    #[test]
    fn test_merge_matches_union_across_encodings() {
        let small: Vec<u64> = (0..50).map(hash64).collect();
        let large: Vec<u64> = (25..2000).map(hash64).collect();

        let mut merged = build(small.iter().copied());
        merged.merge(&build(large.iter().copied()));

        let union = build(small.iter().chain(large.iter()).copied());
        assert_eq!(merged.estimate_cardinality(), union.estimate_cardinality());
    }

    #[test]
    fn test_merge_with_sparse_operand() {
        let lhs = build((0..300).map(hash64));
        let rhs_full = build((200..500).map(hash64));
        let rhs_sparse = HyperLogLog::from_bytes(&rhs_full.to_bytes()).unwrap();
        assert_eq!(rhs_sparse.encoding(), Encoding::Sparse);

        let mut via_sparse = lhs.clone();
        via_sparse.merge(&rhs_sparse);
        let mut via_full = lhs.clone();
        via_full.merge(&rhs_full);
        assert_eq!(via_sparse, via_full);

        // Sparse on the left promotes before absorbing.
        let lhs_sparse = HyperLogLog::from_bytes(&lhs.to_bytes()).unwrap();
        assert_eq!(lhs_sparse.encoding(), Encoding::Sparse);
        let mut merged = lhs_sparse.clone();
        merged.merge(&rhs_full);
        assert_eq!(merged.encoding(), Encoding::Full);
        assert_eq!(merged, via_full);
    }

    #[test]
    fn test_encoding_is_monotone() {
        let mut sketch = HyperLogLog::new();
        let mut seen = sketch.encoding();
        for i in 0..5000 {
            sketch.update(hash64(i));
            let encoding = sketch.encoding();
            assert!(encoding >= seen);
            seen = encoding;
        }
    }

    #[test]
    fn test_clear_resets_to_empty() {
        let mut sketch = build((0..1000).map(hash64));
        sketch.clear();
        assert_eq!(sketch.encoding(), Encoding::Empty);
        assert_eq!(sketch.estimate_cardinality(), 0);
        // clear is idempotent and the sketch is reusable.
        sketch.clear();
        sketch.update(hash64(1));
        assert_eq!(sketch.estimate_cardinality(), 1);
    }

    #[test]
    fn test_memory_consumed_tracks_payload() {
        let empty = HyperLogLog::new();
        let explicit = HyperLogLog::from_hash(42);
        let full = build((0..1000).map(hash64));
        assert!(empty.memory_consumed() < explicit.memory_consumed());
        assert!(explicit.memory_consumed() < full.memory_consumed());
        assert!(full.memory_consumed() > NUM_REGISTERS);
    }

    #[test]
    fn test_debug_reports_encoding_and_estimate() {
        let sketch = HyperLogLog::from_hash(42);
        let repr = format!("{sketch:?}");
        assert!(repr.contains("Explicit"), "debug output: {repr}");
        assert!(repr.contains("estimate: 1"), "debug output: {repr}");
    }
}
