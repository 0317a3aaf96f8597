//! `cardinality-sketch` estimates the number of distinct elements in a stream
//! of pre-hashed 64-bit values. The sketch is designed to live inside a
//! storage engine as a column value: it has a stable binary encoding, merges
//! commutatively and associatively across nodes, and adapts its in-memory
//! representation to the cardinality it has absorbed.
//!
//! # Encodings
//!
//! A sketch is always in exactly one of four encodings and only ever moves
//! forward through them:
//!
//! ## Empty
//! No values absorbed. Estimate is 0 and the serialized form is a single
//! type byte.
//!
//! ## Explicit
//! Up to [`EXPLICIT_CAP`] distinct hashes kept verbatim in ascending order.
//! Estimates are exact in this range. Serialized as the type byte, a 1-byte
//! count, and the hashes in little-endian.
//!
//! ## Sparse
//! Only the non-zero HyperLogLog registers, as (index, value) pairs. This
//! encoding is produced by the decoder for compactly stored sketches; the
//! first mutation promotes it to Full. Serialized as the type byte, a 4-byte
//! little-endian count, and 3-byte records in ascending index order.
//!
//! ## Full
//! All [`NUM_REGISTERS`] registers, one byte each. Serialized as the type
//! byte followed by the dense register array, unless few enough registers
//! are non-zero that the sparse layout is smaller.
//!
//! # Input
//!
//! Callers supply uniformly distributed 64-bit hashes; the sketch never
//! hashes raw keys itself. With 2^14 registers the expected relative error
//! of the estimate is about 1.04 / sqrt(2^14) = 0.81%.
//!
//! ```
//! use cardinality_sketch::HyperLogLog;
//!
//! let mut sketch = HyperLogLog::new();
//! sketch.update(0x9e3779b97f4a7c15);
//! sketch.update(0xbf58476d1ce4e5b9);
//! assert_eq!(sketch.estimate_cardinality(), 2);
//!
//! let mut buf = vec![0u8; sketch.max_serialized_size()];
//! let n = sketch.serialize(&mut buf).unwrap();
//! let reloaded = HyperLogLog::from_bytes(&buf[..n]).unwrap();
//! assert_eq!(reloaded.estimate_cardinality(), 2);
//! ```

mod codec;
mod explicit;
mod registers;
#[cfg(feature = "with_serde")]
mod serde;
mod sketch;
mod sparse;

pub use crate::codec::CodecError;
pub use crate::sketch::{Encoding, HyperLogLog};

/// Number of hash bits used to select a register.
pub const PRECISION: u32 = 14;

/// Number of registers, `2^PRECISION`.
pub const NUM_REGISTERS: usize = 1 << PRECISION;

/// Hash bits remaining once the register index is stripped; bounds the
/// trailing-zero count folded into a register.
pub const ZERO_COUNT_BITS: u32 = 64 - PRECISION;

/// Largest value a register can hold: a trailing-zero count of
/// `ZERO_COUNT_BITS` plus one.
pub(crate) const MAX_REGISTER_VALUE: u8 = (ZERO_COUNT_BITS + 1) as u8;

/// Most hashes the explicit encoding stores. Persisted: the serialized
/// count must fit in one byte, so this limit must never change.
pub const EXPLICIT_CAP: usize = 160;

/// Most non-zero registers the sparse encoding stores. Persisted.
pub const SPARSE_CAP: usize = 4096;

/// Serialized size of an empty sketch.
pub const EMPTY_SERIALIZED_SIZE: usize = 1;

/// Largest possible serialized size: the type byte plus the dense registers.
pub const MAX_SERIALIZED_SIZE: usize = 1 + NUM_REGISTERS;
