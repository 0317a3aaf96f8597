//! Persisted byte layout of the sketch.
//!
//! Byte 0 is the type tag; the payload depends on it:
//!
//! - `0` Empty — no payload; total size 1.
//! - `1` Explicit — a 1-byte count `n`, then `n` little-endian 64-bit hashes
//!   in ascending order; total size `2 + 8n`.
//! - `2` Sparse — a little-endian `i32` count `k`, then `k` records of a
//!   little-endian `u16` register index and a 1-byte register value, in
//!   ascending index order; total size `5 + 3k`.
//! - `3` Full — the dense register array, one byte per register; total size
//!   `1 + NUM_REGISTERS`.
//!
//! The tag values are persisted in storage; they must never change. A full
//! sketch whose non-zero register count fits the sparse layout is written
//! sparse, which is the smaller of the two; readers accept either.

use std::collections::BTreeMap;
use std::fmt;

use crate::explicit::ExplicitSet;
use crate::registers::Registers;
use crate::sketch::{HyperLogLog, Repr};
use crate::sparse::SparseRegisters;
use crate::{
    EMPTY_SERIALIZED_SIZE, EXPLICIT_CAP, MAX_REGISTER_VALUE, MAX_SERIALIZED_SIZE, NUM_REGISTERS,
    SPARSE_CAP,
};

const TAG_EMPTY: u8 = 0;
const TAG_EXPLICIT: u8 = 1;
const TAG_SPARSE: u8 = 2;
const TAG_FULL: u8 = 3;

const HASH_SIZE: usize = 8;
const SPARSE_COUNT_SIZE: usize = 4;
const SPARSE_RECORD_SIZE: usize = 3;

/// Failures surfaced by the codec. Everything else on the sketch is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer is not a well-formed sketch encoding: unknown type tag,
    /// length inconsistent with the declared payload, or payload fields
    /// outside their persisted ranges.
    InvalidEncoding,
    /// The destination buffer cannot hold the encoding of the current state.
    BufferTooSmall { required: usize, available: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidEncoding => write!(f, "invalid sketch encoding"),
            CodecError::BufferTooSmall {
                required,
                available,
            } => write!(
                f,
                "serialization buffer too small: need {required} bytes, have {available}"
            ),
        }
    }
}

impl std::error::Error for CodecError {}

/// Exact size `serialize` will produce for the sketch's current state.
pub(crate) fn serialized_size(sketch: &HyperLogLog) -> usize {
    match &sketch.repr {
        Repr::Empty => EMPTY_SERIALIZED_SIZE,
        Repr::Explicit(set) => 2 + HASH_SIZE * set.len(),
        Repr::Sparse(sparse) => sparse_size(sparse.len()),
        Repr::Full(registers) => {
            let non_zero = registers.non_zero();
            if emit_full_as_sparse(non_zero) {
                sparse_size(non_zero)
            } else {
                MAX_SERIALIZED_SIZE
            }
        }
    }
}

fn sparse_size(count: usize) -> usize {
    1 + SPARSE_COUNT_SIZE + SPARSE_RECORD_SIZE * count
}

/// The wire requires at least one sparse record, so an all-zero register
/// array (decodable, but never produced by updates) stays in the full
/// layout.
fn emit_full_as_sparse(non_zero: usize) -> bool {
    non_zero > 0 && non_zero <= SPARSE_CAP
}

pub(crate) fn serialize(sketch: &HyperLogLog, dst: &mut [u8]) -> Result<usize, CodecError> {
    let size = serialized_size(sketch);
    if dst.len() < size {
        return Err(CodecError::BufferTooSmall {
            required: size,
            available: dst.len(),
        });
    }
    write_into(sketch, &mut dst[..size]);
    Ok(size)
}

pub(crate) fn to_bytes(sketch: &HyperLogLog) -> Vec<u8> {
    let mut buf = vec![0u8; serialized_size(sketch)];
    write_into(sketch, &mut buf);
    buf
}

pub(crate) fn empty_serialized() -> Vec<u8> {
    vec![TAG_EMPTY]
}

/// `dst` is exactly `serialized_size` bytes.
fn write_into(sketch: &HyperLogLog, dst: &mut [u8]) {
    match &sketch.repr {
        Repr::Empty => dst[0] = TAG_EMPTY,
        Repr::Explicit(set) => {
            dst[0] = TAG_EXPLICIT;
            dst[1] = set.len() as u8;
            for (slot, &hash) in dst[2..].chunks_exact_mut(HASH_SIZE).zip(set.hashes()) {
                slot.copy_from_slice(&hash.to_le_bytes());
            }
        }
        Repr::Sparse(sparse) => write_sparse(dst, sparse.len(), sparse.entries()),
        Repr::Full(registers) => {
            let non_zero = registers.non_zero();
            if emit_full_as_sparse(non_zero) {
                write_sparse(dst, non_zero, registers.non_zero_entries());
            } else {
                dst[0] = TAG_FULL;
                dst[1..].copy_from_slice(registers.as_bytes());
            }
        }
    }
}

fn write_sparse(dst: &mut [u8], count: usize, entries: impl Iterator<Item = (u16, u8)>) {
    dst[0] = TAG_SPARSE;
    dst[1..1 + SPARSE_COUNT_SIZE].copy_from_slice(&(count as i32).to_le_bytes());
    for (slot, (idx, value)) in dst[1 + SPARSE_COUNT_SIZE..]
        .chunks_exact_mut(SPARSE_RECORD_SIZE)
        .zip(entries)
    {
        slot[..2].copy_from_slice(&idx.to_le_bytes());
        slot[2] = value;
    }
}

pub(crate) fn deserialize(buf: &[u8]) -> Result<HyperLogLog, CodecError> {
    let (&tag, payload) = buf.split_first().ok_or(CodecError::InvalidEncoding)?;
    let repr = match tag {
        TAG_EMPTY => Repr::Empty,
        TAG_EXPLICIT => decode_explicit(payload)?,
        TAG_SPARSE => decode_sparse(payload)?,
        TAG_FULL => decode_full(payload)?,
        _ => return Err(CodecError::InvalidEncoding),
    };
    Ok(HyperLogLog { repr })
}

fn decode_explicit(payload: &[u8]) -> Result<Repr, CodecError> {
    let (&count, data) = payload.split_first().ok_or(CodecError::InvalidEncoding)?;
    let count = count as usize;
    if count == 0 || count > EXPLICIT_CAP || data.len() != count * HASH_SIZE {
        return Err(CodecError::InvalidEncoding);
    }
    let mut hashes = Vec::with_capacity(count);
    for chunk in data.chunks_exact(HASH_SIZE) {
        let hash = u64::from_le_bytes(chunk.try_into().unwrap());
        // The stored order is strictly ascending; anything else is corrupt.
        if hashes.last().is_some_and(|&prev| prev >= hash) {
            return Err(CodecError::InvalidEncoding);
        }
        hashes.push(hash);
    }
    Ok(Repr::Explicit(ExplicitSet::from_sorted(hashes)))
}

fn decode_sparse(payload: &[u8]) -> Result<Repr, CodecError> {
    if payload.len() < SPARSE_COUNT_SIZE {
        return Err(CodecError::InvalidEncoding);
    }
    let (count_bytes, records) = payload.split_at(SPARSE_COUNT_SIZE);
    let count = i32::from_le_bytes(count_bytes.try_into().unwrap());
    if count < 1 || count as usize > SPARSE_CAP {
        return Err(CodecError::InvalidEncoding);
    }
    let count = count as usize;
    if records.len() != count * SPARSE_RECORD_SIZE {
        return Err(CodecError::InvalidEncoding);
    }
    let mut entries = BTreeMap::new();
    for record in records.chunks_exact(SPARSE_RECORD_SIZE) {
        let idx = u16::from_le_bytes([record[0], record[1]]);
        let value = record[2];
        if usize::from(idx) >= NUM_REGISTERS || value == 0 || value > MAX_REGISTER_VALUE {
            return Err(CodecError::InvalidEncoding);
        }
        entries.insert(idx, value);
    }
    // Duplicate indices would make the count lie about the payload.
    if entries.len() != count {
        return Err(CodecError::InvalidEncoding);
    }
    Ok(Repr::Sparse(SparseRegisters::from_map(entries)))
}

fn decode_full(payload: &[u8]) -> Result<Repr, CodecError> {
    if payload.len() < NUM_REGISTERS {
        return Err(CodecError::InvalidEncoding);
    }
    let bytes = &payload[..NUM_REGISTERS];
    if bytes.iter().any(|&value| value > MAX_REGISTER_VALUE) {
        return Err(CodecError::InvalidEncoding);
    }
    Ok(Repr::Full(Registers::from_dense(bytes)))
}

/// Cheap classifier: checks only the tag and that the length is plausible
/// for it. O(1); a true result does not guarantee `deserialize` succeeds.
pub(crate) fn is_valid(buf: &[u8]) -> bool {
    let Some((&tag, payload)) = buf.split_first() else {
        return false;
    };
    match tag {
        TAG_EMPTY => true,
        TAG_EXPLICIT => payload
            .first()
            .is_some_and(|&count| payload.len() == 1 + HASH_SIZE * usize::from(count)),
        TAG_SPARSE => {
            if payload.len() < SPARSE_COUNT_SIZE {
                return false;
            }
            let count = i32::from_le_bytes(payload[..SPARSE_COUNT_SIZE].try_into().unwrap());
            count >= 0
                && payload.len() == SPARSE_COUNT_SIZE + SPARSE_RECORD_SIZE * count as usize
        }
        TAG_FULL => payload.len() >= NUM_REGISTERS,
        _ => false,
    }
}
