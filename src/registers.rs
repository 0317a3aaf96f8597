//! ## Full encoding
//! Dense array of [`NUM_REGISTERS`] registers, one byte per register. A hash
//! selects a register by its low [`PRECISION`] bits; the register keeps the
//! maximum observed position of the first 1 bit among the remaining bits.
//!
//! This module also carries the estimator math: the bias-corrected harmonic
//! mean with the linear-counting correction for the small range.

use crate::{NUM_REGISTERS, PRECISION, ZERO_COUNT_BITS};

/// Dense register array, heap-allocated so an idle sketch stays small.
#[derive(Clone, PartialEq, Debug)]
pub(crate) struct Registers(Box<[u8; NUM_REGISTERS]>);

impl Registers {
    pub(crate) fn new() -> Self {
        Self(Box::new([0; NUM_REGISTERS]))
    }

    /// Build a dense array by folding in a batch of hashes.
    pub(crate) fn from_hashes(hashes: &[u64]) -> Self {
        let mut registers = Self::new();
        for &hash in hashes {
            registers.update(hash);
        }
        registers
    }

    /// Rebuild a dense array from its serialized form. `bytes` must hold at
    /// least [`NUM_REGISTERS`] validated register values.
    pub(crate) fn from_dense(bytes: &[u8]) -> Self {
        let mut registers = Self::new();
        registers.0.copy_from_slice(&bytes[..NUM_REGISTERS]);
        registers
    }

    /// Fold one 64-bit hash into its register.
    #[inline]
    pub(crate) fn update(&mut self, hash: u64) {
        let idx = (hash % NUM_REGISTERS as u64) as usize;
        // Force a 1 bit at position ZERO_COUNT_BITS so the trailing-zero
        // count is defined even when the remaining bits are all zero.
        let shifted = (hash >> PRECISION) | (1 << ZERO_COUNT_BITS);
        let first_one_bit = (shifted.trailing_zeros() + 1) as u8;
        self.0[idx] = self.0[idx].max(first_one_bit);
    }

    /// Raise a single register to at least `value`.
    #[inline]
    pub(crate) fn apply(&mut self, idx: usize, value: u8) {
        self.0[idx] = self.0[idx].max(value);
    }

    /// Element-wise max with another dense array. Equivalent to having
    /// absorbed the union of both hash streams.
    pub(crate) fn merge(&mut self, other: &Registers) {
        for (lhs, &rhs) in self.0.iter_mut().zip(other.0.iter()) {
            *lhs = (*lhs).max(rhs);
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub(crate) fn non_zero(&self) -> usize {
        self.0.iter().filter(|&&value| value != 0).count()
    }

    /// Non-zero registers as (index, value) pairs in ascending index order.
    pub(crate) fn non_zero_entries(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, &value)| value != 0)
            .map(|(idx, &value)| (idx as u16, value))
    }

    pub(crate) fn estimate(&self) -> u64 {
        let mut harmonic_sum = 0.0;
        let mut zeros = 0usize;
        for &value in self.0.iter() {
            harmonic_sum += 1.0 / (1u64 << value) as f64;
            if value == 0 {
                zeros += 1;
            }
        }
        bias_corrected_estimate(harmonic_sum, zeros)
    }
}

/// Bias constant for `m >= 128` registers.
#[inline]
fn alpha(m: usize) -> f64 {
    0.7213 / (1.0 + 1.079 / m as f64)
}

/// Harmonic-mean estimate over the registers, switching to linear counting
/// in the small range where the raw estimate is biased.
fn bias_corrected_estimate(harmonic_sum: f64, zeros: usize) -> u64 {
    let m = NUM_REGISTERS as f64;
    let estimate = alpha(NUM_REGISTERS) * m * m / harmonic_sum;
    if estimate <= 2.5 * m && zeros > 0 {
        (m * (m / zeros as f64).ln() + 0.5) as u64
    } else {
        (estimate + 0.5) as u64
    }
}
