//! ## Sparse encoding
//! Ordered map of the non-zero registers only. The decoder produces this
//! encoding for compactly stored sketches; it is never created by updates,
//! and the first mutation promotes it to the full encoding.

use std::collections::BTreeMap;

use crate::registers::Registers;

#[derive(Clone, PartialEq)]
pub(crate) struct SparseRegisters(BTreeMap<u16, u8>);

impl SparseRegisters {
    /// Adopt validated (index, value) entries decoded from storage.
    pub(crate) fn from_map(entries: BTreeMap<u16, u8>) -> Self {
        Self(entries)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    /// Entries in ascending index order, as the codec persists them.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.0.iter().map(|(&idx, &value)| (idx, value))
    }

    /// Materialize the dense register array, zeros elsewhere.
    pub(crate) fn to_registers(&self) -> Registers {
        let mut registers = Registers::new();
        for (idx, value) in self.entries() {
            registers.apply(usize::from(idx), value);
        }
        registers
    }

    /// Estimate via a materialized dense view, so a decoded sparse sketch
    /// reports exactly what its dense form reported before encoding.
    pub(crate) fn estimate(&self) -> u64 {
        self.to_registers().estimate()
    }
}
