// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

//! CONTEXT: Fixed-capacity slot pools for mailbox bookkeeping
//! OWNERS: @platform-ipc
//! STATUS: Functional
//! API_STABILITY: Internal (crate public, but intended for in-tree use)
//! TEST_COVERAGE: Unit + property tests (host)
//!
//! Every stateful entity in the mailbox stack (IP blocks, endpoints, links)
//! lives in one of these pools; nothing is heap-allocated after boot.
//! Handles are plain indexes validated on every access, and they are only
//! dereferenced from the normal execution context.

use core::array;
use core::fmt;

/// Handle to a pool slot.
///
/// A `SlotId` is not generation-tagged: a handle kept across `free` simply
/// resolves to `NoSuchSlot` (or to the slot's next tenant if the caller
/// recycles ids on its own, which in-tree users never do).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    /// Rebuilds a handle from a raw index, for callers that persist indexes
    /// in packed hardware-facing words.
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Raw index of the slot inside its pool.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Errors produced by pool operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// All slots are occupied.
    Exhausted,
    /// The handle is out of range or its slot is empty.
    NoSuchSlot,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "no free slot"),
            Self::NoSuchSlot => write!(f, "no such slot"),
        }
    }
}

/// Fixed-capacity slot arena with first-free allocation.
pub struct Pool<T, const N: usize> {
    slots: [Option<T>; N],
    live: usize,
}

impl<T, const N: usize> Pool<T, N> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self { slots: array::from_fn(|_| None), live: 0 }
    }

    /// Total number of slots.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Stores `value` in the lowest free slot and returns its handle.
    pub fn allocate(&mut self, value: T) -> Result<SlotId, PoolError> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(value);
                self.live += 1;
                return Ok(SlotId(index));
            }
        }
        Err(PoolError::Exhausted)
    }

    /// Empties the slot behind `id` and returns its value.
    pub fn free(&mut self, id: SlotId) -> Result<T, PoolError> {
        let slot = self.slots.get_mut(id.0).ok_or(PoolError::NoSuchSlot)?;
        let value = slot.take().ok_or(PoolError::NoSuchSlot)?;
        self.live -= 1;
        Ok(value)
    }

    pub fn get(&self, id: SlotId) -> Result<&T, PoolError> {
        self.slots.get(id.0).and_then(Option::as_ref).ok_or(PoolError::NoSuchSlot)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Result<&mut T, PoolError> {
        self.slots.get_mut(id.0).and_then(Option::as_mut).ok_or(PoolError::NoSuchSlot)
    }

    /// Iterates over occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (SlotId(index), value)))
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests_prop;
