// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Register map of one duplex-mailbox instance window.
//!
//! The IP block exposes `INSTANCES_PER_BLOCK` identical windows at a fixed
//! stride from the block base. Several offsets change meaning between read
//! and write; both names are kept so call sites read like the datasheet.
//! All offsets are in bytes.

use bitflags::bitflags;
use static_assertions::{const_assert, const_assert_eq};

/// CONFIG register (read/write). Zero means unowned.
pub const REG_CONFIG: usize = 0x00;
/// Pending events gated toward the interrupt logic (read).
pub const REG_EVENT_CAUSE: usize = 0x04;
/// Drops event bits (write).
pub const REG_EVENT_CLEAR: usize = 0x04;
/// Raw event state (read).
pub const REG_EVENT_STATUS: usize = 0x08;
/// Raises event bits (write).
pub const REG_EVENT_SET: usize = 0x08;
/// Event-to-interrupt routing enable (read/write).
pub const REG_INT_ENABLE: usize = 0x0c;
/// First data register; the rest follow word by word.
pub const REG_DATA: usize = 0x10;

/// Data registers per instance.
pub const DATA_WORDS: usize = 16;
/// Message capacity in bytes (the whole data area).
pub const DATA_BYTES: usize = DATA_WORDS * 4;
/// Byte stride between adjacent instance windows.
pub const INSTANCE_STRIDE: usize = REG_DATA + DATA_BYTES;

/// Mailbox instances per IP block.
pub const INSTANCES_PER_BLOCK: usize = 32;
/// Logical interrupt indexes routable per block.
pub const INT_INDEXES: usize = 16;

const_assert_eq!(INSTANCE_STRIDE, 0x50);
// Two routing bits per logical index must fit INT_ENABLE.
const_assert!(2 * INT_INDEXES <= 32);

bitflags! {
    /// Per-instance event bits. Cause, status, set and clear all share
    /// this layout.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EventSet: u32 {
        /// A full message was written into the data registers.
        const NEW_DATA = 1 << 0;
        /// The receiver drained the data registers.
        const ACK = 1 << 1;
    }
}

/// The two event types an endpoint can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    NewData,
    Ack,
}

impl Event {
    pub const COUNT: usize = 2;

    /// Index used for per-event interrupt refcounting.
    pub const fn index(self) -> usize {
        match self {
            Event::NewData => 0,
            Event::Ack => 1,
        }
    }

    pub const fn mask(self) -> EventSet {
        match self {
            Event::NewData => EventSet::NEW_DATA,
            Event::Ack => EventSet::ACK,
        }
    }

    /// INT_ENABLE bit routing this event onto logical interrupt `int_idx`.
    pub const fn enable_bit(self, int_idx: u8) -> u32 {
        match self {
            Event::NewData => 1 << (2 * int_idx as u32),
            Event::Ack => 1 << (2 * int_idx as u32 + 1),
        }
    }
}

/// CONFIG bit 0: the instance accepts unsecure accesses.
pub const CONFIG_UNSECURE: u32 = 1 << 0;

const CONFIG_OWNER_SHIFT: u32 = 8;
const CONFIG_SRC_SHIFT: u32 = 16;
const CONFIG_DEST_SHIFT: u32 = 24;

/// Packs owner/source/destination ids into a CONFIG word, unsecure set.
pub const fn config_word(owner: u8, src: u8, dest: u8) -> u32 {
    CONFIG_UNSECURE
        | (owner as u32) << CONFIG_OWNER_SHIFT
        | (src as u32) << CONFIG_SRC_SHIFT
        | (dest as u32) << CONFIG_DEST_SHIFT
}

pub const fn config_owner(word: u32) -> u8 {
    (word >> CONFIG_OWNER_SHIFT) as u8
}

pub const fn config_src(word: u32) -> u8 {
    (word >> CONFIG_SRC_SHIFT) as u8
}

pub const fn config_dest(word: u32) -> u8 {
    (word >> CONFIG_DEST_SHIFT) as u8
}
