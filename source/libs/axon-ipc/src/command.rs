// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Bounded command queue between the receive interrupt and the
//! dispatch loop.
//!
//! The receive hook copies each inbound message into the ring from
//! interrupt context; the single dispatch loop drains it from normal
//! context. One producer, one consumer, no locks: the head and tail
//! indices carry release/acquire pairs and every payload word is an
//! atomic cell.
//!
//! OWNERS: @platform-ipc
//! STATUS: Functional
//! TEST_COVERAGE: Unit + property tests (host)

use core::array;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use mailbox_mmio::regs::{DATA_BYTES, DATA_WORDS};
use static_assertions::const_assert;

use crate::link::LinkId;

/// Commands the ring can hold is one less than this.
pub const CMD_QUEUE_DEPTH: usize = 4;
/// Inbound message size, fixed by the mailbox data area.
pub const MSG_BYTES: usize = DATA_BYTES;
/// Reply capacity handed to a handler. The first message word is reserved
/// for the header of the protocol layered above, so one word less.
pub const REPLY_BYTES: usize = DATA_BYTES - 4;

// A ring slot must stay free to tell full from empty.
const_assert!(CMD_QUEUE_DEPTH >= 2);

/// One inbound message plus the link it arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    pub msg: [u8; MSG_BYTES],
    pub link: LinkId,
}

/// Handler invoked once per dequeued command.
///
/// `reply` arrives zeroed with [`REPLY_BYTES`] capacity; returning
/// `Ok(n)` with `n > 0` sends the first `n` bytes back over the
/// command's link.
pub type HandlerFn = fn(&Command, &mut [u8]) -> Result<usize, CommandError>;

/// A handler failed to process its command. The reply is suppressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandError;

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command handler failed")
    }
}

/// The ring had no free slot; the command was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command queue full")
    }
}

struct CommandSlot {
    link: AtomicU32,
    words: [AtomicU32; DATA_WORDS],
}

impl CommandSlot {
    fn new() -> Self {
        Self { link: AtomicU32::new(0), words: array::from_fn(|_| AtomicU32::new(0)) }
    }
}

/// Single-producer single-consumer command ring.
///
/// `enqueue` may only run in the receive interrupt, `dequeue` and
/// `pending` only in the dispatch loop. `head` is the next slot to
/// write, `tail` the next to read; `head == tail` is empty.
pub struct CommandQueue<const N: usize> {
    head: AtomicUsize,
    tail: AtomicUsize,
    slots: [CommandSlot; N],
}

impl<const N: usize> CommandQueue<N> {
    pub fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            slots: array::from_fn(|_| CommandSlot::new()),
        }
    }

    /// Copies `cmd` into the ring. Interrupt context only.
    pub fn enqueue(&self, cmd: &Command) -> Result<(), QueueFull> {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % N;
        if next == self.tail.load(Ordering::Acquire) {
            return Err(QueueFull);
        }
        let slot = &self.slots[head];
        slot.link.store(cmd.link.index() as u32, Ordering::Relaxed);
        for (word, chunk) in slot.words.iter().zip(cmd.msg.chunks(4)) {
            let mut bytes = [0u8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            word.store(u32::from_le_bytes(bytes), Ordering::Relaxed);
        }
        self.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Removes the oldest command, if any. Dispatch loop only.
    pub fn dequeue(&self) -> Option<Command> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let slot = &self.slots[tail];
        let mut cmd = Command {
            msg: [0; MSG_BYTES],
            link: LinkId::from_index(slot.link.load(Ordering::Relaxed) as usize),
        };
        for (word, chunk) in slot.words.iter().zip(cmd.msg.chunks_mut(4)) {
            chunk.copy_from_slice(&word.load(Ordering::Relaxed).to_le_bytes()[..chunk.len()]);
        }
        self.tail.store((tail + 1) % N, Ordering::Release);
        Some(cmd)
    }

    /// True when at least one command is queued. Dispatch loop only.
    pub fn pending(&self) -> bool {
        self.tail.load(Ordering::Relaxed) != self.head.load(Ordering::Acquire)
    }
}

impl<const N: usize> Default for CommandQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn test_command(tag: u8) -> Command {
    let mut msg = [0u8; MSG_BYTES];
    msg[0] = tag;
    msg[MSG_BYTES - 1] = tag.wrapping_mul(3);
    Command { msg, link: LinkId::from_index(0) }
}
