// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Link state over one outgoing and one incoming mailbox endpoint
//! forming a bidirectional request/reply channel.
//!
//! Normal-context bookkeeping (`LinkRec`) lives in the pooled link table;
//! everything the interrupt hooks touch (`LinkShared`) sits in a fixed
//! array of atomics indexed by the link slot, so the hooks never take a
//! lock. The hook token stored with each claimed endpoint is the link
//! slot index.
//!
//! OWNERS: @platform-ipc
//! STATUS: Functional
//! TEST_COVERAGE: Unit tests (host); end-to-end in tests/e2e

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use axon_pool::SlotId;
use mailbox_mmio::regs::{DATA_BYTES, DATA_WORDS};
use mailbox_mmio::{ClaimConfig, Direction, EndpointId, HookKind, MboxError};
use static_assertions::const_assert;

/// Links one subsystem instance can carry.
pub const MAX_LINKS: usize = 8;
/// Acknowledgement wait budget: polls of the ACK flag before the sender
/// gives up and continues optimistically.
pub const ACK_RETRY_LIMIT: u32 = 10;

// Link slot indices ride in the 30-bit endpoint hook token.
const_assert!((MAX_LINKS as u64) < 1 << 30);

/// Handle to a connected link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkId(SlotId);

impl LinkId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(SlotId::from_index(index))
    }

    pub(crate) fn slot(self) -> SlotId {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0.index()
    }
}

/// Errors produced by link operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkError {
    /// The link table has no free slot.
    Exhausted,
    /// The link handle is stale or out of range.
    NoSuchLink,
    /// An endpoint claim/release/transfer failed underneath.
    Endpoint(MboxError),
    /// The outgoing endpoint accepted zero bytes.
    SendFailed,
    /// No reply arrived within the caller's receive budget.
    Timeout,
}

impl From<MboxError> for LinkError {
    fn from(err: MboxError) -> Self {
        Self::Endpoint(err)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "no free link slot"),
            Self::NoSuchLink => write!(f, "no such link"),
            Self::Endpoint(err) => write!(f, "mailbox endpoint: {err}"),
            Self::SendFailed => write!(f, "send accepted no bytes"),
            Self::Timeout => write!(f, "timed out waiting for reply"),
        }
    }
}

/// Where a link currently is in its request/reply cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkPhase {
    Idle,
    AwaitingAck,
    AwaitingReply,
}

/// Which end of the channel this instance is.
///
/// The server owns both mailbox instances and programs their routing; the
/// client claims them in verify-only mode. Inbound messages are commands
/// on a server and replies on a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Parameters for connecting a link over two mailbox instances.
#[derive(Clone, Copy, Debug)]
pub struct LinkConfig {
    pub name: &'static str,
    pub block_base: usize,
    /// Instance carrying peer-to-us traffic.
    pub from_instance: u8,
    /// Instance carrying us-to-peer traffic.
    pub to_instance: u8,
    pub rcv_irq: u32,
    pub rcv_int_idx: u8,
    /// Line for the outgoing instance's ACK event. `None` makes the link
    /// observe acknowledgements by polling the event register instead.
    pub ack_irq: Option<u32>,
    pub ack_int_idx: u8,
    pub role: Role,
    pub server_id: u8,
    pub client_id: u8,
}

impl LinkConfig {
    /// (our id, peer id) as seen from `role`.
    fn ids(&self) -> (u8, u8) {
        match self.role {
            Role::Server => (self.server_id, self.client_id),
            Role::Client => (self.client_id, self.server_id),
        }
    }

    fn owner(&self) -> u8 {
        match self.role {
            Role::Server => self.server_id,
            Role::Client => 0,
        }
    }

    pub(crate) fn rcv_hook_kind(&self) -> HookKind {
        match self.role {
            Role::Server => HookKind::Command,
            Role::Client => HookKind::Reply,
        }
    }

    /// Claim for the incoming endpoint: the hardware route reads
    /// peer -> us.
    pub(crate) fn incoming_claim(&self) -> ClaimConfig {
        let (own, peer) = self.ids();
        ClaimConfig {
            block_base: self.block_base,
            instance: self.from_instance,
            irq_line: Some(self.rcv_irq),
            int_idx: self.rcv_int_idx,
            owner: self.owner(),
            src: peer,
            dest: own,
            direction: Direction::Incoming,
        }
    }

    /// Claim for the outgoing endpoint: the hardware route reads
    /// us -> peer.
    pub(crate) fn outgoing_claim(&self) -> ClaimConfig {
        let (own, peer) = self.ids();
        ClaimConfig {
            block_base: self.block_base,
            instance: self.to_instance,
            irq_line: self.ack_irq,
            int_idx: self.ack_int_idx,
            owner: self.owner(),
            src: own,
            dest: peer,
            direction: Direction::Outgoing,
        }
    }
}

/// Normal-context link record, kept in the pooled link table.
///
/// The endpoint fields are `None` only while `connect` is mid-flight;
/// no caller outside `connect` ever observes that state.
pub(crate) struct LinkRec {
    pub(crate) name: &'static str,
    /// ACKs are observed by register polling, not interrupt delivery.
    pub(crate) ack_polled: bool,
    pub(crate) from: Option<EndpointId>,
    pub(crate) to: Option<EndpointId>,
}

impl LinkRec {
    pub(crate) fn new(name: &'static str, ack_polled: bool) -> Self {
        Self { name, ack_polled, from: None, to: None }
    }
}

/// Reply landing zone written by the receive hook, read by `request`.
///
/// `expected` is armed by `request` before the send goes out; the hook
/// reads that many bytes from hardware, stores them and publishes `len`
/// with `Release`. `request` pairs that with an `Acquire` load of `len`,
/// so a nonzero length always exposes fully written words.
pub(crate) struct ReplySlot {
    expected: AtomicUsize,
    len: AtomicUsize,
    words: [AtomicU32; DATA_WORDS],
}

impl ReplySlot {
    pub(crate) const fn new() -> Self {
        Self {
            expected: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            words: [const { AtomicU32::new(0) }; DATA_WORDS],
        }
    }

    pub(crate) fn arm(&self, expected: usize) {
        self.len.store(0, Ordering::Relaxed);
        self.expected.store(expected, Ordering::Relaxed);
    }

    pub(crate) fn disarm(&self) {
        self.expected.store(0, Ordering::Relaxed);
    }

    pub(crate) fn expected(&self) -> usize {
        self.expected.load(Ordering::Relaxed)
    }

    /// Interrupt side: store the reply bytes and publish their count.
    pub(crate) fn publish(&self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= DATA_BYTES);
        for (word, chunk) in self.words.iter().zip(bytes.chunks(4)) {
            let mut raw = [0u8; 4];
            raw[..chunk.len()].copy_from_slice(chunk);
            word.store(u32::from_le_bytes(raw), Ordering::Relaxed);
        }
        self.len.store(bytes.len(), Ordering::Release);
    }

    /// Poll side: the published byte count, once there is one.
    pub(crate) fn poll_len(&self) -> Option<usize> {
        let len = self.len.load(Ordering::Acquire);
        (len > 0).then_some(len)
    }

    /// Copies the published reply out, returning the bytes copied.
    pub(crate) fn copy_to(&self, out: &mut [u8]) -> usize {
        let count = self.len.load(Ordering::Acquire).min(out.len());
        for (idx, chunk) in out[..count].chunks_mut(4).enumerate() {
            let raw = self.words[idx].load(Ordering::Relaxed).to_le_bytes();
            chunk.copy_from_slice(&raw[..chunk.len()]);
        }
        count
    }
}

/// Per-link state shared between the interrupt hooks and normal context.
pub(crate) struct LinkShared {
    /// Set by the ACK hook once the peer drained our last send.
    pub(crate) tx_acked: AtomicBool,
    /// A send went out since the last `reset`/request completion.
    pub(crate) sent: AtomicBool,
    pub(crate) reply: ReplySlot,
}

impl LinkShared {
    pub(crate) const fn new() -> Self {
        Self {
            tx_acked: AtomicBool::new(false),
            sent: AtomicBool::new(false),
            reply: ReplySlot::new(),
        }
    }

    pub(crate) fn reset(&self) {
        self.tx_acked.store(false, Ordering::Relaxed);
        self.sent.store(false, Ordering::Relaxed);
        self.reply.arm(0);
    }

    pub(crate) fn phase(&self) -> LinkPhase {
        if self.reply.expected() > 0 && self.reply.poll_len().is_none() {
            LinkPhase::AwaitingReply
        } else if self.sent.load(Ordering::Relaxed) && !self.tx_acked.load(Ordering::Acquire) {
            LinkPhase::AwaitingAck
        } else {
            LinkPhase::Idle
        }
    }
}
