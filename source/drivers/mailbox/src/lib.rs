// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]

//! CONTEXT: MMIO driver for the duplex-mailbox IP (claim/release, data
//! transfer, interrupt dispatch)
//! OWNERS: @platform-ipc
//! STATUS: Functional
//! API_STABILITY: Internal
//! TEST_COVERAGE: Register-level unit tests against the `sim` block model
//!
//! PUBLIC API:
//! - `MboxSystem`: block registry plus endpoint claim/release/send/read
//! - `rcv_isr` / `ack_isr`: interrupt dispatch entry points
//! - `event_pending` / `clear_event`: polling-mode accessors
//!
//! NOTE:
//! - Claim and release run in the normal context only and serialize on an
//!   internal lock. The ISR entries touch nothing but published endpoint
//!   slots, hardware registers and the caller's sink, so they may preempt
//!   any normal-context operation. Send/read resolve endpoints through the
//!   same published slots, which keeps them safe to call from the receive
//!   hooks in interrupt context.

#[cfg(all(feature = "sim", not(test)))]
extern crate std;

pub mod regs;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use axon_hal::{Bus, IrqControl};
use axon_pool::{Pool, SlotId};
use log::{debug, warn};
use spin::Mutex;

use regs::{
    config_dest, config_owner, config_src, config_word, Event, EventSet, DATA_BYTES, DATA_WORDS,
    INSTANCES_PER_BLOCK, INSTANCE_STRIDE, INT_INDEXES, REG_CONFIG, REG_DATA, REG_EVENT_CAUSE,
    REG_EVENT_CLEAR, REG_EVENT_SET, REG_EVENT_STATUS, REG_INT_ENABLE,
};

/// IP blocks the registry can track.
pub const MAX_BLOCKS: usize = 2;
/// Claimable endpoints across all blocks.
pub const MAX_ENDPOINTS: usize = 64;

/// Transfer direction of a claimed endpoint, from the claimer's viewpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    /// Event the claimer subscribes to for this direction.
    const fn event(self) -> Event {
        match self {
            Direction::Incoming => Event::NewData,
            Direction::Outgoing => Event::Ack,
        }
    }
}

/// What the interrupt path should do when an endpoint's event fires.
///
/// Resolved once at claim time and handed back to the ISR sink untouched.
/// `token` is a caller-chosen routing value and must fit 30 bits; the link
/// layer stores its slot index there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventHook {
    pub kind: HookKind,
    pub token: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    /// The inbound message carries a command for the dispatcher.
    Command,
    /// The inbound message is the reply to an in-flight request.
    Reply,
    /// The peer drained a message this side sent.
    Ack,
}

const HOOK_KIND_MASK: u32 = 0b11;
const HOOK_NONE: u32 = 0;
const HOOK_COMMAND: u32 = 1;
const HOOK_REPLY: u32 = 2;
const HOOK_ACK: u32 = 3;

fn pack_hook(hook: Option<EventHook>) -> u32 {
    match hook {
        None => HOOK_NONE,
        Some(EventHook { kind, token }) => {
            debug_assert!(token < 1 << 30);
            let kind = match kind {
                HookKind::Command => HOOK_COMMAND,
                HookKind::Reply => HOOK_REPLY,
                HookKind::Ack => HOOK_ACK,
            };
            kind | token << 2
        }
    }
}

fn unpack_hook(raw: u32) -> Option<EventHook> {
    let kind = match raw & HOOK_KIND_MASK {
        HOOK_COMMAND => HookKind::Command,
        HOOK_REPLY => HookKind::Reply,
        HOOK_ACK => HookKind::Ack,
        _ => return None,
    };
    Some(EventHook { kind, token: raw >> 2 })
}

/// Parameters for claiming one mailbox instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimConfig {
    /// Block base offset inside the bus window.
    pub block_base: usize,
    /// Instance index inside the block.
    pub instance: u8,
    /// Physical interrupt line carrying this endpoint's event. `None`
    /// claims in polling mode: no INT_ENABLE routing, no line
    /// subscription, events observed through the polling accessors.
    pub irq_line: Option<u32>,
    /// Logical interrupt index inside the block.
    pub int_idx: u8,
    /// Nonzero claims as owner and programs the instance; zero expects the
    /// owner to have programmed it already.
    pub owner: u8,
    /// Source id the instance routes from.
    pub src: u8,
    /// Destination id the instance routes to.
    pub dest: u8,
    pub direction: Direction,
}

/// Errors produced by the mailbox driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MboxError {
    /// All endpoint or block slots are in use.
    Exhausted,
    /// CONFIG readback did not match what the owner wrote.
    OwnershipConflict { observed: u32 },
    /// Non-owner claim found an unexpected source/destination route.
    RouteMismatch { observed: u32 },
    /// The endpoint handle is stale or out of range.
    NoSuchEndpoint,
    /// The operation requires the opposite transfer direction.
    WrongDirection,
    /// Instance or logical interrupt index out of range.
    BadConfig,
}

impl fmt::Display for MboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "no free mailbox slot"),
            Self::OwnershipConflict { observed } => {
                write!(f, "instance owned elsewhere (config {observed:#010x})")
            }
            Self::RouteMismatch { observed } => {
                write!(f, "instance routes elsewhere (config {observed:#010x})")
            }
            Self::NoSuchEndpoint => write!(f, "no such endpoint"),
            Self::WrongDirection => write!(f, "wrong transfer direction"),
            Self::BadConfig => write!(f, "claim parameters out of range"),
        }
    }
}

/// Handle to a claimed endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointId(SlotId);

impl EndpointId {
    pub const fn index(self) -> usize {
        self.0.index()
    }
}

/// Normal-context endpoint state, kept under the config lock.
#[derive(Clone, Copy)]
struct EndpointRec {
    /// Instance register window offset inside the bus window.
    window: usize,
    block: SlotId,
    instance: u8,
    int_idx: u8,
    owner: bool,
    /// Interrupt routing was programmed and must be unwound on release.
    routed: bool,
    direction: Direction,
}

struct IpBlock {
    base: usize,
    refcnt: u32,
    /// Per-event-type interrupt subscriber counts.
    ev_refcnt: [u32; Event::COUNT],
    /// Physical line recorded on the first subscribe of each event type.
    irq_line: [Option<u32>; Event::COUNT],
}

impl IpBlock {
    fn new(base: usize) -> Self {
        Self { base, refcnt: 1, ev_refcnt: [0; Event::COUNT], irq_line: [None; Event::COUNT] }
    }
}

/// One endpoint slot on the lock-free data plane.
///
/// Send, read, event polling and interrupt dispatch all resolve an
/// endpoint through this table instead of the pooled records, so none of
/// them contend with the claim/release lock. Payload fields are written
/// only while `active` is false; `publish` stores `active` with `Release`
/// and readers pair it with `Acquire`, so an active slot always exposes a
/// fully written payload.
struct IsrSlot {
    active: AtomicBool,
    window: AtomicUsize,
    outgoing: AtomicBool,
    hook: AtomicU32,
}

impl IsrSlot {
    const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            window: AtomicUsize::new(0),
            outgoing: AtomicBool::new(false),
            hook: AtomicU32::new(HOOK_NONE),
        }
    }

    fn publish(&self, window: usize, direction: Direction, hook: Option<EventHook>) {
        self.window.store(window, Ordering::Relaxed);
        self.outgoing.store(direction == Direction::Outgoing, Ordering::Relaxed);
        self.hook.store(pack_hook(hook), Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
    }

    fn retract(&self) {
        self.active.store(false, Ordering::Release);
    }
}

struct SystemState {
    blocks: Pool<IpBlock, MAX_BLOCKS>,
    endpoints: Pool<EndpointRec, MAX_ENDPOINTS>,
}

impl SystemState {
    fn block_mut(&mut self, id: SlotId) -> &mut IpBlock {
        match self.blocks.get_mut(id) {
            Ok(block) => block,
            Err(_) => panic!("mailbox block registry corrupt"),
        }
    }

    /// Looks up the block at `base`, creating it on first use.
    fn block_get(&mut self, base: usize) -> Result<SlotId, MboxError> {
        let found = self.blocks.iter().find(|(_, block)| block.base == base).map(|(id, _)| id);
        if let Some(id) = found {
            self.block_mut(id).refcnt += 1;
            return Ok(id);
        }
        self.blocks.allocate(IpBlock::new(base)).map_err(|_| MboxError::Exhausted)
    }

    fn block_put(&mut self, id: SlotId) {
        let block = self.block_mut(id);
        assert!(block.refcnt > 0, "mailbox block over-released");
        block.refcnt -= 1;
        if block.refcnt == 0 {
            assert!(
                block.ev_refcnt.iter().all(|&count| count == 0),
                "mailbox block dropped with live interrupt subscriptions"
            );
            let _ = self.blocks.free(id);
        }
    }

    fn irq_subscribe<I: IrqControl>(&mut self, id: SlotId, event: Event, line: u32, irq: &I) {
        let block = self.block_mut(id);
        let slot = event.index();
        block.ev_refcnt[slot] += 1;
        if block.ev_refcnt[slot] == 1 {
            block.irq_line[slot] = Some(line);
            irq.enable_line(line);
        }
    }

    fn irq_unsubscribe<I: IrqControl>(&mut self, id: SlotId, event: Event, irq: &I) {
        let block = self.block_mut(id);
        let slot = event.index();
        assert!(block.ev_refcnt[slot] > 0, "mailbox interrupt over-unsubscribed");
        block.ev_refcnt[slot] -= 1;
        if block.ev_refcnt[slot] == 0 {
            if let Some(line) = block.irq_line[slot].take() {
                irq.disable_line(line);
            }
        }
    }
}

/// Driver for every mailbox IP block reachable through one bus window.
pub struct MboxSystem<B: Bus, I: IrqControl> {
    bus: B,
    irq: I,
    /// Claim/release bookkeeping; never taken from the interrupt path.
    state: Mutex<SystemState>,
    isr_slots: [IsrSlot; MAX_ENDPOINTS],
}

impl<B: Bus, I: IrqControl> MboxSystem<B, I> {
    pub fn new(bus: B, irq: I) -> Self {
        Self {
            bus,
            irq,
            state: Mutex::new(SystemState { blocks: Pool::new(), endpoints: Pool::new() }),
            isr_slots: [const { IsrSlot::new() }; MAX_ENDPOINTS],
        }
    }

    /// Claims one mailbox instance as an endpoint.
    ///
    /// Owners program the CONFIG word and verify it by readback; everyone
    /// else verifies the already-programmed route for `cfg.direction`.
    /// With an interrupt line the claimer's INT_ENABLE bit is set and the
    /// block-level subscription is counted; polled claims skip both.
    /// Every failure path unwinds the steps taken before it.
    pub fn claim(
        &self,
        cfg: ClaimConfig,
        hook: Option<EventHook>,
    ) -> Result<EndpointId, MboxError> {
        if cfg.instance as usize >= INSTANCES_PER_BLOCK || cfg.int_idx as usize >= INT_INDEXES {
            return Err(MboxError::BadConfig);
        }
        let window = cfg.block_base + cfg.instance as usize * INSTANCE_STRIDE;
        let event = cfg.direction.event();
        let mut state = self.state.lock();

        let block = state.block_get(cfg.block_base)?;
        let rec = EndpointRec {
            window,
            block,
            instance: cfg.instance,
            int_idx: cfg.int_idx,
            owner: cfg.owner != 0,
            routed: cfg.irq_line.is_some(),
            direction: cfg.direction,
        };
        let id = match state.endpoints.allocate(rec) {
            Ok(id) => id,
            Err(_) => {
                state.block_put(block);
                return Err(MboxError::Exhausted);
            }
        };

        if cfg.owner != 0 {
            let want = config_word(cfg.owner, cfg.src, cfg.dest);
            self.bus.write(window + REG_CONFIG, want);
            let observed = self.bus.read(window + REG_CONFIG);
            if observed != want {
                warn!(
                    "mailbox: instance {} claim lost to owner {} (config {:#010x}, want {:#010x})",
                    cfg.instance, config_owner(observed), observed, want
                );
                let _ = state.endpoints.free(id);
                state.block_put(block);
                return Err(MboxError::OwnershipConflict { observed });
            }
        } else {
            let observed = self.bus.read(window + REG_CONFIG);
            let (found, expected) = match cfg.direction {
                Direction::Outgoing => (config_src(observed), cfg.src),
                Direction::Incoming => (config_dest(observed), cfg.dest),
            };
            if expected != 0 && found != expected {
                warn!(
                    "mailbox: instance {} routes to {} (expected {})",
                    cfg.instance, found, expected
                );
                let _ = state.endpoints.free(id);
                state.block_put(block);
                return Err(MboxError::RouteMismatch { observed });
            }
        }

        if let Some(line) = cfg.irq_line {
            let enable = self.bus.read(window + REG_INT_ENABLE);
            self.bus.write(window + REG_INT_ENABLE, enable | event.enable_bit(cfg.int_idx));
            state.irq_subscribe(block, event, line, &self.irq);
        }

        self.isr_slots[id.index()].publish(window, cfg.direction, hook);
        debug!(
            "mailbox: claimed instance {} ({:?}, owner {}, int_idx {})",
            cfg.instance, cfg.direction, cfg.owner, cfg.int_idx
        );
        Ok(EndpointId(id))
    }

    /// Releases a claimed endpoint.
    ///
    /// Owners de-program the instance. A routed claimer's INT_ENABLE bit
    /// is cleared and its interrupt subscription unwound; the block
    /// reference is dropped either way.
    pub fn release(&self, id: EndpointId) -> Result<(), MboxError> {
        let mut state = self.state.lock();
        let rec = state.endpoints.free(id.0).map_err(|_| MboxError::NoSuchEndpoint)?;
        self.isr_slots[id.index()].retract();

        if rec.owner {
            self.bus.write(rec.window + REG_CONFIG, 0);
        }
        if rec.routed {
            let event = rec.direction.event();
            let enable = self.bus.read(rec.window + REG_INT_ENABLE);
            self.bus.write(rec.window + REG_INT_ENABLE, enable & !event.enable_bit(rec.int_idx));
            state.irq_unsubscribe(rec.block, event, &self.irq);
        }
        state.block_put(rec.block);
        debug!("mailbox: released instance {}", rec.instance);
        Ok(())
    }

    /// Copies `buf` into the data registers and raises NEW_DATA.
    ///
    /// Bytes are packed little-endian into whole words; the remaining data
    /// registers are zeroed so the receiver never sees stale words. A
    /// message larger than the data area is a precondition violation.
    pub fn send(&self, id: EndpointId, buf: &[u8]) -> Result<usize, MboxError> {
        assert!(buf.len() <= DATA_BYTES, "message exceeds mailbox data area");
        let window = self.window(id, Direction::Outgoing)?;
        let mut words = 0;
        for chunk in buf.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.bus.write(window + REG_DATA + words * 4, u32::from_le_bytes(word));
            words += 1;
        }
        for idx in words..DATA_WORDS {
            self.bus.write(window + REG_DATA + idx * 4, 0);
        }
        self.bus.write(window + REG_EVENT_SET, EventSet::NEW_DATA.bits());
        debug!("mailbox: sent {} bytes (window {:#x})", buf.len(), window);
        Ok(buf.len())
    }

    /// Drains the data registers into `buf` and raises ACK.
    ///
    /// Returns the number of bytes copied, bounded by the data area size
    /// even if the caller asked for more.
    pub fn read(&self, id: EndpointId, buf: &mut [u8]) -> Result<usize, MboxError> {
        let window = self.window(id, Direction::Incoming)?;
        let count = buf.len().min(DATA_BYTES);
        for (idx, chunk) in buf[..count].chunks_mut(4).enumerate() {
            let word = self.bus.read(window + REG_DATA + idx * 4).to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        self.bus.write(window + REG_EVENT_SET, EventSet::ACK.bits());
        Ok(count)
    }

    /// Polling-mode accessor: reads `event` from the EVENT_STATUS register.
    pub fn event_pending(&self, id: EndpointId, event: Event) -> Result<bool, MboxError> {
        let window = self.any_window(id)?;
        let status = self.bus.read(window + REG_EVENT_STATUS);
        Ok(EventSet::from_bits_truncate(status).contains(event.mask()))
    }

    /// Polling-mode accessor: drops `event` via the EVENT_CLEAR register.
    pub fn clear_event(&self, id: EndpointId, event: Event) -> Result<(), MboxError> {
        let window = self.any_window(id)?;
        self.bus.write(window + REG_EVENT_CLEAR, event.mask().bits());
        Ok(())
    }

    /// NEW_DATA interrupt entry point for logical index `int_idx`.
    pub fn rcv_isr(&self, int_idx: u8, sink: impl FnMut(EndpointId, EventHook)) {
        self.dispatch(Event::NewData, int_idx, sink);
    }

    /// ACK interrupt entry point for logical index `int_idx`.
    pub fn ack_isr(&self, int_idx: u8, sink: impl FnMut(EndpointId, EventHook)) {
        self.dispatch(Event::Ack, int_idx, sink);
    }

    /// Scans all published endpoints for `event` routed onto `int_idx`.
    ///
    /// A match needs both the event cause bit and this logical index's
    /// INT_ENABLE bit. The cause bit is cleared before the hook is handed
    /// to the sink. An interrupt nobody subscribed to is a wiring defect.
    fn dispatch(&self, event: Event, int_idx: u8, mut sink: impl FnMut(EndpointId, EventHook)) {
        let cause_mask = event.mask().bits();
        let enable_bit = event.enable_bit(int_idx);
        let mut handled = 0usize;
        for (index, slot) in self.isr_slots.iter().enumerate() {
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }
            let window = slot.window.load(Ordering::Relaxed);
            if self.bus.read(window + REG_EVENT_CAUSE) & cause_mask == 0 {
                continue;
            }
            if self.bus.read(window + REG_INT_ENABLE) & enable_bit == 0 {
                continue;
            }
            self.bus.write(window + REG_EVENT_CLEAR, cause_mask);
            handled += 1;
            if let Some(hook) = unpack_hook(slot.hook.load(Ordering::Relaxed)) {
                sink(EndpointId(SlotId::from_index(index)), hook);
            }
        }
        assert!(handled > 0, "mailbox interrupt with no subscribed endpoint");
    }

    /// Resolves an endpoint's register window off the data plane, checking
    /// its transfer direction. Safe in any context.
    fn window(&self, id: EndpointId, direction: Direction) -> Result<usize, MboxError> {
        let slot = self.isr_slots.get(id.index()).ok_or(MboxError::NoSuchEndpoint)?;
        if !slot.active.load(Ordering::Acquire) {
            return Err(MboxError::NoSuchEndpoint);
        }
        let outgoing = direction == Direction::Outgoing;
        if slot.outgoing.load(Ordering::Relaxed) != outgoing {
            return Err(MboxError::WrongDirection);
        }
        Ok(slot.window.load(Ordering::Relaxed))
    }

    fn any_window(&self, id: EndpointId) -> Result<usize, MboxError> {
        let slot = self.isr_slots.get(id.index()).ok_or(MboxError::NoSuchEndpoint)?;
        if !slot.active.load(Ordering::Acquire) {
            return Err(MboxError::NoSuchEndpoint);
        }
        Ok(slot.window.load(Ordering::Relaxed))
    }
}
