// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Request/reply links and command dispatch over mailbox hardware
//! OWNERS: @platform-ipc
//! STATUS: Functional
//! API_STABILITY: Internal
//! TEST_COVERAGE: Unit tests against the register-level simulator;
//! two-sided flows in tests/e2e
//!
//! PUBLIC API:
//! - `IpcCore`: link table + command dispatcher over one `MboxSystem`
//! - `connect`/`disconnect`, `send`/`is_send_acked`/`request`/`phase`
//! - `register_handler`, `process_one`/`process_pending`/`pending`
//! - `rcv_isr`/`ack_isr`: interrupt entry points, one per event type
//!
//! A link pairs one outgoing and one incoming mailbox endpoint into a
//! bidirectional channel. Inbound traffic lands in interrupt context:
//! commands are copied into a bounded ring for the dispatch loop, replies
//! and acknowledgements are published through per-link atomics that the
//! synchronous paths poll under an explicit budget. Delivery is best
//! effort; a full queue or a missed acknowledgement is logged and
//! absorbed, never escalated. A link connected without an ACK interrupt
//! line observes acknowledgements by polling the event register instead;
//! wired links leave that register to their interrupt.

#![cfg_attr(not(test), no_std)]

pub mod budget;
pub mod command;
pub mod link;
#[cfg(test)]
mod tests_prop;

use core::sync::atomic::Ordering;
use core::time::Duration;

use axon_hal::{Bus, IrqControl};
use axon_pool::Pool;
use log::{debug, warn};
use mailbox_mmio::regs::Event;
use mailbox_mmio::{EndpointId, EventHook, HookKind, MboxSystem};
use spin::Mutex;

pub use budget::{Clock, TimedOut};
pub use command::{Command, CommandError, HandlerFn, CMD_QUEUE_DEPTH, MSG_BYTES, REPLY_BYTES};
pub use link::{LinkConfig, LinkError, LinkId, LinkPhase, Role, ACK_RETRY_LIMIT, MAX_LINKS};

use command::CommandQueue;
use link::{LinkRec, LinkShared};

/// How long the dispatcher waits for the remote side to acknowledge a
/// reply before it logs and moves on.
const REPLY_ACK_TIMEOUT: Duration = Duration::from_millis(50);

/// One side of the mailbox IPC subsystem.
///
/// Owns the endpoint driver, the link table, the command ring and the
/// registered handler. Every method takes `&self`; the interrupt entry
/// points may preempt any other method at any instruction boundary.
pub struct IpcCore<B: Bus, I: IrqControl, C: Clock> {
    mbox: MboxSystem<B, I>,
    clock: C,
    /// Normal-context link bookkeeping; never taken from interrupt paths.
    links: Mutex<Pool<LinkRec, MAX_LINKS>>,
    /// Cross-context link state, indexed by link slot.
    shared: [LinkShared; MAX_LINKS],
    queue: CommandQueue<CMD_QUEUE_DEPTH>,
    handler: Mutex<Option<HandlerFn>>,
}

impl<B: Bus, I: IrqControl, C: Clock> IpcCore<B, I, C> {
    pub fn new(mbox: MboxSystem<B, I>, clock: C) -> Self {
        Self {
            mbox,
            clock,
            links: Mutex::new(Pool::new()),
            shared: [const { LinkShared::new() }; MAX_LINKS],
            queue: CommandQueue::new(),
            handler: Mutex::new(None),
        }
    }

    /// Connects a link: claims the incoming endpoint with the
    /// role-appropriate receive hook and the outgoing endpoint with the
    /// ACK hook. Partial failures unwind in reverse order.
    pub fn connect(&self, cfg: LinkConfig) -> Result<LinkId, LinkError> {
        let mut links = self.links.lock();
        let rec = LinkRec::new(cfg.name, cfg.ack_irq.is_none());
        let slot = links.allocate(rec).map_err(|_| LinkError::Exhausted)?;
        let token = slot.index() as u32;
        self.shared[slot.index()].reset();

        let rcv_hook = EventHook { kind: cfg.rcv_hook_kind(), token };
        let from = match self.mbox.claim(cfg.incoming_claim(), Some(rcv_hook)) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!("link {}: incoming claim failed: {err}", cfg.name);
                let _ = links.free(slot);
                return Err(err.into());
            }
        };
        // A polled-ACK claim wires no interrupt, so it carries no hook.
        let ack_hook = cfg.ack_irq.is_some().then_some(EventHook { kind: HookKind::Ack, token });
        let to = match self.mbox.claim(cfg.outgoing_claim(), ack_hook) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!("link {}: outgoing claim failed: {err}", cfg.name);
                let _ = self.mbox.release(from);
                let _ = links.free(slot);
                return Err(err.into());
            }
        };

        if let Ok(rec) = links.get_mut(slot) {
            rec.from = Some(from);
            rec.to = Some(to);
        }
        debug!("link {}: connected ({:?})", cfg.name, cfg.role);
        Ok(LinkId::from_index(slot.index()))
    }

    /// Releases both endpoints and frees the link slot. An endpoint
    /// release failure is reported but does not stop the teardown.
    pub fn disconnect(&self, link: LinkId) -> Result<(), LinkError> {
        let mut links = self.links.lock();
        let rec = links.free(link.slot()).map_err(|_| LinkError::NoSuchLink)?;
        let mut result = Ok(());
        if let Some(from) = rec.from {
            if let Err(err) = self.mbox.release(from) {
                result = Err(err.into());
            }
        }
        if let Some(to) = rec.to {
            if let Err(err) = self.mbox.release(to) {
                if result.is_ok() {
                    result = Err(err.into());
                }
            }
        }
        self.shared[link.index()].reset();
        debug!("link {}: disconnected", rec.name);
        result
    }

    /// Sends `buf` to the peer, clearing the pending-ACK flag first.
    pub fn send(&self, link: LinkId, buf: &[u8]) -> Result<usize, LinkError> {
        let (name, to) = self.outgoing(link)?;
        let shared = &self.shared[link.index()];
        shared.tx_acked.store(false, Ordering::Relaxed);
        let sent = self.mbox.send(to, buf)?;
        if sent == 0 {
            warn!("link {name}: send accepted no bytes");
            return Err(LinkError::SendFailed);
        }
        shared.sent.store(true, Ordering::Relaxed);
        Ok(sent)
    }

    /// Non-blocking: has the peer drained our last send?
    ///
    /// On a polled-ACK link this reads the outgoing instance's event
    /// register, consuming the event on sight and caching the result;
    /// a wired link only reports what its ACK interrupt delivered.
    pub fn is_send_acked(&self, link: LinkId) -> Result<bool, LinkError> {
        let (to, polled) = {
            let links = self.links.lock();
            let rec = links.get(link.slot()).map_err(|_| LinkError::NoSuchLink)?;
            (rec.to.ok_or(LinkError::NoSuchLink)?, rec.ack_polled)
        };
        let shared = &self.shared[link.index()];
        if shared.tx_acked.load(Ordering::Acquire) {
            return Ok(true);
        }
        if !polled {
            return Ok(false);
        }
        if self.mbox.event_pending(to, Event::Ack)? {
            self.mbox.clear_event(to, Event::Ack)?;
            shared.tx_acked.store(true, Ordering::Relaxed);
            return Ok(true);
        }
        Ok(false)
    }

    /// Where the link currently is in its request/reply cycle.
    pub fn phase(&self, link: LinkId) -> Result<LinkPhase, LinkError> {
        self.ensure_link(link)?;
        Ok(self.shared[link.index()].phase())
    }

    /// Synchronous request/reply.
    ///
    /// Sends `wbuf`, waits for the acknowledgement under the fixed retry
    /// budget (continuing optimistically if it never comes), then polls
    /// for the reply until `recv_timeout` expires. An empty `rbuf` skips
    /// the reply wait. Returns the reply bytes copied into `rbuf`.
    ///
    /// One request may be outstanding per link; issuing a second one
    /// concurrently is a caller error.
    pub fn request(
        &self,
        link: LinkId,
        wbuf: &[u8],
        rbuf: &mut [u8],
        recv_timeout: Duration,
    ) -> Result<usize, LinkError> {
        let (name, _) = self.outgoing(link)?;
        let shared = &self.shared[link.index()];
        shared.reply.arm(rbuf.len().min(MSG_BYTES));

        if let Err(err) = self.send(link, wbuf) {
            shared.reply.disarm();
            return Err(err);
        }
        self.wait_for_ack(name, link);

        let result = if rbuf.is_empty() {
            Ok(0)
        } else {
            match budget::poll_budgeted(&self.clock, recv_timeout, || shared.reply.poll_len()) {
                Ok(_) => Ok(shared.reply.copy_to(rbuf)),
                Err(_) => {
                    warn!("link {name}: no reply within budget");
                    Err(LinkError::Timeout)
                }
            }
        };
        shared.reply.disarm();
        shared.sent.store(false, Ordering::Relaxed);
        result
    }

    /// Installs `handler` as the single command handler, replacing any
    /// previous one.
    pub fn register_handler(&self, handler: HandlerFn) {
        *self.handler.lock() = Some(handler);
    }

    pub fn unregister_handler(&self) {
        *self.handler.lock() = None;
    }

    /// True when at least one command awaits the dispatch loop.
    pub fn pending(&self) -> bool {
        self.queue.pending()
    }

    /// Dequeues and handles one command. Returns whether there was one.
    pub fn process_one(&self) -> bool {
        match self.queue.dequeue() {
            Some(cmd) => {
                self.handle(&cmd);
                true
            }
            None => false,
        }
    }

    /// Drains the command queue, returning how many commands were handled.
    pub fn process_pending(&self) -> usize {
        let mut handled = 0;
        while self.process_one() {
            handled += 1;
        }
        handled
    }

    /// NEW_DATA interrupt entry point for logical index `int_idx`.
    ///
    /// Interrupt context. Inbound commands are queued, inbound replies
    /// published to their link's reply slot; both acknowledge the message
    /// to the sender as a side effect of draining the data registers.
    pub fn rcv_isr(&self, int_idx: u8) {
        self.mbox.rcv_isr(int_idx, |endpoint, hook| match hook.kind {
            HookKind::Command => self.take_command(endpoint, hook.token),
            HookKind::Reply => self.take_reply(endpoint, hook.token),
            HookKind::Ack => debug_assert!(false, "ACK hook fired on a receive event"),
        });
    }

    /// ACK interrupt entry point for logical index `int_idx`.
    pub fn ack_isr(&self, int_idx: u8) {
        self.mbox.ack_isr(int_idx, |_, hook| match hook.kind {
            HookKind::Ack => {
                debug!("link slot {}: send acknowledged", hook.token);
                self.shared[hook.token as usize].tx_acked.store(true, Ordering::Release);
            }
            _ => debug_assert!(false, "receive hook fired on an ACK event"),
        });
    }

    fn take_command(&self, endpoint: EndpointId, token: u32) {
        let mut cmd = Command { msg: [0; MSG_BYTES], link: LinkId::from_index(token as usize) };
        match self.mbox.read(endpoint, &mut cmd.msg) {
            Ok(_) => {
                if self.queue.enqueue(&cmd).is_err() {
                    warn!("link slot {token}: command dropped, queue full");
                }
            }
            Err(err) => warn!("link slot {token}: command read failed: {err}"),
        }
    }

    fn take_reply(&self, endpoint: EndpointId, token: u32) {
        let shared = &self.shared[token as usize];
        let want = shared.reply.expected().min(MSG_BYTES);
        let mut buf = [0u8; MSG_BYTES];
        // Reads always acknowledge, even when no reply is expected.
        match self.mbox.read(endpoint, &mut buf[..want]) {
            Ok(count) => shared.reply.publish(&buf[..count]),
            Err(err) => warn!("link slot {token}: reply read failed: {err}"),
        }
    }

    /// Bounded acknowledgement wait after a send.
    ///
    /// Polls [`Self::is_send_acked`] for [`ACK_RETRY_LIMIT`] attempts with
    /// a yield between each. Expiry logs and lets the caller continue; on
    /// a wired link the latched event stays put for its interrupt.
    fn wait_for_ack(&self, name: &str, link: LinkId) {
        for _ in 0..ACK_RETRY_LIMIT {
            if matches!(self.is_send_acked(link), Ok(true)) {
                return;
            }
            self.clock.yield_now();
        }
        if matches!(self.is_send_acked(link), Ok(true)) {
            return;
        }
        warn!("link {name}: no ACK within retry budget, continuing");
    }

    fn handle(&self, cmd: &Command) {
        let handler = *self.handler.lock();
        let Some(handler) = handler else {
            warn!("command dropped: no handler registered");
            return;
        };
        let mut reply = [0u8; REPLY_BYTES];
        let len = match handler(cmd, &mut reply) {
            Err(err) => {
                warn!("command failed: {err}");
                return;
            }
            Ok(0) => {
                warn!("command produced no reply");
                return;
            }
            Ok(len) => len,
        };
        assert!(len <= REPLY_BYTES, "handler reply exceeds its buffer");

        if let Err(err) = self.send(cmd.link, &reply[..len]) {
            warn!("link slot {}: reply send failed: {err}", cmd.link.index());
            return;
        }
        debug!("link slot {}: waiting for reply ACK", cmd.link.index());
        let acked = budget::poll_budgeted(&self.clock, REPLY_ACK_TIMEOUT, || {
            match self.is_send_acked(cmd.link) {
                Ok(false) => None,
                // A vanished link ends the wait as well.
                Ok(true) | Err(_) => Some(()),
            }
        });
        if acked.is_err() {
            warn!("link slot {}: reply not acknowledged in time", cmd.link.index());
        }
    }

    fn ensure_link(&self, link: LinkId) -> Result<(), LinkError> {
        self.links.lock().get(link.slot()).map(|_| ()).map_err(|_| LinkError::NoSuchLink)
    }

    /// Name and outgoing endpoint of a live link.
    fn outgoing(&self, link: LinkId) -> Result<(&'static str, EndpointId), LinkError> {
        let links = self.links.lock();
        let rec = links.get(link.slot()).map_err(|_| LinkError::NoSuchLink)?;
        let to = rec.to.ok_or(LinkError::NoSuchLink)?;
        Ok((rec.name, to))
    }
}
