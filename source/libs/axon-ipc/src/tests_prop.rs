// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for the command ring and reply slot
//! OWNERS: @platform-ipc
//! NOTE: Tests only. Checks the ring against a sequential model and the
//! reply slot against plain byte copies.
//!
//! TEST_SCOPE:
//!   - Ring agrees with a FIFO model under arbitrary enqueue/dequeue mixes
//!   - Occupancy never exceeds capacity minus one
//!   - Reply slot round-trips arbitrary payloads
//!
//! TEST_SCENARIOS:
//!   - ring_matches_fifo_model(): every accept/reject and every dequeued
//!     tag matches a VecDeque capped at capacity minus one
//!   - ring_occupancy_stays_bounded(): live count within [0, N-1] after
//!     every operation
//!   - reply_slot_round_trips(): publish then copy returns the same bytes

use std::collections::VecDeque;

use proptest::prelude::*;

use crate::command::{test_command, Command, CommandQueue, CMD_QUEUE_DEPTH, MSG_BYTES};
use crate::link::{LinkId, ReplySlot};

#[derive(Clone, Copy, Debug)]
enum Op {
    Enqueue(u8),
    Dequeue,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![any::<u8>().prop_map(Op::Enqueue), Just(Op::Dequeue)]
}

proptest! {
    #[test]
    fn ring_matches_fifo_model(ops in proptest::collection::vec(arb_op(), 0..64)) {
        let queue = CommandQueue::<CMD_QUEUE_DEPTH>::new();
        let mut model: VecDeque<u8> = VecDeque::new();
        for op in ops {
            match op {
                Op::Enqueue(tag) => {
                    let accepted = queue.enqueue(&test_command(tag)).is_ok();
                    prop_assert_eq!(accepted, model.len() < CMD_QUEUE_DEPTH - 1);
                    if accepted {
                        model.push_back(tag);
                    }
                }
                Op::Dequeue => {
                    let got = queue.dequeue().map(|cmd| cmd.msg[0]);
                    prop_assert_eq!(got, model.pop_front());
                }
            }
        }
        // Drain whatever is left in lockstep.
        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(queue.dequeue().map(|cmd| cmd.msg[0]), Some(expected));
        }
        prop_assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn ring_occupancy_stays_bounded(ops in proptest::collection::vec(arb_op(), 0..64)) {
        let queue = CommandQueue::<CMD_QUEUE_DEPTH>::new();
        let mut live = 0usize;
        for op in ops {
            match op {
                Op::Enqueue(tag) => {
                    if queue.enqueue(&test_command(tag)).is_ok() {
                        live += 1;
                    }
                }
                Op::Dequeue => {
                    if queue.dequeue().is_some() {
                        live -= 1;
                    }
                }
            }
            prop_assert!(live <= CMD_QUEUE_DEPTH - 1);
            prop_assert_eq!(queue.pending(), live > 0);
        }
    }

    #[test]
    fn ring_preserves_whole_payloads(payload in proptest::collection::vec(any::<u8>(), MSG_BYTES), slot in 0usize..8) {
        let queue = CommandQueue::<CMD_QUEUE_DEPTH>::new();
        let mut msg = [0u8; MSG_BYTES];
        msg.copy_from_slice(&payload);
        let sent = Command { msg, link: LinkId::from_index(slot) };
        queue.enqueue(&sent).unwrap();
        prop_assert_eq!(queue.dequeue(), Some(sent));
    }

    #[test]
    fn reply_slot_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..=MSG_BYTES)) {
        let slot = ReplySlot::new();
        slot.arm(bytes.len());
        slot.publish(&bytes);
        if bytes.is_empty() {
            prop_assert_eq!(slot.poll_len(), None);
        } else {
            prop_assert_eq!(slot.poll_len(), Some(bytes.len()));
        }
        let mut out = [0u8; MSG_BYTES];
        let count = slot.copy_to(&mut out);
        prop_assert_eq!(count, bytes.len());
        prop_assert_eq!(&out[..count], &bytes[..]);
    }
}
