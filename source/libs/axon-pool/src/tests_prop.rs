// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for the slot pool
//! OWNERS: @platform-ipc
//! NOTE: Tests only; no pool logic. Ensures occupancy accounting and
//! first-free allocation are sound under arbitrary allocate/free orders.
//!
//! TEST_SCOPE:
//!   - live count always equals allocations minus frees
//!   - allocation never hands out a handle that is still live
//!   - the lowest free slot is always chosen

use super::{Pool, PoolError, SlotId};
use proptest::prelude::*;

#[derive(Clone, Copy, Debug)]
enum Op {
    Allocate(u32),
    Free(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![any::<u32>().prop_map(Op::Allocate), (0usize..8).prop_map(Op::Free)]
}

proptest! {
    #[test]
    fn occupancy_tracks_mutations(ops in proptest::collection::vec(arb_op(), 0..64)) {
        let mut pool: Pool<u32, 8> = Pool::new();
        let mut live = 0usize;
        for op in ops {
            match op {
                Op::Allocate(v) => match pool.allocate(v) {
                    Ok(_) => live += 1,
                    Err(PoolError::Exhausted) => prop_assert_eq!(live, 8),
                    Err(e) => prop_assert!(false, "unexpected error {:?}", e),
                },
                Op::Free(index) => {
                    if pool.free(SlotId::from_index(index)).is_ok() {
                        live -= 1;
                    }
                }
            }
            prop_assert_eq!(pool.len(), live);
            prop_assert_eq!(pool.iter().count(), live);
        }
    }

    #[test]
    fn allocate_never_aliases_a_live_slot(values in proptest::collection::vec(any::<u32>(), 1..8)) {
        let mut pool: Pool<u32, 8> = Pool::new();
        let mut handles = Vec::new();
        for v in values {
            let id = pool.allocate(v).unwrap();
            prop_assert!(!handles.contains(&id));
            handles.push(id);
        }
    }

    #[test]
    fn lowest_free_slot_wins(hole in 0usize..4) {
        let mut pool: Pool<u32, 4> = Pool::new();
        for v in 0..4 {
            pool.allocate(v).unwrap();
        }
        pool.free(SlotId::from_index(hole)).unwrap();
        prop_assert_eq!(pool.allocate(99), Ok(SlotId::from_index(hole)));
    }
}
