// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]

//! CONTEXT: Hardware seams shared by the mailbox stack
//! OWNERS: @platform-ipc
//! STATUS: Functional
//! API_STABILITY: Internal (crate public, but intended for in-tree use)
//! TEST_COVERAGE: Unit tests (host)

/// Basic 32-bit bus access trait shared by peripheral drivers.
///
/// `read`/`write` addresses are byte offsets into the peripheral window.
pub trait Bus {
    fn read(&self, addr: usize) -> u32;
    fn write(&self, addr: usize, value: u32);
}

impl<T: Bus> Bus for &T {
    fn read(&self, addr: usize) -> u32 {
        (**self).read(addr)
    }

    fn write(&self, addr: usize, value: u32) {
        (**self).write(addr, value)
    }
}

/// Interrupt-controller seam.
///
/// The mailbox driver flips physical lines only on subscription refcount
/// edges (first subscriber enables, last subscriber disables). Routing a
/// raised line back into the driver's ISR entry points is the embedder's
/// job.
pub trait IrqControl {
    fn enable_line(&self, line: u32);
    fn disable_line(&self, line: u32);
}
