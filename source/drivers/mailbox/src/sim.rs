// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Register-accurate software model of one mailbox IP block
//! OWNERS: @platform-ipc
//! STATUS: Test-only (behind the `sim` feature)
//!
//! The model implements the write-to-set / write-to-clear event registers
//! and the ownership rule for CONFIG: a write lands only when the register
//! is empty, being zeroed, or rewritten with the identical value. Everything
//! else reads and writes like flat memory. Several `SimBus` handles may
//! share one block, which is how two processors see the same hardware.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use axon_hal::{Bus, IrqControl};

use crate::regs::{
    EventSet, DATA_WORDS, INSTANCES_PER_BLOCK, INSTANCE_STRIDE, REG_CONFIG, REG_DATA,
    REG_EVENT_CAUSE, REG_EVENT_STATUS, REG_INT_ENABLE,
};

#[derive(Clone, Copy, Default)]
struct Instance {
    config: u32,
    int_enable: u32,
    events: u32,
    data: [u32; DATA_WORDS],
}

struct BlockState {
    base: usize,
    instances: [Instance; INSTANCES_PER_BLOCK],
}

/// One simulated IP block, inspectable from tests.
#[derive(Clone)]
pub struct SimBlock {
    state: Rc<RefCell<BlockState>>,
}

impl SimBlock {
    pub fn new(base: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(BlockState {
                base,
                instances: [Instance::default(); INSTANCES_PER_BLOCK],
            })),
        }
    }

    /// Bus handle onto this block; clones share the block state.
    pub fn bus(&self) -> SimBus {
        SimBus { state: Rc::clone(&self.state) }
    }

    pub fn config(&self, instance: usize) -> u32 {
        self.state.borrow().instances[instance].config
    }

    pub fn int_enable(&self, instance: usize) -> u32 {
        self.state.borrow().instances[instance].int_enable
    }

    /// Raw pending-event bits of one instance.
    pub fn events(&self, instance: usize) -> u32 {
        self.state.borrow().instances[instance].events
    }

    pub fn data_word(&self, instance: usize, word: usize) -> u32 {
        self.state.borrow().instances[instance].data[word]
    }

    pub fn set_data_word(&self, instance: usize, word: usize, value: u32) {
        self.state.borrow_mut().instances[instance].data[word] = value;
    }

    /// Sets event bits as the hardware would on a peer's SET write.
    pub fn raise(&self, instance: usize, events: EventSet) {
        self.state.borrow_mut().instances[instance].events |= events.bits();
    }

    /// True when any instance has `events` pending with the matching
    /// INT_ENABLE bit set, i.e. when the block would assert that line.
    pub fn line_asserted(&self, cause: EventSet, enable_bit: u32) -> bool {
        let state = self.state.borrow();
        state.instances.iter().any(|instance| {
            instance.events & cause.bits() != 0 && instance.int_enable & enable_bit != 0
        })
    }
}

/// `Bus` implementation backed by a [`SimBlock`].
#[derive(Clone)]
pub struct SimBus {
    state: Rc<RefCell<BlockState>>,
}

impl Bus for SimBus {
    fn read(&self, addr: usize) -> u32 {
        let state = self.state.borrow();
        let offset = addr - state.base;
        let instance = &state.instances[offset / INSTANCE_STRIDE];
        match offset % INSTANCE_STRIDE {
            REG_CONFIG => instance.config,
            REG_EVENT_CAUSE | REG_EVENT_STATUS => instance.events,
            REG_INT_ENABLE => instance.int_enable,
            reg => instance.data[(reg - REG_DATA) / 4],
        }
    }

    fn write(&self, addr: usize, value: u32) {
        let mut state = self.state.borrow_mut();
        let offset = addr - state.base;
        let instance = &mut state.instances[offset / INSTANCE_STRIDE];
        match offset % INSTANCE_STRIDE {
            REG_CONFIG => {
                // The block grants ownership to the first writer.
                if instance.config == 0 || value == 0 || value == instance.config {
                    instance.config = value;
                }
            }
            REG_EVENT_CAUSE => instance.events &= !value,
            REG_EVENT_STATUS => instance.events |= value,
            REG_INT_ENABLE => instance.int_enable = value,
            reg => instance.data[(reg - REG_DATA) / 4] = value,
        }
    }
}

#[derive(Default)]
struct LineState {
    enabled: bool,
    enables: u32,
}

/// Interrupt controller stand-in that records line toggles.
#[derive(Clone, Default)]
pub struct SimIrq {
    lines: Rc<RefCell<BTreeMap<u32, LineState>>>,
}

impl SimIrq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self, line: u32) -> bool {
        self.lines.borrow().get(&line).map(|state| state.enabled).unwrap_or(false)
    }

    /// How many times `enable_line` ran for `line`, ever.
    pub fn enable_count(&self, line: u32) -> u32 {
        self.lines.borrow().get(&line).map(|state| state.enables).unwrap_or(0)
    }
}

impl IrqControl for SimIrq {
    fn enable_line(&self, line: u32) {
        let mut lines = self.lines.borrow_mut();
        let state = lines.entry(line).or_default();
        state.enabled = true;
        state.enables += 1;
    }

    fn disable_line(&self, line: u32) {
        let mut lines = self.lines.borrow_mut();
        lines.entry(line).or_default().enabled = false;
    }
}
