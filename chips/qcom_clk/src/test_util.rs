// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Test doubles for the register port and delay source.

use core::cell::{Cell, RefCell};
use std::boxed::Box;
use std::collections::BTreeMap;
use std::vec::Vec;

use crate::errorcode::BusError;
use crate::poll::Delay;
use crate::regmap::RegisterPort;

/// Called after every write with the register file, offset and value.
pub(crate) type Hook = Box<dyn Fn(&mut BTreeMap<u32, u32>, u32, u32)>;

/// Pseudo register where [`rcg_hardware`] records the CFG value in effect
/// after each commit.
pub(crate) const RCG_LATCHED_CFG: u32 = 0xffff_0000;

const UPDATE: u32 = 1 << 0;
const ROOT_EN: u32 = 1 << 1;
const ROOT_OFF: u32 = 1 << 31;
const CLK_OFF: u32 = 1 << 31;

/// A register file backed by a map. Unwritten registers read as zero.
pub(crate) struct FakePort {
    regs: RefCell<BTreeMap<u32, u32>>,
    reads: RefCell<BTreeMap<u32, usize>>,
    writes: RefCell<Vec<(u32, u32)>>,
    fault: Cell<Option<u32>>,
    hook: Option<Hook>,
}

impl FakePort {
    pub(crate) fn new() -> Self {
        Self {
            regs: RefCell::new(BTreeMap::new()),
            reads: RefCell::new(BTreeMap::new()),
            writes: RefCell::new(Vec::new()),
            fault: Cell::new(None),
            hook: None,
        }
    }

    pub(crate) fn with_hook(hook: Hook) -> Self {
        Self {
            hook: Some(hook),
            ..Self::new()
        }
    }

    /// Set a register without logging a write or running the hook.
    pub(crate) fn preset(&self, offset: u32, value: u32) {
        self.regs.borrow_mut().insert(offset, value);
    }

    /// Peek at a register without counting a read.
    pub(crate) fn get(&self, offset: u32) -> u32 {
        self.regs.borrow().get(&offset).copied().unwrap_or(0)
    }

    pub(crate) fn reads(&self, offset: u32) -> usize {
        self.reads.borrow().get(&offset).copied().unwrap_or(0)
    }

    pub(crate) fn writes(&self) -> Vec<(u32, u32)> {
        self.writes.borrow().clone()
    }

    pub(crate) fn clear_log(&self) {
        self.writes.borrow_mut().clear();
        self.reads.borrow_mut().clear();
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<u32, u32> {
        self.regs.borrow().clone()
    }

    /// Make every access to `offset` fail with a bus fault.
    pub(crate) fn fail_at(&self, offset: u32) {
        self.fault.set(Some(offset));
    }

    fn check(&self, offset: u32) -> Result<(), BusError> {
        if self.fault.get() == Some(offset) {
            Err(BusError::Fault { offset })
        } else {
            Ok(())
        }
    }
}

impl RegisterPort for FakePort {
    fn read32(&self, offset: u32) -> Result<u32, BusError> {
        self.check(offset)?;
        *self.reads.borrow_mut().entry(offset).or_insert(0) += 1;
        Ok(self.get(offset))
    }

    fn write32(&self, offset: u32, value: u32) -> Result<(), BusError> {
        self.check(offset)?;
        self.writes.borrow_mut().push((offset, value));
        let mut regs = self.regs.borrow_mut();
        regs.insert(offset, value);
        if let Some(hook) = &self.hook {
            hook(&mut *regs, offset, value);
        }
        Ok(())
    }
}

/// Generator whose CMD register at `cmd` behaves like hardware: the update
/// bit clears immediately and latches CFG, and root-off follows the inverse
/// of root-enable.
pub(crate) fn rcg_hardware(cmd: u32) -> Hook {
    Box::new(move |regs, offset, value| {
        if offset != cmd {
            return;
        }
        let mut new = value;
        if value & UPDATE != 0 {
            new &= !UPDATE;
            let cfg = regs.get(&(cmd + 4)).copied().unwrap_or(0);
            regs.insert(RCG_LATCHED_CFG, cfg);
        }
        if value & ROOT_EN != 0 {
            new &= !ROOT_OFF;
        } else {
            new |= ROOT_OFF;
        }
        regs.insert(cmd, new);
    })
}

/// Gate whose clock-off flag in `halt_reg` follows the enable bits `mask`
/// of `enable_reg`. A fully-on gate reports FSM status `0b010`.
pub(crate) fn branch_hardware(enable_reg: u32, mask: u32, halt_reg: u32) -> Hook {
    Box::new(move |regs, offset, value| {
        if offset != enable_reg {
            return;
        }
        let halt = regs.get(&halt_reg).copied().unwrap_or(0) & !(CLK_OFF | (0x7 << 28));
        let halt = if value & mask != 0 {
            halt | (0x2 << 28)
        } else {
            halt | CLK_OFF
        };
        regs.insert(halt_reg, halt);
    })
}

/// A delay that returns immediately and counts how often it was asked to
/// wait.
pub(crate) struct CountingDelay {
    calls: Cell<u32>,
    total_us: Cell<u32>,
}

impl CountingDelay {
    pub(crate) fn new() -> Self {
        Self {
            calls: Cell::new(0),
            total_us: Cell::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.get()
    }

    pub(crate) fn total_us(&self) -> u32 {
        self.total_us.get()
    }
}

impl Delay for CountingDelay {
    fn delay_us(&self, us: u32) {
        self.calls.set(self.calls.get() + 1);
        self.total_us.set(self.total_us.get() + us);
    }
}
