// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Branch gates.
//!
//! A branch gates one generator output for one consumer. Software flips an
//! enable bit (in the branch's own CBCR register or in a shared vote
//! register) and then waits for the halt status to confirm the gate
//! actually switched, since the consumer must not be touched before its
//! clock runs.
//!
//! Two status layouts exist. Older gates report a single halt bit.
//! Newer gates ([`GateModel::Fsm`]) have a CBCR with a clock-off flag, a
//! bus handshake state machine status, and a hardware-control bit:
//!
//! ```text
//! bit  0      CLK_ENABLE
//! bit  1      HW_CTL
//! bits 30:28  NOC_FSM_STATUS (0b010 = on)
//! bit  31     CLK_OFF
//! ```

use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::config::CONFIG;
use crate::errorcode::{ClockError, Direction};
use crate::hil::{ClockOps, ParentRates, RateRequest};
use crate::poll::PollStatus;
use crate::regmap::{bits, Regmap};

register_bitfields![u32,
    CBCR [
        CLK_ENABLE OFFSET(0) NUMBITS(1) [],
        HW_CTL OFFSET(1) NUMBITS(1) [],
        NOC_FSM_STATUS OFFSET(28) NUMBITS(3) [
            On = 2
        ],
        CLK_OFF OFFSET(31) NUMBITS(1) []
    ]
];

type CbcrVal = LocalRegisterCopy<u32, CBCR::Register>;

/// How the halt status is checked after toggling the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltCheck {
    /// Halt bit set means the gate is halted.
    PollUntilHalted,
    /// Halt bit set means the gate is running.
    EnableActiveHigh,
    /// Halt bit clear means the gate is running. Same as `PollUntilHalted`.
    EnableActiveLow,
    /// Status is not reported; wait a fixed settle time instead.
    DelayOnly,
    /// Do not wait at all.
    SkipCheck,
}

/// Layout of the halt status register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateModel {
    /// A single halt bit at `halt_bit`.
    Simple,
    /// CBCR with clock-off flag and handshake status.
    Fsm,
}

#[derive(Clone, Copy, Debug)]
pub struct BranchConfig {
    pub name: &'static str,
    /// Register holding the halt status.
    pub halt_reg: u32,
    /// Halt bit for [`GateModel::Simple`].
    pub halt_bit: u8,
    pub halt_check: HaltCheck,
    pub model: GateModel,
    /// The enable bit is a vote in a register shared with other masters.
    /// Disabling a voted gate does not stop it if another master still
    /// votes for it, so the disable is not polled.
    pub voted: bool,
    pub enable_reg: u32,
    pub enable_mask: u32,
    /// Writing the mask gates the clock off instead of on.
    pub enable_is_inverted: bool,
    /// Register and bit that, when set, hand gating to hardware.
    pub hwcg: Option<(u32, u8)>,
    /// Rate requests are forwarded to the parent.
    pub propagate_rate: bool,
}

impl BranchConfig {
    /// A gate controlled and reported through its own CBCR.
    pub const fn cbcr(name: &'static str, cbcr: u32) -> Self {
        Self {
            name,
            halt_reg: cbcr,
            halt_bit: 31,
            halt_check: HaltCheck::PollUntilHalted,
            model: GateModel::Fsm,
            voted: false,
            enable_reg: cbcr,
            enable_mask: 1 << 0,
            enable_is_inverted: false,
            hwcg: None,
            propagate_rate: false,
        }
    }

    /// A gate enabled by bit `vote_bit` of a shared vote register and
    /// reported through its CBCR.
    pub const fn voted(name: &'static str, cbcr: u32, vote_reg: u32, vote_bit: u8) -> Self {
        let mut config = Self::cbcr(name, cbcr);
        config.voted = true;
        config.enable_reg = vote_reg;
        config.enable_mask = 1 << vote_bit;
        config
    }

    pub const fn with_halt_check(mut self, check: HaltCheck) -> Self {
        self.halt_check = check;
        self
    }

    pub const fn with_hwcg(mut self, reg: u32, bit: u8) -> Self {
        self.hwcg = Some((reg, bit));
        self
    }

    pub const fn with_propagate_rate(mut self) -> Self {
        self.propagate_rate = true;
        self
    }
}

/// A branch gate.
pub struct Branch<'a> {
    regmap: Regmap<'a>,
    config: BranchConfig,
}

impl<'a> Branch<'a> {
    pub const fn new(regmap: Regmap<'a>, config: BranchConfig) -> Self {
        Self { regmap, config }
    }

    pub fn config(&self) -> &BranchConfig {
        &self.config
    }

    /// Whether the hardware clock gating override is engaged.
    fn in_hwcg_mode(&self) -> Result<bool, ClockError> {
        match self.config.hwcg {
            Some((reg, bit)) => Ok(self.regmap.read(reg)? & (1 << bit) != 0),
            None => Ok(false),
        }
    }

    /// Whether hardware currently controls the gate through CBCR.HW_CTL.
    fn in_hw_ctl_mode(&self) -> Result<bool, ClockError> {
        match self.config.model {
            GateModel::Fsm => {
                let cbcr = CbcrVal::new(self.regmap.read(self.config.halt_reg)?);
                Ok(cbcr.is_set(CBCR::HW_CTL))
            }
            GateModel::Simple => Ok(false),
        }
    }

    /// Whether a status register value shows the gate in the requested
    /// state.
    fn check_halt(&self, val: u32, enabling: bool) -> bool {
        match self.config.model {
            GateModel::Simple => {
                let mut set = val & (1 << self.config.halt_bit) != 0;
                if self.config.halt_check == HaltCheck::EnableActiveHigh {
                    set = !set;
                }
                set == !enabling
            }
            GateModel::Fsm => {
                let off = bits(CBCR::CLK_OFF::SET);
                let on = bits(CBCR::NOC_FSM_STATUS::On);
                let val = val & (off | bits(CBCR::NOC_FSM_STATUS.val(0x7)));
                if enabling {
                    val & off == 0 || val == on
                } else {
                    val & off != 0
                }
            }
        }
    }

    fn wait(&self, enabling: bool) -> Result<(), ClockError> {
        if self.config.halt_check == HaltCheck::SkipCheck || self.in_hwcg_mode()? {
            return Ok(());
        }
        if self.config.halt_check == HaltCheck::DelayOnly || (!enabling && self.config.voted) {
            self.regmap.delay_us(CONFIG.halt_settle_delay_us);
            return Ok(());
        }

        let status = self.regmap.poll_register(
            self.config.halt_reg,
            CONFIG.halt_poll_iterations,
            CONFIG.poll_interval_us,
            |val| self.check_halt(val, enabling),
        )?;
        match status {
            PollStatus::Done => Ok(()),
            PollStatus::TimedOut => {
                let direction = Direction::from_enable(enabling);
                warn!(
                    "{} status stuck at '{}'",
                    self.config.name,
                    direction.stuck_state()
                );
                Err(ClockError::HaltTimeout(direction))
            }
        }
    }

    /// Write the enable bit and wait for the gate to follow.
    ///
    /// A gate under hardware control is written but not waited for.
    pub fn toggle(&self, enable: bool) -> Result<(), ClockError> {
        let hw_ctl = self.in_hw_ctl_mode()?;

        let mask = self.config.enable_mask;
        let value = if enable != self.config.enable_is_inverted {
            mask
        } else {
            0
        };
        self.regmap.update_bits(self.config.enable_reg, mask, value)?;

        if hw_ctl {
            debug!("{}: under hardware control, not polling", self.config.name);
            return Ok(());
        }
        self.wait(enable)
    }

    /// Hand gating to hardware, or take it back.
    pub fn set_hw_ctl(&self, enable: bool) -> Result<(), ClockError> {
        if self.config.model != GateModel::Fsm {
            return Err(ClockError::NoSupport);
        }
        let hw_ctl = bits(CBCR::HW_CTL::SET);
        let value = if enable { hw_ctl } else { 0 };
        self.regmap.update_bits(self.config.halt_reg, hw_ctl, value)
    }

    /// Whether the enable bit is asserted.
    pub fn is_enabled(&self) -> Result<bool, ClockError> {
        let set = self.regmap.read(self.config.enable_reg)? & self.config.enable_mask != 0;
        Ok(set != self.config.enable_is_inverted)
    }
}

impl ClockOps for Branch<'_> {
    fn enable(&self) -> Result<(), ClockError> {
        self.toggle(true)
    }

    fn disable(&self) -> Result<(), ClockError> {
        self.toggle(false)
    }

    fn is_enabled(&self) -> Result<bool, ClockError> {
        Branch::is_enabled(self)
    }

    fn recalc_rate(&self, parent_rate: u64) -> Result<u64, ClockError> {
        Ok(parent_rate)
    }

    fn determine_rate(
        &self,
        req: &mut RateRequest,
        parents: &dyn ParentRates,
    ) -> Result<(), ClockError> {
        let parent_rate = if self.config.propagate_rate {
            parents.round_rate(0, req.rate)?
        } else {
            parents.rate(0)?
        };
        req.best_parent = Some(0);
        req.best_parent_rate = parent_rate;
        req.rate = parent_rate;
        Ok(())
    }

    fn set_rate(&self, _rate: u64, _parent_rate: u64) -> Result<(), ClockError> {
        Ok(())
    }

    fn propagates_rate(&self) -> bool {
        self.config.propagate_rate
    }

    fn name(&self) -> &'static str {
        self.config.name
    }
}
