// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Root clock generators (RCGs).
//!
//! An RCG is programmed through a small register block:
//!
//! ```text
//! cmd + 0x00          CMD   update, root-enable, dirty, root-off
//! cmd + delta + 0x04  CFG   pre-divider, source select, M/N mode
//! cmd + delta + 0x08  M
//! cmd + delta + 0x0c  N     stored as ~(n - m)
//! cmd + delta + 0x10  D     stored as ~2d
//! ```
//!
//! New values written to CFG/M/N/D have no effect until software sets the
//! update bit in CMD and the hardware clears it again ([`Rcg::commit`]).
//!
//! The output rate is `parent * 2 / (pre_div + 1)`, further multiplied by
//! `m / n` when the M/N stage is in dual-edge mode. Generators flagged as
//! needing a safe switch are additionally parked on the reference crystal
//! while disabled, see the `safe` module.

use core::cell::{Cell, OnceCell};

use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::config::CONFIG;
use crate::errorcode::ClockError;
use crate::freq_tbl::{find_rate, find_src_index, FreqEntry, RatePolicy, SourceMapEntry};
use crate::hil::{ClockOps, ParentRates, RateRequest};
use crate::poll::PollStatus;
use crate::regmap::{bits, Regmap};

mod dfs;
mod display;
mod safe;

pub use self::dfs::{DfsTable, MAX_PERF_LEVEL};

register_bitfields![u32,
    CMD [
        /// Latch CFG/M/N/D. Cleared by hardware once applied.
        UPDATE OFFSET(0) NUMBITS(1) [],
        /// Force the root on regardless of downstream votes.
        ROOT_EN OFFSET(1) NUMBITS(1) [],
        /// CFG holds values that have not been latched yet.
        DIRTY_CFG OFFSET(4) NUMBITS(1) [],
        ROOT_OFF OFFSET(31) NUMBITS(1) []
    ],
    CFG [
        SRC_SEL OFFSET(8) NUMBITS(3) [],
        MODE OFFSET(12) NUMBITS(2) [
            Bypass = 0,
            DualEdge = 2
        ],
        HW_CLK_CTRL OFFSET(20) NUMBITS(1) []
    ],
    DFS_CMD [
        DFS_EN OFFSET(0) NUMBITS(1) [],
        CURR_LEVEL OFFSET(1) NUMBITS(4) []
    ]
];

type CmdVal = LocalRegisterCopy<u32, CMD::Register>;
type CfgVal = LocalRegisterCopy<u32, CFG::Register>;

const CFG_REG: u32 = 0x4;
const M_REG: u32 = 0x8;
const N_REG: u32 = 0xc;
const D_REG: u32 = 0x10;

/// Mask covering the low `width` bits.
pub(crate) const fn field_mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// Output rate for a parent rate and raw divider fields.
pub fn calc_rate(parent_rate: u64, m: u32, n: u32, mode: u32, pre_div: u32) -> u64 {
    let mut rate = parent_rate;
    if pre_div != 0 {
        rate = rate.saturating_mul(2) / (u64::from(pre_div) + 1);
    }
    if mode != 0 && n != 0 {
        rate = rate.saturating_mul(u64::from(m)) / u64::from(n);
    }
    rate
}

/// N register encoding: the one's complement of `n - m`.
pub fn mnd_n_value(m: u32, n: u32, mask: u32) -> u32 {
    !n.wrapping_sub(m) & mask
}

/// D register encoding.
///
/// The duty cycle value is `n` clamped into `[m, 2 * (n - m)]`, applying the
/// lower bound first, and is stored inverted. With `m == n` the upper bound
/// is zero and the register ends up all ones.
pub fn mnd_d_value(m: u32, n: u32, mask: u32) -> u32 {
    let twice_n_minus_m = n.wrapping_sub(m).wrapping_mul(2);
    let d = n.max(m).min(twice_n_minus_m);
    !d & mask
}

/// Recover `n` from the M and N register values.
pub fn mnd_n_from_regs(m_reg: u32, n_reg: u32, mask: u32) -> u32 {
    (!n_reg & mask).wrapping_add(m_reg & mask)
}

/// Rate-selection behavior of a generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RcgKind {
    /// Frequency table lookup with the given tie-break.
    Standard(RatePolicy),
    /// DSI byte clock: integer divider from a parent that follows the rate.
    Byte,
    /// Byte clock that keeps whatever source is currently selected.
    Byte2,
    /// Pixel clock: M/N from a fixed list of fractions.
    Pixel,
    /// eDP pixel clock: M/N chosen by the link rate of the PHY PLL.
    EdpPixel,
    /// DisplayPort clock: M/N from a best rational approximation.
    Dp,
    /// Rates are read back from `levels` hardware performance levels.
    Dfs { levels: u8 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RcgFlags {
    /// Park on the reference while disabled and reprogram on enable.
    pub needs_safe_switch: bool,
    /// Keep the root-enable bit set after a safe-switch enable.
    pub force_enable_on_switch: bool,
    /// Hand gating of the root to hardware (CFG.HW_CLK_CTRL).
    pub hw_clk_ctrl: bool,
    /// Rate changes are first applied to the parent.
    pub propagate_to_parent: bool,
}

impl RcgFlags {
    pub const NONE: Self = Self {
        needs_safe_switch: false,
        force_enable_on_switch: false,
        hw_clk_ctrl: false,
        propagate_to_parent: false,
    };
}

/// Safe-switch state of a generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchState {
    /// Routed to the reference source.
    Parked,
    /// Inside an enable or disable sequence, or one failed midway.
    Transitioning,
    /// Routed to the source of the current frequency.
    Active,
}

/// Static description of one generator instance.
#[derive(Clone, Copy, Debug)]
pub struct RcgConfig<'a> {
    pub name: &'static str,
    /// Offset of the CMD register in the controller window.
    pub cmd_offset: u32,
    /// Extra distance between CMD and the CFG/M/N/D group.
    pub cfg_offset_delta: u32,
    /// Width of the M/N/D fields, zero if the generator has no M/N stage.
    pub mnd_width: u8,
    /// Width of the pre-divider field.
    pub hid_width: u8,
    /// Mux select of the reference source used for parking.
    pub safe_src_mux: u8,
    pub parent_map: &'a [SourceMapEntry],
    pub freq_table: &'a [FreqEntry],
    pub flags: RcgFlags,
    pub kind: RcgKind,
}

impl<'a> RcgConfig<'a> {
    pub const fn new(
        name: &'static str,
        cmd_offset: u32,
        hid_width: u8,
        mnd_width: u8,
        parent_map: &'a [SourceMapEntry],
        freq_table: &'a [FreqEntry],
    ) -> Self {
        Self {
            name,
            cmd_offset,
            cfg_offset_delta: 0,
            mnd_width,
            hid_width,
            safe_src_mux: 0,
            parent_map,
            freq_table,
            flags: RcgFlags::NONE,
            kind: RcgKind::Standard(RatePolicy::Ceil),
        }
    }

    pub const fn with_kind(mut self, kind: RcgKind) -> Self {
        self.kind = kind;
        self
    }

    pub const fn with_flags(mut self, flags: RcgFlags) -> Self {
        self.flags = flags;
        self
    }

    pub const fn with_safe_src(mut self, mux: u8) -> Self {
        self.safe_src_mux = mux;
        self
    }

    pub const fn with_cfg_offset_delta(mut self, delta: u32) -> Self {
        self.cfg_offset_delta = delta;
        self
    }
}

/// Resolved register values for one configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Setting {
    pub(crate) mux: u8,
    pub(crate) pre_div: u32,
    pub(crate) m: u32,
    pub(crate) n: u32,
}

/// A root clock generator.
pub struct Rcg<'a> {
    regmap: Regmap<'a>,
    config: RcgConfig<'a>,
    current_frequency: Cell<u64>,
    state: Cell<SwitchState>,
    dfs_table: OnceCell<DfsTable>,
}

impl<'a> Rcg<'a> {
    /// Check the static description and create the generator.
    ///
    /// Safe-switch generators start out parked with the reference as their
    /// pending frequency.
    pub fn new(regmap: Regmap<'a>, config: RcgConfig<'a>) -> Result<Self, ClockError> {
        if config.hid_width > 8 || config.mnd_width > 32 {
            return Err(ClockError::InvalidEntry);
        }
        let hid_mask = field_mask(config.hid_width);
        let mnd_mask = field_mask(config.mnd_width);
        for entry in config.freq_table {
            entry.validate()?;
            // Values wider than their field would be truncated on write.
            if entry.pre_divider > hid_mask
                || (entry.is_fractional() && (entry.frac_m > mnd_mask || entry.frac_n > mnd_mask))
            {
                return Err(ClockError::InvalidEntry);
            }
        }
        if config.flags.needs_safe_switch && !Self::supports_safe_switch(config.kind) {
            return Err(ClockError::InvalidEntry);
        }
        if let RcgKind::Dfs { levels } = config.kind {
            if levels == 0 || usize::from(levels) > MAX_PERF_LEVEL {
                return Err(ClockError::InvalidEntry);
            }
        }
        let current = if config.flags.needs_safe_switch {
            CONFIG.reference_frequency_hz
        } else {
            0
        };
        Ok(Self {
            regmap,
            config,
            current_frequency: Cell::new(current),
            state: Cell::new(SwitchState::Parked),
            dfs_table: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &RcgConfig<'a> {
        &self.config
    }

    pub fn switch_state(&self) -> SwitchState {
        self.state.get()
    }

    /// Last rate programmed or, while parked, the rate the next enable will
    /// program.
    pub fn current_frequency(&self) -> u64 {
        self.current_frequency.get()
    }

    fn cmd_reg(&self) -> u32 {
        self.config.cmd_offset
    }

    fn cfg_reg(&self, reg: u32) -> u32 {
        self.config.cmd_offset + self.config.cfg_offset_delta + reg
    }

    fn hid_mask(&self) -> u32 {
        field_mask(self.config.hid_width)
    }

    fn mnd_mask(&self) -> u32 {
        field_mask(self.config.mnd_width)
    }

    fn parked_while_disabled(&self) -> bool {
        self.config.flags.needs_safe_switch && self.state.get() != SwitchState::Active
    }

    /// Set the update bit and wait for the hardware to latch the new
    /// configuration.
    pub fn commit(&self) -> Result<(), ClockError> {
        let update = bits(CMD::UPDATE::SET);
        self.regmap.update_bits(self.cmd_reg(), update, update)?;

        let status = self.regmap.poll_register(
            self.cmd_reg(),
            CONFIG.commit_poll_iterations,
            CONFIG.poll_interval_us,
            |cmd| !CmdVal::new(cmd).is_set(CMD::UPDATE),
        )?;
        match status {
            PollStatus::Done => Ok(()),
            PollStatus::TimedOut => {
                warn!("{}: rcg didn't update its configuration", self.config.name);
                Err(ClockError::CommitTimeout)
            }
        }
    }

    /// Whether the root is running.
    pub fn is_enabled(&self) -> Result<bool, ClockError> {
        let cmd = CmdVal::new(self.regmap.read(self.cmd_reg())?);
        Ok(!cmd.is_set(CMD::ROOT_OFF))
    }

    /// Resolve a table entry into register values.
    pub(crate) fn setting_for(&self, entry: &FreqEntry) -> Result<Setting, ClockError> {
        let index = find_src_index(self.config.parent_map, entry.source_id)?;
        Ok(Setting {
            mux: self.config.parent_map[index].mux_select,
            pre_div: entry.pre_divider,
            m: entry.frac_m,
            n: entry.frac_n,
        })
    }

    /// CFG value for `setting`, starting from the current value `orig`.
    pub(crate) fn cfg_value(&self, orig: u32, setting: &Setting) -> u32 {
        let hid_mask = self.hid_mask();
        let mut cfg = CfgVal::new((orig & !hid_mask) | (setting.pre_div & hid_mask));
        cfg.modify(
            CFG::SRC_SEL.val(u32::from(setting.mux)) + CFG::MODE::Bypass + CFG::HW_CLK_CTRL::CLEAR,
        );
        if self.config.mnd_width != 0 && setting.n != 0 && setting.m != setting.n {
            cfg.modify(CFG::MODE::DualEdge);
        }
        if self.config.flags.hw_clk_ctrl {
            cfg.modify(CFG::HW_CLK_CTRL::SET);
        }
        cfg.get()
    }

    /// Write M/N/D and CFG for `setting` without committing.
    pub(crate) fn write_setting(&self, setting: &Setting) -> Result<(), ClockError> {
        if self.config.mnd_width != 0 && setting.n != 0 {
            let mask = self.mnd_mask();
            let n_val = mnd_n_value(setting.m, setting.n, mask);
            let d_val = mnd_d_value(setting.m, setting.n, mask);
            self.regmap.update_bits(self.cfg_reg(M_REG), mask, setting.m)?;
            self.regmap.update_bits(self.cfg_reg(N_REG), mask, n_val)?;
            self.regmap.update_bits(self.cfg_reg(D_REG), mask, d_val)?;
            if CONFIG.trace_rate_changes {
                trace!(
                    "{}: m {:#x} n {:#x} d {:#x}",
                    self.config.name,
                    setting.m,
                    n_val,
                    d_val
                );
            }
        }

        let orig = self.regmap.read(self.cfg_reg(CFG_REG))?;
        let cfg = self.cfg_value(orig, setting);
        if cfg != orig {
            self.regmap.write(self.cfg_reg(CFG_REG), cfg)?;
        }
        if CONFIG.trace_rate_changes {
            trace!("{}: cfg {:#x} -> {:#x}", self.config.name, orig, cfg);
        }
        Ok(())
    }

    pub(crate) fn apply(&self, setting: &Setting) -> Result<(), ClockError> {
        self.write_setting(setting)?;
        self.commit()
    }

    /// Program the generator for `entry` and commit.
    pub fn configure(&self, entry: &FreqEntry) -> Result<(), ClockError> {
        let setting = self.setting_for(entry)?;
        self.apply(&setting)
    }

    /// Rate derived from the live CFG/M/N registers.
    pub fn recalc_rate(&self, parent_rate: u64) -> Result<u64, ClockError> {
        if self.parked_while_disabled() {
            return Ok(self.current_frequency.get());
        }

        let cfg = CfgVal::new(self.regmap.read(self.cfg_reg(CFG_REG))?);
        let (m, n) = if self.config.mnd_width != 0 {
            let mask = self.mnd_mask();
            let m = self.regmap.read(self.cfg_reg(M_REG))? & mask;
            let n = mnd_n_from_regs(m, self.regmap.read(self.cfg_reg(N_REG))?, mask);
            (m, n)
        } else {
            (0, 0)
        };
        let mode = cfg.read(CFG::MODE);
        let pre_div = cfg.get() & self.hid_mask();
        Ok(calc_rate(parent_rate, m, n, mode, pre_div))
    }

    fn find_entry(&self, rate: u64, policy: RatePolicy) -> Result<&'a FreqEntry, ClockError> {
        find_rate(self.config.freq_table, rate, policy)
    }

    fn policy(&self) -> RatePolicy {
        match self.config.kind {
            RcgKind::Standard(policy) => policy,
            _ => RatePolicy::Ceil,
        }
    }

    /// Table-driven rate negotiation.
    fn determine_table_rate(
        &self,
        table: &[FreqEntry],
        req: &mut RateRequest,
        parents: &dyn ParentRates,
        policy: RatePolicy,
    ) -> Result<(), ClockError> {
        let entry = find_rate(table, req.rate, policy)?;
        let index = find_src_index(self.config.parent_map, entry.source_id)?;
        if index >= parents.num_parents() {
            return Err(ClockError::InvalidParent);
        }

        let parent_rate = if self.config.flags.propagate_to_parent {
            parents.round_rate(index, entry.parent_rate_for(req.rate))?
        } else {
            parents.rate(index)?
        };

        req.best_parent = Some(index);
        req.best_parent_rate = parent_rate;
        req.rate = entry.frequency;
        Ok(())
    }

    /// Program the table entry matching `rate`.
    ///
    /// A parked safe-switch generator only records the rate; the hardware is
    /// programmed on the next enable.
    fn set_table_rate(&self, rate: u64, policy: RatePolicy) -> Result<(), ClockError> {
        if self.parked_while_disabled() && rate == CONFIG.reference_frequency_hz {
            self.current_frequency.set(rate);
            return Ok(());
        }

        let entry = self.find_entry(rate, policy)?;
        if self.parked_while_disabled() {
            debug!("{}: deferring {} Hz until enabled", self.config.name, entry.frequency);
            self.current_frequency.set(entry.frequency);
            return Ok(());
        }

        self.configure(entry)?;
        self.current_frequency.set(entry.frequency);
        debug!("{}: set to {} Hz", self.config.name, entry.frequency);
        Ok(())
    }

    /// Index of the source currently selected in CFG.
    ///
    /// An encoding missing from the source map reads as parent 0.
    pub fn get_parent(&self) -> Result<usize, ClockError> {
        let cfg = CfgVal::new(self.regmap.read(self.cfg_reg(CFG_REG))?);
        let mux = cfg.read(CFG::SRC_SEL);
        match self
            .config
            .parent_map
            .iter()
            .position(|e| u32::from(e.mux_select) == mux)
        {
            Some(index) => Ok(index),
            None => {
                debug!("{}: unknown source select {}", self.config.name, mux);
                Ok(0)
            }
        }
    }

    /// Switch to parent `index` keeping the dividers, and commit.
    pub fn set_parent(&self, index: usize) -> Result<(), ClockError> {
        let entry = self
            .config
            .parent_map
            .get(index)
            .ok_or(ClockError::InvalidParent)?;
        let mask = bits(CFG::SRC_SEL.val(0x7));
        let value = bits(CFG::SRC_SEL.val(u32::from(entry.mux_select)));
        self.regmap.update_bits(self.cfg_reg(CFG_REG), mask, value)?;
        self.commit()
    }

    /// Mux select and pre-divider currently held in CFG.
    pub(crate) fn current_mux_and_div(&self) -> Result<(u8, u32), ClockError> {
        let cfg = CfgVal::new(self.regmap.read(self.cfg_reg(CFG_REG))?);
        Ok((cfg.read(CFG::SRC_SEL) as u8, cfg.get() & self.hid_mask()))
    }
}

impl ClockOps for Rcg<'_> {
    fn enable(&self) -> Result<(), ClockError> {
        self.safe_enable()
    }

    fn disable(&self) -> Result<(), ClockError> {
        self.safe_disable()
    }

    fn is_enabled(&self) -> Result<bool, ClockError> {
        Rcg::is_enabled(self)
    }

    fn recalc_rate(&self, parent_rate: u64) -> Result<u64, ClockError> {
        match self.config.kind {
            RcgKind::Dfs { .. } => self.dfs_recalc_rate(parent_rate),
            _ => Rcg::recalc_rate(self, parent_rate),
        }
    }

    fn determine_rate(
        &self,
        req: &mut RateRequest,
        parents: &dyn ParentRates,
    ) -> Result<(), ClockError> {
        match self.config.kind {
            RcgKind::Standard(policy) => {
                self.determine_table_rate(self.config.freq_table, req, parents, policy)
            }
            RcgKind::Byte | RcgKind::Byte2 => self.determine_byte_rate(req, parents),
            RcgKind::Pixel => self.determine_pixel_rate(req, parents),
            RcgKind::EdpPixel => self.determine_edp_rate(req, parents),
            RcgKind::Dp => self.determine_dp_rate(req, parents),
            RcgKind::Dfs { .. } => {
                let table = self.dfs_table(parents)?;
                self.determine_table_rate(table.as_slice(), req, parents, RatePolicy::Ceil)
            }
        }
    }

    fn set_rate(&self, rate: u64, parent_rate: u64) -> Result<(), ClockError> {
        match self.config.kind {
            RcgKind::Standard(_) => self.set_table_rate(rate, self.policy()),
            RcgKind::Byte => self.set_byte_rate(rate, parent_rate),
            RcgKind::Byte2 => self.set_byte2_rate(rate, parent_rate),
            RcgKind::Pixel => self.set_pixel_rate(rate, parent_rate),
            RcgKind::EdpPixel => self.set_edp_rate(rate, parent_rate),
            RcgKind::Dp => self.set_dp_rate(rate, parent_rate),
            // The level is selected by the DFS hardware, not by software.
            RcgKind::Dfs { .. } => Err(ClockError::NoSupport),
        }
    }

    fn get_parent(&self) -> Result<usize, ClockError> {
        Rcg::get_parent(self)
    }

    fn set_parent(&self, index: usize) -> Result<(), ClockError> {
        Rcg::set_parent(self, index)
    }

    fn propagates_rate(&self) -> bool {
        self.config.flags.propagate_to_parent
    }

    fn name(&self) -> &'static str {
        self.config.name
    }
}
