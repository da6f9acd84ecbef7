// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Safe-switch enable and disable.
//!
//! Some generators feed blocks that cannot tolerate their source going away,
//! or are turned on behind software's back when a power domain comes up.
//! Those are parked on the always-on reference while disabled. Disabling
//! saves CFG, routes the root to the reference with a divide-by-one,
//! commits, and then writes the saved CFG back *without* committing: the
//! root keeps running from the reference while CFG already holds the
//! configuration the next enable latches.
//!
//! Both sequences run with root-enable forced so the update handshake
//! completes even when no downstream gate votes for the root.

use super::{CmdVal, Rcg, RcgKind, Setting, SwitchState, CFG_REG, CMD};
use crate::config::CONFIG;
use crate::errorcode::ClockError;
use crate::poll::PollStatus;
use crate::regmap::bits;

impl Rcg<'_> {
    /// Assert root-enable and wait until the root reports on.
    pub fn force_enable(&self) -> Result<(), ClockError> {
        let root_en = bits(CMD::ROOT_EN::SET);
        self.regmap.update_bits(self.cmd_reg(), root_en, root_en)?;

        let status = self.regmap.poll_register(
            self.cmd_reg(),
            CONFIG.force_enable_poll_iterations,
            CONFIG.poll_interval_us,
            |cmd| !CmdVal::new(cmd).is_set(CMD::ROOT_OFF),
        )?;
        match status {
            PollStatus::Done => Ok(()),
            PollStatus::TimedOut => {
                error!("{}: rcg didn't turn on", self.config.name);
                Err(ClockError::StuckEnabled)
            }
        }
    }

    /// Release root-enable.
    pub fn clear_force_enable(&self) -> Result<(), ClockError> {
        let root_en = bits(CMD::ROOT_EN::SET);
        self.regmap.update_bits(self.cmd_reg(), root_en, 0)
    }

    /// Reference source, divide by one, no M/N.
    fn reference_setting(&self) -> Setting {
        Setting {
            mux: self.config.safe_src_mux,
            pre_div: 1,
            m: 0,
            n: 0,
        }
    }

    /// Setting that produces the pending `current_frequency`.
    ///
    /// The reference rate maps to the reference source directly, it need not
    /// be tabulated.
    fn pending_setting(&self) -> Result<Setting, ClockError> {
        let rate = self.current_frequency.get();
        if rate == CONFIG.reference_frequency_hz {
            return Ok(self.reference_setting());
        }
        let entry = self.find_entry(rate, self.policy())?;
        self.setting_for(entry)
    }

    pub(super) fn safe_enable(&self) -> Result<(), ClockError> {
        if !self.config.flags.needs_safe_switch {
            // Latch anything left pending in CFG by earlier firmware.
            let cmd = CmdVal::new(self.regmap.read(self.cmd_reg())?);
            if cmd.is_set(CMD::DIRTY_CFG) {
                self.commit()?;
            }
            self.state.set(SwitchState::Active);
            return Ok(());
        }

        let setting = self.pending_setting()?;
        self.state.set(SwitchState::Transitioning);
        self.force_enable()?;
        self.apply(&setting)?;
        if !self.config.flags.force_enable_on_switch {
            self.clear_force_enable()?;
        }
        self.state.set(SwitchState::Active);
        debug!(
            "{}: enabled at {} Hz",
            self.config.name,
            self.current_frequency.get()
        );
        Ok(())
    }

    pub(super) fn safe_disable(&self) -> Result<(), ClockError> {
        if !self.config.flags.needs_safe_switch {
            self.state.set(SwitchState::Parked);
            return Ok(());
        }

        self.state.set(SwitchState::Transitioning);
        match self.force_enable() {
            // Already logged; parking is still attempted.
            Ok(()) | Err(ClockError::StuckEnabled) => {}
            Err(err) => return Err(err),
        }

        let cfg_reg = self.cfg_reg(CFG_REG);
        let saved = self.regmap.read(cfg_reg)?;
        let parked = self.cfg_value(saved, &self.reference_setting());
        self.regmap.write(cfg_reg, parked)?;
        let committed = self.commit();
        self.clear_force_enable()?;
        self.regmap.write(cfg_reg, saved)?;
        committed?;

        self.state.set(SwitchState::Parked);
        debug!("{}: parked", self.config.name);
        Ok(())
    }

    /// Whether this kind of generator can use the safe-switch sequence.
    pub(super) fn supports_safe_switch(kind: RcgKind) -> bool {
        matches!(kind, RcgKind::Standard(_))
    }
}
