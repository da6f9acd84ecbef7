// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Display generators.
//!
//! Byte, pixel and DisplayPort clocks are sourced from PHY PLLs whose rate
//! follows the panel or the link, so they cannot use a fixed frequency
//! table. Byte clocks derive an integer divider from whatever the PLL can
//! do. Pixel and eDP clocks pick an M/N fraction from a short list of known
//! ratios, and DP clocks compute one by rational approximation.

use super::{calc_rate, Rcg, RcgKind, Setting};
use crate::errorcode::ClockError;
use crate::freq_tbl::{
    find_frac, find_src_index, rational_best_approximation, FracEntry, FRAC_TABLE_675M,
    FRAC_TABLE_810M, PIXEL_FRAC_TABLE,
};
use crate::hil::{ParentRates, RateRequest};

/// Link PLL rate that selects the 810 MHz eDP table.
const EDP_LINK_810M: u64 = 810_000_000;

fn edp_table(parent_rate: u64) -> &'static [FracEntry] {
    if parent_rate == EDP_LINK_810M {
        &FRAC_TABLE_810M
    } else {
        &FRAC_TABLE_675M
    }
}

impl Rcg<'_> {
    /// Parent named by the first table entry. Display generators use the
    /// table only to pin their source.
    fn table_parent(&self) -> Result<usize, ClockError> {
        let first = self
            .config
            .freq_table
            .first()
            .ok_or(ClockError::NoMatchingFrequency)?;
        find_src_index(self.config.parent_map, first.source_id)
    }

    /// Smallest divider field not overshooting `rate`, clamped to the field.
    fn byte_divider(&self, parent_rate: u64, rate: u64) -> u32 {
        let div = parent_rate.saturating_mul(2).div_ceil(rate).saturating_sub(1);
        div.min(u64::from(self.hid_mask())) as u32
    }

    pub(super) fn determine_byte_rate(
        &self,
        req: &mut RateRequest,
        parents: &dyn ParentRates,
    ) -> Result<(), ClockError> {
        if req.rate == 0 {
            return Err(ClockError::InvalidRate);
        }
        // Byte programs the table source on set_rate, Byte2 keeps the mux.
        let index = match self.config.kind {
            RcgKind::Byte2 => self.get_parent()?,
            _ => self.table_parent()?,
        };
        let parent_rate = parents.round_rate(index, req.rate)?;
        let div = self.byte_divider(parent_rate, req.rate);

        req.best_parent = Some(index);
        req.best_parent_rate = parent_rate;
        req.rate = calc_rate(parent_rate, 0, 0, 0, div);
        Ok(())
    }

    /// Byte clock: source and M/N from the first table entry.
    pub(super) fn set_byte_rate(&self, rate: u64, parent_rate: u64) -> Result<(), ClockError> {
        if rate == 0 {
            return Err(ClockError::InvalidRate);
        }
        let first = self
            .config
            .freq_table
            .first()
            .ok_or(ClockError::NoMatchingFrequency)?;
        let mut setting = self.setting_for(first)?;
        setting.pre_div = self.byte_divider(parent_rate, rate);
        self.apply(&setting)
    }

    /// Byte clock that stays on the currently selected source.
    pub(super) fn set_byte2_rate(&self, rate: u64, parent_rate: u64) -> Result<(), ClockError> {
        if rate == 0 {
            return Err(ClockError::InvalidRate);
        }
        let (mux, _) = self.current_mux_and_div()?;
        self.apply(&Setting {
            mux,
            pre_div: self.byte_divider(parent_rate, rate),
            m: 0,
            n: 0,
        })
    }

    pub(super) fn determine_pixel_rate(
        &self,
        req: &mut RateRequest,
        parents: &dyn ParentRates,
    ) -> Result<(), ClockError> {
        let index = self.table_parent()?;
        let (frac, parent_rate) = find_frac(&PIXEL_FRAC_TABLE, req.rate, |rate| {
            parents.round_rate(index, rate)
        })?;

        req.best_parent = Some(index);
        req.best_parent_rate = parent_rate;
        req.rate = parent_rate.saturating_mul(u64::from(frac.num)) / u64::from(frac.den);
        Ok(())
    }

    pub(super) fn set_pixel_rate(&self, rate: u64, parent_rate: u64) -> Result<(), ClockError> {
        let (frac, _) = find_frac(&PIXEL_FRAC_TABLE, rate, |_| Ok(parent_rate))?;
        self.apply_fraction(frac)
    }

    pub(super) fn determine_edp_rate(
        &self,
        req: &mut RateRequest,
        parents: &dyn ParentRates,
    ) -> Result<(), ClockError> {
        let index = self.table_parent()?;
        let parent_rate = parents.rate(index)?;
        let (frac, _) = find_frac(edp_table(parent_rate), req.rate, |_| Ok(parent_rate))?;
        let (_, pre_div) = self.current_mux_and_div()?;

        req.best_parent = Some(index);
        req.best_parent_rate = parent_rate;
        req.rate = calc_rate(parent_rate, frac.num, frac.den, 1, pre_div);
        Ok(())
    }

    pub(super) fn set_edp_rate(&self, rate: u64, parent_rate: u64) -> Result<(), ClockError> {
        let (frac, _) = find_frac(edp_table(parent_rate), rate, |_| Ok(parent_rate))?;
        self.apply_fraction(frac)
    }

    /// Program `frac` as M/N keeping the current source and pre-divider.
    fn apply_fraction(&self, frac: FracEntry) -> Result<(), ClockError> {
        let (mux, pre_div) = self.current_mux_and_div()?;
        self.apply(&Setting {
            mux,
            pre_div,
            m: frac.num,
            n: frac.den,
        })
    }

    /// `(m, n)` such that `parent_rate * m / n` best approximates `rate`
    /// within the M/N field width.
    fn dp_fraction(&self, parent_rate: u64, rate: u64) -> Result<(u32, u32), ClockError> {
        if rate == 0 {
            return Err(ClockError::InvalidRate);
        }
        let mask = u64::from(self.mnd_mask());
        let (den, num) = rational_best_approximation(parent_rate, rate, mask, mask);
        if num == 0 || den == 0 {
            return Err(ClockError::InvalidRate);
        }
        Ok((num as u32, den as u32))
    }

    pub(super) fn determine_dp_rate(
        &self,
        req: &mut RateRequest,
        parents: &dyn ParentRates,
    ) -> Result<(), ClockError> {
        let index = self.get_parent()?;
        let parent_rate = parents.rate(index)?;
        let (m, n) = self.dp_fraction(parent_rate, req.rate)?;

        req.best_parent = Some(index);
        req.best_parent_rate = parent_rate;
        req.rate = calc_rate(parent_rate, m, n, 1, 0);
        Ok(())
    }

    pub(super) fn set_dp_rate(&self, rate: u64, parent_rate: u64) -> Result<(), ClockError> {
        let (m, n) = self.dp_fraction(parent_rate, rate)?;
        let (mux, pre_div) = self.current_mux_and_div()?;
        // A 1:1 ratio runs in bypass.
        let (m, n) = if m == n { (0, 0) } else { (m, n) };
        self.apply(&Setting { mux, pre_div, m, n })
    }
}
