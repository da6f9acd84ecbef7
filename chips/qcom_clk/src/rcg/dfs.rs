// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Dynamic frequency scaling (DFS) support.
//!
//! With DFS enabled the generator is switched between up to eight
//! performance levels by hardware. Each level has its own CFG, M and N
//! register in a bank next to CMD, and software only reads them back. The
//! frequency table is rebuilt from that bank the first time a rate is
//! negotiated, since the parent rates are not known earlier, and is kept for
//! the lifetime of the generator.

use tock_registers::LocalRegisterCopy;

use super::{calc_rate, mnd_n_from_regs, CfgVal, Rcg, RcgKind, CFG, DFS_CMD};
use crate::errorcode::ClockError;
use crate::freq_tbl::{FreqEntry, SourceId};
use crate::hil::ParentRates;

/// Number of performance levels in the register bank.
pub const MAX_PERF_LEVEL: usize = 8;

const DFS_CMD_REG: u32 = 0x14;

const fn perf_reg(level: usize) -> u32 {
    0x1c + 4 * level as u32
}

const fn perf_m_reg(level: usize) -> u32 {
    0x5c + 4 * level as u32
}

const fn perf_n_reg(level: usize) -> u32 {
    0x9c + 4 * level as u32
}

/// Frequency table read back from the level bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DfsTable {
    entries: [FreqEntry; MAX_PERF_LEVEL],
    len: usize,
}

impl DfsTable {
    const EMPTY: FreqEntry = FreqEntry::new(0, SourceId(0), 0, 0, 0);

    pub fn as_slice(&self) -> &[FreqEntry] {
        &self.entries[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Divider fields of one performance level.
struct Level {
    mux: u32,
    pre_div: u32,
    mode: u32,
    m: u32,
    n: u32,
}

impl Rcg<'_> {
    /// Whether hardware is selecting performance levels.
    pub fn dfs_enabled(&self) -> Result<bool, ClockError> {
        let cmd = LocalRegisterCopy::<u32, DFS_CMD::Register>::new(
            self.regmap.read(self.cmd_reg() + DFS_CMD_REG)?,
        );
        Ok(cmd.is_set(DFS_CMD::DFS_EN))
    }

    /// Level currently selected by hardware.
    pub fn dfs_current_level(&self) -> Result<usize, ClockError> {
        let cmd = LocalRegisterCopy::<u32, DFS_CMD::Register>::new(
            self.regmap.read(self.cmd_reg() + DFS_CMD_REG)?,
        );
        Ok(cmd.read(DFS_CMD::CURR_LEVEL) as usize)
    }

    fn read_level(&self, level: usize) -> Result<Level, ClockError> {
        let cfg = CfgVal::new(self.regmap.read(self.cmd_reg() + perf_reg(level))?);
        // A zero divider field in the bank means divide by one.
        let pre_div = match cfg.get() & self.hid_mask() {
            0 => 1,
            div => div,
        };
        let mode = cfg.read(CFG::MODE);
        let (m, n) = if mode != 0 {
            let mask = self.mnd_mask();
            let m = self.regmap.read(self.cmd_reg() + perf_m_reg(level))? & mask;
            let n = self.regmap.read(self.cmd_reg() + perf_n_reg(level))?;
            (m, mnd_n_from_regs(m, n, mask))
        } else {
            (0, 0)
        };
        Ok(Level {
            mux: cfg.read(CFG::SRC_SEL),
            pre_div,
            mode,
            m,
            n,
        })
    }

    fn populate_level(
        &self,
        level: usize,
        parents: &dyn ParentRates,
    ) -> Result<FreqEntry, ClockError> {
        let fields = self.read_level(level)?;
        let index = self
            .config
            .parent_map
            .iter()
            .position(|e| u32::from(e.mux_select) == fields.mux)
            .ok_or_else(|| {
                warn!(
                    "{}: perf level {} selects unmapped source {}",
                    self.config.name,
                    level,
                    fields.mux
                );
                ClockError::InvalidEntry
            })?;
        let parent_rate = parents.rate(index)?;
        let frequency = calc_rate(parent_rate, fields.m, fields.n, fields.mode, fields.pre_div);
        Ok(FreqEntry::new(
            frequency,
            self.config.parent_map[index].source_id,
            fields.pre_div,
            fields.m,
            fields.n,
        ))
    }

    /// Number of levels the generator was described with.
    fn dfs_levels(&self) -> Result<usize, ClockError> {
        match self.config.kind {
            RcgKind::Dfs { levels } => Ok(usize::from(levels)),
            _ => Err(ClockError::NoSupport),
        }
    }

    /// Read every configured level back into a frequency table.
    pub fn populate_dfs_table(&self, parents: &dyn ParentRates) -> Result<DfsTable, ClockError> {
        let levels = self.dfs_levels()?;
        let mut table = DfsTable {
            entries: [DfsTable::EMPTY; MAX_PERF_LEVEL],
            len: levels,
        };
        for (level, entry) in table.entries.iter_mut().take(levels).enumerate() {
            *entry = self.populate_level(level, parents)?;
        }
        debug!("{}: read {} perf levels", self.config.name, levels);
        Ok(table)
    }

    /// The cached table, if a rate has been negotiated already.
    pub fn cached_dfs_table(&self) -> Option<&DfsTable> {
        self.dfs_table.get()
    }

    pub(super) fn dfs_table(&self, parents: &dyn ParentRates) -> Result<&DfsTable, ClockError> {
        if let Some(table) = self.dfs_table.get() {
            return Ok(table);
        }
        let table = self.populate_dfs_table(parents)?;
        Ok(self.dfs_table.get_or_init(|| table))
    }

    /// Rate of the level hardware currently runs at.
    ///
    /// Before the table exists `parent_rate` is assumed to be the rate of
    /// the level's source.
    pub(super) fn dfs_recalc_rate(&self, parent_rate: u64) -> Result<u64, ClockError> {
        let level = self.dfs_current_level()?;
        if level >= self.dfs_levels()? {
            warn!("{}: hardware reports perf level {}", self.config.name, level);
            return Err(ClockError::InvalidEntry);
        }
        if let Some(entry) = self
            .dfs_table
            .get()
            .and_then(|table| table.as_slice().get(level))
        {
            return Ok(entry.frequency);
        }
        let fields = self.read_level(level)?;
        Ok(calc_rate(
            parent_rate,
            fields.m,
            fields.n,
            fields.mode,
            fields.pre_div,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Parents, PARENT_MAP};
    use super::super::{mnd_n_value, Rcg, RcgConfig, RcgKind};
    use super::{perf_m_reg, perf_n_reg, perf_reg, DFS_CMD_REG};
    use crate::errorcode::ClockError;
    use crate::hil::{ClockOps, RateRequest};
    use crate::regmap::Regmap;
    use crate::test_util::{CountingDelay, FakePort};

    const CMD: u32 = 0x3000;

    fn dfs_config(levels: u8) -> RcgConfig<'static> {
        RcgConfig::new("dfs_rcg", CMD, 5, 16, &PARENT_MAP, &[]).with_kind(RcgKind::Dfs { levels })
    }

    fn program_levels(port: &FakePort) {
        // XO / 1
        port.preset(CMD + perf_reg(0), 0x001);
        // GPLL0_EVEN / 6 = 50 MHz
        port.preset(CMD + perf_reg(1), 0x60b);
        // GPLL0 / 6 = 100 MHz
        port.preset(CMD + perf_reg(2), 0x10b);
        // GPLL0_EVEN * 384 / 15625, dual-edge
        port.preset(CMD + perf_reg(3), 0x2600);
        port.preset(CMD + perf_m_reg(3), 384);
        port.preset(CMD + perf_n_reg(3), mnd_n_value(384, 15_625, 0xffff));
    }

    #[test]
    fn populates_table_from_level_bank() {
        let port = FakePort::new();
        program_levels(&port);
        let delay = CountingDelay::new();
        let rcg = Rcg::new(Regmap::new(&port, &delay), dfs_config(4)).unwrap();

        let table = rcg.populate_dfs_table(&Parents).unwrap();
        let rates: std::vec::Vec<u64> = table.as_slice().iter().map(|f| f.frequency).collect();
        assert_eq!(std::vec![19_200_000, 50_000_000, 100_000_000, 7_372_800], rates);
        // A zero divider field reads back as divide by one.
        assert_eq!(1, table.as_slice()[3].pre_divider);
        assert_eq!(15_625, table.as_slice()[3].frac_n);
    }

    #[test]
    fn table_is_built_once() {
        let port = FakePort::new();
        program_levels(&port);
        let delay = CountingDelay::new();
        let rcg = Rcg::new(Regmap::new(&port, &delay), dfs_config(4)).unwrap();
        assert!(rcg.cached_dfs_table().is_none());

        let mut req = RateRequest::new(60_000_000);
        rcg.determine_rate(&mut req, &Parents).unwrap();
        assert_eq!(100_000_000, req.rate);
        assert_eq!(Some(1), req.best_parent);

        // Later changes to the bank are not picked up.
        port.preset(CMD + perf_reg(2), 0x60b);
        let mut req = RateRequest::new(60_000_000);
        rcg.determine_rate(&mut req, &Parents).unwrap();
        assert_eq!(100_000_000, req.rate);
        assert_eq!(1, port.reads(CMD + perf_reg(2)));
    }

    #[test]
    fn recalc_uses_current_level() {
        let port = FakePort::new();
        program_levels(&port);
        port.preset(CMD + DFS_CMD_REG, (2 << 1) | 1);
        let delay = CountingDelay::new();
        let rcg = Rcg::new(Regmap::new(&port, &delay), dfs_config(4)).unwrap();

        assert_eq!(Ok(true), rcg.dfs_enabled());
        assert_eq!(Ok(2), rcg.dfs_current_level());
        // Without a table the given parent rate is used.
        assert_eq!(Ok(50_000_000), ClockOps::recalc_rate(&rcg, 300_000_000));

        let mut req = RateRequest::new(1);
        rcg.determine_rate(&mut req, &Parents).unwrap();
        assert_eq!(Ok(100_000_000), ClockOps::recalc_rate(&rcg, 300_000_000));
    }

    #[test]
    fn recalc_rejects_levels_beyond_the_bank() {
        let port = FakePort::new();
        program_levels(&port);
        let delay = CountingDelay::new();
        let rcg = Rcg::new(Regmap::new(&port, &delay), dfs_config(4)).unwrap();

        // Level 9 would land past the eight level registers.
        port.preset(CMD + DFS_CMD_REG, (9 << 1) | 1);
        assert_eq!(Err(ClockError::InvalidEntry), ClockOps::recalc_rate(&rcg, 300_000_000));
        // Level 4 exists in hardware but not in this description.
        port.preset(CMD + DFS_CMD_REG, (4 << 1) | 1);
        assert_eq!(Err(ClockError::InvalidEntry), ClockOps::recalc_rate(&rcg, 300_000_000));
        assert_eq!(0, port.reads(CMD + perf_reg(4)));

        port.preset(CMD + DFS_CMD_REG, (3 << 1) | 1);
        assert_eq!(Ok(7_372_800), ClockOps::recalc_rate(&rcg, 300_000_000));
    }

    #[test]
    fn rejects_software_rate_changes() {
        let port = FakePort::new();
        let delay = CountingDelay::new();
        let rcg = Rcg::new(Regmap::new(&port, &delay), dfs_config(1)).unwrap();
        assert_eq!(Err(ClockError::NoSupport), rcg.set_rate(19_200_000, 19_200_000));
    }

    #[test]
    fn unmapped_level_source_is_an_error() {
        let port = FakePort::new();
        port.preset(CMD + perf_reg(0), 5 << 8);
        let delay = CountingDelay::new();
        let rcg = Rcg::new(Regmap::new(&port, &delay), dfs_config(1)).unwrap();
        assert_eq!(
            Err(ClockError::InvalidEntry),
            rcg.populate_dfs_table(&Parents).map(|t| t.len())
        );
    }

    #[test]
    fn level_count_is_bounded() {
        let port = FakePort::new();
        let delay = CountingDelay::new();
        assert!(Rcg::new(Regmap::new(&port, &delay), dfs_config(9)).is_err());
        assert!(Rcg::new(Regmap::new(&port, &delay), dfs_config(0)).is_err());
        assert!(Rcg::new(Regmap::new(&port, &delay), dfs_config(8)).is_ok());
    }
}
