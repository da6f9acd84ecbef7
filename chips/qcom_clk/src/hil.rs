// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Interfaces between clock drivers and the clock tree.
//!
//! [`ClockOps`] is implemented by every programmable node (generators and
//! gates). [`ExternalClock`] is implemented by whatever sits above the clock
//! controller: crystals and PLLs whose internals are managed elsewhere.
//! [`ParentRates`] is how a node asks about its parents while deciding on a
//! rate, without holding references into the tree.

use crate::errorcode::ClockError;

/// A rate negotiation between a node and its parents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateRequest {
    /// On entry the requested rate; on return the rate the node will
    /// actually produce.
    pub rate: u64,
    /// Parent index the node would switch to, if it picked one.
    pub best_parent: Option<usize>,
    /// Rate the chosen parent runs at (or would run at, when the node
    /// propagates rate changes upward).
    pub best_parent_rate: u64,
}

impl RateRequest {
    pub const fn new(rate: u64) -> Self {
        Self {
            rate,
            best_parent: None,
            best_parent_rate: 0,
        }
    }
}

/// Read-only view of a node's parents.
///
/// Indices are parent indices, i.e. positions in the node's source map.
pub trait ParentRates {
    fn num_parents(&self) -> usize;

    /// Current rate of parent `index`.
    fn rate(&self, index: usize) -> Result<u64, ClockError>;

    /// Rate parent `index` would settle at if asked for `rate`.
    fn round_rate(&self, index: usize, rate: u64) -> Result<u64, ClockError>;
}

/// Operations of a programmable clock node.
///
/// Callers serialize all operations on one node. Implementations keep their
/// mutable state in cells and never block other than through bounded polls.
pub trait ClockOps {
    fn enable(&self) -> Result<(), ClockError>;

    fn disable(&self) -> Result<(), ClockError>;

    fn is_enabled(&self) -> Result<bool, ClockError>;

    /// Rate derived from the hardware configuration and `parent_rate`.
    fn recalc_rate(&self, parent_rate: u64) -> Result<u64, ClockError>;

    /// Pick a configuration for `req.rate` without touching hardware.
    fn determine_rate(
        &self,
        req: &mut RateRequest,
        parents: &dyn ParentRates,
    ) -> Result<(), ClockError>;

    /// Program `rate`, the parent already running at `parent_rate`.
    fn set_rate(&self, rate: u64, parent_rate: u64) -> Result<(), ClockError>;

    /// Index of the currently selected parent.
    fn get_parent(&self) -> Result<usize, ClockError> {
        Ok(0)
    }

    fn set_parent(&self, index: usize) -> Result<(), ClockError> {
        if index == 0 {
            Ok(())
        } else {
            Err(ClockError::InvalidParent)
        }
    }

    /// Whether a rate change should first be applied to the parent chosen by
    /// `determine_rate`.
    fn propagates_rate(&self) -> bool {
        false
    }

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;
}

/// A clock provided from outside the controller.
pub trait ExternalClock {
    fn rate(&self) -> u64;

    fn round_rate(&self, _rate: u64) -> u64 {
        self.rate()
    }

    /// Fixed-rate clocks accept only their own rate.
    fn set_rate(&self, rate: u64) -> Result<(), ClockError> {
        if rate == self.rate() {
            Ok(())
        } else {
            Err(ClockError::NoSupport)
        }
    }

    fn enable(&self) -> Result<(), ClockError> {
        Ok(())
    }

    fn disable(&self) -> Result<(), ClockError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// An always-on clock at a fixed rate, such as the board crystal.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    rate: u64,
}

impl FixedClock {
    pub const fn new(rate: u64) -> Self {
        Self { rate }
    }
}

impl ExternalClock for FixedClock {
    fn rate(&self) -> u64 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_only_accepts_its_rate() {
        let xo = FixedClock::new(19_200_000);
        assert_eq!(19_200_000, xo.round_rate(1));
        assert_eq!(Ok(()), xo.set_rate(19_200_000));
        assert_eq!(Err(ClockError::NoSupport), xo.set_rate(25_000_000));
        assert!(xo.is_enabled());
    }
}
