// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Clock controller support for Qualcomm-style global clock controllers.
//!
//! A global clock controller is a register window containing many root clock
//! generators (RCGs) and branch gates. An RCG selects one of several upstream
//! sources through a mux, divides it with a half-integer pre-divider and an
//! optional M/N:D fractional divider, and latches the new configuration when
//! software sets its update bit. A branch gates the RCG output for a single
//! consumer and reports, through a halt status field, when the gate has
//! actually settled.
//!
//! This crate provides:
//!
//! * [`Rcg`]: frequency-table matching, divider programming and the
//!   update-commit handshake, plus the safe-switch discipline that parks a
//!   generator on the always-on reference while it is disabled.
//! * [`Branch`]: the gate enable/disable state machine with bounded halt
//!   polling.
//! * [`ClockTree`]: an index-based DAG tying generators, gates and external
//!   clocks (PLLs, crystals) together so rate requests can propagate to
//!   parents.
//!
//! All hardware access goes through a [`RegisterPort`], and all waiting
//! through a [`Delay`], so the drivers run unchanged against real MMIO or a
//! test double.
//!
//! Limitations:
//!
//! * No PLL internals: PLLs are reached only through [`ExternalClock`].
//! * No voltage corner scaling.
//! * No locking: callers serialize operations on a given node.

#![no_std]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

mod config;

pub mod errorcode;
pub use self::errorcode::{BusError, ClockError, Direction};

pub mod regmap;
pub use self::regmap::{MmioWindow, RegisterPort, Regmap};

pub mod poll;
pub use self::poll::{Delay, PollStatus, SpinDelay};

pub mod freq_tbl;
pub use self::freq_tbl::{FracEntry, FreqEntry, RatePolicy, SourceId, SourceMapEntry};

pub mod hil;
pub use self::hil::{ClockOps, ExternalClock, FixedClock, ParentRates, RateRequest};

pub mod rcg;
pub use self::rcg::{Rcg, RcgConfig, RcgFlags, RcgKind, SwitchState};

pub mod branch;
pub use self::branch::{Branch, BranchConfig, GateModel, HaltCheck};

pub mod tree;
pub use self::tree::{ClockNode, ClockTree, NodeId};

#[cfg(test)]
mod test_util;
