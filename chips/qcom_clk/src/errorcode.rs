// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Error types returned by clock operations.

use core::fmt;

use crate::freq_tbl::SourceId;

/// Failure reported by a [`RegisterPort`](crate::RegisterPort).
///
/// Bus errors are propagated unchanged through every clock operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusError {
    /// The offset lies outside the register window.
    OutOfRange { offset: u32 },
    /// The offset is not 32-bit aligned.
    Unaligned { offset: u32 },
    /// The interconnect reported an error for the access.
    Fault { offset: u32 },
}

/// Which way a gate was being switched when it got stuck.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Enabling,
    Disabling,
}

impl Direction {
    pub fn from_enable(enable: bool) -> Self {
        if enable {
            Direction::Enabling
        } else {
            Direction::Disabling
        }
    }

    /// The status the gate is stuck in: a gate that fails to enable is still
    /// "off", one that fails to disable is still "on".
    pub fn stuck_state(self) -> &'static str {
        match self {
            Direction::Enabling => "off",
            Direction::Disabling => "on",
        }
    }
}

/// Errors returned by generator, gate and tree operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockError {
    /// The frequency table is missing or empty, or no entry satisfies the
    /// requested policy.
    NoMatchingFrequency,
    /// No fractional candidate gets within tolerance of the parent rate.
    NoFractionalApproximation,
    /// The source is not present in this generator's source map.
    UnknownSource(SourceId),
    /// The update-pending bit never cleared after a commit.
    CommitTimeout,
    /// A gate never reached the expected halt status.
    HaltTimeout(Direction),
    /// The generator never reported itself enabled after a force-enable.
    StuckEnabled,
    /// The register port failed.
    Bus(BusError),
    /// The requested rate cannot be served by this kind of clock (for
    /// example a request for 0 Hz).
    InvalidRate,
    /// A parent index is out of range, or the tree is not acyclic.
    InvalidParent,
    /// The static description is inconsistent: a frequency entry violates
    /// `frac_m <= frac_n`, a field width or DFS level count exceeds the
    /// hardware, or a flag does not apply to the generator kind.
    InvalidEntry,
    /// The operation is not implemented by this kind of clock.
    NoSupport,
}

impl From<BusError> for ClockError {
    fn from(err: BusError) -> Self {
        ClockError::Bus(err)
    }
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::NoMatchingFrequency => write!(f, "no matching frequency"),
            ClockError::NoFractionalApproximation => {
                write!(f, "no fractional approximation within tolerance")
            }
            ClockError::UnknownSource(src) => write!(f, "unknown source {}", src.0),
            ClockError::CommitTimeout => write!(f, "configuration update not acknowledged"),
            ClockError::HaltTimeout(dir) => write!(f, "status stuck at '{}'", dir.stuck_state()),
            ClockError::StuckEnabled => write!(f, "generator did not turn on"),
            ClockError::Bus(BusError::OutOfRange { offset }) => {
                write!(f, "register {:#x} outside window", offset)
            }
            ClockError::Bus(BusError::Unaligned { offset }) => {
                write!(f, "register {:#x} unaligned", offset)
            }
            ClockError::Bus(BusError::Fault { offset }) => {
                write!(f, "bus fault at register {:#x}", offset)
            }
            ClockError::InvalidRate => write!(f, "invalid rate"),
            ClockError::InvalidParent => write!(f, "invalid parent"),
            ClockError::InvalidEntry => write!(f, "invalid clock description"),
            ClockError::NoSupport => write!(f, "operation not supported"),
        }
    }
}
