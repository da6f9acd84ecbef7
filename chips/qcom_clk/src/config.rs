// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Compile-time configuration of the clock drivers.
//!
//! As in the kernel crate, tunables live in a single `const` object instead
//! of being spread over cargo features, so every code path is type-checked
//! regardless of the selected options and disabled branches fold away.

/// Data structure holding compile-time configuration options.
pub(crate) struct Config {
    /// Whether register values written while reprogramming a generator are
    /// reported at trace level.
    pub(crate) trace_rate_changes: bool,

    /// Number of times the update-pending bit is sampled after a commit
    /// before the commit is declared stuck.
    pub(crate) commit_poll_iterations: u32,

    /// Number of times the root-off status is sampled after asserting the
    /// root-enable (force-enable) bit.
    pub(crate) force_enable_poll_iterations: u32,

    /// Number of times a gate's halt status is sampled after toggling it.
    pub(crate) halt_poll_iterations: u32,

    /// Delay between two samples of any polled status bit, in microseconds.
    pub(crate) poll_interval_us: u32,

    /// Fixed settle delay for gates whose state cannot be observed, in
    /// microseconds.
    pub(crate) halt_settle_delay_us: u32,

    /// Largest distance, in Hz, between the parent rate a fractional
    /// candidate needs and the parent rate actually available.
    pub(crate) frac_tolerance_hz: u64,

    /// Rate of the always-on reference (crystal) that safe-switch generators
    /// are parked on.
    pub(crate) reference_frequency_hz: u64,
}

/// The single instance of `Config` used throughout the crate. Cargo features
/// that change driver behavior are read here and nowhere else.
pub(crate) const CONFIG: Config = Config {
    trace_rate_changes: cfg!(feature = "trace_rate_changes"),
    commit_poll_iterations: 500,
    force_enable_poll_iterations: 500,
    halt_poll_iterations: 200,
    poll_interval_us: 1,
    halt_settle_delay_us: 10,
    frac_tolerance_hz: 100_000,
    reference_frequency_hz: 19_200_000,
};
