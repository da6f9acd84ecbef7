// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Bounded busy-wait polling.
//!
//! Every wait in this crate is a bounded number of samples separated by a
//! short delay. The delay is injected through [`Delay`] so tests can count
//! samples without sleeping.

use crate::errorcode::ClockError;

/// Busy-wait delay source.
pub trait Delay {
    /// Spin for at least `us` microseconds.
    fn delay_us(&self, us: u32);
}

/// A [`Delay`] that spins a fixed number of iterations per microsecond.
///
/// The iteration count has to be calibrated against the core clock by the
/// board. It is only used before a timer is available.
pub struct SpinDelay {
    iterations_per_us: u32,
}

impl SpinDelay {
    pub const fn new(iterations_per_us: u32) -> Self {
        Self { iterations_per_us }
    }
}

impl Delay for SpinDelay {
    fn delay_us(&self, us: u32) {
        for _ in 0..us.saturating_mul(self.iterations_per_us) {
            core::hint::spin_loop();
        }
    }
}

/// Outcome of a bounded poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollStatus {
    /// The condition held within the allowed number of samples.
    Done,
    /// Every sample failed the condition.
    TimedOut,
}

/// Evaluate `done` up to `iterations` times, delaying `interval_us` after
/// each failed sample.
///
/// Errors returned by `done` abort the poll and are propagated.
pub fn poll_until<F>(
    delay: &dyn Delay,
    iterations: u32,
    interval_us: u32,
    mut done: F,
) -> Result<PollStatus, ClockError>
where
    F: FnMut() -> Result<bool, ClockError>,
{
    for _ in 0..iterations {
        if done()? {
            return Ok(PollStatus::Done);
        }
        delay.delay_us(interval_us);
    }
    Ok(PollStatus::TimedOut)
}
