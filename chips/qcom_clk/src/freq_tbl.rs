// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Frequency tables, source maps and rate matching.
//!
//! A generator is described by a static table of the rates it supports. Each
//! entry names the upstream source, the half-integer pre-divider and the
//! optional M/N fraction that produce the rate. Rate requests are resolved
//! against the table with either a ceiling or a floor policy.
//!
//! Display clocks cannot be tabulated this way because the parent is a PHY
//! PLL running at a link-dependent rate. For those the matcher walks a small
//! list of rational multipliers instead, see [`find_frac`].

use crate::config::CONFIG;
use crate::errorcode::ClockError;

/// Abstract identifier of an upstream clock, as used in frequency tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u8);

/// One supported generator configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreqEntry {
    /// Output rate in Hz.
    pub frequency: u64,
    pub source_id: SourceId,
    /// Raw pre-divider field: the divider is `(pre_divider + 1) / 2`. Zero
    /// means no half-divider stage.
    pub pre_divider: u32,
    /// Fractional numerator. Only meaningful when `frac_n` is nonzero.
    pub frac_m: u32,
    /// Fractional denominator. Zero disables the M/N stage.
    pub frac_n: u32,
    /// Rate to ask of the parent when rate setting propagates upward. When
    /// `None` it is derived from the other fields.
    pub parent_request_frequency: Option<u64>,
}

impl FreqEntry {
    /// An entry with a raw pre-divider field.
    pub const fn new(frequency: u64, source_id: SourceId, pre_divider: u32, m: u32, n: u32) -> Self {
        Self {
            frequency,
            source_id,
            pre_divider,
            frac_m: m,
            frac_n: n,
            parent_request_frequency: None,
        }
    }

    /// An entry whose divider is given in halves, so `div_halves = 3` divides
    /// by 1.5. This mirrors how divider values are written in datasheets.
    pub const fn with_half_divider(
        frequency: u64,
        source_id: SourceId,
        div_halves: u32,
        m: u32,
        n: u32,
    ) -> Self {
        let pre_divider = if div_halves == 0 { 0 } else { div_halves - 1 };
        Self::new(frequency, source_id, pre_divider, m, n)
    }

    /// Ask the parent for exactly `rate` instead of deriving it.
    pub const fn with_parent_request(mut self, rate: u64) -> Self {
        self.parent_request_frequency = Some(rate);
        self
    }

    /// Whether the entry uses the M/N stage.
    pub const fn is_fractional(&self) -> bool {
        self.frac_n != 0
    }

    /// Check `frac_m <= frac_n` for fractional entries.
    pub fn validate(&self) -> Result<(), ClockError> {
        if self.is_fractional() && self.frac_m > self.frac_n {
            return Err(ClockError::InvalidEntry);
        }
        Ok(())
    }

    /// Parent rate needed to produce this entry, `requested` being the rate
    /// the consumer asked for (used when `frequency` is zero).
    pub fn parent_rate_for(&self, requested: u64) -> u64 {
        if let Some(rate) = self.parent_request_frequency {
            return rate;
        }
        let mut rate = self.frequency;
        if self.pre_divider != 0 {
            if rate == 0 {
                rate = requested;
            }
            rate /= 2;
            rate = rate.saturating_mul(u64::from(self.pre_divider) + 1);
        }
        if self.frac_n != 0 && self.frac_m != 0 {
            rate = rate.saturating_mul(u64::from(self.frac_n)) / u64::from(self.frac_m);
        }
        rate
    }
}

/// Translation of a [`SourceId`] to a generator's mux-select encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceMapEntry {
    pub source_id: SourceId,
    pub mux_select: u8,
}

impl SourceMapEntry {
    pub const fn new(source_id: SourceId, mux_select: u8) -> Self {
        Self {
            source_id,
            mux_select,
        }
    }
}

/// Position of `source` in `map`, which is also the parent index.
pub fn find_src_index(map: &[SourceMapEntry], source: SourceId) -> Result<usize, ClockError> {
    map.iter()
        .position(|e| e.source_id == source)
        .ok_or(ClockError::UnknownSource(source))
}

/// Tie-break used when the requested rate is not tabulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RatePolicy {
    /// Lowest rate at or above the request, else the fastest entry.
    Ceil,
    /// Highest rate at or below the request, else the slowest entry.
    Floor,
}

/// Ceiling match: the first lowest entry `>= rate`, clamped to the fastest.
pub fn find_ceil(table: &[FreqEntry], rate: u64) -> Result<&FreqEntry, ClockError> {
    table
        .iter()
        .filter(|f| f.frequency >= rate)
        .min_by_key(|f| f.frequency)
        .or_else(|| table.iter().max_by_key(|f| f.frequency))
        .ok_or(ClockError::NoMatchingFrequency)
}

/// Floor match: the last highest entry `<= rate`, clamped to the slowest.
pub fn find_floor(table: &[FreqEntry], rate: u64) -> Result<&FreqEntry, ClockError> {
    table
        .iter()
        .filter(|f| f.frequency <= rate)
        .max_by_key(|f| f.frequency)
        .or_else(|| table.iter().min_by_key(|f| f.frequency))
        .ok_or(ClockError::NoMatchingFrequency)
}

pub fn find_rate(table: &[FreqEntry], rate: u64, policy: RatePolicy) -> Result<&FreqEntry, ClockError> {
    match policy {
        RatePolicy::Ceil => find_ceil(table, rate),
        RatePolicy::Floor => find_floor(table, rate),
    }
}

/// Rational multiplier `num / den` applied to a parent rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FracEntry {
    pub num: u32,
    pub den: u32,
}

const fn frac(num: u32, den: u32) -> FracEntry {
    FracEntry { num, den }
}

/// Multipliers tried for pixel clocks, in order of preference.
pub const PIXEL_FRAC_TABLE: [FracEntry; 5] = [
    frac(3, 8),
    frac(2, 9),
    frac(4, 9),
    frac(1, 1),
    frac(2, 3),
];

/// eDP pixel multipliers for a 675 MHz link PLL (270 MHz link rate).
pub const FRAC_TABLE_675M: [FracEntry; 7] = [
    frac(52, 295),  // 119 MHz
    frac(11, 57),   // 130.25 MHz
    frac(63, 307),  // 138.50 MHz
    frac(11, 50),   // 148.50 MHz
    frac(47, 206),  // 154 MHz
    frac(31, 100),  // 205.25 MHz
    frac(107, 269), // 268.50 MHz
];

/// eDP pixel multipliers for an 810 MHz link PLL (162 MHz link rate).
pub const FRAC_TABLE_810M: [FracEntry; 7] = [
    frac(31, 211),  // 119 MHz
    frac(32, 199),  // 130.25 MHz
    frac(63, 307),  // 138.50 MHz
    frac(11, 60),   // 148.50 MHz
    frac(50, 263),  // 154 MHz
    frac(31, 120),  // 205.25 MHz
    frac(119, 359), // 268.50 MHz
];

/// Find the first multiplier for which the parent can run within tolerance
/// of `rate * den / num`.
///
/// `parent_round` reports the rate the parent would actually run at when
/// asked for a given rate; for a fixed parent it ignores its argument.
/// Returns the multiplier and that achievable parent rate.
pub fn find_frac<F>(
    table: &[FracEntry],
    rate: u64,
    mut parent_round: F,
) -> Result<(FracEntry, u64), ClockError>
where
    F: FnMut(u64) -> Result<u64, ClockError>,
{
    for frac in table.iter().filter(|f| f.num != 0) {
        // A parent rate past u64 cannot be requested; try the next ratio.
        let request = match rate.checked_mul(u64::from(frac.den)) {
            Some(scaled) => scaled / u64::from(frac.num),
            None => continue,
        };
        let parent_rate = parent_round(request)?;
        if parent_rate.abs_diff(request) > CONFIG.frac_tolerance_hz {
            continue;
        }
        return Ok((*frac, parent_rate));
    }
    Err(ClockError::NoFractionalApproximation)
}

/// Best rational approximation of `given_num / given_den` with numerator
/// and denominator bounded by `max_num` and `max_den`.
///
/// Walks the continued fraction expansion and, once a convergent exceeds the
/// bounds, picks between the previous convergent and the largest admissible
/// semi-convergent. Returns `(num, den)`.
pub fn rational_best_approximation(
    given_num: u64,
    given_den: u64,
    max_num: u64,
    max_den: u64,
) -> (u64, u64) {
    let (mut n, mut d) = (given_num, given_den);
    let (mut n0, mut d0) = (0u64, 1u64);
    let (mut n1, mut d1) = (1u64, 0u64);

    while d != 0 {
        let dp = d;
        let a = n / d;
        d = n % d;
        n = dp;

        let n2 = n0.saturating_add(a.saturating_mul(n1));
        let d2 = d0.saturating_add(a.saturating_mul(d1));

        if n2 > max_num || d2 > max_den {
            let mut t = u64::MAX;
            if d1 != 0 {
                t = max_den.saturating_sub(d0) / d1;
            }
            if n1 != 0 {
                t = t.min(max_num.saturating_sub(n0) / n1);
            }
            // With no previous convergent the semi-convergent is the only
            // candidate.
            let twice_t = t.saturating_mul(2);
            let prev_is_worse = u128::from(d0) * u128::from(dp) > u128::from(d1) * u128::from(d);
            if d1 == 0 || twice_t > a || (twice_t == a && prev_is_worse) {
                n1 = n0 + t * n1;
                d1 = d0 + t * d1;
            }
            break;
        }
        n0 = n1;
        n1 = n2;
        d0 = d1;
        d1 = d2;
    }
    (n1, d1)
}
