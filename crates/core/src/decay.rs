//! Exponential time decay for miss-pattern confidence.
//!
//! Decay is a read-time concern: stored patterns keep their base confidence
//! and consumers apply [`DecayCalculator::decayed_confidence`] exactly once
//! when exposing a value.

use chrono::{DateTime, Utc};

use crate::domain::pattern::validate_confidence;
use crate::errors::ValidationError;

pub const DEFAULT_HALF_LIFE_DAYS: f64 = 14.0;

/// Ages at or beyond this many half-lives decay to zero (0.5^6 ≈ 1.5%).
pub const NEGLIGIBLE_HALF_LIVES: f64 = 6.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// `0.5^(age / half_life)`, clamped to zero once the age reaches six
/// half-lives. Negative ages are treated as zero.
pub fn decay(age_days: f64, half_life_days: f64) -> f64 {
    let age_days = age_days.max(0.0);
    if age_days >= NEGLIGIBLE_HALF_LIVES * half_life_days {
        return 0.0;
    }
    0.5_f64.powf(age_days / half_life_days)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecayCalculator {
    half_life_days: f64,
}

impl Default for DecayCalculator {
    fn default() -> Self {
        Self { half_life_days: DEFAULT_HALF_LIFE_DAYS }
    }
}

impl DecayCalculator {
    pub fn new(half_life_days: f64) -> Result<Self, ValidationError> {
        if !half_life_days.is_finite() || half_life_days <= 0.0 {
            return Err(ValidationError::InvalidHalfLife { value: half_life_days });
        }
        Ok(Self { half_life_days })
    }

    pub fn half_life_days(&self) -> f64 {
        self.half_life_days
    }

    pub fn multiplier(&self, age_days: f64) -> f64 {
        decay(age_days, self.half_life_days)
    }

    /// `base × decay(age)`. Rejects a base outside `[0, 1]` and an
    /// occurrence later than `now`.
    pub fn decayed_confidence(
        &self,
        base: f64,
        last_occurrence: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<f64, ValidationError> {
        validate_confidence(base)?;
        if last_occurrence > now {
            return Err(ValidationError::FutureTimestamp { timestamp: last_occurrence, now });
        }
        Ok(base * self.multiplier(age_in_days(last_occurrence, now)))
    }
}

pub fn age_in_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let age = to.signed_duration_since(from);
    let seconds = age.num_milliseconds() as f64 / 1_000.0;
    seconds / SECONDS_PER_DAY
}
