// crates/babel-reputation/src/decay.rs
//
// Time-decay weights for votes and context contributions.
//
// Weights fall off as e^(-age / time_constant), so a contribution one time
// constant old counts for ~37% of a fresh one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exponential recency decay with a fixed time constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecencyDecay {
    /// Age, in hours, at which the weight has fallen to 1/e.
    pub time_constant_hours: f64,
}

impl RecencyDecay {
    /// Decay applied to vote weights (one day).
    pub const VOTES: RecencyDecay = RecencyDecay {
        time_constant_hours: 24.0,
    };

    /// Decay applied to context contributions (thirty days).
    pub const CONTEXT: RecencyDecay = RecencyDecay {
        time_constant_hours: 30.0 * 24.0,
    };

    /// Weight multiplier for something created at `at`, evaluated at `now`.
    ///
    /// Timestamps in the future (clock skew) count as age zero.
    pub fn factor(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        self.factor_for_hours(age_hours(at, now))
    }

    /// Weight multiplier for an age given in hours.
    ///
    /// A non-positive time constant means everything has fully decayed.
    pub fn factor_for_hours(&self, age_hours: f64) -> f64 {
        if self.time_constant_hours <= 0.0 {
            return 0.0;
        }
        (-age_hours.max(0.0) / self.time_constant_hours).exp()
    }

    /// Apply the decay to a value.
    pub fn apply(&self, value: f64, at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        value * self.factor(at, now)
    }
}

/// Fractional hours between `at` and `now`.
pub fn age_hours(at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - at).num_milliseconds() as f64 / 3_600_000.0
}
