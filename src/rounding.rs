//! Rounding of requested lock timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::active_lock::Timeout;

/// How requested timeouts are rounded before a lock is issued.
///
/// Rounding gives clients stable, comparable expiry boundaries instead of
/// sub-millisecond jitter. Every policy yields whole milliseconds, the precision
/// lock records are stored at. Infinite timeouts are never rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeoutRounding {
    /// Use the requested timeout, rounded up to a whole millisecond.
    None,
    /// Round up to the next multiple of `granularity_ms` milliseconds.
    ///
    /// A zero timeout rounds up to one full granule, so a granted lock always has
    /// a positive lease.
    RoundUp { granularity_ms: u64 },
}

impl Default for TimeoutRounding {
    fn default() -> Self {
        TimeoutRounding::RoundUp {
            granularity_ms: 100,
        }
    }
}

impl TimeoutRounding {
    pub fn round_up_to(granularity: Duration) -> Self {
        TimeoutRounding::RoundUp {
            granularity_ms: granularity.as_millis() as u64,
        }
    }

    pub fn round(&self, requested: Timeout) -> Timeout {
        match requested {
            Timeout::Infinite => Timeout::Infinite,
            Timeout::Finite(duration) => Timeout::Finite(self.round_duration(duration)),
        }
    }

    pub fn round_duration(&self, requested: Duration) -> Duration {
        match *self {
            TimeoutRounding::None | TimeoutRounding::RoundUp { granularity_ms: 0 } => {
                let granules = requested.as_nanos().div_ceil(NANOS_PER_MILLI);
                from_granules(granules, NANOS_PER_MILLI)
            }
            TimeoutRounding::RoundUp { granularity_ms } => {
                let granule = u128::from(granularity_ms) * NANOS_PER_MILLI;
                let granules = requested.as_nanos().div_ceil(granule).max(1);
                from_granules(granules, granule)
            }
        }
    }
}

const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

fn from_granules(granules: u128, granule: u128) -> Duration {
    let rounded = granules.saturating_mul(granule);
    if rounded > u128::from(u64::MAX) * NANOS_PER_SEC {
        return Duration::MAX;
    }
    Duration::new(
        (rounded / NANOS_PER_SEC) as u64,
        (rounded % NANOS_PER_SEC) as u32,
    )
}
