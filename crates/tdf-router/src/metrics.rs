//! Router counters.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// Fallback tier a conversion dropped into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Flat,
    PlainText,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flat => "flat",
            Self::PlainText => "plainText",
        })
    }
}

/// Number of transitions into each fallback tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackCounts {
    pub flat: u64,
    pub plain_text: u64,
}

/// Point-in-time copy of the router counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Conversions returned, cache hits included.
    pub conversions: u64,
    /// Fraction of conversions served from the cache.
    pub cache_hit_rate: f64,
    pub avg_latency_ms: f64,
    pub fallback_counts: FallbackCounts,
    /// Calls rejected before conversion (undecodable input).
    pub failures: u64,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct State {
    conversions: u64,
    cache_hits: u64,
    total_latency: Duration,
    fallback_counts: FallbackCounts,
    failures: u64,
    last_error: Option<String>,
}

/// Thread-safe counters updated by every router call.
#[derive(Default)]
pub struct Metrics {
    state: Mutex<State>,
}

impl Metrics {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_conversion(&self, cache_hit: bool, latency: Duration) {
        let mut state = self.lock();
        state.conversions += 1;
        if cache_hit {
            state.cache_hits += 1;
        }
        state.total_latency += latency;
    }

    pub fn record_fallback(&self, tier: Tier, error: &str) {
        let mut state = self.lock();
        match tier {
            Tier::Flat => state.fallback_counts.flat += 1,
            Tier::PlainText => state.fallback_counts.plain_text += 1,
        }
        state.last_error = Some(error.to_owned());
    }

    pub fn record_failure(&self, error: &str) {
        let mut state = self.lock();
        state.failures += 1;
        state.last_error = Some(error.to_owned());
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();
        let (cache_hit_rate, avg_latency_ms) = if state.conversions == 0 {
            (0.0, 0.0)
        } else {
            let count = state.conversions as f64;
            (
                state.cache_hits as f64 / count,
                state.total_latency.as_secs_f64() * 1000.0 / count,
            )
        };
        MetricsSnapshot {
            conversions: state.conversions,
            cache_hit_rate,
            avg_latency_ms,
            fallback_counts: state.fallback_counts,
            failures: state.failures,
            last_error: state.last_error.clone(),
        }
    }

    pub fn reset(&self) {
        *self.lock() = State::default();
    }
}
