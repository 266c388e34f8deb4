//! Rolling stability history.
//!
//! For every evaluated `(symbol, buy_exchange, sell_exchange)` direction the
//! engine records one net-spread sample per tick, positive or negative. A
//! direction is stable when the sample window is fully covered and every
//! sample in it is positive; a single non-positive sample breaks stability
//! until it ages out of the window.

use std::collections::{HashMap, VecDeque};

type DirectionKey = (String, String, String);

/// Samples per direction are capped; at the 1 s default tick a 5 minute
/// window needs ~300.
const MAX_SAMPLES: usize = 1024;

pub struct StabilityTracker {
    window_ms: i64,
    history: HashMap<DirectionKey, VecDeque<(i64, f64)>>,
}

impl StabilityTracker {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            history: HashMap::new(),
        }
    }

    /// Record one sample and evict history older than the window. One sample
    /// at or before the window edge is kept so coverage stays provable.
    pub fn record(
        &mut self,
        symbol: &str,
        buy_exchange: &str,
        sell_exchange: &str,
        timestamp_ms: i64,
        net_spread_pct: f64,
    ) {
        let key = (
            symbol.to_string(),
            buy_exchange.to_string(),
            sell_exchange.to_string(),
        );
        let samples = self.history.entry(key).or_default();
        samples.push_back((timestamp_ms, net_spread_pct));

        let cutoff = timestamp_ms - self.window_ms;
        while samples.len() >= 2 && samples[1].0 <= cutoff {
            samples.pop_front();
        }
        while samples.len() > MAX_SAMPLES {
            samples.pop_front();
        }
    }

    /// Stable iff the window is fully covered and every sample is positive.
    pub fn is_stable(
        &self,
        symbol: &str,
        buy_exchange: &str,
        sell_exchange: &str,
        now_ms: i64,
    ) -> bool {
        let key = (
            symbol.to_string(),
            buy_exchange.to_string(),
            sell_exchange.to_string(),
        );
        let Some(samples) = self.history.get(&key) else {
            return false;
        };
        let Some(&(oldest_ts, _)) = samples.front() else {
            return false;
        };
        if now_ms - oldest_ts < self.window_ms {
            return false;
        }
        samples.iter().all(|&(_, spread)| spread > 0.0)
    }

    /// Drop directions that have not been sampled for a full window; keeps
    /// the map bounded when symbols churn out of the universe.
    pub fn evict_idle(&mut self, now_ms: i64) {
        let window_ms = self.window_ms;
        self.history.retain(|_, samples| {
            samples
                .back()
                .map(|&(ts, _)| now_ms - ts < window_ms)
                .unwrap_or(false)
        });
    }

    pub fn tracked_directions(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: i64 = 300_000; // 5 minutes

    fn record_positive_run(tracker: &mut StabilityTracker, start: i64, end: i64, step: i64) {
        let mut ts = start;
        while ts <= end {
            tracker.record("BTCUSDT", "a", "b", ts, 0.2);
            ts += step;
        }
    }

    #[test]
    fn becomes_stable_after_full_window_of_positive_samples() {
        let mut tracker = StabilityTracker::new(WINDOW);
        let start = 1_000_000;

        record_positive_run(&mut tracker, start, start + WINDOW - 1_000, 1_000);
        assert!(!tracker.is_stable("BTCUSDT", "a", "b", start + WINDOW - 1_000));

        tracker.record("BTCUSDT", "a", "b", start + WINDOW, 0.2);
        assert!(tracker.is_stable("BTCUSDT", "a", "b", start + WINDOW));
    }

    #[test]
    fn one_negative_sample_breaks_stability_immediately() {
        let mut tracker = StabilityTracker::new(WINDOW);
        let start = 1_000_000;
        record_positive_run(&mut tracker, start, start + WINDOW, 1_000);
        assert!(tracker.is_stable("BTCUSDT", "a", "b", start + WINDOW));

        tracker.record("BTCUSDT", "a", "b", start + WINDOW + 1_000, -0.1);
        assert!(!tracker.is_stable("BTCUSDT", "a", "b", start + WINDOW + 1_000));
    }

    #[test]
    fn stability_recovers_once_negative_sample_ages_out() {
        let mut tracker = StabilityTracker::new(WINDOW);
        let start = 1_000_000;
        record_positive_run(&mut tracker, start, start + WINDOW, 1_000);
        let neg_ts = start + WINDOW + 1_000;
        tracker.record("BTCUSDT", "a", "b", neg_ts, -0.1);

        // Keep sampling positive past the point where the negative sample
        // leaves the window.
        record_positive_run(&mut tracker, neg_ts + 1_000, neg_ts + WINDOW + 2_000, 1_000);
        assert!(tracker.is_stable("BTCUSDT", "a", "b", neg_ts + WINDOW + 2_000));
    }

    #[test]
    fn directions_are_tracked_independently() {
        let mut tracker = StabilityTracker::new(WINDOW);
        let start = 1_000_000;
        record_positive_run(&mut tracker, start, start + WINDOW, 1_000);
        tracker.record("BTCUSDT", "b", "a", start + WINDOW, 0.3);

        assert!(tracker.is_stable("BTCUSDT", "a", "b", start + WINDOW));
        assert!(!tracker.is_stable("BTCUSDT", "b", "a", start + WINDOW));
    }

    #[test]
    fn unknown_direction_defaults_to_unstable() {
        let tracker = StabilityTracker::new(WINDOW);
        assert!(!tracker.is_stable("BTCUSDT", "a", "b", 1_000_000));
    }

    #[test]
    fn idle_directions_are_evicted() {
        let mut tracker = StabilityTracker::new(WINDOW);
        tracker.record("BTCUSDT", "a", "b", 1_000_000, 0.2);
        tracker.record("ETHUSDT", "a", "b", 1_000_000 + WINDOW, 0.2);
        tracker.evict_idle(1_000_000 + WINDOW + 1);

        assert_eq!(tracker.tracked_directions(), 1);
        assert!(!tracker.is_stable("BTCUSDT", "a", "b", 1_000_000 + WINDOW + 1));
    }
}
