//! Bar-key idempotency tracking with explicit snapshot/restore

use chrono::{DateTime, Utc};
use common::format_utc;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Result of feeding one bar to the tracker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarObservation {
    /// Composite key was already seen
    pub duplicate: bool,
    /// Start is not after the previous start of the same series
    pub non_monotonic: bool,
}

/// Seen bar keys and the last start per `(instrument, interval)` series.
///
/// Owned by one verifier or engine loop; share it by snapshot, not by reference.
#[derive(Debug, Clone, Default)]
pub struct BarKeyTracker {
    seen: FxHashSet<String>,
    last_start: FxHashMap<String, DateTime<Utc>>,
}

/// Serializable tracker state, sorted for stable output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Composite keys
    pub keys: Vec<String>,
    /// Last start per series
    pub last_start: Vec<(String, DateTime<Utc>)>,
}

/// `instrument|interval|start|BAR_V1`
#[must_use]
pub fn composite_key(instrument: &str, interval_secs: i64, start: &DateTime<Utc>) -> String {
    format!("{instrument}|{interval_secs}|{}|BAR_V1", format_utc(start))
}

impl BarKeyTracker {
    /// Empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a bar and report duplicate and ordering problems
    pub fn observe(
        &mut self,
        instrument: &str,
        interval_secs: i64,
        start: DateTime<Utc>,
    ) -> BarObservation {
        let duplicate = !self
            .seen
            .insert(composite_key(instrument, interval_secs, &start));
        let series = format!("{instrument}|{interval_secs}");
        let non_monotonic = self
            .last_start
            .get(&series)
            .is_some_and(|prev| start <= *prev);
        self.last_start.insert(series, start);
        BarObservation {
            duplicate,
            non_monotonic,
        }
    }

    /// Number of distinct keys seen
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when nothing has been observed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Copy out the current state
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        let mut keys: Vec<_> = self.seen.iter().cloned().collect();
        keys.sort();
        let mut last_start: Vec<_> = self
            .last_start
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        last_start.sort();
        TrackerSnapshot { keys, last_start }
    }

    /// Rebuild a tracker from a snapshot
    #[must_use]
    pub fn restore(snapshot: TrackerSnapshot) -> Self {
        Self {
            seen: snapshot.keys.into_iter().collect(),
            last_start: snapshot.last_start.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::parse_utc;

    #[test]
    fn test_duplicate_and_ordering() {
        let t0 = parse_utc("2025-01-01T00:00:00Z").unwrap();
        let t1 = parse_utc("2025-01-01T00:01:00Z").unwrap();
        let mut tracker = BarKeyTracker::new();

        assert_eq!(tracker.observe("EURUSD", 60, t0), BarObservation::default());
        assert_eq!(tracker.observe("EURUSD", 60, t1), BarObservation::default());
        let again = tracker.observe("EURUSD", 60, t1);
        assert!(again.duplicate);
        assert!(again.non_monotonic);
        // other series are independent
        assert_eq!(tracker.observe("GBPUSD", 60, t0), BarObservation::default());
    }

    #[test]
    fn test_snapshot_restore() {
        let t0 = parse_utc("2025-01-01T00:00:00Z").unwrap();
        let mut tracker = BarKeyTracker::new();
        tracker.observe("EURUSD", 60, t0);

        let restored = BarKeyTracker::restore(tracker.snapshot());
        assert_eq!(restored.snapshot(), tracker.snapshot());
        let mut restored = restored;
        assert!(restored.observe("EURUSD", 60, t0).duplicate);
    }
}
