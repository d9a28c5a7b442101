/*!
 * Activity Tracker
 * Per-actor recent-event history backing the behavioral-anomaly check
 */

use crate::core::limits::{ACTIVITY_WINDOW, MAX_ACTIVITY_RECORDS_PER_ACTOR};
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

/// One observed evaluation for an actor
#[derive(Debug, Clone, Copy)]
pub struct ActivityRecord {
    pub timestamp: SystemTime,
    pub ip_address: Option<IpAddr>,
    pub success: bool,
}

/// Aggregated signals over the lookback window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivitySummary {
    pub total_events: usize,
    pub distinct_addresses: usize,
    pub failures: usize,
}

/// Bounded per-actor history of recent evaluations
///
/// State is partitioned by actor id; records age out of the window lazily on
/// read and are additionally capped per actor to bound memory.
pub struct ActivityTracker {
    records: DashMap<String, VecDeque<ActivityRecord>, RandomState>,
    window: Duration,
    max_per_actor: usize,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::with_window(ACTIVITY_WINDOW, MAX_ACTIVITY_RECORDS_PER_ACTOR)
    }

    pub fn with_window(window: Duration, max_per_actor: usize) -> Self {
        Self {
            records: DashMap::with_hasher(RandomState::new()),
            window,
            max_per_actor,
        }
    }

    pub fn record(&self, actor_id: &str, record: ActivityRecord) {
        let mut entry = self
            .records
            .entry(actor_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(16));

        entry.push_back(record);
        if entry.len() > self.max_per_actor {
            entry.pop_front();
        }

        // Drop records that have already aged out of the window
        let cutoff = record.timestamp.checked_sub(self.window);
        if let Some(cutoff) = cutoff {
            while entry.front().map_or(false, |r| r.timestamp < cutoff) {
                entry.pop_front();
            }
        }
    }

    /// Aggregate signals for the window ending at `now`
    pub fn summary(&self, actor_id: &str, now: SystemTime) -> ActivitySummary {
        let Some(entry) = self.records.get(actor_id) else {
            return ActivitySummary::default();
        };

        let cutoff = now.checked_sub(self.window);
        let mut summary = ActivitySummary::default();
        let mut addresses: HashSet<IpAddr> = HashSet::new();

        for record in entry.iter() {
            if let Some(cutoff) = cutoff {
                if record.timestamp < cutoff {
                    continue;
                }
            }
            summary.total_events += 1;
            if !record.success {
                summary.failures += 1;
            }
            if let Some(ip) = record.ip_address {
                addresses.insert(ip);
            }
        }

        summary.distinct_addresses = addresses.len();
        summary
    }

    pub fn clear(&self, actor_id: &str) {
        self.records.remove(actor_id);
    }

    pub fn tracked_actors(&self) -> usize {
        self.records.len()
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}
