//! Run-wide counters and latency samples.
//!
//! Counters are atomics so vote tasks can bump them without coordination.
//! Latency samples sit behind a mutex and are only touched once per block.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct Metrics {
    total_blocks: AtomicU64,
    failed_proposals: AtomicU64,
    forks_prevented: AtomicU64,
    speculative_finalizations: AtomicU64,
    speculative_reverts: AtomicU64,
    view_changes: AtomicU64,
    fallbacks: AtomicU64,
    votes_cast: AtomicU64,
    phases_run: AtomicU64,
    latencies: Mutex<Vec<Duration>>,
    failed_latencies: Mutex<Vec<Duration>>,
}

// A panic while pushing a sample leaves the vector intact; keep using it.
fn lock(m: &Mutex<Vec<Duration>>) -> MutexGuard<'_, Vec<Duration>> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_commit(&self, latency: Duration) {
        self.total_blocks.fetch_add(1, Ordering::Relaxed);
        lock(&self.latencies).push(latency);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.failed_proposals.fetch_add(1, Ordering::Relaxed);
        lock(&self.failed_latencies).push(latency);
    }

    pub fn record_fork_prevented(&self) {
        self.forks_prevented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_speculative_finalization(&self) {
        self.speculative_finalizations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_speculative_revert(&self) {
        self.speculative_reverts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_view_change(&self) {
        self.view_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_vote(&self) {
        self.votes_cast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_phase(&self) {
        self.phases_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_blocks: self.total_blocks.load(Ordering::Relaxed),
            failed_proposals: self.failed_proposals.load(Ordering::Relaxed),
            forks_prevented: self.forks_prevented.load(Ordering::Relaxed),
            speculative_finalizations: self.speculative_finalizations.load(Ordering::Relaxed),
            speculative_reverts: self.speculative_reverts.load(Ordering::Relaxed),
            view_changes: self.view_changes.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            votes_cast: self.votes_cast.load(Ordering::Relaxed),
            phases_run: self.phases_run.load(Ordering::Relaxed),
            latencies: lock(&self.latencies).clone(),
            failed_latencies: lock(&self.failed_latencies).clone(),
        }
    }
}

/// Point-in-time copy of the metrics. Derived statistics are computed on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_blocks: u64,
    pub failed_proposals: u64,
    pub forks_prevented: u64,
    pub speculative_finalizations: u64,
    pub speculative_reverts: u64,
    pub view_changes: u64,
    pub fallbacks: u64,
    pub votes_cast: u64,
    pub phases_run: u64,
    /// Committed blocks, in commit order. Averages and p50/p95/p99 use only
    /// these; failed proposals count toward `total_elapsed` alone.
    pub latencies: Vec<Duration>,
    pub failed_latencies: Vec<Duration>,
}

impl MetricsSnapshot {
    pub fn average_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        self.latencies.iter().sum::<Duration>() / self.latencies.len() as u32
    }

    /// Sorts committed latencies and takes the sample at `len * pct / 100`.
    pub fn percentile(&self, pct: u32) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        let idx = (sorted.len() * pct as usize / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50)
    }

    pub fn p95(&self) -> Duration {
        self.percentile(95)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99)
    }

    /// Time spent on committed and failed blocks.
    pub fn total_elapsed(&self) -> Duration {
        self.latencies
            .iter()
            .chain(self.failed_latencies.iter())
            .sum()
    }

    /// Committed blocks per second of total elapsed time.
    pub fn throughput(&self) -> f64 {
        let secs = self.total_elapsed().as_secs_f64();
        if secs > 0.0 {
            self.total_blocks as f64 / secs
        } else {
            0.0
        }
    }

    pub fn messages_per_round(&self) -> f64 {
        if self.phases_run == 0 {
            return 0.0;
        }
        self.votes_cast as f64 / self.phases_run as f64
    }

    pub fn success_rate(&self) -> f64 {
        let attempted = self.total_blocks + self.failed_proposals;
        if attempted == 0 {
            return 0.0;
        }
        self.total_blocks as f64 / attempted as f64
    }
}
