use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quorum_common::ProtocolVariant;
use quorum_consensus::RunSummary;

/// Flat, human-readable view of a run. Latencies in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub run_id: Uuid,
    pub protocol: ProtocolVariant,
    pub blocks_committed: u64,
    pub failed_proposals: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub total_elapsed_ms: f64,
    pub throughput_blocks_per_sec: f64,
    pub forks_prevented: u64,
    pub speculative_finalizations: u64,
    pub speculative_reverts: u64,
    pub view_changes: u64,
    pub fallbacks: u64,
    pub messages_per_round: f64,
    pub consistent: bool,
    pub inconsistency: Option<String>,
    pub cancelled: bool,
}

fn ms(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl From<&RunSummary> for SimulationReport {
    fn from(summary: &RunSummary) -> Self {
        let m = &summary.metrics;
        Self {
            run_id: summary.run_id,
            protocol: summary.protocol,
            blocks_committed: m.total_blocks,
            failed_proposals: m.failed_proposals,
            success_rate: m.success_rate(),
            average_latency_ms: ms(m.average_latency()),
            p50_ms: ms(m.p50()),
            p95_ms: ms(m.p95()),
            p99_ms: ms(m.p99()),
            total_elapsed_ms: ms(m.total_elapsed()),
            throughput_blocks_per_sec: m.throughput(),
            forks_prevented: m.forks_prevented,
            speculative_finalizations: m.speculative_finalizations,
            speculative_reverts: m.speculative_reverts,
            view_changes: m.view_changes,
            fallbacks: m.fallbacks,
            messages_per_round: m.messages_per_round(),
            consistent: summary.consistent,
            inconsistency: summary.inconsistency.clone(),
            cancelled: summary.cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub slow: SimulationReport,
    pub fast: SimulationReport,
    /// Fast average latency relative to slow; below 1.0 means fast was quicker.
    pub latency_ratio: Option<f64>,
}

impl ComparisonReport {
    pub fn new(slow: SimulationReport, fast: SimulationReport) -> Self {
        let latency_ratio = (slow.average_latency_ms > 0.0)
            .then(|| fast.average_latency_ms / slow.average_latency_ms);
        Self {
            slow,
            fast,
            latency_ratio,
        }
    }
}
