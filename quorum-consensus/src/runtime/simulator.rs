use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{info, warn};
use uuid::Uuid;

use quorum_common::{
    error::{ConsensusError, Result},
    Block, BlockResult, NodeId, ProtocolVariant, QuorumCertificate, TransactionBatch,
};

use super::transactions::TransactionSource;
use crate::{
    cluster::{
        core::Cluster,
        rotation::{LeaderRotation, RotationReason, ViewChange},
    },
    consensus::{fork::TailForkDetector, phase::PhaseExecutor, registry::VoteRegistry},
    events::ConsensusEvent,
    metrics::MetricsSnapshot,
};

/// When a run stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    Blocks(u64),
    Duration(Duration),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub protocol: ProtocolVariant,
    pub results: Vec<BlockResult>,
    pub metrics: MetricsSnapshot,
    pub consistent: bool,
    pub inconsistency: Option<String>,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct Progress {
    block_hash: Option<String>,
    attempts: u32,
    fell_back: bool,
}

/// Drives proposals through the cluster one block at a time.
pub struct Simulator {
    pub(crate) cluster: Cluster,
    pub(crate) executor: PhaseExecutor,
    pub(crate) detector: TailForkDetector,
    pub(crate) rotation: LeaderRotation,
    pub(crate) transactions: Box<dyn TransactionSource>,
    /// Voting attempts so far; feeds the per-ballot randomness.
    pub(crate) round: u64,
    pub(crate) seed: u64,
}

impl Simulator {
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.cluster.metrics().snapshot()
    }

    pub fn rotate_leader(&mut self) -> ViewChange {
        self.rotation.reset();
        self.cluster.rotate_leader()
    }

    /// Proposes and drives one block with the configured protocol.
    pub async fn step(&mut self) -> Result<BlockResult> {
        let variant = self.cluster.config().protocol;
        self.step_with(variant).await
    }

    /// Proposes and drives one block.
    ///
    /// A block that runs out of attempts is recorded as failed and returned as
    /// `Ok`; any other error means the cluster state can no longer be trusted.
    pub async fn step_with(&mut self, variant: ProtocolVariant) -> Result<BlockResult> {
        let started = Instant::now();
        let height = self.cluster.height();
        let leader = self.cluster.leader();
        let transactions = self.transactions.next_batch(height);

        let mut progress = Progress::default();
        let outcome = self.drive(leader, transactions, variant, &mut progress).await;
        let latency = started.elapsed();
        let metrics = self.cluster.metrics();

        match outcome {
            Ok(path) => {
                metrics.record_commit(latency);
                let block_hash = progress.block_hash.clone().unwrap_or_default();
                self.cluster.events().publish(ConsensusEvent::BlockCommitted {
                    height,
                    block_hash,
                    path,
                    latency_ms: latency.as_millis() as u64,
                });
                if let Some(reason) = self.rotation.on_commit() {
                    self.rotate_for(reason);
                }
                Ok(BlockResult {
                    success: true,
                    height,
                    block_hash: progress.block_hash,
                    latency,
                    attempts: progress.attempts,
                    path: Some(path),
                    fell_back: progress.fell_back,
                    error: None,
                })
            }
            Err(e @ ConsensusError::ConsensusFailure { .. }) => {
                metrics.record_failure(latency);
                warn!("❌ {}", e);
                info!(
                    target: "consensus",
                    "EVENT:CONSENSUS_FAILURE height={} attempts={} leader={}",
                    height, progress.attempts, leader
                );
                self.cluster.events().publish(ConsensusEvent::ConsensusFailed {
                    height,
                    attempts: progress.attempts,
                    reason: e.to_string(),
                });
                if let Some(reason) = self.rotation.on_failure() {
                    self.rotate_for(reason);
                }
                Ok(BlockResult {
                    success: false,
                    height,
                    block_hash: progress.block_hash,
                    latency,
                    attempts: progress.attempts,
                    path: None,
                    fell_back: progress.fell_back,
                    error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn rotate_for(&mut self, reason: RotationReason) {
        self.rotation.reset();
        self.cluster.rotate_leader_for(reason);
    }

    /// Fast attempt first (when asked for), then up to `1 + proposal_retries`
    /// slow attempts on the same block.
    async fn drive(
        &mut self,
        leader: NodeId,
        transactions: TransactionBatch,
        variant: ProtocolVariant,
        progress: &mut Progress,
    ) -> Result<ProtocolVariant> {
        let proposed = self.cluster.propose(leader, transactions)?;
        let block = self.cluster.admit_candidate(proposed, &self.detector)?;
        progress.block_hash = Some(block.hash().to_string());

        if variant == ProtocolVariant::Fast {
            progress.attempts += 1;
            match self.run_attempt(&block, ProtocolVariant::Fast).await {
                Ok(qc) => {
                    self.cluster.commit(&block, &qc)?;
                    return Ok(ProtocolVariant::Fast);
                }
                Err(e) if e.is_phase_failure() => {
                    self.cluster.metrics().record_fallback();
                    progress.fell_back = true;
                    info!("↪️ Fast path failed for {} ({}), falling back", block.short_hash(), e);
                }
                Err(e) => return Err(e),
            }
        }

        let slow_attempts = 1 + self.cluster.config().proposal_retries;
        let mut last_failure = None;
        for _ in 0..slow_attempts {
            progress.attempts += 1;
            match self.run_attempt(&block, ProtocolVariant::Slow).await {
                Ok(qc) => {
                    self.cluster.commit(&block, &qc)?;
                    return Ok(ProtocolVariant::Slow);
                }
                Err(e) if e.is_phase_failure() => last_failure = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(ConsensusError::ConsensusFailure {
            height: block.height(),
            attempts: progress.attempts,
            reason: last_failure
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt ran".into()),
        })
    }

    /// Runs every phase of `variant` on a fresh registry. Returns the terminal QC.
    async fn run_attempt(&mut self, block: &Block, variant: ProtocolVariant) -> Result<QuorumCertificate> {
        self.round += 1;
        let round = self.round;
        let nodes = self.cluster.node_ids();
        let view = self.cluster.view();
        let mut registry = VoteRegistry::new();

        let mut last = None;
        for &phase in variant.phases() {
            let outcome = self
                .executor
                .run_phase(&nodes, block, phase, view, round, &mut registry)
                .await;
            self.cluster.record_phase(block, &outcome);
            let qc = outcome.result?;
            self.cluster
                .apply_quorum_certificate(block, &qc, round, self.executor.network())?;
            last = Some(qc);
        }
        last.ok_or_else(|| ConsensusError::InvalidQuorumCertificate("no phase was run".into()))
    }

    pub async fn run(&mut self, limit: RunLimit) -> Result<RunSummary> {
        self.run_until(limit, None).await
    }

    /// Runs until `limit` is reached or `shutdown` fires. The signal is only
    /// checked between blocks.
    pub async fn run_until(
        &mut self,
        limit: RunLimit,
        mut shutdown: Option<oneshot::Receiver<()>>,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let mut results = Vec::new();
        let mut cancelled = false;

        info!(
            "▶️ Run {} started ({:?}, protocol {}, seed {})",
            self.cluster.events().run_id(),
            limit,
            self.cluster.config().protocol,
            self.seed
        );

        loop {
            let done = match limit {
                RunLimit::Blocks(n) => results.len() as u64 >= n,
                RunLimit::Duration(d) => started.elapsed() >= d,
            };
            if done {
                break;
            }
            if let Some(rx) = shutdown.as_mut() {
                match rx.try_recv() {
                    Ok(()) => {
                        info!("🛑 Shutdown requested after {} blocks", results.len());
                        cancelled = true;
                        break;
                    }
                    Err(TryRecvError::Closed) => shutdown = None,
                    Err(TryRecvError::Empty) => {}
                }
            }
            results.push(self.step().await?);
        }

        let (consistent, inconsistency) = self.cluster.consistency();
        if !consistent {
            warn!("🚨 Inconsistent logs: {:?}", inconsistency);
        }
        let metrics = self.metrics();
        info!(
            "🏁 Run finished: {} committed, {} failed, {:.1}% success",
            metrics.total_blocks,
            metrics.failed_proposals,
            metrics.success_rate() * 100.0
        );

        Ok(RunSummary {
            run_id: self.cluster.events().run_id(),
            protocol: self.cluster.config().protocol,
            results,
            metrics,
            consistent,
            inconsistency,
            cancelled,
        })
    }
}
