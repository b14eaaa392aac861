use tracing::{debug, info, warn};

use quorum_common::{
    error::{ConsensusError, Result},
    utils::time::current_time_millis,
    Block, NodeId, TransactionBatch,
};

use crate::{
    cluster::core::Cluster,
    consensus::fork::TailForkDetector,
    events::ConsensusEvent,
};

/// Builds a candidate block. Pure: the caller decides what to do with it.
pub fn build_block(
    height: u64,
    parent_hash: &str,
    proposer: NodeId,
    view: u64,
    timestamp: i64,
    transactions: TransactionBatch,
) -> Block {
    Block::new(height, parent_hash, proposer, view, timestamp, transactions)
}

impl Cluster {
    /// Builds the next block on `proposer`'s chain.
    ///
    /// Only the current leader may propose. A leader locked on an uncommitted
    /// block at the next height proposes that block again instead of a new one.
    pub fn propose(&self, proposer: NodeId, transactions: TransactionBatch) -> Result<Block> {
        if proposer != self.leader {
            return Err(ConsensusError::NotLeader {
                node: proposer,
                leader: self.leader,
            });
        }
        let node = self.node(proposer).ok_or_else(|| {
            ConsensusError::Configuration(format!("{} is not a member of the cluster", proposer))
        })?;
        let height = node.next_height();

        if let Some(lock) = &node.locked_qc {
            if lock.height == height {
                let block = self.pool.block(&lock.block_hash).ok_or_else(|| {
                    ConsensusError::LockedQcConflict(format!(
                        "locked block {} at height {} is no longer available",
                        lock.block_hash, height
                    ))
                })?;
                info!(
                    "🔒 {} re-proposes locked block {} at height {}",
                    proposer,
                    block.short_hash(),
                    height
                );
                self.announce(block);
                return Ok(block.clone());
            }

            let on_chain = node
                .log()
                .get(lock.height as usize)
                .map(|b| b.hash() == lock.block_hash)
                .unwrap_or(false);
            if !on_chain {
                return Err(ConsensusError::LockedQcConflict(format!(
                    "{} is locked on {} at height {}, which does not extend its chain",
                    proposer, lock.block_hash, lock.height
                )));
            }
        }

        let block = build_block(
            height,
            node.tip_hash(),
            proposer,
            self.view,
            current_time_millis(),
            transactions,
        );
        self.announce(&block);
        Ok(block)
    }

    fn announce(&self, block: &Block) {
        info!(
            target: "consensus",
            "EVENT:PROPOSE height={} block={} proposer={} view={}",
            block.height(),
            block.short_hash(),
            block.proposer(),
            block.view()
        );
        self.events.publish(ConsensusEvent::BlockProposed {
            height: block.height(),
            block_hash: block.hash().to_string(),
            proposer: block.proposer(),
            view: block.view(),
        });
    }

    /// Broadcasts a candidate to every node and runs tail-fork detection at its
    /// height. Returns the block that voting must proceed on.
    pub fn admit_candidate(&mut self, block: Block, detector: &TailForkDetector) -> Result<Block> {
        if !block.verify_hash() {
            return Err(ConsensusError::InvalidBlock(format!(
                "hash of {} does not match its content",
                block.short_hash()
            )));
        }
        let height = self.height();
        if block.height() != height || block.parent_hash() != self.nodes[0].tip_hash() {
            return Err(ConsensusError::InvalidBlock(format!(
                "{} at height {} does not extend the committed tip at height {}",
                block.short_hash(),
                block.height(),
                height
            )));
        }

        self.pool.add(block.clone());
        for node in &mut self.nodes {
            node.observe(height, block.hash());
        }

        if !self.config.tail_fork_prevention_enabled {
            return Ok(block);
        }

        let resolution = detector.resolve(height, self.pool.candidates(height));
        match resolution {
            Some(resolution) => {
                for hash in &resolution.discarded {
                    self.pool.remove(hash);
                    for node in &mut self.nodes {
                        node.forget(height, hash);
                    }
                    self.revert_everywhere(height, hash);
                }
                self.metrics.record_fork_prevented();

                info!(
                    target: "consensus",
                    "EVENT:FORK_RESOLVED height={} canonical={} discarded={}",
                    height,
                    resolution.canonical,
                    resolution.discarded.len()
                );
                warn!(
                    "🍴 Tail fork at height {}: keeping {}, discarding {:?}",
                    height, resolution.canonical, resolution.discarded
                );

                let canonical = self.pool.block(&resolution.canonical).cloned().ok_or_else(|| {
                    ConsensusError::InvalidBlock(format!(
                        "canonical candidate {} vanished from the pool",
                        resolution.canonical
                    ))
                })?;
                self.events.publish(ConsensusEvent::ForkResolved {
                    height,
                    canonical: resolution.canonical,
                    discarded: resolution.discarded,
                });
                Ok(canonical)
            }
            None => {
                // Unvoted leftovers of earlier attempts are not a fork; drop them.
                let stale: Vec<String> = self
                    .pool
                    .candidates(height)
                    .iter()
                    .filter(|c| c.votes == 0 && !c.locked && c.hash() != block.hash())
                    .map(|c| c.hash().to_string())
                    .collect();
                for hash in stale {
                    debug!("🧹 Pruning stale candidate {} at height {}", hash, height);
                    self.pool.remove(&hash);
                    for node in &mut self.nodes {
                        node.forget(height, &hash);
                    }
                }
                Ok(block)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use quorum_common::{ConsensusPhase, QuorumCertificate, Vote, GENESIS_PARENT};

    fn cluster(n: usize) -> Cluster {
        Cluster::new(ClusterConfig::with_nodes(n)).unwrap()
    }

    fn qc(block: &Block, phase: ConsensusPhase, voters: usize) -> QuorumCertificate {
        let votes = (0..voters)
            .map(|n| Vote::new(NodeId(n), block.hash(), phase).unwrap())
            .collect();
        QuorumCertificate::form(block, phase, 0, votes, voters).unwrap()
    }

    #[test]
    fn test_build_block_is_deterministic() {
        let a = build_block(0, GENESIS_PARENT, NodeId(1), 0, 42, TransactionBatch::new(vec![7]));
        let b = build_block(0, GENESIS_PARENT, NodeId(1), 0, 42, TransactionBatch::new(vec![7]));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_only_leader_proposes() {
        let cluster = cluster(4);
        let err = cluster.propose(NodeId(2), TransactionBatch::default()).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::NotLeader { node: NodeId(2), leader: NodeId(0) }
        ));

        let block = cluster.propose(NodeId(0), TransactionBatch::default()).unwrap();
        assert_eq!(block.height(), 0);
        assert_eq!(block.parent_hash(), GENESIS_PARENT);
        assert!(cluster.pool().is_empty());
    }

    #[test]
    fn test_proposal_extends_tip() {
        let mut cluster = cluster(4);
        let first = cluster.propose(NodeId(0), TransactionBatch::default()).unwrap();
        cluster.commit(&first, &qc(&first, ConsensusPhase::Decide, 3)).unwrap();

        let second = cluster.propose(NodeId(0), TransactionBatch::default()).unwrap();
        assert_eq!(second.height(), 1);
        assert_eq!(second.parent_hash(), first.hash());
    }

    #[test]
    fn test_locked_block_is_reproposed() {
        let mut cluster = cluster(4);
        let detector = TailForkDetector::new();
        let first = build_block(0, GENESIS_PARENT, NodeId(0), 0, 1, TransactionBatch::default());
        cluster.admit_candidate(first.clone(), &detector).unwrap();
        cluster.nodes[0].lock(&qc(&first, ConsensusPhase::PreCommit, 3));

        let again = cluster.propose(NodeId(0), TransactionBatch::new(vec![1, 2])).unwrap();
        assert_eq!(again.hash(), first.hash());
    }

    #[test]
    fn test_lock_off_chain_is_a_conflict() {
        let mut cluster = cluster(4);
        let committed = build_block(0, GENESIS_PARENT, NodeId(0), 0, 1, TransactionBatch::default());
        cluster.commit(&committed, &qc(&committed, ConsensusPhase::Decide, 3)).unwrap();

        let foreign = build_block(0, GENESIS_PARENT, NodeId(3), 0, 2, TransactionBatch::default());
        cluster.nodes[0].locked_qc = Some(qc(&foreign, ConsensusPhase::PreCommit, 3));

        let err = cluster.propose(NodeId(0), TransactionBatch::default()).unwrap_err();
        assert!(matches!(err, ConsensusError::LockedQcConflict(_)));
    }

    #[test]
    fn test_voted_candidate_beats_late_rival() {
        let mut cluster = cluster(4);
        let detector = TailForkDetector::new();
        let old = build_block(0, GENESIS_PARENT, NodeId(0), 0, 1, TransactionBatch::default());
        cluster.admit_candidate(old.clone(), &detector).unwrap();
        cluster.pool.record_votes(old.hash(), 2);

        let rival = build_block(0, GENESIS_PARENT, NodeId(0), 1, 2, TransactionBatch::default());
        let chosen = cluster.admit_candidate(rival.clone(), &detector).unwrap();

        assert_eq!(chosen.hash(), old.hash());
        assert!(!cluster.pool().contains(rival.hash()));
        assert_eq!(cluster.metrics().snapshot().forks_prevented, 1);
        assert!(!cluster.nodes()[1].conflicts_with(0, old.hash()));
    }

    #[test]
    fn test_stale_unvoted_candidate_is_pruned() {
        let mut cluster = cluster(4);
        let detector = TailForkDetector::new();
        let old = build_block(0, GENESIS_PARENT, NodeId(0), 0, 1, TransactionBatch::default());
        let new = build_block(0, GENESIS_PARENT, NodeId(0), 0, 2, TransactionBatch::default());
        cluster.admit_candidate(old.clone(), &detector).unwrap();
        let chosen = cluster.admit_candidate(new.clone(), &detector).unwrap();

        assert_eq!(chosen.hash(), new.hash());
        assert_eq!(cluster.pool().len(), 1);
        assert_eq!(cluster.metrics().snapshot().forks_prevented, 0);
    }

    #[test]
    fn test_disabled_prevention_keeps_rivals() {
        let config = ClusterConfig {
            tail_fork_prevention_enabled: false,
            ..ClusterConfig::with_nodes(4)
        };
        let mut cluster = Cluster::new(config).unwrap();
        let detector = TailForkDetector::new();
        let old = build_block(0, GENESIS_PARENT, NodeId(0), 0, 1, TransactionBatch::default());
        cluster.admit_candidate(old.clone(), &detector).unwrap();
        cluster.pool.record_votes(old.hash(), 2);

        let rival = build_block(0, GENESIS_PARENT, NodeId(0), 0, 2, TransactionBatch::default());
        let chosen = cluster.admit_candidate(rival.clone(), &detector).unwrap();

        assert_eq!(chosen.hash(), rival.hash());
        assert_eq!(cluster.pool().len(), 2);
        assert!(cluster.nodes()[0].conflicts_with(0, rival.hash()));
    }

    #[test]
    fn test_rejects_candidate_off_tip() {
        let mut cluster = cluster(4);
        let detector = TailForkDetector::new();
        let wrong = build_block(3, "elsewhere", NodeId(0), 0, 1, TransactionBatch::default());
        assert!(matches!(
            cluster.admit_candidate(wrong, &detector),
            Err(ConsensusError::InvalidBlock(_))
        ));
    }
}
