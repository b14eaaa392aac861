use std::{collections::BTreeSet, sync::Arc};

use tracing::{info, warn};

use quorum_common::{
    error::{ConsensusError, Result},
    Block, NodeId, QuorumCertificate, GENESIS_PARENT,
};

use super::node::Node;
use crate::{
    config::ClusterConfig,
    consensus::pool::CandidatePool,
    events::{ConsensusEvent, EventBus},
    metrics::Metrics,
};

/// The simulated cluster: every node, the leader pointer and the current view.
///
/// Owned by a single driver. All mutation goes through `&mut self`, so a block
/// is either appended to every node's log or to none of them.
#[derive(Debug)]
pub struct Cluster {
    pub(crate) config: ClusterConfig,
    pub(crate) nodes: Vec<Node>,
    pub(crate) leader: NodeId,
    pub(crate) view: u64,
    pub(crate) pool: CandidatePool,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) events: EventBus,
    /// (height, hash) of blocks already counted as speculatively final.
    pub(crate) speculated: BTreeSet<(u64, String)>,
}

impl Cluster {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;

        let mut nodes: Vec<Node> = (0..config.node_count).map(|i| Node::new(NodeId(i))).collect();
        nodes[0].is_leader = true;

        info!(
            "🚀 Cluster ready: {} nodes, quorum {}, tolerates {} faulty",
            config.node_count,
            config.quorum_size(),
            config.fault_tolerance()
        );

        Ok(Self {
            config,
            nodes,
            leader: NodeId(0),
            view: 0,
            pool: CandidatePool::new(),
            metrics: Arc::new(Metrics::new()),
            events: EventBus::new(),
            speculated: BTreeSet::new(),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    pub fn leader(&self) -> NodeId {
        self.leader
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    pub fn quorum_size(&self) -> usize {
        self.config.quorum_size()
    }

    /// Number of committed blocks, which is also the next height.
    pub fn height(&self) -> u64 {
        self.nodes[0].next_height()
    }

    pub fn pool(&self) -> &CandidatePool {
        &self.pool
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Compares every node's log against node 0 and checks node 0's chain linkage.
    pub fn verify_consistency(&self) -> Result<()> {
        let reference = &self.nodes[0];
        let mut parent = GENESIS_PARENT;
        for (i, block) in reference.log.iter().enumerate() {
            let height = i as u64;
            let reason = if block.height() != height {
                Some(format!("block at index {} claims height {}", i, block.height()))
            } else if block.parent_hash() != parent {
                Some(format!(
                    "parent {} does not match previous hash {}",
                    block.parent_hash(),
                    parent
                ))
            } else if !block.verify_hash() {
                Some(format!("hash of {} does not match its content", block.short_hash()))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ConsensusError::InconsistentLog {
                    node: reference.id,
                    height,
                    reason,
                });
            }
            parent = block.hash();
        }

        for node in &self.nodes[1..] {
            if node.log.len() != reference.log.len() {
                return Err(ConsensusError::InconsistentLog {
                    node: node.id,
                    height: node.log.len().min(reference.log.len()) as u64,
                    reason: format!(
                        "log length {} differs from {}'s {}",
                        node.log.len(),
                        reference.id,
                        reference.log.len()
                    ),
                });
            }
            for (i, (ours, theirs)) in node.log.iter().zip(&reference.log).enumerate() {
                if ours.hash() != theirs.hash() {
                    return Err(ConsensusError::InconsistentLog {
                        node: node.id,
                        height: i as u64,
                        reason: format!("hash {} differs from {}", ours.short_hash(), theirs.short_hash()),
                    });
                }
            }
        }
        Ok(())
    }

    /// `(consistent, first divergence)`.
    pub fn consistency(&self) -> (bool, Option<String>) {
        match self.verify_consistency() {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        }
    }

    /// Appends `block` to every node's log, justified by a terminal `qc`.
    ///
    /// Everything is checked against every node before the first log is touched.
    pub fn commit(&mut self, block: &Block, qc: &QuorumCertificate) -> Result<()> {
        if !qc.phase.is_terminal() {
            return Err(ConsensusError::InvalidQuorumCertificate(format!(
                "{} certificate cannot commit a block",
                qc.phase
            )));
        }
        if !qc.certifies(block.hash()) {
            return Err(ConsensusError::InvalidQuorumCertificate(format!(
                "certificate is for {}, not {}",
                qc.block_hash,
                block.hash()
            )));
        }
        qc.validate(self.quorum_size())?;
        if !block.verify_hash() {
            return Err(ConsensusError::InvalidBlock(format!(
                "hash of {} does not match its content",
                block.short_hash()
            )));
        }
        for node in &self.nodes {
            if block.height() != node.next_height() {
                return Err(ConsensusError::InconsistentLog {
                    node: node.id,
                    height: block.height(),
                    reason: format!("expected height {}", node.next_height()),
                });
            }
            if block.parent_hash() != node.tip_hash() {
                return Err(ConsensusError::InconsistentLog {
                    node: node.id,
                    height: block.height(),
                    reason: format!("parent {} is not the tip {}", block.parent_hash(), node.tip_hash()),
                });
            }
        }

        let height = block.height();
        let mut conflicting = BTreeSet::new();
        for node in &mut self.nodes {
            node.log.push(block.clone());
            node.finality.finalize(block);
            for hash in node.finality.speculative_at(height) {
                if hash != block.hash() {
                    conflicting.insert(hash);
                }
            }
            node.prune_observed(height);
            node.release_stale_lock(height);
        }
        for hash in conflicting {
            warn!("↩️ Speculative block {} lost to {} at height {}", hash, block.short_hash(), height);
            self.revert_everywhere(height, &hash);
        }
        self.pool.prune_through(height);
        self.speculated = self.speculated.split_off(&(height + 1, String::new()));

        info!(target: "consensus", "EVENT:COMMIT height={} block={} view={}", height, block.short_hash(), self.view);
        Ok(())
    }

    /// Reverts a speculative block on every node. Counted once per block.
    pub(crate) fn revert_everywhere(&mut self, height: u64, hash: &str) -> bool {
        let mut reverted = false;
        for node in &mut self.nodes {
            reverted |= node.finality.revert(hash);
        }
        if reverted {
            self.metrics.record_speculative_revert();
            self.events.publish(ConsensusEvent::SpeculativeReverted {
                height,
                block_hash: hash.to_string(),
            });
        }
        reverted
    }
}
