use std::collections::{BTreeMap, BTreeSet};

use quorum_common::{Block, NodeId, QuorumCertificate, GENESIS_PARENT};

use crate::consensus::speculative::SpeculativeTracker;

/// A replica of the simulated cluster.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub is_leader: bool,
    pub current_view: u64,
    /// Committed blocks, index == height.
    pub(crate) log: Vec<Block>,
    pub locked_qc: Option<QuorumCertificate>,
    pub prepare_qc: Option<QuorumCertificate>,
    pub finality: SpeculativeTracker,
    /// Candidates seen but not yet committed, by height.
    observed: BTreeMap<u64, BTreeSet<String>>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            is_leader: false,
            current_view: 0,
            log: Vec::new(),
            locked_qc: None,
            prepare_qc: None,
            finality: SpeculativeTracker::new(),
            observed: BTreeMap::new(),
        }
    }

    pub fn log(&self) -> &[Block] {
        &self.log
    }

    pub fn tip(&self) -> Option<&Block> {
        self.log.last()
    }

    /// Height the next committed block must have.
    pub fn next_height(&self) -> u64 {
        self.log.len() as u64
    }

    /// Parent hash for the next block on this node's chain.
    pub fn tip_hash(&self) -> &str {
        self.tip().map(|b| b.hash()).unwrap_or(GENESIS_PARENT)
    }

    pub fn observe(&mut self, height: u64, hash: &str) {
        self.observed.entry(height).or_default().insert(hash.to_string());
    }

    pub fn forget(&mut self, height: u64, hash: &str) {
        if let Some(set) = self.observed.get_mut(&height) {
            set.remove(hash);
            if set.is_empty() {
                self.observed.remove(&height);
            }
        }
    }

    /// Whether this node has seen a different candidate at `height` or above.
    pub fn conflicts_with(&self, height: u64, hash: &str) -> bool {
        self.observed
            .range(height..)
            .any(|(_, hashes)| hashes.iter().any(|h| h != hash))
    }

    pub fn prune_observed(&mut self, through: u64) {
        self.observed = self.observed.split_off(&(through + 1));
    }

    /// Adopts `qc` as the lock if it ranks above the current one.
    pub fn lock(&mut self, qc: &QuorumCertificate) -> bool {
        let replace = match &self.locked_qc {
            None => true,
            Some(current) => qc.rank() > current.rank() || current.block_hash == qc.block_hash,
        };
        if replace {
            self.locked_qc = Some(qc.clone());
        }
        replace
    }

    /// Drops a lock made obsolete by a commit at or above its height.
    pub fn release_stale_lock(&mut self, committed_height: u64) {
        if matches!(&self.locked_qc, Some(qc) if qc.height <= committed_height) {
            self.locked_qc = None;
        }
    }
}
