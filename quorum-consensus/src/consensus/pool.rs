use std::collections::BTreeMap;

use tracing::warn;

use quorum_common::Block;

/// A pending block and the voting history recorded for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub block: Block,
    /// Votes recorded for this block across all attempts.
    pub votes: usize,
    /// Covered by a lock held by some node.
    pub locked: bool,
}

impl Candidate {
    pub fn new(block: Block) -> Self {
        Self {
            block,
            votes: 0,
            locked: false,
        }
    }

    pub fn hash(&self) -> &str {
        self.block.hash()
    }
}

/// Stores pending candidate blocks in memory, grouped by height.
#[derive(Debug, Default, Clone)]
pub struct CandidatePool {
    by_height: BTreeMap<u64, Vec<Candidate>>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self {
            by_height: BTreeMap::new(),
        }
    }

    /// Adds a candidate. Returns false if the same hash is already pending.
    pub fn add(&mut self, block: Block) -> bool {
        if self.contains(block.hash()) {
            warn!("⚠️ Candidate {} already in pool", block.short_hash());
            return false;
        }
        self.by_height
            .entry(block.height())
            .or_default()
            .push(Candidate::new(block));
        true
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.find(hash).is_some()
    }

    pub fn find(&self, hash: &str) -> Option<&Candidate> {
        self.by_height.values().flatten().find(|c| c.hash() == hash)
    }

    fn find_mut(&mut self, hash: &str) -> Option<&mut Candidate> {
        self.by_height
            .values_mut()
            .flatten()
            .find(|c| c.hash() == hash)
    }

    pub fn block(&self, hash: &str) -> Option<&Block> {
        self.find(hash).map(|c| &c.block)
    }

    pub fn record_votes(&mut self, hash: &str, votes: usize) {
        if let Some(c) = self.find_mut(hash) {
            c.votes += votes;
        }
    }

    pub fn mark_locked(&mut self, hash: &str) {
        if let Some(c) = self.find_mut(hash) {
            c.locked = true;
        }
    }

    pub fn candidates(&self, height: u64) -> &[Candidate] {
        self.by_height
            .get(&height)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn remove(&mut self, hash: &str) -> Option<Candidate> {
        let mut removed = None;
        for list in self.by_height.values_mut() {
            if let Some(pos) = list.iter().position(|c| c.hash() == hash) {
                removed = Some(list.remove(pos));
                break;
            }
        }
        self.by_height.retain(|_, list| !list.is_empty());
        removed
    }

    /// Drops every candidate at or below `height`, returning them.
    pub fn prune_through(&mut self, height: u64) -> Vec<Candidate> {
        let keep = self.by_height.split_off(&(height + 1));
        let pruned = std::mem::replace(&mut self.by_height, keep);
        pruned.into_values().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.by_height.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_height.is_empty()
    }
}
