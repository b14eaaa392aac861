use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use quorum_common::{
    error::{ConsensusError, Result},
    utils::time::current_time_millis,
    Block, QuorumCertificate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FinalityState {
    Uncommitted,
    Speculative,
    Final,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalityRecord {
    pub state: FinalityState,
    pub height: u64,
    /// The QC that justified the speculative mark.
    pub proof: Option<QuorumCertificate>,
    pub updated_at: i64,
}

/// Inputs of the speculative check that come from outside the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeculationCheck {
    pub network_stable: bool,
    pub conflict_observed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeculationOutcome {
    Marked,
    AlreadySpeculative,
    Unstable,
    Conflict,
    /// The block is already final or reverted.
    NotEligible,
}

/// Per-node finality state of blocks, keyed by block hash.
#[derive(Debug, Clone, Default)]
pub struct SpeculativeTracker {
    records: HashMap<String, FinalityRecord>,
}

impl SpeculativeTracker {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    pub fn state(&self, hash: &str) -> FinalityState {
        self.records
            .get(hash)
            .map(|r| r.state)
            .unwrap_or(FinalityState::Uncommitted)
    }

    pub fn record(&self, hash: &str) -> Option<&FinalityRecord> {
        self.records.get(hash)
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &FinalityRecord)> {
        self.records.iter().map(|(h, r)| (h.as_str(), r))
    }

    pub fn is_speculative(&self, hash: &str) -> bool {
        self.state(hash) == FinalityState::Speculative
    }

    /// Hashes currently speculative at `height`.
    pub fn speculative_at(&self, height: u64) -> Vec<String> {
        let mut hashes: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.height == height && r.state == FinalityState::Speculative)
            .map(|(h, _)| h.clone())
            .collect();
        hashes.sort();
        hashes
    }

    /// Attempts `UNCOMMITTED -> SPECULATIVE`.
    ///
    /// Fails outright if `qc` is not a valid certificate for `block`: a block
    /// is never marked speculative without one.
    pub fn try_mark(
        &mut self,
        block: &Block,
        qc: &QuorumCertificate,
        quorum_size: usize,
        check: SpeculationCheck,
    ) -> Result<SpeculationOutcome> {
        if !qc.certifies(block.hash()) || qc.height != block.height() {
            return Err(ConsensusError::InvalidQuorumCertificate(format!(
                "certificate for {} cannot justify {}",
                qc.block_hash,
                block.hash()
            )));
        }
        qc.validate(quorum_size)?;

        match self.state(block.hash()) {
            FinalityState::Uncommitted => {}
            FinalityState::Speculative => return Ok(SpeculationOutcome::AlreadySpeculative),
            FinalityState::Final | FinalityState::Reverted => {
                return Ok(SpeculationOutcome::NotEligible)
            }
        }
        if !check.network_stable {
            return Ok(SpeculationOutcome::Unstable);
        }
        if check.conflict_observed {
            return Ok(SpeculationOutcome::Conflict);
        }

        self.records.insert(
            block.hash().to_string(),
            FinalityRecord {
                state: FinalityState::Speculative,
                height: block.height(),
                proof: Some(qc.clone()),
                updated_at: current_time_millis(),
            },
        );
        debug!("⚡ Block {} speculatively final", block.short_hash());
        Ok(SpeculationOutcome::Marked)
    }

    /// Marks a committed block final. Returns true if it was speculative before.
    pub fn finalize(&mut self, block: &Block) -> bool {
        let was_speculative = self.is_speculative(block.hash());
        let proof = self.records.get(block.hash()).and_then(|r| r.proof.clone());
        self.records.insert(
            block.hash().to_string(),
            FinalityRecord {
                state: FinalityState::Final,
                height: block.height(),
                proof,
                updated_at: current_time_millis(),
            },
        );
        was_speculative
    }

    /// `SPECULATIVE -> REVERTED`. Any other state is left untouched.
    pub fn revert(&mut self, hash: &str) -> bool {
        match self.records.get_mut(hash) {
            Some(r) if r.state == FinalityState::Speculative => {
                r.state = FinalityState::Reverted;
                r.updated_at = current_time_millis();
                true
            }
            _ => false,
        }
    }
}
