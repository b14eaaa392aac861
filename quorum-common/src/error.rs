use thiserror::Error;

use crate::env::consensus::types::ConsensusPhase;
use crate::utils::NodeId;

/// Errors raised by the consensus simulation.
///
/// `PhaseQuorumFailure` is the only recoverable variant during a block attempt:
/// it drives the fast-path fallback and proposal retries. `ConsensusFailure` is
/// recorded and the run moves on to the next proposal. `InconsistentLog` signals
/// a safety bug and is never recovered from.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("phase {phase} missed quorum: {votes}/{required} votes")]
    PhaseQuorumFailure {
        phase: ConsensusPhase,
        votes: usize,
        required: usize,
    },

    #[error("consensus failed for height {height} after {attempts} attempt(s): {reason}")]
    ConsensusFailure {
        height: u64,
        attempts: u32,
        reason: String,
    },

    #[error("inconsistent log on {node} at height {height}: {reason}")]
    InconsistentLog {
        node: NodeId,
        height: u64,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("{node} is not the leader (current leader: {leader})")]
    NotLeader { node: NodeId, leader: NodeId },

    #[error("duplicate vote from {node} in phase {phase}")]
    DuplicateVote { node: NodeId, phase: ConsensusPhase },

    #[error("invalid quorum certificate: {0}")]
    InvalidQuorumCertificate(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("locked QC conflict: {0}")]
    LockedQcConflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ConsensusError {
    /// Whether the error only concerns a single phase attempt.
    pub fn is_phase_failure(&self) -> bool {
        matches!(self, ConsensusError::PhaseQuorumFailure { .. })
    }
}

impl From<serde_json::Error> for ConsensusError {
    fn from(e: serde_json::Error) -> Self {
        ConsensusError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for ConsensusError {
    fn from(e: bincode::Error) -> Self {
        ConsensusError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
