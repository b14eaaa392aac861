use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Voting phases of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConsensusPhase {
    /// Nodes vote on the validity of the proposal.
    Prepare,
    /// Nodes confirm they have seen a PREPARE quorum and lock on the block.
    PreCommit,
    /// Nodes vote to commit the block.
    Commit,
    /// Terminal phase: a quorum here triggers the cluster-wide commit.
    Decide,
    /// Combined PREPARE + PRE-COMMIT round used by the fast path.
    FastPrepare,
}

impl ConsensusPhase {
    /// A QC for this phase certifies that a quorum prepared the block.
    pub fn certifies_prepare(&self) -> bool {
        matches!(self, ConsensusPhase::Prepare | ConsensusPhase::FastPrepare)
    }

    /// Voters lock on the block once a QC for this phase exists.
    pub fn locks(&self) -> bool {
        matches!(self, ConsensusPhase::PreCommit | ConsensusPhase::FastPrepare)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsensusPhase::Decide)
    }
}

impl Default for ConsensusPhase {
    fn default() -> Self {
        Self::Prepare
    }
}

impl fmt::Display for ConsensusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsensusPhase::Prepare => "PREPARE",
            ConsensusPhase::PreCommit => "PRE-COMMIT",
            ConsensusPhase::Commit => "COMMIT",
            ConsensusPhase::Decide => "DECIDE",
            ConsensusPhase::FastPrepare => "PREPARE+PRE-COMMIT",
        };
        write!(f, "{}", s)
    }
}

/// Protocol variant used for a block attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Classic four-phase path.
    Slow,
    /// Combined first round, falling back to `Slow` on a missed quorum.
    Fast,
}

const SLOW_PHASES: [ConsensusPhase; 4] = [
    ConsensusPhase::Prepare,
    ConsensusPhase::PreCommit,
    ConsensusPhase::Commit,
    ConsensusPhase::Decide,
];

const FAST_PHASES: [ConsensusPhase; 3] = [
    ConsensusPhase::FastPrepare,
    ConsensusPhase::Commit,
    ConsensusPhase::Decide,
];

impl ProtocolVariant {
    /// Phases run in order for one attempt of this variant.
    pub fn phases(&self) -> &'static [ConsensusPhase] {
        match self {
            ProtocolVariant::Slow => &SLOW_PHASES,
            ProtocolVariant::Fast => &FAST_PHASES,
        }
    }
}

impl Default for ProtocolVariant {
    fn default() -> Self {
        Self::Slow
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVariant::Slow => write!(f, "slow"),
            ProtocolVariant::Fast => write!(f, "fast"),
        }
    }
}

/// Outcome of driving one proposal through the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockResult {
    /// Whether the block was committed on every node.
    pub success: bool,

    /// Height the proposal targeted.
    pub height: u64,

    /// Hash of the canonical candidate that was voted on.
    pub block_hash: Option<String>,

    /// Time from proposal start to commit or failure.
    pub latency: Duration,

    /// Number of voting attempts, fast-path attempt included.
    pub attempts: u32,

    /// Variant that produced the terminal QC, when the block committed.
    pub path: Option<ProtocolVariant>,

    /// Whether a fast-path attempt fell back to the slow path.
    #[serde(default)]
    pub fell_back: bool,

    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_phases() {
        assert_eq!(ProtocolVariant::Slow.phases().len(), 4);
        assert_eq!(ProtocolVariant::Fast.phases()[0], ConsensusPhase::FastPrepare);
        assert!(ProtocolVariant::Slow.phases().last().unwrap().is_terminal());
        assert!(ProtocolVariant::Fast.phases().last().unwrap().is_terminal());
    }

    #[test]
    fn test_phase_roles() {
        assert!(ConsensusPhase::Prepare.certifies_prepare());
        assert!(ConsensusPhase::FastPrepare.certifies_prepare());
        assert!(ConsensusPhase::FastPrepare.locks());
        assert!(ConsensusPhase::PreCommit.locks());
        assert!(!ConsensusPhase::Commit.locks());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ConsensusPhase::PreCommit.to_string(), "PRE-COMMIT");
        assert_eq!(ConsensusPhase::FastPrepare.to_string(), "PREPARE+PRE-COMMIT");
    }
}
