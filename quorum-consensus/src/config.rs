use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::warn;

use quorum_common::{
    error::{ConsensusError, Result},
    ProtocolVariant,
};

/// How per-vote delivery and network stability are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProfile {
    /// No delay, every stability probe passes.
    Ideal,
    /// Seeded delay, jitter and stability probes.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub profile: NetworkProfile,
    /// Base delivery delay applied to every vote.
    pub delay_ms: u64,
    /// Upper bound of the extra per-vote delay.
    pub jitter_ms: u64,
    /// A vote not delivered within this bound counts as not cast.
    pub phase_timeout_ms: u64,
    /// Probability that a node's stability probe passes.
    pub stability_probability: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            profile: NetworkProfile::Simulated,
            delay_ms: 5,
            jitter_ms: 2,
            phase_timeout_ms: 200,
            stability_probability: 0.95,
        }
    }
}

impl NetworkConfig {
    pub fn ideal() -> Self {
        Self {
            profile: NetworkProfile::Ideal,
            delay_ms: 0,
            jitter_ms: 0,
            stability_probability: 1.0,
            ..Self::default()
        }
    }
}

/// Cluster and protocol settings supplied by the harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub node_count: usize,
    /// Overrides the derived `floor(2n/3) + 1` quorum. Must still exceed `2n/3`.
    pub quorum_size: Option<usize>,
    pub participation_probability: f64,
    pub tail_fork_prevention_enabled: bool,
    pub speculative_finality_enabled: bool,
    /// Committed blocks between scheduled rotations. 0 disables them.
    pub rotation_interval: u64,
    pub rotate_on_failure: bool,
    pub protocol: ProtocolVariant,
    /// Extra slow-path attempts on the same block before giving up on it.
    pub proposal_retries: u32,
    /// Highest-indexed nodes that never vote.
    pub faulty_nodes: usize,
    pub seed: Option<u64>,
    pub network: NetworkConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_count: 10,
            quorum_size: None,
            participation_probability: 0.9,
            tail_fork_prevention_enabled: true,
            speculative_finality_enabled: true,
            rotation_interval: 20,
            rotate_on_failure: true,
            protocol: ProtocolVariant::Fast,
            proposal_retries: 0,
            faulty_nodes: 0,
            seed: None,
            network: NetworkConfig::default(),
        }
    }
}

/// `floor(2n/3) + 1`.
pub fn bft_quorum(node_count: usize) -> usize {
    2 * node_count / 3 + 1
}

/// Largest number of faulty nodes `n` nodes tolerate.
pub fn max_faulty(node_count: usize) -> usize {
    node_count.saturating_sub(1) / 3
}

impl ClusterConfig {
    pub fn with_nodes(node_count: usize) -> Self {
        Self {
            node_count,
            ..Self::default()
        }
    }

    pub fn quorum_size(&self) -> usize {
        self.quorum_size.unwrap_or_else(|| bft_quorum(self.node_count))
    }

    pub fn fault_tolerance(&self) -> usize {
        max_faulty(self.node_count)
    }

    /// Rejects configurations under which nothing can run.
    pub fn validate(&self) -> Result<()> {
        if self.node_count < 1 {
            return Err(ConsensusError::Configuration(
                "node_count must be at least 1".into(),
            ));
        }

        let quorum = self.quorum_size();
        if quorum > self.node_count {
            return Err(ConsensusError::Configuration(format!(
                "quorum {} is unreachable with {} nodes",
                quorum, self.node_count
            )));
        }
        if 3 * quorum <= 2 * self.node_count {
            return Err(ConsensusError::Configuration(format!(
                "quorum {} does not exceed 2/3 of {} nodes",
                quorum, self.node_count
            )));
        }

        check_probability("participation_probability", self.participation_probability)?;
        check_probability(
            "network.stability_probability",
            self.network.stability_probability,
        )?;

        if self.faulty_nodes >= self.node_count {
            return Err(ConsensusError::Configuration(format!(
                "faulty_nodes ({}) must be lower than node_count ({})",
                self.faulty_nodes, self.node_count
            )));
        }
        if self.faulty_nodes > self.fault_tolerance() {
            warn!(
                "⚠️ {} faulty nodes exceed the tolerated f = {}; quorum may be unreachable",
                self.faulty_nodes,
                self.fault_tolerance()
            );
        }

        if self.network.phase_timeout_ms == 0 {
            return Err(ConsensusError::Configuration(
                "network.phase_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let parsed = serde_json::from_str::<ClusterConfig>(&data)?;
        Ok(parsed)
    }
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConsensusError::Configuration(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}
