use std::{sync::Arc, time::Duration};

use rand::Rng;

use quorum_common::NodeId;

use super::decider::Ballot;
use crate::config::{NetworkConfig, NetworkProfile};

/// Simulated delivery conditions seen by the voting fan-out and the
/// speculative finality check.
pub trait NetworkModel: Send + Sync {
    /// Time a vote takes to reach the collector.
    fn vote_delay(&self, ballot: &Ballot) -> Duration;

    /// Whether `node` currently sees a stable network at `height`.
    fn is_stable(&self, node: NodeId, height: u64, round: u64) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdealNetwork;

impl NetworkModel for IdealNetwork {
    fn vote_delay(&self, _ballot: &Ballot) -> Duration {
        Duration::ZERO
    }

    fn is_stable(&self, _node: NodeId, _height: u64, _round: u64) -> bool {
        true
    }
}

/// Seeded delay, jitter and stability probes.
#[derive(Debug, Clone)]
pub struct SimulatedNetwork {
    base_delay: Duration,
    jitter: Duration,
    stability_probability: f64,
    seed: u64,
}

impl SimulatedNetwork {
    pub fn new(base_delay: Duration, jitter: Duration, stability_probability: f64, seed: u64) -> Self {
        Self {
            base_delay,
            jitter,
            stability_probability: stability_probability.clamp(0.0, 1.0),
            seed,
        }
    }

    pub fn from_config(config: &NetworkConfig, seed: u64) -> Self {
        Self::new(
            Duration::from_millis(config.delay_ms),
            Duration::from_millis(config.jitter_ms),
            config.stability_probability,
            seed,
        )
    }
}

impl NetworkModel for SimulatedNetwork {
    fn vote_delay(&self, ballot: &Ballot) -> Duration {
        let jitter_us = self.jitter.as_micros() as u64;
        if jitter_us == 0 {
            return self.base_delay;
        }
        let extra = ballot.rng(self.seed, b"delay").gen_range(0..=jitter_us);
        self.base_delay + Duration::from_micros(extra)
    }

    fn is_stable(&self, node: NodeId, height: u64, round: u64) -> bool {
        let probe = Ballot {
            node,
            height,
            phase: Default::default(),
            round,
            view: 0,
        };
        probe
            .rng(self.seed, b"stability")
            .gen_bool(self.stability_probability)
    }
}

pub fn from_config(config: &NetworkConfig, seed: u64) -> Arc<dyn NetworkModel> {
    match config.profile {
        NetworkProfile::Ideal => Arc::new(IdealNetwork),
        NetworkProfile::Simulated => Arc::new(SimulatedNetwork::from_config(config, seed)),
    }
}
