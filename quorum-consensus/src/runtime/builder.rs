use std::{sync::Arc, time::Duration};

use quorum_common::error::Result;

use super::{
    simulator::Simulator,
    transactions::{RandomBatches, TransactionSource},
};
use crate::{
    cluster::{core::Cluster, rotation::LeaderRotation},
    config::ClusterConfig,
    consensus::{
        decider::{self, VoteDecider},
        evaluator::QuorumPolicy,
        fork::TailForkDetector,
        network::{self, NetworkModel},
        phase::PhaseExecutor,
    },
    events::Subscriber,
};

const DEFAULT_TX_PER_BLOCK: usize = 8;
const DEFAULT_TX_SIZE: usize = 32;

/// Assembles a `Simulator`. Anything not supplied is derived from the config
/// and its seed.
#[derive(Default)]
pub struct SimulatorBuilder {
    config: Option<ClusterConfig>,
    decider: Option<Arc<dyn VoteDecider>>,
    network: Option<Arc<dyn NetworkModel>>,
    transactions: Option<Box<dyn TransactionSource>>,
    subscribers: Vec<Subscriber>,
}

impl SimulatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ClusterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the config-derived participation model, faulty nodes included.
    pub fn with_decider(mut self, decider: Arc<dyn VoteDecider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkModel>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_transactions(mut self, source: impl TransactionSource + 'static) -> Self {
        self.transactions = Some(Box::new(source));
        self
    }

    pub fn with_subscriber(mut self, subscriber: Subscriber) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn build(self) -> Result<Simulator> {
        let config = self.config.unwrap_or_default();
        let seed = config.seed.unwrap_or_else(rand::random);

        let mut cluster = Cluster::new(config.clone())?;
        for subscriber in self.subscribers {
            cluster.events_mut().subscribe(subscriber);
        }

        let decider = self
            .decider
            .unwrap_or_else(|| decider::from_config(&config, seed));
        let network = self
            .network
            .unwrap_or_else(|| network::from_config(&config.network, seed));
        let transactions = self.transactions.unwrap_or_else(|| {
            Box::new(RandomBatches::new(seed, DEFAULT_TX_PER_BLOCK, DEFAULT_TX_SIZE))
        });

        let executor = PhaseExecutor::new(
            decider,
            network,
            QuorumPolicy::from_config(&config),
            Duration::from_millis(config.network.phase_timeout_ms),
            cluster.metrics(),
        );

        Ok(Simulator {
            cluster,
            executor,
            detector: TailForkDetector::new(),
            rotation: LeaderRotation::from_config(&config),
            transactions,
            round: 0,
            seed,
        })
    }
}
