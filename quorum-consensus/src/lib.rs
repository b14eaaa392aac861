pub mod cluster;
pub mod config;
pub mod consensus;
pub mod events;
pub mod metrics;
pub mod runtime;

pub use cluster::core::Cluster;
pub use cluster::rotation::{RotationReason, ViewChange};
pub use config::{ClusterConfig, NetworkConfig, NetworkProfile};
pub use consensus::decider::{AlwaysVote, Ballot, NeverVote, ProbabilisticDecider, VoteDecider};
pub use consensus::evaluator::QuorumPolicy;
pub use consensus::network::{IdealNetwork, NetworkModel, SimulatedNetwork};
pub use events::{ConsensusEvent, EventEnvelope, Subscriber};
pub use metrics::{Metrics, MetricsSnapshot};
pub use runtime::{RunLimit, RunSummary, Simulator, SimulatorBuilder};
