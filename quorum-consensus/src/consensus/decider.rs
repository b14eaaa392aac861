use std::{collections::HashSet, sync::Arc};

use rand::{rngs::StdRng, Rng, SeedableRng};

use quorum_common::{crypto::hash::derive_seed, ConsensusPhase, NodeId};

use crate::config::ClusterConfig;

/// Everything a node knows when deciding whether to vote in a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ballot {
    pub node: NodeId,
    pub height: u64,
    pub phase: ConsensusPhase,
    /// Attempt counter of the driver; unique per voting attempt.
    pub round: u64,
    pub view: u64,
}

impl Ballot {
    /// Reproducible random stream for this ballot, independent of scheduling.
    pub fn rng(&self, seed: u64, domain: &[u8]) -> StdRng {
        let node = (self.node.index() as u64).to_le_bytes();
        let height = self.height.to_le_bytes();
        let phase = [self.phase as u8];
        let round = self.round.to_le_bytes();
        StdRng::seed_from_u64(derive_seed(seed, &[domain, &node, &height, &phase, &round]))
    }
}

/// Participation strategy: decides whether a node casts its vote.
///
/// Models unreliable or Byzantine non-voting. Implementations must be
/// deterministic for a given ballot if runs are to be reproducible.
pub trait VoteDecider: Send + Sync {
    fn should_vote(&self, ballot: &Ballot) -> bool;
}

impl<F> VoteDecider for F
where
    F: Fn(&Ballot) -> bool + Send + Sync,
{
    fn should_vote(&self, ballot: &Ballot) -> bool {
        self(ballot)
    }
}

/// Every node votes in every phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysVote;

impl VoteDecider for AlwaysVote {
    fn should_vote(&self, _ballot: &Ballot) -> bool {
        true
    }
}

/// No node ever votes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverVote;

impl VoteDecider for NeverVote {
    fn should_vote(&self, _ballot: &Ballot) -> bool {
        false
    }
}

/// Votes with a fixed probability, seeded per ballot.
#[derive(Debug, Clone)]
pub struct ProbabilisticDecider {
    probability: f64,
    seed: u64,
}

impl ProbabilisticDecider {
    pub fn new(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            seed,
        }
    }
}

impl VoteDecider for ProbabilisticDecider {
    fn should_vote(&self, ballot: &Ballot) -> bool {
        ballot.rng(self.seed, b"vote").gen_bool(self.probability)
    }
}

/// Wraps another decider and silences a fixed set of nodes.
pub struct SilentNodes {
    inner: Arc<dyn VoteDecider>,
    silent: HashSet<NodeId>,
}

impl SilentNodes {
    pub fn new(inner: Arc<dyn VoteDecider>, silent: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            inner,
            silent: silent.into_iter().collect(),
        }
    }

    pub fn is_silent(&self, node: NodeId) -> bool {
        self.silent.contains(&node)
    }
}

impl VoteDecider for SilentNodes {
    fn should_vote(&self, ballot: &Ballot) -> bool {
        !self.silent.contains(&ballot.node) && self.inner.should_vote(ballot)
    }
}

/// Default decider for a configuration: probabilistic participation, with the
/// last `faulty_nodes` nodes silenced.
pub fn from_config(config: &ClusterConfig, seed: u64) -> Arc<dyn VoteDecider> {
    let base: Arc<dyn VoteDecider> = Arc::new(ProbabilisticDecider::new(
        config.participation_probability,
        seed,
    ));
    if config.faulty_nodes == 0 {
        return base;
    }
    let first_faulty = config.node_count - config.faulty_nodes;
    Arc::new(SilentNodes::new(
        base,
        (first_faulty..config.node_count).map(NodeId),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(node: usize, round: u64) -> Ballot {
        Ballot {
            node: NodeId(node),
            height: 3,
            phase: ConsensusPhase::Prepare,
            round,
            view: 0,
        }
    }

    #[test]
    fn test_probabilistic_is_reproducible() {
        let a = ProbabilisticDecider::new(0.5, 99);
        let b = ProbabilisticDecider::new(0.5, 99);
        for round in 0..50 {
            for node in 0..10 {
                assert_eq!(a.should_vote(&ballot(node, round)), b.should_vote(&ballot(node, round)));
            }
        }
    }

    #[test]
    fn test_probability_extremes() {
        let always = ProbabilisticDecider::new(1.0, 1);
        let never = ProbabilisticDecider::new(0.0, 1);
        for round in 0..20 {
            assert!(always.should_vote(&ballot(0, round)));
            assert!(!never.should_vote(&ballot(0, round)));
        }
    }

    #[test]
    fn test_participation_rate_is_roughly_respected() {
        let decider = ProbabilisticDecider::new(0.9, 2024);
        let total = 5_000;
        let yes = (0..total)
            .filter(|i| decider.should_vote(&ballot(i % 10, *i as u64)))
            .count();
        let rate = yes as f64 / total as f64;
        assert!((0.85..0.95).contains(&rate), "rate {rate}");
    }

    #[test]
    fn test_silent_nodes_never_vote() {
        let decider = SilentNodes::new(Arc::new(AlwaysVote), [NodeId(3)]);
        assert!(decider.should_vote(&ballot(0, 0)));
        assert!(!decider.should_vote(&ballot(3, 0)));
        assert!(decider.is_silent(NodeId(3)));
    }

    #[test]
    fn test_closure_decider() {
        let only_even = |b: &Ballot| b.node.index() % 2 == 0;
        assert!(only_even.should_vote(&ballot(2, 0)));
        assert!(!only_even.should_vote(&ballot(1, 0)));
    }

    #[test]
    fn test_from_config_silences_tail() {
        let config = ClusterConfig {
            participation_probability: 1.0,
            faulty_nodes: 2,
            ..ClusterConfig::with_nodes(7)
        };
        let decider = from_config(&config, 5);
        assert!(decider.should_vote(&ballot(4, 0)));
        assert!(!decider.should_vote(&ballot(5, 0)));
        assert!(!decider.should_vote(&ballot(6, 0)));
    }
}
