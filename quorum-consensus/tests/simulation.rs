use std::sync::{Arc, Mutex};

use quorum_common::{ConsensusPhase, NodeId, ProtocolVariant};
use quorum_consensus::{
    consensus::speculative::FinalityState, AlwaysVote, Ballot, ClusterConfig, ConsensusEvent,
    EventEnvelope, IdealNetwork, NetworkConfig, NeverVote, RunLimit, Simulator, SimulatorBuilder,
    VoteDecider,
};

fn config(nodes: usize) -> ClusterConfig {
    ClusterConfig {
        seed: Some(42),
        network: NetworkConfig::ideal(),
        ..ClusterConfig::with_nodes(nodes)
    }
}

fn simulator(config: ClusterConfig, decider: Arc<dyn VoteDecider>) -> Simulator {
    SimulatorBuilder::new()
        .with_config(config)
        .with_decider(decider)
        .with_network(Arc::new(IdealNetwork))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_full_participation_never_fails() {
    let mut sim = simulator(config(7), Arc::new(AlwaysVote));
    let summary = sim.run(RunLimit::Blocks(30)).await.unwrap();

    assert!(summary.consistent);
    assert_eq!(summary.metrics.total_blocks, 30);
    assert_eq!(summary.metrics.failed_proposals, 0);
    assert_eq!(summary.metrics.fallbacks, 0);
    assert!(summary
        .results
        .iter()
        .all(|r| r.success && r.path == Some(ProtocolVariant::Fast) && r.attempts == 1));
    assert_eq!(sim.cluster().height(), 30);
}

#[tokio::test]
async fn test_ten_node_scenario() {
    let config = ClusterConfig {
        participation_probability: 0.9,
        ..config(10)
    };
    assert_eq!(config.quorum_size(), 7);

    let mut sim = SimulatorBuilder::new()
        .with_config(config)
        .with_network(Arc::new(IdealNetwork))
        .build()
        .unwrap();

    for _ in 0..100 {
        sim.step().await.unwrap();
        sim.cluster().verify_consistency().unwrap();
    }

    let metrics = sim.metrics();
    assert_eq!(metrics.total_blocks + metrics.failed_proposals, 100);
    // A block fails only if the fast attempt and the slow attempt both miss quorum.
    assert!(metrics.failed_proposals <= 10, "{} failures", metrics.failed_proposals);
    assert_eq!(sim.cluster().height(), metrics.total_blocks);
    assert!(metrics.messages_per_round() > 7.0);
}

#[tokio::test]
async fn test_same_seed_same_outcomes() {
    let run = || async {
        let config = ClusterConfig {
            participation_probability: 0.75,
            ..config(7)
        };
        let mut sim = SimulatorBuilder::new()
            .with_config(config)
            .with_network(Arc::new(IdealNetwork))
            .build()
            .unwrap();
        let summary = sim.run(RunLimit::Blocks(40)).await.unwrap();
        summary
            .results
            .iter()
            .map(|r| (r.success, r.attempts, r.fell_back, r.path))
            .collect::<Vec<_>>()
    };
    assert_eq!(run().await, run().await);
}

#[tokio::test]
async fn test_fast_path_falls_back_to_slow() {
    let no_fast = |b: &Ballot| b.phase != ConsensusPhase::FastPrepare;
    let mut sim = simulator(config(4), Arc::new(no_fast));
    let summary = sim.run(RunLimit::Blocks(5)).await.unwrap();

    assert_eq!(summary.metrics.total_blocks, 5);
    assert_eq!(summary.metrics.fallbacks, 5);
    for result in &summary.results {
        assert!(result.success);
        assert!(result.fell_back);
        assert_eq!(result.path, Some(ProtocolVariant::Slow));
        assert_eq!(result.attempts, 2);
    }
}

#[tokio::test]
async fn test_slow_protocol_skips_fast_round() {
    let config = ClusterConfig {
        protocol: ProtocolVariant::Slow,
        ..config(4)
    };
    let mut sim = simulator(config, Arc::new(AlwaysVote));
    let summary = sim.run(RunLimit::Blocks(3)).await.unwrap();

    assert_eq!(summary.metrics.phases_run, 12);
    assert_eq!(summary.metrics.votes_cast, 48);
    assert!(summary.results.iter().all(|r| r.path == Some(ProtocolVariant::Slow)));
}

#[tokio::test]
async fn test_exhausted_attempts_fail_and_rotate() {
    let config = ClusterConfig {
        proposal_retries: 2,
        ..config(4)
    };
    let mut sim = simulator(config, Arc::new(NeverVote));
    let summary = sim.run(RunLimit::Blocks(3)).await.unwrap();

    assert_eq!(summary.metrics.failed_proposals, 3);
    assert_eq!(summary.metrics.total_blocks, 0);
    assert_eq!(summary.metrics.view_changes, 3);
    assert!(summary.consistent);
    for result in &summary.results {
        assert!(!result.success);
        // One fast attempt plus 1 + 2 slow attempts.
        assert_eq!(result.attempts, 4);
        assert!(result.error.as_deref().unwrap_or_default().contains("consensus failed"));
    }
    assert_eq!(sim.cluster().leader(), NodeId(3));
}

#[tokio::test]
async fn test_rotation_after_interval() {
    let config = ClusterConfig {
        rotation_interval: 5,
        ..config(4)
    };
    let mut sim = simulator(config, Arc::new(AlwaysVote));

    sim.run(RunLimit::Blocks(4)).await.unwrap();
    assert_eq!(sim.cluster().leader(), NodeId(0));
    assert_eq!(sim.metrics().view_changes, 0);

    sim.step().await.unwrap();
    assert_eq!(sim.cluster().leader(), NodeId(1));
    assert_eq!(sim.metrics().view_changes, 1);
    assert_eq!(sim.cluster().view(), 1);

    // The next block is proposed by the new leader.
    let result = sim.step().await.unwrap();
    let block = &sim.cluster().nodes()[0].log()[result.height as usize];
    assert_eq!(block.proposer(), NodeId(1));
}

#[tokio::test]
async fn test_locked_block_survives_rotation() {
    // First attempt: everyone locks except node 1, then COMMIT misses quorum.
    let decider = |b: &Ballot| {
        let blocked = b.round == 1
            && (b.phase == ConsensusPhase::Commit
                || (b.phase == ConsensusPhase::PreCommit && b.node == NodeId(1)));
        !blocked
    };
    let config = ClusterConfig {
        protocol: ProtocolVariant::Slow,
        ..config(10)
    };
    let mut sim = simulator(config, Arc::new(decider));

    let failed = sim.step().await.unwrap();
    assert!(!failed.success);
    assert_eq!(sim.cluster().leader(), NodeId(1));
    let handed = sim.cluster().nodes()[1].locked_qc.clone().unwrap();
    assert_eq!(Some(&handed.block_hash), failed.block_hash.as_ref());

    let committed = sim.step().await.unwrap();
    assert!(committed.success);
    assert_eq!(committed.block_hash, failed.block_hash);
    assert!(sim.cluster().nodes().iter().all(|n| n.locked_qc.is_none()));
}

#[tokio::test]
async fn test_speculative_blocks_have_certificates() {
    let config = ClusterConfig {
        participation_probability: 0.8,
        ..config(7)
    };
    let quorum = config.quorum_size();
    let mut sim = SimulatorBuilder::new()
        .with_config(config)
        .with_network(Arc::new(IdealNetwork))
        .build()
        .unwrap();
    sim.run(RunLimit::Blocks(30)).await.unwrap();

    let mut speculative_seen = 0;
    for node in sim.cluster().nodes() {
        for (hash, record) in node.finality.records() {
            if let Some(proof) = &record.proof {
                assert!(proof.certifies(hash));
                assert!(proof.validate(quorum).is_ok());
                speculative_seen += 1;
            } else {
                assert_ne!(record.state, FinalityState::Speculative);
            }
        }
    }
    assert!(speculative_seen > 0);

    // Every committed block is final everywhere.
    for node in sim.cluster().nodes() {
        for block in node.log() {
            assert_eq!(node.finality.state(block.hash()), FinalityState::Final);
        }
    }
}

#[tokio::test]
async fn test_events_are_published() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let mut sim = SimulatorBuilder::new()
        .with_config(config(4))
        .with_decider(Arc::new(AlwaysVote))
        .with_network(Arc::new(IdealNetwork))
        .with_subscriber(Arc::new(move |env: &EventEnvelope| {
            sink.lock().unwrap().push(env.event.clone());
        }))
        .build()
        .unwrap();
    let summary = sim.run(RunLimit::Blocks(3)).await.unwrap();

    let events = events.lock().unwrap();
    let committed = events
        .iter()
        .filter(|e| matches!(e, ConsensusEvent::BlockCommitted { .. }))
        .count();
    let proposed = events
        .iter()
        .filter(|e| matches!(e, ConsensusEvent::BlockProposed { .. }))
        .count();
    assert_eq!(committed, 3);
    assert_eq!(proposed, 3);
    assert_eq!(summary.run_id, sim.cluster().events().run_id());
}

/// Slow protocol where PRE-COMMIT misses quorum on the first attempt only, so
/// the first block keeps its PREPARE votes but never locks.
fn interrupted_first_attempt(tail_fork_prevention_enabled: bool) -> Simulator {
    let decider = |b: &Ballot| !(b.round == 1 && b.phase == ConsensusPhase::PreCommit);
    let config = ClusterConfig {
        protocol: ProtocolVariant::Slow,
        tail_fork_prevention_enabled,
        ..config(4)
    };
    simulator(config, Arc::new(decider))
}

#[tokio::test]
async fn test_voted_candidate_wins_tail_fork_after_rotation() {
    let mut sim = interrupted_first_attempt(true);

    let failed = sim.step().await.unwrap();
    assert!(!failed.success);
    assert_eq!(sim.cluster().leader(), NodeId(1));

    let committed = sim.step().await.unwrap();
    assert!(committed.success);
    assert_eq!(committed.height, failed.height);
    assert_eq!(committed.block_hash, failed.block_hash);

    let metrics = sim.metrics();
    assert_eq!(metrics.forks_prevented, 1);
    assert_eq!(metrics.speculative_finalizations, 1);
    assert_eq!(metrics.speculative_reverts, 0);
    assert_eq!(sim.cluster().consistency(), (true, None));

    let hash = committed.block_hash.as_deref().unwrap();
    for node in sim.cluster().nodes() {
        assert_eq!(node.finality.state(hash), FinalityState::Final);
    }
}

#[tokio::test]
async fn test_rival_commit_reverts_speculative_block() {
    let mut sim = interrupted_first_attempt(false);

    let failed = sim.step().await.unwrap();
    assert!(!failed.success);

    let committed = sim.step().await.unwrap();
    assert!(committed.success);
    assert_eq!(committed.height, failed.height);
    assert_ne!(committed.block_hash, failed.block_hash);

    let metrics = sim.metrics();
    assert_eq!(metrics.forks_prevented, 0);
    assert_eq!(metrics.speculative_finalizations, 1);
    assert_eq!(metrics.speculative_reverts, 1);
    assert_eq!(sim.cluster().consistency(), (true, None));

    let reverted = failed.block_hash.as_deref().unwrap();
    for node in sim.cluster().nodes() {
        assert_eq!(node.finality.state(reverted), FinalityState::Reverted);
    }
}
