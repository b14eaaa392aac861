use std::{sync::Arc, time::Duration};

use tokio::sync::oneshot;

use quorum_consensus::{
    AlwaysVote, ClusterConfig, IdealNetwork, MetricsSnapshot, NetworkConfig, RunLimit,
    RunSummary, SimulatorBuilder,
};

fn builder() -> SimulatorBuilder {
    SimulatorBuilder::new()
        .with_config(ClusterConfig {
            seed: Some(7),
            network: NetworkConfig::ideal(),
            ..ClusterConfig::with_nodes(4)
        })
        .with_decider(Arc::new(AlwaysVote))
        .with_network(Arc::new(IdealNetwork))
}

#[tokio::test]
async fn test_shutdown_before_first_block() {
    let mut sim = builder().build().unwrap();
    let (tx, rx) = oneshot::channel();
    tx.send(()).unwrap();

    let summary = sim.run_until(RunLimit::Blocks(10), Some(rx)).await.unwrap();
    assert!(summary.cancelled);
    assert!(summary.results.is_empty());
    assert_eq!(sim.cluster().height(), 0);
}

#[tokio::test]
async fn test_dropped_sender_does_not_cancel() {
    let mut sim = builder().build().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    drop(tx);

    let summary = sim.run_until(RunLimit::Blocks(3), Some(rx)).await.unwrap();
    assert!(!summary.cancelled);
    assert_eq!(summary.results.len(), 3);
}

#[tokio::test]
async fn test_duration_limit_stops_between_blocks() {
    let mut sim = builder().build().unwrap();
    let summary = sim
        .run(RunLimit::Duration(Duration::from_millis(50)))
        .await
        .unwrap();

    assert!(!summary.cancelled);
    assert!(summary.consistent);
    // Every block that started was fully committed.
    assert_eq!(summary.results.len() as u64, sim.cluster().height());
}

#[tokio::test]
async fn test_summary_and_metrics_roundtrip() {
    let mut sim = builder().build().unwrap();
    let summary = sim.run(RunLimit::Blocks(5)).await.unwrap();

    let json = serde_json::to_string(&summary.metrics).unwrap();
    let decoded: MetricsSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, summary.metrics);
    assert_eq!(decoded.p99(), summary.metrics.p99());

    let bytes = bincode::serialize(&summary.metrics).unwrap();
    let decoded: MetricsSnapshot = bincode::deserialize(&bytes).unwrap();
    assert_eq!(decoded, summary.metrics);

    let json = serde_json::to_string(&summary).unwrap();
    assert_eq!(serde_json::from_str::<RunSummary>(&json).unwrap(), summary);
}
