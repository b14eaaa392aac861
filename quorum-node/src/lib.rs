pub mod audit;
pub mod cli;
pub mod report;
pub mod setup;

use std::{error::Error, time::Duration};

use tokio::sync::oneshot;

use quorum_common::ProtocolVariant;
use quorum_consensus::{ClusterConfig, RunLimit, RunSummary, SimulatorBuilder};

pub use report::{ComparisonReport, SimulationReport};

pub fn run_limit(args: &cli::RunArgs) -> RunLimit {
    match args.duration {
        Some(secs) => RunLimit::Duration(Duration::from_secs(secs)),
        None => RunLimit::Blocks(args.blocks),
    }
}

/// Builds a simulator for `config` and runs it to `limit`.
pub async fn simulate(
    config: ClusterConfig,
    limit: RunLimit,
    shutdown: Option<oneshot::Receiver<()>>,
) -> Result<RunSummary, Box<dyn Error>> {
    let mut simulator = SimulatorBuilder::new()
        .with_config(config)
        .with_subscriber(audit::audit_subscriber())
        .build()?;
    Ok(simulator.run_until(limit, shutdown).await?)
}

/// Runs both protocol variants with the same configuration and seed.
pub async fn compare(
    config: ClusterConfig,
    limit: RunLimit,
) -> Result<ComparisonReport, Box<dyn Error>> {
    let seed = config.seed.unwrap_or_else(rand::random);
    let variant = |protocol| ClusterConfig {
        protocol,
        seed: Some(seed),
        ..config.clone()
    };

    let slow = simulate(variant(ProtocolVariant::Slow), limit, None).await?;
    let fast = simulate(variant(ProtocolVariant::Fast), limit, None).await?;
    Ok(ComparisonReport::new(
        SimulationReport::from(&slow),
        SimulationReport::from(&fast),
    ))
}
