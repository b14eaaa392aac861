use std::error::Error;

use clap::Parser;
use tokio::sync::oneshot;
use tracing::{error, info};

use quorum_node::{
    cli::{Cli, Commands},
    compare, run_limit, setup, simulate, SimulationReport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("CRASH: {}", info);
    }));

    match cli.command {
        Commands::InitConfig { path, force } => {
            let _guard = setup::init_tracing(None)?;
            setup::ensure_config(&path, force)?;
        }
        Commands::Run(args) => {
            let _guard = setup::init_tracing(args.audit_log.as_deref())?;
            let config = setup::load_config(&args)?;
            info!(
                "--- STARTING SIMULATION: {} nodes, quorum {}, {} protocol ---",
                config.node_count,
                config.quorum_size(),
                config.protocol
            );

            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("🛑 Interrupt received, finishing current block");
                    let _ = tx.send(());
                }
            });

            let summary = simulate(config, run_limit(&args), Some(rx)).await?;
            let report = SimulationReport::from(&summary);
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.consistent {
                let reason = report.inconsistency.unwrap_or_default();
                error!("❌ Replica logs diverged: {}", reason);
                return Err(format!("inconsistent logs: {}", reason).into());
            }
        }
        Commands::Compare(args) => {
            let _guard = setup::init_tracing(args.audit_log.as_deref())?;
            let config = setup::load_config(&args)?;
            let report = compare(config, run_limit(&args)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !(report.slow.consistent && report.fast.consistent) {
                error!("❌ Replica logs diverged in comparison run");
                return Err("inconsistent logs".into());
            }
        }
    }

    Ok(())
}
