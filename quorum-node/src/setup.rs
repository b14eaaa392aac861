use std::{error::Error, fs, path::Path};

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter, prelude::*, EnvFilter};

use quorum_consensus::{ClusterConfig, NetworkConfig, NetworkProfile};

use crate::cli::RunArgs;

/// Stdout logging filtered by `RUST_LOG`, plus an optional audit file that only
/// receives the `consensus` target. Keep the guard alive until exit.
pub fn init_tracing(audit_log: Option<&Path>) -> Result<Option<WorkerGuard>, Box<dyn Error>> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,quorum_node=debug".into()),
        )
        .with_filter(filter::filter_fn(|metadata| metadata.target() != "consensus"));

    let (audit_layer, guard) = match audit_log {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = fs::File::create(path)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter::filter_fn(|metadata| metadata.target() == "consensus"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(audit_layer)
        .with(stdout_layer)
        .try_init()?;
    Ok(guard)
}

/// Loads the configuration file (defaults when absent) and applies CLI overrides.
pub fn load_config(args: &RunArgs) -> Result<ClusterConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => ClusterConfig::load_from_file(path)?,
        None => ClusterConfig::default(),
    };

    if let Some(nodes) = args.nodes {
        config.node_count = nodes;
        config.quorum_size = None;
    }
    if let Some(p) = args.participation {
        config.participation_probability = p;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(protocol) = args.protocol {
        config.protocol = protocol.into();
    }
    if let Some(network) = args.network {
        config.network = match NetworkProfile::from(network) {
            NetworkProfile::Ideal => NetworkConfig::ideal(),
            NetworkProfile::Simulated => NetworkConfig {
                profile: NetworkProfile::Simulated,
                ..config.network
            },
        };
    }
    if let Some(interval) = args.rotation_interval {
        config.rotation_interval = interval;
    }
    if let Some(faulty) = args.faulty {
        config.faulty_nodes = faulty;
    }
    if let Some(retries) = args.retries {
        config.proposal_retries = retries;
    }
    if args.no_tail_fork_prevention {
        config.tail_fork_prevention_enabled = false;
    }
    if args.no_speculative_finality {
        config.speculative_finality_enabled = false;
    }

    config.validate()?;
    Ok(config)
}

/// Writes the default configuration to `path`. Returns false if it already exists.
pub fn ensure_config(path: &Path, force: bool) -> Result<bool, Box<dyn Error>> {
    if path.exists() && !force {
        info!("⚠️ Config already exists at {}", path.display());
        return Ok(false);
    }
    ClusterConfig::default().save_to_file(path)?;
    info!("✅ Default config written to {}", path.display());
    Ok(true)
}
