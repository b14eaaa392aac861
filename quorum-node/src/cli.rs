use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use quorum_common::ProtocolVariant;
use quorum_consensus::NetworkProfile;

#[derive(Parser, Debug)]
#[command(name = "quorum-node")]
#[command(version, about = "BFT consensus simulation harness", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one simulation and print its report as JSON
    Run(RunArgs),
    /// Run the slow and fast protocol variants on the same configuration and seed
    Compare(RunArgs),
    /// Write a default configuration file
    InitConfig {
        #[arg(value_name = "FILE", default_value = "cluster.json")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Configuration file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of blocks to propose
    #[arg(short, long, default_value = "100")]
    pub blocks: u64,

    /// Stop after this many seconds instead of a block count
    #[arg(short, long)]
    pub duration: Option<u64>,

    #[arg(short, long)]
    pub nodes: Option<usize>,

    /// Probability that a node votes in a phase (0.0-1.0)
    #[arg(short, long)]
    pub participation: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolArg>,

    #[arg(long, value_enum)]
    pub network: Option<NetworkArg>,

    /// Committed blocks between leader rotations (0 disables)
    #[arg(long)]
    pub rotation_interval: Option<u64>,

    /// Highest-indexed nodes that never vote
    #[arg(long)]
    pub faulty: Option<usize>,

    /// Extra slow-path attempts per block
    #[arg(long)]
    pub retries: Option<u32>,

    #[arg(long)]
    pub no_tail_fork_prevention: bool,

    #[arg(long)]
    pub no_speculative_finality: bool,

    /// Write consensus events to this file
    #[arg(long, value_name = "FILE")]
    pub audit_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProtocolArg {
    Slow,
    Fast,
}

impl From<ProtocolArg> for ProtocolVariant {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Slow => ProtocolVariant::Slow,
            ProtocolArg::Fast => ProtocolVariant::Fast,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkArg {
    Ideal,
    Simulated,
}

impl From<NetworkArg> for NetworkProfile {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Ideal => NetworkProfile::Ideal,
            NetworkArg::Simulated => NetworkProfile::Simulated,
        }
    }
}
