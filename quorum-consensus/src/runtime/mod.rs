//! Simulation driver: owns the cluster and pushes one block at a time
//! through proposal, fork detection, voting and commit.

pub mod builder;
pub mod simulator;
pub mod transactions;

pub use builder::SimulatorBuilder;
pub use simulator::{RunLimit, RunSummary, Simulator};
pub use transactions::{EmptyBatches, RandomBatches, TransactionSource};
