//! Consensus building blocks.
//!
//! Vote collection and quorum evaluation, the per-phase executor, the
//! candidate pool with its tail-fork detector, and per-node speculative
//! finality. Participation and network behaviour are injected through the
//! `VoteDecider` and `NetworkModel` traits so that runs stay reproducible.

pub mod decider;
pub mod evaluator;
pub mod fork;
pub mod network;
pub mod phase;
pub mod pool;
pub mod registry;
pub mod speculative;
