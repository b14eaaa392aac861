//! Shared data model for the quorum simulation: blocks, votes, quorum
//! certificates, protocol phases and the error taxonomy.

pub mod crypto;
pub mod env;
pub mod error;
pub mod utils;

pub use env::block::{Block, TransactionBatch, GENESIS_PARENT};
pub use env::consensus::qc::QuorumCertificate;
pub use env::consensus::types::{BlockResult, ConsensusPhase, ProtocolVariant};
pub use env::vote_data::Vote;
pub use error::{ConsensusError, Result};
pub use utils::NodeId;
