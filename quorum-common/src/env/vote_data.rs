use serde::{Deserialize, Serialize};

use crate::{
    crypto::hash::digest,
    env::consensus::types::ConsensusPhase,
    error::Result,
    utils::NodeId,
};

/// A single node's vote for a block in one phase.
///
/// The signature is simulated: a digest over the canonical signing bytes.
/// It binds the vote to its fields but proves nothing about the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub node_id: NodeId,
    pub block_hash: String,
    pub phase: ConsensusPhase,
    pub signature: String,
}

impl Vote {
    pub fn new(node_id: NodeId, block_hash: impl Into<String>, phase: ConsensusPhase) -> Result<Self> {
        let mut vote = Vote {
            node_id,
            block_hash: block_hash.into(),
            phase,
            signature: String::new(),
        };
        vote.signature = digest(&vote_signing_bytes(&vote)?);
        Ok(vote)
    }

    /// Checks the simulated signature against the vote contents.
    pub fn verify_signature(&self) -> bool {
        match vote_signing_bytes(self) {
            Ok(bytes) => digest(&bytes) == self.signature,
            Err(_) => false,
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Serialize)]
struct VoteSignView<'a> {
    voter: &'a NodeId,
    block_hash: &'a str,
    phase: &'a ConsensusPhase,
}

pub fn vote_signing_bytes(v: &Vote) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&VoteSignView {
        voter: &v.node_id,
        block_hash: &v.block_hash,
        phase: &v.phase,
    })?)
}
