use serde::{Deserialize, Serialize};

use crate::crypto::hash::compute_block_hash;
use crate::utils::NodeId;

/// Parent hash used by the first block of every chain.
pub const GENESIS_PARENT: &str = "genesis";

/// Opaque transaction payload carried by a block.
///
/// The engine never inspects its contents; it only hashes the bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBatch(#[serde(with = "hex::serde")] pub Vec<u8>);

impl TransactionBatch {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A candidate or committed block.
///
/// Blocks are immutable once hashed: fields are private and only readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    height: u64,
    parent_hash: String,
    hash: String,
    transactions: TransactionBatch,
    proposer: NodeId,
    /// Milliseconds since the UNIX epoch.
    timestamp: i64,
    view: u64,
}

impl Block {
    /// Builds a block and seals it with its content hash.
    pub fn new(
        height: u64,
        parent_hash: impl Into<String>,
        proposer: NodeId,
        view: u64,
        timestamp: i64,
        transactions: TransactionBatch,
    ) -> Self {
        let mut block = Block {
            height,
            parent_hash: parent_hash.into(),
            hash: String::new(),
            transactions,
            proposer,
            timestamp,
            view,
        };
        block.hash = compute_block_hash(&block);
        block
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn parent_hash(&self) -> &str {
        &self.parent_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn transactions(&self) -> &TransactionBatch {
        &self.transactions
    }

    pub fn proposer(&self) -> NodeId {
        self.proposer
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    pub fn is_genesis_child(&self) -> bool {
        self.height == 0 && self.parent_hash == GENESIS_PARENT
    }

    /// Recomputes the content hash and compares it with the sealed one.
    pub fn verify_hash(&self) -> bool {
        compute_block_hash(self) == self.hash
    }

    /// Short hash prefix for log lines.
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(16)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64) -> Block {
        Block::new(
            0,
            GENESIS_PARENT,
            NodeId(0),
            0,
            timestamp,
            TransactionBatch::new(vec![1, 2, 3]),
        )
    }

    #[test]
    fn test_block_is_sealed_on_creation() {
        let block = sample(1_700_000_000_000);
        assert_eq!(block.hash().len(), 64);
        assert!(block.verify_hash());
        assert!(block.is_genesis_child());
    }

    #[test]
    fn test_hash_changes_with_content() {
        assert_ne!(sample(1).hash(), sample(2).hash());
    }

    #[test]
    fn test_tampered_block_fails_verification() {
        let mut json = serde_json::to_value(sample(5)).unwrap();
        json["height"] = serde_json::json!(9);
        let tampered: Block = serde_json::from_value(json).unwrap();
        assert!(!tampered.verify_hash());
    }

    #[test]
    fn test_transactions_serialize_as_hex() {
        let json = serde_json::to_value(sample(5)).unwrap();
        assert_eq!(json["transactions"], serde_json::json!("010203"));
    }
}
