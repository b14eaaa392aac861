use sha2::{Digest, Sha256};

use crate::env::block::Block;

/// Computes the SHA-256 digest of the given data and returns it as a hex string.
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Computes the content hash of a block.
///
/// The hash covers:
/// - height
/// - parent_hash
/// - proposer
/// - timestamp
/// - transactions
///
/// It does NOT cover the view or the hash field itself.
pub fn compute_block_hash(block: &Block) -> String {
    let mut hasher = Sha256::new();

    hasher.update(block.height().to_le_bytes());
    hasher.update(block.parent_hash().as_bytes());
    hasher.update((block.proposer().index() as u64).to_le_bytes());
    hasher.update(block.timestamp().to_le_bytes());
    hasher.update(block.transactions().as_bytes());

    hex::encode(hasher.finalize())
}

/// Derives a 64-bit seed from a base seed and a list of domain parts.
///
/// Used to give every (node, height, phase, round) its own reproducible
/// random stream, independent of task scheduling order.
pub fn derive_seed(seed: u64, parts: &[&[u8]]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let out = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&out[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::block::{TransactionBatch, GENESIS_PARENT};
    use crate::utils::NodeId;

    #[test]
    fn test_digest() {
        let hash = digest(b"hello world");
        assert_eq!(hash, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_compute_block_hash_is_deterministic() {
        let a = Block::new(4, GENESIS_PARENT, NodeId(1), 2, 1234, TransactionBatch::new(vec![9; 8]));
        let b = Block::new(4, GENESIS_PARENT, NodeId(1), 2, 1234, TransactionBatch::new(vec![9; 8]));
        assert_eq!(compute_block_hash(&a), compute_block_hash(&b));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_view_is_not_hashed() {
        let a = Block::new(4, GENESIS_PARENT, NodeId(1), 2, 1234, TransactionBatch::default());
        let b = Block::new(4, GENESIS_PARENT, NodeId(1), 3, 1234, TransactionBatch::default());
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_derive_seed_separates_domains() {
        let a = derive_seed(42, &[b"node", &1u64.to_le_bytes()]);
        let b = derive_seed(42, &[b"node", &2u64.to_le_bytes()]);
        let c = derive_seed(43, &[b"node", &1u64.to_le_bytes()]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, derive_seed(42, &[b"node", &1u64.to_le_bytes()]));
    }
}
