use rand::{rngs::StdRng, RngCore, SeedableRng};

use quorum_common::TransactionBatch;

/// Supplies the opaque payload of each proposed block.
pub trait TransactionSource: Send {
    fn next_batch(&mut self, height: u64) -> TransactionBatch;
}

impl<F> TransactionSource for F
where
    F: FnMut(u64) -> TransactionBatch + Send,
{
    fn next_batch(&mut self, height: u64) -> TransactionBatch {
        self(height)
    }
}

/// Seeded random bytes: `tx_per_block` transactions of `tx_size` bytes each.
#[derive(Debug, Clone)]
pub struct RandomBatches {
    rng: StdRng,
    tx_per_block: usize,
    tx_size: usize,
}

impl RandomBatches {
    pub fn new(seed: u64, tx_per_block: usize, tx_size: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            tx_per_block,
            tx_size,
        }
    }
}

impl TransactionSource for RandomBatches {
    fn next_batch(&mut self, _height: u64) -> TransactionBatch {
        let mut bytes = vec![0u8; self.tx_per_block * self.tx_size];
        self.rng.fill_bytes(&mut bytes);
        TransactionBatch::new(bytes)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyBatches;

impl TransactionSource for EmptyBatches {
    fn next_batch(&mut self, _height: u64) -> TransactionBatch {
        TransactionBatch::default()
    }
}
