use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quorum_common::{ConsensusPhase, NodeId, ProtocolVariant};

use crate::cluster::rotation::RotationReason;

/// Protocol milestones published while a run progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsensusEvent {
    BlockProposed {
        height: u64,
        block_hash: String,
        proposer: NodeId,
        view: u64,
    },
    PhaseCompleted {
        height: u64,
        block_hash: String,
        phase: ConsensusPhase,
        votes: usize,
        quorum_reached: bool,
    },
    ForkResolved {
        height: u64,
        canonical: String,
        discarded: Vec<String>,
    },
    SpeculativeFinality {
        height: u64,
        block_hash: String,
        nodes: usize,
    },
    SpeculativeReverted {
        height: u64,
        block_hash: String,
    },
    BlockCommitted {
        height: u64,
        block_hash: String,
        path: ProtocolVariant,
        latency_ms: u64,
    },
    ConsensusFailed {
        height: u64,
        attempts: u32,
        reason: String,
    },
    ViewChanged {
        view: u64,
        from: NodeId,
        to: NodeId,
        reason: RotationReason,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub run_id: Uuid,
    pub sequence: u64,
    pub event: ConsensusEvent,
}

pub type Subscriber = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

/// Fans events out to subscribers, in subscription order.
pub struct EventBus {
    run_id: Uuid,
    sequence: AtomicU64,
    subscribers: Vec<Subscriber>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            sequence: AtomicU64::new(0),
            subscribers: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    pub fn publish(&self, event: ConsensusEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        let envelope = EventEnvelope {
            run_id: self.run_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            event,
        };
        for subscriber in &self.subscribers {
            subscriber(&envelope);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("run_id", &self.run_id)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
