use std::sync::Arc;

use tracing::{info, warn};

use quorum_consensus::{EventEnvelope, Subscriber};

/// Mirrors every published event into the `consensus` log target as JSON.
pub fn audit_subscriber() -> Subscriber {
    Arc::new(|envelope: &EventEnvelope| match serde_json::to_string(envelope) {
        Ok(json) => info!(target: "consensus", "EVENT:RECORD {}", json),
        Err(e) => warn!("Failed to encode event #{}: {}", envelope.sequence, e),
    })
}
