use serde::{Deserialize, Serialize};
use tracing::info;

use quorum_common::{NodeId, QuorumCertificate};

use crate::{cluster::core::Cluster, config::ClusterConfig, events::ConsensusEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    /// `rotation_interval` blocks were committed under the current leader.
    Scheduled,
    /// The current leader's proposal exhausted its attempts.
    ConsensusFailure,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewChange {
    pub view: u64,
    pub from: NodeId,
    pub to: NodeId,
    pub reason: RotationReason,
    /// Hash of the lock handed to the new leader, if any.
    pub handed_lock: Option<String>,
}

/// Decides when the driver should rotate the leader.
#[derive(Debug, Clone)]
pub struct LeaderRotation {
    interval: u64,
    rotate_on_failure: bool,
    committed_since_rotation: u64,
}

impl LeaderRotation {
    pub fn new(interval: u64, rotate_on_failure: bool) -> Self {
        Self {
            interval,
            rotate_on_failure,
            committed_since_rotation: 0,
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::new(config.rotation_interval, config.rotate_on_failure)
    }

    pub fn on_commit(&mut self) -> Option<RotationReason> {
        if self.interval == 0 {
            return None;
        }
        self.committed_since_rotation += 1;
        (self.committed_since_rotation >= self.interval).then_some(RotationReason::Scheduled)
    }

    pub fn on_failure(&mut self) -> Option<RotationReason> {
        self.rotate_on_failure.then_some(RotationReason::ConsensusFailure)
    }

    /// Restarts the interval count. Called after every rotation.
    pub fn reset(&mut self) {
        self.committed_since_rotation = 0;
    }
}

impl Cluster {
    pub fn rotate_leader(&mut self) -> ViewChange {
        self.rotate_leader_for(RotationReason::Manual)
    }

    /// Round-robin rotation. The new leader inherits the highest lock held
    /// anywhere in the cluster so it only proposes blocks extending it.
    pub fn rotate_leader_for(&mut self, reason: RotationReason) -> ViewChange {
        let from = self.leader;
        let to = NodeId((from.index() + 1) % self.nodes.len());

        let highest: Option<QuorumCertificate> = self
            .nodes
            .iter()
            .filter_map(|n| n.locked_qc.as_ref())
            .max_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| b.block_hash.cmp(&a.block_hash)))
            .cloned();

        self.view += 1;
        self.leader = to;
        for node in &mut self.nodes {
            node.is_leader = node.id == to;
            node.current_view = self.view;
        }
        if let Some(qc) = &highest {
            self.nodes[to.index()].lock(qc);
        }
        self.metrics.record_view_change();

        info!(
            target: "consensus",
            "EVENT:VIEW_CHANGE view={} from={} to={} reason={:?}",
            self.view, from, to, reason
        );
        self.events.publish(ConsensusEvent::ViewChanged {
            view: self.view,
            from,
            to,
            reason,
        });

        ViewChange {
            view: self.view,
            from,
            to,
            reason,
            handed_lock: highest.map(|qc| qc.block_hash),
        }
    }
}
