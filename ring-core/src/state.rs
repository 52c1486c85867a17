use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::node_info::NodeInfo;
use crate::registry::Registry;

/// The mutable per-process state of one ring node.
///
/// Every field here is only ever touched while `NodeHandle`'s mutex is
/// held; long-running I/O must take a snapshot of the `NodeInfo`
/// values it needs and release the lock before calling out.
#[derive(Clone, Debug)]
pub struct NodeState {
    pub self_info: NodeInfo,
    pub next: Option<NodeInfo>,
    pub prev: Option<NodeInfo>,
    pub next_next: Option<NodeInfo>,
    pub leader_id: Option<u64>,
    pub leader: Option<NodeInfo>,
    pub in_election: bool,
    pub alive: bool,
    pub delay: f64,
    pub shared_value: Option<i64>,
}

impl NodeState {
    pub fn new(self_info: NodeInfo) -> Self {
        NodeState {
            self_info,
            next: None,
            prev: None,
            next_next: None,
            leader_id: None,
            leader: None,
            in_election: false,
            alive: true,
            delay: 0.0,
            shared_value: None,
        }
    }

    pub fn node_id(&self) -> u64 {
        self.self_info.node_id
    }

    pub fn is_leader(&self) -> bool {
        self.leader_id == Some(self.node_id())
    }

    /// Single-node ring: `next` points back to self.
    pub fn is_singleton_ring(&self) -> bool {
        matches!(&self.next, Some(n) if n.node_id == self.node_id())
    }

    /// `kill`: retains topology, zeros leader/election fields.
    pub fn kill(&mut self) {
        self.alive = false;
        self.leader_id = None;
        self.leader = None;
        self.in_election = false;
    }

    /// `revive`: same field reset, flips `alive` back on.
    pub fn revive(&mut self) {
        self.alive = true;
        self.leader_id = None;
        self.leader = None;
        self.in_election = false;
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: if self.alive { "alive" } else { "killed" }.to_string(),
            node_id: self.node_id(),
            leader_id: self.leader_id,
            is_leader: self.is_leader(),
            delay: self.delay,
            next: self.next.clone(),
            prev: self.prev.clone(),
            next_next: self.next_next.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: String,
    pub node_id: u64,
    pub leader_id: Option<u64>,
    pub is_leader: bool,
    pub delay: f64,
    pub next: Option<NodeInfo>,
    pub prev: Option<NodeInfo>,
    pub next_next: Option<NodeInfo>,
}

/// Shared handle passed to every HTTP/peer handler: an explicitly
/// owned, constructor-injected value rather than a process-global.
#[derive(Clone)]
pub struct NodeHandle {
    pub node_id: u64,
    state: Arc<Mutex<NodeState>>,
    pub registry: Arc<Registry>,
}

impl NodeHandle {
    pub fn new(self_info: NodeInfo, registry: Registry) -> Self {
        NodeHandle {
            node_id: self_info.node_id,
            state: Arc::new(Mutex::new(NodeState::new(self_info))),
            registry: Arc::new(registry),
        }
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, NodeState> {
        self.state.lock().await
    }

    /// Takes a consistent snapshot of the three neighbor pointers plus
    /// `self_info`, without holding the lock across any I/O.
    pub async fn neighbor_snapshot(&self) -> NeighborSnapshot {
        let state = self.lock().await;
        NeighborSnapshot {
            self_info: state.self_info.clone(),
            next: state.next.clone(),
            prev: state.prev.clone(),
            next_next: state.next_next.clone(),
            delay: state.delay,
        }
    }

    pub async fn current_delay(&self) -> f64 {
        self.lock().await.delay
    }

    pub async fn health_snapshot(&self) -> HealthSnapshot {
        self.lock().await.health_snapshot()
    }
}

#[derive(Clone, Debug)]
pub struct NeighborSnapshot {
    pub self_info: NodeInfo,
    pub next: Option<NodeInfo>,
    pub prev: Option<NodeInfo>,
    pub next_next: Option<NodeInfo>,
    pub delay: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u64) -> NodeInfo {
        NodeInfo::new(id, format!("http://127.0.0.1:800{}", id), "127.0.0.1", 9000 + id as u16)
    }

    #[test]
    fn kill_clears_leader_fields_but_keeps_topology() {
        let mut state = NodeState::new(info(1));
        state.next = Some(info(2));
        state.leader_id = Some(2);
        state.leader = Some(info(2));
        state.in_election = true;

        state.kill();

        assert!(!state.alive);
        assert_eq!(state.leader_id, None);
        assert_eq!(state.leader, None);
        assert!(!state.in_election);
        assert_eq!(state.next, Some(info(2)));
    }

    #[test]
    fn revive_resets_leader_fields() {
        let mut state = NodeState::new(info(1));
        state.kill();
        state.leader_id = Some(1);
        state.revive();
        assert!(state.alive);
        assert_eq!(state.leader_id, None);
    }

    #[test]
    fn singleton_ring_detection() {
        let mut state = NodeState::new(info(1));
        assert!(!state.is_singleton_ring());
        state.next = Some(info(1));
        assert!(state.is_singleton_ring());
    }
}
