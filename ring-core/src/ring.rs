//! Ring Manager: join, graceful leave, partial neighbor updates, and
//! reactive repair around a dead `next`.

use serde::Deserialize;

use crate::error::CoreError;
use crate::message::{PeerRequest, PeerResponse};
use crate::node_info::NodeInfo;
use crate::state::NodeHandle;
use crate::transport::{PeerClient, UpdateNeighborsBody};

/// Inbound `/update_neighbors` body. Each field uses the "double
/// `Option`" trick: an absent key deserializes to `None` (leave
/// alone) thanks to `#[serde(default)]`, while a present `null`
/// deserializes to `Some(None)` (clear) and a present value to
/// `Some(Some(v))`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateNeighborsRequest {
    #[serde(default)]
    pub prev_id: Option<Option<u64>>,
    #[serde(default)]
    pub prev_host: Option<Option<String>>,
    #[serde(default)]
    pub prev_socket_port: Option<Option<u16>>,
    #[serde(default)]
    pub next_id: Option<Option<u64>>,
    #[serde(default)]
    pub next_host: Option<Option<String>>,
    #[serde(default)]
    pub next_socket_port: Option<Option<u16>>,
    #[serde(default)]
    pub next_next_id: Option<Option<u64>>,
    #[serde(default)]
    pub next_next_host: Option<Option<String>>,
    #[serde(default)]
    pub next_next_socket_port: Option<Option<u16>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum JoinOutcome {
    CannotJoinSelf,
    AlreadyInRing,
    JoinedAsSecond,
    Joined,
}

impl JoinOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            JoinOutcome::CannotJoinSelf => "Cannot join myself",
            JoinOutcome::AlreadyInRing => "Node already in ring",
            JoinOutcome::JoinedAsSecond => "Joined as second node",
            JoinOutcome::Joined => "Node joined",
        }
    }
}

#[derive(Clone)]
pub struct RingManager {
    handle: NodeHandle,
    peers: PeerClient,
}

impl RingManager {
    pub fn new(handle: NodeHandle, peers: PeerClient) -> Self {
        RingManager { handle, peers }
    }

    async fn current_delay(&self) -> f64 {
        self.handle.current_delay().await
    }

    pub fn peer_client(&self) -> &PeerClient {
        &self.peers
    }

    pub async fn join(&self, joiner: NodeInfo) -> JoinOutcome {
        let self_id = self.handle.node_id;
        if joiner.node_id == self_id {
            return JoinOutcome::CannotJoinSelf;
        }

        let (is_singleton, existing_next_id) = {
            let state = self.handle.lock().await;
            (state.next.is_none(), state.next.as_ref().map(|n| n.node_id))
        };
        if existing_next_id == Some(joiner.node_id) {
            return JoinOutcome::AlreadyInRing;
        }

        if is_singleton {
            let self_info = {
                let mut state = self.handle.lock().await;
                state.next = Some(joiner.clone());
                state.prev = Some(joiner.clone());
                state.next_next = Some(state.self_info.clone());
                state.self_info.clone()
            };
            let delay = self.current_delay().await;
            let mut body = UpdateNeighborsBody::default();
            body.assign_prev(Some(&self_info));
            body.assign_next(Some(&self_info));
            body.assign_next_next(Some(&self_info));
            let _ = self.peers.post_update_neighbors(&joiner, delay, &body).await;
            self.refresh_next_next().await;
            return JoinOutcome::JoinedAsSecond;
        }

        let (self_info, old_next) = {
            let mut state = self.handle.lock().await;
            let old_next = state.next.clone().expect("checked non-singleton above");
            state.next = Some(joiner.clone());
            state.next_next = Some(old_next.clone());
            (state.self_info.clone(), old_next)
        };
        let delay = self.current_delay().await;
        let old_next_next = self
            .peers
            .probe_health(&old_next, delay)
            .await
            .and_then(|h| h.next)
            .unwrap_or_else(|| self_info.clone());

        let mut joiner_body = UpdateNeighborsBody::default();
        joiner_body.assign_prev(Some(&self_info));
        joiner_body.assign_next(Some(&old_next));
        joiner_body.assign_next_next(Some(&old_next_next));
        let _ = self.peers.post_update_neighbors(&joiner, delay, &joiner_body).await;

        let mut old_next_body = UpdateNeighborsBody::default();
        old_next_body.assign_prev(Some(&joiner));
        let _ = self.peers.post_update_neighbors(&old_next, delay, &old_next_body).await;

        let prev_snapshot = self.handle.lock().await.prev.clone();
        if let Some(prev) = prev_snapshot {
            if prev.node_id != self_id {
                let mut prev_body = UpdateNeighborsBody::default();
                prev_body.assign_next_next(Some(&joiner));
                let _ = self.peers.post_update_neighbors(&prev, delay, &prev_body).await;
            }
        }

        self.refresh_next_next().await;
        JoinOutcome::Joined
    }

    pub async fn leave(&self) {
        let (prev, next, delay) = {
            let state = self.handle.lock().await;
            (state.prev.clone(), state.next.clone(), state.delay)
        };

        if let (Some(prev), Some(next)) = (prev, next) {
            let mut to_prev = UpdateNeighborsBody::default();
            to_prev.assign_next(Some(&next));
            let _ = self.peers.post_update_neighbors(&prev, delay, &to_prev).await;

            let mut to_next = UpdateNeighborsBody::default();
            to_next.assign_prev(Some(&prev));
            let _ = self.peers.post_update_neighbors(&next, delay, &to_next).await;
        }

        let mut state = self.handle.lock().await;
        state.next = None;
        state.prev = None;
        state.next_next = None;
        state.leader_id = None;
        state.leader = None;
        state.in_election = false;
    }

    pub async fn apply_update_neighbors(&self, req: UpdateNeighborsRequest) {
        {
            let mut state = self.handle.lock().await;

            if let Some(prev_id) = req.prev_id {
                match prev_id {
                    None => state.prev = None,
                    Some(id) => {
                        if let (Some(Some(host)), Some(Some(port))) = (req.prev_host, req.prev_socket_port) {
                            state.prev = Some(NodeInfo::from_http_host(id, host, port));
                        }
                    }
                }
            }

            if let Some(next_id) = req.next_id {
                match next_id {
                    None => {
                        state.next = None;
                        state.next_next = None;
                    }
                    Some(id) => {
                        if let (Some(Some(host)), Some(Some(port))) = (req.next_host, req.next_socket_port) {
                            state.next = Some(NodeInfo::from_http_host(id, host, port));
                        }
                    }
                }
            }

            if let Some(next_next_id) = req.next_next_id {
                match next_next_id {
                    None => state.next_next = None,
                    Some(id) => {
                        if let (Some(Some(host)), Some(Some(port))) = (req.next_next_host, req.next_next_socket_port) {
                            state.next_next = Some(NodeInfo::from_http_host(id, host, port));
                        }
                    }
                }
            }
        }

        self.refresh_next_next().await;
    }

    /// Polls the current `next`'s `/health` for its own `next`, and
    /// uses that as our `next_next`. Run after every topology change
    /// so the shortcut pointer stays one hop ahead of `next`.
    async fn refresh_next_next(&self) {
        let (next, self_info, delay) = {
            let state = self.handle.lock().await;
            (state.next.clone(), state.self_info.clone(), state.delay)
        };

        let next = match next {
            Some(n) => n,
            None => {
                self.handle.lock().await.next_next = None;
                return;
            }
        };

        match self.peers.probe_health(&next, delay).await {
            Some(health) => {
                self.handle.lock().await.next_next = Some(health.next.unwrap_or(self_info));
            }
            None => {
                self.handle.lock().await.next_next = None;
            }
        }
    }

    /// Replaces a dead `next` with `next_next` if it's alive,
    /// otherwise walks the static registry in ring order from `self`,
    /// skipping `self` and the failed id, probing each candidate's
    /// health.
    pub async fn repair_next(&self, failed_id: u64) -> Result<NodeInfo, CoreError> {
        let self_id = self.handle.node_id;
        let excluded = [self_id, failed_id];
        let snapshot = self.handle.neighbor_snapshot().await;

        if let Some(nn) = snapshot.next_next.clone() {
            if !excluded.contains(&nn.node_id) && self.peers.probe_health(&nn, snapshot.delay).await.is_some() {
                return self.adopt_new_next(nn).await;
            }
        }

        for id in self.handle.registry.ordered_after(self_id, &excluded) {
            if let Some(entry) = self.handle.registry.get(id) {
                let candidate = NodeInfo::from_http_host(id, entry.host.clone(), entry.socket_port);
                if self.peers.probe_health(&candidate, snapshot.delay).await.is_some() {
                    return self.adopt_new_next(candidate).await;
                }
            }
        }

        Err(CoreError::Topology(format!("no alive replacement for next after {} failed", failed_id)))
    }

    async fn adopt_new_next(&self, candidate: NodeInfo) -> Result<NodeInfo, CoreError> {
        let (old_prev, self_info, delay) = {
            let mut state = self.handle.lock().await;
            let old_prev = state.prev.clone();
            state.next = Some(candidate.clone());
            (old_prev, state.self_info.clone(), state.delay)
        };

        let mut to_new_next = UpdateNeighborsBody::default();
        to_new_next.assign_prev(Some(&self_info));
        let _ = self.peers.post_update_neighbors(&candidate, delay, &to_new_next).await;

        self.refresh_next_next().await;

        if let Some(prev) = old_prev {
            if prev.node_id != self_info.node_id {
                let mut to_prev = UpdateNeighborsBody::default();
                to_prev.assign_next_next(Some(&candidate));
                let _ = self.peers.post_update_neighbors(&prev, delay, &to_prev).await;
            }
        }

        Ok(candidate)
    }

    /// Sends `req` to `next`, repairing and retrying exactly once if
    /// the first send fails. Shared by the Election Engine for
    /// token/leader forwarding.
    pub async fn send_to_next_with_repair(&self, req: &PeerRequest) -> Result<PeerResponse, CoreError> {
        let (next, delay) = {
            let state = self.handle.lock().await;
            (state.next.clone(), state.delay)
        };
        let next = match next {
            Some(n) => n,
            None => return Err(CoreError::Topology("no next node".into())),
        };

        let resp = self.peers.send_peer_message(&next, delay, req).await;
        if !resp.is_comm_error() {
            return Ok(resp);
        }

        let new_next = self.repair_next(next.node_id).await?;
        let delay = self.current_delay().await;
        let retry = self.peers.send_peer_message(&new_next, delay, req).await;
        if retry.is_comm_error() {
            Err(CoreError::Transport(retry.details.unwrap_or_else(|| "comm error after repair".into())))
        } else {
            Ok(retry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn info(id: u64, port: u16) -> NodeInfo {
        NodeInfo::new(id, format!("http://127.0.0.1:80{:02}", id), "127.0.0.1", port)
    }

    #[tokio::test]
    async fn join_rejects_self() {
        let handle = NodeHandle::new(info(1, 9001), Registry::new(Default::default()));
        let mgr = RingManager::new(handle, PeerClient::new());
        let outcome = mgr.join(info(1, 9001)).await;
        assert_eq!(outcome, JoinOutcome::CannotJoinSelf);
    }

    #[tokio::test]
    async fn update_neighbors_clears_on_explicit_null() {
        let handle = NodeHandle::new(info(1, 9001), Registry::new(Default::default()));
        {
            let mut state = handle.lock().await;
            state.prev = Some(info(2, 9002));
        }
        let mgr = RingManager::new(handle.clone(), PeerClient::new());
        let req: UpdateNeighborsRequest = serde_json::from_str(r#"{"prev_id": null}"#).unwrap();
        mgr.apply_update_neighbors(req).await;
        assert_eq!(handle.lock().await.prev, None);
    }

    #[tokio::test]
    async fn joining_as_second_node_closes_the_ring() {
        let handle = NodeHandle::new(info(1, 9001), Registry::new(Default::default()));
        let mgr = RingManager::new(handle.clone(), PeerClient::new());

        let outcome = mgr.join(info(2, 9002)).await;
        assert_eq!(outcome, JoinOutcome::JoinedAsSecond);

        let state = handle.lock().await;
        assert_eq!(state.next.as_ref().map(|n| n.node_id), Some(2));
        assert_eq!(state.prev.as_ref().map(|n| n.node_id), Some(2));
        assert_eq!(state.next_next.as_ref().map(|n| n.node_id), Some(1));
    }

    #[tokio::test]
    async fn update_neighbors_leaves_absent_fields_alone() {
        let handle = NodeHandle::new(info(1, 9001), Registry::new(Default::default()));
        {
            let mut state = handle.lock().await;
            state.prev = Some(info(2, 9002));
        }
        let mgr = RingManager::new(handle.clone(), PeerClient::new());
        let req: UpdateNeighborsRequest = serde_json::from_str(r#"{}"#).unwrap();
        mgr.apply_update_neighbors(req).await;
        assert_eq!(handle.lock().await.prev, Some(info(2, 9002)));
    }
}
