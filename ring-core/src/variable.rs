//! Shared-Variable Service: leader-side storage of one integer, with
//! non-leaders forwarding and triggering re-election on any sign of
//! leader loss.

use crate::election::ElectionEngine;
use crate::message::{PeerRequest, PeerResponse};
use crate::state::NodeHandle;
use crate::transport::PeerClient;

#[derive(Clone, Debug, PartialEq)]
pub enum VariableError {
    /// 503: this node itself is killed.
    Administrative,
    /// Soft error, HTTP 200 body `{error: "No leader elected"}`.
    NoLeader,
    /// 503/504 with a detail annotated by whether re-election started.
    LeaderUnavailable {
        status_code: u16,
        base_detail: String,
        election_restarted: bool,
        election_failure: Option<String>,
    },
}

impl VariableError {
    pub fn http_status(&self) -> u16 {
        match self {
            VariableError::Administrative => 503,
            VariableError::NoLeader => 200,
            VariableError::LeaderUnavailable { status_code, .. } => *status_code,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            VariableError::Administrative => "Node is killed".to_string(),
            VariableError::NoLeader => "No leader elected".to_string(),
            VariableError::LeaderUnavailable { base_detail, election_restarted, election_failure, .. } => {
                if *election_restarted {
                    format!("{} - election restarted", base_detail)
                } else {
                    let failure = election_failure.clone().unwrap_or_else(|| "election could not be started".to_string());
                    format!("{} - election failed: {}", base_detail, failure)
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct VariableService {
    handle: NodeHandle,
    peers: PeerClient,
    election: ElectionEngine,
}

impl VariableService {
    pub fn new(handle: NodeHandle, peers: PeerClient, election: ElectionEngine) -> Self {
        VariableService { handle, peers, election }
    }

    /// `GET /variable`. Returns `(value, served_by)` on success.
    pub async fn get(&self) -> Result<(Option<i64>, u64), VariableError> {
        let (alive, leader_id, leader, self_id, shared_value) = {
            let state = self.handle.lock().await;
            (state.alive, state.leader_id, state.leader.clone(), state.node_id(), state.shared_value)
        };

        if !alive {
            return Err(VariableError::Administrative);
        }
        let leader = match leader {
            Some(l) => l,
            None => return Err(VariableError::NoLeader),
        };
        if leader_id == Some(self_id) {
            return Ok((shared_value, self_id));
        }

        let delay = self.handle.current_delay().await;
        let resp = self.peers.send_peer_message(&leader, delay, &PeerRequest::GetVar).await;

        if resp.is_comm_error() {
            let (restarted, failure) = self.trigger_reelection("Leader socket unreachable during GET_VAR").await;
            return Err(VariableError::LeaderUnavailable {
                status_code: 503,
                base_detail: "Leader socket unreachable".into(),
                election_restarted: restarted,
                election_failure: failure,
            });
        }
        if resp.is_empty() {
            let (restarted, failure) = self.trigger_reelection("Leader timeout during GET_VAR").await;
            return Err(VariableError::LeaderUnavailable {
                status_code: 504,
                base_detail: "Leader did not respond".into(),
                election_restarted: restarted,
                election_failure: failure,
            });
        }
        if resp.is_leader_loss_error() {
            let code = resp.error.clone().unwrap_or_default();
            let (restarted, failure) = self.trigger_reelection(&format!("Leader responded with {} during GET_VAR", code)).await;
            return Err(VariableError::LeaderUnavailable {
                status_code: 503,
                base_detail: "Leader unavailable".into(),
                election_restarted: restarted,
                election_failure: failure,
            });
        }

        Ok((resp.value, resp.leader_id.unwrap_or(leader_id.unwrap_or(self_id))))
    }

    /// `POST /variable {value}`. Returns `(value, set_by)` on success.
    pub async fn set(&self, value: i64) -> Result<(i64, u64), VariableError> {
        let (alive, leader_id, leader, self_id) = {
            let state = self.handle.lock().await;
            (state.alive, state.leader_id, state.leader.clone(), state.node_id())
        };

        if !alive {
            return Err(VariableError::Administrative);
        }
        let leader = match leader {
            Some(l) => l,
            None => return Err(VariableError::NoLeader),
        };
        if leader_id == Some(self_id) {
            self.handle.lock().await.shared_value = Some(value);
            return Ok((value, self_id));
        }

        let delay = self.handle.current_delay().await;
        let resp = self.peers.send_peer_message(&leader, delay, &PeerRequest::SetVar { value }).await;

        if resp.is_comm_error() {
            let (restarted, failure) = self.trigger_reelection("Leader socket unreachable during SET_VAR").await;
            return Err(VariableError::LeaderUnavailable {
                status_code: 503,
                base_detail: "Leader socket unreachable".into(),
                election_restarted: restarted,
                election_failure: failure,
            });
        }
        if resp.is_empty() {
            let (restarted, failure) = self.trigger_reelection("Leader timeout during SET_VAR").await;
            return Err(VariableError::LeaderUnavailable {
                status_code: 504,
                base_detail: "Leader did not respond".into(),
                election_restarted: restarted,
                election_failure: failure,
            });
        }
        if resp.is_leader_loss_error() {
            let code = resp.error.clone().unwrap_or_default();
            let (restarted, failure) = self.trigger_reelection(&format!("Leader responded with {} during SET_VAR", code)).await;
            return Err(VariableError::LeaderUnavailable {
                status_code: 503,
                base_detail: "Leader unavailable".into(),
                election_restarted: restarted,
                election_failure: failure,
            });
        }

        Ok((resp.value.unwrap_or(value), resp.leader_id.unwrap_or(self_id)))
    }

    /// Peer `{type: "GET_VAR"}` handler: answers only when this node
    /// currently believes it is the leader, otherwise rejects with a
    /// code the caller treats as leader loss.
    pub async fn handle_peer_get(&self) -> PeerResponse {
        let state = self.handle.lock().await;
        if !state.alive {
            return PeerResponse::error_with_leader("NODE_KILLED", state.leader_id.unwrap_or(state.node_id()));
        }
        if !state.is_leader() {
            return match state.leader_id {
                Some(id) => PeerResponse::error_with_leader("NOT_LEADER", id),
                None => PeerResponse::error("NOT_LEADER"),
            };
        }
        PeerResponse { value: state.shared_value, leader_id: Some(state.node_id()), ..Default::default() }
    }

    /// Peer `{type: "SET_VAR", value}` handler.
    pub async fn handle_peer_set(&self, value: i64) -> PeerResponse {
        let mut state = self.handle.lock().await;
        if !state.alive {
            return PeerResponse::error_with_leader("NODE_KILLED", state.leader_id.unwrap_or(state.node_id()));
        }
        if !state.is_leader() {
            return match state.leader_id {
                Some(id) => PeerResponse::error_with_leader("NOT_LEADER", id),
                None => PeerResponse::error("NOT_LEADER"),
            };
        }
        state.shared_value = Some(value);
        PeerResponse { status: Some("OK".into()), value: Some(value), leader_id: Some(state.node_id()), ..Default::default() }
    }

    /// Clears leader state and re-initiates election, reporting
    /// whether re-election started.
    async fn trigger_reelection(&self, reason: &str) -> (bool, Option<String>) {
        tracing::warn!("{} - triggering election", reason);
        {
            let mut state = self.handle.lock().await;
            state.leader_id = None;
            state.leader = None;
            state.in_election = false;
        }
        match self.election.start_election().await {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_info::NodeInfo;
    use crate::registry::Registry;
    use crate::ring::RingManager;

    fn bare_handle() -> NodeHandle {
        let info = NodeInfo::new(1, "http://127.0.0.1:8001", "127.0.0.1", 9001);
        NodeHandle::new(info, Registry::new(Default::default()))
    }

    #[tokio::test]
    async fn get_served_locally_when_self_is_leader() {
        let handle = bare_handle();
        {
            let mut state = handle.lock().await;
            state.leader_id = Some(1);
            state.leader = Some(state.self_info.clone());
            state.shared_value = Some(42);
        }
        let ring = RingManager::new(handle.clone(), PeerClient::new());
        let election = ElectionEngine::new(handle.clone(), ring);
        let svc = VariableService::new(handle, PeerClient::new(), election);

        let (value, served_by) = svc.get().await.unwrap();
        assert_eq!(value, Some(42));
        assert_eq!(served_by, 1);
    }

    #[tokio::test]
    async fn get_without_leader_is_soft_error() {
        let handle = bare_handle();
        let ring = RingManager::new(handle.clone(), PeerClient::new());
        let election = ElectionEngine::new(handle.clone(), ring);
        let svc = VariableService::new(handle, PeerClient::new(), election);

        let err = svc.get().await.unwrap_err();
        assert_eq!(err, VariableError::NoLeader);
        assert_eq!(err.http_status(), 200);
    }

    #[tokio::test]
    async fn killed_node_rejects_variable_ops() {
        let handle = bare_handle();
        handle.lock().await.kill();
        let ring = RingManager::new(handle.clone(), PeerClient::new());
        let election = ElectionEngine::new(handle.clone(), ring);
        let svc = VariableService::new(handle, PeerClient::new(), election);

        let err = svc.get().await.unwrap_err();
        assert_eq!(err, VariableError::Administrative);
        assert_eq!(err.http_status(), 503);

        let err = svc.set(7).await.unwrap_err();
        assert_eq!(err, VariableError::Administrative);
    }

    #[tokio::test]
    async fn peer_get_var_rejects_when_not_leader() {
        let handle = bare_handle();
        handle.lock().await.leader_id = Some(2);
        let ring = RingManager::new(handle.clone(), PeerClient::new());
        let election = ElectionEngine::new(handle.clone(), ring);
        let svc = VariableService::new(handle, PeerClient::new(), election);

        let resp = svc.handle_peer_get().await;
        assert_eq!(resp.error.as_deref(), Some("NOT_LEADER"));
        assert_eq!(resp.leader_id, Some(2));
    }

    #[tokio::test]
    async fn peer_set_var_succeeds_when_leader() {
        let handle = bare_handle();
        handle.lock().await.leader_id = Some(1);
        let ring = RingManager::new(handle.clone(), PeerClient::new());
        let election = ElectionEngine::new(handle.clone(), ring);
        let svc = VariableService::new(handle.clone(), PeerClient::new(), election);

        let resp = svc.handle_peer_set(9).await;
        assert_eq!(resp.status.as_deref(), Some("OK"));
        assert_eq!(resp.value, Some(9));
        assert_eq!(handle.lock().await.shared_value, Some(9));
    }
}
