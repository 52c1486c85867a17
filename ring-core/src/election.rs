//! Chang–Roberts election engine: token forwarding, leader
//! declaration, and leader-announcement flooding over the peer TCP
//! channel.

use crate::error::CoreError;
use crate::message::{PeerRequest, PeerResponse};
use crate::node_info::NodeInfo;
use crate::ring::RingManager;
use crate::state::NodeHandle;

#[derive(Clone)]
pub struct ElectionEngine {
    handle: NodeHandle,
    ring: RingManager,
}

impl ElectionEngine {
    pub fn new(handle: NodeHandle, ring: RingManager) -> Self {
        ElectionEngine { handle, ring }
    }

    /// Begins a new Chang–Roberts round, seeding the token with this
    /// node's own id. A no-op if an election is already in flight.
    pub async fn start_election(&self) -> Result<(), CoreError> {
        let self_id = self.handle.node_id;
        let (alive, in_election, next) = {
            let state = self.handle.lock().await;
            (state.alive, state.in_election, state.next.clone())
        };

        if !alive {
            return Err(CoreError::Administrative);
        }
        if in_election {
            // Concurrent election starts are guarded: ack without a second token.
            return Ok(());
        }
        let next = match next {
            Some(n) => n,
            None => return Err(CoreError::Topology("node not in ring".into())),
        };

        if next.node_id == self_id {
            self.declare_leader_and_broadcast().await;
            return Ok(());
        }

        {
            let mut state = self.handle.lock().await;
            state.in_election = true;
            state.leader_id = None;
            state.leader = None;
        }

        let msg = PeerRequest::Election { candidate_id: self_id };
        match self.ring.send_to_next_with_repair(&msg).await {
            Ok(resp) => {
                if let Some(err) = resp.error {
                    self.handle.lock().await.in_election = false;
                    Err(CoreError::Topology(err))
                } else {
                    Ok(())
                }
            }
            Err(e) => {
                self.handle.lock().await.in_election = false;
                Err(e)
            }
        }
    }

    /// Peer `{type: "ELECTION"}` handler. A killed node still reaches
    /// this and forwards the token unchanged without substituting its
    /// own id, acting as a passive wire so the election can still
    /// complete around it.
    pub async fn handle_election_token(&self, candidate_id: u64) -> PeerResponse {
        let alive = self.handle.lock().await.alive;

        if !alive {
            return self.forward_election(candidate_id).await;
        }

        let self_id = self.handle.node_id;
        if candidate_id == self_id {
            return self.declare_leader_and_broadcast().await;
        }

        let forward_id = if candidate_id > self_id { candidate_id } else { self_id };
        self.forward_election(forward_id).await
    }

    async fn forward_election(&self, candidate_id: u64) -> PeerResponse {
        let msg = PeerRequest::Election { candidate_id };
        match self.ring.send_to_next_with_repair(&msg).await {
            Ok(_) => PeerResponse::status("FORWARDED"),
            Err(CoreError::Topology(_)) => PeerResponse::error("NO_NEXT_NODE"),
            Err(CoreError::Transport(detail)) => PeerResponse::comm_error(detail),
            Err(_) => PeerResponse::comm_error("unexpected error"),
        }
    }

    async fn declare_leader_and_broadcast(&self) -> PeerResponse {
        let (self_info, next) = {
            let mut state = self.handle.lock().await;
            state.leader_id = Some(state.node_id());
            state.leader = Some(state.self_info.clone());
            state.in_election = false;
            (state.self_info.clone(), state.next.clone())
        };

        if let Some(next) = next {
            if next.node_id != self_info.node_id {
                let msg = PeerRequest::Leader {
                    leader_id: self_info.node_id,
                    leader_host: self_info.http_host.clone(),
                    leader_socket_port: self_info.socket_port,
                };
                let _ = self.ring.send_to_next_with_repair(&msg).await;
            }
        }

        PeerResponse::status("LEADER")
    }

    /// Peer `{type: "LEADER"}` handler. Stops the flood exactly once
    /// it has already recorded `leader_id` (this naturally stops at
    /// the originator, whose `leader_id` was set by
    /// `declare_leader_and_broadcast` before the message can loop
    /// back).
    pub async fn handle_leader_announcement(&self, leader_id: u64, leader_host: String, leader_port: u16) -> PeerResponse {
        let (alive, next, delay, already_known) = {
            let state = self.handle.lock().await;
            (state.alive, state.next.clone(), state.delay, state.leader_id == Some(leader_id))
        };

        if !alive {
            if let Some(next) = next {
                let msg = PeerRequest::Leader {
                    leader_id,
                    leader_host: leader_host.clone(),
                    leader_socket_port: leader_port,
                };
                let _ = self.ring.peer_client().send_peer_message(&next, delay, &msg).await;
            }
            return PeerResponse::status("IGNORED");
        }

        if already_known {
            return PeerResponse::status("OK");
        }

        {
            let mut state = self.handle.lock().await;
            state.leader_id = Some(leader_id);
            state.leader = Some(NodeInfo::from_http_host(leader_id, leader_host.clone(), leader_port));
            state.in_election = false;
        }

        if self.handle.node_id != leader_id {
            let msg = PeerRequest::Leader { leader_id, leader_host, leader_socket_port: leader_port };
            let _ = self.ring.send_to_next_with_repair(&msg).await;
        }

        PeerResponse::status("OK")
    }
}
