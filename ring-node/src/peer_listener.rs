//! Peer TCP channel listener. One connection, one request, one
//! response, then close — no long-lived per-connection handler, since
//! each peer exchange is a single short-lived request/response.

use ring_core::election::ElectionEngine;
use ring_core::message::{read_frame, write_frame, PeerRequest, PeerResponse};
use ring_core::variable::VariableService;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, instrument, warn};

pub async fn run(listener: TcpListener, election: ElectionEngine, variable: VariableService) -> std::io::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        let election = election.clone();
        let variable = variable.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, &election, &variable).await {
                warn!(peer = %addr, error = %e, "peer connection error");
            }
        });
    }
}

#[instrument(skip(socket, election, variable))]
async fn handle_connection(mut socket: TcpStream, election: &ElectionEngine, variable: &VariableService) -> std::io::Result<()> {
    let frame = read_frame(&mut socket).await?;
    if frame.is_empty() {
        return Ok(());
    }

    let request: PeerRequest = match serde_json::from_slice(&frame) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "malformed peer frame");
            let resp = PeerResponse::error("MALFORMED_REQUEST");
            let payload = serde_json::to_vec(&resp).expect("PeerResponse always serializes");
            return write_frame(&mut socket, &payload).await;
        }
    };

    debug!(?request, "dispatching peer request");
    let response = dispatch(request, election, variable).await;
    let payload = serde_json::to_vec(&response).expect("PeerResponse always serializes");
    write_frame(&mut socket, &payload).await
}

async fn dispatch(request: PeerRequest, election: &ElectionEngine, variable: &VariableService) -> PeerResponse {
    match request {
        PeerRequest::Election { candidate_id } => election.handle_election_token(candidate_id).await,
        PeerRequest::Leader { leader_id, leader_host, leader_socket_port } => {
            election.handle_leader_announcement(leader_id, leader_host, leader_socket_port).await
        }
        PeerRequest::GetVar => variable.handle_peer_get().await,
        PeerRequest::SetVar { value } => variable.handle_peer_set(value).await,
        PeerRequest::Ping => PeerResponse::status("OK"),
    }
}
