//! Outbound transport for the Ring Manager and Election Engine: a TCP
//! peer client and the handful of HTTP calls the core makes to other
//! nodes' control surfaces (health probes, `/update_neighbors`
//! pushes).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::delay::{apply_send_delay, http_timeout, peer_timeout};
use crate::message::{read_frame, write_frame, PeerRequest, PeerResponse};
use crate::node_info::NodeInfo;
use crate::state::HealthSnapshot;

const BASE_HTTP_TIMEOUT: Duration = Duration::from_secs(2);
const BASE_PEER_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl Default for PeerClient {
    fn default() -> Self {
        PeerClient { http: reqwest::Client::new() }
    }
}

impl PeerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends one JSON request over a fresh TCP connection and reads
    /// one JSON response back, applying the send-side delay and the
    /// peer-channel timeout inflation. Never returns an `Err`;
    /// communication failures are surfaced as the synthetic
    /// `SOCKET_COMM_ERROR` response the peer protocol defines.
    pub async fn send_peer_message(&self, target: &NodeInfo, delay_secs: f64, req: &PeerRequest) -> PeerResponse {
        apply_send_delay(delay_secs).await;
        let timeout = peer_timeout(BASE_PEER_TIMEOUT, delay_secs);
        match tokio::time::timeout(timeout, self.send_peer_message_inner(target, req)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => PeerResponse::comm_error(e.to_string()),
            Err(_) => PeerResponse::comm_error("timed out"),
        }
    }

    async fn send_peer_message_inner(&self, target: &NodeInfo, req: &PeerRequest) -> std::io::Result<PeerResponse> {
        let (host, port) = target.socket_addr();
        let mut stream = TcpStream::connect((host.as_str(), port)).await?;
        let payload = serde_json::to_vec(req).expect("PeerRequest always serializes");
        write_frame(&mut stream, &payload).await?;
        stream.shutdown().await.ok();
        let frame = read_frame(&mut stream).await?;
        if frame.is_empty() {
            return Ok(PeerResponse::default());
        }
        serde_json::from_slice(&frame)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Probes `target`'s `/health` endpoint with a short timeout,
    /// returning `None` on any failure — used by repair to test a
    /// replacement successor's liveness.
    pub async fn probe_health(&self, target: &NodeInfo, delay_secs: f64) -> Option<HealthSnapshot> {
        apply_send_delay(delay_secs).await;
        let timeout = http_timeout(Duration::from_secs(1), delay_secs);
        let url = format!("{}/health", target.http_host);
        let resp = tokio::time::timeout(timeout, self.http.get(&url).send()).await.ok()??;
        resp.json::<HealthSnapshot>().await.ok()
    }

    /// Best-effort push of a partial neighbor update to `target`.
    /// Failures are swallowed by the caller.
    pub async fn post_update_neighbors(&self, target: &NodeInfo, delay_secs: f64, body: &UpdateNeighborsBody) -> Result<(), String> {
        apply_send_delay(delay_secs).await;
        let timeout = http_timeout(BASE_HTTP_TIMEOUT, delay_secs);
        let url = format!("{}/update_neighbors", target.http_host);
        tokio::time::timeout(timeout, self.http.post(&url).json(body).send())
            .await
            .map_err(|_| "timed out".to_string())?
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Wire body for an outbound `/update_neighbors` push. Outbound pushes
/// always state every field of the triple they're updating, so a
/// plain `Option<NodeInfo>` — `None` meaning "clear" — is enough;
/// omitted triples are simply not included by the caller composing
/// the body.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateNeighborsBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_id: Option<Option<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_host: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_socket_port: Option<Option<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_id: Option<Option<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_host: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_socket_port: Option<Option<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_next_id: Option<Option<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_next_host: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_next_socket_port: Option<Option<u16>>,
}

impl UpdateNeighborsBody {
    pub fn set_prev(node: Option<&NodeInfo>) -> Self {
        let mut body = Self::default();
        body.assign_prev(node);
        body
    }

    pub fn set_next(node: Option<&NodeInfo>) -> Self {
        let mut body = Self::default();
        body.assign_next(node);
        body
    }

    pub fn set_next_next(node: Option<&NodeInfo>) -> Self {
        let mut body = Self::default();
        body.assign_next_next(node);
        body
    }

    pub fn assign_prev(&mut self, node: Option<&NodeInfo>) {
        self.prev_id = Some(node.map(|n| n.node_id));
        self.prev_host = Some(node.map(|n| n.http_host.clone()));
        self.prev_socket_port = Some(node.map(|n| n.socket_port));
    }

    pub fn assign_next(&mut self, node: Option<&NodeInfo>) {
        self.next_id = Some(node.map(|n| n.node_id));
        self.next_host = Some(node.map(|n| n.http_host.clone()));
        self.next_socket_port = Some(node.map(|n| n.socket_port));
    }

    pub fn assign_next_next(&mut self, node: Option<&NodeInfo>) {
        self.next_next_id = Some(node.map(|n| n.node_id));
        self.next_next_host = Some(node.map(|n| n.http_host.clone()));
        self.next_next_socket_port = Some(node.map(|n| n.socket_port));
    }
}
