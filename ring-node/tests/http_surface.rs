//! Exercises the HTTP control surface over real loopback HTTP.

use std::net::SocketAddr;

use ring_core::election::ElectionEngine;
use ring_core::node_info::NodeInfo;
use ring_core::registry::Registry;
use ring_core::ring::RingManager;
use ring_core::state::NodeHandle;
use ring_core::transport::PeerClient;
use ring_core::variable::VariableService;
use ring_node::http::{router, AppState};

async fn spawn_node_http(id: u64) -> (NodeHandle, SocketAddr) {
    let self_info = NodeInfo::new(id, format!("http://127.0.0.1:800{}", id), "127.0.0.1", 9000 + id as u16);
    let handle = NodeHandle::new(self_info, Registry::default_deployment());
    let peers = PeerClient::new();
    let ring = RingManager::new(handle.clone(), peers.clone());
    let election = ElectionEngine::new(handle.clone(), ring.clone());
    let variable = VariableService::new(handle.clone(), peers, election.clone());

    let state = AppState { handle: handle.clone(), ring, election, variable };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener.into_std().unwrap())
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });

    (handle, addr)
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_alive_then_kill_flips_status_and_rejects_writes() {
    let (_, addr) = spawn_node_http(1).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let health: serde_json::Value = client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "alive");
    assert_eq!(health["node_id"], 1);

    let resp = client.post(format!("{}/kill", base)).send().await.unwrap();
    assert!(resp.status().is_success());

    let health: serde_json::Value = client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "killed");

    let resp = client.post(format!("{}/leave", base)).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);

    let resp = client.post(format!("{}/revive", base)).send().await.unwrap();
    assert!(resp.status().is_success());
    let health: serde_json::Value = client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "alive");
}

#[tokio::test(flavor = "multi_thread")]
async fn variable_get_with_no_leader_is_a_soft_error() {
    let (_, addr) = spawn_node_http(1).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let resp = client.get(format!("{}/variable", base)).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No leader elected");
}
