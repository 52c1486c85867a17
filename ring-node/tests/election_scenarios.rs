//! End-to-end scenarios over real loopback TCP peer connections.
//! Topology is wired directly through `NodeState` rather than via
//! HTTP `/join` calls — the HTTP surface has its own coverage in
//! `ring-core`'s unit tests, and these scenarios only need the
//! peer-TCP election/variable path to be real.

use std::collections::HashMap;
use std::time::Duration;

use ring_core::election::ElectionEngine;
use ring_core::node_info::NodeInfo;
use ring_core::registry::{Registry, RegistryEntry};
use ring_core::ring::RingManager;
use ring_core::state::NodeHandle;
use ring_core::transport::PeerClient;
use ring_core::variable::VariableService;
use ring_node::peer_listener;
use tokio::net::TcpListener;

struct TestNode {
    handle: NodeHandle,
    election: ElectionEngine,
    variable: VariableService,
}

/// Binds a real TCP peer listener for every id in `ids`, wires each
/// node's `next`/`prev`/`next_next` into a ring in the given order,
/// and returns one `TestNode` per id plus the registry they share.
async fn spin_up_ring(ids: &[u64]) -> HashMap<u64, TestNode> {
    let mut bound = Vec::new();
    for &id in ids {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        bound.push((id, listener, port));
    }

    let mut entries = HashMap::new();
    for (id, _listener, port) in &bound {
        entries.insert(*id, RegistryEntry { host: format!("http://127.0.0.1:{}", 8000 + id), socket_port: *port });
    }
    let registry = Registry::new(entries);

    let mut nodes = HashMap::new();
    for (id, listener, port) in bound {
        let self_info = NodeInfo::new(id, format!("http://127.0.0.1:{}", 8000 + id), "127.0.0.1", port);
        let handle = NodeHandle::new(self_info, registry.clone());
        let peers = PeerClient::new();
        let ring = RingManager::new(handle.clone(), peers.clone());
        let election = ElectionEngine::new(handle.clone(), ring);
        let variable = VariableService::new(handle.clone(), peers, election.clone());

        tokio::spawn(peer_listener::run(listener, election.clone(), variable.clone()));
        nodes.insert(id, TestNode { handle, election, variable });
    }

    let n = ids.len() as u64;
    for (i, &id) in ids.iter().enumerate() {
        let next_id = ids[(i + 1) % ids.len()];
        let prev_id = ids[(i + ids.len() - 1) % ids.len()];
        let next_next_id = ids[(i + 2) % ids.len()];
        let mut state = nodes[&id].handle.lock().await;
        state.next = Some(peer_node_info(&registry, next_id));
        state.prev = Some(peer_node_info(&registry, prev_id));
        if n > 1 {
            state.next_next = Some(peer_node_info(&registry, next_next_id));
        }
    }

    nodes
}

fn peer_node_info(registry: &Registry, id: u64) -> NodeInfo {
    let entry = registry.get(id).unwrap();
    NodeInfo::from_http_host(id, entry.host.clone(), entry.socket_port)
}

#[tokio::test(flavor = "multi_thread")]
async fn s1_three_node_election_converges_on_max_id() {
    let nodes = spin_up_ring(&[1, 2, 3]).await;

    tokio::time::timeout(Duration::from_secs(5), nodes[&1].election.start_election())
        .await
        .expect("election did not converge in time")
        .expect("election did not start cleanly");

    tokio::time::sleep(Duration::from_millis(50)).await;

    for id in [1, 2, 3] {
        let state = nodes[&id].handle.lock().await;
        assert_eq!(state.leader_id, Some(3), "node {} did not converge on leader 3", id);
        assert!(!state.in_election);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn s2_leader_kill_triggers_reelection_to_next_highest() {
    let nodes = spin_up_ring(&[1, 2, 3]).await;

    tokio::time::timeout(Duration::from_secs(5), nodes[&1].election.start_election())
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(nodes[&1].handle.lock().await.leader_id, Some(3));

    nodes[&3].handle.lock().await.kill();

    let err = tokio::time::timeout(Duration::from_secs(5), nodes[&1].variable.get())
        .await
        .expect("get() hung")
        .expect_err("get() should fail while leader is killed");
    assert_eq!(err.http_status(), 503);
    assert!(err.detail().contains("election restarted"), "detail was: {}", err.detail());

    tokio::time::sleep(Duration::from_millis(50)).await;
    for id in [1, 2] {
        let state = nodes[&id].handle.lock().await;
        assert_eq!(state.leader_id, Some(2), "node {} did not fail over to leader 2", id);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn s4_set_through_follower_is_visible_from_other_follower() {
    let nodes = spin_up_ring(&[1, 2, 3]).await;

    tokio::time::timeout(Duration::from_secs(5), nodes[&1].election.start_election())
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (value, set_by) = nodes[&1].variable.set(42).await.expect("set through follower failed");
    assert_eq!(value, 42);
    assert_eq!(set_by, 3);

    let (value, served_by) = nodes[&2].variable.get().await.expect("get through follower failed");
    assert_eq!(value, Some(42));
    assert_eq!(served_by, 3);
}
