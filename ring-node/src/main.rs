use clap::Parser;
use ring_core::election::ElectionEngine;
use ring_core::node_info::NodeInfo;
use ring_core::registry::Registry;
use ring_core::ring::RingManager;
use ring_core::state::NodeHandle;
use ring_core::transport::PeerClient;
use ring_core::variable::VariableService;
use ring_node::config::{Cli, NodeSettings};
use ring_node::{http, logging, peer_listener};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let registry = Registry::default_deployment();
    let settings = NodeSettings::resolve(&cli, &registry)?;

    let _logging_guard = logging::init(settings.node_id, &settings.log_aggregator_host, settings.log_aggregator_port);

    info!(node_id = settings.node_id, port = settings.port, socket_port = settings.socket_port, "starting node");

    let self_info = NodeInfo::new(settings.node_id, settings.host.clone(), "0.0.0.0", settings.socket_port);
    let handle = NodeHandle::new(self_info, registry);
    handle.lock().await.delay = settings.message_delay;

    let peers = PeerClient::new();
    let ring = RingManager::new(handle.clone(), peers.clone());
    let election = ElectionEngine::new(handle.clone(), ring.clone());
    let variable = VariableService::new(handle.clone(), peers, election.clone());

    let socket_listener = TcpListener::bind(("0.0.0.0", settings.socket_port)).await?;
    let peer_task = tokio::spawn(peer_listener::run(socket_listener, election.clone(), variable.clone()));

    let state = http::AppState { handle, ring, election, variable };
    let app = http::router(state);
    let http_addr: std::net::SocketAddr = ([0, 0, 0, 0], settings.port).into();

    tokio::select! {
        res = axum::Server::bind(&http_addr).serve(app.into_make_service()) => {
            res?;
        }
        res = peer_task => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}
