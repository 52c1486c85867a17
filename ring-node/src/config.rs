//! Layered configuration: built-in defaults, then the static registry
//! entry for this node (if any), then an optional TOML file, then the
//! environment, then CLI flags — each layer only overriding what the
//! previous one set.

use clap::Parser;
use config::{Config, Environment, File};
use ring_core::registry::{default_log_aggregator, Registry};
use serde::Deserialize;

#[derive(Parser, Debug, Default)]
#[command(name = "ring-node", about = "Ring-organized coordination node")]
pub struct Cli {
    #[arg(long, env = "NODE_ID")]
    pub node_id: Option<u64>,
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
    #[arg(long, env = "HOST")]
    pub host: Option<String>,
    #[arg(long, env = "SOCKET_PORT")]
    pub socket_port: Option<u16>,
    #[arg(long, env = "MESSAGE_DELAY")]
    pub message_delay: Option<f64>,
    #[arg(long, env = "LOG_AGGREGATOR_HOST")]
    pub log_aggregator_host: Option<String>,
    #[arg(long, env = "LOG_AGGREGATOR_PORT")]
    pub log_aggregator_port: Option<u16>,
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodeSettings {
    pub node_id: u64,
    pub port: u16,
    pub host: String,
    pub socket_port: u16,
    #[serde(default)]
    pub message_delay: f64,
    pub log_aggregator_host: String,
    pub log_aggregator_port: u16,
}

impl NodeSettings {
    /// Resolves settings from defaults, the static registry, an
    /// optional TOML file, the environment, and finally `cli`
    /// (highest priority).
    pub fn resolve(cli: &Cli, registry: &Registry) -> anyhow::Result<Self> {
        let node_id = cli.node_id.unwrap_or(1);
        let registry_entry = registry.get(node_id).cloned();
        let aggregator = default_log_aggregator();

        let mut builder = Config::builder()
            .set_default("node_id", node_id)?
            .set_default("port", 8000_i64)?
            .set_default("host", "http://127.0.0.1:8000".to_string())?
            .set_default("socket_port", (9000 + node_id) as i64)?
            .set_default("message_delay", 0.0)?
            .set_default("log_aggregator_host", aggregator.host.clone())?
            .set_default("log_aggregator_port", aggregator.port as i64)?;

        if let Some(entry) = &registry_entry {
            builder = builder
                .set_default("host", entry.host.clone())?
                .set_default("socket_port", entry.socket_port as i64)?;
        }

        if let Some(path) = &cli.config_file {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        builder = builder.add_source(Environment::default());

        let mut settings: NodeSettings = builder.build()?.try_deserialize()?;

        if let Some(v) = cli.node_id {
            settings.node_id = v;
        }
        if let Some(v) = cli.port {
            settings.port = v;
        }
        if let Some(v) = &cli.host {
            settings.host = v.clone();
        }
        if let Some(v) = cli.socket_port {
            settings.socket_port = v;
        }
        if let Some(v) = cli.message_delay {
            settings.message_delay = v;
        }
        if let Some(v) = &cli.log_aggregator_host {
            settings.log_aggregator_host = v.clone();
        }
        if let Some(v) = cli.log_aggregator_port {
            settings.log_aggregator_port = v;
        }

        Ok(settings)
    }
}
