//! Logging setup: a stdout layer, a non-blocking file layer writing
//! `node_<id>.log`, and a third layer that ships each event as a
//! length-prefixed JSON frame to the log aggregator.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry as SubscriberRegistry};

/// Must be held for the lifetime of the process; dropping it stops
/// the non-blocking file writer.
pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

pub fn init(node_id: u64, aggregator_host: &str, aggregator_port: u16) -> LoggingGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::never(".", format!("node_{}.log", node_id));
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking);
    let aggregator_layer = AggregatorLayer::spawn(node_id, aggregator_host.to_string(), aggregator_port);

    SubscriberRegistry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .with(aggregator_layer)
        .init();

    LoggingGuard { _file_guard: file_guard }
}

/// Forwards every event as one JSON object, 4-byte-big-endian-length
/// prefixed, down an unbounded channel drained by a background task
/// that owns (and transparently reconnects) a TCP connection to the
/// aggregator. A disconnected aggregator never blocks logging: sends
/// are fire-and-forget and a full/broken channel is silently dropped.
struct AggregatorLayer {
    node_id: u64,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl AggregatorLayer {
    fn spawn(node_id: u64, host: String, port: u16) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(aggregator_sender_task(host, port, rx));
        AggregatorLayer { node_id, tx }
    }
}

async fn aggregator_sender_task(host: String, port: u16, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    let mut conn: Option<TcpStream> = None;
    loop {
        let frame = match rx.recv().await {
            Some(f) => f,
            None => return,
        };
        if conn.is_none() {
            conn = TcpStream::connect((host.as_str(), port)).await.ok();
        }
        if let Some(stream) = conn.as_mut() {
            let len = (frame.len() as u32).to_be_bytes();
            if stream.write_all(&len).await.is_err() || stream.write_all(&frame).await.is_err() {
                conn = None;
            }
        }
    }
}

impl<S: Subscriber> Layer<S> for AggregatorLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = JsonFieldVisitor::default();
        event.record(&mut visitor);

        let mut record = BTreeMap::new();
        record.insert("node_id".to_string(), Value::from(self.node_id));
        record.insert("level".to_string(), Value::from(event.metadata().level().as_str()));
        record.insert("target".to_string(), Value::from(event.metadata().target()));
        for (k, v) in visitor.fields {
            record.insert(k, v);
        }

        if let Ok(payload) = serde_json::to_vec(&record) {
            let _ = self.tx.send(payload);
        }
    }
}

#[derive(Default)]
struct JsonFieldVisitor {
    fields: BTreeMap<String, Value>,
}

impl Visit for JsonFieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields.insert(field.name().to_string(), Value::from(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }
}
