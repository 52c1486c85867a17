//! Log aggregator: accepts connections from nodes' aggregator logging
//! layer and appends each record to an output file and to stdout,
//! forever.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "ring-aggregator", about = "Collects node logs shipped over the aggregator protocol")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 9020)]
    port: u16,
    #[arg(long, default_value = "logs/aggregated.log")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();

    if let Some(parent) = cli.output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(&cli.output).await?;
    let file = Arc::new(Mutex::new(file));

    let listener = TcpListener::bind((cli.host.as_str(), cli.port)).await?;
    info!(host = %cli.host, port = cli.port, output = %cli.output.display(), "log aggregator listening");

    loop {
        let (socket, addr) = listener.accept().await?;
        let file = file.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, file).await {
                warn!(peer = %addr, error = %e, "aggregator connection ended");
            }
        });
    }
}

async fn handle_connection(mut socket: TcpStream, file: Arc<Mutex<tokio::fs::File>>) -> anyhow::Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        if socket.read_exact(&mut len_buf).await.is_err() {
            return Ok(());
        }
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        socket.read_exact(&mut payload).await?;

        let record: serde_json::Value = match serde_json::from_slice(&payload) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "dropping malformed log record");
                continue;
            }
        };

        let line = format!("{}\n", record);
        println!("{}", record);
        let mut file = file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
    }
}
