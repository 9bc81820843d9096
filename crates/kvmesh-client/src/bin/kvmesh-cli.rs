use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kvmesh_client::{ClientSession, GrpcTransport};

#[derive(Parser, Debug)]
#[command(name = "kvmesh-cli", about = "Talk to a kvmesh cluster through any node")]
struct Cli {
    /// Node to connect to; requests for keys it does not own are relayed.
    #[arg(long, default_value = "127.0.0.1:50051")]
    addr: String,
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Put {
        key: String,
        value: String,
        /// Explicit write version (default: the session counter, starting at 0)
        #[arg(long)]
        version: Option<i64>,
    },
    Get {
        key: String,
    },
    Del {
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let transport =
        GrpcTransport::connect_with_timeout(&cli.addr, Some(Duration::from_millis(cli.timeout_ms)))
            .await
            .with_context(|| format!("failed to connect to {}", cli.addr))?;
    // One-shot invocation: nothing to cache across commands.
    let session = ClientSession::new(transport, 0);

    match cli.command {
        Command::Put { key, value, version } => {
            let ack = match version {
                Some(v) => session.put_with_version(&key, value.into_bytes(), v).await,
                None => session.put(&key, value.into_bytes()).await,
            }
            .with_context(|| format!("put '{key}'"))?;
            println!(
                "OK previous_version={} version={}",
                ack.previous_version, ack.applied_version
            );
        }
        Command::Get { key } => {
            let entry = session.get(&key).await.with_context(|| format!("get '{key}'"))?;
            println!("{} (version {})", String::from_utf8_lossy(&entry.value), entry.version);
        }
        Command::Del { key } => {
            session.del(&key).await.with_context(|| format!("del '{key}'"))?;
            println!("OK");
        }
    }
    Ok(())
}
