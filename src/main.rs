//! Driver binary: wires a concrete `RocksKv`, a concrete `ChainRpc` client,
//! and an `EventBus` together, then exposes a minimal CLI for driving
//! CONNECT/DISCONNECT by hand.
//!
//! The core has no opinion on *which* block to connect or disconnect next
//! (§6: the block/chain follower is an external collaborator) — this
//! binary is a thin harness that makes the crate runnable, not a
//! production follower loop.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fs2::FileExt;
use tracing::{error, info};

use chainindex::config::{get_db_path, load_config};
use chainindex::events::EventBus;
use chainindex::indexer::Indexer;
use chainindex::kv::RocksKv;
use chainindex::metrics;
use chainindex::query::Query;
use chainindex::rpc::JsonRpcChainClient;
use chainindex::telemetry::{init_tracing, truncate_hex, TelemetryConfig};

#[derive(Parser)]
#[command(name = "chainindex-follower", about = "Drives CONNECT/DISCONNECT against the indexer core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// CONNECT a block at the tip.
    Connect {
        #[arg(long)]
        block_id: String,
        #[arg(long)]
        height: u32,
    },
    /// DISCONNECT the current tip block.
    Disconnect {
        #[arg(long)]
        block_id: String,
    },
    /// Print the current tip.
    Tip,
}

fn parse_hex32(s: &str) -> Result<[u8; 32], Box<dyn std::error::Error>> {
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
        return Err("expected a 32-byte hex-encoded id".into());
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    init_tracing(TelemetryConfig::default())?;
    metrics::register_all()?;

    let db_path = get_db_path(&config)?;

    // Single logical writer enforcement (SPEC_FULL §2): only one process
    // may hold this data directory open at a time.
    std::fs::create_dir_all(&db_path)?;
    let lock_path = PathBuf::from(&db_path).join(".chainindex.lock");
    let lock_file = std::fs::File::create(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| "another chainindex process already holds this data directory")?;

    let kv = Arc::new(RocksKv::open(&db_path)?);

    let rpc_host = config.get_string("rpc.host")?;
    let rpc_user = config.get_string("rpc.user")?;
    let rpc_pass = config.get_string("rpc.pass")?;
    let rpc = Arc::new(JsonRpcChainClient::connect(rpc_host, rpc_user, rpc_pass));

    let events = EventBus::new();
    let indexer = Indexer::new(kv.clone(), rpc.clone(), events);
    let query = Query::new(kv, rpc);

    let cli = Cli::parse();
    match cli.command {
        Command::Connect { block_id, height } => {
            let block_id = parse_hex32(&block_id)?;
            match indexer.connect(block_id, height).await {
                Ok(Some(next)) => info!(next_block_hash = %truncate_hex(&hex::encode(next), 16), "connect succeeded"),
                Ok(None) => info!("connect succeeded, already at chain tip"),
                Err(e) => {
                    error!(error = %e, "connect failed");
                    return Err(e.into());
                }
            }
        }
        Command::Disconnect { block_id } => {
            let block_id = parse_hex32(&block_id)?;
            if let Err(e) = indexer.disconnect(block_id).await {
                error!(error = %e, "disconnect failed");
                return Err(e.into());
            }
            info!("disconnect succeeded");
        }
        Command::Tip => match query.tip().await? {
            Some(tip) => println!("{} @ {}", hex::encode(tip.block_id), tip.height),
            None => println!("no tip yet"),
        },
    }

    lock_file.unlock()?;
    Ok(())
}
