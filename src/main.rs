//! SimpleDB - An In-Memory Key-Value Server
//!
//! This is the main entry point for the SimpleDB server.
//! It parses the configuration, sets up logging and runs the server until Ctrl+C.

use clap::Parser;
use simpledb::{Config, Server};
use std::sync::atomic::Ordering;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!(version = simpledb::VERSION, "SimpleDB starting");

    let server = Server::bind(&config).await?;
    let storage = server.storage();
    let stats = server.stats();

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    server.run_until(shutdown).await;

    let storage_stats = storage.stats();
    info!(
        keys = storage_stats.keys,
        get_ops = storage_stats.get_ops,
        set_ops = storage_stats.set_ops,
        del_ops = storage_stats.del_ops,
        flush_ops = storage_stats.flush_ops,
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
