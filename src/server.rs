//! TCP Server
//!
//! Accepts connections and spawns one session task per client. At most
//! `max_clients` sessions run at once: a permit is taken before each
//! `accept()`, so extra clients wait in the listen backlog until a running
//! session ends.

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionConfig, ConnectionStats};
use crate::storage::StorageEngine;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, trace};

/// A bound, not yet running server.
pub struct Server {
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    limiter: Arc<Semaphore>,
    max_clients: usize,
    connection_config: ConnectionConfig,
}

impl Server {
    /// Binds the listener described by `config` with a fresh, empty store.
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        info!(address = %listener.local_addr()?, "Listening");

        Ok(Self {
            listener,
            storage: Arc::new(StorageEngine::new()),
            stats: Arc::new(ConnectionStats::new()),
            limiter: Arc::new(Semaphore::new(config.max_clients)),
            max_clients: config.max_clients,
            connection_config: config.connection_config(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The store shared by every session of this server.
    pub fn storage(&self) -> Arc<StorageEngine> {
        Arc::clone(&self.storage)
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Serves clients until `shutdown` completes.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(max_clients = self.max_clients, "Ready to accept connections");

        tokio::select! {
            _ = self.accept_loop() => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
    }

    /// Serves clients forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    async fn accept_loop(&self) {
        loop {
            // The semaphore is never closed, so this only fails if that changes.
            let permit = match Arc::clone(&self.limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    trace!(
                        client = %addr,
                        available = self.limiter.available_permits(),
                        "Accepted connection"
                    );

                    let handler = CommandHandler::new(Arc::clone(&self.storage));
                    let stats = Arc::clone(&self.stats);
                    let config = self.connection_config;

                    tokio::spawn(async move {
                        handle_connection(stream, addr, handler, stats, config).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
