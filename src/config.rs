//! Server configuration
//!
//! Every option can come from the command line or from a `SIMPLEDB_*`
//! environment variable; the command line wins.

use crate::connection::handler::DEFAULT_MAX_BUFFER_SIZE;
use crate::connection::ConnectionConfig;
use crate::{DEFAULT_HOST, DEFAULT_MAX_CLIENTS, DEFAULT_PORT};
use clap::Parser;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "simpledb",
    version,
    about = "An in-memory key-value server speaking a typed, length-prefixed wire protocol"
)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "SIMPLEDB_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "SIMPLEDB_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of clients served at the same time
    #[arg(
        short = 'c',
        long,
        env = "SIMPLEDB_MAX_CLIENTS",
        default_value_t = DEFAULT_MAX_CLIENTS,
        value_parser = parse_max_clients
    )]
    pub max_clients: usize,

    /// Largest partial frame buffered per connection, in bytes
    #[arg(long, env = "SIMPLEDB_MAX_BUFFER_SIZE", default_value_t = DEFAULT_MAX_BUFFER_SIZE)]
    pub max_buffer_size: usize,

    /// Maximum array/map nesting depth accepted from clients (unbounded if unset)
    #[arg(long, env = "SIMPLEDB_MAX_DEPTH")]
    pub max_depth: Option<usize>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "SIMPLEDB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_depth: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Limits applied to each connection.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_buffer_size: self.max_buffer_size,
            max_depth: self.max_depth,
        }
    }
}

fn parse_max_clients(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
