//! # SimpleDB - An In-Memory Key-Value Server
//!
//! SimpleDB keeps a map of byte-string keys to typed values in memory and
//! serves it over TCP with a small RESP-like protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              SimpleDB                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (+ limiter) │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────────┐ │
//! │                     │  Protocol   │    │        StorageEngine         │ │
//! │                     │  Parser /   │    │  RwLock<HashMap<Bytes,       │ │
//! │                     │  Serializer │    │          RespValue>>         │ │
//! │                     └─────────────┘    └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use simpledb::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(&Config::default()).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Format
//!
//! ```text
//! +<text>\r\n             simple string
//! -<text>\r\n             error
//! :<int>\r\n              integer
//! $<n>\r\n<n bytes>\r\n   bulk string (n = -1 => null)
//! *<n>\r\n<n values>      array
//! %<n>\r\n<2n values>     map
//! ```
//!
//! ## Supported Commands
//!
//! - `GET key`
//! - `SET key value`
//! - `DELETE key [key ...]`
//! - `FLUSH`
//! - `MGET key [key ...]`
//! - `MSET key value [key value ...]`
//!
//! ## Module Overview
//!
//! - [`protocol`]: wire value type, parser and serializer
//! - [`storage`]: the shared key space
//! - [`commands`]: request model and command dispatch
//! - [`connection`]: per-client session loop
//! - [`server`]: accept loop and connection limiter
//! - [`config`]: command-line / environment configuration
//!
//! ## Error Handling
//!
//! A malformed command (unknown name, wrong arity, non-string key) gets an
//! error reply and the connection stays open. A malformed frame closes the
//! connection without a reply.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionConfig, ConnectionError, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use server::Server;
pub use storage::StorageEngine;

/// The default port SimpleDB listens on
pub const DEFAULT_PORT: u16 = 31337;

/// The default host SimpleDB binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default cap on concurrently served clients
pub const DEFAULT_MAX_CLIENTS: usize = 64;

/// Version of SimpleDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
