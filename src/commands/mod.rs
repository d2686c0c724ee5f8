//! Command Module
//!
//! This module implements the command processing layer for SimpleDB.
//! It receives decoded requests, executes them against the storage engine,
//! and returns the reply value.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Parser         │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Request      │
//! │  - Lookup       │
//! │  - Arity        │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! `GET`, `SET`, `DELETE`, `FLUSH`, `MGET`, `MSET`

pub mod error;
pub mod handler;
pub mod request;

pub use error::{CommandError, CommandResult};
pub use handler::{lookup, Arity, CommandHandler, CommandSpec, COMMANDS};
pub use request::Request;
