//! Storage Engine Module
//!
//! This module provides the in-memory key space for SimpleDB: a single map
//! from byte-string keys to wire values, guarded by one lock.
//!
//! ## Features
//!
//! - **One Lock**: every command touches the map under a single guard, so
//!   multi-key commands are atomic with respect to each other
//! - **RwLock**: concurrent readers, exclusive writers
//! - **Any Value**: values are stored exactly as the client sent them
//! - **No Expiry**: entries live until deleted or flushed
//!
//! ## Example
//!
//! ```
//! use simpledb::protocol::RespValue;
//! use simpledb::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set_many(vec![
//!     (Bytes::from("a"), RespValue::bulk_string("1")),
//!     (Bytes::from("b"), RespValue::bulk_string("2")),
//! ]);
//! assert_eq!(engine.flush(), 2);
//! ```

pub mod engine;

pub use engine::{StorageEngine, StorageStats};
