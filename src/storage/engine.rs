//! Thread-Safe Storage Engine
//!
//! This module implements the key space shared by every client connection.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │ RwLock<HashMap<Bytes, RespValue>>                     │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │   get / get_many            -> shared (read) guard          │
//! │   set / set_many / delete   -> exclusive (write) guard      │
//! │   flush                                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every public operation takes the lock exactly once and releases it before
//! returning. Multi-key operations therefore see and produce a consistent
//! snapshot: no other command can observe an `MSET` half applied, and an
//! `MGET` never mixes values from before and after a concurrent write.
//!
//! The lock is a `std::sync::RwLock`. It is never held across an `.await`,
//! so callers on the tokio runtime only block for the duration of one
//! in-memory map operation.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The shared key space.
///
/// Keys are raw bytes; values are whatever [`RespValue`] the client stored,
/// of any variant.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all client handler tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use simpledb::protocol::RespValue;
/// use simpledb::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), RespValue::bulk_string("alice"));
/// assert_eq!(
///     engine.get(&Bytes::from("name")),
///     Some(RespValue::bulk_string("alice"))
/// );
///
/// assert_eq!(engine.delete_many(&[Bytes::from("name"), Bytes::from("missing")]), 1);
/// ```
pub struct StorageEngine {
    data: RwLock<HashMap<Bytes, RespValue>>,

    /// Statistics: total GET operations (one per key looked up)
    get_count: AtomicU64,

    /// Statistics: total SET operations (one per key written)
    set_count: AtomicU64,

    /// Statistics: total keys removed by DELETE
    del_count: AtomicU64,

    /// Statistics: total FLUSH operations
    flush_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        }
    }

    // No mutation below can panic halfway, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, RespValue>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, RespValue>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets a key, overwriting any existing value.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: RespValue) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.write().insert(key, value).is_none()
    }

    /// Writes every pair under one exclusive guard.
    ///
    /// Pairs are applied in order, so a key repeated in `pairs` ends up with
    /// its last value.
    ///
    /// # Returns
    ///
    /// Returns the number of pairs written.
    pub fn set_many(&self, pairs: Vec<(Bytes, RespValue)>) -> u64 {
        let written = pairs.len() as u64;
        self.set_count.fetch_add(written, Ordering::Relaxed);

        let mut data = self.write();
        for (key, value) in pairs {
            data.insert(key, value);
        }

        written
    }

    /// Gets the value for a key, or `None` if absent.
    pub fn get(&self, key: &[u8]) -> Option<RespValue> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.read().get(key).cloned()
    }

    /// Looks up every key under one shared guard.
    ///
    /// The result has one entry per requested key, in request order.
    pub fn get_many(&self, keys: &[Bytes]) -> Vec<Option<RespValue>> {
        self.get_count
            .fetch_add(keys.len() as u64, Ordering::Relaxed);

        let data = self.read();
        keys.iter().map(|key| data.get(key).cloned()).collect()
    }

    /// Deletes multiple keys under one exclusive guard.
    ///
    /// Missing keys are skipped. A key listed twice is only counted once.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were deleted.
    pub fn delete_many(&self, keys: &[Bytes]) -> u64 {
        let mut data = self.write();
        let deleted = keys
            .iter()
            .filter(|key| data.remove(&key[..]).is_some())
            .count() as u64;
        drop(data);

        self.del_count.fetch_add(deleted, Ordering::Relaxed);
        deleted
    }

    /// Clears all data.
    ///
    /// # Returns
    ///
    /// Returns the number of entries that were removed.
    pub fn flush(&self) -> u64 {
        self.flush_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.write();
        let removed = data.len() as u64;
        data.clear();
        removed
    }

    /// Returns the number of keys.
    pub fn len(&self) -> u64 {
        self.read().len() as u64
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            flush_ops: self.flush_count.load(Ordering::Relaxed),
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub flush_ops: u64,
}
