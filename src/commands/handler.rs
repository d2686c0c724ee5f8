//! Command Dispatcher
//!
//! This module turns a decoded request into a store operation and a reply.
//!
//! ## Supported Commands
//!
//! - `GET key` - Get a key's value, or null
//! - `SET key value` - Set a key, replies `+OK`
//! - `DELETE key [key ...]` - Delete keys, replies the number removed
//! - `FLUSH` - Remove every key, replies the number removed
//! - `MGET key [key ...]` - Get several keys, one reply slot per key
//! - `MSET key value [key value ...]` - Set several keys, replies the number of pairs
//!
//! Names are matched exactly; `get` is not `GET`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  Request::  │───>│  COMMANDS   │───>│  handler()  │     │
//! │  │  try_from   │    │  + arity    │    │             │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each handler makes exactly one `StorageEngine` call, so each command holds
//! the store lock once.

use crate::commands::error::{CommandError, CommandResult};
use crate::commands::request::Request;
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Signature shared by every command implementation.
pub type Handler = fn(&StorageEngine, &[RespValue]) -> CommandResult;

/// Accepted argument counts, not counting the command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// A non-empty list of key/value pairs
    Pairs,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Pairs => count > 0 && count % 2 == 0,
        }
    }
}

/// An entry of the command table.
pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    handler: Handler,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// The complete, fixed command table.
pub static COMMANDS: [CommandSpec; 6] = [
    CommandSpec {
        name: "GET",
        arity: Arity::Exact(1),
        handler: cmd_get,
    },
    CommandSpec {
        name: "SET",
        arity: Arity::Exact(2),
        handler: cmd_set,
    },
    CommandSpec {
        name: "DELETE",
        arity: Arity::AtLeast(1),
        handler: cmd_delete,
    },
    CommandSpec {
        name: "FLUSH",
        arity: Arity::Exact(0),
        handler: cmd_flush,
    },
    CommandSpec {
        name: "MGET",
        arity: Arity::AtLeast(1),
        handler: cmd_mget,
    },
    CommandSpec {
        name: "MSET",
        arity: Arity::Pairs,
        handler: cmd_mset,
    },
];

/// Finds a command by its exact name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}

/// Dispatches requests to the command table.
///
/// Cheap to clone; every connection gets its own handle to the same store.
#[derive(Clone, Debug)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a request and returns the reply to send.
    ///
    /// Command failures come back as an `Error` value; this never fails.
    pub fn execute(&self, command: RespValue) -> RespValue {
        match self.dispatch(command) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(error = %e, "Command rejected");
                RespValue::error(e.to_string())
            }
        }
    }

    /// Validates and runs a request.
    ///
    /// # Errors
    ///
    /// - [`CommandError::BadRequest`] if `command` is not a non-empty array
    ///   headed by a string
    /// - [`CommandError::UnknownCommand`] if the name is not in [`COMMANDS`]
    /// - [`CommandError::WrongArity`] if the argument count does not fit
    /// - [`CommandError::InvalidKey`] if a key argument is not a string
    pub fn dispatch(&self, command: RespValue) -> CommandResult {
        let Request { name, args } = Request::try_from(command)?;

        let spec = lookup(&name).ok_or(CommandError::UnknownCommand(name))?;

        if !spec.arity.accepts(args.len()) {
            return Err(CommandError::WrongArity);
        }

        (spec.handler)(&self.storage, &args)
    }
}

/// Extracts a key from a bulk or simple string argument.
fn key_arg(value: &RespValue) -> CommandResult<Bytes> {
    match value {
        RespValue::BulkString(b) => Ok(b.clone()),
        RespValue::SimpleString(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        _ => Err(CommandError::InvalidKey),
    }
}

fn key_args(values: &[RespValue]) -> CommandResult<Vec<Bytes>> {
    values.iter().map(key_arg).collect()
}

/// GET key
fn cmd_get(storage: &StorageEngine, args: &[RespValue]) -> CommandResult {
    let key = key_arg(&args[0])?;
    Ok(storage.get(&key).into())
}

/// SET key value
fn cmd_set(storage: &StorageEngine, args: &[RespValue]) -> CommandResult {
    let key = key_arg(&args[0])?;
    storage.set(key, args[1].clone());
    Ok(RespValue::ok())
}

/// DELETE key [key ...]
fn cmd_delete(storage: &StorageEngine, args: &[RespValue]) -> CommandResult {
    let keys = key_args(args)?;
    Ok(RespValue::integer(storage.delete_many(&keys) as i64))
}

/// FLUSH
fn cmd_flush(storage: &StorageEngine, _args: &[RespValue]) -> CommandResult {
    Ok(RespValue::integer(storage.flush() as i64))
}

/// MGET key [key ...]
fn cmd_mget(storage: &StorageEngine, args: &[RespValue]) -> CommandResult {
    let keys = key_args(args)?;
    let values = storage
        .get_many(&keys)
        .into_iter()
        .map(RespValue::from)
        .collect();
    Ok(RespValue::array(values))
}

/// MSET key value [key value ...]
fn cmd_mset(storage: &StorageEngine, args: &[RespValue]) -> CommandResult {
    // Validate every key before writing anything.
    let pairs = args
        .chunks_exact(2)
        .map(|pair| -> CommandResult<(Bytes, RespValue)> {
            Ok((key_arg(&pair[0])?, pair[1].clone()))
        })
        .collect::<CommandResult<Vec<_>>>()?;

    Ok(RespValue::integer(storage.set_many(pairs) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage)
    }

    fn make_command(args: &[&str]) -> RespValue {
        RespValue::Array(
            args.iter()
                .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
                .collect(),
        )
    }

    fn bulk(s: &str) -> RespValue {
        RespValue::bulk_string(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "a", "1"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(make_command(&["GET", "a"]));
        assert_eq!(response, bulk("1"));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["GET", "missing"]));
        assert_eq!(response, RespValue::null());
        assert_eq!(response.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_set_stores_any_value() {
        let handler = create_handler();
        let value = RespValue::map(vec![(RespValue::integer(1), RespValue::null())]);

        let response = handler.execute(RespValue::array(vec![
            bulk("SET"),
            RespValue::simple_string("m"),
            value.clone(),
        ]));
        assert_eq!(response, RespValue::ok());

        assert_eq!(handler.execute(make_command(&["GET", "m"])), value);
    }

    #[test]
    fn test_empty_value_is_not_null() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "empty", ""]));
        assert_eq!(handler.execute(make_command(&["GET", "empty"])), bulk(""));
    }

    #[test]
    fn test_delete() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "a", "1"]));

        let response = handler.execute(make_command(&["DELETE", "a", "missing"]));
        assert_eq!(response, RespValue::integer(1));

        let response = handler.execute(make_command(&["GET", "a"]));
        assert_eq!(response, RespValue::null());
    }

    #[test]
    fn test_mset_mget() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["MSET", "a", "1", "b", "2"]));
        assert_eq!(response, RespValue::integer(2));

        let response = handler.execute(make_command(&["MGET", "a", "missing", "b"]));
        assert_eq!(
            response,
            RespValue::Array(vec![bulk("1"), RespValue::null(), bulk("2")])
        );
    }

    #[test]
    fn test_flush() {
        let handler = create_handler();

        handler.execute(make_command(&["MSET", "k1", "v1", "k2", "v2", "k3", "v3"]));

        let response = handler.execute(make_command(&["FLUSH"]));
        assert_eq!(response, RespValue::integer(3));

        let response = handler.execute(make_command(&["GET", "k1"]));
        assert_eq!(response, RespValue::null());

        let response = handler.execute(make_command(&["FLUSH"]));
        assert_eq!(response, RespValue::integer(0));
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["FOO", "bar"]));
        assert_eq!(response, RespValue::error("unrecognized command 'FOO'"));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let handler = create_handler();

        assert_eq!(
            handler.dispatch(make_command(&["get", "a"])),
            Err(CommandError::UnknownCommand("get".to_string()))
        );
        assert_eq!(
            handler.dispatch(make_command(&["DEL", "a"])),
            Err(CommandError::UnknownCommand("DEL".to_string()))
        );
    }

    #[test]
    fn test_wrong_arity() {
        let handler = create_handler();

        for args in [
            &["GET"][..],
            &["GET", "a", "b"],
            &["SET", "a"],
            &["SET", "a", "1", "2"],
            &["DELETE"],
            &["FLUSH", "a"],
            &["MGET"],
            &["MSET"],
            &["MSET", "a"],
            &["MSET", "a", "1", "b"],
        ] {
            assert_eq!(
                handler.dispatch(make_command(args)),
                Err(CommandError::WrongArity),
                "{:?}",
                args
            );
        }

        let response = handler.execute(make_command(&["GET"]));
        assert_eq!(response, RespValue::error("wrong number of arguments"));
    }

    #[test]
    fn test_bad_request() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(RespValue::array(vec![])),
            RespValue::error("bad request")
        );
        assert_eq!(
            handler.execute(RespValue::array(vec![RespValue::integer(1)])),
            RespValue::error("bad request")
        );
        assert_eq!(
            handler.execute(bulk("GET")),
            RespValue::error("bad request")
        );
    }

    #[test]
    fn test_invalid_key() {
        let handler = create_handler();

        let response =
            handler.dispatch(RespValue::array(vec![bulk("GET"), RespValue::integer(1)]));
        assert_eq!(response, Err(CommandError::InvalidKey));
    }

    #[test]
    fn test_mset_with_invalid_key_writes_nothing() {
        let handler = create_handler();

        let response = handler.dispatch(RespValue::array(vec![
            bulk("MSET"),
            bulk("a"),
            bulk("1"),
            RespValue::null(),
            bulk("2"),
        ]));
        assert_eq!(response, Err(CommandError::InvalidKey));
        assert_eq!(handler.execute(make_command(&["GET", "a"])), RespValue::null());
    }

    #[test]
    fn test_simple_string_arguments() {
        let handler = create_handler();

        handler.execute(RespValue::array(vec![
            RespValue::simple_string("SET"),
            RespValue::simple_string("k"),
            RespValue::simple_string("v"),
        ]));

        assert_eq!(
            handler.execute(make_command(&["GET", "k"])),
            RespValue::simple_string("v")
        );
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("MSET").map(|spec| spec.arity), Some(Arity::Pairs));
        assert!(lookup("EXPIRE").is_none());
        assert_eq!(COMMANDS.len(), 6);
    }
}
