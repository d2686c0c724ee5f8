//! Wire Protocol
//!
//! A RESP-like, typed, length-prefixed framing with six value kinds: simple
//! strings, errors, integers, bulk strings (with null), arrays and maps.
//! Requests and replies share the same format.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental decoder for incoming frames
//!
//! ## Example
//!
//! ```
//! use simpledb::protocol::{parse_message, RespValue};
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let reply = RespValue::integer(42);
//! assert_eq!(reply.serialize(), b":42\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
