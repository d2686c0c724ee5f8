//! Wire Value Types
//!
//! This module defines the six value kinds the SimpleDB protocol can carry and
//! their serialization.
//!
//! ## Protocol Format
//!
//! Each value starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String (`$-1` is null)
//! - `*` Array
//! - `%` Map
//!
//! Line-based values end with CRLF (`\r\n`). Arrays and maps declare their
//! element count up front and have no terminator of their own.
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-unrecognized command 'FOO'\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Null: `$-1\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Map: `%1\r\n$3\r\nkey\r\n:1\r\n`

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;

/// The CRLF terminator used by the protocol
pub const CRLF: &[u8] = b"\r\n";

/// Protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
    pub const MAP: u8 = b'%';
}

/// A single value on the wire.
///
/// Used both for decoded requests and for replies, and also as the stored
/// value type: the store keeps whatever a client sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RespValue {
    /// Text ending at the first CRLF. A decoded value can hold a lone CR or
    /// LF; [`RespValue::simple_string`] strips both.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Like a simple string, but signals a failed command.
    /// Format: `-<error message>\r\n`
    Error(String),

    /// 64-bit signed integers.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe strings.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// The null bulk string: `$-1\r\n`
    Null,

    /// Ordered sequence of values, possibly nested.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),

    /// Key/value pairs in send order. Duplicate keys are kept here and only
    /// collapse when materialized with [`RespValue::into_map`].
    /// Format: `%<count>\r\n<key1><value1>...`
    Map(Vec<(RespValue, RespValue)>),
}

impl RespValue {
    /// Creates a new simple string value.
    ///
    /// CR and LF are replaced by spaces, as for [`RespValue::error`].
    ///
    /// # Example
    /// ```
    /// use simpledb::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(single_line(s.into()))
    }

    /// Creates a new error value.
    ///
    /// CR and LF are replaced by spaces so the message always fits on one line,
    /// whatever bytes a client put into, say, a command name.
    ///
    /// # Example
    /// ```
    /// use simpledb::protocol::types::RespValue;
    /// let err = RespValue::error("bad\r\nrequest");
    /// assert_eq!(err, RespValue::Error("bad  request".to_string()));
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(single_line(s.into()))
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string value.
    ///
    /// # Example
    /// ```
    /// use simpledb::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// let bulk = RespValue::bulk_string(Bytes::from("hello"));
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    pub fn map(pairs: Vec<(RespValue, RespValue)>) -> Self {
        RespValue::Map(pairs)
    }

    /// Acknowledgement for successful writes
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Serializes the value to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    ///
    /// This is more efficient than `serialize()` when you want to reuse a buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
            RespValue::Map(pairs) => {
                buf.push(prefix::MAP);
                buf.extend_from_slice(pairs.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for (key, value) in pairs {
                    key.serialize_into(buf);
                    value.serialize_into(buf);
                }
            }
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Materializes a Map into a `HashMap`.
    ///
    /// Later pairs overwrite earlier ones with an equal key.
    pub fn into_map(self) -> Option<HashMap<RespValue, RespValue>> {
        match self {
            RespValue::Map(pairs) => Some(pairs.into_iter().collect()),
            _ => None,
        }
    }
}

impl From<Option<RespValue>> for RespValue {
    fn from(value: Option<RespValue>) -> Self {
        value.unwrap_or(RespValue::Null)
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
            RespValue::Map(pairs) => {
                if pairs.is_empty() {
                    write!(f, "(empty map)")
                } else {
                    writeln!(f)?;
                    for (i, (k, v)) in pairs.iter().enumerate() {
                        writeln!(f, "{}# {} => {}", i + 1, k, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

fn single_line(s: String) -> String {
    if s.contains(['\r', '\n']) {
        s.replace(['\r', '\n'], " ")
    } else {
        s
    }
}
