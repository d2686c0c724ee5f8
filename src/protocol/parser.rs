//! Incremental Protocol Parser
//!
//! This module decodes one frame at a time from a byte buffer.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(ParseError)` - Invalid protocol data
//!
//! This design allows the caller to:
//! 1. Append incoming network data to a buffer
//! 2. Call `parse()` to attempt parsing
//! 3. If successful, advance the buffer by `consumed` bytes
//! 4. If incomplete, wait for more data
//! 5. If error, drop the connection: the stream is no longer frame-aligned
//!
//! A frame is handled in two passes. An iterative scan validates headers,
//! lengths and terminators without allocating, and remembers where it stopped
//! when the buffer runs out, so a large frame arriving in small reads is still
//! examined only once. When the scan reaches the end of the frame, a recursive
//! descent over the tag byte builds the value.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur while decoding a frame.
///
/// Every variant means the byte stream can no longer be trusted to be
/// frame-aligned; the connection should be closed without a reply.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The leading byte is not one of `+ - : $ * %`
    #[error("bad request: unknown type prefix {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer, length or count
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length below -1
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Negative array length
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Negative map length
    #[error("invalid map length: {0}")]
    InvalidMapLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Nesting exceeds the configured maximum depth
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// An incremental frame parser.
///
/// Nesting depth is unbounded unless a limit is set with
/// [`RespParser::with_max_depth`]; a client sending deeply nested arrays can
/// exhaust the stack of an unbounded parser.
///
/// # Example
///
/// ```
/// use simpledb::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let buf = b"*2\r\n$3\r\nGET\r\n$1\r\nx\r\n";
///
/// let (value, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(consumed, buf.len());
/// assert_eq!(value.as_array().map(|a| a.len()), Some(2));
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    scan: Scan,
    max_depth: Option<usize>,
}

/// How far the current frame has been validated.
///
/// Kept across calls that return `Ok(None)` so that bytes already checked
/// are never looked at again.
#[derive(Debug, Default)]
struct Scan {
    /// Start of the first value not yet validated
    offset: usize,
    /// Values still expected at each open level, outermost first.
    /// Empty between frames.
    pending: Vec<usize>,
    /// Everything before this position has been searched for CRLF
    searched: usize,
}

impl RespParser {
    /// Creates a new parser instance with unbounded nesting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser that rejects frames nested deeper than `max_depth`.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            scan: Scan::default(),
            max_depth: Some(max_depth),
        }
    }

    /// Attempts to parse one frame from the start of the buffer.
    ///
    /// After `Ok(None)` the parser remembers how much of the frame it has
    /// already validated. The next call must pass the same bytes, possibly
    /// followed by more; once a frame is returned the caller drops the
    /// `consumed` bytes and the parser starts fresh.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let len = match self.scan_frame(buf) {
            Ok(Some(len)) => len,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.scan = Scan::default();
                return Err(e);
            }
        };

        match self.parse_value(&buf[..len])? {
            Some(frame) => Ok(Some(frame)),
            None => Err(ParseError::ProtocolError("frame ended early".to_string())),
        }
    }

    /// Validates the frame at the start of `buf` without building it.
    ///
    /// Returns the frame length once every byte of it is present.
    fn scan_frame(&mut self, buf: &[u8]) -> ParseResult<Option<usize>> {
        if self.scan.pending.is_empty() {
            self.scan = Scan {
                offset: 0,
                pending: vec![1],
                searched: 0,
            };
        }

        loop {
            match self.scan.pending.last() {
                None => break,
                Some(0) => {
                    self.scan.pending.pop();
                    continue;
                }
                Some(_) => {}
            }

            let start = self.scan.offset;
            if start >= buf.len() {
                return Ok(None);
            }

            let tag = buf[start];
            if !matches!(
                tag,
                prefix::SIMPLE_STRING
                    | prefix::ERROR
                    | prefix::INTEGER
                    | prefix::BULK_STRING
                    | prefix::ARRAY
                    | prefix::MAP
            ) {
                return Err(ParseError::UnknownPrefix(tag));
            }

            let (line_end, next) = match self.scan_line(buf) {
                Some(line) => line,
                None => return Ok(None),
            };
            let line = &buf[start + 1..line_end];

            let (end, children) = match tag {
                prefix::SIMPLE_STRING | prefix::ERROR => {
                    utf8(line)?;
                    (next, None)
                }
                prefix::INTEGER => {
                    number(line)?;
                    (next, None)
                }
                prefix::BULK_STRING => match bulk_length(number(line)?)? {
                    None => (next, None),
                    Some(length) => {
                        let end = next + length + 2;
                        if buf.len() < end {
                            return Ok(None);
                        }
                        check_bulk_terminator(buf, next + length)?;
                        (end, None)
                    }
                },
                prefix::ARRAY => {
                    let count = number(line)?;
                    if count < 0 {
                        return Err(ParseError::InvalidArrayLength(count));
                    }
                    (next, Some(count as usize))
                }
                _ => (next, Some(map_elements(number(line)?)?)),
            };

            self.scan.offset = end;
            if let Some(remaining) = self.scan.pending.last_mut() {
                *remaining -= 1;
            }

            if let Some(count) = children {
                self.scan.pending.push(count);
                let depth = self.scan.pending.len() - 1;
                if let Some(max) = self.max_depth {
                    if depth > max {
                        return Err(ParseError::NestingTooDeep(max));
                    }
                }
            }
        }

        let len = self.scan.offset;
        self.scan = Scan::default();
        Ok(Some(len))
    }

    /// Finds the end of the header line of the value at `scan.offset`.
    ///
    /// Returns the position of its `\r` and of the byte after its `\n`.
    fn scan_line(&mut self, buf: &[u8]) -> Option<(usize, usize)> {
        let from = self.scan.searched.max(self.scan.offset + 1);
        match find_crlf(&buf[from..]) {
            Some(pos) => Some((from + pos, from + pos + 2)),
            None => {
                // A trailing '\r' may still be completed by the next read.
                self.scan.searched = buf.len().saturating_sub(1).max(from);
                None
            }
        }
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(self
                .parse_line(buf)?
                .map(|(s, n)| (RespValue::SimpleString(s.to_string()), n))),
            prefix::ERROR => Ok(self
                .parse_line(buf)?
                .map(|(s, n)| (RespValue::Error(s.to_string()), n))),
            prefix::INTEGER => Ok(self
                .parse_number(buf)?
                .map(|(i, n)| (RespValue::Integer(i), n))),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            prefix::MAP => self.parse_map(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses the text of a line-based value: `<prefix><text>\r\n`
    fn parse_line<'a>(&self, buf: &'a [u8]) -> ParseResult<Option<(&'a str, usize)>> {
        match find_crlf(&buf[1..]) {
            Some(pos) => {
                let s = utf8(&buf[1..1 + pos])?;
                // +1 for prefix, +2 for CRLF
                Ok(Some((s, 1 + pos + 2)))
            }
            None => Ok(None),
        }
    }

    /// Parses an integer line; also used for lengths and counts.
    fn parse_number(&self, buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
        match find_crlf(&buf[1..]) {
            Some(pos) => Ok(Some((number(&buf[1..1 + pos])?, 1 + pos + 2))),
            None => Ok(None),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::BULK_STRING);

        let (length, data_start) = match self.parse_number(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let length = match bulk_length(length)? {
            Some(length) => length,
            None => return Ok(Some((RespValue::Null, data_start))),
        };

        let total_needed = data_start + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }
        check_bulk_terminator(buf, data_start + length)?;

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);

        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, header) = match self.parse_number(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        Ok(self
            .parse_elements(buf, header, count as usize)?
            .map(|(elements, consumed)| (RespValue::Array(elements), consumed)))
    }

    /// Parses a map: `%<count>\r\n<key1><value1>...`
    fn parse_map(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::MAP);

        let (count, header) = match self.parse_number(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };
        let count = map_elements(count)?;

        Ok(self
            .parse_elements(buf, header, count)?
            .map(|(elements, consumed)| {
                let mut elements = elements.into_iter();
                let mut pairs = Vec::with_capacity(count / 2);
                while let (Some(key), Some(value)) = (elements.next(), elements.next()) {
                    pairs.push((key, value));
                }
                (RespValue::Map(pairs), consumed)
            }))
    }

    /// Parses `count` consecutive values starting at `offset`.
    fn parse_elements(
        &mut self,
        buf: &[u8],
        offset: usize,
        count: usize,
    ) -> ParseResult<Option<(Vec<RespValue>, usize)>> {
        // Every element takes at least 3 bytes, so don't trust a huge count
        // for the initial allocation.
        let mut elements = Vec::with_capacity(count.min(buf.len() / 3));
        let mut consumed = offset;

        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None), // Incomplete
            }
        }

        Ok(Some((elements, consumed)))
    }
}

fn utf8(line: &[u8]) -> ParseResult<&str> {
    std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))
}

fn number(line: &[u8]) -> ParseResult<i64> {
    utf8(line)?
        .parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))
}

/// Checks a declared bulk length; `None` is the null bulk string.
fn bulk_length(length: i64) -> ParseResult<Option<usize>> {
    if length == -1 {
        return Ok(None);
    }
    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }
    Ok(Some(length))
}

fn check_bulk_terminator(buf: &[u8], data_end: usize) -> ParseResult<()> {
    if &buf[data_end..data_end + 2] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }
    Ok(())
}

/// Number of values that follow a map header declaring `count` pairs.
fn map_elements(count: i64) -> ParseResult<usize> {
    if count < 0 {
        return Err(ParseError::InvalidMapLength(count));
    }
    (count as usize)
        .checked_mul(2)
        .ok_or(ParseError::InvalidMapLength(count))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes a single frame from bytes with an unbounded parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
