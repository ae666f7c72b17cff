//! Incremental RESP2 parser.
//!
//! The parser reads from a buffer that may hold a partial frame, a single
//! frame, or several pipelined frames, and returns:
//! - `Ok(Some((value, consumed)))` when a complete value was decoded from the
//!   front of the buffer;
//! - `Ok(None)` when more bytes are needed;
//! - `Err(ParseError)` when the bytes cannot be RESP.
//!
//! The caller advances its buffer by `consumed` and calls again, which is how
//! [`RespConnection`](crate::backend::RespConnection) reads pipelined replies.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string, error message or length line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, nesting too deep)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The frame exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// A stateless-between-calls RESP parser.
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to decode one value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match first {
            prefix::SIMPLE_STRING => {
                Ok(read_line(buf)?.map(|(s, n)| (RespValue::SimpleString(s.to_string()), n)))
            }
            prefix::ERROR => Ok(read_line(buf)?.map(|(s, n)| (RespValue::Error(s.to_string()), n))),
            prefix::INTEGER => match read_line(buf)? {
                Some((s, n)) => Ok(Some((RespValue::Integer(parse_int(s)?), n))),
                None => Ok(None),
            },
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (length_str, header_len) = match read_line(buf)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let length = parse_int(length_str)?;

        if length == -1 {
            return Ok(Some((RespValue::Null, header_len)));
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

        let total_needed = header_len + length + CRLF.len();
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header_len + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count_str, header_len) = match read_line(buf)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let count = parse_int(count_str)?;

        if count == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        // Never trust the peer's count for preallocation.
        let mut elements = Vec::with_capacity(count.min(1024));
        let mut consumed = header_len;

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_len)) => {
                    elements.push(value);
                    consumed += element_len;
                }
                None => {
                    self.depth -= 1;
                    return Ok(None);
                }
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Finds the end of the next complete frame without building any values.
///
/// Progress is kept between calls, so feeding a growing buffer costs time
/// linear in the frame size however many reads it arrives in. The buffer
/// passed in must start at the same frame on every call until a length is
/// returned.
#[derive(Debug, Default)]
pub struct FrameScanner {
    /// Bytes of the frame already walked.
    offset: usize,
    /// Elements still expected by each open array, outermost first.
    open: Vec<usize>,
}

enum Element {
    /// A value ending at the given offset.
    Complete(usize),
    /// An array header: element count and the offset after the header.
    Array(usize, usize),
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(Some(len))` once `buf[..len]` holds one whole frame, and
    /// starts over for the next frame.
    pub fn scan(&mut self, buf: &[u8]) -> ParseResult<Option<usize>> {
        loop {
            let Some(element) = element_at(buf, self.offset)? else {
                return Ok(None);
            };
            match element {
                Element::Complete(end) | Element::Array(0, end) => {
                    self.offset = end;
                    self.close_one();
                }
                Element::Array(count, end) => {
                    if self.open.len() >= MAX_NESTING_DEPTH {
                        return Err(ParseError::ProtocolError(format!(
                            "maximum nesting depth exceeded: {}",
                            MAX_NESTING_DEPTH
                        )));
                    }
                    self.offset = end;
                    self.open.push(count);
                }
            }

            if self.open.is_empty() {
                let len = self.offset;
                self.reset();
                return Ok(Some(len));
            }
        }
    }

    /// Forgets any partially walked frame.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.open.clear();
    }

    fn close_one(&mut self) {
        while let Some(remaining) = self.open.last_mut() {
            *remaining -= 1;
            if *remaining > 0 {
                return;
            }
            self.open.pop();
        }
    }
}

/// Measures the element starting at `buf[at]`.
fn element_at(buf: &[u8], at: usize) -> ParseResult<Option<Element>> {
    let rest = &buf[at..];
    let Some(&first) = rest.first() else {
        return Ok(None);
    };
    let Some((line, header_len)) = (match first {
        prefix::SIMPLE_STRING
        | prefix::ERROR
        | prefix::INTEGER
        | prefix::BULK_STRING
        | prefix::ARRAY => read_line(rest)?,
        other => return Err(ParseError::UnknownPrefix(other)),
    }) else {
        return Ok(None);
    };

    let element = match first {
        prefix::INTEGER => {
            parse_int(line)?;
            Element::Complete(at + header_len)
        }
        prefix::BULK_STRING => match parse_int(line)? {
            -1 => Element::Complete(at + header_len),
            length if length < 0 => return Err(ParseError::InvalidBulkLength(length)),
            length if length as usize > MAX_BULK_SIZE => {
                return Err(ParseError::MessageTooLarge {
                    size: length as usize,
                    max: MAX_BULK_SIZE,
                })
            }
            length => {
                let total = header_len + length as usize + CRLF.len();
                if rest.len() < total {
                    return Ok(None);
                }
                Element::Complete(at + total)
            }
        },
        prefix::ARRAY => match parse_int(line)? {
            -1 => Element::Complete(at + header_len),
            count if count < 0 => return Err(ParseError::InvalidArrayLength(count)),
            count => Element::Array(count as usize, at + header_len),
        },
        _ => Element::Complete(at + header_len),
    };
    Ok(Some(element))
}

/// Reads the line after the prefix byte. Returns the line text and the number
/// of bytes consumed including prefix and CRLF.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    let body = &buf[1..];
    match find_crlf(body) {
        Some(pos) => {
            let line = std::str::from_utf8(&body[..pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((line, 1 + pos + CRLF.len())))
        }
        None => Ok(None),
    }
}

fn parse_int(s: &str) -> ParseResult<i64> {
    s.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))
}

/// Position of the first `\r\n` in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single RESP value from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
