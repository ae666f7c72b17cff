//! RESP2 value model.
//!
//! Every request `keyscope` sends is an array of bulk strings, and every reply
//! it reads is one of the five RESP2 shapes below.
//!
//! ```text
//! +OK\r\n                      simple string
//! -ERR unknown command\r\n     error
//! :1000\r\n                    integer
//! $5\r\nhello\r\n              bulk string ($-1\r\n is null)
//! *2\r\n$4\r\nSCAN\r\n$1\r\n0\r\n  array (*-1\r\n is null)
//! ```

use bytes::Bytes;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single RESP2 value, used for both outgoing commands and incoming replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+<string>\r\n`
    SimpleString(String),

    /// `-<message>\r\n`. The store reports command failures this way.
    Error(String),

    /// `:<integer>\r\n`
    Integer(i64),

    /// `$<length>\r\n<data>\r\n`. Binary safe.
    BulkString(Bytes),

    /// Null bulk string or null array.
    Null,

    /// `*<count>\r\n<element>...`
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Builds a request frame: an array of bulk strings, one per argument.
    ///
    /// ```
    /// use keyscope::protocol::RespValue;
    /// let frame = RespValue::command(["TYPE", "user:1"]);
    /// assert_eq!(frame.serialize(), b"*2\r\n$4\r\nTYPE\r\n$6\r\nuser:1\r\n");
    /// ```
    pub fn command<I, B>(argv: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        RespValue::Array(
            argv.into_iter()
                .map(|arg| RespValue::BulkString(arg.into()))
                .collect(),
        )
    }

    /// Serializes the value to its wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer, so a pipeline of
    /// commands can share one write.
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
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Text of a simple or bulk string, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Integer value of an integer reply, or of a string reply holding one
    /// (`CONFIG GET` and `SCAN` answer numbers as bulk strings).
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            RespValue::BulkString(_) | RespValue::SimpleString(_) => {
                self.as_str().and_then(|s| s.parse().ok())
            }
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Consumes a simple or bulk string and returns its raw bytes.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b),
            RespValue::SimpleString(s) => Some(Bytes::from(s)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frame() {
        let frame = RespValue::command(["SCAN", "0", "COUNT", "100"]);
        assert_eq!(
            frame.serialize(),
            b"*4\r\n$4\r\nSCAN\r\n$1\r\n0\r\n$5\r\nCOUNT\r\n$3\r\n100\r\n"
        );
    }

    #[test]
    fn test_command_frame_binary_argument() {
        let frame = RespValue::command(vec![Bytes::from("SET"), Bytes::from(&b"k\x00"[..])]);
        assert_eq!(frame.serialize(), b"*2\r\n$3\r\nSET\r\n$2\r\nk\x00\r\n");
    }

    #[test]
    fn test_scalar_serialize() {
        assert_eq!(RespValue::ok().serialize(), b"+OK\r\n");
        assert_eq!(RespValue::error("ERR boom").serialize(), b"-ERR boom\r\n");
        assert_eq!(RespValue::integer(-2).serialize(), b":-2\r\n");
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_nested_array_serialize() {
        let value = RespValue::array(vec![
            RespValue::bulk_string("17"),
            RespValue::array(vec![RespValue::bulk_string("a:b")]),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n$2\r\n17\r\n*1\r\n$3\r\na:b\r\n");
    }

    #[test]
    fn test_as_integer_accepts_numeric_strings() {
        assert_eq!(RespValue::integer(7).as_integer(), Some(7));
        assert_eq!(RespValue::bulk_string("16").as_integer(), Some(16));
        assert_eq!(RespValue::bulk_string("x").as_integer(), None);
        assert_eq!(RespValue::Null.as_integer(), None);
    }

    #[test]
    fn test_as_str_rejects_invalid_utf8() {
        let value = RespValue::bulk_string(Bytes::from(&b"\xff\xfe"[..]));
        assert!(value.as_str().is_none());
        assert_eq!(value.as_bytes(), Some(&b"\xff\xfe"[..]));
    }
}
