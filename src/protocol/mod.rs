//! RESP2 protocol support.
//!
//! - `types`: the [`RespValue`] model and its serializer
//! - `parser`: an incremental parser for replies (and, in tests, requests)
//!
//! ```
//! use keyscope::protocol::{parse_message, RespValue};
//!
//! let request = RespValue::command(["TTL", "session:1"]).serialize();
//! assert!(request.starts_with(b"*2\r\n"));
//!
//! let (reply, consumed) = parse_message(b":-1\r\n").unwrap().unwrap();
//! assert_eq!(reply, RespValue::Integer(-1));
//! assert_eq!(consumed, 5);
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, FrameScanner, ParseError, ParseResult, RespParser};
pub use types::RespValue;
