//! RESP2 client connection.
//!
//! ## Buffer Management
//!
//! Replies accumulate in a `BytesMut`. A read can end in the middle of a
//! reply or carry several pipelined replies at once. A [`FrameScanner`]
//! walks the buffer as it grows, picking up where the previous read left
//! off, and the parser only runs once a whole frame is buffered.
//!
//! ## Abandoned Calls
//!
//! A caller may drop a `call` future after its command went out. The
//! connection counts the replies it still owes to nobody and reads past them
//! before the next command, so every reply reaches the call that asked for
//! it. A command dropped halfway through being written cannot be recovered
//! from; the connection reports [`StoreError::OutOfSync`] from then on.
//!
//! ```text
//!  call/pipeline ──► serialize into one Vec ──► BufWriter ──► flush
//!                                                              │
//!  RespValue ◄── parser ◄── BytesMut ◄── read_buf ◄────────────┘
//! ```

use crate::backend::{argv, ConnectionConfig, StoreClient, StoreError};
use crate::protocol::{FrameScanner, ParseError, RespParser, RespValue};
use bytes::{Bytes, BytesMut};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Initial read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// A RESP connection over any bidirectional byte stream.
pub struct RespConnection<S> {
    stream: BufWriter<S>,
    buffer: BytesMut,
    frames: FrameScanner,
    parser: RespParser,
    /// Replies sent by the store for calls that were dropped before reading.
    unread: usize,
    /// Set while a command is being written.
    writing: bool,
    /// Peer label for logging.
    peer: String,
}

impl<S> fmt::Debug for RespConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RespConnection")
            .field("peer", &self.peer)
            .field("buffered", &self.buffer.len())
            .field("unread", &self.unread)
            .finish()
    }
}

impl RespConnection<TcpStream> {
    /// Opens a TCP connection, authenticates if a password is configured, and
    /// checks the configured database is selectable.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, StoreError> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        stream.set_nodelay(true)?;

        let mut connection = Self::new(stream, config.id());
        connection.handshake(config).await?;
        info!(peer = %connection.peer, db = config.db, "Connected to store");
        Ok(connection)
    }
}

impl<S> RespConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            frames: FrameScanner::new(),
            parser: RespParser::new(),
            unread: 0,
            writing: false,
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// `AUTH` (when configured), `PING`, then `SELECT` of the configured db.
    /// Any error reply here is a failed connection.
    pub async fn handshake(&mut self, config: &ConnectionConfig) -> Result<(), StoreError> {
        if let Some(password) = &config.password {
            self.expect_ok(argv(["AUTH".to_string(), password.clone()]), "AUTH")
                .await?;
        }

        match self.call(argv(["PING"])).await? {
            RespValue::SimpleString(s) if s == "PONG" => {}
            RespValue::Error(message) => return Err(StoreError::Reply(message)),
            other => return Err(StoreError::unexpected("PING", other)),
        }

        self.expect_ok(argv(["SELECT".to_string(), config.db.to_string()]), "SELECT")
            .await
    }

    async fn expect_ok(&mut self, argv: Vec<Bytes>, command: &str) -> Result<(), StoreError> {
        match self.call(argv).await? {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            RespValue::Error(message) => {
                warn!(peer = %self.peer, command, error = %message, "Handshake rejected");
                Err(StoreError::Reply(message))
            }
            other => Err(StoreError::unexpected(command, other)),
        }
    }

    /// Writes every command in one flush. Each command owes one reply.
    async fn send(&mut self, commands: &[Vec<Bytes>]) -> Result<(), StoreError> {
        if self.writing {
            return Err(StoreError::OutOfSync(
                "an abandoned call left a command partly written".to_string(),
            ));
        }
        self.skip_unread().await?;

        let mut bytes = Vec::new();
        for argv in commands {
            RespValue::command(argv.iter().cloned()).serialize_into(&mut bytes);
        }
        self.writing = true;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.writing = false;
        self.unread += commands.len();
        trace!(peer = %self.peer, commands = commands.len(), bytes = bytes.len(), "Sent commands");
        Ok(())
    }

    /// Reads and drops the replies of calls nobody is waiting for anymore.
    async fn skip_unread(&mut self) -> Result<(), StoreError> {
        if self.unread > 0 {
            debug!(peer = %self.peer, replies = self.unread, "Skipping replies of abandoned calls");
        }
        while self.unread > 0 {
            self.read_reply().await?;
        }
        Ok(())
    }

    /// Reads exactly one reply.
    async fn read_reply(&mut self) -> Result<RespValue, StoreError> {
        let frame_len = loop {
            if let Some(len) = self.frames.scan(&self.buffer)? {
                break len;
            }
            self.read_more_data().await?;
        };

        let frame = self.buffer.split_to(frame_len);
        self.unread = self.unread.saturating_sub(1);
        let (value, _) = self.parser.parse(&frame)?.ok_or_else(|| {
            ParseError::ProtocolError("reply shorter than its frame".to_string())
        })?;
        trace!(
            peer = %self.peer,
            consumed = frame_len,
            remaining = self.buffer.len(),
            "Parsed reply"
        );
        Ok(value)
    }

    async fn read_more_data(&mut self) -> Result<(), StoreError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            debug!(peer = %self.peer, buffered = self.buffer.len(), "Store closed the connection");
            return Err(StoreError::Closed);
        }
        trace!(peer = %self.peer, bytes = n, "Read data");
        Ok(())
    }
}

impl<S> StoreClient for RespConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn call(&mut self, argv: Vec<Bytes>) -> Result<RespValue, StoreError> {
        self.send(std::slice::from_ref(&argv)).await?;
        self.read_reply().await
    }

    async fn pipeline(&mut self, commands: Vec<Vec<Bytes>>) -> Result<Vec<RespValue>, StoreError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        self.send(&commands).await?;
        let mut replies = Vec::with_capacity(commands.len());
        for _ in 0..commands.len() {
            replies.push(self.read_reply().await?);
        }
        Ok(replies)
    }
}
