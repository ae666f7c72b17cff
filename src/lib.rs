//! # keyscope - Keyspace Browser Core for Redis-Compatible Stores
//!
//! keyscope is the engine behind a management console for Redis-compatible
//! key-value stores. It lists keys page by page, groups them into a
//! namespace tree, reads and rewrites values of the five core types, and
//! passes raw commands through to the store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Console                                   │
//! │   list_keys / key_tree     get_key / set_key / delete_key    execute    │
//! └──────┬─────────────────────────────┬───────────────────────────┬────────┘
//!        │                             │                           │
//!        ▼                             ▼                           ▼
//!  ┌───────────┐  ┌───────────┐  ┌───────────┐              ┌───────────┐
//!  │  scanner  │─>│   tree    │  │   codec   │              │  gateway  │
//!  └─────┬─────┘  └───────────┘  └─────┬─────┘              └─────┬─────┘
//!        │                             │                          │
//!        └─────────────────────────────┼──────────────────────────┘
//!                                      ▼
//!                  ┌───────────────────────────────────────┐
//!                  │  Session (one connection, one db)     │
//!                  └───────────────────┬───────────────────┘
//!                                      ▼
//!                  ┌───────────────────────────────────────┐
//!                  │  ConnectionRegistry  id -> StoreClient│
//!                  └──────────┬─────────────────┬──────────┘
//!                             ▼                 ▼
//!                     RespConnection       MemoryClient
//!                      (RESP / TCP)      (embedded store)
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use keyscope::backend::MemoryClient;
//! use keyscope::codec::SetKeyRequest;
//! use keyscope::storage::StorageEngine;
//! use keyscope::Console;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let console = Console::new();
//! console.register("local", MemoryClient::new(Arc::new(StorageEngine::new())));
//!
//! let request = SetKeyRequest::new("hash", json!({"name": "Ariz"}), 0.0);
//! console.set_key("local", 0, "user:1", &request).await?;
//!
//! let value = console.get_key("local", 0, "user:1").await?;
//! assert_eq!(serde_json::to_value(&value)?["value"]["name"], "Ariz");
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! ## Module Overview
//!
//! - [`console`]: the operations a front end calls
//! - [`registry`]: live connections by id
//! - [`session`]: one database on one connection, held exclusively
//! - [`scanner`]: cursor-driven key listing with type and TTL
//! - [`tree`]: namespace tree over a page of keys
//! - [`codec`]: stored bytes to JSON and JSON back to write commands
//! - [`gateway`]: raw command passthrough
//! - [`backend`]: the [`StoreClient`] trait and its RESP and in-memory clients
//! - [`protocol`]: RESP2 values and parser
//! - [`storage`] / [`commands`]: the embedded store behind [`MemoryClient`]
//!
//! ## Concurrency
//!
//! Each connection is one client behind an async mutex. An operation holds
//! that mutex from its `SELECT` to its last reply, so two operations on
//! different databases of the same connection can never interleave their
//! commands. Different connections proceed independently.

pub mod backend;
pub mod codec;
pub mod commands;
pub mod console;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod scanner;
pub mod session;
pub mod storage;
pub mod tree;

pub use backend::{ConnectionConfig, MemoryClient, RespConnection, StoreClient, StoreError};
pub use codec::{SetKeyRequest, ValueEnvelope, ValueType};
pub use console::{Console, TreePage};
pub use error::ConsoleError;
pub use protocol::{ParseError, RespParser, RespValue};
pub use scanner::{KeyDescriptor, KeyType, ScanCursor, ScanPage};
pub use tree::NamespaceNode;

/// The port Redis-compatible stores listen on by default
pub const DEFAULT_PORT: u16 = 6379;

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of keyscope
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
