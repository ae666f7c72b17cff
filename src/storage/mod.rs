//! Embedded Redis-compatible store.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     StorageEngine                        │
//! │  ┌────────────┐ ┌────────────┐        ┌────────────┐     │
//! │  │   db 0     │ │   db 1     │  ...   │   db 15    │     │
//! │  │  RwLock    │ │  RwLock    │        │  RwLock    │     │
//! │  │  BTreeMap  │ │  BTreeMap  │        │  BTreeMap  │     │
//! │  └────────────┘ └────────────┘        └────────────┘     │
//! └──────────────────────────────────────────────────────────┘
//!                 ▲
//!                 │ one CommandHandler per client
//!        ┌────────┴────────┐
//!        │  MemoryClient   │  (selected db lives here)
//!        └─────────────────┘
//! ```
//!
//! The engine gives `keyscope` a backing store that needs no network: the
//! console's `--memory` mode and the crate's tests run against it.

pub mod engine;
pub mod glob;

pub use engine::{Entry, ScanStep, StorageEngine, StorageError, Value, NUM_DATABASES};
pub use glob::GlobPattern;
