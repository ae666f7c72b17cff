//! Request dispatch for the embedded store.
//!
//! ```text
//! RespValue::Array  ──►  CommandHandler  ──►  StorageEngine
//!   (argv frame)         (selected db)        (shared, all dbs)
//! ```
//!
//! The handler speaks the subset of Redis that `keyscope` itself sends, plus
//! the read commands a person typically types into the console.

pub mod handler;

pub use handler::CommandHandler;
