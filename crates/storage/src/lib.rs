//! Storage abstraction and implementations for coursetrack.
//!
//! This crate provides the record store the enrollment tracker is built on: a
//! trait-based interface with a JSON file reference implementation and an
//! optional SQLite backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{Storage, StorageError, Result};
pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
