//! Storage backend implementations.
//!
//! This module provides concrete implementations of the store traits
//! defined in `calvault_core::store`, selected via feature flags.
//!
//! # Feature Flags
//!
//! - `inmemory` (default): HashMap-backed store for tests and embedding
//! - `sqlite`: persistent store using `rusqlite` and `tokio-rusqlite`
//!
//! The features are additive; at least one backend must be enabled.

#[cfg(not(any(feature = "inmemory", feature = "sqlite")))]
compile_error!(
    "No storage backend selected. Enable 'inmemory' or 'sqlite'. \
    Example: cargo build -p calvault --features sqlite"
);

#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
