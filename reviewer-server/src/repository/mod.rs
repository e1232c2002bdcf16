//! Storage backends for the server.
//!
//! The in-memory backend lives in `reviewer-core`; this crate adds SQLite.

pub mod sqlite;

pub use sqlite::SqliteRepository;
