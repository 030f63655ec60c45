//! SQLite backend for the Kar session/draft store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every store operation is one call on
//! that thread, wrapped in a transaction where it reads before writing.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_DRAFT_TTL_DAYS, SqliteStore};
