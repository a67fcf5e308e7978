//! Backend access layer.
//!
//! This module provides warehouse access functionality:
//! - The `Backend`/`Session` seam and connection parameters
//! - Session management with bounded retry
//! - The sqlx-backed implementation (Postgres, SQLite)
//! - Row decoding into JSON objects

pub mod backend;
pub mod pool;
pub mod retry;
pub mod sqlx_backend;
pub mod types;

pub use backend::{Backend, ConnectionParams, QueryParam, Row, Session};
pub use pool::ConnectionManager;
pub use retry::{RetryError, RetryPolicy};
pub use sqlx_backend::{Driver, SqlxBackend, SqlxSession};
