//! Snowwatch Library
//!
//! Insider-threat auditing for data warehouses: sensitive column discovery,
//! access review and query activity alerts, with optional chat webhook
//! notifications.

pub mod config;
pub mod db;
pub mod error;
pub mod metadata;
pub mod models;
pub mod notify;
pub mod rules;
pub mod transport;

pub use config::Config;
pub use error::{BackendError, WatchError, WatchResult};
