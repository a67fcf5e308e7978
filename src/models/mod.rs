//! Data models for Snowwatch.
//!
//! This module re-exports all model types used throughout the application.

pub mod alert;
pub mod metadata;

// Re-export commonly used types
pub use alert::{Alert, Severity};
pub use metadata::{
    ActivityRecord, GrantRecord, GrantedTo, LineageEdge, LineagePath, SensitiveColumn,
    parse_timestamp,
};
