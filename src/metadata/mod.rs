//! Metadata scanning and correlation.
//!
//! - `queries`: configurable catalog query texts
//! - `scanner`: sensitive column, grant and lineage scans
//! - `context`: indexed snapshot of sensitive tables used by rules and analyzers

pub mod context;
pub mod queries;
pub mod scanner;

pub use context::MetadataContext;
pub use queries::{CatalogQueries, DEFAULT_SENSITIVE_KEYWORDS};
pub use scanner::MetadataScanner;
