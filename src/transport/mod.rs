//! Transport layer.
//!
//! Snowwatch is served over HTTP only.

pub mod http;

pub use http::{AppState, HttpTransport, router};
