// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod clean;
pub mod config;
pub mod credibility;
pub mod fetch;
pub mod metrics;
pub mod schema;
pub mod sentiment;
pub mod service;

pub use crate::api::router;
pub use crate::config::FeedsConfig;
pub use crate::fetch::{fetch_with_fallback, run_cascade, CascadeMode};
pub use crate::service::{FeedService, ServiceError};
