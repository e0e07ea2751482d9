//! windowguard: sliding-window rate limiting over a shared counting store
//!
//! This module exports the limiter, its store backends and the HTTP surface
//! for testing and reuse.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod limiter;
pub mod models;
pub mod routes;
pub mod security;
pub mod store;

pub use config::{Config, StoreBackend};
pub use error::{AppError, Result, StoreError};
pub use limiter::{RateLimitAction, RateLimiter};
pub use models::{RateLimitDecision, RateLimitStatus};
pub use routes::router;
pub use store::{open_store, AtomicWindowCounter, SharedCounter};

use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub config: Config,
}

impl AppState {
    /// Create a new AppState with the given limiter and configuration
    pub fn new(limiter: RateLimiter, config: Config) -> Self {
        Self {
            limiter: Arc::new(limiter),
            config,
        }
    }
}
