// Campus Meetup - group capacity & waitlist engine with statistics and badges

// Core types and primitives
pub mod core;

// Domain models
pub mod models;

// Capacity ledger, lifecycle state machine and expiry sweeper
pub mod engine;

// Statistics aggregation and badge evaluation
pub mod stats;

// Storage, ids, caching, events, notifications and request identity
pub mod infrastructure;

// Application wiring and HTTP binding
pub mod api;
pub mod app_state;
pub mod config;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult, ConflictKind};
