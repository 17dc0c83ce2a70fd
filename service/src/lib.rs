//! # Seatwatch Service
//!
//! Configuration loading and process wiring for the crawl dispatcher and the
//! vacancy reconciler. Transport adapters are injected through
//! [`Collaborators`]; the `demo` binary wires the in-memory ones.

/// Process wiring and driver lifecycle
pub mod app;

/// Environment-based configuration
pub mod config;

pub use app::{AppError, Collaborators, RunningApp, SeatwatchApp, ShutdownSummary};
pub use config::{Config, ConfigError};
