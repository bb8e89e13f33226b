//! Issuemaker core library.
//!
//! This crate provides the pieces for creating Linear issues in bulk from
//! tabular input: configuration, input parsing, the two backend transports,
//! name resolution with a per-run cache, and the batch orchestrator.

pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod resolver;
pub mod transport;

// Re-exports for convenience.
pub use config::AppConfig;
pub use orchestrator::{execute, BatchObserver, BatchOptions, BatchOrchestrator, NoopObserver};
pub use resolver::Resolver;
pub use transport::{Backend, BackendKind, Transport, TransportMode};
