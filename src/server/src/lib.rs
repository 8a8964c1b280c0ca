//! A3S Enrich Server - registry notification webhook.
//!
//! Decodes notification batches posted by a container registry and runs
//! each event through the enrichment pipeline.

pub mod app;
pub mod cli;

pub use app::{create_app, AppState};
pub use cli::{Args, LogFormat};
