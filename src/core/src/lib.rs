//! A3S Enrich Core - Foundational Types
//!
//! Notification and manifest models, the error taxonomy and the immutable
//! service configuration shared by the runtime and the webhook server.

pub mod config;
pub mod error;
pub mod event;
pub mod manifest;

// Re-export commonly used types
pub use config::{DescriberConfig, EnrichConfig, RegistryConfig};
pub use error::{EnrichError, Result};
pub use event::{Event, NotificationBatch, Target};
pub use manifest::{
    sha256_digest, Annotations, Descriptor, Manifest, DESCRIPTION_ANNOTATION, MARKER_ANNOTATION,
};

/// A3S Enrich version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
