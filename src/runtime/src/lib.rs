//! A3S Enrich Runtime - registry access, image descriptions and the
//! enrichment pipeline driven by registry notifications.

pub mod describe;
pub mod oci;
pub mod pipeline;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export common types
pub use describe::{Describer, OpenAiDescriber};
pub use oci::{OciRegistry, Registry, Repository};
pub use pipeline::{BatchReport, EventOutcome, EventReport, LayerOutcome, Pipeline, Stage};
