//! OCI registry access for A3S Enrich.
//!
//! The pipeline only sees the [`Registry`] and [`Repository`] traits;
//! [`OciRegistry`] implements them against a live registry.

pub mod registry;

pub use registry::{OciRegistry, OciRepository, Registry, RegistryAuth, Repository};
