//! Manifest enrichment pipeline.
//!
//! Each event runs through the same sequence:
//!
//! ```text
//! resolve repository ─► fetch manifest ─► gate on marker
//!        │                    │                 │ not "true": done, untouched
//!        ▼ skip               ▼ skip            ▼
//!                          for each layer (in order):
//!                            fetch blob ─► describe ─► annotate in place
//!                            (a failure leaves that layer as it was)
//!                                               │
//!                                               ▼
//!                 strip marker ─► serialize ─► push ─► retag
//!                                     │ skip     │ skip
//! ```
//!
//! Nothing in here escalates: every failure is logged where it happens and
//! recorded in the returned report, and the next layer or event proceeds.
//! Events and layers are processed strictly one after another.

use std::sync::Arc;

use a3s_enrich_core::config::DEFAULT_TAG;
use a3s_enrich_core::error::{EnrichError, Result};
use a3s_enrich_core::event::{Event, NotificationBatch};
use a3s_enrich_core::manifest::Descriptor;

use crate::describe::Describer;
use crate::oci::Registry;

/// Step at which an event was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    FetchManifest,
    Serialize,
    Push,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve => write!(f, "resolve"),
            Self::FetchManifest => write!(f, "fetch-manifest"),
            Self::Serialize => write!(f, "serialize"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// What happened to one layer.
#[derive(Debug)]
pub enum LayerOutcome {
    Described { digest: String, description: String },
    FetchFailed { digest: String, error: EnrichError },
    DescribeFailed { digest: String, error: EnrichError },
}

impl LayerOutcome {
    pub fn digest(&self) -> &str {
        match self {
            Self::Described { digest, .. }
            | Self::FetchFailed { digest, .. }
            | Self::DescribeFailed { digest, .. } => digest,
        }
    }

    pub fn is_described(&self) -> bool {
        matches!(self, Self::Described { .. })
    }
}

/// What happened to one event.
#[derive(Debug)]
pub enum EventOutcome {
    /// Manifest lacks the opt-in marker; nothing was changed.
    NotRequested,

    /// Processing stopped before anything was published.
    Skipped {
        stage: Stage,
        error: EnrichError,
        layers: Vec<LayerOutcome>,
    },

    /// Rewritten manifest was pushed; `tag` records the retag result.
    Published {
        manifest: Descriptor,
        layers: Vec<LayerOutcome>,
        tag: Result<()>,
    },
}

/// Per-event result
#[derive(Debug)]
pub struct EventReport {
    pub event_id: String,
    pub repository: String,
    pub digest: String,
    pub outcome: EventOutcome,
}

impl EventReport {
    /// Descriptor of the republished manifest, if one was pushed.
    pub fn published(&self) -> Option<&Descriptor> {
        match &self.outcome {
            EventOutcome::Published { manifest, .. } => Some(manifest),
            _ => None,
        }
    }

    pub fn layers(&self) -> &[LayerOutcome] {
        match &self.outcome {
            EventOutcome::Skipped { layers, .. } | EventOutcome::Published { layers, .. } => {
                layers
            }
            EventOutcome::NotRequested => &[],
        }
    }

    /// Published with at least one layer left undescribed.
    pub fn is_partial(&self) -> bool {
        self.published().is_some() && self.layers().iter().any(|l| !l.is_described())
    }

    /// Anything went wrong anywhere in this event.
    pub fn has_failures(&self) -> bool {
        match &self.outcome {
            EventOutcome::NotRequested => false,
            EventOutcome::Skipped { .. } => true,
            EventOutcome::Published { layers, tag, .. } => {
                tag.is_err() || layers.iter().any(|l| !l.is_described())
            }
        }
    }
}

/// Per-request result
#[derive(Debug, Default)]
pub struct BatchReport {
    pub events: Vec<EventReport>,
}

impl BatchReport {
    pub fn published_count(&self) -> usize {
        self.events.iter().filter(|e| e.published().is_some()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.events.iter().filter(|e| e.has_failures()).count()
    }
}

/// Drives registry and description service for each event.
pub struct Pipeline {
    registry: Arc<dyn Registry>,
    describer: Arc<dyn Describer>,
    tag: String,
}

impl Pipeline {
    pub fn new(registry: Arc<dyn Registry>, describer: Arc<dyn Describer>) -> Self {
        Self {
            registry,
            describer,
            tag: DEFAULT_TAG.to_string(),
        }
    }

    /// Tag moved to each republished manifest.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Process every event in order. Failures stay inside their event.
    pub async fn process_batch(&self, batch: &NotificationBatch) -> BatchReport {
        let mut report = BatchReport::default();
        for event in &batch.events {
            report.events.push(self.process_event(event).await);
        }

        tracing::info!(
            events = report.events.len(),
            published = report.published_count(),
            failed = report.failure_count(),
            "Notification batch processed"
        );

        report
    }

    pub async fn process_event(&self, event: &Event) -> EventReport {
        let outcome = self.run(event).await;
        if let EventOutcome::Skipped { stage, .. } = &outcome {
            tracing::warn!(event_id = %event.id, stage = %stage, "Event skipped");
        }
        EventReport {
            event_id: event.id.clone(),
            repository: event.target.repository.clone(),
            digest: event.target.digest.clone(),
            outcome,
        }
    }

    async fn run(&self, event: &Event) -> EventOutcome {
        let target = &event.target;

        let repository = match self.registry.repository(&target.repository).await {
            Ok(repository) => repository,
            Err(error) => {
                tracing::error!(event_id = %event.id, repository = %target.repository, error = %error, "Failed to resolve repository");
                return skipped(Stage::Resolve, error, Vec::new());
            }
        };

        let (mut manifest, _raw) = match repository.fetch_manifest(&target.digest).await {
            Ok(fetched) => fetched,
            Err(error) => {
                tracing::error!(event_id = %event.id, reference = %target, error = %error, "Failed to fetch manifest");
                return skipped(Stage::FetchManifest, error, Vec::new());
            }
        };

        if !manifest.requests_description() {
            tracing::info!(event_id = %event.id, reference = %target, "Manifest does not request descriptions");
            return EventOutcome::NotRequested;
        }

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for (index, layer) in manifest.layers.iter_mut().enumerate() {
            let digest = layer.digest.clone();

            let bytes = match repository.fetch_layer(layer).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::error!(reference = %target, layer = index, digest = %digest, error = %error, "Failed to fetch layer");
                    layers.push(LayerOutcome::FetchFailed { digest, error });
                    continue;
                }
            };

            tracing::info!(reference = %target, layer = index, size = bytes.len(), "Describing layer");
            match self.describer.describe(&bytes).await {
                Ok(description) => {
                    layer.set_description(description.clone());
                    tracing::info!(reference = %target, layer = index, "Layer described");
                    layers.push(LayerOutcome::Described { digest, description });
                }
                Err(error) => {
                    tracing::error!(reference = %target, layer = index, digest = %digest, error = %error, "Failed to describe layer");
                    layers.push(LayerOutcome::DescribeFailed { digest, error });
                }
            }
        }

        manifest.clear_marker();

        let bytes = match manifest.to_bytes() {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::error!(reference = %target, error = %error, "Failed to serialize manifest");
                return skipped(Stage::Serialize, error, layers);
            }
        };

        let published = match repository
            .push_manifest(manifest.media_type_or_default(), bytes)
            .await
        {
            Ok(descriptor) => descriptor,
            Err(error) => {
                tracing::error!(reference = %target, error = %error, "Failed to push manifest");
                return skipped(Stage::Push, error, layers);
            }
        };

        let tag = repository.tag(&published, &self.tag).await;
        if let Err(error) = &tag {
            tracing::error!(reference = %target, tag = %self.tag, digest = %published.digest, error = %error, "Failed to tag manifest");
        }

        EventOutcome::Published {
            manifest: published,
            layers,
            tag,
        }
    }
}

fn skipped(stage: Stage, error: EnrichError, layers: Vec<LayerOutcome>) -> EventOutcome {
    EventOutcome::Skipped {
        stage,
        error,
        layers,
    }
}
