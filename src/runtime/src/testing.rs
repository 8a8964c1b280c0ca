//! In-memory stand-ins for the registry and the description service.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! dependent crates' tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use a3s_enrich_core::error::{EnrichError, Result};
use a3s_enrich_core::manifest::{sha256_digest, Descriptor, Manifest};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::describe::Describer;
use crate::oci::{Registry, Repository};

#[derive(Default)]
struct RepoState {
    manifests: HashMap<String, Vec<u8>>,
    blobs: HashMap<String, Vec<u8>>,
    tags: HashMap<String, String>,
    fail_pushes: bool,
    fail_tags: bool,
}

#[derive(Default)]
struct State {
    repositories: HashMap<String, RepoState>,
    unreachable: HashSet<String>,
    resolves: usize,
    pushes: usize,
    tags: usize,
}

/// Content-addressed registry kept in memory.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<Mutex<State>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a blob and return its descriptor.
    pub fn put_blob(&self, repository: &str, media_type: &str, bytes: &[u8]) -> Descriptor {
        let descriptor = Descriptor::for_content(media_type, bytes);
        self.state
            .lock()
            .repositories
            .entry(repository.to_string())
            .or_default()
            .blobs
            .insert(descriptor.digest.clone(), bytes.to_vec());
        descriptor
    }

    /// Store manifest bytes under an arbitrary digest.
    pub fn put_manifest_at(&self, repository: &str, digest: &str, bytes: &[u8]) {
        self.state
            .lock()
            .repositories
            .entry(repository.to_string())
            .or_default()
            .manifests
            .insert(digest.to_string(), bytes.to_vec());
    }

    pub fn manifest(&self, repository: &str, digest: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .repositories
            .get(repository)
            .and_then(|repo| repo.manifests.get(digest).cloned())
    }

    pub fn manifest_count(&self, repository: &str) -> usize {
        self.state
            .lock()
            .repositories
            .get(repository)
            .map_or(0, |repo| repo.manifests.len())
    }

    /// Digest a tag currently points at.
    pub fn tag(&self, repository: &str, tag: &str) -> Option<String> {
        self.state
            .lock()
            .repositories
            .get(repository)
            .and_then(|repo| repo.tags.get(tag).cloned())
    }

    /// Make `repository` fail to resolve.
    pub fn mark_unreachable(&self, repository: &str) {
        self.state.lock().unreachable.insert(repository.to_string());
    }

    pub fn fail_pushes(&self, repository: &str) {
        self.state
            .lock()
            .repositories
            .entry(repository.to_string())
            .or_default()
            .fail_pushes = true;
    }

    pub fn fail_tags(&self, repository: &str) {
        self.state
            .lock()
            .repositories
            .entry(repository.to_string())
            .or_default()
            .fail_tags = true;
    }

    pub fn resolve_count(&self) -> usize {
        self.state.lock().resolves
    }

    pub fn push_count(&self) -> usize {
        self.state.lock().pushes
    }

    pub fn tag_count(&self) -> usize {
        self.state.lock().tags
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn repository(&self, name: &str) -> Result<Box<dyn Repository>> {
        let mut state = self.state.lock();
        state.resolves += 1;
        if name.is_empty() || state.unreachable.contains(name) {
            return Err(EnrichError::ConnectFailed {
                registry: "memory".to_string(),
                message: format!("repository '{}' unreachable", name),
            });
        }
        Ok(Box::new(MemoryRepository {
            state: self.state.clone(),
            name: name.to_string(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryRepository {
    state: Arc<Mutex<State>>,
    name: String,
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn fetch_manifest(&self, digest: &str) -> Result<(Manifest, Vec<u8>)> {
        let raw = self
            .state
            .lock()
            .repositories
            .get(&self.name)
            .and_then(|repo| repo.manifests.get(digest).cloned())
            .ok_or_else(|| EnrichError::NotFound(format!("{}@{}", self.name, digest)))?;
        let manifest = Manifest::from_slice(&raw)
            .map_err(|e| EnrichError::DecodeFailed(e.to_string()))?;
        Ok((manifest, raw))
    }

    async fn fetch_layer(&self, descriptor: &Descriptor) -> Result<Vec<u8>> {
        let data = self
            .state
            .lock()
            .repositories
            .get(&self.name)
            .and_then(|repo| repo.blobs.get(&descriptor.digest).cloned())
            .ok_or_else(|| EnrichError::NotFound(descriptor.digest.clone()))?;
        descriptor
            .verify(&data)
            .map_err(|message| EnrichError::IoFailed {
                digest: descriptor.digest.clone(),
                message,
            })?;
        Ok(data)
    }

    async fn push_manifest(&self, media_type: &str, bytes: Vec<u8>) -> Result<Descriptor> {
        let mut state = self.state.lock();
        state.pushes += 1;
        let repo = state.repositories.entry(self.name.clone()).or_default();
        let descriptor = Descriptor::for_content(media_type, &bytes);
        if repo.fail_pushes {
            return Err(EnrichError::PushFailed {
                reference: format!("{}@{}", self.name, descriptor.digest),
                message: "push rejected".to_string(),
            });
        }
        repo.manifests.insert(descriptor.digest.clone(), bytes);
        Ok(descriptor)
    }

    async fn tag(&self, descriptor: &Descriptor, tag: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.tags += 1;
        let repo = state.repositories.entry(self.name.clone()).or_default();
        let tag_failed = |message: &str| EnrichError::TagFailed {
            tag: tag.to_string(),
            message: message.to_string(),
        };
        if repo.fail_tags {
            return Err(tag_failed("tag rejected"));
        }
        if !repo.manifests.contains_key(&descriptor.digest) {
            return Err(tag_failed("manifest unknown"));
        }
        repo.tags.insert(tag.to_string(), descriptor.digest.clone());
        Ok(())
    }
}

/// Describer answering from a fixed script keyed by image bytes.
///
/// Unscripted images yield a `MalformedResponse` error.
#[derive(Clone, Default)]
pub struct ScriptedDescriber {
    // `None` scripts a timeout
    script: Arc<HashMap<String, Option<String>>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedDescriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, image: &[u8], text: &str) -> Self {
        self.with_entry(image, Some(text.to_string()))
    }

    pub fn with_timeout(self, image: &[u8]) -> Self {
        self.with_entry(image, None)
    }

    fn with_entry(mut self, image: &[u8], entry: Option<String>) -> Self {
        Arc::make_mut(&mut self.script).insert(sha256_digest(image), entry);
        self
    }

    /// Number of describe calls made so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Describer for ScriptedDescriber {
    async fn describe(&self, image: &[u8]) -> Result<String> {
        *self.calls.lock() += 1;
        match self.script.get(&sha256_digest(image)) {
            Some(Some(text)) => Ok(text.clone()),
            Some(None) => Err(EnrichError::Timeout("scripted timeout".to_string())),
            None => Err(EnrichError::MalformedResponse {
                status: Some(500),
                message: "unscripted image".to_string(),
            }),
        }
    }
}
