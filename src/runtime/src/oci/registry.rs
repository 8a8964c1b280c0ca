//! OCI registry client for fetching and republishing manifests.
//!
//! Uses the `oci-distribution` crate to talk to the registry. Every call is a
//! network round trip; nothing is cached locally.

use a3s_enrich_core::config::RegistryConfig;
use a3s_enrich_core::error::{EnrichError, Result};
use a3s_enrich_core::manifest::{Descriptor, Manifest};
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use http::HeaderValue;
use oci_distribution::errors::{OciDistributionError, OciErrorCode};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference, RegistryOperation};
use std::sync::Arc;

/// Manifest media types accepted when fetching by digest.
const ACCEPTED_MANIFEST_TYPES: &[&str] = &[
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.v2+json",
];

/// A registry the pipeline can open repositories on.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Resolve a named repository.
    async fn repository(&self, name: &str) -> Result<Box<dyn Repository>>;

    /// Check that the registry answers at all.
    async fn ping(&self) -> Result<()>;
}

/// Content operations on one repository.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetch and decode a manifest by digest, returning the raw bytes as well.
    async fn fetch_manifest(&self, digest: &str) -> Result<(Manifest, Vec<u8>)>;

    /// Fetch a blob and verify it against its descriptor.
    async fn fetch_layer(&self, descriptor: &Descriptor) -> Result<Vec<u8>>;

    /// Push manifest bytes under their own content digest.
    async fn push_manifest(&self, media_type: &str, bytes: Vec<u8>) -> Result<Descriptor>;

    /// Point `tag` at the manifest `descriptor` refers to.
    async fn tag(&self, descriptor: &Descriptor, tag: &str) -> Result<()>;
}

/// Authentication credentials for a container registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Basic auth when both halves are configured, anonymous otherwise.
    pub fn from_config(config: &RegistryConfig) -> Self {
        match (&config.username, &config.password) {
            (Some(u), Some(p)) => Self::basic(u.clone(), p.clone()),
            _ => Self::anonymous(),
        }
    }

    /// Convert to oci-distribution auth type.
    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

struct Shared {
    client: Client,
    auth: OciRegistryAuth,
    address: String,
    plain_http: bool,
}

/// Registry reached through `oci-distribution`.
#[derive(Clone)]
pub struct OciRegistry {
    shared: Arc<Shared>,
}

impl OciRegistry {
    /// Create a registry client from configuration.
    pub fn new(config: &RegistryConfig) -> Self {
        let protocol = if config.plain_http {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });

        Self {
            shared: Arc::new(Shared {
                client,
                auth: RegistryAuth::from_config(config).to_oci_auth(),
                address: config.address.clone(),
                plain_http: config.plain_http,
            }),
        }
    }
}

#[async_trait]
impl Registry for OciRegistry {
    async fn repository(&self, name: &str) -> Result<Box<dyn Repository>> {
        let base = parse_reference(&self.shared.address, &format!("{}/{}", self.shared.address, name))?;

        // The auth handshake doubles as the registry version check.
        self.shared
            .client
            .auth(&base, &self.shared.auth, RegistryOperation::Pull)
            .await
            .map_err(|e| EnrichError::ConnectFailed {
                registry: self.shared.address.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!(registry = %self.shared.address, repository = %name, "Resolved repository");

        Ok(Box::new(OciRepository {
            shared: self.shared.clone(),
            name: name.to_string(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        let scheme = if self.shared.plain_http { "http" } else { "https" };
        let url = format!("{}://{}/v2/", scheme, self.shared.address);

        let response = reqwest::get(&url)
            .await
            .map_err(|e| EnrichError::ConnectFailed {
                registry: self.shared.address.clone(),
                message: e.to_string(),
            })?;

        // 401 still proves a registry is listening.
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(EnrichError::ConnectFailed {
                registry: self.shared.address.clone(),
                message: format!("unexpected status {}", status),
            })
        }
    }
}

/// Handle on one repository of an [`OciRegistry`].
pub struct OciRepository {
    shared: Arc<Shared>,
    name: String,
}

impl OciRepository {
    fn digest_reference(&self, digest: &str) -> Result<Reference> {
        parse_reference(
            &self.shared.address,
            &format!("{}/{}@{}", self.shared.address, self.name, digest),
        )
    }

    /// Manifest push target for `digest`.
    ///
    /// The digest rides in the tag slot: oci-distribution derives the
    /// fallback URL for registries that omit `Location` from the tag.
    fn push_reference(&self, digest: &str) -> Reference {
        Reference::with_tag(
            self.shared.address.clone(),
            self.name.clone(),
            digest.to_string(),
        )
    }

    fn tag_reference(&self, tag: &str) -> Result<Reference> {
        parse_reference(
            &self.shared.address,
            &format!("{}/{}:{}", self.shared.address, self.name, tag),
        )
    }

    async fn pull_raw(&self, reference: &Reference, accepted: &[&str]) -> Result<Vec<u8>> {
        let (raw, _digest) = self
            .shared
            .client
            .pull_manifest_raw(reference, &self.shared.auth, accepted)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    EnrichError::NotFound(reference.whole())
                } else {
                    EnrichError::ConnectFailed {
                        registry: self.shared.address.clone(),
                        message: format!("Failed to pull manifest {}: {}", reference.whole(), e),
                    }
                }
            })?;
        Ok(raw)
    }

    async fn authorize_push(&self, reference: &Reference) -> std::result::Result<(), String> {
        self.shared
            .client
            .auth(reference, &self.shared.auth, RegistryOperation::Push)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Repository for OciRepository {
    async fn fetch_manifest(&self, digest: &str) -> Result<(Manifest, Vec<u8>)> {
        let reference = self.digest_reference(digest)?;
        let raw = self.pull_raw(&reference, ACCEPTED_MANIFEST_TYPES).await?;

        let manifest = Manifest::from_slice(&raw).map_err(|e| {
            EnrichError::DecodeFailed(format!("{}: {}", reference.whole(), e))
        })?;

        tracing::debug!(
            reference = %reference,
            layers = manifest.layers.len(),
            "Fetched manifest"
        );

        Ok((manifest, raw))
    }

    async fn fetch_layer(&self, descriptor: &Descriptor) -> Result<Vec<u8>> {
        let reference = self.digest_reference(&descriptor.digest)?;
        let layer = OciDescriptor {
            media_type: descriptor.media_type.clone(),
            digest: descriptor.digest.clone(),
            size: descriptor.size,
            urls: descriptor.urls(),
            annotations: None,
        };

        let mut data: Vec<u8> = Vec::new();
        self.shared
            .client
            .pull_blob(&reference, &layer, &mut data)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    EnrichError::NotFound(reference.whole())
                } else {
                    EnrichError::IoFailed {
                        digest: descriptor.digest.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        descriptor
            .verify(&data)
            .map_err(|message| EnrichError::IoFailed {
                digest: descriptor.digest.clone(),
                message,
            })?;

        Ok(data)
    }

    async fn push_manifest(&self, media_type: &str, bytes: Vec<u8>) -> Result<Descriptor> {
        let descriptor = Descriptor::for_content(media_type, &bytes);
        let reference = self.push_reference(&descriptor.digest);
        let push_failed = |message: String| EnrichError::PushFailed {
            reference: format!("{}/{}@{}", self.shared.address, self.name, descriptor.digest),
            message,
        };

        let content_type = HeaderValue::from_str(media_type)
            .map_err(|e| push_failed(format!("invalid media type: {}", e)))?;
        self.authorize_push(&reference).await.map_err(push_failed)?;

        let url = self
            .shared
            .client
            .push_manifest_raw(&reference, bytes, content_type)
            .await
            .map_err(|e| push_failed(e.to_string()))?;

        tracing::info!(
            reference = %reference,
            manifest_url = %url,
            size = descriptor.size,
            "Manifest pushed"
        );

        Ok(descriptor)
    }

    async fn tag(&self, descriptor: &Descriptor, tag: &str) -> Result<()> {
        let tag_failed = |message: String| EnrichError::TagFailed {
            tag: tag.to_string(),
            message,
        };

        // The distribution API has no tag verb: re-put the same bytes under the tag.
        let source = self.digest_reference(&descriptor.digest)?;
        let raw = self
            .pull_raw(&source, &[descriptor.media_type.as_str()])
            .await
            .map_err(|e| tag_failed(e.to_string()))?;
        descriptor.verify(&raw).map_err(tag_failed)?;

        let target = self.tag_reference(tag)?;
        let content_type = HeaderValue::from_str(&descriptor.media_type)
            .map_err(|e| tag_failed(format!("invalid media type: {}", e)))?;
        self.authorize_push(&target).await.map_err(tag_failed)?;
        self.shared
            .client
            .push_manifest_raw(&target, raw, content_type)
            .await
            .map_err(|e| tag_failed(e.to_string()))?;

        tracing::info!(
            reference = %target,
            digest = %descriptor.digest,
            "Tag updated"
        );

        Ok(())
    }
}

/// Registry said the manifest, blob or repository does not exist.
fn is_not_found(error: &OciDistributionError) -> bool {
    match error {
        OciDistributionError::RegistryError { envelope, .. } => envelope.errors.iter().any(|e| {
            matches!(
                e.code,
                OciErrorCode::ManifestUnknown | OciErrorCode::BlobUnknown | OciErrorCode::NameUnknown
            )
        }),
        OciDistributionError::ImageManifestNotFoundError(_) => true,
        // Blob pulls surface the bare status.
        OciDistributionError::RequestError(e) => e.status().map(|s| s.as_u16()) == Some(404),
        _ => false,
    }
}

fn parse_reference(registry: &str, reference: &str) -> Result<Reference> {
    reference
        .parse::<Reference>()
        .map_err(|e| EnrichError::ConnectFailed {
            registry: registry.to_string(),
            message: format!("Invalid OCI reference '{}': {}", reference, e),
        })
}
