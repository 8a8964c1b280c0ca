//! Image manifest and descriptor model.
//!
//! Only annotations are interpreted. Every other field of the manifest and
//! its descriptors is carried through verbatim, so a rewritten manifest
//! differs from its source only in the annotations this service touches.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::Result;

/// Manifest annotation that opts a manifest into layer descriptions.
pub const MARKER_ANNOTATION: &str = "notification.manifest.description";

/// Layer annotation carrying the generated description.
pub const DESCRIPTION_ANNOTATION: &str = "acme.description.openai";

/// Media type assumed when a manifest does not declare one.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Annotation map. Ordered so serialization is deterministic.
pub type Annotations = BTreeMap<String, String>;

/// Image manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub layers: Vec<Descriptor>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub annotations: Annotations,

    /// `config`, `subject`, `artifactType` and anything else
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    /// Decode manifest bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize for pushing.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Whether the opt-in marker is present with the exact value `"true"`.
    pub fn requests_description(&self) -> bool {
        self.annotations.get(MARKER_ANNOTATION).map(String::as_str) == Some("true")
    }

    /// Remove the opt-in marker.
    pub fn clear_marker(&mut self) {
        self.annotations.remove(MARKER_ANNOTATION);
    }

    /// Media type to push under.
    pub fn media_type_or_default(&self) -> &str {
        if self.media_type.is_empty() {
            OCI_MANIFEST_MEDIA_TYPE
        } else {
            &self.media_type
        }
    }
}

/// Content descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,

    #[serde(default)]
    pub digest: String,

    #[serde(default)]
    pub size: i64,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub annotations: Annotations,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Descriptor {
    /// Descriptor addressing `bytes`.
    pub fn for_content(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            digest: sha256_digest(bytes),
            size: bytes.len() as i64,
            ..Default::default()
        }
    }

    /// Generated description, if any.
    pub fn description(&self) -> Option<&str> {
        self.annotations.get(DESCRIPTION_ANNOTATION).map(String::as_str)
    }

    /// Alternate download locations listed under `urls`, if any.
    pub fn urls(&self) -> Option<Vec<String>> {
        self.extra
            .get("urls")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Set the description annotation, replacing any previous value.
    pub fn set_description(&mut self, text: impl Into<String>) {
        self.annotations
            .insert(DESCRIPTION_ANNOTATION.to_string(), text.into());
    }

    /// Check `bytes` against this descriptor's size and digest.
    ///
    /// Returns a human readable reason on mismatch. Digests in algorithms
    /// other than sha256 are only size-checked.
    pub fn verify(&self, bytes: &[u8]) -> std::result::Result<(), String> {
        if self.size != bytes.len() as i64 {
            return Err(format!(
                "size mismatch: expected {} bytes, got {}",
                self.size,
                bytes.len()
            ));
        }
        if self.digest.starts_with("sha256:") {
            let actual = sha256_digest(bytes);
            if actual != self.digest {
                return Err(format!("digest mismatch: got {}", actual));
            }
        }
        Ok(())
    }
}

/// `sha256:<hex>` digest of `bytes`.
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
