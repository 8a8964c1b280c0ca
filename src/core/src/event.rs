//! Registry notification envelope.
//!
//! Mirrors the JSON the distribution registry posts to its notification
//! endpoints. Fields this service does not use (`request`, `actor`,
//! `source`) are ignored on decode.

use serde::{Deserialize, Serialize};

use crate::error::{EnrichError, Result};
use crate::manifest::null_as_default;

/// One webhook delivery
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationBatch {
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,
}

impl NotificationBatch {
    /// Decode a request body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| EnrichError::PayloadDecodeFailed(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Registry event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub timestamp: String,

    /// `push`, `pull`, `delete`, ...
    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub target: Target,
}

/// Object the event refers to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default)]
    pub media_type: String,

    #[serde(default)]
    pub size: i64,

    #[serde(default)]
    pub digest: String,

    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub tag: String,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repository, self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_registry_payload() {
        let body = r#"{
            "events": [{
                "id": "320678d8-ca14-430f-8bb6-4ca139cd83f7",
                "timestamp": "2016-03-09T14:44:26.402973972-08:00",
                "action": "push",
                "target": {
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "size": 708,
                    "digest": "sha256:fea8895f450959fa676bcc1df0611ea93823a735a01205fd8622846041d0c7cf",
                    "length": 708,
                    "repository": "hello-world",
                    "url": "http://registry:5000/v2/hello-world/manifests/sha256:fea8",
                    "tag": "latest"
                },
                "request": {"id": "6df24a34", "addr": "192.168.64.11:42961", "method": "PUT"},
                "actor": {},
                "source": {"addr": "xtal.local:5000"}
            }]
        }"#;

        let batch = NotificationBatch::from_slice(body.as_bytes()).unwrap();
        assert_eq!(batch.events.len(), 1);

        let event = &batch.events[0];
        assert_eq!(event.action, "push");
        assert_eq!(event.target.repository, "hello-world");
        assert_eq!(event.target.size, 708);
        assert_eq!(event.target.tag, "latest");
        assert_eq!(
            event.target.media_type,
            "application/vnd.oci.image.manifest.v1+json"
        );
    }

    #[test]
    fn test_missing_and_null_events() {
        assert!(NotificationBatch::from_slice(b"{}").unwrap().is_empty());
        assert!(NotificationBatch::from_slice(br#"{"events":null}"#)
            .unwrap()
            .is_empty());
        assert!(NotificationBatch::from_slice(br#"{"events":[]}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_sparse_event_uses_defaults() {
        let batch =
            NotificationBatch::from_slice(br#"{"events":[{"target":{"repository":"app"}}]}"#)
                .unwrap();
        let event = &batch.events[0];
        assert_eq!(event.id, "");
        assert_eq!(event.target.digest, "");
        assert_eq!(event.target.to_string(), "app@");
    }

    #[test]
    fn test_malformed_json_is_payload_error() {
        let err = NotificationBatch::from_slice(b"{\"events\": [").unwrap_err();
        assert!(matches!(err, EnrichError::PayloadDecodeFailed(_)));

        let err = NotificationBatch::from_slice(br#"{"events": "nope"}"#).unwrap_err();
        assert!(matches!(err, EnrichError::PayloadDecodeFailed(_)));
    }
}
