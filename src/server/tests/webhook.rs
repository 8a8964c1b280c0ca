//! Webhook endpoint tests.
//!
//! Drives the router in-memory with `tower::ServiceExt::oneshot` against an
//! in-memory registry and a scripted describer.

use std::sync::Arc;

use a3s_enrich_core::manifest::{Descriptor, Manifest, MARKER_ANNOTATION};
use a3s_enrich_runtime::testing::{MemoryRegistry, ScriptedDescriber};
use a3s_enrich_runtime::Pipeline;
use a3s_enrich_server::{create_app, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt; // for `oneshot`.

fn app(registry: &MemoryRegistry, describer: &ScriptedDescriber) -> Router {
    let pipeline = Pipeline::new(Arc::new(registry.clone()), Arc::new(describer.clone()));
    create_app(AppState::new(pipeline))
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            "application/vnd.docker.distribution.events.v1+json",
        )
        .body(body.into())
        .unwrap()
}

fn notification(repository: &str, digest: &str) -> String {
    serde_json::json!({
        "events": [{
            "id": "320678d8-ca14-430f-8bb6-4ca139cd83f7",
            "timestamp": "2024-03-09T14:44:26.402973972Z",
            "action": "push",
            "target": {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "size": 708,
                "digest": digest,
                "repository": repository,
                "url": format!("http://registry:5000/v2/{}/manifests/{}", repository, digest),
                "tag": "v1"
            }
        }]
    })
    .to_string()
}

fn seed(registry: &MemoryRegistry, layers: &[&[u8]], marker: bool) {
    let layers: Vec<Descriptor> = layers
        .iter()
        .map(|bytes| registry.put_blob("app", "image/jpeg", bytes))
        .collect();
    let mut manifest = Manifest {
        schema_version: 2,
        media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
        layers,
        ..Default::default()
    };
    if marker {
        manifest
            .annotations
            .insert(MARKER_ANNOTATION.to_string(), "true".to_string());
    }
    registry.put_manifest_at("app", "sha256:abc", &manifest.to_bytes().unwrap());
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body collect")
        .to_bytes()
        .to_vec()
}

#[tokio::test]
async fn healthz_returns_empty_200() {
    let registry = MemoryRegistry::new();
    registry.mark_unreachable("app");
    let describer = ScriptedDescriber::new();

    let response = app(&registry, &describer)
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("failed to get response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(registry.resolve_count(), 0);
}

#[tokio::test]
async fn malformed_json_returns_400() {
    let registry = MemoryRegistry::new();
    let describer = ScriptedDescriber::new();

    for body in ["{\"events\": [", "not json", "{\"events\": 7}"] {
        let response = app(&registry, &describer)
            .oneshot(post("/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {:?}", body);
    }
    assert_eq!(registry.resolve_count(), 0);
}

#[tokio::test]
async fn empty_batch_returns_200_without_calls() {
    let registry = MemoryRegistry::new();
    let describer = ScriptedDescriber::new();

    let response = app(&registry, &describer)
        .oneshot(post("/notifications", r#"{"events":[]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(registry.resolve_count(), 0);
    assert_eq!(registry.push_count(), 0);
    assert_eq!(describer.calls(), 0);
}

#[tokio::test]
async fn oversized_body_returns_500() {
    let registry = MemoryRegistry::new();
    let describer = ScriptedDescriber::new();
    let pipeline = Pipeline::new(Arc::new(registry.clone()), Arc::new(describer.clone()));
    let app = create_app(AppState::new(pipeline).with_body_limit(16));

    let response = app
        .oneshot(post("/", notification("app", "sha256:abc")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(registry.resolve_count(), 0);
}

#[tokio::test]
async fn push_notification_enriches_and_retags() {
    let registry = MemoryRegistry::new();
    seed(&registry, &[b"red car jpeg", b"slow jpeg"], true);
    let describer = ScriptedDescriber::new()
        .with_text(b"red car jpeg", "a red car")
        .with_timeout(b"slow jpeg");

    let response = app(&registry, &describer)
        .oneshot(post("/", notification("app", "sha256:abc")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let digest = registry.tag("app", "latest").expect("latest retagged");
    let rewritten = Manifest::from_slice(&registry.manifest("app", &digest).unwrap()).unwrap();
    assert_eq!(rewritten.layers.len(), 2);
    assert_eq!(rewritten.layers[0].description(), Some("a red car"));
    assert_eq!(rewritten.layers[1].description(), None);
    assert!(!rewritten.annotations.contains_key(MARKER_ANNOTATION));

    // source manifest is left in place
    let original = Manifest::from_slice(&registry.manifest("app", "sha256:abc").unwrap()).unwrap();
    assert!(original.requests_description());
}

#[tokio::test]
async fn unmarked_manifest_returns_200_untouched() {
    let registry = MemoryRegistry::new();
    seed(&registry, &[b"jpeg"], false);
    let describer = ScriptedDescriber::new().with_text(b"jpeg", "text");

    let response = app(&registry, &describer)
        .oneshot(post("/notifications", notification("app", "sha256:abc")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(describer.calls(), 0);
    assert_eq!(registry.push_count(), 0);
    assert_eq!(registry.tag_count(), 0);
}

#[tokio::test]
async fn internal_failures_still_return_200() {
    let registry = MemoryRegistry::new();
    registry.mark_unreachable("down");
    seed(&registry, &[b"jpeg"], true);
    registry.fail_pushes("app");
    let describer = ScriptedDescriber::new().with_text(b"jpeg", "text");

    let body = serde_json::json!({
        "events": [
            {"id": "1", "action": "push", "target": {"repository": "down", "digest": "sha256:abc"}},
            {"id": "2", "action": "push", "target": {"repository": "app", "digest": "sha256:abc"}}
        ]
    })
    .to_string();

    let response = app(&registry, &describer)
        .oneshot(post("/", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // the unreachable repository did not stop the second event
    assert_eq!(describer.calls(), 1);
    assert_eq!(registry.push_count(), 1);
    assert_eq!(registry.tag("app", "latest"), None);
}

#[tokio::test]
async fn get_on_notifications_is_rejected() {
    let registry = MemoryRegistry::new();
    let describer = ScriptedDescriber::new();

    let response = app(&registry, &describer)
        .oneshot(
            Request::builder()
                .uri("/notifications")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
