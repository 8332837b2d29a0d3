// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

use common::Harness;
use site_provisioning_core::application::SiteQueryService;
use site_provisioning_core::domain::messaging::{labels, Subscription, Topic};
use site_provisioning_core::presentation::api::{app, AppState};

fn router(harness: &Harness) -> Router {
    app(AppState {
        tenant: harness.tenant.clone(),
        publisher: Arc::new(harness.bus.clone()),
        site_queries: Arc::new(SiteQueryService::new(
            harness.tenant.clone(),
            harness.platform.clone(),
        )),
        template_cache: harness.cache.clone(),
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new();
    let response = router(&harness)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_new_site_request_is_queued() {
    let harness = Harness::new();
    let mut queue = harness.bus.subscribe(Subscription::new(
        "test-new-site",
        Topic::SiteOperations,
        labels::NEW_SITE,
    ));

    let body = json!({
        "ListItemID": 7,
        "FolderPath": "Jobs/",
        "FileNameWithExtension": "job7.json"
    });
    let response = router(&harness)
        .oneshot(post_json("/api/site-operations/new", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let message = queue.try_recv().unwrap();
    assert_eq!(message.body["ListItemID"], 7);
    assert_eq!(message.body["FileNameWithExtension"], "job7.json");
}

#[tokio::test]
async fn test_update_request_requires_json() {
    let harness = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/api/site-operations")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();

    let response = router(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_update_request_rejects_unknown_type() {
    let harness = Harness::new();
    let body = json!({ "Type": "DeleteSite", "Sites": [] });

    let response = router(&harness)
        .oneshot(post_json("/api/site-operations", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_request_fans_out_one_message_per_site() {
    let harness = Harness::new();
    let mut queue = harness.bus.subscribe(Subscription::new(
        "test-updates",
        Topic::SiteOperations,
        labels::UPDATE_SITE_METADATA,
    ));
    let body = json!({
        "Type": "UpdateSiteMetadata",
        "Sites": [
            { "Url": "https://contoso.example.com/sites/ABCD", "Title": "First" },
            { "Url": "https://contoso.example.com/sites/EFGH", "Title": "Second" }
        ]
    });

    let response = router(&harness)
        .oneshot(post_json("/api/site-operations", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let queued: Value = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(queued["queued"], 2);
    assert_eq!(queue.try_recv().unwrap().body["Title"], "First");
    assert_eq!(queue.try_recv().unwrap().body["Title"], "Second");
    assert!(queue.try_recv().is_err());
}

#[tokio::test]
async fn test_site_exists_requires_relative_url() {
    let harness = Harness::new();
    for uri in ["/api/sites/exists", "/api/sites/exists?relativeUrl="] {
        let response = router(&harness)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn test_site_exists_reports_title() {
    let harness = Harness::new();
    harness.platform.titles.lock().insert(
        "https://contoso.example.com/sites/ABCD".to_string(),
        "Project ABCD".to_string(),
    );

    let response = router(&harness)
        .oneshot(
            Request::builder()
                .uri("/api/sites/exists?relativeUrl=/sites/ABCD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: Value = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(result["Exists"], true);
    assert_eq!(result["Title"], "Project ABCD");
    assert_eq!(result["Type"], "ABCD");
    assert_eq!(result["AbsoluteUri"], "https://contoso.example.com/sites/ABCD");
}

#[tokio::test]
async fn test_site_exists_for_unknown_site() {
    let harness = Harness::new();

    let response = router(&harness)
        .oneshot(
            Request::builder()
                .uri("/api/sites/exists?relativeUrl=/sites/NOPE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: Value = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(result["Exists"], false);
    assert_eq!(result["Title"], Value::Null);
}

#[tokio::test]
async fn test_validate_template_refreshes_then_reports_fresh() {
    let harness = Harness::new();
    harness
        .platform
        .templates
        .lock()
        .insert("t1.xml".to_string(), b"<template/>".to_vec());
    let body = json!({ "TemplateUrl": "t1.xml" });

    let first = router(&harness)
        .oneshot(post_json("/api/templates/validate", body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert!(read_body(first).await.contains("updated because 'update' parameter"));

    let second = router(&harness)
        .oneshot(post_json("/api/templates/validate", body.clone()))
        .await
        .unwrap();
    assert!(read_body(second).await.contains("not updated"));

    let forced = router(&harness)
        .oneshot(post_json("/api/templates/validate?update", body))
        .await
        .unwrap();
    assert!(read_body(forced).await.contains("updated because 'update' parameter"));
    assert_eq!(harness.platform.template_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_validate_template_fetch_failure_is_bad_gateway() {
    let harness = Harness::new();
    let body = json!({ "TemplateUrl": "missing.xml" });

    let response = router(&harness)
        .oneshot(post_json("/api/templates/validate", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
