// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Read endpoint tests: health, token, history, dashboard

use super::common::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use indexy_checker::{check::CachedStatus, storage::Storage};
use tower::util::ServiceExt;

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let response = app.router.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], indexy_checker::version::VERSION_NUMBER);
    assert_eq!(body["primaryApi"], false);
}

#[tokio::test]
async fn test_token_matches_guard() {
    let app = TestApp::new();
    let response = app.router.clone().oneshot(get("/token", None)).await.unwrap();
    assert_eq!(body_json(response).await["token"], app.guard.current_token());
}

#[tokio::test]
async fn test_history_lists_recent_scans() {
    let app = TestApp::new();
    app.storage
        .cache_put("https://site.test/a", CachedStatus::Indexed)
        .await
        .unwrap();

    let response = app.router.clone().oneshot(get("/history", None)).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["url"], "https://site.test/a");
}

#[tokio::test]
async fn test_history_empty_on_storage_failure() {
    let app = TestApp::new();
    app.storage.set_fail_reads(true);

    let response = app.router.clone().oneshot(get("/history", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_dashboard_requires_session() {
    let app = TestApp::new();

    for uri in ["/dashboard/stats", "/dashboard/batches", "/dashboard/batches/1"] {
        let response = app.router.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "uri: {}", uri);
    }

    let forged = "indexy_session=not-a-jwt";
    let response = app
        .router
        .clone()
        .oneshot(get("/dashboard/stats", Some(forged)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stats_and_batches() {
    let app = TestApp::new();
    let batch = app.storage.batch_create(3, 2).await.unwrap();
    app.storage
        .batch_append_result(batch.id, "https://site.test/a", CachedStatus::Indexed)
        .await
        .unwrap();
    app.storage
        .batch_append_result(batch.id, "https://site.test/b", CachedStatus::NotIndexed)
        .await
        .unwrap();
    let cookie = app.cookie_for(3);

    let response = app
        .router
        .clone()
        .oneshot(get("/dashboard/stats", Some(&cookie)))
        .await
        .unwrap();
    let stats = body_json(response).await;
    assert_eq!(stats["totalChecked"], 2);
    assert_eq!(stats["totalIndexed"], 1);
    assert_eq!(stats["avgIndexRate"], 50);
    assert_eq!(stats["lastBatchSize"], 2);

    let response = app
        .router
        .clone()
        .oneshot(get("/dashboard/batches", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["batches"].as_array().unwrap().len(), 1);

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/dashboard/batches/{}", batch.id), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["batch"]["id"], batch.id);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_batch_id_must_be_numeric() {
    let app = TestApp::new();
    let cookie = app.cookie_for(4);

    let response = app
        .router
        .clone()
        .oneshot(get("/dashboard/batches/abc", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid Batch ID");
}

#[tokio::test]
async fn test_foreign_batch_not_found() {
    let app = TestApp::new();
    let batch = app.storage.batch_create(5, 1).await.unwrap();
    let cookie = app.cookie_for(6);

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/dashboard/batches/{}", batch.id), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(get("/dashboard/batches/9999", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
