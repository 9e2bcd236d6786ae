//! End-to-end behaviour over real sockets.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use json_gateway::lifecycle::ShutdownState;
use json_gateway::GatewayServer;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

use common::{
    client, spawn_gateway, spawn_gateway_with, test_config, wait_until_refused, NeverDownstream,
    SlowDownstream, TimestampProbe,
};

#[tokio::test]
async fn health_reports_config_and_uptime() {
    let gateway = spawn_gateway(test_config()).await;

    let res = client().get(gateway.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["message"].is_string());
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    assert_eq!(body["config"]["jsonLimit"], "50mb");
    assert!(body["memory"]["rss"].is_number());

    let perf: Value = client()
        .get(gateway.url("/api/health/performance"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(perf["success"], true);
    assert!(perf["process"]["pid"].as_u64().unwrap() > 0);
    assert_eq!(gateway.metrics.requests(), 2);
}

#[tokio::test]
async fn sixty_mib_body_is_rejected_with_limit() {
    let server = GatewayServer::builder(test_config()).build();
    let body = vec![b' '; 60 * 1024 * 1024];

    let response = server
        .router()
        .oneshot(
            Request::post("/api/memory/save")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["limit"], "50mb");
    assert_eq!(server.metrics().requests(), 1);
}

#[tokio::test]
async fn never_resolving_handler_times_out_once() {
    let mut config = test_config();
    config.timeouts.request_ms = 100;
    let gateway = spawn_gateway_with(config, NeverDownstream::default()).await;

    let started = Instant::now();
    let res = client()
        .post(gateway.url("/api/memory/save"))
        .json(&json!({ "key": "value" }))
        .send()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(res.status(), 408);
    assert!(elapsed >= Duration::from_millis(100), "responded after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "responded after {elapsed:?}");

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["timeout"], 100);
    assert_eq!(body["path"], "/api/memory/save");
    assert_eq!(gateway.metrics.requests(), 1);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let gateway = spawn_gateway(test_config()).await;

    let res = client()
        .get(gateway.url("/api/unknown/route"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "success": false,
            "code": "not-found",
            "message": "API endpoint not found",
            "path": "/api/unknown/route",
            "method": "GET",
        })
    );
}

#[tokio::test]
async fn timestamps_are_revived_before_the_handler() {
    let gateway = spawn_gateway_with(test_config(), TimestampProbe).await;

    let body: Value = client()
        .post(gateway.url("/api/projects/register"))
        .json(&json!({ "name": "demo", "createdAt": "2024-01-01T00:00:00Z" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["isTimestamp"], true);
    assert_eq!(body["year"], "2024");
}

#[tokio::test]
async fn sigterm_drains_in_flight_and_refuses_new_connections() {
    let downstream = SlowDownstream::new(Duration::from_millis(500));
    let entered = downstream.entered();
    let gateway = spawn_gateway_with(test_config(), downstream).await;

    let slow = tokio::spawn({
        let url = gateway.url("/api/memory/slow");
        async move { client().get(url).send().await }
    });

    entered.wait().await;
    assert!(gateway.shutdown.trigger("SIGTERM"));
    wait_until_refused(gateway.addr).await;

    let res = slow.await.unwrap().unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["connection"], "close");

    gateway.handle.await.unwrap().unwrap();
    assert_eq!(gateway.shutdown.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn grace_expiry_is_an_error() {
    let mut config = test_config();
    config.timeouts.shutdown_grace_ms = 100;
    let downstream = NeverDownstream::default();
    let entered = downstream.entered();
    let gateway = spawn_gateway_with(config, downstream).await;

    let _stuck = tokio::spawn({
        let url = gateway.url("/api/memory/stuck");
        async move { client().get(url).send().await }
    });
    entered.wait().await;

    gateway.shutdown.trigger("SIGTERM");
    let result = gateway.handle.await.unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn preflight_and_compression_over_the_wire() {
    let gateway = spawn_gateway(test_config()).await;

    let preflight = client()
        .request(reqwest::Method::OPTIONS, gateway.url("/api/memory/save"))
        .header("origin", "https://app.example")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 204);
    assert_eq!(preflight.headers()["access-control-allow-origin"], "https://app.example");
    assert_eq!(preflight.headers()["access-control-max-age"], "86400");

    let items: Vec<Value> = (0..200).map(|i| json!({ "id": i, "label": "entry" })).collect();
    let compressed = client()
        .post(gateway.url("/api/memory/batch"))
        .header("accept-encoding", "gzip")
        .json(&json!({ "items": items }))
        .send()
        .await
        .unwrap();
    assert_eq!(compressed.status(), 200);
    assert_eq!(compressed.headers()["content-encoding"], "gzip");

    let bypassed = client()
        .post(gateway.url("/api/memory/batch"))
        .header("accept-encoding", "gzip")
        .header("x-no-compression", "1")
        .json(&json!({ "items": (0..200).collect::<Vec<_>>() }))
        .send()
        .await
        .unwrap();
    assert!(bypassed.headers().get("content-encoding").is_none());
}

#[tokio::test]
async fn malformed_json_is_400() {
    let gateway = spawn_gateway(test_config()).await;

    let res = client()
        .post(gateway.url("/api/memory/save"))
        .header("content-type", "application/json")
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
}
