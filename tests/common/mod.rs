//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use json_gateway::config::GatewayConfig;
use json_gateway::error::GatewayError;
use json_gateway::http::{Downstream, DownstreamRequest, Envelope, LoopbackHandler, Payload};
use json_gateway::lifecycle::{Shutdown, ShutdownError};
use json_gateway::net::Listener;
use json_gateway::{GatewayServer, MetricsRegistry};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A gateway serving on an ephemeral loopback port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub metrics: MetricsRegistry,
    pub handle: JoinHandle<Result<(), ShutdownError>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.host = "127.0.0.1".to_string();
    config.listener.port = 0;
    config.timeouts.shutdown_grace_ms = 5_000;
    config
}

pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    spawn_gateway_with(config, LoopbackHandler).await
}

pub async fn spawn_gateway_with(config: GatewayConfig, downstream: impl Downstream) -> TestGateway {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let metrics = MetricsRegistry::new();

    let server = GatewayServer::builder(config)
        .metrics(metrics.clone())
        .shutdown(shutdown.clone())
        .downstream(downstream)
        .build();
    let handle = tokio::spawn(server.serve(listener));

    TestGateway {
        addr,
        shutdown,
        metrics,
        handle,
    }
}

/// A client that never reuses connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Signalled each time a downstream handler starts.
#[derive(Debug, Clone, Default)]
pub struct Entered(Arc<Notify>);

impl Entered {
    /// Wait until a handler has started, failing the test after five seconds.
    pub async fn wait(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.0.notified())
            .await
            .expect("downstream handler was never entered");
    }

    fn signal(&self) {
        self.0.notify_one();
    }
}

/// Responds after a fixed delay.
pub struct SlowDownstream {
    delay: Duration,
    entered: Entered,
}

impl SlowDownstream {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            entered: Entered::default(),
        }
    }

    pub fn entered(&self) -> Entered {
        self.entered.clone()
    }
}

#[async_trait]
impl Downstream for SlowDownstream {
    async fn handle(&self, _request: DownstreamRequest) -> Result<Response, GatewayError> {
        self.entered.signal();
        tokio::time::sleep(self.delay).await;
        Ok(Envelope::ok("slow work finished").into_response())
    }
}

/// Never responds.
#[derive(Default)]
pub struct NeverDownstream {
    entered: Entered,
}

impl NeverDownstream {
    pub fn entered(&self) -> Entered {
        self.entered.clone()
    }
}

#[async_trait]
impl Downstream for NeverDownstream {
    async fn handle(&self, _request: DownstreamRequest) -> Result<Response, GatewayError> {
        self.entered.signal();
        std::future::pending().await
    }
}

/// Wait until connecting to `addr` is refused, failing the test after five
/// seconds.
pub async fn wait_until_refused(addr: SocketAddr) {
    let refused = async {
        while tokio::net::TcpStream::connect(addr).await.is_ok() {
            tokio::task::yield_now().await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), refused)
        .await
        .expect("listener still accepting connections");
}

/// Reports whether `createdAt` arrived as a native timestamp.
pub struct TimestampProbe;

#[async_trait]
impl Downstream for TimestampProbe {
    async fn handle(&self, request: DownstreamRequest) -> Result<Response, GatewayError> {
        let created_at = request
            .body
            .as_ref()
            .and_then(|body| body.payload.get("createdAt"))
            .and_then(Payload::as_timestamp);

        Ok(Envelope::ok("probed")
            .field("isTimestamp", created_at.is_some())
            .field("year", created_at.map(|ts| ts.format("%Y").to_string()))
            .into_response())
    }
}
