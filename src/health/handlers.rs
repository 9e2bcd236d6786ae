//! Health endpoint payloads.

use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::config::GatewayConfig;
use crate::http::server::AppState;
use crate::lifecycle::ShutdownState;
use crate::observability::metrics::{MetricsSnapshot, ProcessSample};

const MIB: f64 = 1024.0 * 1024.0;

/// Bytes to MiB, rounded to two decimals.
pub fn to_mib(bytes: u64) -> f64 {
    (bytes as f64 / MIB * 100.0).round() / 100.0
}

/// `GET /api/health` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub success: bool,
    pub message: &'static str,
    pub timestamp: String,
    pub uptime: f64,
    pub state: ShutdownState,
    pub config: ConfigSummary,
    pub memory: MemorySummary,
    pub requests: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub port: u16,
    pub json_limit: String,
    pub url_limit: String,
    pub request_timeout: u64,
    pub environment: String,
}

/// Memory usage in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    pub rss: f64,
    pub heap_used: f64,
    pub heap_total: f64,
    pub external: f64,
}

impl MemorySummary {
    fn from_sample(sample: &ProcessSample) -> Self {
        Self {
            rss: to_mib(sample.resident_bytes),
            heap_used: to_mib(sample.resident_bytes),
            heap_total: to_mib(sample.virtual_bytes),
            external: 0.0,
        }
    }
}

impl HealthReport {
    pub fn new(
        config: &GatewayConfig,
        snapshot: &MetricsSnapshot,
        sample: &ProcessSample,
        state: ShutdownState,
    ) -> Self {
        Self {
            success: true,
            message: "JSON gateway is healthy",
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            uptime: snapshot.uptime,
            state,
            config: ConfigSummary {
                port: config.listener.port,
                json_limit: config.limits.json.to_string(),
                url_limit: config.limits.url.to_string(),
                request_timeout: config.timeouts.request_ms,
                environment: config.environment.clone(),
            },
            memory: MemorySummary::from_sample(sample),
            requests: snapshot.requests,
        }
    }
}

/// `GET /api/health/performance` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub success: bool,
    pub memory: RawMemory,
    pub cpu: CpuUsage,
    pub platform: Platform,
    pub process: ProcessInfo,
    pub requests: u64,
    pub late_responses_dropped: u64,
    pub large_payloads: u64,
    pub slow_requests: u64,
    pub uptime: f64,
}

/// Memory usage in bytes.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMemory {
    pub rss: u64,
    pub heap_total: u64,
    pub heap_used: u64,
    pub external: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsage {
    pub usage_percent: f32,
    pub run_time_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
    pub cpu_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub version: &'static str,
}

impl PerformanceReport {
    pub fn new(snapshot: &MetricsSnapshot, sample: &ProcessSample) -> Self {
        Self {
            success: true,
            memory: RawMemory {
                rss: sample.resident_bytes,
                heap_total: sample.virtual_bytes,
                heap_used: sample.resident_bytes,
                external: 0,
            },
            cpu: CpuUsage {
                usage_percent: sample.cpu_percent,
                run_time_secs: sample.run_time_secs,
            },
            platform: Platform {
                os: std::env::consts::OS,
                arch: std::env::consts::ARCH,
                cpu_count: std::thread::available_parallelism().map_or(1, |n| n.get()),
            },
            process: ProcessInfo {
                pid: sample.pid,
                parent_pid: sample.parent_pid,
                version: env!("CARGO_PKG_VERSION"),
            },
            requests: snapshot.requests,
            late_responses_dropped: snapshot.late_responses_dropped,
            large_payloads: snapshot.large_payloads,
            slow_requests: snapshot.slow_requests,
            uptime: snapshot.uptime,
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let sample = state.metrics.process_sample();
    Json(HealthReport::new(
        &state.config,
        &state.metrics.snapshot(),
        &sample,
        state.shutdown.state(),
    ))
}

pub async fn performance(State(state): State<AppState>) -> Json<PerformanceReport> {
    let sample = state.metrics.process_sample();
    Json(PerformanceReport::new(&state.metrics.snapshot(), &sample))
}
