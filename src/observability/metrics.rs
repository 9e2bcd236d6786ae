//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Own the process-wide request counter read by the health endpoints
//! - Mirror request outcomes into the `metrics` facade
//! - Sample process memory and CPU usage
//! - Expose a Prometheus-compatible scrape endpoint when configured
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): handling latency
//! - `gateway_late_responses_total` (counter): handler responses dropped after a timeout
//!
//! # Design Decisions
//! - The registry is injected into the pipeline, never read from a global
//! - Counters are atomics; updates never take a lock

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::http::{Method, StatusCode};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("gateway_requests_total", "Requests handled, by method and status");
    describe_histogram!(
        "gateway_request_duration_seconds",
        "Time from pipeline entry to response"
    );
    describe_counter!(
        "gateway_late_responses_total",
        "Handler responses dropped because the request had already timed out"
    );

    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Process-wide counters and gauges.
///
/// Cloning is cheap; all clones share the same counters.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    started: Instant,
    requests: AtomicU64,
    late_responses: AtomicU64,
    large_payloads: AtomicU64,
    slow_requests: AtomicU64,
    sampler: Mutex<ProcessSampler>,
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub uptime: f64,
    pub late_responses_dropped: u64,
    pub large_payloads: u64,
    pub slow_requests: u64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                started: Instant::now(),
                requests: AtomicU64::new(0),
                late_responses: AtomicU64::new(0),
                large_payloads: AtomicU64::new(0),
                slow_requests: AtomicU64::new(0),
                sampler: Mutex::new(ProcessSampler::new()),
            }),
        }
    }

    /// Count one finished request. Returns the new total.
    pub fn record_request(&self, method: &Method, status: StatusCode, elapsed: Duration) -> u64 {
        let total = self.inner.requests.fetch_add(1, Ordering::Relaxed) + 1;

        counter!(
            "gateway_requests_total",
            "method" => method.to_string(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);
        histogram!("gateway_request_duration_seconds").record(elapsed.as_secs_f64());

        total
    }

    pub fn record_late_response(&self) {
        self.inner.late_responses.fetch_add(1, Ordering::Relaxed);
        counter!("gateway_late_responses_total").increment(1);
    }

    pub fn record_large_payload(&self) {
        self.inner.large_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slow_request(&self) {
        self.inner.slow_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }

    pub fn late_responses_dropped(&self) -> u64 {
        self.inner.late_responses.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests(),
            uptime: self.uptime().as_secs_f64(),
            late_responses_dropped: self.late_responses_dropped(),
            large_payloads: self.inner.large_payloads.load(Ordering::Relaxed),
            slow_requests: self.inner.slow_requests.load(Ordering::Relaxed),
        }
    }

    /// Sample memory and CPU figures for this process.
    pub fn process_sample(&self) -> ProcessSample {
        self.inner
            .sampler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory and CPU usage of the current process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProcessSample {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
    pub cpu_percent: f32,
    pub run_time_secs: u64,
}

#[derive(Debug)]
struct ProcessSampler {
    system: System,
    pid: Option<Pid>,
}

impl ProcessSampler {
    fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(error) => {
                tracing::warn!(error, "Process sampling unavailable");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    fn sample(&mut self) -> ProcessSample {
        let mut sample = ProcessSample {
            pid: std::process::id(),
            ..ProcessSample::default()
        };
        let Some(pid) = self.pid else {
            return sample;
        };

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_memory().with_cpu(),
        );

        if let Some(process) = self.system.process(pid) {
            sample.parent_pid = process.parent().map(|parent| parent.as_u32());
            sample.resident_bytes = process.memory();
            sample.virtual_bytes = process.virtual_memory();
            sample.cpu_percent = process.cpu_usage();
            sample.run_time_secs = process.run_time();
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments_once_per_request() {
        let registry = MetricsRegistry::new();
        let clone = registry.clone();

        assert_eq!(registry.record_request(&Method::GET, StatusCode::OK, Duration::ZERO), 1);
        assert_eq!(
            clone.record_request(&Method::POST, StatusCode::PAYLOAD_TOO_LARGE, Duration::ZERO),
            2
        );
        assert_eq!(registry.requests(), 2);
        assert_eq!(clone.snapshot().requests, 2);
    }

    #[test]
    fn counter_is_consistent_across_threads() {
        let registry = MetricsRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        registry.record_request(&Method::GET, StatusCode::OK, Duration::ZERO);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.requests(), 8000);
    }

    #[test]
    fn late_responses_are_counted() {
        let registry = MetricsRegistry::new();
        registry.record_late_response();
        assert_eq!(registry.snapshot().late_responses_dropped, 1);
    }

    #[test]
    fn samples_this_process() {
        let sample = MetricsRegistry::new().process_sample();
        assert_eq!(sample.pid, std::process::id());
    }
}
