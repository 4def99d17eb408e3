//! wiremock-based collector for pipeline tests.
//!
//! Provides canned collector responses plus helpers that pull log bodies back
//! out of the OTLP/JSON requests the pipeline sent.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_courier::{Config, LogRecord, Severity, SyncStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const LOGS_PATH: &str = "/v1/logs";
pub const TRACES_PATH: &str = "/v1/traces";
pub const METRICS_PATH: &str = "/v1/metrics";

/// Config pointed at the mock collector with test-friendly timings.
///
/// The periodic timer is long enough that only explicit flushes, size
/// triggers and priority triggers fire during a test.
pub fn collector_config(server: &MockServer) -> Config {
    Config {
        batch_interval_ms: 60_000,
        retry_base_delay_ms: 10,
        max_backoff_ms: 50,
        timeout_ms: 2_000,
        shutdown_timeout_ms: 2_000,
        ..Config::new(server.uri())
    }
}

/// Answer every POST to `route` with `status`
pub async fn mock_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Accept every POST to `route`
pub async fn mock_accept(server: &MockServer, route: &str) {
    mock_status(server, route, 200).await;
}

/// Answer every POST to `route` with `status`, expecting exactly `calls` requests
pub async fn mock_status_expect(server: &MockServer, route: &str, status: u16, calls: u64) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .expect(calls)
        .mount(server)
        .await;
}

/// Answer the next `times` POSTs to `route` with `response`, ahead of other mocks
pub async fn mock_first_n(
    server: &MockServer,
    route: &str,
    response: ResponseTemplate,
    times: u64,
) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(response)
        .up_to_n_times(times)
        .with_priority(1)
        .mount(server)
        .await;
}

pub fn info_log(body: &str) -> LogRecord {
    LogRecord::new(Severity::Info, body)
}

pub fn error_log(body: &str) -> LogRecord {
    LogRecord::new(Severity::Error, body)
}

/// Requests received on `route`, in arrival order
pub async fn requests_to(server: &MockServer, route: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == route)
        .collect()
}

/// Log bodies carried by one request
pub fn log_bodies(request: &Request) -> Vec<String> {
    let json: Value = serde_json::from_slice(&request.body).expect("request body is JSON");
    json["resourceLogs"][0]["scopeLogs"][0]["logRecords"]
        .as_array()
        .expect("logRecords array")
        .iter()
        .map(|record| {
            record["body"]["stringValue"]
                .as_str()
                .expect("string body")
                .to_string()
        })
        .collect()
}

/// Log bodies of every request to the logs endpoint, one list per request
pub async fn received_log_batches(server: &MockServer) -> Vec<Vec<String>> {
    requests_to(server, LOGS_PATH)
        .await
        .iter()
        .map(log_bodies)
        .collect()
}

/// Poll until `count` requests have arrived or `within` elapses
pub async fn wait_for_requests(server: &MockServer, count: usize, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let received = server.received_requests().await.unwrap_or_default().len();
        if received >= count {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Collects status transitions from an `on_status` observer
#[derive(Clone, Default)]
pub struct StatusRecorder {
    seen: Arc<Mutex<Vec<SyncStatus>>>,
}

impl StatusRecorder {
    pub fn observer(&self) -> impl Fn(SyncStatus) + Send + Sync + 'static {
        let seen = self.seen.clone();
        move |status| seen.lock().unwrap().push(status)
    }

    pub fn seen(&self) -> Vec<SyncStatus> {
        self.seen.lock().unwrap().clone()
    }
}
