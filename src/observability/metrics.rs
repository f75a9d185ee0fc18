use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the wallet engine.
///
/// Recording is a no-op until [`init_metrics`] installs a recorder.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_transaction_created(&self, transaction_type: &str, currency: &str) {
        counter!("wallet_transactions_created_total", "type" => transaction_type.to_string(), "currency" => currency.to_string()).increment(1);
    }

    pub fn record_transaction_completed(&self, transaction_type: &str, currency: &str) {
        counter!("wallet_transactions_completed_total", "type" => transaction_type.to_string(), "currency" => currency.to_string()).increment(1);
    }

    pub fn record_transaction_cancelled(&self, transaction_type: &str) {
        counter!("wallet_transactions_cancelled_total", "type" => transaction_type.to_string()).increment(1);
    }

    pub fn record_transaction_rejected(&self, operation: &str, reason: &str) {
        counter!("wallet_transactions_rejected_total", "operation" => operation.to_string(), "reason" => reason.to_string()).increment(1);
    }

    pub fn record_gateway_verification(&self, gateway: &str, duration_ms: f64, success: bool) {
        counter!("wallet_gateway_verifications_total", "gateway" => gateway.to_string(), "success" => success.to_string()).increment(1);
        histogram!("wallet_gateway_verification_duration_ms", "gateway" => gateway.to_string()).record(duration_ms);
    }

    pub fn record_notification(&self, kind: &str, success: bool) {
        counter!("wallet_notifications_total", "kind" => kind.to_string(), "success" => success.to_string()).increment(1);
    }

    pub fn record_commit_latency(&self, duration_ms: f64) {
        histogram!("wallet_commit_duration_ms").record(duration_ms);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    METRICS.get_or_init(Metrics::new);

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

fn describe_metrics() {
    describe_counter!("wallet_transactions_created_total", Unit::Count, "Transactions created in processing state");
    describe_counter!("wallet_transactions_completed_total", Unit::Count, "Transactions committed as completed");
    describe_counter!("wallet_transactions_cancelled_total", Unit::Count, "Transactions committed as cancelled");
    describe_counter!("wallet_transactions_rejected_total", Unit::Count, "Operations rejected, by error code");

    describe_counter!("wallet_gateway_verifications_total", Unit::Count, "Gateway verification calls");
    describe_histogram!("wallet_gateway_verification_duration_ms", Unit::Milliseconds, "Gateway verification latency in milliseconds");

    describe_counter!("wallet_notifications_total", Unit::Count, "Notification send attempts");
    describe_histogram!("wallet_commit_duration_ms", Unit::Milliseconds, "Completion commit latency in milliseconds");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
