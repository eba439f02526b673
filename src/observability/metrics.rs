//! Metrics for the ETL pipeline
//!
//! Counters and histograms are recorded through the `metrics` facade. Until
//! [`init`] installs the Prometheus recorder every call is a no-op, so library
//! code and tests can record freely.

use std::fmt;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// All metric names used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    SourceRequestsSuccess,
    SourceRequestsError,
    SourceRequestDuration,
    SourceRecordsFetched,
    PipelineRuns,
    PipelineRunsAborted,
    PipelineDuration,
    PipelineRecords,
    StoreWriteDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourceRequestsSuccess => "etl_source_requests_success_total",
            MetricName::SourceRequestsError => "etl_source_requests_error_total",
            MetricName::SourceRequestDuration => "etl_source_request_duration_seconds",
            MetricName::SourceRecordsFetched => "etl_source_records_fetched_total",
            MetricName::PipelineRuns => "etl_pipeline_runs_total",
            MetricName::PipelineRunsAborted => "etl_pipeline_runs_aborted_total",
            MetricName::PipelineDuration => "etl_pipeline_duration_seconds",
            MetricName::PipelineRecords => "etl_records_total",
            MetricName::StoreWriteDuration => "etl_store_write_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bound on the end-of-run push
const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

struct MetricsState {
    handle: metrics_exporter_prometheus::PrometheusHandle,
    pushgateway_url: Option<String>,
}

static METRICS_STATE: OnceLock<MetricsState> = OnceLock::new();

/// Install the Prometheus recorder. Idempotent.
///
/// `ETL_METRICS_ADDR` additionally starts the scrape listener (needs a tokio
/// runtime); `ETL_PUSHGATEWAY_URL` enables [`push_all_metrics`].
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_STATE.get().is_some() {
        return Ok(());
    }

    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let listen_addr = std::env::var("ETL_METRICS_ADDR").ok().and_then(|addr_str| {
        addr_str
            .parse::<SocketAddr>()
            .map_err(|_| warn!("Invalid ETL_METRICS_ADDR '{}', exporter disabled", addr_str))
            .ok()
    });

    let handle = match listen_addr {
        Some(addr) => {
            let (recorder, exporter) = builder
                .with_http_listener(addr)
                .build()
                .map_err(|e| format!("Failed to build Prometheus exporter: {}", e))?;
            let handle = recorder.handle();
            ::metrics::set_global_recorder(recorder)
                .map_err(|_| "A metrics recorder is already installed")?;
            tokio::spawn(exporter);
            info!("Prometheus HTTP exporter listening at http://{}/metrics", addr);
            handle
        }
        None => builder
            .install_recorder()
            .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?,
    };

    let pushgateway_url = std::env::var("ETL_PUSHGATEWAY_URL")
        .ok()
        .filter(|v| !v.trim().is_empty());
    if pushgateway_url.is_some() {
        info!("Metrics system initialized with push gateway support");
    } else {
        info!("Metrics system initialized (no push gateway)");
    }

    let _ = METRICS_STATE.set(MetricsState {
        handle,
        pushgateway_url,
    });
    Ok(())
}

/// Push the current snapshot to the Pushgateway, if one is configured.
/// Failures are logged; short-lived runs should never fail on metrics.
pub async fn push_all_metrics(instance: &str) {
    let Some(state) = METRICS_STATE.get() else {
        return;
    };
    let Some(base) = state.pushgateway_url.as_deref() else {
        return;
    };

    let push_url = format!(
        "{}/metrics/job/drug_event_etl/instance/{}",
        base.trim_end_matches('/'),
        instance
    );
    let body = state.handle.render();
    push_snapshot(&push_url, body, PUSH_TIMEOUT).await;
}

/// POST one exposition snapshot; `true` when the gateway accepted it
async fn push_snapshot(push_url: &str, body: String, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to build Pushgateway client: {}", e);
            return false;
        }
    };
    match client
        .post(push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await
    {
        Ok(r) if r.status().is_success() => {
            info!("Pushed metrics to {}", push_url);
            true
        }
        Ok(r) => {
            warn!(
                "Pushgateway push responded with status {} for {}",
                r.status().as_u16(),
                push_url
            );
            false
        }
        Err(e) => {
            warn!("Failed to push metrics to {}: {}", push_url, e);
            false
        }
    }
}

// ============================================================================
// Source Metrics
// ============================================================================

pub mod source {
    use super::MetricName;

    pub fn request_success(records: usize) {
        ::metrics::counter!(MetricName::SourceRequestsSuccess.as_str()).increment(1);
        ::metrics::counter!(MetricName::SourceRecordsFetched.as_str()).increment(records as u64);
    }

    pub fn request_error() {
        ::metrics::counter!(MetricName::SourceRequestsError.as_str()).increment(1);
    }

    pub fn request_duration(secs: f64) {
        ::metrics::histogram!(MetricName::SourceRequestDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::MetricName;

    pub fn run_started() {
        ::metrics::counter!(MetricName::PipelineRuns.as_str()).increment(1);
    }

    pub fn run_aborted() {
        ::metrics::counter!(MetricName::PipelineRunsAborted.as_str()).increment(1);
    }

    pub fn run_duration(secs: f64) {
        ::metrics::histogram!(MetricName::PipelineDuration.as_str()).record(secs);
    }

    /// One increment per record, labelled with its outcome
    pub fn record_outcome(outcome: &'static str) {
        ::metrics::counter!(MetricName::PipelineRecords.as_str(), "outcome" => outcome).increment(1);
    }
}

// ============================================================================
// Store Metrics
// ============================================================================

pub mod store {
    use super::MetricName;

    pub fn write_duration(secs: f64) {
        ::metrics::histogram!(MetricName::StoreWriteDuration.as_str()).record(secs);
    }
}
