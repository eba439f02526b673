use crate::common::constants::{clamp_search_limit, OPENFDA_SOURCE};
use crate::common::error::{EtlError, Result};
use crate::common::types::{RawRecord, ReportSource};
use crate::config::SourceConfig;
use crate::observability::metrics;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Longest slice of an error body carried into diagnostics
const ERROR_BODY_PREVIEW: usize = 200;

/// Response envelope of the search endpoint. Only `results` feeds the pipeline.
#[derive(Debug, Deserialize)]
pub struct SearchEnvelope {
    #[serde(default)]
    pub meta: Option<SearchMeta>,
    #[serde(default)]
    pub results: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SearchMeta {
    #[serde(default)]
    pub results: Option<ResultsMeta>,
}

#[derive(Debug, Deserialize)]
pub struct ResultsMeta {
    #[serde(default)]
    pub total: u64,
}

impl SearchEnvelope {
    pub fn total(&self) -> u64 {
        self.meta
            .as_ref()
            .and_then(|m| m.results.as_ref())
            .map(|r| r.total)
            .unwrap_or(0)
    }
}

/// Client for the openFDA drug adverse event endpoint
pub struct OpenFdaClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenFdaClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let api_key = config
            .credential
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!("No openFDA API key configured, requests are subject to anonymous quotas");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn params(&self, search: Option<&str>, limit: u32) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(3);
        if let Some(search) = search {
            params.push(("search", search.to_string()));
        }
        params.push(("limit", limit.to_string()));
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Single GET against the endpoint; anything but a decodable 2xx is a failure
    async fn request(&self, search: Option<&str>, limit: u32) -> Result<SearchEnvelope> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&self.params(search, limit))
            .send()
            .await
            .map_err(|e| EtlError::SourceUnavailable {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = response.status();
        debug!("Response received with status {}", status.as_u16());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::SourceUnavailable {
                status: Some(status.as_u16()),
                message: preview(&body),
            });
        }

        let bytes = response.bytes().await.map_err(|e| EtlError::SourceUnavailable {
            status: Some(status.as_u16()),
            message: format!("Failed to read response body: {e}"),
        })?;
        serde_json::from_slice::<SearchEnvelope>(&bytes).map_err(|e| EtlError::SourceUnavailable {
            status: Some(status.as_u16()),
            message: format!("Undecodable search envelope: {e}"),
        })
    }
}

#[async_trait::async_trait]
impl ReportSource for OpenFdaClient {
    fn source_name(&self) -> &'static str {
        OPENFDA_SOURCE
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<RawRecord>> {
        let limit = clamp_search_limit(limit);
        info!("Searching reports for {} (limit {})", query, limit);

        let started = Instant::now();
        let outcome = self.request(Some(query), limit).await;
        metrics::source::request_duration(started.elapsed().as_secs_f64());

        match outcome {
            Ok(envelope) => {
                info!(
                    "{} matching reports, {} returned",
                    envelope.total(),
                    envelope.results.len()
                );
                metrics::source::request_success(envelope.results.len());
                Ok(envelope.results)
            }
            Err(e) => {
                warn!("Search failed: {}", e);
                metrics::source::request_error();
                Err(e)
            }
        }
    }

    async fn test_connection(&self) -> bool {
        match self.request(None, 1).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Connection test failed: {}", e);
                false
            }
        }
    }
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_BODY_PREVIEW {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(ERROR_BODY_PREVIEW).collect();
    format!("{cut}...")
}
