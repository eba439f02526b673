use crate::common::error::Result;
use serde_json::{Map, Value};

/// Raw report exactly as returned by the search endpoint. Only the normalizer
/// looks inside it.
pub type RawRecord = Map<String, Value>;

/// Core trait for the remote search endpoint that feeds the pipeline
#[async_trait::async_trait]
pub trait ReportSource: Send + Sync {
    /// Unique identifier for this source
    fn source_name(&self) -> &'static str;

    /// Run one search and return the raw records of the response.
    ///
    /// `limit` is clamped into the accepted range rather than rejected.
    /// Exactly one request is made; failures come back as
    /// [`EtlError::SourceUnavailable`](crate::common::error::EtlError::SourceUnavailable).
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<RawRecord>>;

    /// Cheap probe of the endpoint
    async fn test_connection(&self) -> bool {
        true
    }
}
