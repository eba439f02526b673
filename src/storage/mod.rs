//! Persistence sink for canonical reports.
//!
//! Every backend enforces first-write-wins on `report_id`: a second write of
//! the same id comes back as [`PutOutcome::Duplicate`] and leaves the stored
//! document untouched.

pub mod in_memory;
pub mod serialization;
pub mod sqlite;

pub use in_memory::InMemoryReportStore;
pub use sqlite::{SqliteReportStore, StoreLocation};

use crate::common::constants::MEMORY_STORE_URI;
use crate::common::error::{EtlError, Result};
use crate::config::StoreConfig;
use crate::domain::Report;
use async_trait::async_trait;
use std::ops::Deref;
use tracing::debug;

/// Result of a single write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// The store already holds this `report_id`
    Duplicate,
    /// Structurally invalid report, never written
    Rejected(String),
}

/// Storage trait for canonical reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    /// Open the connection and establish the uniqueness constraint.
    /// Idempotent; every other operation connects lazily as well.
    async fn connect(&self) -> Result<()>;

    /// Release the connection. Safe to call when not connected.
    fn close(&self);

    fn is_connected(&self) -> bool;

    async fn put(&self, report: &Report) -> Result<PutOutcome>;
    async fn get(&self, report_id: &str) -> Result<Option<Report>>;
    async fn count(&self) -> Result<u64>;
    async fn delete(&self, report_id: &str) -> Result<bool>;

    /// First `limit` reports in insertion order
    async fn list(&self, limit: usize) -> Result<Vec<Report>>;
}

/// Scoped hold on a connected sink; dropping it closes the connection, also
/// when the run using it fails or panics.
pub struct StoreLease<'a> {
    sink: &'a dyn ReportSink,
}

impl<'a> StoreLease<'a> {
    pub async fn acquire(sink: &'a dyn ReportSink) -> Result<StoreLease<'a>> {
        sink.connect().await?;
        debug!("Acquired store lease on {}", sink.describe());
        Ok(Self { sink })
    }
}

impl<'a> Deref for StoreLease<'a> {
    type Target = dyn ReportSink + 'a;

    fn deref(&self) -> &Self::Target {
        self.sink
    }
}

impl Drop for StoreLease<'_> {
    fn drop(&mut self) {
        self.sink.close();
        debug!("Released store lease on {}", self.sink.describe());
    }
}

/// Build the sink named by `store_uri`:
/// - `memory://` → process-local [`InMemoryReportStore`]
/// - `sqlite::memory:` → in-memory SQLite
/// - `sqlite://<dir>` or a bare `<dir>` → `<dir>/<store_db>.db`
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn ReportSink>> {
    let uri = config.store_uri.trim();
    if uri == MEMORY_STORE_URI {
        return Ok(Box::new(InMemoryReportStore::new()));
    }

    let location = StoreLocation::parse(uri, &config.store_db)?;
    Ok(Box::new(SqliteReportStore::new(
        location,
        &config.store_collection,
    )?))
}

pub(crate) fn unsupported_scheme(uri: &str) -> EtlError {
    EtlError::Config(format!(
        "Unsupported store_uri '{}': expected memory://, sqlite::memory:, sqlite://<dir> or a directory path",
        uri
    ))
}
