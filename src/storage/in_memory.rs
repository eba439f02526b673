use super::{PutOutcome, ReportSink};
use crate::common::constants::MEMORY_STORE_URI;
use crate::common::error::{EtlError, Result};
use crate::domain::Report;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// In-memory report store for development/testing.
///
/// Reports are kept in insertion order; the data outlives `close()` so a
/// reconnect sees the same collection.
pub struct InMemoryReportStore {
    reports: Arc<Mutex<Vec<Report>>>,
    connected: AtomicBool,
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            reports: Arc::new(Mutex::new(Vec::new())),
            connected: AtomicBool::new(false),
        }
    }

    fn reports(&self) -> Result<MutexGuard<'_, Vec<Report>>> {
        self.connected.store(true, Ordering::SeqCst);
        self.reports.lock().map_err(|_| EtlError::StoreUnavailable {
            message: "in-memory store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl ReportSink for InMemoryReportStore {
    fn describe(&self) -> String {
        MEMORY_STORE_URI.to_string()
    }

    async fn connect(&self) -> Result<()> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            info!("Connected to in-memory report store");
        }
        Ok(())
    }

    fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Closed in-memory report store");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn put(&self, report: &Report) -> Result<PutOutcome> {
        if let Err(e) = report.validate() {
            warn!("Rejected report: {}", e);
            return Ok(PutOutcome::Rejected(e.to_string()));
        }

        let mut reports = self.reports()?;
        if reports.iter().any(|r| r.report_id == report.report_id) {
            warn!(
                "{}",
                EtlError::DuplicateRecord {
                    report_id: report.report_id.clone()
                }
            );
            return Ok(PutOutcome::Duplicate);
        }
        reports.push(report.clone());
        debug!("Inserted report {}", report.report_id);
        Ok(PutOutcome::Inserted)
    }

    async fn get(&self, report_id: &str) -> Result<Option<Report>> {
        let reports = self.reports()?;
        Ok(reports.iter().find(|r| r.report_id == report_id).cloned())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.reports()?.len() as u64)
    }

    async fn delete(&self, report_id: &str) -> Result<bool> {
        let mut reports = self.reports()?;
        let before = reports.len();
        reports.retain(|r| r.report_id != report_id);
        let deleted = reports.len() < before;
        if deleted {
            info!("Deleted report {}", report_id);
        } else {
            warn!("Report {} not found for deletion", report_id);
        }
        Ok(deleted)
    }

    async fn list(&self, limit: usize) -> Result<Vec<Report>> {
        let reports = self.reports()?;
        Ok(reports.iter().take(limit).cloned().collect())
    }
}
