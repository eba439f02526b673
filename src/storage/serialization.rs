use crate::common::error::{EtlError, Result};
use crate::domain::Report;

/// Helper functions for converting reports to and from stored documents
pub struct Serialization;

impl Serialization {
    /// Convert report to its persisted JSON document
    pub fn report_to_document(report: &Report) -> Result<String> {
        serde_json::to_string(report).map_err(|e| EtlError::Store {
            message: format!("Failed to serialize report {}: {e}", report.report_id),
        })
    }

    /// Convert a persisted document back to a report
    pub fn document_to_report(report_id: &str, document: &str) -> Result<Report> {
        let report: Report = serde_json::from_str(document).map_err(|e| EtlError::Store {
            message: format!("Failed to deserialize report {report_id}: {e}"),
        })?;
        if report.report_id != report_id {
            return Err(EtlError::Store {
                message: format!(
                    "Document stored under {report_id} carries report_id {}",
                    report.report_id
                ),
            });
        }
        Ok(report)
    }
}
