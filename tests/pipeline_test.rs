use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use drug_event_etl::common::types::{RawRecord, ReportSource};
use drug_event_etl::domain::{Report, Sex};
use drug_event_etl::pipeline::{Pipeline, ReportNormalizer};
use drug_event_etl::storage::{
    InMemoryReportStore, PutOutcome, ReportSink, SqliteReportStore, StoreLease, StoreLocation,
};
use drug_event_etl::EtlError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

struct CannedSource {
    records: Vec<RawRecord>,
    fail: bool,
}

impl CannedSource {
    fn new(records: Vec<Value>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|v| v.as_object().cloned().unwrap())
                .collect(),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            records: vec![],
            fail: true,
        }
    }
}

#[async_trait]
impl ReportSource for CannedSource {
    fn source_name(&self) -> &'static str {
        "openfda"
    }

    async fn search(&self, _query: &str, _limit: i64) -> drug_event_etl::Result<Vec<RawRecord>> {
        if self.fail {
            return Err(EtlError::SourceUnavailable {
                status: Some(503),
                message: "maintenance".to_string(),
            });
        }
        Ok(self.records.clone())
    }
}

/// Accepts `healthy_writes` puts, then behaves like a lost connection
struct FlakySink {
    inner: InMemoryReportStore,
    healthy_writes: usize,
    writes: AtomicUsize,
}

#[async_trait]
impl ReportSink for FlakySink {
    fn describe(&self) -> String {
        "flaky://".to_string()
    }
    async fn connect(&self) -> drug_event_etl::Result<()> {
        self.inner.connect().await
    }
    fn close(&self) {
        self.inner.close()
    }
    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
    async fn put(&self, report: &Report) -> drug_event_etl::Result<PutOutcome> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.healthy_writes {
            return Err(EtlError::StoreUnavailable {
                message: "connection reset".to_string(),
            });
        }
        self.inner.put(report).await
    }
    async fn get(&self, report_id: &str) -> drug_event_etl::Result<Option<Report>> {
        self.inner.get(report_id).await
    }
    async fn count(&self) -> drug_event_etl::Result<u64> {
        self.inner.count().await
    }
    async fn delete(&self, report_id: &str) -> drug_event_etl::Result<bool> {
        self.inner.delete(report_id).await
    }
    async fn list(&self, limit: usize) -> drug_event_etl::Result<Vec<Report>> {
        self.inner.list(limit).await
    }
}

fn fixed_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

fn record(id: &str, drug: &str) -> Value {
    json!({
        "safetyreportid": id,
        "receivedate": "20230115",
        "patient": {
            "patientsex": "2",
            "patientonsetage": "61",
            "patientonsetageunit": "801",
            "drug": [{
                "medicinalproduct": drug,
                "drugdosageform": "TABLET",
                "openfda": {"substance_name": ["IBUPROFEN"]}
            }],
            "reaction": [
                {"reactionmeddrapt": "Nausea", "reactionoutcome": "1"},
                {"reactionmeddrapt": "Dizziness"}
            ]
        }
    })
}

fn ten_record_batch() -> Vec<Value> {
    vec![
        record("A", "ADVIL"),
        record("A", "ADVIL"),
        record("B", "MOTRIN"),
        record("B", "MOTRIN"),
        record("C", "ASPIRIN"),
        record("D", "ASPIRIN"),
        record("E", "TYLENOL"),
        json!({"receivedate": "20230115", "patient": {"drug": [{"medicinalproduct": "X"}]}}),
        record("F", "ALEVE"),
        record("G", "ALEVE"),
    ]
}

#[tokio::test]
async fn test_batch_with_duplicates_and_missing_id() -> Result<()> {
    let source = CannedSource::new(ten_record_batch());
    let sink = InMemoryReportStore::new();
    let lease = StoreLease::acquire(&sink).await?;

    let summary = Pipeline::new(&source, &*lease).run("q", 10).await?;

    assert_eq!(summary.attempted, 10);
    assert_eq!(summary.loaded, 7);
    assert_eq!(summary.duplicates, 2);
    assert_eq!(summary.failed, 1);
    assert!(summary.is_balanced());
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("record #7"));
    assert_eq!(lease.count().await?, 7);
    Ok(())
}

#[tokio::test]
async fn test_us123_end_to_end() -> Result<()> {
    let source = CannedSource::new(vec![json!({
        "safetyreportid": "US123",
        "receivedate": "20230115",
        "patient": {
            "patientsex": "1",
            "drug": [{"medicinalproduct": "IBUPROFEN"}],
            "reaction": [{"reactionmeddrapt": "Nausea"}]
        }
    })]);
    let sink = InMemoryReportStore::new();
    let lease = StoreLease::acquire(&sink).await?;

    let pipeline = Pipeline::new(&source, &*lease)
        .with_normalizer(ReportNormalizer::default().with_clock(fixed_clock));
    let summary = pipeline.run("patient.drug.medicinalproduct:\"IBUPROFEN\"", 1).await?;
    assert_eq!(summary.loaded, 1);

    let stored = lease.get("US123").await?.expect("report stored");
    assert_eq!(stored.received_date.as_deref(), Some("2023-01-15T00:00:00"));
    assert_eq!(stored.patient.sex, Sex::Male);
    assert_eq!(stored.drugs[0].name, "IBUPROFEN");
    assert_eq!(stored.reactions[0].term, "Nausea");
    assert_eq!(stored.source, "openfda");
    assert_eq!(stored.processed_at, fixed_clock());
    Ok(())
}

#[tokio::test]
async fn test_rerun_only_adds_duplicates() -> Result<()> {
    let source = CannedSource::new(vec![record("R1", "ADVIL"), record("R2", "ADVIL")]);
    let sink = InMemoryReportStore::new();
    let lease = StoreLease::acquire(&sink).await?;
    let pipeline = Pipeline::new(&source, &*lease);

    let first = pipeline.run("q", 2).await?;
    let second = pipeline.run("q", 2).await?;

    assert_eq!((first.loaded, first.duplicates), (2, 0));
    assert_eq!((second.loaded, second.duplicates), (0, 2));
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(lease.count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_source_failure_writes_nothing() -> Result<()> {
    let source = CannedSource::failing();
    let sink = InMemoryReportStore::new();
    let lease = StoreLease::acquire(&sink).await?;

    let err = Pipeline::new(&source, &*lease).run("q", 5).await.unwrap_err();
    assert!(matches!(
        err,
        EtlError::SourceUnavailable {
            status: Some(503),
            ..
        }
    ));
    assert_eq!(lease.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_store_outage_aborts_with_partial_counts() -> Result<()> {
    let source = CannedSource::new(vec![
        record("S1", "ADVIL"),
        record("S1", "ADVIL"),
        record("S2", "ADVIL"),
        record("S3", "ADVIL"),
    ]);
    let sink = FlakySink {
        inner: InMemoryReportStore::new(),
        healthy_writes: 2,
        writes: AtomicUsize::new(0),
    };

    {
        let lease = StoreLease::acquire(&sink).await?;
        let err = Pipeline::new(&source, &*lease).run("q", 4).await.unwrap_err();

        match err {
            EtlError::RunAborted { reason, summary } => {
                assert!(matches!(*reason, EtlError::StoreUnavailable { .. }));
                assert_eq!(summary.attempted, 3);
                assert_eq!(summary.loaded, 1);
                assert_eq!(summary.duplicates, 1);
                assert_eq!(summary.failed, 1);
                assert!(summary.is_balanced());
            }
            other => panic!("expected RunAborted, got {other:?}"),
        }
    }
    // Lease released even though the run failed
    assert!(!sink.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_round_trip_through_pipeline() -> Result<()> {
    let dir = tempdir()?;
    let location = StoreLocation::parse(dir.path().to_str().unwrap(), "eim_platform")?;
    let sink = SqliteReportStore::new(location, "reports")?;
    let source = CannedSource::new(vec![record("RT1", "ADVIL")]);

    let raw_dir = dir.path().join("raw");
    {
        let lease = StoreLease::acquire(&sink).await?;
        let summary = Pipeline::new(&source, &*lease)
            .with_raw_archive(Some(raw_dir.clone()))
            .run("q", 1)
            .await?;
        assert_eq!(summary.loaded, 1);
    }
    assert!(dir.path().join("eim_platform.db").exists());
    assert_eq!(std::fs::read_dir(&raw_dir)?.count(), 1);

    // Reopened connection sees the same document
    let lease = StoreLease::acquire(&sink).await?;
    let stored = lease.get("RT1").await?.expect("report stored");
    assert_eq!(stored.drugs.len(), 1);
    assert_eq!(stored.drugs[0].name, "ADVIL");
    assert_eq!(stored.drugs[0].active_ingredients, vec!["IBUPROFEN".to_string()]);
    assert_eq!(stored.drugs[0].dosage_form.as_deref(), Some("TABLET"));
    let terms: Vec<_> = stored.reactions.iter().map(|r| r.term.as_str()).collect();
    assert_eq!(terms, vec!["Nausea", "Dizziness"]);
    assert_eq!(stored.reactions[0].outcome.as_deref(), Some("1"));
    assert_eq!(stored.patient.sex, Sex::Female);
    Ok(())
}
