use super::serialization::Serialization;
use super::{unsupported_scheme, PutOutcome, ReportSink};
use crate::common::error::{EtlError, Result};
use crate::config::is_identifier;
use crate::domain::Report;
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Extended result code of a UNIQUE index violation
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

impl StoreLocation {
    /// Resolve `store_uri` + `store_db` to a database file (or memory)
    pub fn parse(store_uri: &str, store_db: &str) -> Result<Self> {
        let uri = store_uri.trim();
        if uri == "sqlite::memory:" {
            return Ok(StoreLocation::Memory);
        }
        let dir = match uri.strip_prefix("sqlite://") {
            Some(dir) => dir,
            None if uri.contains("://") => return Err(unsupported_scheme(uri)),
            None => uri,
        };
        if dir.is_empty() {
            return Err(unsupported_scheme(uri));
        }
        if !is_identifier(store_db) {
            return Err(EtlError::Config(format!(
                "store_db '{}' is not a valid database name",
                store_db
            )));
        }
        Ok(StoreLocation::File(
            PathBuf::from(dir).join(format!("{store_db}.db")),
        ))
    }
}

/// SQLite-backed report collection.
///
/// One table per collection holds the JSON document next to an indexed
/// `report_id`; the unique index is what turns a second write into a
/// duplicate.
pub struct SqliteReportStore {
    location: StoreLocation,
    collection: String,
    conn: Mutex<Option<Connection>>,
}

impl SqliteReportStore {
    pub fn new(location: StoreLocation, collection: &str) -> Result<Self> {
        if !is_identifier(collection) {
            return Err(EtlError::Config(format!(
                "store_collection '{}' is not a valid collection name",
                collection
            )));
        }
        Ok(Self {
            location,
            collection: collection.to_string(),
            conn: Mutex::new(None),
        })
    }

    fn open(&self) -> Result<Connection> {
        let conn = match &self.location {
            StoreLocation::Memory => Connection::open_in_memory(),
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| EtlError::StoreUnavailable {
                        message: format!("Failed to create {}: {e}", parent.display()),
                    })?;
                }
                Connection::open(path)
            }
        }
        .map_err(|e| EtlError::StoreUnavailable {
            message: format!("Failed to open {}: {e}", self.describe()),
        })?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS {c} (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                report_id    TEXT NOT NULL,
                document     TEXT NOT NULL,
                inserted_at  TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS {c}_report_id_unique ON {c} (report_id);
            "#,
            c = self.collection
        ))
        .map_err(|e| EtlError::StoreUnavailable {
            message: format!("Failed to initialize collection {}: {e}", self.collection),
        })?;

        info!("Connected to report store {}", self.describe());
        Ok(conn)
    }

    /// Run `f` on the connection, opening it first if needed
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().map_err(|_| EtlError::StoreUnavailable {
            message: "store connection lock poisoned".to_string(),
        })?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        let conn = guard.as_ref().ok_or_else(|| EtlError::StoreUnavailable {
            message: "store connection missing after open".to_string(),
        })?;
        f(conn)
    }

    fn query_documents(
        &self,
        sql: &str,
        param: rusqlite::types::Value,
    ) -> Result<Vec<Report>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(params![param])?;
            let mut reports = Vec::new();
            while let Some(row) = rows.next()? {
                let report_id: String = row.get(0)?;
                let document: String = row.get(1)?;
                reports.push(Serialization::document_to_report(&report_id, &document)?);
            }
            Ok(reports)
        })
    }
}

#[async_trait]
impl ReportSink for SqliteReportStore {
    fn describe(&self) -> String {
        match &self.location {
            StoreLocation::Memory => format!("sqlite::memory:/{}", self.collection),
            StoreLocation::File(path) => format!("sqlite://{}/{}", path.display(), self.collection),
        }
    }

    async fn connect(&self) -> Result<()> {
        self.with_conn(|_| Ok(()))
    }

    fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            if let Some(conn) = guard.take() {
                if let Err((_, e)) = conn.close() {
                    warn!("Error while closing {}: {}", self.describe(), e);
                }
                info!("Closed report store {}", self.describe());
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    async fn put(&self, report: &Report) -> Result<PutOutcome> {
        if let Err(e) = report.validate() {
            warn!("Rejected report: {}", e);
            return Ok(PutOutcome::Rejected(e.to_string()));
        }
        let document = Serialization::report_to_document(report)?;
        let sql = format!(
            "INSERT INTO {} (report_id, document, inserted_at) VALUES (?1, ?2, ?3)",
            self.collection
        );

        let started = Instant::now();
        let outcome = self.with_conn(|conn| {
            match conn.execute(
                &sql,
                params![report.report_id, document, Utc::now().to_rfc3339()],
            ) {
                Ok(_) => Ok(PutOutcome::Inserted),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation
                        && e.extended_code == SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(PutOutcome::Duplicate)
                }
                Err(e) => Err(e.into()),
            }
        });
        metrics::store::write_duration(started.elapsed().as_secs_f64());

        match &outcome {
            Ok(PutOutcome::Inserted) => debug!("Inserted report {}", report.report_id),
            Ok(PutOutcome::Duplicate) => {
                let duplicate = EtlError::DuplicateRecord {
                    report_id: report.report_id.clone(),
                };
                warn!("{}", duplicate);
            }
            _ => {}
        }
        outcome
    }

    async fn get(&self, report_id: &str) -> Result<Option<Report>> {
        let sql = format!(
            "SELECT report_id, document FROM {} WHERE report_id = ?1",
            self.collection
        );
        let found = self
            .query_documents(&sql, report_id.to_string().into())?
            .into_iter()
            .next();
        debug!(
            "Report {} {}",
            report_id,
            if found.is_some() { "found" } else { "not found" }
        );
        Ok(found)
    }

    async fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.collection);
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    async fn delete(&self, report_id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE report_id = ?1", self.collection);
        let deleted = self.with_conn(|conn| Ok(conn.execute(&sql, params![report_id])?))?;
        if deleted > 0 {
            info!("Deleted report {}", report_id);
        } else {
            warn!("Report {} not found for deletion", report_id);
        }
        Ok(deleted > 0)
    }

    async fn list(&self, limit: usize) -> Result<Vec<Report>> {
        let sql = format!(
            "SELECT report_id, document FROM {} ORDER BY seq LIMIT ?1",
            self.collection
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_documents(&sql, limit.into())
    }
}
