use crate::common::types::RawRecord;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

/// Write a fetched batch verbatim to `<dir>/<label>_raw_<timestamp>.json`
pub fn save_raw_batch(dir: &Path, label: &str, records: &[RawRecord]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create archive directory {}", dir.display()))?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let filepath = dir.join(format!("{label}_raw_{timestamp}.json"));

    let json_content = serde_json::to_string_pretty(records)?;
    fs::write(&filepath, json_content)
        .with_context(|| format!("Failed to write {}", filepath.display()))?;

    Ok(filepath)
}
