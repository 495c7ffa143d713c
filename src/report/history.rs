//! The analysis history list (`analysis_history.json`).
//!
//! A flat newest-first list of past analyses kept next to the report
//! artifacts. Append-only under normal use; `clear` wipes the reports
//! directory.

use crate::models::HistoryEntry;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};

const HISTORY_FILE: &str = "analysis_history.json";

/// Load the history list. A missing file means no history; a corrupt
/// file is treated the same way rather than blocking new analyses.
pub fn load(output_dir: &Path) -> Vec<HistoryEntry> {
    let path = output_dir.join(HISTORY_FILE);
    if !path.exists() {
        return Vec::new();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring corrupt history file {}: {}", path.display(), e);
                Vec::new()
            }
        },
        Err(e) => {
            warn!("Failed to read history file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Append an entry and rewrite the history file, newest first.
pub fn append(output_dir: &Path, entry: HistoryEntry) -> Result<()> {
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    let mut entries = load(output_dir);
    entries.push(entry);
    entries.sort_by(|a, b| b.date.cmp(&a.date));

    let path = output_dir.join(HISTORY_FILE);
    let json = serde_json::to_string_pretty(&entries).context("Failed to serialize history")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write history to {}", path.display()))?;

    debug!("History updated ({} entries)", entries.len());
    Ok(())
}

/// Remove all report artifacts, chart images, and the history file.
/// Returns how many files were deleted.
pub fn clear(output_dir: &Path) -> Result<usize> {
    if !output_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for dir_entry in std::fs::read_dir(output_dir)
        .with_context(|| format!("Failed to read {}", output_dir.display()))?
    {
        let path = dir_entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };

        if name == HISTORY_FILE
            || name.ends_with("_report.json")
            || name.ends_with("_sentiment.png")
        {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            removed += 1;
        }
    }

    Ok(removed)
}
