//! Building and persisting the analysis report artifact.
//!
//! One JSON file per app identifier. Re-running an analysis replaces
//! the previous artifact wholesale; there is no merging or versioning.

use crate::models::{AnalysisReport, AppInfo, AppMetadata, ReviewStats};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

/// Combine the app metadata snapshot and aggregated statistics into a
/// report, stamping it with the current time.
pub fn build_report(metadata: &AppMetadata, stats: ReviewStats) -> AnalysisReport {
    AnalysisReport {
        app_id: metadata.app_id.clone(),
        app_info: AppInfo::from(metadata),
        analysis: stats,
        generated_at: Utc::now(),
    }
}

/// Path of the JSON artifact for an app.
pub fn report_path(output_dir: &Path, app_id: &str) -> PathBuf {
    output_dir.join(format!("{}_report.json", app_id))
}

/// Path of the companion chart image for an app.
pub fn chart_path(output_dir: &Path, app_id: &str) -> PathBuf {
    output_dir.join(format!("{}_sentiment.png", app_id))
}

/// Write the report as indented JSON, creating the output directory if
/// needed and overwriting any existing artifact for the same app.
pub fn persist(report: &AnalysisReport, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    let path = report_path(output_dir, &report.app_id);
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    info!("Report saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FrequencyTable, SentimentCounts};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn test_metadata() -> AppMetadata {
        AppMetadata {
            app_id: "com.example.game".to_string(),
            title: "Example Game".to_string(),
            developer: "Example Studio".to_string(),
            score: 4.3,
            reviews: 1000,
            installs: Some("1,000,000+".to_string()),
            price: Some("0".to_string()),
            size: None,
            updated: None,
            content_rating: Some("Everyone".to_string()),
        }
    }

    fn test_stats(average: f64) -> ReviewStats {
        let mut topics = FrequencyTable::new();
        topics.increment("gameplay");
        ReviewStats {
            total_reviews: 2,
            average_rating: average,
            rating_distribution: BTreeMap::from([(5, 1), (1, 1)]),
            sentiment_distribution: SentimentCounts {
                positive: 1,
                neutral: 0,
                negative: 1,
            },
            common_topics: topics,
            common_issues: FrequencyTable::new(),
            common_praises: FrequencyTable::new(),
            fallback_count: 0,
        }
    }

    #[test]
    fn test_build_report_shape() {
        let report = build_report(&test_metadata(), test_stats(3.0));
        assert_eq!(report.app_id, "com.example.game");
        assert_eq!(report.app_info.title, "Example Game");
        assert_eq!(report.analysis.total_reviews, 2);
    }

    #[test]
    fn test_persist_writes_artifact() {
        let dir = TempDir::new().unwrap();
        let report = build_report(&test_metadata(), test_stats(3.0));

        let path = persist(&report, dir.path()).unwrap();
        assert_eq!(path, dir.path().join("com.example.game_report.json"));

        let content = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(json.get("app_info").is_some());
        assert!(json.get("analysis").is_some());
        assert!(json.get("generated_at").is_some());
        // The app id lives in the filename, not the JSON body.
        assert!(json.get("app_id").is_none());
        assert_eq!(json["analysis"]["total_reviews"], 2);
    }

    #[test]
    fn test_persist_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("reports");
        let report = build_report(&test_metadata(), test_stats(3.0));

        let path = persist(&report, &nested).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_persist_overwrites_previous_report() {
        let dir = TempDir::new().unwrap();

        let first = build_report(&test_metadata(), test_stats(3.0));
        persist(&first, dir.path()).unwrap();

        let second = build_report(&test_metadata(), test_stats(4.5));
        let path = persist(&second, dir.path()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["analysis"]["average_rating"], 4.5);
    }

    #[test]
    fn test_report_roundtrip() {
        let report = build_report(&test_metadata(), test_stats(3.0));
        let json = serde_json::to_string(&report).unwrap();
        let back: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.analysis, report.analysis);
        assert_eq!(back.app_info.title, report.app_info.title);
        // Skipped during serialization, so it comes back empty.
        assert_eq!(back.app_id, "");
    }
}
