//! Run summary: build and write run_summary.json after a completed batch.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::collector::ReportCollector;
use crate::config::ReportConfig;

/// Summary of a completed batch, written when exit code is 0 or 2.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Distinct candidates in the scores sheet, skipped ones included.
    pub candidates_total: usize,
    /// Candidates whose summary cell holds generated text.
    pub reports_generated: usize,
    /// Candidates whose summary cell holds an error string.
    pub reports_failed: Vec<String>,
    /// Candidates without both comment rows.
    pub skipped: Vec<String>,
    pub output_path: String,
    pub model: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    pub exit_code: u8,
    /// RFC 3339 timestamp when the batch completed.
    pub completed_at: String,
}

pub fn build_summary(
    collector: &ReportCollector,
    candidates_total: usize,
    config: &ReportConfig,
    dry_run: bool,
    exit_code: u8,
) -> RunSummary {
    let reports_failed = collector.failed_names();
    RunSummary {
        candidates_total,
        reports_generated: collector.len() - reports_failed.len(),
        reports_failed,
        skipped: collector.skipped().to_vec(),
        output_path: config.output_path.display().to_string(),
        model: config.model.clone(),
        dry_run,
        exit_code,
        completed_at: Utc::now().to_rfc3339(),
    }
}

/// Write summary to the given path. Creates parent dirs if needed; writes atomically (temp then rename).
/// Best-effort: on failure logs a warning and does not change exit code.
pub fn write_run_summary(summary: &RunSummary, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(
                    path = %path.display(),
                    err = %e,
                    "failed to create parent directory for run summary"
                );
                return;
            }
        }
    }

    let json = match serde_json::to_string_pretty(summary) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "failed to serialize run summary");
            return;
        }
    };

    let tmp_path = path.with_extension("json.tmp");
    let written = fs::File::create(&tmp_path).and_then(|mut f| {
        f.write_all(json.as_bytes())?;
        f.sync_all()
    });
    if let Err(e) = written {
        tracing::warn!(
            path = %path.display(),
            err = %e,
            "failed to write run summary (temp file)"
        );
        let _ = fs::remove_file(&tmp_path);
        return;
    }

    if fs::rename(&tmp_path, path).is_err() {
        if let Err(e) = fs::write(path, &json) {
            tracing::warn!(
                path = %path.display(),
                err = %e,
                "failed to write run summary (fallback)"
            );
        }
        let _ = fs::remove_file(&tmp_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{GeneratedReport, ReportBody};
    use std::path::PathBuf;

    fn config() -> ReportConfig {
        ReportConfig {
            api_key: Some("secret".to_owned()),
            scores_path: PathBuf::from("scores.xlsx"),
            comments_path: PathBuf::from("comments.xlsx"),
            output_path: PathBuf::from("out/summaries.xlsx"),
            model: "gemini-2.5-pro".to_owned(),
            api_base_url: "https://generativelanguage.googleapis.com".to_owned(),
            timeout_sec: 120,
            max_attempts: 5,
            base_delay_ms: 1000,
            parallel: false,
            max_parallel: 4,
            on_duplicate_rows: "reject".to_owned(),
            batch_deadline_sec: None,
            template_path: None,
            run_summary_path: None,
            log_level: None,
            log_file: None,
        }
    }

    fn collector() -> ReportCollector {
        let mut collector = ReportCollector::new(2, vec!["Badreyah".to_owned()]);
        collector.insert(
            0,
            GeneratedReport {
                name: "Ayesha".to_owned(),
                body: ReportBody::Text("Ayesha leads.".to_owned()),
            },
        );
        collector.insert(
            1,
            GeneratedReport {
                name: "Ali".to_owned(),
                body: ReportBody::Error("HTTP 503".to_owned()),
            },
        );
        collector
    }

    #[test]
    fn summary_counts_generated_failed_and_skipped() {
        let summary = build_summary(&collector(), 3, &config(), false, 2);

        assert_eq!(summary.candidates_total, 3);
        assert_eq!(summary.reports_generated, 1);
        assert_eq!(summary.reports_failed, vec!["Ali".to_owned()]);
        assert_eq!(summary.skipped, vec!["Badreyah".to_owned()]);
        assert_eq!(summary.output_path, "out/summaries.xlsx");
        assert_eq!(summary.exit_code, 2);
        assert!(chrono::DateTime::parse_from_rfc3339(&summary.completed_at).is_ok());
    }

    #[test]
    fn written_summary_is_json_without_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run_summary.json");
        let summary = build_summary(&collector(), 3, &config(), false, 2);

        write_run_summary(&summary, &path);

        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("secret"), "credential leaked: {text}");
        assert!(!path.with_extension("json.tmp").exists());

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["reports_generated"], 1);
        assert_eq!(value["reports_failed"][0], "Ali");
        assert_eq!(value["model"], "gemini-2.5-pro");
        assert!(value.get("dry_run").is_none());
    }

    #[test]
    fn unwritable_path_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let summary = build_summary(&collector(), 3, &config(), true, 0);

        write_run_summary(&summary, &blocker.join("run_summary.json"));
        assert!(!blocker.join("run_summary.json").exists());
    }
}
