use std::path::PathBuf;

use crate::template::TemplateError;

/// Batch-level failures. Any of these stops the run before (or instead of)
/// per-candidate processing; per-candidate failures live in
/// [`crate::client::GenerateError`] and [`crate::batch::CandidateError`].
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("API key is missing. Set LEADREP_API_KEY or `api_key` in the config file.")]
    MissingCredential,

    #[error("Input file not found: {path}")]
    InputFileNotFound { path: PathBuf },

    #[error("Input path is not a file: {path}")]
    InputNotAFile { path: PathBuf },

    #[error("Failed to read {path}: {detail}")]
    InputUnreadable { path: PathBuf, detail: String },

    #[error("Unsupported file type: {path} (expected .xlsx, .xlsm, .xls, .ods or .csv)")]
    UnsupportedFormat { path: PathBuf },

    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{path}: row {row}, column '{column}': {detail}")]
    InvalidCell {
        path: PathBuf,
        row: usize,
        column: String,
        detail: String,
    },

    #[error("{path}: duplicate rows for {key} (rows {first_row} and {second_row})")]
    DuplicateRow {
        path: PathBuf,
        key: String,
        first_row: usize,
        second_row: usize,
    },

    #[error("{path}: no header row found")]
    EmptyInput { path: PathBuf },

    #[error("Prompt template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Failed to read template file {path}: {detail}")]
    TemplateUnreadable { path: PathBuf, detail: String },

    #[error("Failed to parse environment variable '{var}': {detail}")]
    ConfigEnvParseError { var: String, detail: String },

    #[error("Invalid on_duplicate_rows value '{value}' (expected \"reject\" or \"first\")")]
    InvalidDuplicatePolicy { value: String },

    #[error("max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("Invalid API base URL '{url}': {detail}")]
    InvalidApiBaseUrl { url: String, detail: String },

    #[error("Failed to build HTTP client: {detail}")]
    HttpClientBuild { detail: String },

    #[error("Failed to write {path}: {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },

    #[error("Batch has already been run; start a new batch for a fresh run")]
    BatchAlreadyRun,
}
