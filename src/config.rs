use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::batch::BatchOptions;
use crate::cli::GenerateArgs;
use crate::client::{
    DEFAULT_API_BASE_URL, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MODEL,
    DEFAULT_TIMEOUT_SEC, RetryPolicy,
};
use crate::error::ReportError;
use crate::resolver::DuplicatePolicy;

// Precedence: CLI > env > file > defaults.

const DEFAULT_OUTPUT_PATH: &str = "all_candidate_summaries.xlsx";
const DEFAULT_MAX_PARALLEL: u32 = 4;
const DEFAULT_ON_DUPLICATE_ROWS: &str = "reject";

const ENV_PREFIX: &str = "LEADREP_";

/// Resolved configuration for one `generate` run.
///
/// Built from three layers with precedence CLI > env > file > defaults.
#[derive(Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Only from `LEADREP_API_KEY` or the config file. Never printed.
    pub api_key: Option<String>,
    pub scores_path: PathBuf,
    pub comments_path: PathBuf,
    pub output_path: PathBuf,
    pub model: String,
    pub api_base_url: String,
    /// Per-attempt request timeout.
    pub timeout_sec: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub parallel: bool,
    pub max_parallel: u32,
    /// "reject" or "first".
    pub on_duplicate_rows: String,
    pub batch_deadline_sec: Option<u64>,
    /// Custom prompt template; the built-in one is used when None.
    pub template_path: Option<PathBuf>,
    pub run_summary_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("scores_path", &self.scores_path)
            .field("comments_path", &self.comments_path)
            .field("output_path", &self.output_path)
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("timeout_sec", &self.timeout_sec)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("parallel", &self.parallel)
            .field("max_parallel", &self.max_parallel)
            .field("on_duplicate_rows", &self.on_duplicate_rows)
            .field("batch_deadline_sec", &self.batch_deadline_sec)
            .field("template_path", &self.template_path)
            .field("run_summary_path", &self.run_summary_path)
            .field("log_level", &self.log_level)
            .field("log_file", &self.log_file)
            .finish()
    }
}

/// TOML-deserializable config file representation. All fields optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_key: Option<String>,
    scores_path: Option<PathBuf>,
    comments_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    model: Option<String>,
    api_base_url: Option<String>,
    timeout_sec: Option<u64>,
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    parallel: Option<bool>,
    max_parallel: Option<u32>,
    on_duplicate_rows: Option<String>,
    batch_deadline_sec: Option<u64>,
    template_path: Option<PathBuf>,
    run_summary_path: Option<PathBuf>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

/// Intermediate layer where every field is optional, used to merge sources.
#[derive(Debug, Default)]
struct ConfigLayer {
    api_key: Option<String>,
    scores_path: Option<PathBuf>,
    comments_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    model: Option<String>,
    api_base_url: Option<String>,
    timeout_sec: Option<u64>,
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    parallel: Option<bool>,
    max_parallel: Option<u32>,
    on_duplicate_rows: Option<String>,
    batch_deadline_sec: Option<u64>,
    template_path: Option<PathBuf>,
    run_summary_path: Option<PathBuf>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

impl From<FileConfig> for ConfigLayer {
    fn from(fc: FileConfig) -> Self {
        ConfigLayer {
            api_key: fc.api_key,
            scores_path: fc.scores_path,
            comments_path: fc.comments_path,
            output_path: fc.output_path,
            model: fc.model,
            api_base_url: fc.api_base_url,
            timeout_sec: fc.timeout_sec,
            max_attempts: fc.max_attempts,
            base_delay_ms: fc.base_delay_ms,
            parallel: fc.parallel,
            max_parallel: fc.max_parallel,
            on_duplicate_rows: fc.on_duplicate_rows,
            batch_deadline_sec: fc.batch_deadline_sec,
            template_path: fc.template_path,
            run_summary_path: fc.run_summary_path,
            log_level: fc.log_level,
            log_file: fc.log_file,
        }
    }
}

impl ReportConfig {
    /// Load configuration with precedence: CLI > env > file > defaults.
    ///
    /// `config_path` — optional path to a TOML config file.
    /// `cli_args`    — values provided on the command line.
    pub fn load(config_path: Option<&Path>, cli_args: &GenerateArgs) -> anyhow::Result<Self> {
        Self::load_with_env(config_path, cli_args, real_env_var)
    }

    /// Check what can be checked before the batch starts: both input files
    /// exist and are regular files, the retry budget allows at least one
    /// attempt, and the duplicate policy and API base URL parse.
    pub fn validate(&self) -> Result<(), ReportError> {
        for path in [&self.scores_path, &self.comments_path] {
            if !path.exists() {
                return Err(ReportError::InputFileNotFound { path: path.clone() });
            }
            if !path.is_file() {
                return Err(ReportError::InputNotAFile { path: path.clone() });
            }
        }
        if self.max_attempts == 0 {
            return Err(ReportError::InvalidMaxAttempts);
        }
        self.duplicate_policy()?;
        Url::parse(&self.api_base_url).map_err(|e| ReportError::InvalidApiBaseUrl {
            url: self.api_base_url.clone(),
            detail: e.to_string(),
        })?;
        Ok(())
    }

    pub fn duplicate_policy(&self) -> Result<DuplicatePolicy, ReportError> {
        self.on_duplicate_rows.parse()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    pub fn batch_options(&self, dry_run: bool) -> BatchOptions {
        BatchOptions {
            parallel: self.parallel,
            max_parallel: self.max_parallel as usize,
            deadline: self.batch_deadline_sec.map(Duration::from_secs),
            dry_run,
        }
    }

    /// Internal constructor that accepts an env-var lookup function,
    /// enabling deterministic testing without process-global mutation.
    fn load_with_env(
        config_path: Option<&Path>,
        cli_args: &GenerateArgs,
        env_fn: fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let file_layer = match config_path {
            Some(path) => load_file_layer(path)?,
            None => ConfigLayer::default(),
        };
        let env_layer = load_env_layer(env_fn)?;
        let cli_layer = cli_layer_from(cli_args);

        let merged = merge_layers(file_layer, env_layer, cli_layer);

        let scores_path = merged.scores_path.ok_or_else(|| {
            anyhow::anyhow!(
                "scores_path is required (via --scores, LEADREP_SCORES_PATH, or config file)"
            )
        })?;
        let comments_path = merged.comments_path.ok_or_else(|| {
            anyhow::anyhow!(
                "comments_path is required (via --comments, LEADREP_COMMENTS_PATH, or config file)"
            )
        })?;

        // max_parallel = 0 forces sequential; a positive max_parallel alone
        // turns parallelism on.
        let parallel = match merged.max_parallel {
            Some(0) => false,
            Some(_) => merged.parallel.unwrap_or(true),
            None => merged.parallel.unwrap_or(false),
        };

        Ok(ReportConfig {
            api_key: merged.api_key.filter(|k| !k.trim().is_empty()),
            scores_path,
            comments_path,
            output_path: merged
                .output_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            model: merged.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            api_base_url: merged
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned()),
            timeout_sec: merged.timeout_sec.unwrap_or(DEFAULT_TIMEOUT_SEC),
            max_attempts: merged.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            base_delay_ms: merged.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS),
            parallel,
            max_parallel: merged.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL),
            on_duplicate_rows: merged
                .on_duplicate_rows
                .unwrap_or_else(|| DEFAULT_ON_DUPLICATE_ROWS.to_owned()),
            batch_deadline_sec: merged.batch_deadline_sec,
            template_path: merged.template_path,
            run_summary_path: merged.run_summary_path,
            log_level: merged.log_level,
            log_file: merged.log_file,
        })
    }
}

fn load_file_layer(path: &Path) -> anyhow::Result<ConfigLayer> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
    let fc: FileConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
    Ok(fc.into())
}

fn real_env_var(suffix: &str) -> Option<String> {
    let key = format!("{ENV_PREFIX}{suffix}");
    env::var(&key).ok().filter(|v| !v.is_empty())
}

fn load_env_layer(env_fn: fn(&str) -> Option<String>) -> Result<ConfigLayer, ReportError> {
    Ok(ConfigLayer {
        api_key: env_fn("API_KEY"),
        scores_path: env_fn("SCORES_PATH").map(PathBuf::from),
        comments_path: env_fn("COMMENTS_PATH").map(PathBuf::from),
        output_path: env_fn("OUTPUT_PATH").map(PathBuf::from),
        model: env_fn("MODEL"),
        api_base_url: env_fn("API_BASE_URL"),
        timeout_sec: parse_env(env_fn, "TIMEOUT_SEC")?,
        max_attempts: parse_env(env_fn, "MAX_ATTEMPTS")?,
        base_delay_ms: parse_env(env_fn, "BASE_DELAY_MS")?,
        parallel: parse_env(env_fn, "PARALLEL")?,
        max_parallel: parse_env(env_fn, "MAX_PARALLEL")?,
        on_duplicate_rows: env_fn("ON_DUPLICATE_ROWS"),
        batch_deadline_sec: parse_env(env_fn, "BATCH_DEADLINE_SEC")?,
        template_path: env_fn("TEMPLATE_PATH").map(PathBuf::from),
        run_summary_path: env_fn("RUN_SUMMARY_PATH").map(PathBuf::from),
        log_level: env_fn("LOG_LEVEL"),
        log_file: env_fn("LOG_FILE").map(PathBuf::from),
    })
}

fn parse_env<T>(env_fn: fn(&str) -> Option<String>, suffix: &str) -> Result<Option<T>, ReportError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env_fn(suffix) {
        Some(s) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ReportError::ConfigEnvParseError {
                var: format!("{ENV_PREFIX}{suffix}"),
                detail: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn cli_layer_from(args: &GenerateArgs) -> ConfigLayer {
    ConfigLayer {
        api_key: None,
        scores_path: args.scores.clone(),
        comments_path: args.comments.clone(),
        output_path: args.output.clone(),
        model: args.model.clone(),
        api_base_url: args.api_base_url.clone(),
        timeout_sec: args.timeout_sec,
        max_attempts: args.max_attempts,
        base_delay_ms: args.base_delay_ms,
        parallel: if args.parallel { Some(true) } else { None },
        max_parallel: args.max_parallel,
        on_duplicate_rows: args.on_duplicate_rows.clone(),
        batch_deadline_sec: args.batch_deadline_sec,
        template_path: args.template.clone(),
        run_summary_path: args.run_summary.clone(),
        log_level: args.log_level.clone(),
        log_file: args.log_file.clone(),
    }
}

/// Merge three layers. For each field, pick CLI first, then env, then file.
fn merge_layers(file: ConfigLayer, env: ConfigLayer, cli: ConfigLayer) -> ConfigLayer {
    ConfigLayer {
        api_key: cli.api_key.or(env.api_key).or(file.api_key),
        scores_path: cli.scores_path.or(env.scores_path).or(file.scores_path),
        comments_path: cli
            .comments_path
            .or(env.comments_path)
            .or(file.comments_path),
        output_path: cli.output_path.or(env.output_path).or(file.output_path),
        model: cli.model.or(env.model).or(file.model),
        api_base_url: cli.api_base_url.or(env.api_base_url).or(file.api_base_url),
        timeout_sec: cli.timeout_sec.or(env.timeout_sec).or(file.timeout_sec),
        max_attempts: cli.max_attempts.or(env.max_attempts).or(file.max_attempts),
        base_delay_ms: cli
            .base_delay_ms
            .or(env.base_delay_ms)
            .or(file.base_delay_ms),
        parallel: cli.parallel.or(env.parallel).or(file.parallel),
        max_parallel: cli.max_parallel.or(env.max_parallel).or(file.max_parallel),
        on_duplicate_rows: cli
            .on_duplicate_rows
            .or(env.on_duplicate_rows)
            .or(file.on_duplicate_rows),
        batch_deadline_sec: cli
            .batch_deadline_sec
            .or(env.batch_deadline_sec)
            .or(file.batch_deadline_sec),
        template_path: cli
            .template_path
            .or(env.template_path)
            .or(file.template_path),
        run_summary_path: cli
            .run_summary_path
            .or(env.run_summary_path)
            .or(file.run_summary_path),
        log_level: cli.log_level.or(env.log_level).or(file.log_level),
        log_file: cli.log_file.or(env.log_file).or(file.log_file),
    }
}
