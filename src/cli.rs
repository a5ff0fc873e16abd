use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::samples::SampleFormat;

/// leadrep: leadership potential report generator.
///
/// Joins a scores sheet with assessor comments, renders one prompt per
/// candidate and collects the generated summaries into a single table.
#[derive(Debug, Parser)]
#[command(name = "leadrep", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a summary for every candidate and write the output table.
    Generate(GenerateArgs),

    /// Write the sample scores and comments files.
    Templates(TemplatesArgs),

    /// Print the built-in report prompt template.
    Prompt(PromptArgs),
}

/// Arguments for the `prompt` subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct PromptArgs {
    /// Write the template to this file instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the `templates` subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct TemplatesArgs {
    /// Directory to write `sample_scores.*` and `sample_comments.*` into.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    #[arg(long, value_enum, default_value_t = SampleFormat::Xlsx)]
    pub format: SampleFormat,
}

/// Arguments for the `generate` subcommand.
///
/// Every setting except `--config` and `--dry-run` can also come from the
/// config file or `LEADREP_*` env vars. Precedence: CLI > env > file.
/// The API key is read from `LEADREP_API_KEY` or the config file only.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct GenerateArgs {
    /// Scores sheet (.xlsx, .xls, .ods or .csv).
    #[arg(long)]
    pub scores: Option<PathBuf>,

    /// Assessor comments sheet.
    #[arg(long)]
    pub comments: Option<PathBuf>,

    /// Output table (default: all_candidate_summaries.xlsx).
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Model identifier (default: gemini-2.5-pro).
    #[arg(long)]
    pub model: Option<String>,

    /// API base URL, without the `/v1beta/...` path.
    #[arg(long)]
    pub api_base_url: Option<String>,

    /// Per-attempt request timeout in seconds (default: 120).
    #[arg(long)]
    pub timeout_sec: Option<u64>,

    /// Attempts per candidate, including the first (default: 5).
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Backoff base in milliseconds; attempt n waits base * 2^n (default: 1000).
    #[arg(long)]
    pub base_delay_ms: Option<u64>,

    /// Process candidates concurrently.
    #[arg(long, default_value_t = false)]
    pub parallel: bool,

    /// Maximum concurrent requests (default: 4; 0 disables parallelism).
    #[arg(long)]
    pub max_parallel: Option<u32>,

    /// "reject" (default) aborts on duplicate rows; "first" keeps the first.
    #[arg(long)]
    pub on_duplicate_rows: Option<String>,

    /// Stop starting new candidates after this many seconds.
    #[arg(long)]
    pub batch_deadline_sec: Option<u64>,

    /// Custom prompt template file; uses the built-in template when omitted.
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Write a JSON run summary to this path.
    #[arg(long)]
    pub run_summary: Option<PathBuf>,

    /// Log level filter (default: "info"). Supports tracing directives
    /// (e.g. "debug", "leadrep=trace,warn"). Overridden by LEADREP_LOG.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Append structured JSON logs to this file as well as stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Render prompts into the output instead of calling the API.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn generate_parses_input_paths() {
        let cli = Cli::try_parse_from([
            "leadrep",
            "generate",
            "--scores",
            "scores.xlsx",
            "--comments",
            "comments.xlsx",
        ])
        .expect("should parse valid args");

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.scores, Some(PathBuf::from("scores.xlsx")));
                assert_eq!(args.comments, Some(PathBuf::from("comments.xlsx")));
                assert!(!args.dry_run);
                assert!(!args.parallel);
            }
            _ => unreachable!("test uses generate subcommand"),
        }
    }

    #[test]
    fn generate_accepts_no_inputs() {
        let cli = Cli::try_parse_from(["leadrep", "generate"])
            .expect("inputs may come from config instead");

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.scores, None);
                assert_eq!(args.comments, None);
            }
            _ => unreachable!("test uses generate subcommand"),
        }
    }

    #[test]
    fn generate_parses_all_optional_flags() {
        let cli = Cli::try_parse_from([
            "leadrep",
            "generate",
            "--scores",
            "s.csv",
            "--comments",
            "c.csv",
            "--output",
            "out/summaries.xlsx",
            "--config",
            "leadrep.toml",
            "--model",
            "gemini-2.5-flash",
            "--api-base-url",
            "http://localhost:8080",
            "--timeout-sec",
            "30",
            "--max-attempts",
            "3",
            "--base-delay-ms",
            "250",
            "--parallel",
            "--max-parallel",
            "8",
            "--on-duplicate-rows",
            "first",
            "--batch-deadline-sec",
            "900",
            "--template",
            "prompt.txt",
            "--run-summary",
            "run_summary.json",
            "--log-level",
            "debug",
            "--log-file",
            "leadrep.jsonl",
            "--dry-run",
        ])
        .expect("should parse all flags");

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.output, Some(PathBuf::from("out/summaries.xlsx")));
                assert_eq!(args.config, Some(PathBuf::from("leadrep.toml")));
                assert_eq!(args.model.as_deref(), Some("gemini-2.5-flash"));
                assert_eq!(args.api_base_url.as_deref(), Some("http://localhost:8080"));
                assert_eq!(args.timeout_sec, Some(30));
                assert_eq!(args.max_attempts, Some(3));
                assert_eq!(args.base_delay_ms, Some(250));
                assert!(args.parallel);
                assert_eq!(args.max_parallel, Some(8));
                assert_eq!(args.on_duplicate_rows.as_deref(), Some("first"));
                assert_eq!(args.batch_deadline_sec, Some(900));
                assert_eq!(args.template, Some(PathBuf::from("prompt.txt")));
                assert_eq!(args.run_summary, Some(PathBuf::from("run_summary.json")));
                assert_eq!(args.log_level.as_deref(), Some("debug"));
                assert_eq!(args.log_file, Some(PathBuf::from("leadrep.jsonl")));
                assert!(args.dry_run);
            }
            _ => unreachable!("test uses generate subcommand"),
        }
    }

    #[test]
    fn api_key_is_not_a_flag() {
        let result = Cli::try_parse_from(["leadrep", "generate", "--api-key", "secret"]);
        let err = result.expect_err("api key must not be accepted on the command line");
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn templates_defaults_to_xlsx_in_current_dir() {
        let cli = Cli::try_parse_from(["leadrep", "templates"]).expect("should parse");
        match cli.command {
            Commands::Templates(args) => {
                assert_eq!(args.dir, PathBuf::from("."));
                assert_eq!(args.format, SampleFormat::Xlsx);
            }
            _ => panic!("expected Templates subcommand"),
        }
    }

    #[test]
    fn templates_accepts_csv_format() {
        let cli = Cli::try_parse_from(["leadrep", "templates", "--dir", "samples", "--format", "csv"])
            .expect("should parse");
        match cli.command {
            Commands::Templates(args) => {
                assert_eq!(args.dir, PathBuf::from("samples"));
                assert_eq!(args.format, SampleFormat::Csv);
            }
            _ => panic!("expected Templates subcommand"),
        }
    }

    #[test]
    fn templates_rejects_unknown_format() {
        let result = Cli::try_parse_from(["leadrep", "templates", "--format", "ods"]);
        let err = result.expect_err("ods is not a sample format");
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn prompt_parses_with_and_without_output() {
        let cli = Cli::try_parse_from(["leadrep", "prompt"]).expect("should parse");
        match cli.command {
            Commands::Prompt(args) => assert_eq!(args.output, None),
            _ => panic!("expected Prompt subcommand"),
        }

        let cli = Cli::try_parse_from(["leadrep", "prompt", "--output", "prompt.txt"])
            .expect("should parse");
        match cli.command {
            Commands::Prompt(args) => assert_eq!(args.output, Some(PathBuf::from("prompt.txt"))),
            _ => panic!("expected Prompt subcommand"),
        }
    }

    #[test]
    fn no_subcommand_shows_error() {
        let err = Cli::try_parse_from(["leadrep"]).expect_err("should fail without subcommand");
        assert_eq!(
            err.kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn unknown_subcommand_rejected() {
        let err = Cli::try_parse_from(["leadrep", "run"]).expect_err("should reject");
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }
}
