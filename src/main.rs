use std::fs;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use leadrep::batch::BatchRun;
use leadrep::cli::{Cli, Commands, GenerateArgs, PromptArgs, TemplatesArgs};
use leadrep::client::{HttpTransport, ReportClient};
use leadrep::config::ReportConfig;
use leadrep::resolver::Inputs;
use leadrep::run_summary;
use leadrep::samples;
use leadrep::template::{MASTER_TEMPLATE, Template};

/// Every candidate got a generated report.
const EXIT_OK: u8 = 0;
/// Batch completed, but some candidates were skipped or got an error string.
const EXIT_INCOMPLETE: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Commands::Generate(args) => generate(&args),
        Commands::Templates(args) => templates(&args),
        Commands::Prompt(args) => prompt(&args),
    }
}

fn generate(args: &GenerateArgs) -> anyhow::Result<u8> {
    let config = ReportConfig::load(args.config.as_deref(), args)?;

    leadrep::logging::init(config.log_level.as_deref(), config.log_file.as_deref())?;

    config.validate()?;

    info!(
        scores = %config.scores_path.display(),
        comments = %config.comments_path.display(),
        output = %config.output_path.display(),
        model = %config.model,
        parallel = config.parallel,
        max_parallel = config.max_parallel,
        max_attempts = config.max_attempts,
        timeout_sec = config.timeout_sec,
        dry_run = args.dry_run,
        "config loaded"
    );

    let template = match &config.template_path {
        Some(path) => Template::load(path)?,
        None => Template::master()?,
    };

    let inputs = Inputs::load(
        &config.scores_path,
        &config.comments_path,
        config.duplicate_policy()?,
    )?;
    info!(
        candidates = inputs.candidate_count(),
        comment_rows = inputs.comments().len(),
        "inputs loaded"
    );

    let transport =
        HttpTransport::new(&config.api_base_url, &config.model, config.request_timeout())?;
    let client = ReportClient::new(transport, config.retry_policy());
    let mut batch = BatchRun::new(&inputs, &template, &client, config.batch_options(args.dry_run));

    let collector = batch.run(config.api_key.as_deref(), &mut |p| {
        info!(
            completed = p.completed,
            total = p.total,
            candidate = p.candidate,
            failed = p.failed,
            "progress {}/{}",
            p.completed,
            p.total
        );
    })?;

    collector
        .write(&config.output_path)
        .context("failed to write output table")?;

    if !collector.skipped().is_empty() {
        warn!(
            skipped = %collector.skipped().join(", "),
            "candidates skipped because a Strength or Development Area comment row is missing"
        );
    }
    let failed = collector.failed_names();
    if !failed.is_empty() {
        warn!(failed = %failed.join(", "), "some reports could not be generated");
    }

    let exit_code = if failed.is_empty() && collector.skipped().is_empty() {
        EXIT_OK
    } else {
        EXIT_INCOMPLETE
    };

    info!(
        output = %config.output_path.display(),
        rows = collector.len(),
        failed = failed.len(),
        skipped = collector.skipped().len(),
        exit_code,
        "output written"
    );

    if let Some(path) = &config.run_summary_path {
        let summary = run_summary::build_summary(
            &collector,
            inputs.candidate_count(),
            &config,
            args.dry_run,
            exit_code,
        );
        run_summary::write_run_summary(&summary, path);
    }

    Ok(exit_code)
}

fn templates(args: &TemplatesArgs) -> anyhow::Result<u8> {
    leadrep::logging::init(None, None)?;

    let paths = samples::write_samples(&args.dir, args.format)?;
    info!(
        scores = %paths.scores.display(),
        comments = %paths.comments.display(),
        "sample files written"
    );
    println!("{}", paths.scores.display());
    println!("{}", paths.comments.display());
    Ok(EXIT_OK)
}

fn prompt(args: &PromptArgs) -> anyhow::Result<u8> {
    match &args.output {
        Some(path) => fs::write(path, MASTER_TEMPLATE)
            .with_context(|| format!("failed to write prompt template to {}", path.display()))?,
        None => print!("{MASTER_TEMPLATE}"),
    }
    Ok(EXIT_OK)
}
