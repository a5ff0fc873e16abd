//! Batch run: resolve every candidate, render, generate, collect.
//!
//! A `BatchRun` moves `Idle → Running → Completed` exactly once. Candidates
//! run sequentially by default; with `parallel` set, a bounded pool of
//! scoped worker threads pulls positions from a shared cursor and sends
//! results back to the calling thread, which alone fills the collector and
//! reports progress. Output order is first-appearance order either way.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::client::{self, GenerateError, ReportClient, Transport};
use crate::collector::{GeneratedReport, ReportBody, ReportCollector};
use crate::error::ReportError;
use crate::resolver::{CandidateBundle, Inputs};
use crate::template::{RenderError, Template};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub parallel: bool,
    /// Worker cap when `parallel` is set; 0 or 1 means sequential.
    pub max_parallel: usize,
    /// Candidates not started once this much time has passed get an error.
    pub deadline: Option<Duration>,
    /// Store rendered prompts instead of calling the API.
    pub dry_run: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_parallel: 4,
            deadline: None,
            dry_run: false,
        }
    }
}

impl BatchOptions {
    fn worker_count(&self, jobs: usize) -> usize {
        if self.parallel && self.max_parallel > 1 {
            self.max_parallel.min(jobs)
        } else {
            1
        }
    }
}

/// Reported after every finished candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress<'a> {
    pub completed: usize,
    pub total: usize,
    pub candidate: &'a str,
    pub failed: bool,
}

/// Why a candidate ended with an error string instead of a report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandidateError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("batch deadline exceeded before this candidate was processed")]
    DeadlineExceeded,
}

/// Per-candidate work shared by every worker.
struct Job<'a, T> {
    template: &'a Template,
    client: &'a ReportClient<T>,
    credential: &'a str,
    dry_run: bool,
    deadline_at: Option<Instant>,
    total: usize,
}

impl<T: Transport> Job<'_, T> {
    fn process(&self, position: usize, bundle: &CandidateBundle<'_>) -> ReportBody {
        let candidate = bundle.name();
        if self.deadline_at.is_some_and(|at| Instant::now() >= at) {
            warn!(candidate, position, "batch deadline passed; candidate not started");
            return ReportBody::Error(CandidateError::DeadlineExceeded.to_string());
        }

        info!(
            candidate,
            position = position + 1,
            total = self.total,
            "generating report"
        );
        let start = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.generate(bundle)))
            .unwrap_or_else(|payload| {
                Err(GenerateError::Unexpected(client::panic_message(&*payload)).into())
            });
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(text) => {
                info!(
                    candidate,
                    position = position + 1,
                    total = self.total,
                    duration_ms,
                    outcome = "ok",
                    "report generated"
                );
                ReportBody::Text(text)
            }
            Err(e) => {
                warn!(
                    candidate,
                    position = position + 1,
                    total = self.total,
                    duration_ms,
                    outcome = "error",
                    err = %e,
                    "report failed"
                );
                ReportBody::Error(e.to_string())
            }
        }
    }

    fn generate(&self, bundle: &CandidateBundle<'_>) -> Result<String, CandidateError> {
        let prompt = self.template.render(bundle)?;
        if self.dry_run {
            return Ok(prompt);
        }
        Ok(self.client.generate(&prompt, self.credential)?)
    }
}

pub struct BatchRun<'a, T> {
    inputs: &'a Inputs,
    template: &'a Template,
    client: &'a ReportClient<T>,
    options: BatchOptions,
    state: BatchState,
}

impl<'a, T: Transport> BatchRun<'a, T> {
    pub fn new(
        inputs: &'a Inputs,
        template: &'a Template,
        client: &'a ReportClient<T>,
        options: BatchOptions,
    ) -> Self {
        Self {
            inputs,
            template,
            client,
            options,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Run the batch once.
    ///
    /// A missing credential aborts before any candidate is touched and
    /// leaves the run `Idle`. Per-candidate failures never abort; they end
    /// up as error strings in the collector.
    pub fn run(
        &mut self,
        credential: Option<&str>,
        on_progress: &mut dyn FnMut(&Progress<'_>),
    ) -> Result<ReportCollector, ReportError> {
        if self.state != BatchState::Idle {
            return Err(ReportError::BatchAlreadyRun);
        }
        let credential = credential.map(str::trim).unwrap_or_default();
        if credential.is_empty() && !self.options.dry_run {
            return Err(ReportError::MissingCredential);
        }

        self.state = BatchState::Running;
        let started = Instant::now();

        let resolution = self.inputs.resolve();
        let bundles = resolution.bundles;
        let total = bundles.len();
        for name in &resolution.skipped {
            warn!(candidate = %name, "missing Strength or Development Area comments; skipped");
        }

        let workers = self.options.worker_count(total);
        info!(
            candidates = self.inputs.candidate_count(),
            to_process = total,
            skipped = resolution.skipped.len(),
            workers,
            dry_run = self.options.dry_run,
            "batch started"
        );

        let job = Job {
            template: self.template,
            client: self.client,
            credential,
            dry_run: self.options.dry_run,
            deadline_at: self.options.deadline.map(|d| started + d),
            total,
        };
        let mut collector = ReportCollector::new(total, resolution.skipped);
        let mut completed = 0;
        let mut record = |position: usize, body: ReportBody| {
            let name = bundles[position].name();
            completed += 1;
            on_progress(&Progress {
                completed,
                total,
                candidate: name,
                failed: body.is_error(),
            });
            collector.insert(
                position,
                GeneratedReport {
                    name: name.to_owned(),
                    body,
                },
            );
        };

        if workers <= 1 {
            for (position, bundle) in bundles.iter().enumerate() {
                record(position, job.process(position, bundle));
            }
        } else {
            let cursor = AtomicUsize::new(0);
            let (tx, rx) = mpsc::channel::<(usize, ReportBody)>();
            thread::scope(|scope| {
                for _ in 0..workers {
                    let tx = tx.clone();
                    let (cursor, job, bundles) = (&cursor, &job, &bundles);
                    scope.spawn(move || {
                        loop {
                            let position = cursor.fetch_add(1, Ordering::SeqCst);
                            let Some(bundle) = bundles.get(position) else {
                                break;
                            };
                            if tx.send((position, job.process(position, bundle))).is_err() {
                                break;
                            }
                        }
                    });
                }
                drop(tx);
                for (position, body) in rx {
                    record(position, body);
                }
            });
        }

        self.state = BatchState::Completed;
        info!(
            generated = collector.len(),
            failed = collector.failed_names().len(),
            skipped = collector.skipped().len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "batch complete"
        );
        Ok(collector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{GenerateRequest, RetryPolicy, TransportError};
    use crate::records::{CommentKind, CommentRecord, Level, ScoreRecord};
    use crate::resolver::DuplicatePolicy;
    use crate::table::Table;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers with "Report for <first name>" after a per-name latency.
    struct EchoTransport {
        latency: fn(&str) -> Duration,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl EchoTransport {
        fn new(latency: fn(&str) -> Duration) -> Self {
            Self {
                latency,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// The substituted candidate name. The master template's worked examples
    /// also contain `First Name: `, so take the last occurrence.
    fn first_name(prompt: &str) -> String {
        prompt
            .rsplit("First Name: ")
            .next()
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default()
            .to_owned()
    }

    impl Transport for EchoTransport {
        fn send(&self, request: &GenerateRequest, _: &str) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = first_name(request.prompt());
            thread::sleep((self.latency)(&name));
            self.seen.lock().unwrap().push(name.clone());
            let body = serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": format!("Report for {name}")}]}}]
            });
            Ok(body.to_string())
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn send(&self, _: &GenerateRequest, _: &str) -> Result<String, TransportError> {
            Err(TransportError::Status {
                status: 503,
                body: "overloaded".to_owned(),
            })
        }
    }

    fn no_latency(_: &str) -> Duration {
        Duration::ZERO
    }

    fn client<T: Transport>(transport: T) -> ReportClient<T> {
        ReportClient::new(
            transport,
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    fn score(name: &str, row: usize) -> ScoreRecord {
        ScoreRecord {
            name: name.to_owned(),
            gender: Some("Female".to_owned()),
            level: Some(Level::Guide),
            overall: Some(2.97),
            scores: [Some(3.0), Some(3.2), Some(2.4), Some(3.4), Some(3.9), Some(2.9)],
            row,
        }
    }

    fn comment(name: &str, kind: CommentKind, row: usize) -> CommentRecord {
        CommentRecord {
            name: name.to_owned(),
            kind,
            comments: std::array::from_fn(|i| Some(format!("{} comment {i}", kind.label()))),
            row,
        }
    }

    fn inputs_for(complete: &[&str], missing_dev: &[&str]) -> Inputs {
        let mut scores = Vec::new();
        let mut comments = Vec::new();
        for (i, name) in complete.iter().chain(missing_dev).enumerate() {
            scores.push(score(name, i + 2));
            comments.push(comment(name, CommentKind::Strength, 2 * i + 2));
            if complete.contains(name) {
                comments.push(comment(name, CommentKind::DevelopmentArea, 2 * i + 3));
            }
        }
        Inputs::from_records(
            scores,
            Path::new("scores.xlsx"),
            comments,
            Path::new("comments.xlsx"),
            DuplicatePolicy::Reject,
        )
        .unwrap()
    }

    fn names(collector: &ReportCollector) -> Vec<String> {
        collector.reports().map(|r| r.name.clone()).collect()
    }

    #[test]
    fn end_to_end_skips_incomplete_candidate() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs_for(&["Ayesha"], &["Ali"]);
        let template = Template::master().unwrap();
        let transport = EchoTransport::new(no_latency);
        let client = client(&transport);
        let mut run = BatchRun::new(&inputs, &template, &client, BatchOptions::default());

        let collector = run.run(Some("key"), &mut |_| {}).unwrap();

        assert_eq!(names(&collector), vec!["Ayesha".to_owned()]);
        assert_eq!(collector.skipped(), ["Ali".to_owned()]);
        assert_eq!(transport.calls(), 1);

        let out = dir.path().join("summaries.csv");
        collector.write(&out).unwrap();
        let table = Table::load(&out).unwrap();
        assert_eq!(table.len(), 1);
        let (_, row) = table.rows().next().unwrap();
        assert_eq!(row[0].as_text().as_deref(), Some("Ayesha"));
        assert_eq!(row[1].as_text().as_deref(), Some("Report for Ayesha"));
    }

    #[test]
    fn concurrent_run_keeps_first_appearance_order() {
        let order = ["C0", "C1", "C2", "C3", "C4", "C5"];
        let inputs = inputs_for(&order, &[]);
        let template = Template::master().unwrap();
        // Earlier candidates take longest, so completion order is reversed.
        let transport = EchoTransport::new(|name| {
            let i: u64 = name[1..].parse().unwrap_or(0);
            Duration::from_millis((6 - i) * 20)
        });
        let client = client(&transport);
        let options = BatchOptions {
            parallel: true,
            max_parallel: 6,
            ..BatchOptions::default()
        };
        let mut run = BatchRun::new(&inputs, &template, &client, options);

        let mut progress = Vec::new();
        let collector = run
            .run(Some("key"), &mut |p| progress.push((p.completed, p.candidate.to_owned())))
            .unwrap();

        let expected: Vec<String> = order.iter().map(|s| s.to_string()).collect();
        assert_eq!(names(&collector), expected);
        for report in collector.reports() {
            assert_eq!(report.body, ReportBody::Text(format!("Report for {}", report.name)));
        }

        let counts: Vec<usize> = progress.iter().map(|(c, _)| *c).collect();
        assert_eq!(counts, (1..=6).collect::<Vec<_>>());
        let seen = transport.seen.lock().unwrap().clone();
        let mut distinct = seen.clone();
        distinct.sort();
        assert_eq!(distinct, expected, "each request carries its own candidate");
        assert_ne!(seen, expected, "requests should have completed out of order");
    }

    #[test]
    fn missing_credential_aborts_before_any_call() {
        let inputs = inputs_for(&["Ayesha"], &[]);
        let template = Template::master().unwrap();
        let transport = EchoTransport::new(no_latency);
        let client = client(&transport);
        let mut run = BatchRun::new(&inputs, &template, &client, BatchOptions::default());

        for credential in [None, Some(""), Some("  ")] {
            let err = run.run(credential, &mut |_| {}).unwrap_err();
            assert!(matches!(err, ReportError::MissingCredential), "got: {err:?}");
        }
        assert_eq!(run.state(), BatchState::Idle);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn batch_runs_only_once() {
        let inputs = inputs_for(&["Ayesha"], &[]);
        let template = Template::master().unwrap();
        let transport = EchoTransport::new(no_latency);
        let client = client(&transport);
        let mut run = BatchRun::new(&inputs, &template, &client, BatchOptions::default());
        assert_eq!(run.state(), BatchState::Idle);

        run.run(Some("key"), &mut |_| {}).unwrap();
        assert_eq!(run.state(), BatchState::Completed);

        let err = run.run(Some("key"), &mut |_| {}).unwrap_err();
        assert!(matches!(err, ReportError::BatchAlreadyRun));
    }

    #[test]
    fn transport_failures_become_error_rows() {
        let inputs = inputs_for(&["Ayesha", "Ali"], &[]);
        let template = Template::master().unwrap();
        let client = client(FailingTransport);
        let mut run = BatchRun::new(&inputs, &template, &client, BatchOptions::default());

        let mut failed = Vec::new();
        let collector = run
            .run(Some("key"), &mut |p| failed.push(p.failed))
            .unwrap();

        assert_eq!(failed, vec![true, true]);
        assert_eq!(collector.failed_names(), vec!["Ayesha".to_owned(), "Ali".to_owned()]);
        let summary = collector.reports().next().unwrap().body.summary();
        assert!(summary.starts_with("Error: API request failed after 1 attempt(s)"), "got: {summary}");
        assert!(summary.contains("HTTP 503"), "got: {summary}");
    }

    #[test]
    fn missing_field_is_a_per_candidate_error() {
        let mut scores = vec![score("Ayesha", 2), score("Ali", 3)];
        scores[0].gender = None;
        let comments = vec![
            comment("Ayesha", CommentKind::Strength, 2),
            comment("Ayesha", CommentKind::DevelopmentArea, 3),
            comment("Ali", CommentKind::Strength, 4),
            comment("Ali", CommentKind::DevelopmentArea, 5),
        ];
        let inputs = Inputs::from_records(
            scores,
            Path::new("scores.xlsx"),
            comments,
            Path::new("comments.xlsx"),
            DuplicatePolicy::Reject,
        )
        .unwrap();
        let template = Template::master().unwrap();
        let transport = EchoTransport::new(no_latency);
        let client = client(&transport);
        let mut run = BatchRun::new(&inputs, &template, &client, BatchOptions::default());

        let collector = run.run(Some("key"), &mut |_| {}).unwrap();
        let bodies: Vec<&ReportBody> = collector.reports().map(|r| &r.body).collect();
        assert_eq!(
            bodies[0],
            &ReportBody::Error("missing field 'gender' for candidate 'Ayesha'".to_owned())
        );
        assert_eq!(bodies[1], &ReportBody::Text("Report for Ali".to_owned()));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn dry_run_stores_prompts_without_credential() {
        let inputs = inputs_for(&["Ayesha"], &[]);
        let template = Template::master().unwrap();
        let transport = EchoTransport::new(no_latency);
        let client = client(&transport);
        let options = BatchOptions {
            dry_run: true,
            ..BatchOptions::default()
        };
        let mut run = BatchRun::new(&inputs, &template, &client, options);

        let collector = run.run(None, &mut |_| {}).unwrap();
        let report = collector.reports().next().unwrap();
        match &report.body {
            ReportBody::Text(prompt) => assert!(prompt.contains("First Name: Ayesha")),
            other => panic!("expected rendered prompt, got {other:?}"),
        }
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn elapsed_deadline_marks_unstarted_candidates() {
        let inputs = inputs_for(&["Ayesha", "Ali"], &[]);
        let template = Template::master().unwrap();
        let transport = EchoTransport::new(no_latency);
        let client = client(&transport);
        let options = BatchOptions {
            deadline: Some(Duration::ZERO),
            ..BatchOptions::default()
        };
        let mut run = BatchRun::new(&inputs, &template, &client, options);

        let collector = run.run(Some("key"), &mut |_| {}).unwrap();
        assert_eq!(collector.len(), 2);
        for report in collector.reports() {
            assert_eq!(
                report.body.summary(),
                "Error: batch deadline exceeded before this candidate was processed"
            );
        }
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn worker_count_respects_options() {
        let sequential = BatchOptions::default();
        assert_eq!(sequential.worker_count(10), 1);

        let parallel = BatchOptions {
            parallel: true,
            max_parallel: 4,
            ..BatchOptions::default()
        };
        assert_eq!(parallel.worker_count(10), 4);
        assert_eq!(parallel.worker_count(2), 2);

        let forced = BatchOptions {
            parallel: true,
            max_parallel: 0,
            ..BatchOptions::default()
        };
        assert_eq!(forced.worker_count(10), 1);
    }
}
