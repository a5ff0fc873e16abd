//! Candidate resolver: joins score rows with their two comment rows.
//!
//! Both sheets are indexed once per batch. A candidate whose Strength or
//! Development Area row is missing, or whose score row is ambiguous, is
//! skipped, never aborting the batch.

use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use crate::error::ReportError;
use crate::records::{self, CommentKind, CommentRecord, ScoreRecord};
use crate::table::Table;

/// What to do when a key (candidate name, or name + comment kind) appears twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Duplicate comment rows abort the batch with a `DuplicateRow` error.
    /// A candidate with more than one score row is skipped.
    #[default]
    Reject,
    /// Keep the first row, log a warning for the rest.
    First,
}

impl FromStr for DuplicatePolicy {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(DuplicatePolicy::Reject),
            "first" => Ok(DuplicatePolicy::First),
            other => Err(ReportError::InvalidDuplicatePolicy {
                value: other.to_owned(),
            }),
        }
    }
}

/// The joined per-candidate record a prompt is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct CandidateBundle<'a> {
    pub score: &'a ScoreRecord,
    pub strength: &'a CommentRecord,
    pub development: &'a CommentRecord,
}

impl CandidateBundle<'_> {
    pub fn name(&self) -> &str {
        &self.score.name
    }
}

/// Comment rows keyed by `(candidate name, kind)`.
#[derive(Debug, Default)]
pub struct CommentIndex {
    by_key: HashMap<(String, CommentKind), CommentRecord>,
}

impl CommentIndex {
    pub fn build(
        records: Vec<CommentRecord>,
        policy: DuplicatePolicy,
        path: &Path,
    ) -> Result<Self, ReportError> {
        let mut by_key = HashMap::with_capacity(records.len());
        for record in records {
            match by_key.entry((record.name.clone(), record.kind)) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(existing) => {
                    let key = format!("{} / {}", record.name, record.kind.label());
                    on_duplicate(policy, path, key, existing.get().row, record.row)?;
                }
            }
        }
        Ok(Self { by_key })
    }

    pub fn get(&self, name: &str, kind: CommentKind) -> Option<&CommentRecord> {
        self.by_key.get(&(name.to_owned(), kind))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

fn on_duplicate(
    policy: DuplicatePolicy,
    path: &Path,
    key: String,
    first_row: usize,
    second_row: usize,
) -> Result<(), ReportError> {
    match policy {
        DuplicatePolicy::Reject => Err(ReportError::DuplicateRow {
            path: path.to_path_buf(),
            key,
            first_row,
            second_row,
        }),
        DuplicatePolicy::First => {
            warn!(
                path = %path.display(),
                key = %key,
                kept_row = first_row,
                ignored_row = second_row,
                "duplicate row ignored; keeping the first"
            );
            Ok(())
        }
    }
}

/// Result of resolving every candidate: bundles in first-appearance order
/// plus the names that could not be bundled.
#[derive(Debug)]
pub struct Resolution<'a> {
    pub bundles: Vec<CandidateBundle<'a>>,
    pub skipped: Vec<String>,
}

/// Both input sheets, parsed and indexed.
#[derive(Debug)]
pub struct Inputs {
    scores: Vec<ScoreRecord>,
    comments: CommentIndex,
    /// Names with more than one score row under [`DuplicatePolicy::Reject`].
    ambiguous: HashSet<String>,
}

impl Inputs {
    /// Load and index both sheets. Any malformed input aborts here, before
    /// a single candidate is processed.
    pub fn load(
        scores_path: &Path,
        comments_path: &Path,
        policy: DuplicatePolicy,
    ) -> Result<Self, ReportError> {
        let scores_table = Table::load(scores_path)?;
        let comments_table = Table::load(comments_path)?;
        let scores = records::scores_from_table(&scores_table)?;
        let comments = records::comments_from_table(&comments_table)?;
        Self::from_records(scores, scores_path, comments, comments_path, policy)
    }

    pub fn from_records(
        scores: Vec<ScoreRecord>,
        scores_path: &Path,
        comments: Vec<CommentRecord>,
        comments_path: &Path,
        policy: DuplicatePolicy,
    ) -> Result<Self, ReportError> {
        let mut seen: HashMap<String, usize> = HashMap::with_capacity(scores.len());
        let mut unique = Vec::with_capacity(scores.len());
        let mut ambiguous = HashSet::new();
        for record in scores {
            match seen.entry(record.name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record.row);
                    unique.push(record);
                }
                Entry::Occupied(first) => match policy {
                    DuplicatePolicy::Reject => {
                        warn!(
                            path = %scores_path.display(),
                            candidate = %record.name,
                            first_row = *first.get(),
                            duplicate_row = record.row,
                            "candidate has more than one score row; skipping"
                        );
                        ambiguous.insert(record.name);
                    }
                    DuplicatePolicy::First => {
                        on_duplicate(policy, scores_path, record.name, *first.get(), record.row)?;
                    }
                },
            }
        }

        Ok(Self {
            scores: unique,
            comments: CommentIndex::build(comments, policy, comments_path)?,
            ambiguous,
        })
    }

    /// Distinct candidate names, in first-appearance order of the scores sheet.
    pub fn candidate_names(&self) -> impl Iterator<Item = &str> {
        self.scores.iter().map(|s| s.name.as_str())
    }

    pub fn candidate_count(&self) -> usize {
        self.scores.len()
    }

    pub fn comments(&self) -> &CommentIndex {
        &self.comments
    }

    /// Try to bundle every candidate.
    pub fn resolve(&self) -> Resolution<'_> {
        let mut bundles = Vec::with_capacity(self.scores.len());
        let mut skipped = Vec::new();

        for score in &self.scores {
            if self.ambiguous.contains(&score.name) {
                skipped.push(score.name.clone());
                continue;
            }
            let strength = self.comments.get(&score.name, CommentKind::Strength);
            let development = self.comments.get(&score.name, CommentKind::DevelopmentArea);
            match (strength, development) {
                (Some(strength), Some(development)) => bundles.push(CandidateBundle {
                    score,
                    strength,
                    development,
                }),
                _ => skipped.push(score.name.clone()),
            }
        }

        Resolution { bundles, skipped }
    }
}
