//! Example input files: three candidates' scores and comment rows for two
//! of them, so a batch over the samples also shows the skip path.

use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::records::{
    COMMENT_TYPE_COLUMN, CommentKind, Competency, GENDER_COLUMN, LEVEL_COLUMN, NAME_COLUMN,
    OVERALL_COLUMN,
};
use crate::table::{self, Cell};

pub const SCORES_SHEET: &str = "Scores";
pub const COMMENTS_SHEET: &str = "Comments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SampleFormat {
    #[default]
    Xlsx,
    Csv,
}

impl SampleFormat {
    fn extension(self) -> &'static str {
        match self {
            SampleFormat::Xlsx => "xlsx",
            SampleFormat::Csv => "csv",
        }
    }
}

struct SampleScores {
    name: &'static str,
    gender: &'static str,
    level: &'static str,
    overall: f64,
    scores: [f64; 6],
}

struct SampleComments {
    name: &'static str,
    kind: CommentKind,
    comments: [&'static str; 6],
}

const SCORES: [SampleScores; 3] = [
    SampleScores {
        name: "Ayesha",
        gender: "Female",
        level: "Guide",
        overall: 2.97,
        scores: [3.0, 3.2, 2.4, 3.4, 3.9, 2.9],
    },
    SampleScores {
        name: "Ali",
        gender: "Male",
        level: "Apply",
        overall: 2.55,
        scores: [1.9, 2.6, 2.4, 2.5, 1.7, 2.8],
    },
    SampleScores {
        name: "Badreyah",
        gender: "Female",
        level: "Apply",
        overall: 3.66,
        scores: [3.9, 4.2, 4.2, 3.9, 3.9, 4.3],
    },
];

const COMMENTS: [SampleComments; 4] = [
    SampleComments {
        name: "Ayesha",
        kind: CommentKind::Strength,
        comments: [
            "The candidate demonstrates a committed approach to maintaining consistent performance for themselves and their team across projects.",
            "The candidate demonstrates the ability to support their team through valuable contributions that aid in the development of team members.",
            "The candidate demonstrates effective strategies for identifying relationships that can support the achievement of their individual objectives.",
            "The candidate demonstrates a solid understanding of both short-term and long-term strategic approaches to projects.",
            "The candidate demonstrates strong ability to identify issues proactively and develop effective, logical solutions.",
            "The candidate demonstrates confidence in navigating periods of change and serves as a role model, creating a positive attitude during change initiatives.",
        ],
    },
    SampleComments {
        name: "Ayesha",
        kind: CommentKind::DevelopmentArea,
        comments: [
            "The candidate would benefit from developing strategies to effectively allocate resources to address the varying priorities within the workload.",
            "The candidate would benefit from effectively resolving conflicts within the team to maintain cohesion and a positive working environment.",
            "The candidate would benefit from ensuring that the mutual objectives of relevant stakeholders are aligned and supported, to secure buy-in and sustain long-lasting relationships.",
            "The candidate would benefit from proactively anticipating external industry changes and adjusting plans accordingly to stay ahead of emerging trends.",
            "The candidate would benefit from offering reassurance to team members during challenges and promoting resilience within the team.",
            "The candidate would benefit from proactively seeking to understand the underlying reasons for change, to better sustain team motivation and engagement throughout the change process.",
        ],
    },
    SampleComments {
        name: "Ali",
        kind: CommentKind::Strength,
        comments: [
            "The candidate demonstrates some ability to monitor their performance daily, which can support goal achievement",
            "The candidate demonstrates reasonable confidence in collaborating effectively with others to achieve team objectives.",
            "The candidate demonstrates a solid ability to build relationships with key stakeholders within their environment.",
            "The candidate demonstrates moderate awareness of risk factors that could delay project work and proactively seeks support to develop contingency plans.",
            "The candidate demonstrates initiative in addressing project challenges and effectively raises issues with relevant stakeholders",
            "The candidate evidenced being able to effectively navigate ambiguous situations by adapting to task changes.",
        ],
    },
    SampleComments {
        name: "Ali",
        kind: CommentKind::DevelopmentArea,
        comments: [
            "The candidate provided limited evidence of exceeding goals and would benefit from developing strategies to consistently perform at or above higher-than-expected levels.",
            "The candidate would benefit from developing skills to manage disagreements within the team more effectively, ensuring that conflicts do not hinder project progress.",
            "To strengthen this area, the candidate should allocate additional time to understand the interests and priorities of other stakeholders, to help create win-win situations.",
            "The candidate should work on effectively proposing strategic recommendations that support team growth and long-term success.",
            "The candidate should work on maintaining composure when faced with significant setbacks, to prevent becoming overwhelmed and to better manage challenges.",
            "The candidate would benefit by following up on actions to ensure change efforts are successful.",
        ],
    },
];

/// Paths written by [`write_samples`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePaths {
    pub scores: PathBuf,
    pub comments: PathBuf,
}

/// Write `sample_scores.<ext>` and `sample_comments.<ext>` into `dir`.
pub fn write_samples(dir: &Path, format: SampleFormat) -> Result<SamplePaths, ReportError> {
    let ext = format.extension();
    let paths = SamplePaths {
        scores: dir.join(format!("sample_scores.{ext}")),
        comments: dir.join(format!("sample_comments.{ext}")),
    };

    let mut score_headers = vec![NAME_COLUMN, GENDER_COLUMN, LEVEL_COLUMN, OVERALL_COLUMN];
    score_headers.extend(Competency::ALL.map(Competency::header));
    let score_rows: Vec<Vec<Cell>> = SCORES
        .iter()
        .map(|s| {
            let mut row = vec![
                Cell::text(s.name),
                Cell::text(s.gender),
                Cell::text(s.level),
                Cell::Number(s.overall),
            ];
            row.extend(s.scores.map(Cell::Number));
            row
        })
        .collect();
    table::write_table(&paths.scores, SCORES_SHEET, &score_headers, &score_rows)?;

    let mut comment_headers = vec![NAME_COLUMN, COMMENT_TYPE_COLUMN];
    comment_headers.extend(Competency::ALL.map(Competency::header));
    let comment_rows: Vec<Vec<Cell>> = COMMENTS
        .iter()
        .map(|c| {
            let mut row = vec![Cell::text(c.name), Cell::text(c.kind.label())];
            row.extend(c.comments.map(Cell::text));
            row
        })
        .collect();
    table::write_table(&paths.comments, COMMENTS_SHEET, &comment_headers, &comment_rows)?;

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{DuplicatePolicy, Inputs};
    use tempfile::TempDir;

    #[test]
    fn samples_resolve_with_one_skip() {
        for format in [SampleFormat::Xlsx, SampleFormat::Csv] {
            let dir = TempDir::new().unwrap();
            let paths = write_samples(dir.path(), format).unwrap();

            let inputs =
                Inputs::load(&paths.scores, &paths.comments, DuplicatePolicy::Reject).unwrap();
            let resolution = inputs.resolve();
            let names: Vec<&str> = resolution.bundles.iter().map(|b| b.name()).collect();
            assert_eq!(names, vec!["Ayesha", "Ali"], "format {format:?}");
            assert_eq!(resolution.skipped, vec!["Badreyah".to_owned()]);
        }
    }

    #[test]
    fn sample_scores_keep_their_values() {
        let dir = TempDir::new().unwrap();
        let paths = write_samples(dir.path(), SampleFormat::Xlsx).unwrap();
        assert!(paths.scores.ends_with("sample_scores.xlsx"));

        let inputs = Inputs::load(&paths.scores, &paths.comments, DuplicatePolicy::Reject).unwrap();
        let resolution = inputs.resolve();
        let ayesha = resolution.bundles[0];
        assert_eq!(ayesha.score.overall, Some(2.97));
        assert_eq!(ayesha.score.score(Competency::DrivesResults), Some(3.0));
        assert_eq!(
            ayesha.development.comment(Competency::LeadsPeople),
            Some(
                "The candidate would benefit from effectively resolving conflicts within the team to maintain cohesion and a positive working environment."
            )
        );
    }
}
