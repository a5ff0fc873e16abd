//! Typed rows for the two input sheets.
//!
//! Scores sheet: `name, gender, level, Overall Leadership` plus one column per
//! competency. Comments sheet: `name, comment_type` plus one free-text column
//! per competency. Empty cells are kept as absent values; they only become an
//! error when a prompt needs them.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::ReportError;
use crate::table::{Cell, Table, cell_at};

pub const NAME_COLUMN: &str = "name";
pub const GENDER_COLUMN: &str = "gender";
pub const LEVEL_COLUMN: &str = "level";
pub const OVERALL_COLUMN: &str = "Overall Leadership";
pub const COMMENT_TYPE_COLUMN: &str = "comment_type";

/// The six scored leadership dimensions, in sheet order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Competency {
    DrivesResults,
    LeadsPeople,
    ManagesStakeholders,
    ThinksStrategically,
    SolvesChallenges,
    SteersChange,
}

impl Competency {
    pub const ALL: [Competency; 6] = [
        Competency::DrivesResults,
        Competency::LeadsPeople,
        Competency::ManagesStakeholders,
        Competency::ThinksStrategically,
        Competency::SolvesChallenges,
        Competency::SteersChange,
    ];

    /// Column header used in both input sheets.
    pub fn header(self) -> &'static str {
        match self {
            Competency::DrivesResults => "Drives Results",
            Competency::LeadsPeople => "Leads People",
            Competency::ManagesStakeholders => "Manages Stakeholders",
            Competency::ThinksStrategically => "Thinks Strategically",
            Competency::SolvesChallenges => "Solves Challenges",
            Competency::SteersChange => "Steers Change",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Role tier selecting the interpretation matrix in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Apply,
    Guide,
    Shape,
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apply" => Ok(Level::Apply),
            "guide" => Ok(Level::Guide),
            "shape" => Ok(Level::Shape),
            other => Err(format!(
                "unknown level '{other}' (expected Apply, Guide or Shape)"
            )),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Apply => "Apply",
            Level::Guide => "Guide",
            Level::Shape => "Shape",
        })
    }
}

/// Which of the two assessor comment rows a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentKind {
    Strength,
    DevelopmentArea,
}

impl CommentKind {
    /// Value used in the `comment_type` column.
    pub fn label(self) -> &'static str {
        match self {
            CommentKind::Strength => "Strength",
            CommentKind::DevelopmentArea => "Development Area",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Strength" => Some(CommentKind::Strength),
            "Development Area" => Some(CommentKind::DevelopmentArea),
            _ => None,
        }
    }
}

/// One row of the scores sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub name: String,
    pub gender: Option<String>,
    pub level: Option<Level>,
    pub overall: Option<f64>,
    pub scores: [Option<f64>; 6],
    /// Spreadsheet row number, for diagnostics.
    pub row: usize,
}

impl ScoreRecord {
    pub fn score(&self, competency: Competency) -> Option<f64> {
        self.scores[competency.index()]
    }
}

/// One row of the comments sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub name: String,
    pub kind: CommentKind,
    pub comments: [Option<String>; 6],
    pub row: usize,
}

impl CommentRecord {
    pub fn comment(&self, competency: Competency) -> Option<&str> {
        self.comments[competency.index()].as_deref()
    }
}

/// Format a score the way the reference reports print them: shortest
/// round-trip form, with whole numbers keeping one decimal (`3.0`).
pub fn format_score(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn competency_columns(table: &Table) -> Result<[usize; 6], ReportError> {
    let mut columns = [0; 6];
    for competency in Competency::ALL {
        columns[competency.index()] = table.column(competency.header())?;
    }
    Ok(columns)
}

fn invalid_cell(table: &Table, row: usize, column: &str, detail: String) -> ReportError {
    ReportError::InvalidCell {
        path: table.path().to_path_buf(),
        row,
        column: column.to_owned(),
        detail,
    }
}

fn required_name(table: &Table, row: usize, cells: &[Cell], col: usize) -> Result<String, ReportError> {
    cell_at(cells, col)
        .as_text()
        .ok_or_else(|| invalid_cell(table, row, NAME_COLUMN, "name is empty".to_owned()))
}

fn parse_score(table: &Table, row: usize, column: &str, cell: &Cell) -> Result<Option<f64>, ReportError> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(n) => Ok(Some(*n)),
        Cell::Text(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid_cell(table, row, column, format!("'{s}' is not a number"))),
    }
}

/// Parse every data row of the scores sheet, in sheet order.
pub fn scores_from_table(table: &Table) -> Result<Vec<ScoreRecord>, ReportError> {
    let name_col = table.column(NAME_COLUMN)?;
    let gender_col = table.column(GENDER_COLUMN)?;
    let level_col = table.column(LEVEL_COLUMN)?;
    let overall_col = table.column(OVERALL_COLUMN)?;
    let columns = competency_columns(table)?;

    let mut records = Vec::with_capacity(table.len());
    for (row, cells) in table.rows() {
        let name = required_name(table, row, cells, name_col)?;
        let level = match cell_at(cells, level_col).as_text() {
            Some(text) => Some(
                text.parse::<Level>()
                    .map_err(|e| invalid_cell(table, row, LEVEL_COLUMN, e))?,
            ),
            None => None,
        };
        let overall = parse_score(table, row, OVERALL_COLUMN, cell_at(cells, overall_col))?;

        let mut scores = [None; 6];
        for competency in Competency::ALL {
            let cell = cell_at(cells, columns[competency.index()]);
            scores[competency.index()] = parse_score(table, row, competency.header(), cell)?;
        }

        records.push(ScoreRecord {
            name,
            gender: cell_at(cells, gender_col).as_text(),
            level,
            overall,
            scores,
            row,
        });
    }
    Ok(records)
}

/// Parse the comments sheet. Rows whose `comment_type` is neither
/// "Strength" nor "Development Area" are ignored with a warning.
pub fn comments_from_table(table: &Table) -> Result<Vec<CommentRecord>, ReportError> {
    let name_col = table.column(NAME_COLUMN)?;
    let kind_col = table.column(COMMENT_TYPE_COLUMN)?;
    let columns = competency_columns(table)?;

    let mut records = Vec::with_capacity(table.len());
    for (row, cells) in table.rows() {
        let name = required_name(table, row, cells, name_col)?;
        let label = cell_at(cells, kind_col).as_text().unwrap_or_default();
        let Some(kind) = CommentKind::from_label(&label) else {
            warn!(
                path = %table.path().display(),
                row,
                candidate = %name,
                comment_type = %label,
                "ignoring comment row with unrecognised comment_type"
            );
            continue;
        };

        let comments = Competency::ALL.map(|c| cell_at(cells, columns[c.index()]).as_text());
        records.push(CommentRecord {
            name,
            kind,
            comments,
            row,
        });
    }
    Ok(records)
}
