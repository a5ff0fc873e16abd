//! Prompt builder: the master report template and its placeholder set.
//!
//! Placeholders are `{key}` where `key` is a column header with spaces
//! replaced by underscores; comment fields carry an `s_` (Strength) or `d_`
//! (Development Area) prefix so they never collide with score placeholders.
//! `{{` and `}}` stand for literal braces.
//!
//! A template is validated once, when it is parsed: every placeholder it
//! names must be known, and every known placeholder must appear. Rendering
//! a parsed template can then only fail on a value missing from the bundle.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ReportError;
use crate::records::{
    Competency, GENDER_COLUMN, LEVEL_COLUMN, NAME_COLUMN, OVERALL_COLUMN, format_score,
};
use crate::resolver::CandidateBundle;

/// The built-in report prompt. Its instructional text, worked examples and
/// interpretation matrices are passed through byte for byte.
pub const MASTER_TEMPLATE: &str = include_str!("../assets/master_prompt.txt");

const STRENGTH_PREFIX: &str = "s_";
const DEVELOPMENT_PREFIX: &str = "d_";

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").expect("valid literal regex")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{key}}}' at byte {offset}")]
    UnknownPlaceholder { key: String, offset: usize },

    #[error("unmatched brace at byte {offset} (use {{{{ or }}}} for a literal brace)")]
    StrayBrace { offset: usize },

    #[error("template never uses placeholder '{{{key}}}'")]
    MissingPlaceholder { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("missing field '{placeholder}' for candidate '{candidate}'")]
    MissingField {
        candidate: String,
        placeholder: String,
    },
}

/// Every value a template can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Name,
    Gender,
    Level,
    OverallScore,
    Score(Competency),
    Strength(Competency),
    Development(Competency),
}

fn stem(header: &str) -> String {
    header.replace(' ', "_")
}

impl Placeholder {
    /// The full placeholder set, in template order.
    pub fn all() -> Vec<Placeholder> {
        let mut all = vec![
            Placeholder::Name,
            Placeholder::Gender,
            Placeholder::Level,
            Placeholder::OverallScore,
        ];
        all.extend(Competency::ALL.map(Placeholder::Score));
        all.extend(Competency::ALL.map(Placeholder::Strength));
        all.extend(Competency::ALL.map(Placeholder::Development));
        all
    }

    pub fn key(self) -> String {
        match self {
            Placeholder::Name => stem(NAME_COLUMN),
            Placeholder::Gender => stem(GENDER_COLUMN),
            Placeholder::Level => stem(LEVEL_COLUMN),
            Placeholder::OverallScore => stem(OVERALL_COLUMN),
            Placeholder::Score(c) => stem(c.header()),
            Placeholder::Strength(c) => format!("{STRENGTH_PREFIX}{}", stem(c.header())),
            Placeholder::Development(c) => format!("{DEVELOPMENT_PREFIX}{}", stem(c.header())),
        }
    }

    pub fn from_key(key: &str) -> Option<Placeholder> {
        Placeholder::all().into_iter().find(|p| p.key() == key)
    }

    fn value(self, bundle: &CandidateBundle<'_>) -> Option<String> {
        let score = bundle.score;
        match self {
            Placeholder::Name => Some(score.name.clone()),
            Placeholder::Gender => score.gender.clone(),
            Placeholder::Level => score.level.map(|l| l.to_string()),
            Placeholder::OverallScore => score.overall.map(format_score),
            Placeholder::Score(c) => score.score(c).map(format_score),
            Placeholder::Strength(c) => bundle.strength.comment(c).map(str::to_owned),
            Placeholder::Development(c) => bundle.development.comment(c).map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A parsed, validated prompt template.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// The built-in master template.
    pub fn master() -> Result<Self, TemplateError> {
        Self::parse(MASTER_TEMPLATE)
    }

    /// Read and validate a custom template file.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let text = fs::read_to_string(path).map_err(|e| ReportError::TemplateUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Ok(Self::parse(&text)?)
    }

    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut seen = HashSet::new();
        let mut last = 0;

        for caps in token_re().captures_iter(text) {
            let token = caps.get(0).expect("group 0 is the whole match");
            literal.push_str(&text[last..token.start()]);
            last = token.end();

            match token.as_str() {
                "{{" => literal.push('{'),
                "}}" => literal.push('}'),
                "{" | "}" => {
                    return Err(TemplateError::StrayBrace {
                        offset: token.start(),
                    });
                }
                _ => {
                    let key = caps.get(1).map_or("", |m| m.as_str());
                    let placeholder = Placeholder::from_key(key).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder {
                            key: key.to_owned(),
                            offset: token.start(),
                        }
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(placeholder));
                    seen.insert(placeholder);
                }
            }
        }
        literal.push_str(&text[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if let Some(missing) = Placeholder::all().into_iter().find(|p| !seen.contains(p)) {
            return Err(TemplateError::MissingPlaceholder { key: missing.key() });
        }

        Ok(Self { segments })
    }

    /// Substitute every placeholder from the bundle.
    pub fn render(&self, bundle: &CandidateBundle<'_>) -> Result<String, RenderError> {
        let mut out = String::with_capacity(MASTER_TEMPLATE.len() + 2048);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(placeholder) => {
                    let value =
                        placeholder
                            .value(bundle)
                            .ok_or_else(|| RenderError::MissingField {
                                candidate: bundle.name().to_owned(),
                                placeholder: placeholder.key(),
                            })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}
