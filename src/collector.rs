//! Report collector: one `(name, summary)` entry per processed candidate,
//! emitted in first-appearance order regardless of completion order.

use std::path::Path;

use crate::error::ReportError;
use crate::table::{self, Cell};

pub const OUTPUT_SHEET: &str = "Generated Summaries";
pub const OUTPUT_HEADERS: [&str; 2] = ["name", "summary"];

/// Generated text, or the description of why there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportBody {
    Text(String),
    Error(String),
}

impl ReportBody {
    /// Cell text for the `summary` column.
    pub fn summary(&self) -> String {
        match self {
            ReportBody::Text(text) => text.clone(),
            ReportBody::Error(detail) => format!("Error: {detail}"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ReportBody::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReport {
    pub name: String,
    pub body: ReportBody,
}

/// Slot-per-position accumulator. Position `i` is the i-th bundled
/// candidate; filling slots out of order is allowed.
#[derive(Debug, Default)]
pub struct ReportCollector {
    slots: Vec<Option<GeneratedReport>>,
    skipped: Vec<String>,
}

impl ReportCollector {
    pub fn new(capacity: usize, skipped: Vec<String>) -> Self {
        Self {
            slots: vec![None; capacity],
            skipped,
        }
    }

    /// Store the report for `position`, which must be below the capacity
    /// given to [`ReportCollector::new`].
    pub fn insert(&mut self, position: usize, report: GeneratedReport) {
        debug_assert!(
            position < self.slots.len(),
            "position {position} out of range for {} slots",
            self.slots.len()
        );
        self.slots[position] = Some(report);
    }

    /// Filled slots in position order.
    pub fn reports(&self) -> impl Iterator<Item = &GeneratedReport> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.reports().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.reports()
            .filter(|r| r.body.is_error())
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        let rows: Vec<Vec<Cell>> = self
            .reports()
            .map(|r| vec![Cell::Text(r.name.clone()), Cell::Text(r.body.summary())])
            .collect();
        table::write_table(path, OUTPUT_SHEET, &OUTPUT_HEADERS, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use tempfile::TempDir;

    fn report(name: &str, body: ReportBody) -> GeneratedReport {
        GeneratedReport {
            name: name.to_owned(),
            body,
        }
    }

    #[test]
    fn out_of_order_inserts_come_back_in_position_order() {
        let mut collector = ReportCollector::new(3, vec![]);
        collector.insert(2, report("C", ReportBody::Text("c".into())));
        collector.insert(0, report("A", ReportBody::Text("a".into())));
        collector.insert(1, report("B", ReportBody::Error("boom".into())));

        let names: Vec<&str> = collector.reports().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(collector.failed_names(), vec!["B".to_owned()]);
    }

    #[test]
    fn unfilled_slots_are_omitted() {
        let mut collector = ReportCollector::new(3, vec!["Z".into()]);
        collector.insert(1, report("B", ReportBody::Text("b".into())));
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.skipped(), ["Z".to_owned()]);
    }

    #[test]
    #[should_panic]
    fn insert_past_capacity_panics() {
        let mut collector = ReportCollector::new(1, vec![]);
        collector.insert(1, report("B", ReportBody::Text("b".into())));
    }

    #[test]
    fn error_summary_is_prefixed() {
        assert_eq!(ReportBody::Error("timeout".into()).summary(), "Error: timeout");
        assert_eq!(ReportBody::Text("ok".into()).summary(), "ok");
    }

    #[test]
    fn write_produces_two_column_table() {
        let dir = TempDir::new().unwrap();
        let mut collector = ReportCollector::new(2, vec![]);
        collector.insert(0, report("Ayesha", ReportBody::Text("Ayesha leads.".into())));
        collector.insert(1, report("Ali", ReportBody::Error("HTTP 503".into())));

        for file in ["out.xlsx", "out.csv"] {
            let path = dir.path().join(file);
            collector.write(&path).unwrap();

            let table = Table::load(&path).unwrap();
            assert_eq!(table.headers(), ["name".to_owned(), "summary".to_owned()]);
            let rows: Vec<Vec<String>> = table
                .rows()
                .map(|(_, cells)| cells.iter().map(|c| c.as_text().unwrap_or_default()).collect())
                .collect();
            assert_eq!(
                rows,
                vec![
                    vec!["Ayesha".to_owned(), "Ayesha leads.".to_owned()],
                    vec!["Ali".to_owned(), "Error: HTTP 503".to_owned()],
                ]
            );
        }
    }
}
