//! Tabular store: loads the first sheet of a workbook (or a CSV file) into
//! a header row plus data rows, and writes result tables back out.
//!
//! Row numbers reported to callers are spreadsheet row numbers: the header
//! is row 1, so the first data row is row 2.

use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use rust_xlsxwriter::{Workbook, XlsxError};

use crate::error::ReportError;

/// A single cell value after loading.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Builds a text cell, trimming surrounding whitespace. Blank text is `Empty`.
    pub fn text(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_owned())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// The cell rendered as text. Whole numbers drop the fraction, so a
    /// numeric name or comment cell reads `123`, not `123.0`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(format!("{n:.0}")),
            Cell::Number(n) => Some(n.to_string()),
        }
    }
}

/// On-disk formats the store understands, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Workbook,
    Csv,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self, ReportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("xlsx" | "xlsm" | "xls" | "ods") => Ok(TableFormat::Workbook),
            Some("csv") => Ok(TableFormat::Csv),
            _ => Err(ReportError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// A loaded sheet: trimmed headers and data rows (fully empty rows dropped).
#[derive(Debug, Clone)]
pub struct Table {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<(usize, Vec<Cell>)>,
}

impl Table {
    /// Load the first worksheet of a workbook, or a CSV file.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        if !path.exists() {
            return Err(ReportError::InputFileNotFound {
                path: path.to_path_buf(),
            });
        }
        let (headers, rows) = match TableFormat::from_path(path)? {
            TableFormat::Workbook => read_workbook(path)?,
            TableFormat::Csv => read_csv(path)?,
        };
        Ok(Self::from_rows(path, headers, rows))
    }

    /// Build a table from already-parsed cells. Used by the loaders and by tests.
    pub fn from_rows(path: &Path, headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let headers = headers.into_iter().map(|h| h.trim().to_owned()).collect();
        let rows = rows
            .into_iter()
            .enumerate()
            .filter(|(_, cells)| !cells.iter().all(Cell::is_empty))
            .map(|(i, cells)| (i + 2, cells))
            .collect();
        Self {
            path: path.to_path_buf(),
            headers,
            rows,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Index of the column with this header, or `MissingColumn`.
    pub fn column(&self, name: &str) -> Result<usize, ReportError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReportError::MissingColumn {
                path: self.path.clone(),
                column: name.to_owned(),
            })
    }

    /// Data rows paired with their spreadsheet row number.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[Cell])> {
        self.rows.iter().map(|(n, cells)| (*n, cells.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Cell at `index`, treating short rows as padded with empty cells.
pub fn cell_at(row: &[Cell], index: usize) -> &Cell {
    row.get(index).unwrap_or(&Cell::Empty)
}

fn unreadable(path: &Path, detail: impl std::fmt::Display) -> ReportError {
    ReportError::InputUnreadable {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

type RawSheet = (Vec<String>, Vec<Vec<Cell>>);

fn read_workbook(path: &Path) -> Result<RawSheet, ReportError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| unreadable(path, "workbook has no worksheets"))?
        .map_err(|e| unreadable(path, e))?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|c| cell_from_data(c).as_text().unwrap_or_default())
            .collect(),
        None => {
            return Err(ReportError::EmptyInput {
                path: path.to_path_buf(),
            });
        }
    };
    let body = rows
        .map(|r| r.iter().map(cell_from_data).collect())
        .collect();
    Ok((headers, body))
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        other => Cell::text(&other.to_string()),
    }
}

fn read_csv(path: &Path) -> Result<RawSheet, ReportError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| unreadable(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| unreadable(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_owned())
        .collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ReportError::EmptyInput {
            path: path.to_path_buf(),
        });
    }

    let mut body = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| unreadable(path, e))?;
        body.push(record.iter().map(Cell::text).collect());
    }
    Ok((headers, body))
}

/// Write a table with a header row. `.xlsx` goes through rust_xlsxwriter
/// with the given sheet name; `.csv` ignores the sheet name.
pub fn write_table(
    path: &Path,
    sheet_name: &str,
    headers: &[&str],
    rows: &[Vec<Cell>],
) -> Result<(), ReportError> {
    let write_failed = |detail: String| ReportError::OutputWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| write_failed(format!("failed to create directory: {e}")))?;
        }
    }

    match TableFormat::from_path(path)? {
        TableFormat::Workbook => {
            write_xlsx(path, sheet_name, headers, rows).map_err(|e| write_failed(e.to_string()))
        }
        TableFormat::Csv => write_csv(path, headers, rows).map_err(write_failed),
    }
}

fn write_xlsx(
    path: &Path,
    sheet_name: &str,
    headers: &[&str],
    rows: &[Vec<Cell>],
) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let row_num = (i + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    worksheet.write_string(row_num, col as u16, s)?;
                }
                Cell::Number(n) => {
                    worksheet.write_number(row_num, col as u16, *n)?;
                }
            }
        }
    }

    workbook.save(path)
}

fn write_csv(path: &Path, headers: &[&str], rows: &[Vec<Cell>]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| e.to_string())?;
    writer.write_record(headers).map_err(|e| e.to_string())?;
    for row in rows {
        let fields: Vec<String> = row.iter().map(|c| c.as_text().unwrap_or_default()).collect();
        writer.write_record(&fields).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())
}
