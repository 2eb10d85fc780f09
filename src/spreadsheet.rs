use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{NewStudent, Student};

const TEMPLATE_HEADERS: [&str; 5] = ["Student Name", "USN", "Gender", "Branch", "Year"];

const NAME_HEADERS: &[&str] = &["Student Name", "Name", "student_name"];
const USN_HEADERS: &[&str] = &["USN", "usn"];
const GENDER_HEADERS: &[&str] = &["Gender", "gender"];
const BRANCH_HEADERS: &[&str] = &["Branch", "branch", "Department"];
const YEAR_HEADERS: &[&str] = &["Year", "year", "Academic Year"];

const TEMPLATE_ROWS: &[[&str; 5]] = &[
    ["Adithya B R", "4SH24MC009", "Male", "MCA", "1"],
    ["Rahul Sharma", "4SH24MC043", "Male", "Information Science & Engineering", "2"],
    ["Payal Patel", "4SH24EC012", "Female", "Electronics & Communication", "3"],
    ["Aarav Gupta", "4SH24CS105", "Male", "Computer Science", "4"],
    ["Neha Singh", "4SH24ME034", "Female", "Mechanical Engineering", "2"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Workbook,
}

impl SheetFormat {
    /// Picks the parser from the file name, falling back to magic bytes.
    pub fn detect(file_name: &str, bytes: &[u8]) -> Self {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".csv") {
            return SheetFormat::Csv;
        }
        if [".xlsx", ".xlsm", ".xls", ".ods"].iter().any(|ext| lower.ends_with(ext)) {
            return SheetFormat::Workbook;
        }
        // zip container (xlsx/ods) or OLE2 (xls)
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
            SheetFormat::Workbook
        } else {
            SheetFormat::Csv
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ParsedSheet {
    pub rows: Vec<NewStudent>,
    /// Human-readable reasons rows were dropped.
    pub problems: Vec<String>,
}

pub fn parse_students(file_name: &str, bytes: &[u8]) -> Result<ParsedSheet> {
    let table = match SheetFormat::detect(file_name, bytes) {
        SheetFormat::Csv => read_csv(bytes)?,
        SheetFormat::Workbook => read_workbook(bytes)?,
    };
    map_rows(table)
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| AppError::Spreadsheet(e.to_string()))
        })
        .collect()
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| AppError::Spreadsheet(format!("Error reading workbook: {}", e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Spreadsheet("Workbook has no sheets".to_string()))?
        .map_err(|e| AppError::Spreadsheet(e.to_string()))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .collect())
}

/// Every column matching one of `aliases`, in alias order.
fn columns(headers: &[String], aliases: &[&str]) -> Vec<usize> {
    aliases
        .iter()
        .filter_map(|alias| headers.iter().position(|h| h.trim() == *alias))
        .collect()
}

fn map_rows(table: Vec<Vec<String>>) -> Result<ParsedSheet> {
    let mut iter = table.into_iter();
    let headers = iter
        .next()
        .ok_or_else(|| AppError::Spreadsheet("Spreadsheet is empty".to_string()))?;

    let usn_cols = columns(&headers, USN_HEADERS);
    if usn_cols.is_empty() {
        return Err(AppError::Spreadsheet("Missing USN column".to_string()));
    }
    let name_cols = columns(&headers, NAME_HEADERS);
    let gender_cols = columns(&headers, GENDER_HEADERS);
    let branch_cols = columns(&headers, BRANCH_HEADERS);
    let year_cols = columns(&headers, YEAR_HEADERS);

    let mut parsed = ParsedSheet::default();
    for (index, row) in iter.enumerate() {
        // +2: one for the header row, one for 1-based numbering
        let line = index + 2;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        // First non-empty cell among the matching columns
        let cell = |cols: &[usize]| {
            cols.iter()
                .filter_map(|c| row.get(*c))
                .map(|v| v.trim())
                .find(|v| !v.is_empty())
                .unwrap_or_default()
                .to_string()
        };

        let usn = cell(&usn_cols);
        if usn.is_empty() {
            parsed.problems.push(format!("Row {}: missing USN", line));
            continue;
        }
        let raw_year = cell(&year_cols);
        let year = if raw_year.is_empty() {
            0
        } else {
            match parse_year(&raw_year) {
                Some(year) => year,
                None => {
                    parsed.problems.push(format!("Row {}: invalid year '{}'", line, raw_year));
                    continue;
                }
            }
        };

        parsed.rows.push(NewStudent {
            student_name: cell(&name_cols),
            usn,
            gender: cell(&gender_cols),
            branch: cell(&branch_cols),
            year,
        });
    }
    Ok(parsed)
}

fn parse_year(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().or_else(|| {
        // Workbooks hand numbers back as floats
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0)
            .map(|f| f as u32)
    })
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV: {}", e)))
}

/// Sample sheet showing the expected columns.
pub fn template_csv() -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(TEMPLATE_HEADERS)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    for row in TEMPLATE_ROWS {
        writer
            .write_record(row)
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }
    finish(writer)
}

pub fn roster_csv(students: &[Student]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(TEMPLATE_HEADERS)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    for s in students {
        let year = s.year.to_string();
        writer
            .write_record([s.student_name.as_str(), s.usn.as_str(), s.gender.as_str(), s.branch.as_str(), year.as_str()])
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }
    finish(writer)
}
