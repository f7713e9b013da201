#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::Workbook;
use tempfile::{TempDir, tempdir};
use ticket_report::relation::Relation;

/// Header of a complete ticket export, creation date included.
pub const EXPORT_HEADER: &str = "Case Number,Created Date,Customer Name,Street,Zip/Postal Code,Customer Complaint,Product Description,LineItem Status,Technician Name,Technician Remarks";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    /// Writes a single-sheet workbook; every cell is a string except cells
    /// that parse as integers, which become numbers the way spreadsheet
    /// exports store case numbers.
    pub fn write_workbook(&self, name: &str, sheet: &str, rows: &[&[&str]]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet).expect("sheet name");
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match cell.parse::<i64>() {
                    Ok(number) if r > 0 => {
                        worksheet.write_number(r, c, number as f64).expect("number");
                    }
                    _ => {
                        worksheet.write_string(r, c, *cell).expect("string");
                    }
                }
            }
        }
        workbook.save(&path).expect("save workbook");
        path
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn relation(headers: &[&str], rows: &[&[&str]]) -> Relation {
    Relation::new(strings(headers), rows.iter().map(|r| strings(r)).collect())
        .expect("relation")
}

/// Fixed reference time used across the end-to-end tests.
pub fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 31)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("timestamp")
}

pub fn export_row(case: &str, created: &str, status: &str, technician: &str, remarks: &str) -> String {
    format!(
        "{case},{created},Ann Lee,1 Main St,560001,No cooling,Split AC,{status},{technician},{remarks}"
    )
}
