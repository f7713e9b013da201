//! Source ingestion with ranked fallbacks.
//!
//! Delimited exports are decoded with each candidate encoding in turn. Only a
//! decode failure moves on to the next candidate; the first clean decode is
//! parsed, short rows are padded and any parse error is final. Workbooks are opened with each calamine engine in turn against a
//! fixed sheet name. Every attempt is reported through `log`; the returned
//! [`Relation`] carries no diagnostics.

use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Range, Reader, Xls, Xlsx, open_workbook, open_workbook_auto};
use encoding_rs::Encoding;
use log::{debug, info, warn};

use crate::{error::ReportError, io_utils, printable_delimiter, relation::Relation};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Delimited,
    Workbook,
}

impl SourceKind {
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext)
                if WORKBOOK_EXTENSIONS
                    .iter()
                    .any(|candidate| ext.eq_ignore_ascii_case(candidate)) =>
            {
                SourceKind::Workbook
            }
            _ => SourceKind::Delimited,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DelimitedOptions {
    pub delimiter: u8,
    pub encodings: Vec<&'static Encoding>,
}

impl DelimitedOptions {
    pub fn for_path(path: &Path, delimiter: Option<u8>, encodings: Vec<&'static Encoding>) -> Self {
        Self {
            delimiter: io_utils::resolve_input_delimiter(path, delimiter),
            encodings,
        }
    }
}

/// Reads either source kind, dispatching on the file extension.
pub fn read_source(
    path: &Path,
    delimited: &DelimitedOptions,
    sheet: &str,
) -> Result<Relation, ReportError> {
    match SourceKind::detect(path) {
        SourceKind::Delimited => read_delimited(path, delimited),
        SourceKind::Workbook => read_workbook(path, sheet),
    }
}

pub fn read_delimited(path: &Path, options: &DelimitedOptions) -> Result<Relation, ReportError> {
    let bytes = fs::read(path).map_err(|err| ReportError::UnreadableSource {
        path: path.to_path_buf(),
        attempts: vec![format!("open: {err}")],
    })?;

    let mut attempts = Vec::new();
    let (candidates, payload, pinned): (Vec<&'static Encoding>, &[u8], bool) =
        match io_utils::sniff_bom(&bytes) {
            Some((encoding, rest)) => {
                debug!("{path:?} starts with a {} byte-order mark", encoding.name());
                (vec![encoding], rest, true)
            }
            None => (options.encodings.clone(), &bytes[..], false),
        };

    for encoding in candidates {
        let text = match io_utils::decode_strict(payload, encoding) {
            Ok(text) => text,
            Err(err) => {
                warn!("Reading {:?} as {} failed: {err:#}", path, encoding.name());
                attempts.push(format!("{}: {err:#}", encoding.name()));
                continue;
            }
        };
        if !pinned && !io_utils::plausible_decode(&text, encoding, options.delimiter) {
            warn!(
                "Reading {:?} as {} produced no '{}' in the header; skipping",
                path,
                encoding.name(),
                printable_delimiter(options.delimiter)
            );
            attempts.push(format!(
                "{}: header has no '{}' delimiter",
                encoding.name(),
                printable_delimiter(options.delimiter)
            ));
            continue;
        }

        // Decoding succeeded, so a parse failure is final.
        return match parse_delimited(&text, options.delimiter) {
            Ok(relation) => {
                info!(
                    "Read {} row(s) x {} column(s) from {:?} as {}",
                    relation.row_count(),
                    relation.column_count(),
                    path,
                    encoding.name()
                );
                Ok(relation)
            }
            Err(err) => {
                attempts.push(format!("{}: {err:#}", encoding.name()));
                Err(ReportError::UnreadableSource {
                    path: path.to_path_buf(),
                    attempts,
                })
            }
        };
    }

    Err(ReportError::UnreadableSource {
        path: path.to_path_buf(),
        attempts,
    })
}

fn parse_delimited(text: &str, delimiter: u8) -> Result<Relation> {
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter, true);
    let headers = reader
        .headers()
        .context("Reading header row")?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(anyhow!("no header row"));
    }
    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Relation::with_deduplicated_headers(headers, rows)?)
}

type WorkbookEngine = fn(&Path, &str) -> Result<Relation>;

/// Ranked calamine engines: the modern container first, then legacy BIFF,
/// then extension-based auto detection.
const WORKBOOK_ENGINES: &[(&str, WorkbookEngine)] = &[
    ("xlsx", read_sheet_with::<Xlsx<BufReader<File>>>),
    ("xls", read_sheet_with::<Xls<BufReader<File>>>),
    ("auto", read_sheet_auto),
];

pub fn read_workbook(path: &Path, sheet: &str) -> Result<Relation, ReportError> {
    let mut attempts = Vec::new();
    for (name, engine) in WORKBOOK_ENGINES {
        debug!("Trying to read {path:?} sheet '{sheet}' with the {name} engine");
        match engine(path, sheet) {
            Ok(relation) => {
                info!(
                    "Read {} row(s) from {:?} sheet '{}' with the {} engine",
                    relation.row_count(),
                    path,
                    sheet,
                    name
                );
                return Ok(relation);
            }
            Err(err) => {
                warn!("Reading {path:?} with the {name} engine failed: {err:#}");
                attempts.push(format!("{name}: {err:#}"));
            }
        }
    }
    Err(ReportError::UnreadableSource {
        path: PathBuf::from(path),
        attempts,
    })
}

/// Lists the sheets of a workbook using the auto engine.
pub fn workbook_sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path).with_context(|| format!("Opening {path:?}"))?;
    Ok(workbook.sheet_names().to_vec())
}

fn read_sheet_with<R>(path: &Path, sheet: &str) -> Result<Relation>
where
    R: Reader<BufReader<File>>,
    R::Error: std::error::Error + Send + Sync + 'static,
{
    let mut workbook: R = open_workbook(path)?;
    let range = workbook.worksheet_range(sheet)?;
    relation_from_range(&range)
}

fn read_sheet_auto(path: &Path, sheet: &str) -> Result<Relation> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range(sheet)?;
    relation_from_range(&range)
}

fn relation_from_range(range: &Range<Data>) -> Result<Relation> {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or_else(|| anyhow!("sheet is empty"))?
        .iter()
        .map(cell_to_text)
        .collect::<Vec<_>>();
    let body = rows
        .map(|row| row.iter().map(cell_to_text).collect())
        .collect();
    Ok(Relation::with_deduplicated_headers(headers, body)?)
}

/// Renders a workbook cell as text; integral floats drop their fraction.
pub fn cell_to_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|value| value.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(err) => format!("#{err:?}"),
    }
}
