//! Report rendering through ranked engines.
//!
//! An engine ([`ReportRenderer`]) hands out a [`RenderSession`]. The session
//! lives inside a guard that releases it on every exit path, including
//! unwinding. A failing release is logged and never replaces the error that
//! ended the render.
//!
//! The data sheet is mandatory. The pivot sheet is best effort: when it
//! cannot be built or written, the outcome carries a warning and the data
//! output is still saved. An engine that cannot be acquired, or that fails to
//! write the data sheet or to save, hands over to the next engine.

use std::{
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use log::{debug, info, warn};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::{
    config::ReportStyle,
    error::ReportError,
    io_utils,
    pivot::{PivotCell, PivotTable},
    relation::Relation,
    report::ReportSpec,
};

const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;
const PIVOT_LABEL_WIDTH: f64 = 28.0;

pub trait RenderSession {
    fn write_data(&mut self, relation: &Relation) -> Result<()>;
    fn write_pivot(&mut self, pivot: &PivotTable) -> Result<()>;
    /// Persists everything written so far; returns the files produced.
    fn save(&mut self, path: &Path) -> Result<Vec<PathBuf>>;
    fn release(&mut self) -> Result<()>;
}

pub trait ReportRenderer {
    fn name(&self) -> &str;
    fn acquire(&self) -> Result<Box<dyn RenderSession>>;

    /// Files a save to `path` writes.
    fn output_paths(&self, path: &Path) -> Vec<PathBuf> {
        vec![path.to_path_buf()]
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub engine: String,
    pub files: Vec<PathBuf>,
    pub pivot: Option<PivotTable>,
    pub pivot_written: bool,
    pub warnings: Vec<String>,
}

/// Releases the wrapped session when dropped.
struct SessionGuard {
    engine: String,
    session: Box<dyn RenderSession>,
}

impl Deref for SessionGuard {
    type Target = dyn RenderSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        match self.session.release() {
            Ok(()) => debug!("Released {} render session", self.engine),
            Err(err) => warn!("Releasing {} render session failed: {err:#}", self.engine),
        }
    }
}

pub fn render_report(
    engines: &[&dyn ReportRenderer],
    relation: &Relation,
    spec: Option<&ReportSpec>,
    path: &Path,
) -> Result<RenderOutcome, ReportError> {
    let mut attempts = Vec::new();
    let mut partial = false;
    for engine in engines {
        let session = match engine.acquire() {
            Ok(session) => session,
            Err(err) => {
                warn!("Render engine '{}' unavailable: {err:#}", engine.name());
                attempts.push(format!("{}: {err:#}", engine.name()));
                continue;
            }
        };
        info!("Rendering with the {} engine", engine.name());
        match render_with(*engine, session, relation, spec, path) {
            Ok(mut outcome) => {
                if !attempts.is_empty() {
                    let warning = format!(
                        "Rendered with the {} engine after: {}",
                        engine.name(),
                        attempts.join("; ")
                    );
                    warn!("{warning}");
                    outcome.warnings.insert(0, warning);
                }
                return Ok(outcome);
            }
            Err(err) => {
                warn!("Render engine '{}' failed: {err:#}", engine.name());
                attempts.push(format!("{}: {err:#}", engine.name()));
                partial |= engine.output_paths(path).iter().any(|p| p.exists());
            }
        }
    }

    Err(ReportError::RenderFailure {
        path: path.to_path_buf(),
        partial,
        message: if attempts.is_empty() {
            "no render engine configured".to_string()
        } else {
            format!("no render engine succeeded ({})", attempts.join("; "))
        },
    })
}

/// One engine's full render. The session is released before returning.
fn render_with(
    engine: &dyn ReportRenderer,
    session: Box<dyn RenderSession>,
    relation: &Relation,
    spec: Option<&ReportSpec>,
    path: &Path,
) -> Result<RenderOutcome> {
    let mut session = SessionGuard {
        engine: engine.name().to_string(),
        session,
    };
    session.write_data(relation)?;

    let mut warnings = Vec::new();
    let mut pivot_written = false;
    let pivot = match spec.map(|spec| PivotTable::build(relation, spec)) {
        Some(Ok(pivot)) => {
            warnings.extend(pivot.warnings.iter().cloned());
            match session.write_pivot(&pivot) {
                Ok(()) => pivot_written = true,
                Err(err) => {
                    let warning = format!("Pivot view not written: {err:#}");
                    warn!("{warning}");
                    warnings.push(warning);
                }
            }
            Some(pivot)
        }
        Some(Err(err)) => {
            let warning = format!("Pivot view skipped: {err}");
            warn!("{warning}");
            warnings.push(warning);
            None
        }
        None => None,
    };

    let files = session.save(path)?;
    for file in &files {
        info!("Report written to {file:?}");
    }
    Ok(RenderOutcome {
        engine: engine.name().to_string(),
        files,
        pivot,
        pivot_written,
        warnings,
    })
}

/// Styled workbook output.
#[derive(Debug, Clone)]
pub struct XlsxRenderer {
    style: ReportStyle,
}

impl XlsxRenderer {
    pub fn new(style: ReportStyle) -> Self {
        Self { style }
    }
}

impl ReportRenderer for XlsxRenderer {
    fn name(&self) -> &str {
        "xlsx"
    }

    fn acquire(&self) -> Result<Box<dyn RenderSession>> {
        let header_rgb = self.style.header_color_rgb()?;
        let metric_rgb = self.style.metric_color_rgb()?;
        let body = Format::new()
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap();
        Ok(Box::new(XlsxSession {
            workbook: Some(Workbook::new()),
            style: self.style.clone(),
            header: body
                .clone()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(header_rgb)),
            metric: body.clone().set_background_color(Color::RGB(metric_rgb)),
            body,
        }))
    }
}

struct XlsxSession {
    workbook: Option<Workbook>,
    style: ReportStyle,
    header: Format,
    body: Format,
    metric: Format,
}

impl XlsxSession {
    fn workbook(&mut self) -> Result<&mut Workbook> {
        self.workbook
            .as_mut()
            .ok_or_else(|| anyhow!("Workbook session already released"))
    }
}

impl RenderSession for XlsxSession {
    fn write_data(&mut self, relation: &Relation) -> Result<()> {
        let (last_row, last_col) = cell_position(relation.row_count(), relation.column_count())?;
        let mut sheet = Worksheet::new();
        sheet.set_name(&self.style.data_sheet)?;

        for (col, name) in relation.headers().iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, name, &self.header)?;
        }
        let metric_idx = relation.column_index(&self.style.metric_column);
        for (row_idx, row) in relation.rows().iter().enumerate() {
            let xl_row = (row_idx + 1) as u32;
            for (col, cell) in row.iter().enumerate() {
                let xl_col = col as u16;
                let value = cell.trim();
                let format = if metric_idx == Some(col) {
                    &self.metric
                } else {
                    &self.body
                };
                if value.is_empty() {
                    sheet.write_blank(xl_row, xl_col, format)?;
                } else if metric_idx == Some(col)
                    && let Ok(number) = value.parse::<f64>()
                {
                    sheet.write_number_with_format(xl_row, xl_col, number, format)?;
                } else {
                    sheet.write_string_with_format(xl_row, xl_col, cell, format)?;
                }
            }
        }

        for (col, width) in self
            .style
            .column_widths
            .iter()
            .enumerate()
            .take(relation.column_count())
        {
            sheet.set_column_width(col as u16, *width)?;
        }
        if relation.column_count() > 0 {
            sheet.autofilter(0, 0, last_row, last_col)?;
        }
        self.workbook()?.push_worksheet(sheet);
        debug!(
            "Wrote {} row(s) to sheet '{}'",
            relation.row_count(),
            self.style.data_sheet
        );
        Ok(())
    }

    fn write_pivot(&mut self, pivot: &PivotTable) -> Result<()> {
        let grid = pivot.to_grid();
        let width = grid.first().map_or(0, Vec::len);
        cell_position(grid.len(), width)?;
        let mut sheet = Worksheet::new();
        sheet.set_name(&self.style.pivot_sheet)?;
        let bold = Format::new().set_bold();
        let last = grid.len().saturating_sub(1);

        for (row_idx, cells) in grid.iter().enumerate() {
            // Page line, caption, label header and grand total are emphasised.
            let emphasised = matches!(row_idx, 0 | 2 | 3) || row_idx == last;
            for (col, cell) in cells.iter().enumerate() {
                let (xl_row, xl_col) = (row_idx as u32, col as u16);
                let bold_cell = emphasised && (col == 0 || row_idx == 3 || row_idx == last);
                match cell {
                    PivotCell::Empty => {}
                    PivotCell::Text(text) if bold_cell => {
                        sheet.write_string_with_format(xl_row, xl_col, text, &bold)?;
                    }
                    PivotCell::Text(text) => {
                        sheet.write_string(xl_row, xl_col, text)?;
                    }
                    PivotCell::Count(count) if bold_cell => {
                        sheet.write_number_with_format(xl_row, xl_col, *count as f64, &bold)?;
                    }
                    PivotCell::Count(count) => {
                        sheet.write_number(xl_row, xl_col, *count as f64)?;
                    }
                }
            }
        }
        sheet.set_column_width(0, PIVOT_LABEL_WIDTH)?;
        self.workbook()?.push_worksheet(sheet);
        debug!(
            "Wrote pivot with {} row label(s) to sheet '{}'",
            pivot.rows.len(),
            self.style.pivot_sheet
        );
        Ok(())
    }

    fn save(&mut self, path: &Path) -> Result<Vec<PathBuf>> {
        self.workbook()?
            .save(path)
            .with_context(|| format!("Saving workbook {path:?}"))?;
        Ok(vec![path.to_path_buf()])
    }

    fn release(&mut self) -> Result<()> {
        self.workbook = None;
        Ok(())
    }
}

/// Zero-based last row and column of a sheet holding `rows` data rows under one header row.
fn cell_position(rows: usize, columns: usize) -> Result<(u32, u16)> {
    anyhow::ensure!(
        rows < MAX_ROWS,
        "{rows} row(s) exceed the worksheet limit of {}",
        MAX_ROWS - 1
    );
    anyhow::ensure!(
        columns <= MAX_COLUMNS,
        "{columns} column(s) exceed the worksheet limit of {MAX_COLUMNS}"
    );
    Ok((rows as u32, columns.saturating_sub(1) as u16))
}

/// Plain delimited output: `<stem>.csv` for the data and `<stem>_pivot.csv`
/// for the crosstab.
#[derive(Debug, Clone, Copy)]
pub struct CsvRenderer {
    delimiter: u8,
    encoding: &'static Encoding,
}

impl CsvRenderer {
    pub fn new(delimiter: u8, encoding: &'static Encoding) -> Self {
        Self {
            delimiter,
            encoding,
        }
    }

    fn data_path(path: &Path) -> PathBuf {
        path.with_extension("csv")
    }

    fn pivot_path(path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        path.with_file_name(format!("{stem}_pivot.csv"))
    }
}

impl ReportRenderer for CsvRenderer {
    fn name(&self) -> &str {
        "csv"
    }

    fn acquire(&self) -> Result<Box<dyn RenderSession>> {
        Ok(Box::new(CsvSession {
            renderer: *self,
            data: None,
            pivot: None,
        }))
    }

    fn output_paths(&self, path: &Path) -> Vec<PathBuf> {
        vec![Self::data_path(path), Self::pivot_path(path)]
    }
}

struct CsvSession {
    renderer: CsvRenderer,
    data: Option<(Vec<String>, Vec<Vec<String>>)>,
    pivot: Option<Vec<Vec<String>>>,
}

impl CsvSession {
    fn write_file(&self, path: &Path, rows: &[Vec<String>]) -> Result<()> {
        let mut writer =
            io_utils::open_csv_writer(path, self.renderer.delimiter, self.renderer.encoding)?;
        for row in rows {
            writer
                .write_record(row)
                .with_context(|| format!("Writing {path:?}"))?;
        }
        writer.flush().with_context(|| format!("Flushing {path:?}"))?;
        Ok(())
    }
}

impl RenderSession for CsvSession {
    fn write_data(&mut self, relation: &Relation) -> Result<()> {
        self.data = Some((relation.headers().to_vec(), relation.rows().to_vec()));
        Ok(())
    }

    fn write_pivot(&mut self, pivot: &PivotTable) -> Result<()> {
        let rows = pivot
            .to_grid()
            .iter()
            .map(|cells| cells.iter().map(ToString::to_string).collect())
            .collect();
        self.pivot = Some(rows);
        Ok(())
    }

    fn save(&mut self, path: &Path) -> Result<Vec<PathBuf>> {
        let (headers, rows) = self
            .data
            .as_ref()
            .ok_or_else(|| anyhow!("No data written before save"))?;
        let data_path = CsvRenderer::data_path(path);
        let mut records = Vec::with_capacity(rows.len() + 1);
        records.push(headers.clone());
        records.extend(rows.iter().cloned());
        self.write_file(&data_path, &records)?;
        let mut files = vec![data_path];

        if let Some(pivot) = &self.pivot {
            let pivot_path = CsvRenderer::pivot_path(path);
            self.write_file(&pivot_path, pivot)?;
            files.push(pivot_path);
        }
        Ok(files)
    }

    fn release(&mut self) -> Result<()> {
        self.data = None;
        self.pivot = None;
        Ok(())
    }
}
