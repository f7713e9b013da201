//! Static crosstab computed from a [`ReportSpec`].
//!
//! The layout mirrors a spreadsheet pivot table: a page field line, the
//! measure caption, row labels down the side, column labels across the top,
//! and grand totals on both axes.

use std::{cmp::Ordering, collections::HashMap, fmt};

use itertools::Itertools;
use log::{debug, warn};

use crate::{
    config::SortDirection, error::ReportError, relation::Relation, report::ReportSpec,
};

pub const ALL_PAGES: &str = "(All)";
pub const BLANK_LABEL: &str = "(blank)";
pub const GRAND_TOTAL: &str = "Grand Total";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotRow {
    pub label: String,
    pub counts: Vec<usize>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotTable {
    pub row_field: String,
    pub column_field: String,
    pub page_field: String,
    /// Page value actually applied; [`ALL_PAGES`] when the filter degraded.
    pub page_value: String,
    pub measure_label: String,
    pub column_labels: Vec<String>,
    pub rows: Vec<PivotRow>,
    pub column_totals: Vec<usize>,
    pub grand_total: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PivotCell {
    Empty,
    Text(String),
    Count(usize),
}

impl fmt::Display for PivotCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PivotCell::Empty => Ok(()),
            PivotCell::Text(text) => f.write_str(text),
            PivotCell::Count(count) => write!(f, "{count}"),
        }
    }
}

impl PivotTable {
    pub fn build(relation: &Relation, spec: &ReportSpec) -> Result<Self, ReportError> {
        spec.validate(relation)?;
        let index = |name: &str| {
            relation
                .column_index(name)
                .ok_or_else(|| ReportError::InvalidSpec {
                    missing: vec![name.to_string()],
                })
        };
        let row_idx = index(&spec.row_field)?;
        let column_idx = index(&spec.column_field)?;
        let page_idx = index(&spec.page_filter.field)?;
        let measure_idx = index(&spec.measure.source)?;

        let mut warnings = Vec::new();
        let wanted = spec.page_filter.value.trim();
        let mut page_value = wanted.to_string();
        let mut selected: Vec<&Vec<String>> = relation
            .rows()
            .iter()
            .filter(|row| wanted == ALL_PAGES || row[page_idx].trim() == wanted)
            .collect();
        if wanted != ALL_PAGES && selected.is_empty() {
            let warning = format!(
                "No rows have {} = '{wanted}'; pivot page filter shows {ALL_PAGES}",
                spec.page_filter.field
            );
            warn!("{warning}");
            warnings.push(warning);
            page_value = ALL_PAGES.to_string();
            selected = relation.rows().iter().collect();
        }
        debug!(
            "Pivot page {} = '{page_value}' selects {} of {} row(s)",
            spec.page_filter.field,
            selected.len(),
            relation.row_count()
        );

        let row_labels: Vec<String> = selected
            .iter()
            .map(|row| label(&row[row_idx]))
            .unique()
            .collect();
        let column_labels = sort_column_labels(
            selected
                .iter()
                .map(|row| label(&row[column_idx]))
                .unique()
                .collect(),
        );
        let cells: HashMap<(String, String), usize> = selected
            .iter()
            .filter(|row| !row[measure_idx].trim().is_empty())
            .map(|row| (label(&row[row_idx]), label(&row[column_idx])))
            .counts();

        let direction = spec.sort.direction;
        let rows: Vec<PivotRow> = row_labels
            .into_iter()
            .map(|row_label| {
                let counts: Vec<usize> = column_labels
                    .iter()
                    .map(|column_label| {
                        cells
                            .get(&(row_label.clone(), column_label.clone()))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect();
                let total = counts.iter().sum();
                PivotRow {
                    label: row_label,
                    counts,
                    total,
                }
            })
            .sorted_by(|a, b| compare_rows(a, b, direction))
            .collect();

        let column_totals: Vec<usize> = (0..column_labels.len())
            .map(|idx| rows.iter().map(|row| row.counts[idx]).sum())
            .collect();
        let grand_total = column_totals.iter().sum();

        Ok(Self {
            row_field: spec.row_field.clone(),
            column_field: spec.column_field.clone(),
            page_field: spec.page_filter.field.clone(),
            page_value,
            measure_label: spec.measure.label.clone(),
            column_labels,
            rows,
            column_totals,
            grand_total,
            warnings,
        })
    }

    pub fn row(&self, label: &str) -> Option<&PivotRow> {
        self.rows.iter().find(|row| row.label == label)
    }

    /// Count for one `(row, column)` pair; zero when either label is absent.
    pub fn count(&self, row_label: &str, column_label: &str) -> usize {
        let Some(column) = self.column_labels.iter().position(|c| c == column_label) else {
            return 0;
        };
        self.row(row_label).map_or(0, |row| row.counts[column])
    }

    /// Spreadsheet layout, one inner vector per sheet row, all rows equally wide.
    pub fn to_grid(&self) -> Vec<Vec<PivotCell>> {
        let width = self.column_labels.len() + 2;
        let pad = |mut cells: Vec<PivotCell>| {
            cells.resize(width, PivotCell::Empty);
            cells
        };
        let count_or_empty = |count: usize| {
            if count == 0 {
                PivotCell::Empty
            } else {
                PivotCell::Count(count)
            }
        };

        let mut grid = Vec::with_capacity(self.rows.len() + 5);
        grid.push(pad(vec![
            PivotCell::Text(self.page_field.clone()),
            PivotCell::Text(self.page_value.clone()),
        ]));
        grid.push(pad(Vec::new()));
        grid.push(pad(vec![
            PivotCell::Text(self.measure_label.clone()),
            PivotCell::Text("Column Labels".to_string()),
        ]));

        let mut header = vec![PivotCell::Text("Row Labels".to_string())];
        header.extend(self.column_labels.iter().cloned().map(PivotCell::Text));
        header.push(PivotCell::Text(GRAND_TOTAL.to_string()));
        grid.push(header);

        for row in &self.rows {
            let mut cells = vec![PivotCell::Text(row.label.clone())];
            cells.extend(row.counts.iter().copied().map(count_or_empty));
            cells.push(PivotCell::Count(row.total));
            grid.push(cells);
        }

        let mut totals = vec![PivotCell::Text(GRAND_TOTAL.to_string())];
        totals.extend(self.column_totals.iter().copied().map(PivotCell::Count));
        totals.push(PivotCell::Count(self.grand_total));
        grid.push(totals);
        grid
    }

    /// Headers and body for plain-text display, grand total row included.
    pub fn to_rows(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut headers = vec![self.row_field.clone()];
        headers.extend(self.column_labels.iter().cloned());
        headers.push(GRAND_TOTAL.to_string());

        let mut rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                std::iter::once(row.label.clone())
                    .chain(row.counts.iter().map(|c| c.to_string()))
                    .chain(std::iter::once(row.total.to_string()))
                    .collect()
            })
            .collect();
        rows.push(
            std::iter::once(GRAND_TOTAL.to_string())
                .chain(self.column_totals.iter().map(|c| c.to_string()))
                .chain(std::iter::once(self.grand_total.to_string()))
                .collect(),
        );
        (headers, rows)
    }
}

fn label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        BLANK_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

fn compare_rows(a: &PivotRow, b: &PivotRow, direction: SortDirection) -> Ordering {
    let by_total = match direction {
        SortDirection::Ascending => a.total.cmp(&b.total),
        SortDirection::Descending => b.total.cmp(&a.total),
    };
    by_total.then_with(|| a.label.cmp(&b.label))
}

/// Numeric order when every non-blank label is a number, lexical otherwise.
/// `(blank)` always sorts last.
fn sort_column_labels(mut labels: Vec<String>) -> Vec<String> {
    let numeric = labels
        .iter()
        .filter(|l| *l != BLANK_LABEL)
        .all(|l| l.parse::<f64>().is_ok());
    labels.sort_by(|a, b| {
        let blanks = (a == BLANK_LABEL).cmp(&(b == BLANK_LABEL));
        blanks.then_with(|| {
            if numeric {
                as_number(a).total_cmp(&as_number(b))
            } else {
                a.cmp(b)
            }
        })
    });
    labels
}

fn as_number(label: &str) -> f64 {
    label.parse().unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportSettings;

    fn tickets(rows: &[[&str; 4]]) -> Relation {
        Relation::new(
            ["Case Number", "SLA", "LineItem Status", "Technician Name"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
        .expect("relation")
    }

    fn spec(relation: &Relation) -> ReportSpec {
        ReportSpec::build(relation, &ReportSettings::default()).expect("spec")
    }

    #[test]
    fn counts_filtered_rows_by_technician_and_age() {
        let relation = tickets(&[
            ["1", "2", "New", "Raj"],
            ["2", "10", "New", "Raj"],
            ["3", "2", "New", "Mei"],
            ["4", "2", "Closed", "Mei"],
            ["5", "2", "New", "Raj"],
        ]);
        let pivot = PivotTable::build(&relation, &spec(&relation)).expect("pivot");
        assert_eq!(pivot.page_value, "New");
        assert_eq!(pivot.column_labels, vec!["2", "10"]);
        assert_eq!(pivot.count("Raj", "2"), 2);
        assert_eq!(pivot.count("Raj", "10"), 1);
        assert_eq!(pivot.count("Mei", "2"), 1);
        assert_eq!(pivot.rows[0].label, "Raj");
        assert_eq!(pivot.column_totals, vec![3, 1]);
        assert_eq!(pivot.grand_total, 4);
        assert!(pivot.warnings.is_empty());
    }

    #[test]
    fn missing_page_value_degrades_to_all() {
        let relation = tickets(&[["1", "0", "Closed", "Raj"], ["2", "1", "Assigned", "Mei"]]);
        let pivot = PivotTable::build(&relation, &spec(&relation)).expect("pivot");
        assert_eq!(pivot.page_value, ALL_PAGES);
        assert_eq!(pivot.grand_total, 2);
        assert_eq!(pivot.warnings.len(), 1);
    }

    #[test]
    fn ties_break_by_ascending_label() {
        let relation = tickets(&[
            ["1", "0", "New", "Zoe"],
            ["2", "0", "New", "Amir"],
            ["3", "0", "New", "Mei"],
            ["4", "1", "New", "Mei"],
        ]);
        let pivot = PivotTable::build(&relation, &spec(&relation)).expect("pivot");
        let order: Vec<&str> = pivot.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(order, vec!["Mei", "Amir", "Zoe"]);

        let mut ascending = spec(&relation);
        ascending.sort.direction = SortDirection::Ascending;
        let pivot = PivotTable::build(&relation, &ascending).expect("pivot");
        let order: Vec<&str> = pivot.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(order, vec!["Amir", "Zoe", "Mei"]);
    }

    #[test]
    fn blank_labels_and_empty_measures() {
        let relation = tickets(&[["1", "3", "New", ""], ["", "3", "New", "Raj"]]);
        let pivot = PivotTable::build(&relation, &spec(&relation)).expect("pivot");
        assert_eq!(pivot.count(BLANK_LABEL, "3"), 1);
        assert_eq!(pivot.row("Raj").map(|r| r.total), Some(0));
        assert_eq!(pivot.grand_total, 1);
    }

    #[test]
    fn lexical_column_order_when_labels_are_not_numbers() {
        let labels = sort_column_labels(vec![
            "b".to_string(),
            BLANK_LABEL.to_string(),
            "a".to_string(),
        ]);
        assert_eq!(labels, vec!["a", "b", BLANK_LABEL]);
        let labels = sort_column_labels(vec!["12".into(), "9".into(), "100".into()]);
        assert_eq!(labels, vec!["9", "12", "100"]);
    }

    #[test]
    fn grid_has_page_line_headers_and_totals() {
        let relation = tickets(&[["1", "0", "New", "Raj"], ["2", "4", "New", "Raj"]]);
        let pivot = PivotTable::build(&relation, &spec(&relation)).expect("pivot");
        let grid = pivot.to_grid();
        assert_eq!(grid.len(), 6);
        assert!(grid.iter().all(|row| row.len() == 4));
        assert_eq!(grid[0][0], PivotCell::Text("LineItem Status".into()));
        assert_eq!(grid[0][1], PivotCell::Text("New".into()));
        assert_eq!(grid[2][0], PivotCell::Text("Count of Case Number".into()));
        assert_eq!(grid[3][3], PivotCell::Text(GRAND_TOTAL.into()));
        assert_eq!(grid[5][3], PivotCell::Count(2));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let relation = tickets(&[]);
        let mut bad = spec(&relation);
        bad.column_field = "Region".into();
        assert!(matches!(
            PivotTable::build(&relation, &bad),
            Err(ReportError::InvalidSpec { .. })
        ));
    }
}
