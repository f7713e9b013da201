//! Aligned plain-text tables for terminal output.

use std::{borrow::Cow, fmt::Write as _};

use crate::{pivot::PivotTable, relation::Relation};

const COLUMN_GAP: &str = "  ";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h).max(1)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(&sanitize_cell(cell)));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat((*w).max(3))).collect();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// First `limit` rows of `relation`; every row when `limit` is `None`.
pub fn render_relation(relation: &Relation, limit: Option<usize>) -> String {
    let shown = limit.map_or(relation.rows(), |n| {
        &relation.rows()[..n.min(relation.row_count())]
    });
    render_table(relation.headers(), shown)
}

pub fn render_pivot(pivot: &PivotTable) -> String {
    let (headers, rows) = pivot.to_rows();
    let mut output = String::new();
    let _ = writeln!(output, "{}: {}", pivot.page_field, pivot.page_value);
    let _ = writeln!(output, "{} by {}", pivot.measure_label, pivot.column_field);
    output.push_str(&render_table(&headers, &rows));
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join(COLUMN_GAP);
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn columns_align_to_the_widest_cell() {
        let rendered = render_table(
            &strings(&["Case Number", "SLA"]),
            &[strings(&["1", "12"]), strings(&["1002", "3"])],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Case Number  SLA");
        assert_eq!(lines[1], "-----------  ---");
        assert_eq!(lines[2], "1            12");
        assert_eq!(lines[3], "1002         3");
    }

    #[test]
    fn embedded_line_breaks_are_flattened() {
        let rendered = render_table(&strings(&["Remarks"]), &[strings(&["call\nback"])]);
        assert!(rendered.contains("call back"));
    }

    #[test]
    fn relation_preview_honours_the_limit() {
        let relation = Relation::new(
            strings(&["Case Number"]),
            vec![strings(&["1"]), strings(&["2"]), strings(&["3"])],
        )
        .expect("relation");
        assert_eq!(render_relation(&relation, Some(2)).lines().count(), 4);
        assert_eq!(render_relation(&relation, Some(10)).lines().count(), 5);
        assert_eq!(render_relation(&relation, None).lines().count(), 5);
    }
}
