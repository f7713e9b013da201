//! In-memory table of text cells.
//!
//! A [`Relation`] is an ordered list of unique column names over an ordered
//! list of rows. Every row carries exactly one cell per column; typed
//! operations parse cells on demand.

use std::collections::HashMap;

use crate::error::ReportError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relation {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Relation {
    /// Builds a relation, padding short rows with empty cells.
    ///
    /// Rows wider than the header and duplicate header names are rejected.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, ReportError> {
        let mut relation = Relation {
            headers: Vec::with_capacity(headers.len()),
            rows: Vec::with_capacity(rows.len()),
        };
        for header in headers {
            relation.ensure_unique(&header)?;
            relation.headers.push(header);
        }
        for row in rows {
            relation.push_row(row)?;
        }
        Ok(relation)
    }

    /// Builds a relation from raw headers, suffixing repeated names with
    /// `.1`, `.2`, ... so every column stays addressable.
    pub fn with_deduplicated_headers(
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self, ReportError> {
        Relation::new(deduplicate_headers(headers), rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// Cells of one column in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    pub fn push_row(&mut self, mut row: Vec<String>) -> Result<(), ReportError> {
        if row.len() > self.headers.len() {
            return Err(ReportError::Relation(format!(
                "row {} has {} cell(s) but only {} column(s) are declared",
                self.rows.len() + 1,
                row.len(),
                self.headers.len()
            )));
        }
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
        Ok(())
    }

    /// Appends a column, or overwrites it in place when the name already exists.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), ReportError> {
        if values.len() != self.rows.len() {
            return Err(ReportError::Relation(format!(
                "column '{name}' has {} value(s) for {} row(s)",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.headers.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Returns a new relation holding only `columns`, in the given order.
    pub fn project(&self, columns: &[String]) -> Result<Relation, ReportError> {
        let indices = columns
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| ReportError::Schema {
                        missing: vec![name.clone()],
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&idx| row[idx].clone()).collect())
            .collect();
        Relation::new(columns.to_vec(), rows)
    }

    pub fn missing_columns<'a, I>(&self, required: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        required
            .into_iter()
            .filter(|name| !self.has_column(name))
            .map(str::to_string)
            .collect()
    }

    fn ensure_unique(&self, name: &str) -> Result<(), ReportError> {
        if self.has_column(name) {
            Err(ReportError::Relation(format!(
                "duplicate column name '{name}'"
            )))
        } else {
            Ok(())
        }
    }
}

fn deduplicate_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut output: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let mut candidate = header.clone();
        while output.contains(&candidate) {
            let counter = seen.entry(header.clone()).or_insert(0);
            *counter += 1;
            candidate = format!("{header}.{counter}");
        }
        output.push(candidate);
    }
    output
}
