//! Declarative description of the pivot view.

use itertools::Itertools;
use log::debug;

use crate::{
    config::{ReportSettings, SortDirection},
    error::ReportError,
    relation::Relation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFilter {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    /// Number of non-empty source cells.
    #[default]
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measure {
    pub source: String,
    pub label: String,
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    /// Field whose groups are ordered.
    pub field: String,
    pub direction: SortDirection,
    /// Measure label the groups are ordered by.
    pub by: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSpec {
    pub row_field: String,
    pub column_field: String,
    pub page_filter: PageFilter,
    pub measure: Measure,
    pub sort: SortOrder,
}

impl ReportSpec {
    /// Builds the spec and checks every referenced field against `relation`.
    pub fn build(relation: &Relation, settings: &ReportSettings) -> Result<Self, ReportError> {
        let spec = Self::from_settings(settings);
        spec.validate(relation)?;
        debug!(
            "Pivot: rows '{}', columns '{}', filter '{}' = '{}'",
            spec.row_field, spec.column_field, spec.page_filter.field, spec.page_filter.value
        );
        Ok(spec)
    }

    pub fn from_settings(settings: &ReportSettings) -> Self {
        Self {
            row_field: settings.row_field.clone(),
            column_field: settings.column_field.clone(),
            page_filter: PageFilter {
                field: settings.page_field.clone(),
                value: settings.default_page_value.clone(),
            },
            measure: Measure {
                source: settings.measure_field.clone(),
                label: settings.measure_label.clone(),
                aggregation: Aggregation::Count,
            },
            sort: SortOrder {
                field: settings.row_field.clone(),
                direction: settings.sort_direction,
                by: settings.measure_label.clone(),
            },
        }
    }

    pub fn fields(&self) -> [&str; 4] {
        [
            &self.row_field,
            &self.column_field,
            &self.page_filter.field,
            &self.measure.source,
        ]
    }

    pub fn validate(&self, relation: &Relation) -> Result<(), ReportError> {
        let missing = relation.missing_columns(self.fields().into_iter().unique());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReportError::InvalidSpec { missing })
        }
    }
}
