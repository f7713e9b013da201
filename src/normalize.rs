//! Ticket schema normalization.
//!
//! Turns a raw export into the fixed report projection:
//!
//! - validates the required columns;
//! - derives the age-in-days metric from the creation timestamp;
//! - defaults the status;
//! - resolves the remarks column.
//!
//! Normalizing an already-normalized relation is a no-op. When the age column
//! exists and the creation column does not, the ages pass through unchanged.

use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};
use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};

use crate::{
    config::{NormalizeSettings, RemarksModeSetting, TicketColumns},
    data::{age_in_days, clean_cell, is_null_sentinel, parse_day_first_timestamp},
    error::ReportError,
    relation::Relation,
};

pub const DEFAULT_STATUS: &str = "New";

/// How remarks are populated when the export carries no remarks column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemarksMode {
    /// Per-row random pick from `vocabulary`. Reproducible only with a seed.
    Fallback {
        vocabulary: Vec<String>,
        seed: Option<u64>,
    },
    /// Leave remarks empty; the lookup merge is expected to fill them.
    Empty,
}

/// Which branch produced the remarks column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemarksSource {
    TechnicianRemarks,
    Remarks,
    Fallback,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnPolicy {
    /// Missing descriptive columns are a schema error.
    #[default]
    Strict,
    /// Missing descriptive columns are filled with empty text.
    FillMissing,
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub now: NaiveDateTime,
    pub remarks_mode: RemarksMode,
    pub column_policy: ColumnPolicy,
    pub columns: TicketColumns,
    pub extra_columns: Vec<String>,
}

impl NormalizeOptions {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now,
            remarks_mode: RemarksMode::Empty,
            column_policy: ColumnPolicy::Strict,
            columns: TicketColumns::default(),
            extra_columns: Vec::new(),
        }
    }

    /// Builds options from configuration; `now` falls back to the local clock.
    pub fn from_settings(
        settings: &NormalizeSettings,
        columns: &TicketColumns,
        now: Option<NaiveDateTime>,
    ) -> Self {
        let remarks_mode = match settings.remarks_mode {
            RemarksModeSetting::Fallback => RemarksMode::Fallback {
                vocabulary: settings.fallback_remarks.clone(),
                seed: settings.seed,
            },
            RemarksModeSetting::Empty => RemarksMode::Empty,
        };
        Self {
            now: now.unwrap_or_else(|| Local::now().naive_local()),
            remarks_mode,
            column_policy: if settings.strict_columns {
                ColumnPolicy::Strict
            } else {
                ColumnPolicy::FillMissing
            },
            columns: columns.clone(),
            extra_columns: settings.extra_columns.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub relation: Relation,
    pub remarks_source: RemarksSource,
    pub unparsed_dates: usize,
}

#[derive(Debug, Clone)]
pub struct TicketNormalizer {
    options: NormalizeOptions,
}

impl TicketNormalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn remarks_mode(&self) -> &RemarksMode {
        &self.options.remarks_mode
    }

    pub fn normalize(&self, input: &Relation) -> Result<Normalized, ReportError> {
        let columns = &self.options.columns;
        self.check_required(input)?;

        let mut working = input.clone();
        let unparsed_dates = self.derive_age(&mut working)?;
        self.default_status(&mut working)?;
        let remarks_source = self.resolve_remarks(&mut working)?;
        self.fill_descriptive(&mut working)?;

        let mut projection = columns.projection();
        for extra in &self.options.extra_columns {
            if working.has_column(extra) && !projection.contains(extra) {
                projection.push(extra.clone());
            }
        }
        let relation = working.project(&projection)?;
        info!(
            "Normalized {} ticket row(s); remarks from {:?}",
            relation.row_count(),
            remarks_source
        );
        Ok(Normalized {
            relation,
            remarks_source,
            unparsed_dates,
        })
    }

    fn check_required(&self, input: &Relation) -> Result<(), ReportError> {
        let columns = &self.options.columns;
        let mut required: Vec<&str> = vec![columns.case_id.as_str()];
        if !input.has_column(&columns.age) {
            required.push(columns.created.as_str());
        }
        if self.options.column_policy == ColumnPolicy::Strict {
            required.extend(columns.descriptive());
        }
        let missing = input.missing_columns(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReportError::Schema { missing })
        }
    }

    /// Writes the age column and returns how many timestamps failed to parse.
    fn derive_age(&self, relation: &mut Relation) -> Result<usize, ReportError> {
        let columns = &self.options.columns;
        let now = self.options.now;
        let mut unparsed = 0usize;
        let ages = match relation.column_values(&columns.created) {
            Some(created) => created
                .into_iter()
                .map(|raw| {
                    let parsed = parse_day_first_timestamp(raw).ok();
                    if parsed.is_none() {
                        unparsed += 1;
                        if !is_null_sentinel(raw) {
                            debug!("Unparseable {} '{raw}' treated as missing", columns.created);
                        }
                    }
                    age_in_days(parsed, now).to_string()
                })
                .collect::<Vec<_>>(),
            None => relation
                .column_values(&columns.age)
                .unwrap_or_default()
                .into_iter()
                .map(|raw| raw.trim().parse::<i64>().unwrap_or(0).max(0).to_string())
                .collect(),
        };
        if unparsed > 0 {
            warn!(
                "{unparsed} row(s) had no parseable {}; their {} is 0",
                columns.created, columns.age
            );
        }
        relation.set_column(&columns.age, ages)?;
        Ok(unparsed)
    }

    fn default_status(&self, relation: &mut Relation) -> Result<(), ReportError> {
        let status = &self.options.columns.status;
        let values = match relation.column_values(status) {
            Some(existing) => existing
                .into_iter()
                .map(|raw| {
                    if is_null_sentinel(raw) {
                        DEFAULT_STATUS.to_string()
                    } else {
                        raw.to_string()
                    }
                })
                .collect(),
            None => {
                debug!("No {status} column; defaulting every row to '{DEFAULT_STATUS}'");
                vec![DEFAULT_STATUS.to_string(); relation.row_count()]
            }
        };
        relation.set_column(status, values)
    }

    fn resolve_remarks(&self, relation: &mut Relation) -> Result<RemarksSource, ReportError> {
        let columns = &self.options.columns;
        let (source, values) = if let Some(values) =
            relation.column_values(&columns.technician_remarks)
        {
            let cleaned = values.into_iter().map(clean_cell).collect::<Vec<_>>();
            (RemarksSource::TechnicianRemarks, cleaned)
        } else if let Some(values) = relation.column_values(&columns.remarks) {
            let cleaned = values.into_iter().map(clean_cell).collect::<Vec<_>>();
            (RemarksSource::Remarks, cleaned)
        } else {
            match &self.options.remarks_mode {
                RemarksMode::Fallback { vocabulary, seed } => {
                    if seed.is_none() {
                        warn!("No remarks column; filling with unseeded random fallback remarks");
                    } else {
                        info!("No remarks column; filling with seeded fallback remarks");
                    }
                    (
                        RemarksSource::Fallback,
                        fallback_remarks(vocabulary, *seed, relation.row_count()),
                    )
                }
                RemarksMode::Empty => {
                    info!("No remarks column; leaving remarks empty for the lookup merge");
                    (RemarksSource::Empty, vec![String::new(); relation.row_count()])
                }
            }
        };
        if source == RemarksSource::TechnicianRemarks {
            relation.drop_column(&columns.technician_remarks);
        }
        relation.set_column(&columns.remarks, values)?;
        Ok(source)
    }

    fn fill_descriptive(&self, relation: &mut Relation) -> Result<(), ReportError> {
        for name in self.options.columns.descriptive() {
            if !relation.has_column(name) {
                warn!("Column '{name}' missing from export; filling with empty values");
                relation.set_column(name, vec![String::new(); relation.row_count()])?;
            }
        }
        Ok(())
    }
}

fn fallback_remarks(vocabulary: &[String], seed: Option<u64>, rows: usize) -> Vec<String> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    (0..rows)
        .map(|_| vocabulary.choose(&mut rng).cloned().unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn full_headers() -> Vec<String> {
        strings(&[
            "Case Number",
            "Created Date",
            "Customer Name",
            "Street",
            "Zip/Postal Code",
            "Customer Complaint",
            "Product Description",
            "LineItem Status",
            "Technician Name",
            "Phone",
        ])
    }

    fn export(rows: Vec<Vec<String>>) -> Relation {
        Relation::new(full_headers(), rows).expect("relation")
    }

    fn row(case: &str, created: &str, status: &str) -> Vec<String> {
        strings(&[
            case, created, "Ann", "1 Main St", "12345", "No power", "Fridge", status, "Raj",
            "555-0100",
        ])
    }

    #[test]
    fn derives_age_status_and_projection() {
        let normalizer = TicketNormalizer::new(NormalizeOptions::new(now()));
        let output = normalizer
            .normalize(&export(vec![
                row("1", "01/01/2024 08:00", "Assigned"),
                row("2", "not a date", ""),
            ]))
            .expect("normalize");
        let relation = output.relation;
        assert_eq!(
            relation.headers(),
            strings(&[
                "Case Number",
                "SLA",
                "Customer Name",
                "Street",
                "Zip/Postal Code",
                "Customer Complaint",
                "Product Description",
                "LineItem Status",
                "Technician Name",
                "Remarks",
            ])
        );
        assert_eq!(relation.cell(0, "SLA"), Some("30"));
        assert_eq!(relation.cell(1, "SLA"), Some("0"));
        assert_eq!(relation.cell(0, "LineItem Status"), Some("Assigned"));
        assert_eq!(relation.cell(1, "LineItem Status"), Some("New"));
        assert_eq!(output.unparsed_dates, 1);
        assert_eq!(output.remarks_source, RemarksSource::Empty);
    }

    #[test]
    fn missing_status_column_defaults_to_new() {
        let headers = strings(&["Case Number", "Created Date"]);
        let input = Relation::new(headers, vec![strings(&["7", "02/01/2024"])]).expect("rel");
        let mut options = NormalizeOptions::new(now());
        options.column_policy = ColumnPolicy::FillMissing;
        let output = TicketNormalizer::new(options)
            .normalize(&input)
            .expect("normalize");
        assert_eq!(output.relation.cell(0, "LineItem Status"), Some("New"));
        assert_eq!(output.relation.cell(0, "Technician Name"), Some(""));
    }

    #[test]
    fn technician_remarks_take_precedence_over_remarks() {
        let mut headers = full_headers();
        headers.push("Remarks".into());
        headers.push("Technician Remarks".into());
        let mut cells = row("1", "01/01/2024", "New");
        cells.push("generic".into());
        cells.push("from tech".into());
        let input = Relation::new(headers, vec![cells]).expect("rel");
        let output = TicketNormalizer::new(NormalizeOptions::new(now()))
            .normalize(&input)
            .expect("normalize");
        assert_eq!(output.remarks_source, RemarksSource::TechnicianRemarks);
        assert_eq!(output.relation.cell(0, "Remarks"), Some("from tech"));
        assert!(!output.relation.has_column("Technician Remarks"));
    }

    #[test]
    fn remarks_null_sentinels_become_empty() {
        let mut headers = full_headers();
        headers.push("Remarks".into());
        let mut cells = row("1", "01/01/2024", "New");
        cells.push("NaN".into());
        let input = Relation::new(headers, vec![cells]).expect("rel");
        let output = TicketNormalizer::new(NormalizeOptions::new(now()))
            .normalize(&input)
            .expect("normalize");
        assert_eq!(output.remarks_source, RemarksSource::Remarks);
        assert_eq!(output.relation.cell(0, "Remarks"), Some(""));
    }

    #[test]
    fn seeded_fallback_remarks_are_reproducible() {
        let mut options = NormalizeOptions::new(now());
        options.remarks_mode = RemarksMode::Fallback {
            vocabulary: strings(&["visit pending", "part pending"]),
            seed: Some(42),
        };
        let normalizer = TicketNormalizer::new(options);
        let input = export((0..20).map(|i| row(&i.to_string(), "", "")).collect());
        let first = normalizer.normalize(&input).expect("first");
        let second = normalizer.normalize(&input).expect("second");
        assert_eq!(first.remarks_source, RemarksSource::Fallback);
        assert_eq!(first.relation, second.relation);
        for value in first.relation.column_values("Remarks").unwrap() {
            assert!(value == "visit pending" || value == "part pending");
        }
    }

    #[test]
    fn strict_policy_names_every_missing_column() {
        let input = Relation::new(strings(&["Created Date", "Street"]), Vec::new()).expect("rel");
        let err = TicketNormalizer::new(NormalizeOptions::new(now()))
            .normalize(&input)
            .unwrap_err();
        match err {
            ReportError::Schema { missing } => {
                assert_eq!(
                    missing,
                    strings(&[
                        "Case Number",
                        "Customer Name",
                        "Zip/Postal Code",
                        "Customer Complaint",
                        "Product Description",
                        "Technician Name",
                    ])
                );
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn created_date_is_required_without_an_age_column() {
        let input = Relation::new(strings(&["Case Number"]), Vec::new()).expect("rel");
        let mut options = NormalizeOptions::new(now());
        options.column_policy = ColumnPolicy::FillMissing;
        match TicketNormalizer::new(options).normalize(&input) {
            Err(ReportError::Schema { missing }) => assert_eq!(missing, strings(&["Created Date"])),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn normalizing_twice_is_idempotent() {
        let normalizer = TicketNormalizer::new(NormalizeOptions::new(now()));
        let once = normalizer
            .normalize(&export(vec![
                row("1", "15/01/2024", ""),
                row("2", "garbage", "Closed"),
            ]))
            .expect("once");
        let twice = normalizer.normalize(&once.relation).expect("twice");
        assert_eq!(once.relation, twice.relation);
        assert_eq!(twice.unparsed_dates, 0);
        assert_eq!(twice.remarks_source, RemarksSource::Remarks);
    }

    #[test]
    fn extra_columns_follow_the_fixed_projection() {
        let mut options = NormalizeOptions::new(now());
        options.extra_columns = strings(&["Phone", "Region"]);
        let output = TicketNormalizer::new(options)
            .normalize(&export(vec![row("1", "01/01/2024", "New")]))
            .expect("normalize");
        let headers = output.relation.headers();
        assert_eq!(headers.last().map(String::as_str), Some("Phone"));
        assert!(!output.relation.has_column("Region"));
    }
}
