//! Pipeline configuration.
//!
//! Everything the original tool asked for interactively, or kept as process
//! constants, is a field here. A YAML file loaded through
//! [`crate::yaml_provider`] supplies the base values. Every field has a serde
//! default, so a partial file is valid. CLI flags are applied on top.
//!
//! ```yaml
//! lookup:
//!   key_column: Ticket ID
//!   policy: replace
//! normalize:
//!   now: 2024-03-01 09:00:00
//!   remarks_mode: empty
//! report:
//!   default_page_value: Assigned
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{data, io_utils, yaml_provider};

pub const DEFAULT_FALLBACK_REMARKS: &[&str] = &[
    "visit pending",
    "customer not present",
    "call closed by 4 pm",
    "part pending",
    "custom remarks",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: InputSettings,
    pub columns: TicketColumns,
    pub normalize: NormalizeSettings,
    pub lookup: LookupSettings,
    pub report: ReportSettings,
    pub style: ReportStyle,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: PipelineConfig = yaml_provider::load_from_path(path)
            .with_context(|| format!("Loading configuration from {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        io_utils::resolve_encoding_list(&self.input.encodings)
            .context("Validating input.encodings")?;
        if let Some(raw) = &self.normalize.now {
            data::parse_day_first_timestamp(raw).context("Validating normalize.now")?;
        }
        if matches!(self.normalize.remarks_mode, RemarksModeSetting::Fallback)
            && self.normalize.fallback_remarks.is_empty()
        {
            anyhow::bail!("normalize.fallback_remarks must not be empty in fallback mode");
        }
        self.style.header_color_rgb().context("Validating style.header_color")?;
        self.style.metric_color_rgb().context("Validating style.metric_color")?;
        Ok(())
    }

    pub fn fixed_now(&self) -> Result<Option<NaiveDateTime>> {
        self.normalize
            .now
            .as_deref()
            .map(data::parse_day_first_timestamp)
            .transpose()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Candidate encodings for delimited sources, tried in order.
    pub encodings: Vec<String>,
    /// Sheet read from lookup workbooks.
    pub lookup_sheet: String,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            encodings: io_utils::DEFAULT_ENCODING_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lookup_sheet: "Sheet1".to_string(),
        }
    }
}

/// Column names of the ticket export family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketColumns {
    pub case_id: String,
    pub created: String,
    pub age: String,
    pub customer: String,
    pub street: String,
    pub zip: String,
    pub complaint: String,
    pub product: String,
    pub status: String,
    pub technician: String,
    pub remarks: String,
    pub technician_remarks: String,
}

impl Default for TicketColumns {
    fn default() -> Self {
        Self {
            case_id: "Case Number".to_string(),
            created: "Created Date".to_string(),
            age: "SLA".to_string(),
            customer: "Customer Name".to_string(),
            street: "Street".to_string(),
            zip: "Zip/Postal Code".to_string(),
            complaint: "Customer Complaint".to_string(),
            product: "Product Description".to_string(),
            status: "LineItem Status".to_string(),
            technician: "Technician Name".to_string(),
            remarks: "Remarks".to_string(),
            technician_remarks: "Technician Remarks".to_string(),
        }
    }
}

impl TicketColumns {
    pub fn descriptive(&self) -> [&str; 6] {
        [
            &self.customer,
            &self.street,
            &self.zip,
            &self.complaint,
            &self.product,
            &self.technician,
        ]
    }

    /// Final projection order, before any extra columns.
    pub fn projection(&self) -> Vec<String> {
        vec![
            self.case_id.clone(),
            self.age.clone(),
            self.customer.clone(),
            self.street.clone(),
            self.zip.clone(),
            self.complaint.clone(),
            self.product.clone(),
            self.status.clone(),
            self.technician.clone(),
            self.remarks.clone(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum RemarksModeSetting {
    /// Random per-row filler from the fallback vocabulary
    #[default]
    Fallback,
    /// Leave remarks empty and rely on the lookup merge
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    /// Fixed reference time for the age metric; local clock when unset.
    pub now: Option<String>,
    pub remarks_mode: RemarksModeSetting,
    pub fallback_remarks: Vec<String>,
    /// Seed for fallback remarks. Unseeded runs are not reproducible.
    pub seed: Option<u64>,
    /// Fail on missing descriptive columns instead of filling them empty.
    pub strict_columns: bool,
    /// Input columns carried after the fixed projection when present.
    pub extra_columns: Vec<String>,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            now: None,
            remarks_mode: RemarksModeSetting::default(),
            fallback_remarks: DEFAULT_FALLBACK_REMARKS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            seed: None,
            strict_columns: true,
            extra_columns: Vec::new(),
        }
    }
}

/// How a lookup value reconciles with the value already in the target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Lookup value wins when present; otherwise the original is kept
    #[default]
    Overlay,
    /// Lookup value wins when present; otherwise the cell is cleared
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupSettings {
    pub key_column: Option<String>,
    pub value_column: Option<String>,
    pub conventional_key: String,
    pub conventional_value: String,
    /// Primary column that receives looked-up values.
    pub target_column: String,
    pub policy: CollisionPolicy,
    /// Maximum duplicate lookup keys tolerated before the merge is abandoned.
    pub duplicate_tolerance: Option<usize>,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            key_column: None,
            value_column: None,
            conventional_key: "Case Number".to_string(),
            conventional_value: "Remarks".to_string(),
            target_column: "Remarks".to_string(),
            policy: CollisionPolicy::default(),
            duplicate_tolerance: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub row_field: String,
    pub column_field: String,
    pub page_field: String,
    pub default_page_value: String,
    pub measure_field: String,
    pub measure_label: String,
    pub sort_direction: SortDirection,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            row_field: "Technician Name".to_string(),
            column_field: "SLA".to_string(),
            page_field: "LineItem Status".to_string(),
            default_page_value: "New".to_string(),
            measure_field: "Case Number".to_string(),
            measure_label: "Count of Case Number".to_string(),
            sort_direction: SortDirection::Descending,
        }
    }
}

/// Presentation settings injected into the report renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportStyle {
    pub data_sheet: String,
    pub pivot_sheet: String,
    /// Hex RGB fill of the header row.
    pub header_color: String,
    /// Hex RGB fill of the metric column.
    pub metric_color: String,
    pub metric_column: String,
    /// Widths applied to the leading data columns, left to right.
    pub column_widths: Vec<f64>,
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            data_sheet: "Sheet1".to_string(),
            pivot_sheet: "Pivot_View".to_string(),
            header_color: "0070C0".to_string(),
            metric_color: "FFC7CE".to_string(),
            metric_column: "SLA".to_string(),
            column_widths: vec![18.0, 8.0, 22.0, 50.0, 15.0, 20.0, 35.0, 20.0, 22.0, 30.0],
        }
    }
}

impl ReportStyle {
    pub fn header_color_rgb(&self) -> Result<u32> {
        parse_hex_rgb(&self.header_color)
    }

    pub fn metric_color_rgb(&self) -> Result<u32> {
        parse_hex_rgb(&self.metric_color)
    }
}

fn parse_hex_rgb(value: &str) -> Result<u32> {
    let trimmed = value.trim().trim_start_matches('#');
    anyhow::ensure!(
        trimmed.len() == 6,
        "Color '{value}' must be six hex digits"
    );
    u32::from_str_radix(trimmed, 16).with_context(|| format!("Color '{value}' is not hex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: PipelineConfig = yaml_provider::from_str(
            "lookup:\n  key_column: Ticket ID\n  policy: replace\nreport:\n  default_page_value: Assigned\n",
        )
        .expect("parse");
        assert_eq!(config.lookup.key_column.as_deref(), Some("Ticket ID"));
        assert_eq!(config.lookup.policy, CollisionPolicy::Replace);
        assert_eq!(config.lookup.conventional_value, "Remarks");
        assert_eq!(config.report.default_page_value, "Assigned");
        assert_eq!(config.style.column_widths.len(), 10);
        assert!(config.normalize.strict_columns);
    }

    #[test]
    fn empty_document_is_the_default_config() {
        let config: PipelineConfig = yaml_provider::from_str("").expect("parse");
        assert_eq!(config.input.lookup_sheet, "Sheet1");
        assert_eq!(config.input.encodings, vec!["utf-8", "latin1", "utf-16"]);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.input.encodings = vec!["ebcdic-ish".to_string()];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.normalize.now = Some("not a date".to_string());
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.style.header_color = "blue".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn fixed_now_parses_day_first() {
        let mut config = PipelineConfig::default();
        config.normalize.now = Some("02/03/2024 10:00".to_string());
        let now = config.fixed_now().expect("parse").expect("set");
        assert_eq!(now.format("%Y-%m-%d %H:%M").to_string(), "2024-03-02 10:00");
    }

    #[test]
    fn hex_colors_parse_with_or_without_hash() {
        assert_eq!(parse_hex_rgb("#0070C0").unwrap(), 0x0070C0);
        assert_eq!(parse_hex_rgb("FFC7CE").unwrap(), 0xFFC7CE);
    }
}
