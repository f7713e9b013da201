use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{CollisionPolicy, RemarksModeSetting};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile ticket exports against a lookup workbook and build SLA reports",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize a ticket export, merge lookup remarks, and write the report
    Report(ReportArgs),
    /// Print the first normalized rows of a ticket export as a table
    Preview(PreviewArgs),
    /// List the columns of a CSV file or workbook sheet
    Columns(ColumnsArgs),
    /// Print the effective configuration as YAML
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub normalize: NormalizeArgs,
    /// Output report path; defaults to Output_<timestamp>.xlsx in --output-dir
    #[arg(short = 'o', long = "output", conflicts_with = "output_dir")]
    pub output: Option<PathBuf>,
    /// Directory for the timestamped default output name
    #[arg(long = "output-dir", default_value = ".")]
    pub output_dir: PathBuf,
    /// Lookup workbook whose sheet supplies remarks by case number
    #[arg(long)]
    pub lookup: Option<PathBuf>,
    /// Lookup key column (defaults to "Case Number")
    #[arg(long = "key-column")]
    pub key_column: Option<String>,
    /// Lookup value column (defaults to "Remarks")
    #[arg(long = "value-column")]
    pub value_column: Option<String>,
    /// How lookup values reconcile with existing remarks
    #[arg(long, value_enum)]
    pub policy: Option<CollisionPolicy>,
    /// Page filter value for the pivot status field (defaults to "New")
    #[arg(long = "page-filter")]
    pub page_filter: Option<String>,
    /// Ask on the terminal when a lookup column cannot be resolved
    #[arg(long)]
    pub interactive: bool,
    /// Report output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Xlsx)]
    pub format: OutputFormat,
    /// Character encoding for csv output (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Print the pivot view after writing the report
    #[arg(long = "print-pivot")]
    pub print_pivot: bool,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub normalize: NormalizeArgs,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// CSV file or workbook to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Workbook sheet to read (defaults to the configured lookup sheet)
    #[arg(long)]
    pub sheet: Option<String>,
    /// Optional YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Force one input encoding instead of the candidate list
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// YAML configuration to start from instead of the defaults
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Write the configuration to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

/// Where the ticket export comes from and how to decode it.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Ticket export CSV
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Optional YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Force one input encoding instead of the candidate list
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Reference time for the SLA age (day-first or ISO); defaults to the local clock
    #[arg(long)]
    pub now: Option<String>,
    /// How remarks are filled when the export has no remarks column
    #[arg(long = "remarks-mode", value_enum)]
    pub remarks_mode: Option<RemarksModeSetting>,
    /// Seed for fallback remarks; unseeded runs are not reproducible
    #[arg(long)]
    pub seed: Option<u64>,
    /// Fill missing descriptive columns with empty values instead of failing
    #[arg(long = "lenient-columns")]
    pub lenient_columns: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Styled workbook, falling back to csv when the workbook cannot be written
    Xlsx,
    /// Delimited data and pivot files
    Csv,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
