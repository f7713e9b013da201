//! Failure taxonomy for the reconciliation pipeline.
//!
//! Ingestion and schema failures abort a run. Join, merge, spec and pivot
//! failures degrade the report instead: the pipeline records them as warnings
//! and still writes the primary data sheet.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Unable to read {path:?}; tried {}", format_attempts(.attempts))]
    UnreadableSource {
        path: PathBuf,
        attempts: Vec<String>,
    },

    #[error("Missing required column(s): {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Lookup join unresolved: {reason}")]
    JoinUnresolved { reason: String },

    #[error("Lookup merge failed: {reason}")]
    MergeFailure { reason: String },

    #[error("Report spec references unknown field(s): {}", .missing.join(", "))]
    InvalidSpec { missing: Vec<String> },

    #[error("Rendering {path:?} failed: {message}{}", partial_note(.partial))]
    RenderFailure {
        path: PathBuf,
        partial: bool,
        message: String,
    },

    #[error("Malformed relation: {0}")]
    Relation(String),
}

impl ReportError {
    /// True for failures the pipeline absorbs by skipping an optional stage.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            ReportError::JoinUnresolved { .. }
                | ReportError::MergeFailure { .. }
                | ReportError::InvalidSpec { .. }
        )
    }
}

fn partial_note(partial: &bool) -> &'static str {
    if *partial {
        " (partial output left on disk)"
    } else {
        ""
    }
}

fn format_attempts(attempts: &[String]) -> String {
    if attempts.is_empty() {
        "no candidates".to_string()
    } else {
        attempts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_names_every_missing_column() {
        let err = ReportError::Schema {
            missing: vec!["Case Number".into(), "Street".into()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required column(s): Case Number, Street"
        );
        assert!(!err.is_degradable());
    }

    #[test]
    fn render_failure_mentions_partial_output() {
        let err = ReportError::RenderFailure {
            path: PathBuf::from("out.xlsx"),
            partial: true,
            message: "disk full".into(),
        };
        let text = err.to_string();
        assert!(text.contains("disk full"));
        assert!(text.contains("partial output"));
    }

    #[test]
    fn optional_stage_failures_are_degradable() {
        assert!(
            ReportError::JoinUnresolved {
                reason: "no key".into()
            }
            .is_degradable()
        );
        assert!(
            ReportError::MergeFailure {
                reason: "dupes".into()
            }
            .is_degradable()
        );
    }
}
