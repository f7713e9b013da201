//! Stage orchestration with fail-soft propagation.
//!
//! Ingestion and schema failures abort the run. A lookup that cannot be read,
//! resolved or merged leaves the normalized relation untouched, and an invalid
//! report spec drops only the pivot. Each degradation becomes a warning in
//! the outcome.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{info, warn};

use crate::{
    config::PipelineConfig,
    error::ReportError,
    lookup::{JoinDiagnostics, LookupResolver, diagnose, normalize_key_column},
    merge::{MergeOptions, MergeStats, merge},
    normalize::{NormalizeOptions, RemarksSource, TicketNormalizer},
    prompt::ColumnResolver,
    reader::{self, DelimitedOptions},
    relation::Relation,
    render::{RenderOutcome, ReportRenderer, render_report},
    report::ReportSpec,
};

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub input: PathBuf,
    pub lookup: Option<PathBuf>,
    pub delimited: DelimitedOptions,
}

/// Relation ready for rendering, with everything learned on the way.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub relation: Relation,
    pub remarks_source: RemarksSource,
    pub unparsed_dates: usize,
    pub diagnostics: Option<JoinDiagnostics>,
    pub merge_stats: Option<MergeStats>,
    pub spec: Option<ReportSpec>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub reconciled: Reconciled,
    pub render: RenderOutcome,
    /// Reconciliation and rendering warnings, in the order they arose.
    pub warnings: Vec<String>,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    normalizer: TicketNormalizer,
    prompt: &'a dyn ColumnResolver,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        options: NormalizeOptions,
        prompt: &'a dyn ColumnResolver,
    ) -> Self {
        Self {
            config,
            normalizer: TicketNormalizer::new(options),
            prompt,
        }
    }

    pub fn normalizer(&self) -> &TicketNormalizer {
        &self.normalizer
    }

    /// Reads the sources named in `request` and reconciles them.
    pub fn reconcile(&self, request: &PipelineRequest) -> Result<Reconciled, ReportError> {
        let primary = reader::read_delimited(&request.input, &request.delimited)?;
        let mut warnings = Vec::new();
        let lookup = match &request.lookup {
            Some(path) => match reader::read_workbook(path, &self.config.input.lookup_sheet) {
                Ok(lookup) => Some(lookup),
                Err(err) => {
                    degrade(&mut warnings, format!("Lookup skipped: {err}"));
                    None
                }
            },
            None => None,
        };
        let mut reconciled = self.reconcile_relations(&primary, lookup.as_ref())?;
        warnings.append(&mut reconciled.warnings);
        reconciled.warnings = warnings;
        Ok(reconciled)
    }

    /// Normalizes `primary`, enriches it from `lookup` when given, and builds
    /// the report spec.
    pub fn reconcile_relations(
        &self,
        primary: &Relation,
        lookup: Option<&Relation>,
    ) -> Result<Reconciled, ReportError> {
        let normalized = self.normalizer.normalize(primary)?;
        let mut warnings = Vec::new();
        let mut relation = normalized.relation;
        let mut diagnostics = None;
        let mut merge_stats = None;

        if let Some(lookup) = lookup {
            let enrichment = self.enrich(&relation, lookup, &mut warnings)?;
            diagnostics = enrichment.diagnostics;
            if let Some((merged, stats)) = enrichment.merged {
                relation = merged;
                merge_stats = Some(stats);
            }
        }

        let spec = match ReportSpec::build(&relation, &self.config.report) {
            Ok(spec) => Some(spec),
            Err(err) if err.is_degradable() => {
                degrade(&mut warnings, format!("Pivot view skipped: {err}"));
                None
            }
            Err(err) => return Err(err),
        };

        Ok(Reconciled {
            relation,
            remarks_source: normalized.remarks_source,
            unparsed_dates: normalized.unparsed_dates,
            diagnostics,
            merge_stats,
            spec,
            warnings,
        })
    }

    /// Reconciles and renders; `engines` are tried in order.
    pub fn run(
        &self,
        request: &PipelineRequest,
        output: &Path,
        engines: &[&dyn ReportRenderer],
    ) -> Result<PipelineOutcome, ReportError> {
        let reconciled = self.reconcile(request)?;
        let render = render_report(engines, &reconciled.relation, reconciled.spec.as_ref(), output)?;
        let mut warnings = reconciled.warnings.clone();
        warnings.extend(render.warnings.iter().cloned());
        Ok(PipelineOutcome {
            reconciled,
            render,
            warnings,
        })
    }

    fn enrich(
        &self,
        relation: &Relation,
        lookup: &Relation,
        warnings: &mut Vec<String>,
    ) -> Result<Enrichment, ReportError> {
        let resolution = LookupResolver::new(&self.config.lookup, self.prompt).resolve(relation, lookup);
        let Some(key) = resolution.key_column.as_deref() else {
            let err = ReportError::JoinUnresolved {
                reason: resolution.describe_gap().unwrap_or_default(),
            };
            degrade(warnings, format!("Enrichment skipped: {err}"));
            return Ok(Enrichment::default());
        };

        let diagnostics = diagnose(
            &normalize_key_column(relation, key)?,
            &normalize_key_column(lookup, key)?,
            key,
        );
        if diagnostics.common_keys == 0 {
            warn!("No ticket key matches the lookup sheet on '{key}'");
        }

        let Some(join) = resolution.complete() else {
            let err = ReportError::JoinUnresolved {
                reason: resolution.describe_gap().unwrap_or_default(),
            };
            degrade(warnings, format!("Enrichment skipped: {err}"));
            return Ok(Enrichment {
                diagnostics: Some(diagnostics),
                merged: None,
            });
        };

        let options = MergeOptions::from_settings(&self.config.lookup);
        match merge(relation, lookup, &join, &options) {
            Ok(merged) => {
                info!(
                    "Merged '{}' from the lookup sheet into '{}'",
                    join.value_column, options.target_column
                );
                Ok(Enrichment {
                    diagnostics: Some(diagnostics),
                    merged: Some((merged.relation, merged.stats)),
                })
            }
            Err(err) if err.is_degradable() => {
                degrade(warnings, format!("Keeping pre-merge data: {err}"));
                Ok(Enrichment {
                    diagnostics: Some(diagnostics),
                    merged: None,
                })
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Default)]
struct Enrichment {
    diagnostics: Option<JoinDiagnostics>,
    merged: Option<(Relation, MergeStats)>,
}

fn degrade(warnings: &mut Vec<String>, warning: String) {
    warn!("{warning}");
    warnings.push(warning);
}

/// `Output_<YYYYmmdd_HHMMSS>.xlsx`
pub fn default_output_name(timestamp: NaiveDateTime) -> String {
    format!("Output_{}.xlsx", timestamp.format("%Y%m%d_%H%M%S"))
}
