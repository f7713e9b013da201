//! Lookup column resolution, key normalization, and overlap diagnostics.

use std::{
    collections::{BTreeSet, HashMap},
    sync::OnceLock,
};

use log::{debug, info, warn};
use regex::Regex;

use crate::{config::LookupSettings, error::ReportError, prompt::ColumnResolver, relation::Relation};

const SAMPLE_KEYS: usize = 5;

/// Key and value columns chosen for a lookup join. `None` marks a column
/// that could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinResolution {
    pub key_column: Option<String>,
    pub value_column: Option<String>,
}

/// A resolution with both columns present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJoin {
    pub key_column: String,
    pub value_column: String,
}

impl JoinResolution {
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn complete(&self) -> Option<ResolvedJoin> {
        match (&self.key_column, &self.value_column) {
            (Some(key), Some(value)) => Some(ResolvedJoin {
                key_column: key.clone(),
                value_column: value.clone(),
            }),
            _ => None,
        }
    }

    /// Explains why [`JoinResolution::complete`] returned `None`.
    pub fn describe_gap(&self) -> Option<String> {
        match (&self.key_column, &self.value_column) {
            (None, _) => Some("no usable key column".to_string()),
            (Some(key), None) => Some(format!(
                "key '{key}' resolved but no lookup value column; enrichment unavailable"
            )),
            _ => None,
        }
    }
}

pub struct LookupResolver<'a> {
    settings: &'a LookupSettings,
    prompt: &'a dyn ColumnResolver,
}

impl<'a> LookupResolver<'a> {
    pub fn new(settings: &'a LookupSettings, prompt: &'a dyn ColumnResolver) -> Self {
        Self { settings, prompt }
    }

    pub fn resolve(&self, primary: &Relation, secondary: &Relation) -> JoinResolution {
        let lookup_columns = secondary.headers();
        debug!("Lookup columns: {lookup_columns:?}");

        let Some(key) = self.pick(
            "key",
            self.settings.key_column.as_deref(),
            &self.settings.conventional_key,
            "Enter the common KEY column (like Case Number):",
            lookup_columns,
            None,
        ) else {
            warn!("No valid lookup key column; skipping enrichment");
            return JoinResolution::unresolved();
        };

        if !primary.has_column(&key) {
            warn!("Key column '{key}' not found in the ticket export; skipping enrichment");
            return JoinResolution::unresolved();
        }

        let value = self.pick(
            "value",
            self.settings.value_column.as_deref(),
            &self.settings.conventional_value,
            "Enter the lookup RETURN column (like Remarks):",
            lookup_columns,
            Some(key.as_str()),
        );
        if value.is_none() {
            warn!("No valid lookup value column; key '{key}' kept but enrichment unavailable");
        }
        JoinResolution {
            key_column: Some(key),
            value_column: value,
        }
    }

    /// Tries override, then convention, then the prompt; every answer must
    /// name a lookup column other than `exclude`.
    fn pick(
        &self,
        role: &str,
        override_name: Option<&str>,
        convention: &str,
        prompt: &str,
        candidates: &[String],
        exclude: Option<&str>,
    ) -> Option<String> {
        let acceptable = |name: &str| {
            candidates.iter().any(|c| c == name) && exclude.is_none_or(|ex| ex != name)
        };

        if let Some(name) = override_name {
            if acceptable(name) {
                debug!("Using configured lookup {role} column '{name}'");
                return Some(name.to_string());
            }
            warn!("Configured lookup {role} column '{name}' is not usable in the lookup sheet");
        }
        if acceptable(convention) {
            debug!("Using conventional lookup {role} column '{convention}'");
            return Some(convention.to_string());
        }
        match self.prompt.ask(prompt, candidates) {
            Some(answer) if acceptable(&answer) => Some(answer),
            Some(answer) => {
                warn!("'{answer}' is not a usable lookup {role} column");
                None
            }
            None => None,
        }
    }
}

fn float_artifact() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(-?\d+)\.0+$").expect("valid float artifact pattern"))
}

/// Canonical key text: trimmed, with a float artifact such as `123.0`
/// reduced to `123`.
///
/// Only an all-zero fraction is stripped, so `100.05` stays `100.05`.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim();
    match float_artifact().captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

/// Returns a copy of `relation` with `column` rewritten through [`normalize_key`].
pub fn normalize_key_column(relation: &Relation, column: &str) -> Result<Relation, ReportError> {
    let mut output = relation.clone();
    if let Some(values) = relation.column_values(column) {
        output.set_column(column, values.into_iter().map(normalize_key).collect())?;
    }
    Ok(output)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinDiagnostics {
    pub primary_keys: usize,
    pub lookup_keys: usize,
    pub common_keys: usize,
    pub sample_common: Vec<String>,
    pub duplicate_lookup_keys: usize,
}

/// Measures key overlap on already-normalized key columns.
///
/// Empty keys never match in a merge, so they are left out of every count.
pub fn diagnose(primary: &Relation, lookup: &Relation, key: &str) -> JoinDiagnostics {
    let primary_keys: BTreeSet<&str> = primary
        .column_values(key)
        .unwrap_or_default()
        .into_iter()
        .filter(|k| !k.is_empty())
        .collect();
    let mut lookup_counts: HashMap<&str, usize> = HashMap::new();
    for value in lookup.column_values(key).unwrap_or_default() {
        if !value.is_empty() {
            *lookup_counts.entry(value).or_insert(0) += 1;
        }
    }
    let common: Vec<&str> = primary_keys
        .iter()
        .copied()
        .filter(|k| lookup_counts.contains_key(k))
        .collect();
    let diagnostics = JoinDiagnostics {
        primary_keys: primary_keys.len(),
        lookup_keys: lookup_counts.len(),
        common_keys: common.len(),
        sample_common: common
            .iter()
            .take(SAMPLE_KEYS)
            .map(|s| s.to_string())
            .collect(),
        duplicate_lookup_keys: lookup_counts.values().filter(|&&n| n > 1).count(),
    };
    info!(
        "Lookup overlap on '{key}': {} common of {} ticket key(s) and {} lookup key(s)",
        diagnostics.common_keys, diagnostics.primary_keys, diagnostics.lookup_keys
    );
    if !diagnostics.sample_common.is_empty() {
        debug!("Sample common keys: {:?}", diagnostics.sample_common);
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{NoPrompt, ScriptedResolver};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn relation(headers: &[&str], rows: &[&[&str]]) -> Relation {
        Relation::new(
            strings(headers),
            rows.iter().map(|r| strings(r)).collect(),
        )
        .expect("relation")
    }

    fn primary() -> Relation {
        relation(&["Case Number", "Remarks"], &[&["1", ""], &["2", "x"]])
    }

    #[test]
    fn conventional_names_resolve_without_prompting() {
        let settings = LookupSettings::default();
        let prompt = ScriptedResolver::new(Vec::<Option<String>>::new());
        let lookup = relation(&["Case Number", "Remarks"], &[]);
        let resolution = LookupResolver::new(&settings, &prompt).resolve(&primary(), &lookup);
        assert_eq!(
            resolution.complete(),
            Some(ResolvedJoin {
                key_column: "Case Number".into(),
                value_column: "Remarks".into(),
            })
        );
        assert!(prompt.prompts().is_empty());
    }

    #[test]
    fn prompt_answers_must_name_lookup_columns() {
        let settings = LookupSettings::default();
        let prompt = ScriptedResolver::new([Some("Bogus")]);
        let lookup = relation(&["Ticket", "Notes"], &[]);
        let resolution = LookupResolver::new(&settings, &prompt).resolve(&primary(), &lookup);
        assert_eq!(resolution, JoinResolution::unresolved());
        assert_eq!(prompt.prompts().len(), 1);
    }

    #[test]
    fn key_absent_from_primary_fails_resolution() {
        let settings = LookupSettings::default();
        let prompt = ScriptedResolver::new([Some("Ticket")]);
        let lookup = relation(&["Ticket", "Remarks"], &[]);
        let resolution = LookupResolver::new(&settings, &prompt).resolve(&primary(), &lookup);
        assert_eq!(resolution.key_column, None);
    }

    #[test]
    fn unresolved_value_keeps_key() {
        let settings = LookupSettings::default();
        let lookup = relation(&["Case Number", "Notes"], &[]);
        let resolution = LookupResolver::new(&settings, &NoPrompt).resolve(&primary(), &lookup);
        assert_eq!(resolution.key_column.as_deref(), Some("Case Number"));
        assert_eq!(resolution.value_column, None);
        assert!(resolution.complete().is_none());
        assert!(resolution.describe_gap().unwrap().contains("enrichment unavailable"));
    }

    #[test]
    fn overrides_win_over_conventions() {
        let settings = LookupSettings {
            value_column: Some("Notes".into()),
            ..LookupSettings::default()
        };
        let lookup = relation(&["Case Number", "Remarks", "Notes"], &[]);
        let resolution = LookupResolver::new(&settings, &NoPrompt).resolve(&primary(), &lookup);
        assert_eq!(resolution.value_column.as_deref(), Some("Notes"));
    }

    #[test]
    fn value_column_cannot_repeat_the_key() {
        let settings = LookupSettings {
            value_column: Some("Case Number".into()),
            ..LookupSettings::default()
        };
        let lookup = relation(&["Case Number", "Notes"], &[]);
        let resolution = LookupResolver::new(&settings, &NoPrompt).resolve(&primary(), &lookup);
        assert_eq!(resolution.value_column, None);
    }

    #[test]
    fn float_artifacts_are_stripped() {
        assert_eq!(normalize_key("123.0"), "123");
        assert_eq!(normalize_key(" 123 "), "123");
        assert_eq!(normalize_key("-7.00"), "-7");
        assert_eq!(normalize_key(normalize_key("123.0").as_str()), normalize_key("123"));
    }

    #[test]
    fn non_zero_fractions_survive_normalization() {
        // Stripping every ".0" substring would turn this into "1005".
        assert_eq!(normalize_key("100.05"), "100.05");
        assert_eq!(normalize_key("10.0.1"), "10.0.1");
        assert_eq!(normalize_key("CN-100.0A"), "CN-100.0A");
    }

    #[test]
    fn diagnostics_count_overlap_and_duplicates() {
        let primary = relation(&["k"], &[&["1"], &["2"], &["3"], &["3"]]);
        let lookup = relation(&["k"], &[&["2"], &["3"], &["3"], &["9"]]);
        let diagnostics = diagnose(&primary, &lookup, "k");
        assert_eq!(diagnostics.primary_keys, 3);
        assert_eq!(diagnostics.lookup_keys, 3);
        assert_eq!(diagnostics.common_keys, 2);
        assert_eq!(diagnostics.sample_common, strings(&["2", "3"]));
        assert_eq!(diagnostics.duplicate_lookup_keys, 1);
    }
}
