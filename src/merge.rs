//! Left join against the lookup relation and collision reconciliation.
//!
//! The join keeps every primary row in order. When the lookup value column
//! shares its name with the target column, the joined relation carries both
//! sides under `_x` (original) and `_y` (lookup) suffixes. Reconciliation
//! folds them back into the target column under the configured
//! [`CollisionPolicy`] and drops the transient columns.
//!
//! Precondition: lookup keys are unique. When they repeat, the first lookup
//! row wins and the repeats are counted.

use std::collections::{HashMap, hash_map::Entry};

use log::{info, warn};

use crate::{
    config::{CollisionPolicy, LookupSettings},
    data::is_null_sentinel,
    error::ReportError,
    lookup::{ResolvedJoin, normalize_key},
    relation::Relation,
};

const ORIGINAL_SUFFIX: &str = "_x";
const LOOKUP_SUFFIX: &str = "_y";

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub target_column: String,
    pub policy: CollisionPolicy,
    pub duplicate_tolerance: Option<usize>,
}

impl MergeOptions {
    pub fn from_settings(settings: &LookupSettings) -> Self {
        Self {
            target_column: settings.target_column.clone(),
            policy: settings.policy,
            duplicate_tolerance: settings.duplicate_tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows whose target cell took the looked-up value.
    pub applied: usize,
    /// Rows where no usable lookup value existed.
    pub not_applied: usize,
    /// Rows whose non-empty original value was discarded by [`CollisionPolicy::Replace`].
    pub cleared: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub duplicate_keys: usize,
}

#[derive(Debug, Clone)]
pub struct Merged {
    pub relation: Relation,
    pub stats: MergeStats,
}

/// Primary rows with the lookup value attached, before reconciliation.
#[derive(Debug, Clone)]
pub struct JoinedRelation {
    pub relation: Relation,
    /// Column holding the primary's original target values, if it had any.
    pub original_column: Option<String>,
    /// Column holding looked-up values; empty for unmatched rows.
    pub lookup_column: String,
    pub target_column: String,
    /// Schema of the reconciled result.
    pub output_columns: Vec<String>,
    pub matched: usize,
    pub duplicate_keys: usize,
}

pub fn merge(
    primary: &Relation,
    lookup: &Relation,
    join: &ResolvedJoin,
    options: &MergeOptions,
) -> Result<Merged, ReportError> {
    let joined = left_join(
        primary,
        lookup,
        join,
        &options.target_column,
        options.duplicate_tolerance,
    )?;
    let merged = reconcile(joined, options.policy)?;
    info!(
        "Lookup results ({:?}): {} applied, {} not applied ({} cleared); {} matched, {} unmatched",
        options.policy,
        merged.stats.applied,
        merged.stats.not_applied,
        merged.stats.cleared,
        merged.stats.matched,
        merged.stats.unmatched
    );
    Ok(merged)
}

pub fn left_join(
    primary: &Relation,
    lookup: &Relation,
    join: &ResolvedJoin,
    target_column: &str,
    duplicate_tolerance: Option<usize>,
) -> Result<JoinedRelation, ReportError> {
    let key_idx = require_column(primary, &join.key_column, "ticket export")?;
    let lookup_key_idx = require_column(lookup, &join.key_column, "lookup sheet")?;
    let lookup_value_idx = require_column(lookup, &join.value_column, "lookup sheet")?;

    let mut index: HashMap<String, usize> = HashMap::with_capacity(lookup.row_count());
    let mut repeats: HashMap<String, usize> = HashMap::new();
    for (row_idx, row) in lookup.rows().iter().enumerate() {
        let key = normalize_key(&row[lookup_key_idx]);
        if key.is_empty() {
            continue;
        }
        match index.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(row_idx);
            }
            Entry::Occupied(slot) => {
                *repeats.entry(slot.key().clone()).or_insert(0) += 1;
            }
        }
    }
    let duplicate_keys = repeats.len();
    if let Some(tolerance) = duplicate_tolerance
        && duplicate_keys > tolerance
    {
        return Err(ReportError::MergeFailure {
            reason: format!(
                "{duplicate_keys} lookup key(s) repeat, more than the tolerated {tolerance}"
            ),
        });
    }
    if duplicate_keys > 0 {
        warn!("{duplicate_keys} lookup key(s) repeat; the first lookup row wins for each");
    }

    let primary_has_target = primary.has_column(target_column);
    let mut taken: Vec<String> = primary.headers().to_vec();
    let collides = join.value_column == target_column && primary_has_target;
    let original_column = if collides {
        let renamed = fresh_name(&taken, target_column, ORIGINAL_SUFFIX);
        taken.push(renamed.clone());
        Some(renamed)
    } else if primary_has_target {
        Some(target_column.to_string())
    } else {
        None
    };
    let lookup_column = if taken.contains(&join.value_column) {
        fresh_name(&taken, &join.value_column, LOOKUP_SUFFIX)
    } else {
        join.value_column.clone()
    };

    let mut headers: Vec<String> = primary
        .headers()
        .iter()
        .map(|h| match (&original_column, collides) {
            (Some(renamed), true) if h == target_column => renamed.clone(),
            _ => h.clone(),
        })
        .collect();
    headers.push(lookup_column.clone());

    let mut matched = 0usize;
    let rows = primary
        .rows()
        .iter()
        .map(|row| {
            let key = normalize_key(&row[key_idx]);
            let value = match index.get(&key) {
                Some(&lookup_row) if !key.is_empty() => {
                    matched += 1;
                    lookup.rows()[lookup_row][lookup_value_idx].clone()
                }
                _ => String::new(),
            };
            let mut joined = row.clone();
            joined.push(value);
            joined
        })
        .collect();

    let mut output_columns = primary.headers().to_vec();
    if !primary_has_target {
        output_columns.push(target_column.to_string());
    }

    Ok(JoinedRelation {
        relation: Relation::new(headers, rows)?,
        original_column,
        lookup_column,
        target_column: target_column.to_string(),
        output_columns,
        matched,
        duplicate_keys,
    })
}

/// Folds the lookup column into the target column.
///
/// Both policies write a usable lookup value. Without one, `Overlay` keeps
/// the original cell and `Replace` clears it.
pub fn reconcile(joined: JoinedRelation, policy: CollisionPolicy) -> Result<Merged, ReportError> {
    let mut stats = MergeStats {
        matched: joined.matched,
        unmatched: joined.relation.row_count() - joined.matched,
        duplicate_keys: joined.duplicate_keys,
        ..MergeStats::default()
    };

    let finals = {
        let looked_up = joined
            .relation
            .column_values(&joined.lookup_column)
            .unwrap_or_default();
        let originals = joined
            .original_column
            .as_deref()
            .and_then(|column| joined.relation.column_values(column));
        looked_up
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                let original = originals.as_ref().map_or("", |values| values[idx].trim());
                if !is_null_sentinel(value) {
                    stats.applied += 1;
                    return value.trim().to_string();
                }
                stats.not_applied += 1;
                match policy {
                    CollisionPolicy::Overlay => original.to_string(),
                    CollisionPolicy::Replace => {
                        if !original.is_empty() {
                            stats.cleared += 1;
                        }
                        String::new()
                    }
                }
            })
            .collect::<Vec<_>>()
    };

    let mut relation = joined.relation;
    relation.set_column(&joined.target_column, finals)?;
    let relation = relation.project(&joined.output_columns)?;
    Ok(Merged { relation, stats })
}

fn require_column(relation: &Relation, name: &str, side: &str) -> Result<usize, ReportError> {
    relation
        .column_index(name)
        .ok_or_else(|| ReportError::MergeFailure {
            reason: format!("column '{name}' missing from the {side}"),
        })
}

fn fresh_name(taken: &[String], base: &str, suffix: &str) -> String {
    let mut candidate = format!("{base}{suffix}");
    let mut counter = 1usize;
    while taken.contains(&candidate) {
        candidate = format!("{base}{suffix}{counter}");
        counter += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn join(value: &str) -> ResolvedJoin {
        ResolvedJoin {
            key_column: "Case Number".into(),
            value_column: value.into(),
        }
    }

    fn options(policy: CollisionPolicy) -> MergeOptions {
        MergeOptions {
            target_column: "Remarks".into(),
            policy,
            duplicate_tolerance: None,
        }
    }

    fn primary() -> Relation {
        relation(
            &["Case Number", "Remarks", "Technician Name"],
            &[
                &["1", "original one", "Raj"],
                &["2", "original two", "Mei"],
                &["3", "", "Raj"],
            ],
        )
    }

    fn lookup() -> Relation {
        relation(
            &["Case Number", "Remarks"],
            &[&["1.0", "looked up"], &["2", "nan"], &["4", "orphan"]],
        )
    }

    #[test]
    fn joined_relation_suffixes_colliding_columns() {
        let joined = left_join(&primary(), &lookup(), &join("Remarks"), "Remarks", None)
            .expect("join");
        assert_eq!(
            joined.relation.headers(),
            strings(&["Case Number", "Remarks_x", "Technician Name", "Remarks_y"])
        );
        assert_eq!(joined.original_column.as_deref(), Some("Remarks_x"));
        assert_eq!(joined.matched, 2);
    }

    #[test]
    fn overlay_keeps_originals_when_lookup_is_absent() {
        let merged = merge(&primary(), &lookup(), &join("Remarks"), &options(CollisionPolicy::Overlay))
            .expect("merge");
        assert_eq!(
            merged.relation.column_values("Remarks").unwrap(),
            vec!["looked up", "original two", ""]
        );
        assert_eq!(merged.relation.headers(), primary().headers());
        assert_eq!(merged.stats.applied, 1);
        assert_eq!(merged.stats.not_applied, 2);
        assert_eq!(merged.stats.cleared, 0);
        assert_eq!(merged.stats.unmatched, 1);
    }

    #[test]
    fn replace_clears_originals_when_lookup_is_absent() {
        let merged = merge(&primary(), &lookup(), &join("Remarks"), &options(CollisionPolicy::Replace))
            .expect("merge");
        assert_eq!(
            merged.relation.column_values("Remarks").unwrap(),
            vec!["looked up", "", ""]
        );
        assert_eq!(merged.stats.applied, 1);
        assert_eq!(merged.stats.cleared, 1);
    }

    #[test]
    fn differently_named_value_column_feeds_the_target() {
        let lookup = relation(&["Case Number", "Notes"], &[&["3", "visit booked"]]);
        let merged = merge(&primary(), &lookup, &join("Notes"), &options(CollisionPolicy::Overlay))
            .expect("merge");
        assert_eq!(merged.relation.headers(), primary().headers());
        assert_eq!(merged.relation.cell(2, "Remarks"), Some("visit booked"));
        assert_eq!(merged.relation.cell(0, "Remarks"), Some("original one"));
    }

    #[test]
    fn primary_without_target_gains_it() {
        let primary = relation(&["Case Number"], &[&["1"], &["2"]]);
        let merged = merge(&primary, &lookup(), &join("Remarks"), &options(CollisionPolicy::Overlay))
            .expect("merge");
        assert_eq!(merged.relation.headers(), strings(&["Case Number", "Remarks"]));
        assert_eq!(merged.relation.column_values("Remarks").unwrap(), vec!["looked up", ""]);
    }

    #[test]
    fn first_duplicate_lookup_row_wins() {
        let lookup = relation(
            &["Case Number", "Remarks"],
            &[&["1", "first"], &["1", "second"]],
        );
        let merged = merge(&primary(), &lookup, &join("Remarks"), &options(CollisionPolicy::Overlay))
            .expect("merge");
        assert_eq!(merged.relation.cell(0, "Remarks"), Some("first"));
        assert_eq!(merged.stats.duplicate_keys, 1);
        assert_eq!(merged.relation.row_count(), 3);
    }

    #[test]
    fn duplicates_beyond_tolerance_fail_the_merge() {
        let lookup = relation(
            &["Case Number", "Remarks"],
            &[&["1", "first"], &["1", "second"]],
        );
        let mut options = options(CollisionPolicy::Overlay);
        options.duplicate_tolerance = Some(0);
        assert!(matches!(
            merge(&primary(), &lookup, &join("Remarks"), &options),
            Err(ReportError::MergeFailure { .. })
        ));
    }

    #[test]
    fn empty_keys_never_match() {
        let primary = relation(&["Case Number", "Remarks"], &[&["", "kept"]]);
        let lookup = relation(&["Case Number", "Remarks"], &[&["", "should not apply"]]);
        let merged = merge(&primary, &lookup, &join("Remarks"), &options(CollisionPolicy::Replace))
            .expect("merge");
        assert_eq!(merged.relation.cell(0, "Remarks"), Some(""));
        assert_eq!(merged.stats.matched, 0);
    }

    #[test]
    fn missing_lookup_value_column_is_a_merge_failure() {
        assert!(matches!(
            merge(&primary(), &lookup(), &join("Notes"), &options(CollisionPolicy::Overlay)),
            Err(ReportError::MergeFailure { .. })
        ));
    }

    #[test]
    fn fresh_names_skip_taken_suffixes() {
        let taken = strings(&["Remarks", "Remarks_x"]);
        assert_eq!(fresh_name(&taken, "Remarks", "_x"), "Remarks_x1");
        assert_eq!(fresh_name(&taken, "Remarks", "_y"), "Remarks_y");
    }
}
