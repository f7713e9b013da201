use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const SECONDS_PER_DAY: i64 = 86_400;

const NULL_SENTINELS: &[&str] = &["", "nan", "none"];

/// Day-first timestamp layouts, tried in order before the ISO forms.
const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %I:%M %p",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d-%m-%Y %I:%M %p",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d.%m.%Y %I:%M %p",
];

const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// True for cells that stand in for absent data (`""`, `nan`, `none`).
pub fn is_null_sentinel(value: &str) -> bool {
    let trimmed = value.trim();
    NULL_SENTINELS
        .iter()
        .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
}

/// Returns the trimmed cell, or an empty string for null-sentinels.
pub fn clean_cell(value: &str) -> String {
    if is_null_sentinel(value) {
        String::new()
    } else {
        value.trim().to_string()
    }
}

/// Parses a timestamp, resolving `01/02/2024`-style ambiguity day-first.
pub fn parse_day_first_timestamp(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty timestamp"));
    }
    for fmt in DAY_FIRST_DATETIME_FORMATS.iter().chain(ISO_DATETIME_FORMATS) {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
    }
    for fmt in DAY_FIRST_DATE_FORMATS.iter().chain(ISO_DATE_FORMATS) {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(parsed.and_time(NaiveTime::MIN));
        }
    }
    Err(anyhow!("Failed to parse '{trimmed}' as a day-first timestamp"))
}

/// Whole days elapsed between `created` and `now`, floored.
///
/// Missing and future timestamps yield 0.
pub fn age_in_days(created: Option<NaiveDateTime>, now: NaiveDateTime) -> i64 {
    match created {
        Some(created) => {
            let seconds = (now - created).num_seconds();
            seconds.div_euclid(SECONDS_PER_DAY).max(0)
        }
        None => 0,
    }
}
