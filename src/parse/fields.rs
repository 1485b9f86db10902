use crate::errors::{AnalyzerError, AnalyzerResult};
use chrono::NaiveDate;

/// Sentinel the source table uses for a value it does not have.
const ABSENT_SENTINEL: &str = "\u{2014}"; // em dash

/// Fixed date layout used throughout the source table.
const DATE_FORMAT: &str = "%m/%d/%Y";

/// Absent means the em-dash sentinel or empty text. Both are the same
/// typed "missing" -- never a zero.
#[inline]
fn is_absent(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed == ABSENT_SENTINEL
}

/// Parse a currency token like "$1,010" or "485.0" into a float.
/// Strips the dollar sign and thousands separators; anything left over
/// that is not numeric is a malformed field, not a zero.
pub fn parse_currency(raw: &str) -> AnalyzerResult<Option<f64>> {
    if is_absent(raw) {
        return Ok(None);
    }
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    cleaned
        .parse::<f64>()
        .map(Some)
        .map_err(|_| AnalyzerError::MalformedField(format!("not a currency amount: {raw:?}")))
}

/// Parse a percentage token like "4.21%" into percentage points (4.21,
/// not 0.0421). The convention is preserved everywhere downstream.
pub fn parse_percentage(raw: &str) -> AnalyzerResult<Option<f64>> {
    if is_absent(raw) {
        return Ok(None);
    }
    let cleaned = raw.trim().trim_end_matches('%').trim();
    cleaned
        .parse::<f64>()
        .map(Some)
        .map_err(|_| AnalyzerError::MalformedField(format!("not a percentage: {raw:?}")))
}

/// Parse a date token in the fixed month/day/4-digit-year layout.
/// Any other layout is malformed -- no format guessing.
pub fn parse_date(raw: &str) -> AnalyzerResult<Option<NaiveDate>> {
    if is_absent(raw) {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map(Some)
        .map_err(|_| AnalyzerError::MalformedField(format!("not a m/d/Y date: {raw:?}")))
}
