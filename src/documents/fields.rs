//! Per-kind value canonicalization: dates, money, weights, "not found".

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use tracing::warn;

use super::{FieldKind, SENTINEL};

/// Display format every parsed date is rewritten to.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Tried in order; the canonical format comes first so re-normalizing is a no-op.
const DATE_FORMATS: &[&str] = &[
    CANONICAL_DATE_FORMAT,
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Years outside this range are treated as mis-parses (e.g. `05-01-20` read as year 5).
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1900..=2100;

const CURRENCY_SYMBOL: &str = "$";
const WEIGHT_UNIT: &str = "kg";

const NOT_FOUND_VALUES: &[&str] = &["", "-", "not found", "n/a", "na", "none", "nil"];

/// Whether a raw value means "nothing extracted".
pub fn is_not_found(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    NOT_FOUND_VALUES.contains(&lowered.as_str())
}

/// Parse a date in any of the accepted formats.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(&cleaned, fmt)
            .ok()
            .filter(|d| PLAUSIBLE_YEARS.contains(&d.year()))
    })
}

/// Rewrite a date into [`CANONICAL_DATE_FORMAT`].
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date(raw).map(|d| d.format(CANONICAL_DATE_FORMAT).to_string())
}

/// Keep digits and the decimal point, render as `$<amount>` with two decimals.
pub fn normalize_money(raw: &str) -> Option<String> {
    let numeric: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let amount = Decimal::from_str(&numeric).ok()?;
    Some(format!("{CURRENCY_SYMBOL}{:.2}", amount.round_dp(2)))
}

/// First integer run (thousands separators dropped) with the weight unit.
pub fn normalize_weight(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| *c != ',')
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let value: u64 = digits.parse().ok()?;
    Some(format!("{value} {WEIGHT_UNIT}"))
}

/// Canonicalize a parsed value for its field kind.
///
/// Not-found values collapse to the sentinel. A value that fails its kind's
/// parser is kept as-is; the record is still valid.
pub fn canonicalize(field: &str, kind: FieldKind, raw: &str) -> String {
    let value = raw.trim();
    if is_not_found(value) {
        return SENTINEL.to_string();
    }

    let normalized = match kind {
        FieldKind::Text => return value.to_string(),
        FieldKind::Date => normalize_date(value),
        FieldKind::Money => normalize_money(value),
        FieldKind::Weight => normalize_weight(value),
    };

    normalized.unwrap_or_else(|| {
        warn!(field, value, kind = ?kind, "Could not canonicalize field value, keeping raw text");
        value.to_string()
    })
}
