// Parsing and display helpers.
//
// Everything that turns loosely typed API values into numbers, or numbers
// into display strings, lives here so the rest of the crate can work with
// `Option<f64>` and never with sentinel values.
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};
use serde_json::Value;

/// Shown wherever a value is absent.
pub const MISSING: &str = "--";

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in exported numbers.
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed or is not finite.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(",", "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a JSON value as a finite number. Numeric strings are accepted.
pub fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_f64_safe(Some(s)),
        _ => None,
    }
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    // Filter dates are expected in `YYYY-MM-DD` format.
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Simple arithmetic mean, `None` for an empty slice.
pub fn average(v: &[f64]) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    let sum: f64 = v.iter().copied().sum();
    Some(sum / v.len() as f64)
}

/// Round half away from zero to one decimal place.
pub fn round1(n: f64) -> f64 {
    (n * 10.0).round() / 10.0
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed number of decimals with locale-aware thousands separators,
    // e.g. `1,234,567.89`.
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: u64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// Counts with thousands separators, e.g. `9,855`.
pub fn format_count(n: Option<i64>) -> String {
    match n {
        Some(n) => n.to_formatted_string(&Locale::en),
        None => MISSING.to_string(),
    }
}

/// Dollar amounts with two decimals, e.g. `$1,234.50` or `-$3.00`.
pub fn format_currency(n: Option<f64>) -> String {
    match n.filter(|v| v.is_finite()) {
        Some(v) if v.is_sign_negative() && v != 0.0 => format!("-${}", format_number(-v, 2)),
        Some(v) => format!("${}", format_number(v, 2)),
        None => MISSING.to_string(),
    }
}

/// Fixed decimals without separators, e.g. `12.3`.
pub fn format_decimal(n: Option<f64>, decimals: usize) -> String {
    match n.filter(|v| v.is_finite()) {
        Some(v) => format!("{:.*}", decimals, v),
        None => MISSING.to_string(),
    }
}

/// A decimal followed by a unit, e.g. `2.4 mi`. Absent values show no unit.
pub fn format_with_unit(n: Option<f64>, unit: &str) -> String {
    match n.filter(|v| v.is_finite()) {
        Some(_) => format!("{} {}", format_decimal(n, 1), unit),
        None => MISSING.to_string(),
    }
}

/// Render a source timestamp as `YYYY-MM-DD HH:MM`.
///
/// Timestamps the API sends in a format we do not recognise are shown as
/// they are.
pub fn format_timestamp(s: Option<&str>) -> String {
    let Some(raw) = s.map(str::trim).filter(|s| !s.is_empty()) else {
        return MISSING.to_string();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return dt.format("%Y-%m-%d %H:%M").to_string();
        }
    }
    raw.to_string()
}
