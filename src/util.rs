// Utility helpers for parsing and basic statistics.
//
// This module centralizes all the "dirty" CSV/number/date handling so the
// rest of the code can assume clean, typed values. Every parser here is
// forgiving: anything it cannot read comes back as `None`, never an error.
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use regex::Regex;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").unwrap());
static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.\-]").unwrap());
static NUMERIC_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?:\d+(?:\.\d*)?|\.\d+)").unwrap());
static YEAR_FIRST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}[-/]").unwrap());
static DAY_MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4}|\d{2})$").unwrap());

const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const TEXT_DATE_FORMATS: &[&str] = &["%b %d %Y", "%b %d, %Y", "%B %d %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y"];

const TRUE_WORDS: &[&str] = &["y", "yes", "true", "1", "t"];
const FALSE_WORDS: &[&str] = &["n", "no", "false", "0", "f"];

/// Lowercase, collapse every run of non-alphanumerics into one space, trim.
/// Only used for fuzzy header matching.
pub fn normalize_header(s: &str) -> String {
    let lowered = s.to_lowercase();
    NON_ALNUM.replace_all(&lowered, " ").trim().to_string()
}

/// Trimmed text, or `None` when blank.
pub fn coerce_text(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    Some(s.to_string())
}

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in procurement exports.
///
/// - `(1,234.50)` is read as `-1234.5` (accounting negatives).
/// - Currency symbols, thousands separators and `%` are stripped.
/// - Trailing garbage after a valid leading number is ignored.
/// - Returns `None` when nothing numeric is left.
pub fn parse_number(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let signed = PARENTHESIZED.replace_all(s, "-$1");
    let stripped = signed.replace([',', '$', '%'], "");
    let cleaned = NON_NUMERIC.replace_all(&stripped, "");
    if cleaned.is_empty() {
        return None;
    }
    let prefix = NUMERIC_PREFIX.find(&cleaned)?;
    prefix.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Tri-state boolean: `Some(true)`, `Some(false)` or `None` for unknown.
pub fn parse_boolean(s: Option<&str>) -> Option<bool> {
    let normalized = s?.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    if TRUE_WORDS.contains(&normalized.as_str()) {
        return Some(true);
    }
    if FALSE_WORDS.contains(&normalized.as_str()) {
        return Some(false);
    }
    // "Non-Compliance" used as a flag value marks a gap.
    if normalized.contains("non") && normalized.contains("compliance") {
        return Some(true);
    }
    None
}

/// Parse a calendar date.
///
/// ISO-like and textual forms are tried first. Failing that, `D/M/Y` or
/// `D-M-Y` with one or two digit parts is read as (month, day) and then as
/// (day, month); the first valid calendar date wins. Two digit years are
/// taken to be in the 2000s.
pub fn parse_date(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(d) = parse_date_native(s) {
        return Some(d);
    }

    let caps = DAY_MONTH_YEAR.captures(s)?;
    let part1: u32 = caps[1].parse().ok()?;
    let part2: u32 = caps[2].parse().ok()?;
    let year: i32 = if caps[3].len() == 2 {
        format!("20{}", &caps[3]).parse().ok()?
    } else {
        caps[3].parse().ok()?
    };

    [(part1, part2), (part2, part1)]
        .into_iter()
        .filter(|(month, day)| (1..=12).contains(month) && (1..=31).contains(day))
        .find_map(|(month, day)| NaiveDate::from_ymd_opt(year, month, day))
}

fn parse_date_native(s: &str) -> Option<NaiveDate> {
    // chrono's %Y accepts short years, so numeric formats are only tried
    // when the value actually leads with a four digit year.
    if !YEAR_FIRST.is_match(s) {
        return TEXT_DATE_FORMATS
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(s, f).ok());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Some(dt) = ISO_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    {
        return Some(dt.date());
    }
    ISO_DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

pub fn days_diff(start: NaiveDate, end: NaiveDate) -> f64 {
    // `NaiveDate` supports subtraction; the result is a `Duration` in days.
    (end - start).num_days() as f64
}

/// `YYYY-MM` bucket key.
pub fn month_key(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m").to_string())
}

pub fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Round half away from zero to `decimals` places.
pub fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

/// Linear-interpolated quantile of an unsorted sample; 0 for an empty one.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    // Use `partial_cmp` to handle floating-point comparisons and fall back to
    // equality if either side is NaN.
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = (sorted.len() - 1) as f64 * q;
    let base = pos.floor() as usize;
    let rest = pos - base as f64;
    match sorted.get(base + 1) {
        Some(next) => sorted[base] + rest * (next - sorted[base]),
        None => sorted[base],
    }
}

/// Weighted mean of `(value, weight)` pairs; 0 when the weights sum to 0.
pub fn weighted_mean<I>(pairs: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (sum, weights) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(s, w), (value, weight)| (s + value * weight, w + weight));
    if weights > 0.0 {
        sum / weights
    } else {
        0.0
    }
}

/// Non-cryptographic fingerprint of a header list: a 32-bit `h * 31 + c`
/// rolling hash over the UTF-16 units of the `|`-joined headers, rendered
/// in base 36.
pub fn header_fingerprint(headers: &[String]) -> String {
    let raw = headers.join("|");
    let mut hash: i32 = 0;
    for unit in raw.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit));
    }
    to_base36(i64::from(hash).unsigned_abs())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - locale-aware thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let mut res = group_digits(int_part, Locale::en.separator());
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

/// A 0..1 rate as a percentage string, e.g. `0.25` -> `25.0%`.
// Works on the digit string so values beyond `i64` keep their magnitude.
fn group_digits(digits: &str, separator: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3 * separator.len());
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push_str(separator);
        }
        out.push(c);
    }
    out
}

pub fn format_percent(rate: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, rate * 100.0)
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Used for counts in console messages (e.g., `9,855 rows loaded`).
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn normalize_header_collapses_punctuation() {
        assert_eq!(normalize_header("  PO_Number (#) "), "po number");
        assert_eq!(normalize_header("Supplier-Name"), "supplier name");
        assert_eq!(normalize_header("___"), "");
    }

    #[test]
    fn parse_number_handles_accounting_formats() {
        assert_eq!(parse_number(Some("$1,234.50")), Some(1234.5));
        assert_eq!(parse_number(Some("(250.00)")), Some(-250.0));
        assert_eq!(parse_number(Some("12%")), Some(12.0));
        assert_eq!(parse_number(Some("€ 99")), Some(99.0));
        assert_eq!(parse_number(Some("  42  ")), Some(42.0));
    }

    #[test]
    fn parse_number_rejects_non_numeric() {
        assert_eq!(parse_number(None), None);
        assert_eq!(parse_number(Some("")), None);
        assert_eq!(parse_number(Some("n/a")), None);
        assert_eq!(parse_number(Some("-")), None);
    }

    #[test]
    fn parse_number_reads_leading_number() {
        assert_eq!(parse_number(Some("1.2.3")), Some(1.2));
        assert_eq!(parse_number(Some(".5")), Some(0.5));
    }

    #[test]
    fn parse_boolean_is_tri_state() {
        assert_eq!(parse_boolean(Some("Yes")), Some(true));
        assert_eq!(parse_boolean(Some("T")), Some(true));
        assert_eq!(parse_boolean(Some("0")), Some(false));
        assert_eq!(parse_boolean(Some("No")), Some(false));
        assert_eq!(parse_boolean(Some("Non-Compliance")), Some(true));
        assert_eq!(parse_boolean(Some("maybe")), None);
        assert_eq!(parse_boolean(Some("  ")), None);
        assert_eq!(parse_boolean(None), None);
    }

    #[test]
    fn parse_date_reads_iso_forms() {
        assert_eq!(parse_date(Some("2024-03-05")), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date(Some("2024-03-05T10:30:00")), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date(Some("2024-03-05T10:30:00Z")), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date(Some("Mar 5, 2024")), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn parse_date_day_over_twelve_disambiguates() {
        assert_eq!(parse_date(Some("13/02/2024")), Some(ymd(2024, 2, 13)));
    }

    #[test]
    fn parse_date_prefers_month_first_when_ambiguous() {
        assert_eq!(parse_date(Some("02/03/2024")), Some(ymd(2024, 2, 3)));
        assert_eq!(parse_date(Some("2-3-24")), Some(ymd(2024, 2, 3)));
    }

    #[test]
    fn parse_date_swaps_when_month_first_is_not_a_calendar_date() {
        assert_eq!(parse_date(Some("31/12/2023")), Some(ymd(2023, 12, 31)));
        assert_eq!(parse_date(Some("02/30/2024")), None);
    }

    #[test]
    fn parse_date_returns_none_on_garbage() {
        assert_eq!(parse_date(Some("soon")), None);
        assert_eq!(parse_date(Some("")), None);
        assert_eq!(parse_date(Some("45/45/2024")), None);
    }

    #[test]
    fn quantile_interpolates() {
        let v = [10.0, 10.0, 10.0, 10.0, 10.0, 1000.0];
        assert_eq!(quantile(&v, 0.25), 10.0);
        assert_eq!(quantile(&v, 0.75), 10.0);
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), 2.5);
        assert_eq!(quantile(&[], 0.5), 0.0);
    }

    #[test]
    fn round_to_matches_fixed_decimals() {
        assert_eq!(round_to(33.94, 1), 33.9);
        assert_eq!(round_to(12.345678, 2), 12.35);
    }

    #[test]
    fn fingerprint_is_stable_and_order_sensitive() {
        let a = vec!["PO".to_string(), "Supplier".to_string()];
        let b = vec!["Supplier".to_string(), "PO".to_string()];
        assert_eq!(header_fingerprint(&a), header_fingerprint(&a));
        assert_ne!(header_fingerprint(&a), header_fingerprint(&b));
        assert_eq!(header_fingerprint(&[]), "0");
        // "a" -> 97 -> base36 "2p"
        assert_eq!(header_fingerprint(&["a".to_string()]), "2p");
    }

    #[test]
    fn weighted_mean_ignores_zero_weights() {
        assert_eq!(weighted_mean([(50.0, 2.0), (20.0, 1.0)]), 40.0);
        assert_eq!(weighted_mean(Vec::<(f64, f64)>::new()), 0.0);
    }

    #[test]
    fn format_number_inserts_separators() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-42.0, 1), "-42.0");
        assert_eq!(format_percent(0.25, 1), "25.0%");
    }

    #[test]
    fn format_number_keeps_values_beyond_i64() {
        assert_eq!(format_number(1e20, 2), "100,000,000,000,000,000,000.00");
        assert_eq!(format_number(999.5, 0), "1,000");
        assert_eq!(format_number(0.0, 2), "0.00");
    }
}
