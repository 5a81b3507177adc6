use crate::error::{CostTrackerError, Result};
use crate::schema::{CellValue, MonthlySeries};
use chrono::Month;

/// First column holding a monthly value (January).
pub const FIRST_VALUE_COLUMN: usize = 2;
pub const MONTHS_PER_YEAR: usize = 12;

const PLACEHOLDERS: [&str; 10] = ["-", "—", "--", "——", "–", "n/a", "na", "none", "nan", "null"];

/// Converts any cell into a number. Never fails: blanks, placeholders and
/// unparseable text all read as `0.0`.
pub fn coerce(cell: &CellValue) -> f64 {
    match cell {
        CellValue::Empty => 0.0,
        CellValue::Number(n) if n.is_finite() => *n,
        CellValue::Number(_) => 0.0,
        CellValue::Text(s) => coerce_text(s),
    }
}

/// Parses spreadsheet text such as `"1,234.50"`, `"１２，０００"` style
/// separators, `"3000元"` or `" - "`.
pub fn coerce_text(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && *c != '，' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return 0.0;
    }

    let lowered = cleaned.to_lowercase();
    if PLACEHOLDERS.contains(&lowered.as_str()) {
        return 0.0;
    }

    if let Ok(value) = cleaned.parse::<f64>() {
        return if value.is_finite() { value } else { 0.0 };
    }

    // Trailing units ("元", "%", "万") are dropped.
    numeric_prefix(&cleaned).unwrap_or(0.0)
}

fn numeric_prefix(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            end = frac_end;
            has_digits = true;
        }
    }

    if !has_digits {
        return None;
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads the twelve monthly cells (columns 2..=13) of a table row.
pub fn monthly_values(row: &[CellValue]) -> MonthlySeries {
    let mut values = [0.0; MONTHS_PER_YEAR];
    for (i, value) in values.iter_mut().enumerate() {
        if let Some(cell) = row.get(FIRST_VALUE_COLUMN + i) {
            *value = coerce(cell);
        }
    }
    values
}

pub fn cumulative_sum(values: &MonthlySeries) -> MonthlySeries {
    let mut running = 0.0;
    let mut out = [0.0; MONTHS_PER_YEAR];
    for (slot, value) in out.iter_mut().zip(values.iter()) {
        running += value;
        *slot = running;
    }
    out
}

pub fn add_series(acc: &mut MonthlySeries, values: &MonthlySeries) {
    for (a, v) in acc.iter_mut().zip(values.iter()) {
        *a += v;
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Yuan to 万元 (units of 10,000), two decimals.
pub fn to_wan(value: f64) -> f64 {
    round2(value / 10_000.0)
}

/// `100 * numerator / denominator` rounded to two decimals, zero when the
/// denominator is zero.
pub fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        round2(100.0 * numerator / denominator)
    }
}

pub fn validate_month(month: u32) -> Result<()> {
    to_chrono_month(month).map(|_| ())
}

fn to_chrono_month(month: u32) -> Result<Month> {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .ok_or(CostTrackerError::InvalidMonth(month))
}

/// Zero-based series index for a validated 1-based month.
pub fn month_index(month: u32) -> usize {
    (month as usize).saturating_sub(1).min(MONTHS_PER_YEAR - 1)
}

/// Column label used by the report tables, e.g. `"3月"`.
pub fn month_label(month: u32) -> String {
    format!("{}月", month)
}

/// English month name for log output; `"?"` outside 1..=12.
pub fn month_name(month: u32) -> &'static str {
    to_chrono_month(month).map(|m| m.name()).unwrap_or("?")
}

pub fn time_progress(month: u32) -> f64 {
    round2(100.0 * month as f64 / MONTHS_PER_YEAR as f64)
}
