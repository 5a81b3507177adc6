use crate::schema::{AnomalyRecord, ExceptionType, MonthlySeries};
use crate::utils::MONTHS_PER_YEAR;

/// Red when the cumulative actual exceeds the full-year target, otherwise
/// yellow when it exceeds the month's own cumulative target.
pub fn classify(cum_actual: f64, cum_target: f64, year_target: f64) -> Option<ExceptionType> {
    if cum_actual > year_target {
        Some(ExceptionType::Red)
    } else if cum_actual > cum_target {
        Some(ExceptionType::Yellow)
    } else {
        None
    }
}

/// Scans months `1..=through_month` of a fee's cumulative series. The year
/// target is the December cumulative target.
pub fn detect(
    fee_code: Option<&str>,
    fee_name: &str,
    cum_target: &MonthlySeries,
    cum_actual: &MonthlySeries,
    through_month: u32,
) -> Vec<AnomalyRecord> {
    let year_target = cum_target[MONTHS_PER_YEAR - 1];
    let last = (through_month as usize).min(MONTHS_PER_YEAR);

    (0..last)
        .filter_map(|i| {
            classify(cum_actual[i], cum_target[i], year_target).map(|exception_type| AnomalyRecord {
                fee_code: fee_code.map(str::to_string),
                fee_name: fee_name.to_string(),
                month: i as u32 + 1,
                exception_type,
                cum_actual: cum_actual[i],
                cum_target: cum_target[i],
                year_target,
            })
        })
        .collect()
}
