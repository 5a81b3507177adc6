use crate::anomaly::detect;
use crate::error::{CostTrackerError, Result};
use crate::matcher::{PrimaryRole, RowMatcher};
use crate::schema::{AnalysisConfig, FeeItem, MonthlySeries, ProjectResult, RawTable, TotalRowMode};
use crate::utils::{
    cumulative_sum, month_index, month_name, monthly_values, percent, time_progress, to_wan,
    validate_month, MONTHS_PER_YEAR,
};
use log::debug;

/// Row indices of one secondary fee item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeRows {
    pub name: String,
    pub target_row: Option<usize>,
    pub actual_row: Option<usize>,
}

impl FeeRows {
    /// `(target_row, actual_row)` when both are present.
    pub fn pair(&self) -> Option<(usize, usize)> {
        Some((self.target_row?, self.actual_row?))
    }
}

/// Where the interesting rows of a primary table live.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrimaryLayout {
    pub total_target_row: Option<usize>,
    pub total_actual_row: Option<usize>,
    /// In order of first appearance.
    pub fee_items: Vec<FeeRows>,
}

impl PrimaryLayout {
    pub fn scan(table: &RawTable, matcher: &RowMatcher<PrimaryRole>) -> Self {
        let mut layout = PrimaryLayout::default();

        for idx in 0..table.row_count() {
            let first = table.label(idx, 0);
            let second = table.label(idx, 1);

            let Some(role) = matcher.classify(&first, &second) else {
                continue;
            };

            match role {
                PrimaryRole::TotalTarget => layout.total_target_row = Some(idx),
                PrimaryRole::TotalActual => layout.total_actual_row = Some(idx),
                PrimaryRole::TotalOther => {}
                PrimaryRole::FeeTarget | PrimaryRole::FeeActual => {
                    if first.is_empty() {
                        debug!("Row {} of '{}' has an amount label but no fee name", idx, table.name);
                        continue;
                    }
                    let item = layout.fee_entry(&first);
                    if role == PrimaryRole::FeeTarget {
                        item.target_row = Some(idx);
                    } else {
                        item.actual_row = Some(idx);
                    }
                }
            }
        }

        layout
    }

    fn fee_entry(&mut self, name: &str) -> &mut FeeRows {
        let pos = match self.fee_items.iter().position(|f| f.name == name) {
            Some(pos) => pos,
            None => {
                self.fee_items.push(FeeRows {
                    name: name.to_string(),
                    target_row: None,
                    actual_row: None,
                });
                self.fee_items.len() - 1
            }
        };
        &mut self.fee_items[pos]
    }

    /// Fee items with both rows, as `(name, target_row, actual_row)`.
    pub fn complete_fee_items(&self) -> impl Iterator<Item = (&str, usize, usize)> + '_ {
        self.fee_items
            .iter()
            .filter_map(|f| f.pair().map(|(t, a)| (f.name.as_str(), t, a)))
    }
}

/// Computes total-cost usage and secondary fee-item anomalies for one
/// primary table.
#[derive(Debug, Clone)]
pub struct PrimaryProcessor {
    total_row_mode: TotalRowMode,
    matcher: RowMatcher<PrimaryRole>,
}

impl Default for PrimaryProcessor {
    fn default() -> Self {
        Self::new(TotalRowMode::default())
    }
}

impl PrimaryProcessor {
    pub fn new(total_row_mode: TotalRowMode) -> Self {
        Self {
            total_row_mode,
            matcher: RowMatcher::primary(),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.total_row_mode)
    }

    pub fn with_matcher(mut self, matcher: RowMatcher<PrimaryRole>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn matcher(&self) -> &RowMatcher<PrimaryRole> {
        &self.matcher
    }

    pub fn total_row_mode(&self) -> TotalRowMode {
        self.total_row_mode
    }

    pub fn process(&self, table: &RawTable, month: u32) -> Result<ProjectResult> {
        validate_month(month)?;

        let layout = PrimaryLayout::scan(table, &self.matcher);
        let target_row = layout
            .total_target_row
            .ok_or_else(|| missing_total(table, "target"))?;
        let actual_row = layout
            .total_actual_row
            .ok_or_else(|| missing_total(table, "actual"))?;

        let total_target_data = monthly_values(table.row(target_row));
        let total_actual_data = monthly_values(table.row(actual_row));

        let (cum_target, cum_actual) = match self.total_row_mode {
            TotalRowMode::Cumulative => (total_target_data, total_actual_data),
            TotalRowMode::Monthly => (
                cumulative_sum(&total_target_data),
                cumulative_sum(&total_actual_data),
            ),
        };

        let m = month_index(month);
        let year_cum_target = cum_target[MONTHS_PER_YEAR - 1];
        let year_cum_actual = cum_actual[MONTHS_PER_YEAR - 1];

        let mut fee_items = Vec::new();
        let mut exceptions = Vec::new();

        for (name, t_row, a_row) in layout.complete_fee_items() {
            let cum_target_item = cumulative_sum(&monthly_values(table.row(t_row)));
            let cum_actual_item = cumulative_sum(&monthly_values(table.row(a_row)));

            fee_items.push(FeeItem {
                name: name.to_string(),
                cum_target: cum_target_item[m],
                cum_actual: cum_actual_item[m],
            });

            exceptions.extend(detect(None, name, &cum_target_item, &cum_actual_item, month));
        }

        debug!(
            "Table '{}' ({}): {} fee items, {} anomalies",
            table.name,
            month_name(month),
            fee_items.len(),
            exceptions.len()
        );

        Ok(ProjectResult {
            selected_month: month,
            total_target: total_target_data.iter().sum(),
            cum_target,
            cum_actual,
            year_cum_target_wy: to_wan(year_cum_target),
            year_cum_actual_wy: to_wan(year_cum_actual),
            year_usage: percent(cum_actual[m], year_cum_target),
            month_usage: percent(cum_actual[m], cum_target[m]),
            time_progress: time_progress(month),
            fee_items,
            exceptions,
            tertiary_fee_items: Vec::new(),
            tertiary_exceptions: Vec::new(),
        })
    }
}

fn missing_total(table: &RawTable, role: &str) -> CostTrackerError {
    CostTrackerError::MissingTotalRow {
        table: table.name.clone(),
        role: role.to_string(),
    }
}

/// Monthly values of a row as a fixed series; convenience for callers that
/// already hold a [`PrimaryLayout`].
pub fn row_series(table: &RawTable, row: usize) -> MonthlySeries {
    monthly_values(table.row(row))
}
