//! Cross-project views: merged tables, monthly fee totals, the client
//! download table and the KPI comparison table.

use crate::error::{CostTrackerError, Result};
use crate::matcher::{PrimaryRole, RowMatcher};
use crate::primary::{row_series, PrimaryLayout, PrimaryProcessor};
use crate::schema::{CellValue, CombinedResult, MonthlySeries, ProjectResult, RawTable};
use crate::utils::{add_series, coerce, month_label, round2, to_wan, FIRST_VALUE_COLUMN, MONTHS_PER_YEAR};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MERGED_TABLE_NAME: &str = "合并";

/// Sums several primary tables cell by cell.
///
/// Every table must have the same number of rows and the same trimmed labels
/// in columns 0 and 1 of each row. Labels and header are taken from the first
/// table; value columns are coerced and added.
pub fn merge_tables(tables: &[&RawTable]) -> Result<RawTable> {
    let Some(first) = tables.first() else {
        return Err(CostTrackerError::EmptyInput("no tables to merge".to_string()));
    };

    for other in &tables[1..] {
        check_alignment(first, other)?;
    }

    let width = tables
        .iter()
        .map(|t| t.column_count())
        .max()
        .unwrap_or(0)
        .max(FIRST_VALUE_COLUMN);

    let rows = (0..first.row_count())
        .map(|r| {
            let mut cells = Vec::with_capacity(width);
            cells.push(first.cell(r, 0).clone());
            cells.push(first.cell(r, 1).clone());
            for col in FIRST_VALUE_COLUMN..width {
                let sum: f64 = tables.iter().map(|t| coerce(t.cell(r, col))).sum();
                cells.push(CellValue::Number(sum));
            }
            cells
        })
        .collect();

    debug!("Merged {} tables into {} rows x {} columns", tables.len(), first.row_count(), width);

    Ok(RawTable::new(MERGED_TABLE_NAME, first.header.clone(), rows))
}

fn check_alignment(first: &RawTable, other: &RawTable) -> Result<()> {
    if first.row_count() != other.row_count() {
        return Err(CostTrackerError::ShapeMismatch {
            table: other.name.clone(),
            row: other.row_count(),
            expected: format!("{} rows", first.row_count()),
            found: format!("{} rows", other.row_count()),
        });
    }

    for r in 0..first.row_count() {
        for col in 0..FIRST_VALUE_COLUMN {
            let expected = first.label(r, col);
            let found = other.label(r, col);
            if expected != found {
                return Err(CostTrackerError::ShapeMismatch {
                    table: other.name.clone(),
                    row: r,
                    expected,
                    found,
                });
            }
        }
    }

    Ok(())
}

/// Re-runs the primary computation over the merge of all project tables.
pub fn merge_project_data(
    tables: &BTreeMap<String, RawTable>,
    month: u32,
    processor: &PrimaryProcessor,
) -> Result<CombinedResult> {
    let inputs: Vec<&RawTable> = tables.values().collect();
    let merged = merge_tables(&inputs)?;
    let result = processor.process(&merged, month)?;

    info!("Combined result over {} projects for month {}", tables.len(), month);

    Ok(CombinedResult {
        result,
        merged_projects: tables.keys().cloned().collect(),
    })
}

/// Names like `1.1.2` or `12` are numbered sub-rows, not fee items.
fn is_numbered_name(name: &str) -> bool {
    if let Some((head, _)) = name.split_once('.') {
        if head.chars().any(|c| c.is_ascii_digit() && c != '0') {
            return true;
        }
    }
    let digits: String = name.chars().filter(|c| *c != '.' && *c != ' ').collect();
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Monthly sums of every complete, named fee pair in a table.
fn fee_sums(table: &RawTable, matcher: &RowMatcher<PrimaryRole>) -> (MonthlySeries, MonthlySeries) {
    let layout = PrimaryLayout::scan(table, matcher);
    let mut target = [0.0; MONTHS_PER_YEAR];
    let mut actual = [0.0; MONTHS_PER_YEAR];

    for (name, t_row, a_row) in layout.complete_fee_items() {
        if is_numbered_name(name) {
            continue;
        }
        add_series(&mut target, &row_series(table, t_row));
        add_series(&mut actual, &row_series(table, a_row));
    }

    (target, actual)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyFeePoint {
    pub month: u32,
    pub target: f64,
    pub actual: f64,
    #[schemars(description = "Target in units of 10,000 yuan.")]
    pub target_wy: f64,
    #[schemars(description = "Actual in units of 10,000 yuan.")]
    pub actual_wy: f64,
}

impl MonthlyFeePoint {
    pub fn label(&self) -> String {
        month_label(self.month)
    }
}

/// Per-month target and actual of all secondary fee items across projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyFeeSummary {
    pub points: Vec<MonthlyFeePoint>,
}

impl MonthlyFeeSummary {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub fn monthly_fee_summary(
    tables: &BTreeMap<String, RawTable>,
    matcher: &RowMatcher<PrimaryRole>,
) -> MonthlyFeeSummary {
    let mut target = [0.0; MONTHS_PER_YEAR];
    let mut actual = [0.0; MONTHS_PER_YEAR];

    for table in tables.values() {
        let (t, a) = fee_sums(table, matcher);
        add_series(&mut target, &t);
        add_series(&mut actual, &a);
    }

    let points = (0..MONTHS_PER_YEAR)
        .map(|i| MonthlyFeePoint {
            month: i as u32 + 1,
            target: round2(target[i]),
            actual: round2(actual[i]),
            target_wy: to_wan(target[i]),
            actual_wy: to_wan(actual[i]),
        })
        .collect();

    MonthlyFeeSummary { points }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DownloadRowKind {
    #[schemars(description = "Sum of the secondary fee items' monthly actuals.")]
    Actual,
    #[schemars(description = "The raw total-cost cumulative actual row.")]
    CumulativeActual,
    #[schemars(description = "Sum of the secondary fee items' monthly targets.")]
    Target,
    #[schemars(description = "The raw total-cost cumulative target row.")]
    CumulativeTarget,
}

impl DownloadRowKind {
    pub const ORDER: [DownloadRowKind; 4] = [
        DownloadRowKind::Actual,
        DownloadRowKind::CumulativeActual,
        DownloadRowKind::Target,
        DownloadRowKind::CumulativeTarget,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DownloadRowKind::Actual => "已发生金额",
            DownloadRowKind::CumulativeActual => "月累已发生金额",
            DownloadRowKind::Target => "目标金额",
            DownloadRowKind::CumulativeTarget => "目标金额累计",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DownloadRow {
    #[schemars(description = "Project name; absent for the grand-total rows.")]
    pub project: Option<String>,
    pub kind: DownloadRowKind,
    pub values: MonthlySeries,
    #[schemars(description = "Sum of the twelve monthly values (累计金额).")]
    pub total: f64,
}

impl DownloadRow {
    fn new(project: Option<String>, kind: DownloadRowKind, values: MonthlySeries) -> Self {
        Self {
            project,
            kind,
            total: values.iter().sum(),
            values,
        }
    }
}

/// Four rows per project followed by a grand-total block.
pub fn client_download_table(
    tables: &BTreeMap<String, RawTable>,
    matcher: &RowMatcher<PrimaryRole>,
) -> Vec<DownloadRow> {
    let mut rows = Vec::new();
    let mut grand = [[0.0; MONTHS_PER_YEAR]; 4];

    for (project, table) in tables {
        let layout = PrimaryLayout::scan(table, matcher);
        let (Some(target_row), Some(actual_row)) = (layout.total_target_row, layout.total_actual_row) else {
            warn!("Skipping '{}' in download table: total-cost rows not found", project);
            continue;
        };

        let (fee_target, fee_actual) = fee_sums(table, matcher);
        let series = [
            fee_actual,
            row_series(table, actual_row),
            fee_target,
            row_series(table, target_row),
        ];

        for ((kind, values), acc) in DownloadRowKind::ORDER.iter().zip(series).zip(grand.iter_mut()) {
            add_series(acc, &values);
            rows.push(DownloadRow::new(Some(project.clone()), *kind, values));
        }
    }

    for (kind, values) in DownloadRowKind::ORDER.iter().zip(grand) {
        rows.push(DownloadRow::new(None, *kind, values));
    }

    rows
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiRow {
    pub project: String,
    pub year_cum_target_wy: f64,
    pub year_cum_actual_wy: f64,
    pub year_usage: f64,
    pub month_usage: f64,
    pub time_progress: f64,
}

pub fn kpi_table<'a>(results: impl IntoIterator<Item = (&'a String, &'a ProjectResult)>) -> Vec<KpiRow> {
    results
        .into_iter()
        .map(|(project, r)| KpiRow {
            project: project.clone(),
            year_cum_target_wy: r.year_cum_target_wy,
            year_cum_actual_wy: r.year_cum_actual_wy,
            year_usage: r.year_usage,
            month_usage: r.month_usage,
            time_progress: r.time_progress,
        })
        .collect()
}
