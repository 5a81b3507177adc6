//! # Project Cost Tracker
//!
//! A library for turning monthly project cost-tracking workbooks into usage
//! metrics, budget-overrun anomalies and cross-project summaries.
//!
//! ## Core Concepts
//!
//! - **Primary table**: total-cost rows plus secondary fee items, each with a
//!   monthly target row (`目标金额`) and a monthly actual row (`已发生金额`)
//! - **Tertiary table**: four-row blocks keyed by a `d.d.d` fee code
//! - **Anomalies**: red when the cumulative actual passes the full-year target,
//!   yellow when it passes the month's own cumulative target
//! - **Batch**: one workbook per project; a broken workbook is reported and
//!   the remaining projects are still analyzed
//!
//! ## Example
//!
//! ```rust,ignore
//! use project_cost_tracker::*;
//!
//! let config = AnalysisConfig {
//!     selected_month: 6,
//!     include_self_owned_labor: false,
//!     ..AnalysisConfig::default()
//! };
//!
//! let report = analyze_directory("data", &config).unwrap();
//! for (project, result) in &report.results {
//!     println!("{}: {}% used, {}% of the year elapsed", project, result.year_usage, result.time_progress);
//! }
//! for failure in &report.failures {
//!     eprintln!("{}: {}", failure.project, failure.error);
//! }
//!
//! let ranking = report.ranking(6);
//! let combined = report.combined().unwrap();
//! ```

pub mod aggregate;
pub mod anomaly;
pub mod error;
pub mod fee_codes;
pub mod ingestion;
pub mod matcher;
pub mod primary;
pub mod ranking;
pub mod schema;
pub mod tertiary;
pub mod utils;

pub use aggregate::{
    client_download_table, kpi_table, merge_project_data, merge_tables, monthly_fee_summary,
    DownloadRow, DownloadRowKind, KpiRow, MonthlyFeePoint, MonthlyFeeSummary,
};
pub use error::{CostTrackerError, Result};
pub use fee_codes::{category_name, is_fee_code, UNKNOWN_CATEGORY};
pub use ingestion::{extract_tables, list_workbooks, project_name_from_path, Sheet, TableExtractor, Workbook};
pub use matcher::{LabelPattern, PrimaryRole, RowMatcher, RowRule, TertiaryRole};
pub use primary::{PrimaryLayout, PrimaryProcessor};
pub use ranking::{collect_anomalies, rank_anomalies, AnomalyLevel, AnomalyRanking, ProjectAnomaly, RankingEntry};
pub use schema::*;
pub use tertiary::TertiaryProcessor;
pub use utils::{coerce, month_label, time_progress};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One project's result together with the tables it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectAnalysis {
    pub result: ProjectResult,
    pub primary_table: RawTable,
    pub tertiary_table: RawTable,
}

/// A project that could not be analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFailure {
    pub project: String,
    pub error: String,
}

/// Outcome of a batch: every project that loaded, plus the ones that did not.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub selected_month: u32,
    pub results: BTreeMap<String, ProjectResult>,
    pub primary_tables: BTreeMap<String, RawTable>,
    pub tertiary_tables: BTreeMap<String, RawTable>,
    pub failures: Vec<ProjectFailure>,
    processor: PrimaryProcessor,
}

impl BatchReport {
    fn new(selected_month: u32, processor: PrimaryProcessor) -> Self {
        Self {
            selected_month,
            results: BTreeMap::new(),
            primary_tables: BTreeMap::new(),
            tertiary_tables: BTreeMap::new(),
            failures: Vec::new(),
            processor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Merged result over all loaded projects; `None` unless more than one
    /// project loaded.
    pub fn combined(&self) -> Result<Option<CombinedResult>> {
        if self.primary_tables.len() < 2 {
            return Ok(None);
        }
        merge_project_data(&self.primary_tables, self.selected_month, &self.processor).map(Some)
    }

    pub fn monthly_fee_summary(&self) -> MonthlyFeeSummary {
        monthly_fee_summary(&self.primary_tables, self.processor.matcher())
    }

    pub fn client_download_table(&self) -> Vec<DownloadRow> {
        client_download_table(&self.primary_tables, self.processor.matcher())
    }

    pub fn kpi_table(&self) -> Vec<KpiRow> {
        kpi_table(&self.results)
    }

    pub fn ranking(&self, cutoff_month: u32) -> AnomalyRanking {
        rank_anomalies(&self.results, cutoff_month)
    }

    pub fn anomalies(&self, cutoff_month: u32, level: AnomalyLevel) -> Vec<ProjectAnomaly> {
        collect_anomalies(&self.results, cutoff_month, level)
    }
}

#[derive(Debug, Clone)]
pub struct CostAnalyzer {
    config: AnalysisConfig,
    extractor: TableExtractor,
    primary: PrimaryProcessor,
    tertiary: TertiaryProcessor,
}

impl CostAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor: TableExtractor::from_config(&config),
            primary: PrimaryProcessor::from_config(&config),
            tertiary: TertiaryProcessor::new(),
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn with_primary_matcher(mut self, matcher: RowMatcher<PrimaryRole>) -> Self {
        self.primary = self.primary.with_matcher(matcher);
        self
    }

    pub fn with_tertiary_matcher(mut self, matcher: RowMatcher<TertiaryRole>) -> Self {
        self.tertiary = TertiaryProcessor::with_matcher(matcher);
        self
    }

    pub fn analyze_tables(&self, primary: &RawTable, tertiary: &RawTable) -> Result<ProjectResult> {
        let month = self.config.selected_month;
        let mut result = self.primary.process(primary, month)?;
        result.attach_tertiary(self.tertiary.process(tertiary, month)?);
        Ok(result)
    }

    pub fn analyze_workbook(&self, workbook: &Workbook) -> Result<ProjectAnalysis> {
        let (primary_table, tertiary_table) = self.extractor.extract(workbook, self.config.labor_mode())?;
        let result = self.analyze_tables(&primary_table, &tertiary_table)?;
        Ok(ProjectAnalysis {
            result,
            primary_table,
            tertiary_table,
        })
    }

    /// Analyzes every named workbook. Failures are collected, never fatal.
    pub fn analyze_batch<I>(&self, workbooks: I) -> BatchReport
    where
        I: IntoIterator<Item = (String, Workbook)>,
    {
        let mut report = self.empty_report();
        for (project, workbook) in workbooks {
            let outcome = self.analyze_workbook(&workbook);
            record(&mut report, project, outcome);
        }
        finish(&report);
        report
    }

    /// Opens and analyzes each file, naming projects after the file stem.
    pub fn analyze_paths(&self, paths: &[PathBuf]) -> BatchReport {
        let mut report = self.empty_report();
        for path in paths {
            let project = project_name_from_path(path);
            debug!("Loading project '{}' from {}", project, path.display());
            let outcome = Workbook::open(path).and_then(|wb| self.analyze_workbook(&wb));
            record(&mut report, project, outcome);
        }
        finish(&report);
        report
    }

    pub fn analyze_directory(&self, dir: impl AsRef<Path>) -> Result<BatchReport> {
        let dir = dir.as_ref();
        let paths = list_workbooks(dir)?;
        if paths.is_empty() {
            return Err(CostTrackerError::EmptyInput(format!(
                "no workbooks found in {}",
                dir.display()
            )));
        }
        Ok(self.analyze_paths(&paths))
    }

    fn empty_report(&self) -> BatchReport {
        BatchReport::new(self.config.selected_month, self.primary.clone())
    }
}

fn record(report: &mut BatchReport, project: String, outcome: Result<ProjectAnalysis>) {
    match outcome {
        Ok(analysis) => {
            if report.results.contains_key(&project) {
                warn!("Project '{}' appears twice; keeping the later workbook", project);
            }
            debug!(
                "Project '{}': {} fee items, {} + {} anomalies",
                project,
                analysis.result.fee_items.len(),
                analysis.result.exceptions.len(),
                analysis.result.tertiary_exceptions.len()
            );
            report.primary_tables.insert(project.clone(), analysis.primary_table);
            report.tertiary_tables.insert(project.clone(), analysis.tertiary_table);
            report.results.insert(project, analysis.result);
        }
        Err(e) => {
            warn!("Skipping project '{}': {}", project, e);
            report.failures.push(ProjectFailure {
                project,
                error: e.to_string(),
            });
        }
    }
}

fn finish(report: &BatchReport) {
    info!(
        "Analyzed {} projects for month {} ({} failed)",
        report.results.len(),
        report.selected_month,
        report.failures.len()
    );
}

pub fn analyze_project(primary: &RawTable, tertiary: &RawTable, config: &AnalysisConfig) -> Result<ProjectResult> {
    CostAnalyzer::new(config.clone())?.analyze_tables(primary, tertiary)
}

pub fn analyze_directory(dir: impl AsRef<Path>, config: &AnalysisConfig) -> Result<BatchReport> {
    CostAnalyzer::new(config.clone())?.analyze_directory(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{PRIMARY_SHEET_WITHOUT_LABOR, PRIMARY_SHEET_WITH_LABOR, TERTIARY_SHEETS};

    fn row(first: &str, second: &str, values: &[f64]) -> Vec<CellValue> {
        let mut cells = vec![CellValue::from(first), CellValue::from(second)];
        cells.extend(values.iter().map(|v| CellValue::Number(*v)));
        cells
    }

    fn header() -> Vec<CellValue> {
        vec![CellValue::from("费项"), CellValue::from("数据类型")]
    }

    fn primary_rows(scale: f64) -> Vec<Vec<CellValue>> {
        let target: Vec<f64> = (1..=12).map(|m| m as f64 * 1000.0 * scale).collect();
        let actual: Vec<f64> = (1..=12).map(|m| m as f64 * 800.0 * scale).collect();
        vec![
            header(),
            row("总成本", "月累总目标成本", &target),
            row("总成本", "月累已发生成本", &actual),
            row("保洁", "目标金额", &[100.0 * scale; 12]),
            row("保洁", "已发生金额", &[150.0 * scale; 12]),
        ]
    }

    fn tertiary_rows() -> Vec<Vec<CellValue>> {
        vec![
            vec![CellValue::from("编码"), CellValue::from("数据类型")],
            row("1.1.1", "目标金额", &[0.0; 12]),
            row("1.1.1", "已发生金额", &[5.0; 12]),
            row("1.1.1", "目标金额累计", &[0.0; 12]),
            row("1.1.1", "累计已发生金额", &[5.0; 12]),
        ]
    }

    fn workbook(primary_sheet: &str, scale: f64) -> Workbook {
        Workbook::new(vec![
            Sheet::new(primary_sheet, primary_rows(scale)),
            Sheet::new(TERTIARY_SHEETS[0], tertiary_rows()),
        ])
    }

    #[test]
    fn test_analyze_workbook_end_to_end() {
        let analyzer = CostAnalyzer::new(AnalysisConfig::for_month(6)).unwrap();
        let analysis = analyzer
            .analyze_workbook(&workbook(PRIMARY_SHEET_WITHOUT_LABOR, 1.0))
            .unwrap();
        let result = &analysis.result;

        assert_eq!(result.selected_month, 6);
        assert_eq!(result.cum_target[5], 6000.0);
        assert_eq!(result.month_usage, 80.0);
        assert_eq!(result.year_usage, 40.0);
        assert_eq!(result.year_cum_target_wy, 1.2);
        assert_eq!(result.time_progress, 50.0);

        assert_eq!(result.fee_items.len(), 1);
        assert_eq!(result.exceptions.len(), 6);
        assert!(result
            .exceptions
            .iter()
            .all(|e| e.exception_type == ExceptionType::Yellow));

        assert_eq!(result.tertiary_fee_items.len(), 1);
        assert_eq!(result.tertiary_exceptions.len(), 6);
        assert_eq!(result.tertiary_exceptions[0].exception_type, ExceptionType::Red);
        assert_eq!(analysis.primary_table.row_count(), 4);
    }

    #[test]
    fn test_labor_mode_selects_sheet() {
        let wb = Workbook::new(vec![
            Sheet::new(PRIMARY_SHEET_WITH_LABOR, primary_rows(2.0)),
            Sheet::new(PRIMARY_SHEET_WITHOUT_LABOR, primary_rows(1.0)),
            Sheet::new(TERTIARY_SHEETS[1], tertiary_rows()),
        ]);

        let with_labor = CostAnalyzer::new(AnalysisConfig {
            include_self_owned_labor: true,
            ..AnalysisConfig::default()
        })
        .unwrap();
        let without_labor = CostAnalyzer::new(AnalysisConfig::default()).unwrap();

        let a = with_labor.analyze_workbook(&wb).unwrap();
        let b = without_labor.analyze_workbook(&wb).unwrap();
        assert_eq!(a.primary_table.name, PRIMARY_SHEET_WITH_LABOR);
        assert_eq!(a.result.cum_target[11], 2.0 * b.result.cum_target[11]);
    }

    #[test]
    fn test_batch_partial_success() {
        let analyzer = CostAnalyzer::new(AnalysisConfig::for_month(3)).unwrap();
        let broken = Workbook::new(vec![Sheet::new("汇总", vec![header()])]);
        let report = analyzer.analyze_batch(vec![
            ("B".to_string(), workbook(PRIMARY_SHEET_WITHOUT_LABOR, 2.0)),
            ("broken".to_string(), broken),
            ("A".to_string(), workbook("主要费项", 1.0)),
        ]);

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].project, "broken");
        assert!(report.failures[0].error.contains("汇总"));

        let combined = report.combined().unwrap().unwrap();
        assert_eq!(combined.merged_projects, vec!["A", "B"]);
        assert_eq!(combined.result.cum_target[2], 9000.0);

        let kpis = report.kpi_table();
        assert_eq!(kpis[0].project, "A");
        assert_eq!(report.client_download_table().len(), 12);
        assert_eq!(report.monthly_fee_summary().points[0].target, 300.0);

        let ranking = report.ranking(3);
        assert_eq!(ranking.combined[0].total, 6);
        assert_eq!(report.anomalies(3, AnomalyLevel::Tertiary).len(), 6);
    }

    #[test]
    fn test_single_project_has_no_combined_result() {
        let analyzer = CostAnalyzer::new(AnalysisConfig::default()).unwrap();
        let report = analyzer.analyze_batch(vec![(
            "A".to_string(),
            workbook(PRIMARY_SHEET_WITHOUT_LABOR, 1.0),
        )]);
        assert!(report.combined().unwrap().is_none());
        assert!(!report.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            CostAnalyzer::new(AnalysisConfig::for_month(0)),
            Err(CostTrackerError::InvalidMonth(0))
        ));
    }
}
