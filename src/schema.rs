use crate::error::{CostTrackerError, Result};
use crate::utils::validate_month;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Twelve values, January first.
pub type MonthlySeries = [f64; 12];

/// A spreadsheet cell as it crosses the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Trimmed textual form used for label matching.
    pub fn label(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

/// A rectangular region cut out of one worksheet.
///
/// `header` is the sheet's first row; `rows` are the data rows below it.
/// Columns 0 and 1 hold labels, columns 2..=13 hold January..December.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawTable {
    pub name: String,
    pub header: Vec<CellValue>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, header: Vec<CellValue>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            header,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.header.len()))
            .max()
            .unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn label(&self, row: usize, col: usize) -> String {
        self.cell(row, col).label()
    }

    pub fn row(&self, row: usize) -> &[CellValue] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Which primary sheet variant to read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LaborMode {
    /// `4主要费项...`: totals include the project's own labor cost.
    WithLabor,
    /// `4-1主要费项...`: totals exclude the project's own labor cost.
    #[default]
    WithoutLabor,
}

impl LaborMode {
    pub fn from_flag(include_self_owned_labor: bool) -> Self {
        if include_self_owned_labor {
            LaborMode::WithLabor
        } else {
            LaborMode::WithoutLabor
        }
    }
}

/// How the total-cost rows of the primary table are interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TotalRowMode {
    #[schemars(description = "The total rows already hold month-to-date cumulative values (the 月累 template).")]
    #[default]
    Cumulative,

    #[schemars(description = "The total rows hold per-month amounts that must be cumulatively summed.")]
    Monthly,
}

pub const DEFAULT_PRIMARY_ROW_LIMIT: usize = 39;
pub const DEFAULT_TERTIARY_ROW_LIMIT: usize = 153;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    #[schemars(description = "Month (1 = January, 12 = December) the usage ratios and anomaly cut-off are computed for.")]
    pub selected_month: u32,

    #[schemars(description = "Read the primary sheet variant that includes self-owned labor cost.")]
    pub include_self_owned_labor: bool,

    pub total_row_mode: TotalRowMode,

    #[schemars(description = "Number of data rows kept from the primary sheet.")]
    pub primary_row_limit: usize,

    #[schemars(description = "Number of data rows kept from the tertiary sheet.")]
    pub tertiary_row_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            selected_month: 12,
            include_self_owned_labor: false,
            total_row_mode: TotalRowMode::Cumulative,
            primary_row_limit: DEFAULT_PRIMARY_ROW_LIMIT,
            tertiary_row_limit: DEFAULT_TERTIARY_ROW_LIMIT,
        }
    }
}

impl AnalysisConfig {
    pub fn for_month(selected_month: u32) -> Self {
        Self {
            selected_month,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_month(self.selected_month)?;
        if self.primary_row_limit == 0 {
            return Err(CostTrackerError::Config(
                "primary_row_limit must be greater than zero".to_string(),
            ));
        }
        if self.tertiary_row_limit == 0 {
            return Err(CostTrackerError::Config(
                "tertiary_row_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn labor_mode(&self) -> LaborMode {
        LaborMode::from_flag(self.include_self_owned_labor)
    }
}

/// A secondary fee item, cumulative up to the selected month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeeItem {
    pub name: String,
    pub cum_target: f64,
    pub cum_actual: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionType {
    #[schemars(description = "Cumulative actual exceeds the full-year target.")]
    Red,
    #[schemars(description = "Cumulative actual exceeds that month's cumulative target.")]
    Yellow,
}

impl ExceptionType {
    pub fn label(&self) -> &'static str {
        match self {
            ExceptionType::Red => "超年度目标",
            ExceptionType::Yellow => "超月度目标",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnomalyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_code: Option<String>,
    pub fee_name: String,
    pub month: u32,
    pub exception_type: ExceptionType,
    pub cum_actual: f64,
    pub cum_target: f64,
    pub year_target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TertiaryFeeItem {
    pub code: String,
    pub name: String,
    #[schemars(description = "Cumulative target at the selected month.")]
    pub cum_target_to_date: f64,
    #[schemars(description = "Cumulative actual at the selected month.")]
    pub cum_actual_to_date: f64,
    pub monthly_target: MonthlySeries,
    pub monthly_actual: MonthlySeries,
    pub cum_target: MonthlySeries,
    pub cum_actual: MonthlySeries,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TertiaryResult {
    pub tertiary_fee_items: Vec<TertiaryFeeItem>,
    pub exceptions: Vec<AnomalyRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectResult {
    pub selected_month: u32,
    #[schemars(description = "Sum of the raw total-target row.")]
    pub total_target: f64,
    pub cum_target: MonthlySeries,
    pub cum_actual: MonthlySeries,
    #[schemars(description = "December cumulative target in units of 10,000 yuan.")]
    pub year_cum_target_wy: f64,
    #[schemars(description = "December cumulative actual in units of 10,000 yuan.")]
    pub year_cum_actual_wy: f64,
    pub year_usage: f64,
    pub month_usage: f64,
    pub time_progress: f64,
    pub fee_items: Vec<FeeItem>,
    pub exceptions: Vec<AnomalyRecord>,
    #[serde(default)]
    pub tertiary_fee_items: Vec<TertiaryFeeItem>,
    #[serde(default)]
    pub tertiary_exceptions: Vec<AnomalyRecord>,
}

impl ProjectResult {
    pub fn attach_tertiary(&mut self, tertiary: TertiaryResult) {
        self.tertiary_fee_items = tertiary.tertiary_fee_items;
        self.tertiary_exceptions = tertiary.exceptions;
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ProjectResult)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// The primary result recomputed over the merged table of several projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CombinedResult {
    #[serde(flatten)]
    pub result: ProjectResult,
    pub merged_projects: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = ProjectResult::schema_as_json().unwrap();
        assert!(schema_json.contains("year_cum_target_wy"));
        assert!(schema_json.contains("tertiary_exceptions"));
        assert!(schema_json.contains("exception_type"));
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = AnalysisConfig::from_json_str(r#"{"selected_month": 5}"#).unwrap();
        assert_eq!(config.selected_month, 5);
        assert_eq!(config.primary_row_limit, 39);
        assert_eq!(config.tertiary_row_limit, 153);
        assert_eq!(config.total_row_mode, TotalRowMode::Cumulative);
        assert_eq!(config.labor_mode(), LaborMode::WithoutLabor);

        let config = AnalysisConfig::from_json_str(
            r#"{"selected_month": 3, "include_self_owned_labor": true, "total_row_mode": "monthly"}"#,
        )
        .unwrap();
        assert_eq!(config.labor_mode(), LaborMode::WithLabor);
        assert_eq!(config.total_row_mode, TotalRowMode::Monthly);
    }

    #[test]
    fn test_config_rejects_bad_month() {
        let err = AnalysisConfig::from_json_str(r#"{"selected_month": 13}"#).unwrap_err();
        assert!(matches!(err, CostTrackerError::InvalidMonth(13)));

        let config = AnalysisConfig {
            tertiary_row_limit: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(CostTrackerError::Config(_))));
    }

    #[test]
    fn test_cell_labels() {
        assert_eq!(CellValue::text("  人工服务 ").label(), "人工服务");
        assert_eq!(CellValue::Number(3.0).label(), "3");
        assert_eq!(CellValue::Number(1.5).label(), "1.5");
        assert_eq!(CellValue::Empty.label(), "");
    }

    #[test]
    fn test_table_access_out_of_bounds() {
        let table = RawTable::new(
            "t",
            vec![CellValue::from("a")],
            vec![vec![CellValue::from("x"), CellValue::from(2.0)]],
        );
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.cell(0, 1), &CellValue::Number(2.0));
        assert_eq!(table.cell(5, 5), &CellValue::Empty);
        assert!(table.row(9).is_empty());
    }

    #[test]
    fn test_result_serialization_round_trip() {
        let result = ProjectResult {
            selected_month: 1,
            total_target: 10.0,
            cum_target: [1.0; 12],
            cum_actual: [0.5; 12],
            year_cum_target_wy: 0.0,
            year_cum_actual_wy: 0.0,
            year_usage: 50.0,
            month_usage: 50.0,
            time_progress: 8.33,
            fee_items: vec![],
            exceptions: vec![AnomalyRecord {
                fee_code: None,
                fee_name: "保洁".to_string(),
                month: 1,
                exception_type: ExceptionType::Yellow,
                cum_actual: 2.0,
                cum_target: 1.0,
                year_target: 12.0,
            }],
            tertiary_fee_items: vec![],
            tertiary_exceptions: vec![],
        };
        let json = result.to_json().unwrap();
        assert!(json.contains("\"yellow\""));
        assert!(!json.contains("fee_code"));
        let back: ProjectResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
