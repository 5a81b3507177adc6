use crate::error::{CostTrackerError, Result};
use crate::schema::{AnalysisConfig, CellValue, LaborMode, RawTable, DEFAULT_PRIMARY_ROW_LIMIT, DEFAULT_TERTIARY_ROW_LIMIT};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use log::{debug, info};
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

pub const PRIMARY_SHEET_WITH_LABOR: &str = "4主要费项费项月累成本使用情况";
pub const PRIMARY_SHEET_WITHOUT_LABOR: &str = "4-1主要费项费项月累成本使用情况";
pub const PRIMARY_SHEET_FALLBACKS: [&str; 2] = ["主要费项费项月累成本使用情况", "主要费项"];
pub const TERTIARY_SHEETS: [&str; 2] = ["三级费项月累表格", "三级费项"];

/// Suffixes of per-project extracts written next to the source files.
const EXTRACT_SUFFIXES: [&str; 2] = ["_主要费项.xlsx", "_三级费项.xlsx"];

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    /// Absolute grid starting at A1.
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// First row as header plus at most `limit` data rows.
    pub fn to_table(&self, limit: usize) -> RawTable {
        let header = self.rows.first().cloned().unwrap_or_default();
        let rows = self.rows.iter().skip(1).take(limit).cloned().collect();
        RawTable::new(self.name.clone(), header, rows)
    }
}

/// All worksheets of one project file, converted to tagged cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// Opens `.xlsx`, `.xlsm`, `.xls` or `.ods` files.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening workbook {}", path.display());
        let sheets = open_workbook_auto(path)?;
        read_all_sheets(sheets)
    }

    /// Reads a workbook held in memory, e.g. an uploaded file.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes))?;
        read_all_sheets(sheets)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

fn read_all_sheets<RS: Read + Seek>(mut sheets: Sheets<RS>) -> Result<Workbook> {
    let names = sheets.sheet_names();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let range = sheets.worksheet_range(&name)?;
        out.push(Sheet::new(name, range_to_rows(&range)));
    }
    Ok(Workbook::new(out))
}

fn range_to_rows(range: &Range<Data>) -> Vec<Vec<CellValue>> {
    // calamine ranges start at the first used cell; pad back to A1.
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows = vec![Vec::new(); row_offset];
    for source in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(source.iter().map(cell_from_data));
        rows.push(cells);
    }
    rows
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Number(if *b { 1.0 } else { 0.0 }),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            if s.trim().is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(s.clone())
            }
        }
    }
}

/// Primary sheet names to try, most specific first.
pub fn primary_sheet_candidates(mode: LaborMode) -> Vec<&'static str> {
    let mut names = vec![match mode {
        LaborMode::WithLabor => PRIMARY_SHEET_WITH_LABOR,
        LaborMode::WithoutLabor => PRIMARY_SHEET_WITHOUT_LABOR,
    }];
    names.extend(PRIMARY_SHEET_FALLBACKS);
    names
}

fn opposite_primary_sheet(mode: LaborMode) -> &'static str {
    match mode {
        LaborMode::WithLabor => PRIMARY_SHEET_WITHOUT_LABOR,
        LaborMode::WithoutLabor => PRIMARY_SHEET_WITH_LABOR,
    }
}

/// Exact match over `candidates` in order, then containment in the same
/// order. Sheets named exactly like an `excluded` entry are never chosen by
/// containment.
pub fn resolve_sheet<'a>(available: &'a [String], candidates: &[&str], excluded: &[&str]) -> Option<&'a str> {
    for candidate in candidates {
        if let Some(name) = available.iter().find(|n| n.trim() == *candidate) {
            return Some(name.as_str());
        }
    }

    for candidate in candidates {
        if let Some(name) = available
            .iter()
            .find(|n| n.contains(candidate) && !excluded.contains(&n.trim()))
        {
            return Some(name.as_str());
        }
    }

    None
}

/// Cuts the primary and tertiary regions out of a workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableExtractor {
    pub primary_row_limit: usize,
    pub tertiary_row_limit: usize,
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self {
            primary_row_limit: DEFAULT_PRIMARY_ROW_LIMIT,
            tertiary_row_limit: DEFAULT_TERTIARY_ROW_LIMIT,
        }
    }
}

impl TableExtractor {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            primary_row_limit: config.primary_row_limit,
            tertiary_row_limit: config.tertiary_row_limit,
        }
    }

    pub fn extract(&self, workbook: &Workbook, mode: LaborMode) -> Result<(RawTable, RawTable)> {
        let available = workbook.sheet_names();

        let primary_candidates = primary_sheet_candidates(mode);
        let primary_name = resolve_sheet(&available, &primary_candidates, &[opposite_primary_sheet(mode)])
            .ok_or_else(|| sheet_not_found("primary", &primary_candidates, &available))?;

        let tertiary_name = resolve_sheet(&available, &TERTIARY_SHEETS, &[])
            .ok_or_else(|| sheet_not_found("tertiary", &TERTIARY_SHEETS, &available))?;

        let primary = workbook
            .sheet(primary_name)
            .map(|s| s.to_table(self.primary_row_limit))
            .ok_or_else(|| sheet_not_found("primary", &primary_candidates, &available))?;
        let tertiary = workbook
            .sheet(tertiary_name)
            .map(|s| s.to_table(self.tertiary_row_limit))
            .ok_or_else(|| sheet_not_found("tertiary", &TERTIARY_SHEETS, &available))?;

        debug!(
            "Extracted '{}' ({} rows) and '{}' ({} rows)",
            primary.name,
            primary.row_count(),
            tertiary.name,
            tertiary.row_count()
        );

        Ok((primary, tertiary))
    }
}

pub fn extract_tables(workbook: &Workbook, mode: LaborMode, config: &AnalysisConfig) -> Result<(RawTable, RawTable)> {
    TableExtractor::from_config(config).extract(workbook, mode)
}

fn sheet_not_found(kind: &str, tried: &[&str], available: &[String]) -> CostTrackerError {
    CostTrackerError::SheetNotFound {
        kind: kind.to_string(),
        tried: tried.iter().map(|s| s.to_string()).collect(),
        available: available.to_vec(),
    }
}

/// Source workbooks directly inside `dir`, sorted by file name. Office lock
/// files and previously written extracts are skipped.
pub fn list_workbooks(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_workbook = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xlsx") || e.eq_ignore_ascii_case("xls"));

        if !is_workbook || file_name.starts_with("~$") {
            continue;
        }
        if EXTRACT_SUFFIXES.iter().any(|s| file_name.contains(s)) {
            continue;
        }
        files.push(path);
    }

    files.sort();
    info!("Found {} workbooks in {}", files.len(), dir.display());
    Ok(files)
}

/// Project name used as the result key: the file name without extension.
pub fn project_name_from_path(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str, rows: usize) -> Sheet {
        let grid = (0..rows)
            .map(|i| vec![CellValue::text(format!("r{}", i)), CellValue::Number(i as f64)])
            .collect();
        Sheet::new(name, grid)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_without_labor_prefers_suffixed_sheet() {
        let available = names(&["封面", PRIMARY_SHEET_WITH_LABOR, PRIMARY_SHEET_WITHOUT_LABOR]);
        let candidates = primary_sheet_candidates(LaborMode::WithoutLabor);
        assert_eq!(
            resolve_sheet(&available, &candidates, &[PRIMARY_SHEET_WITH_LABOR]),
            Some(PRIMARY_SHEET_WITHOUT_LABOR)
        );

        let candidates = primary_sheet_candidates(LaborMode::WithLabor);
        assert_eq!(
            resolve_sheet(&available, &candidates, &[PRIMARY_SHEET_WITHOUT_LABOR]),
            Some(PRIMARY_SHEET_WITH_LABOR)
        );
    }

    #[test]
    fn test_fallback_names_and_containment() {
        let available = names(&["主要费项", "三级费项 "]);
        let candidates = primary_sheet_candidates(LaborMode::WithLabor);
        assert_eq!(resolve_sheet(&available, &candidates, &[]), Some("主要费项"));
        assert_eq!(resolve_sheet(&available, &TERTIARY_SHEETS, &[]), Some("三级费项 "));

        let available = names(&["2024年主要费项费项月累成本使用情况"]);
        assert_eq!(
            resolve_sheet(&available, &candidates, &[]),
            Some("2024年主要费项费项月累成本使用情况")
        );
    }

    #[test]
    fn test_other_variant_is_not_picked_by_containment() {
        let available = names(&[PRIMARY_SHEET_WITHOUT_LABOR]);
        let candidates = primary_sheet_candidates(LaborMode::WithLabor);
        assert_eq!(
            resolve_sheet(&available, &candidates, &[PRIMARY_SHEET_WITHOUT_LABOR]),
            None
        );
    }

    #[test]
    fn test_extract_limits_rows_after_header() {
        let workbook = Workbook::new(vec![
            sheet(PRIMARY_SHEET_WITHOUT_LABOR, 60),
            sheet("三级费项月累表格", 200),
        ]);
        let (primary, tertiary) = TableExtractor::default()
            .extract(&workbook, LaborMode::WithoutLabor)
            .unwrap();

        assert_eq!(primary.row_count(), 39);
        assert_eq!(primary.header[0], CellValue::text("r0"));
        assert_eq!(primary.label(0, 0), "r1");
        assert_eq!(tertiary.row_count(), 153);
        assert_eq!(tertiary.name, "三级费项月累表格");
    }

    #[test]
    fn test_extract_reports_missing_sheet() {
        let workbook = Workbook::new(vec![sheet(PRIMARY_SHEET_WITH_LABOR, 5), sheet("汇总", 5)]);
        let err = TableExtractor::default()
            .extract(&workbook, LaborMode::WithLabor)
            .unwrap_err();
        match err {
            CostTrackerError::SheetNotFound {
                kind,
                tried,
                available,
            } => {
                assert_eq!(kind, "tertiary");
                assert_eq!(tried, names(&TERTIARY_SHEETS));
                assert_eq!(available, names(&[PRIMARY_SHEET_WITH_LABOR, "汇总"]));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_short_sheet_keeps_what_exists() {
        let workbook = Workbook::new(vec![sheet("主要费项", 3), sheet("三级费项", 0)]);
        let (primary, tertiary) =
            extract_tables(&workbook, LaborMode::WithoutLabor, &AnalysisConfig::default()).unwrap();
        assert_eq!(primary.row_count(), 2);
        assert_eq!(tertiary.row_count(), 0);
        assert!(tertiary.header.is_empty());
    }

    #[test]
    fn test_project_name_from_path() {
        assert_eq!(project_name_from_path("data/北区项目.xlsx"), "北区项目");
        assert_eq!(project_name_from_path("plain"), "plain");
    }
}
