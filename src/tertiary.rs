use crate::anomaly::detect;
use crate::error::Result;
use crate::fee_codes::{category_name, is_fee_code};
use crate::matcher::{RowMatcher, TertiaryRole};
use crate::schema::{MonthlySeries, RawTable, TertiaryFeeItem, TertiaryResult};
use crate::utils::{month_index, monthly_values, validate_month, FIRST_VALUE_COLUMN, MONTHS_PER_YEAR};
use log::{debug, warn};

/// Code column, label column and twelve months.
pub const MIN_TERTIARY_COLUMNS: usize = FIRST_VALUE_COLUMN + MONTHS_PER_YEAR;

#[derive(Debug, Default)]
struct CodeBlock {
    monthly_target: Option<MonthlySeries>,
    monthly_actual: Option<MonthlySeries>,
    cum_target: Option<MonthlySeries>,
    cum_actual: Option<MonthlySeries>,
}

impl CodeBlock {
    fn set(&mut self, role: TertiaryRole, values: MonthlySeries) {
        let slot = match role {
            TertiaryRole::MonthlyTarget => &mut self.monthly_target,
            TertiaryRole::MonthlyActual => &mut self.monthly_actual,
            TertiaryRole::CumulativeTarget => &mut self.cum_target,
            TertiaryRole::CumulativeActual => &mut self.cum_actual,
        };
        *slot = Some(values);
    }

    fn complete(&self) -> Option<[MonthlySeries; 4]> {
        Some([
            self.monthly_target?,
            self.monthly_actual?,
            self.cum_target?,
            self.cum_actual?,
        ])
    }
}

/// Rebuilds the four-row blocks of the tertiary sheet and flags anomalies.
#[derive(Debug, Clone, Default)]
pub struct TertiaryProcessor {
    matcher: RowMatcher<TertiaryRole>,
}

impl TertiaryProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matcher(matcher: RowMatcher<TertiaryRole>) -> Self {
        Self { matcher }
    }

    pub fn process(&self, table: &RawTable, month: u32) -> Result<TertiaryResult> {
        validate_month(month)?;

        let columns = table.column_count();
        if columns < MIN_TERTIARY_COLUMNS {
            warn!(
                "Tertiary table '{}' has {} columns, at least {} are required",
                table.name, columns, MIN_TERTIARY_COLUMNS
            );
            return Ok(TertiaryResult::default());
        }

        let blocks = self.collect_blocks(table);
        let m = month_index(month);
        let mut result = TertiaryResult::default();

        for (code, [monthly_target, monthly_actual, cum_target, cum_actual]) in blocks {
            let name = category_name(&code);

            result
                .exceptions
                .extend(detect(Some(code.as_str()), name, &cum_target, &cum_actual, month));

            result.tertiary_fee_items.push(TertiaryFeeItem {
                name: name.to_string(),
                cum_target_to_date: cum_target[m],
                cum_actual_to_date: cum_actual[m],
                monthly_target,
                monthly_actual,
                cum_target,
                cum_actual,
                code,
            });
        }

        debug!(
            "Tertiary table '{}': {} fee codes, {} anomalies",
            table.name,
            result.tertiary_fee_items.len(),
            result.exceptions.len()
        );

        Ok(result)
    }

    fn collect_blocks(&self, table: &RawTable) -> Vec<(String, [MonthlySeries; 4])> {
        let mut blocks: Vec<(String, [MonthlySeries; 4])> = Vec::new();
        let mut current: Option<(String, CodeBlock)> = None;

        for idx in 0..table.row_count() {
            let code = table.label(idx, 0);
            if !is_fee_code(&code) {
                continue;
            }

            if current.as_ref().is_some_and(|(c, _)| *c != code) {
                if let Some(finished) = current.take() {
                    store_block(&mut blocks, finished);
                }
            }

            let (_, block) = current.get_or_insert_with(|| (code.clone(), CodeBlock::default()));
            match self.matcher.classify(&code, &table.label(idx, 1)) {
                Some(role) => block.set(role, monthly_values(table.row(idx))),
                None => debug!("Row {} of code {} has an unrecognised label", idx, code),
            }
        }

        if let Some(finished) = current {
            store_block(&mut blocks, finished);
        }

        blocks
    }
}

fn store_block(blocks: &mut Vec<(String, [MonthlySeries; 4])>, (code, block): (String, CodeBlock)) {
    let Some(rows) = block.complete() else {
        debug!("Dropping fee code {}: incomplete block", code);
        return;
    };

    match blocks.iter_mut().find(|(c, _)| *c == code) {
        Some(existing) => existing.1 = rows,
        None => blocks.push((code, rows)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee_codes::UNKNOWN_CATEGORY;
    use crate::schema::{CellValue, ExceptionType};

    fn row(code: &str, label: &str, values: &[f64]) -> Vec<CellValue> {
        let mut cells = vec![CellValue::from(code), CellValue::from(label)];
        let mut padded = [0.0; 12];
        padded[..values.len()].copy_from_slice(values);
        cells.extend(padded.iter().map(|v| CellValue::Number(*v)));
        cells
    }

    fn block(code: &str, mt: &[f64], ma: &[f64], ct: &[f64], ca: &[f64]) -> Vec<Vec<CellValue>> {
        vec![
            row(code, "目标金额", mt),
            row(code, "已发生金额", ma),
            row(code, "目标金额累计", ct),
            row(code, "累计已发生金额", ca),
        ]
    }

    fn table(rows: Vec<Vec<CellValue>>) -> RawTable {
        RawTable::new("三级费项", vec![CellValue::text("编码")], rows)
    }

    #[test]
    fn test_zero_budget_with_spend_is_red() {
        let t = table(block("1.1.1", &[], &[5.0], &[], &[5.0]));
        let result = TertiaryProcessor::new().process(&t, 1).unwrap();

        assert_eq!(result.tertiary_fee_items.len(), 1);
        let item = &result.tertiary_fee_items[0];
        assert_eq!(item.code, "1.1.1");
        assert_eq!(item.name, "人工服务");
        assert_eq!(item.cum_actual_to_date, 5.0);

        assert_eq!(result.exceptions.len(), 1);
        let e = &result.exceptions[0];
        assert_eq!(e.month, 1);
        assert_eq!(e.exception_type, ExceptionType::Red);
        assert_eq!(e.year_target, 0.0);
        assert_eq!(e.fee_code.as_deref(), Some("1.1.1"));
    }

    #[test]
    fn test_zero_budget_without_spend_is_emitted_once() {
        let t = table(block("1.2.3", &[], &[], &[], &[]));
        let result = TertiaryProcessor::new().process(&t, 12).unwrap();
        assert_eq!(result.tertiary_fee_items.len(), 1);
        assert!(result.exceptions.is_empty());
    }

    #[test]
    fn test_incomplete_block_is_dropped() {
        let mut rows = block("1.3.1", &[], &[], &[], &[]);
        rows.pop();
        rows.extend(block("1.3.2", &[1.0], &[1.0], &[1.0], &[1.0]));
        let result = TertiaryProcessor::new().process(&table(rows), 6).unwrap();

        let codes: Vec<&str> = result
            .tertiary_fee_items
            .iter()
            .map(|i| i.code.as_str())
            .collect();
        assert_eq!(codes, vec!["1.3.2"]);
    }

    #[test]
    fn test_unknown_code_and_interleaved_rows() {
        let mut rows = vec![row("1.2", "目标金额", &[9.0])];
        let mut b = block("7.7.7", &[1.0], &[2.0], &[10.0; 12], &[3.0; 12]);
        b.insert(2, row("备注", "说明", &[]));
        rows.extend(b);
        let result = TertiaryProcessor::new().process(&table(rows), 3).unwrap();

        assert_eq!(result.tertiary_fee_items.len(), 1);
        let item = &result.tertiary_fee_items[0];
        assert_eq!(item.name, UNKNOWN_CATEGORY);
        assert_eq!(item.monthly_target[0], 1.0);
        assert_eq!(item.monthly_actual[0], 2.0);
        assert!(result.exceptions.is_empty());
    }

    #[test]
    fn test_yellow_then_red_until_cutoff() {
        let ct: Vec<f64> = (1..=12).map(|m| m as f64 * 10.0).collect();
        let ca: Vec<f64> = (1..=12).map(|m| m as f64 * 25.0).collect();
        let t = table(block("1.4.2", &[10.0; 12], &[25.0; 12], &ct, &ca));
        let result = TertiaryProcessor::new().process(&t, 6).unwrap();

        let kinds: Vec<(u32, ExceptionType)> = result
            .exceptions
            .iter()
            .map(|e| (e.month, e.exception_type))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (1, ExceptionType::Yellow),
                (2, ExceptionType::Yellow),
                (3, ExceptionType::Yellow),
                (4, ExceptionType::Yellow),
                (5, ExceptionType::Red),
                (6, ExceptionType::Red),
            ]
        );
        assert_eq!(result.exceptions[0].fee_name, "公共电费");
    }

    #[test]
    fn test_too_few_columns_returns_empty() {
        let t = table(vec![vec![
            CellValue::from("1.1.1"),
            CellValue::from("目标金额"),
            CellValue::Number(1.0),
        ]]);
        let result = TertiaryProcessor::new().process(&t, 1).unwrap();
        assert!(result.tertiary_fee_items.is_empty());
        assert!(result.exceptions.is_empty());
    }

    #[test]
    fn test_repeated_code_replaces_in_place() {
        let mut rows = block("1.1.1", &[1.0], &[1.0], &[1.0; 12], &[1.0; 12]);
        rows.extend(block("1.1.2", &[2.0], &[2.0], &[2.0; 12], &[2.0; 12]));
        rows.extend(block("1.1.1", &[3.0], &[3.0], &[3.0; 12], &[3.0; 12]));
        let result = TertiaryProcessor::new().process(&table(rows), 1).unwrap();

        assert_eq!(result.tertiary_fee_items.len(), 2);
        assert_eq!(result.tertiary_fee_items[0].code, "1.1.1");
        assert_eq!(result.tertiary_fee_items[0].monthly_target[0], 3.0);
        assert_eq!(result.tertiary_fee_items[1].code, "1.1.2");
    }
}
