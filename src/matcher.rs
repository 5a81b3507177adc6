//! Declarative row classification.
//!
//! The reporting template identifies rows only by the text in its two label
//! columns. Instead of hard-coding those checks in each processor, every scan
//! runs an ordered list of [`RowRule`]s; the first rule whose patterns match
//! decides the row's role. Rules are plain data and can be loaded from JSON
//! for new template variants.

use crate::error::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const TOTAL_COST: &str = "总成本";
pub const YEAR_TOTAL_COST: &str = "年总成本";
pub const CUM_TOTAL_TARGET: &str = "月累总目标成本";
pub const CUM_TOTAL_ACTUAL: &str = "月累已发生成本";
pub const TARGET_AMOUNT: &str = "目标金额";
pub const OCCURRED_AMOUNT: &str = "已发生金额";
pub const CUMULATIVE: &str = "累计";

/// Substring constraints on a single label cell. Empty lists impose nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LabelPattern {
    pub any_of: Vec<String>,
    pub all_of: Vec<String>,
    pub none_of: Vec<String>,
}

impl LabelPattern {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn contains_any(needles: &[&str]) -> Self {
        Self {
            any_of: to_owned(needles),
            ..Self::default()
        }
    }

    pub fn contains_all(needles: &[&str]) -> Self {
        Self {
            all_of: to_owned(needles),
            ..Self::default()
        }
    }

    pub fn excluding(mut self, needles: &[&str]) -> Self {
        self.none_of.extend(to_owned(needles));
        self
    }

    pub fn matches(&self, text: &str) -> bool {
        let any_ok = self.any_of.is_empty() || self.any_of.iter().any(|n| text.contains(n.as_str()));
        let all_ok = self.all_of.iter().all(|n| text.contains(n.as_str()));
        let none_ok = !self.none_of.iter().any(|n| text.contains(n.as_str()));
        any_ok && all_ok && none_ok
    }
}

fn to_owned(needles: &[&str]) -> Vec<String> {
    needles.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRule<R> {
    /// Pattern for column 0.
    pub first: LabelPattern,
    /// Pattern for column 1.
    pub second: LabelPattern,
    pub role: R,
}

impl<R> RowRule<R> {
    pub fn new(first: LabelPattern, second: LabelPattern, role: R) -> Self {
        Self {
            first,
            second,
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMatcher<R> {
    pub rules: Vec<RowRule<R>>,
}

impl<R: Copy> RowMatcher<R> {
    pub fn new(rules: Vec<RowRule<R>>) -> Self {
        Self { rules }
    }

    /// Role of the first matching rule, if any.
    pub fn classify(&self, first: &str, second: &str) -> Option<R> {
        self.rules
            .iter()
            .find(|rule| rule.first.matches(first) && rule.second.matches(second))
            .map(|rule| rule.role)
    }
}

impl<R: DeserializeOwned> RowMatcher<R> {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Row roles in the primary (secondary fee-item) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryRole {
    TotalTarget,
    TotalActual,
    /// Any other total-cost row; never treated as a fee item.
    TotalOther,
    FeeTarget,
    FeeActual,
}

impl RowMatcher<PrimaryRole> {
    pub fn primary() -> Self {
        let total = || LabelPattern::contains_any(&[TOTAL_COST, YEAR_TOTAL_COST]);
        Self::new(vec![
            RowRule::new(
                total(),
                LabelPattern::contains_any(&[CUM_TOTAL_TARGET]),
                PrimaryRole::TotalTarget,
            ),
            RowRule::new(
                total(),
                LabelPattern::contains_any(&[CUM_TOTAL_ACTUAL]),
                PrimaryRole::TotalActual,
            ),
            RowRule::new(total(), LabelPattern::any(), PrimaryRole::TotalOther),
            RowRule::new(
                LabelPattern::any(),
                LabelPattern::contains_any(&[TARGET_AMOUNT]).excluding(&[CUMULATIVE]),
                PrimaryRole::FeeTarget,
            ),
            RowRule::new(
                LabelPattern::any(),
                LabelPattern::contains_any(&[OCCURRED_AMOUNT]).excluding(&[CUMULATIVE]),
                PrimaryRole::FeeActual,
            ),
        ])
    }
}

impl Default for RowMatcher<PrimaryRole> {
    fn default() -> Self {
        Self::primary()
    }
}

/// Row roles inside a tertiary fee-code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TertiaryRole {
    MonthlyTarget,
    MonthlyActual,
    CumulativeTarget,
    CumulativeActual,
}

impl RowMatcher<TertiaryRole> {
    pub fn tertiary() -> Self {
        Self::new(vec![
            RowRule::new(
                LabelPattern::any(),
                LabelPattern::contains_any(&[OCCURRED_AMOUNT]).excluding(&[CUMULATIVE]),
                TertiaryRole::MonthlyActual,
            ),
            RowRule::new(
                LabelPattern::any(),
                LabelPattern::contains_all(&[OCCURRED_AMOUNT, CUMULATIVE]),
                TertiaryRole::CumulativeActual,
            ),
            RowRule::new(
                LabelPattern::any(),
                LabelPattern::contains_any(&[TARGET_AMOUNT]).excluding(&[CUMULATIVE]),
                TertiaryRole::MonthlyTarget,
            ),
            RowRule::new(
                LabelPattern::any(),
                LabelPattern::contains_all(&[TARGET_AMOUNT, CUMULATIVE]),
                TertiaryRole::CumulativeTarget,
            ),
        ])
    }
}

impl Default for RowMatcher<TertiaryRole> {
    fn default() -> Self {
        Self::tertiary()
    }
}
