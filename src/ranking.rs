use crate::schema::{AnomalyRecord, ExceptionType, ProjectResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RankingEntry {
    pub project: String,
    pub red: usize,
    pub yellow: usize,
    pub total: usize,
}

impl RankingEntry {
    fn count<'a>(project: &str, records: impl IntoIterator<Item = &'a AnomalyRecord>, cutoff: u32) -> Self {
        let (mut red, mut yellow) = (0, 0);
        for record in records.into_iter().filter(|r| r.month <= cutoff) {
            match record.exception_type {
                ExceptionType::Red => red += 1,
                ExceptionType::Yellow => yellow += 1,
            }
        }
        Self {
            project: project.to_string(),
            red,
            yellow,
            total: red + yellow,
        }
    }
}

/// Projects ordered by anomaly count, most first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct AnomalyRanking {
    #[schemars(description = "Secondary fee-item anomalies.")]
    pub primary: Vec<RankingEntry>,
    #[schemars(description = "Tertiary fee-code anomalies.")]
    pub tertiary: Vec<RankingEntry>,
    #[schemars(description = "Both levels together.")]
    pub combined: Vec<RankingEntry>,
}

pub fn rank_anomalies<'a>(
    results: impl IntoIterator<Item = (&'a String, &'a ProjectResult)>,
    cutoff: u32,
) -> AnomalyRanking {
    let mut ranking = AnomalyRanking::default();

    for (project, result) in results {
        ranking
            .primary
            .push(RankingEntry::count(project, &result.exceptions, cutoff));
        ranking
            .tertiary
            .push(RankingEntry::count(project, &result.tertiary_exceptions, cutoff));
        ranking.combined.push(RankingEntry::count(
            project,
            result.exceptions.iter().chain(&result.tertiary_exceptions),
            cutoff,
        ));
    }

    // sort_by is stable: ties keep input order
    for list in [&mut ranking.primary, &mut ranking.tertiary, &mut ranking.combined] {
        list.sort_by(|a, b| b.total.cmp(&a.total));
    }

    ranking
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyLevel {
    Primary,
    Tertiary,
}

/// One row of an anomaly detail listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectAnomaly {
    pub project: String,
    #[serde(flatten)]
    pub record: AnomalyRecord,
}

impl ProjectAnomaly {
    pub fn exception_label(&self) -> &'static str {
        self.record.exception_type.label()
    }
}

/// Records of every project up to `cutoff`, ordered by month.
pub fn collect_anomalies<'a>(
    results: impl IntoIterator<Item = (&'a String, &'a ProjectResult)>,
    cutoff: u32,
    level: AnomalyLevel,
) -> Vec<ProjectAnomaly> {
    let mut rows: Vec<ProjectAnomaly> = results
        .into_iter()
        .flat_map(|(project, result)| {
            let records = match level {
                AnomalyLevel::Primary => &result.exceptions,
                AnomalyLevel::Tertiary => &result.tertiary_exceptions,
            };
            records
                .iter()
                .filter(move |r| r.month <= cutoff)
                .map(move |r| ProjectAnomaly {
                    project: project.clone(),
                    record: r.clone(),
                })
        })
        .collect();

    rows.sort_by_key(|r| r.record.month);
    rows
}
