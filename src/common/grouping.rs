use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{ChartDataPoint, EmissionPeriod};
use crate::trends::selection::{TrendAnalysis, TrendMethod};

/// The reporting history of one company or municipality.
///
/// For example, a company listing might carry `id = "Q52825"`,
/// `name = "Vattenfall"` and a base year chosen by the company itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityEmissions {
    pub id: String,
    pub name: String,
    /// Year the entity measures its reductions from, if it declared one.
    #[serde(default)]
    pub base_year: Option<i32>,
    pub reporting_periods: Vec<EmissionPeriod>,
}

/// A single output row from batch trend analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTrendRow {
    pub id: String,
    pub name: String,
    pub analysis: TrendAnalysis,
    pub data: Vec<ChartDataPoint>,
}

/// Number of entities per selected trend method.
pub fn summarize_methods(rows: &[EntityTrendRow]) -> BTreeMap<TrendMethod, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.analysis.method).or_insert(0) += 1;
    }
    counts
}
