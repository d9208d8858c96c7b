use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::common::types::EmissionPeriod;

/// A Scope 3 category value, reported or filled in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryValue {
    pub value: f64,
    pub is_interpolated: bool,
}

/// Scope 3 category values of one reporting period after gap filling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodCategories {
    pub year: i32,
    pub end_date: NaiveDate,
    pub categories: BTreeMap<u8, CategoryValue>,
}

fn reported_categories(period: &EmissionPeriod) -> BTreeMap<u8, f64> {
    period
        .emissions
        .as_ref()
        .and_then(|e| e.scope3.as_ref())
        .map(|scope3| {
            scope3
                .categories
                .iter()
                .filter_map(|c| c.total.filter(|v| v.is_finite()).map(|v| (c.category, v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Fill Scope 3 category gaps by linear interpolation in time.
///
/// A category missing from a period is filled only when an earlier and a
/// later period both report it; the value is weighted by elapsed days between
/// the bracketing end dates. The first and last periods are never filled and
/// categories no period reports never appear. Output is ordered by end date.
pub fn interpolate_categories(periods: &[EmissionPeriod]) -> Vec<PeriodCategories> {
    let mut ordered: Vec<&EmissionPeriod> = periods.iter().collect();
    ordered.sort_by_key(|p| p.end_date);

    let reported: Vec<BTreeMap<u8, f64>> = ordered.iter().map(|p| reported_categories(p)).collect();
    let all_categories: BTreeSet<u8> = reported.iter().flat_map(|r| r.keys().copied()).collect();

    let mut result: Vec<PeriodCategories> = ordered
        .iter()
        .zip(reported.iter())
        .map(|(period, values)| PeriodCategories {
            year: period.year(),
            end_date: period.end_date,
            categories: values
                .iter()
                .map(|(&category, &value)| {
                    (
                        category,
                        CategoryValue {
                            value,
                            is_interpolated: false,
                        },
                    )
                })
                .collect(),
        })
        .collect();

    let n = ordered.len();
    for &category in &all_categories {
        for i in 1..n.saturating_sub(1) {
            if reported[i].contains_key(&category) {
                continue;
            }
            let before = (0..i)
                .rev()
                .find_map(|j| reported[j].get(&category).map(|&v| (ordered[j].end_date, v)));
            let after = (i + 1..n)
                .find_map(|k| reported[k].get(&category).map(|&v| (ordered[k].end_date, v)));

            if let (Some(before), Some(after)) = (before, after) {
                if let Some(value) = interpolate_at(before, after, ordered[i].end_date) {
                    result[i].categories.insert(
                        category,
                        CategoryValue {
                            value,
                            is_interpolated: true,
                        },
                    );
                }
            }
        }
    }

    result
}

fn interpolate_at(before: (NaiveDate, f64), after: (NaiveDate, f64), at: NaiveDate) -> Option<f64> {
    let span = (after.0 - before.0).num_days();
    if span <= 0 {
        return None;
    }
    let elapsed = (at - before.0).num_days() as f64;
    let fraction = elapsed / span as f64;
    Some(before.1 + (after.1 - before.1) * fraction)
}
