use std::collections::BTreeSet;

use super::interpolation::PeriodCategories;
use crate::common::params::{TrendConfig, MAX_PLACEHOLDER_YEARS};
use crate::common::types::{
    category_key, periods_by_year, ChartDataPoint, EmissionPeriod, SCOPE1_KEY, SCOPE2_KEY,
    SCOPE3_KEY,
};

fn scope_values(period: &EmissionPeriod) -> [(&'static str, Option<f64>); 3] {
    let emissions = period.emissions.as_ref();
    [
        (SCOPE1_KEY, emissions.and_then(|e| e.scope1_total())),
        (SCOPE2_KEY, emissions.and_then(|e| e.scope2_total())),
        (SCOPE3_KEY, emissions.and_then(|e| e.scope3_total())),
    ]
}

/// Merge per-scope and per-category values into one record per reported year.
///
/// Every key reported in any year appears in every year's `values`, with 0 for
/// display where the year lacks it; `original_values` keeps `None` there.
/// Interpolated categories are displayed and listed in `interpolated` but
/// never counted as reported. Empty placeholder years follow the last year.
pub fn assemble_chart_data(
    periods: &[EmissionPeriod],
    categories: &[PeriodCategories],
    config: &TrendConfig,
) -> Vec<ChartDataPoint> {
    let by_year = periods_by_year(periods);

    let mut scope_keys: BTreeSet<&'static str> = BTreeSet::new();
    for period in by_year.values() {
        for (key, value) in scope_values(period) {
            if value.is_some() {
                scope_keys.insert(key);
            }
        }
    }
    let category_keys: BTreeSet<u8> = categories
        .iter()
        .flat_map(|p| p.categories.keys().copied())
        .collect();

    let mut data: Vec<ChartDataPoint> = by_year
        .iter()
        .map(|(&year, period)| {
            let mut point = ChartDataPoint::new(year);
            point.total = period.total();
            point.is_ai_generated = period.is_ai_generated;

            for (key, value) in scope_values(period) {
                if scope_keys.contains(key) {
                    point.values.insert(key.to_string(), value.unwrap_or(0.0));
                    point.original_values.insert(key.to_string(), value);
                }
            }

            let filled = categories
                .iter()
                .find(|c| c.year == year && c.end_date == period.end_date);
            for &category in &category_keys {
                let key = category_key(category);
                match filled.and_then(|c| c.categories.get(&category)) {
                    Some(v) if v.is_interpolated => {
                        point.values.insert(key.clone(), v.value);
                        point.original_values.insert(key.clone(), None);
                        point.interpolated.insert(key);
                    }
                    Some(v) => {
                        point.values.insert(key.clone(), v.value);
                        point.original_values.insert(key, Some(v.value));
                    }
                    None => {
                        point.values.insert(key.clone(), 0.0);
                        point.original_values.insert(key, None);
                    }
                }
            }
            point
        })
        .collect();

    if let Some(last_year) = data.last().map(|p| p.year) {
        let placeholders = config.placeholder_years.min(MAX_PLACEHOLDER_YEARS) as i32;
        data.extend(
            (1..=placeholders)
                .map_while(|offset| last_year.checked_add(offset))
                .map(ChartDataPoint::new),
        );
    }

    data
}
