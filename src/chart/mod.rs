pub mod assembler;
pub mod cache;
pub mod interpolation;

pub use cache::TrendCache;

use serde::{Deserialize, Serialize};

use crate::common::error::{Result, TrendError};
use crate::common::grouping::{EntityEmissions, EntityTrendRow};
use crate::common::params::TrendConfig;
use crate::common::types::{total_series, ChartDataPoint, EmissionPeriod};
use crate::trends::calculate_trend;
use crate::trends::selection::TrendAnalysis;
use crate::trends::validation::{validate_base_year, with_error_handling};
use assembler::assemble_chart_data;
use interpolation::interpolate_categories;

/// Chart-ready records for one entity plus the audit record of its trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionsChart {
    pub data: Vec<ChartDataPoint>,
    pub analysis: TrendAnalysis,
}

/// Turn an entity's reporting periods into chart data with trend and Carbon
/// Law lines.
pub fn build_emissions_chart(
    periods: &[EmissionPeriod],
    base_year: Option<i32>,
    config: &TrendConfig,
) -> Result<EmissionsChart> {
    config.validate()?;
    if periods.is_empty() {
        return Err(TrendError::validation(
            "build_emissions_chart",
            "no reporting periods",
        ));
    }
    if let Some(year) = base_year {
        validate_base_year(year, config.end_year, "build_emissions_chart")?;
    }

    let categories = interpolate_categories(periods);
    let mut data = assemble_chart_data(periods, &categories, config);

    let series = total_series(periods);
    let trend = calculate_trend(&series, base_year, config)?;
    merge_projection(&mut data, trend.projection);

    tracing::debug!(
        periods = periods.len(),
        years = data.len(),
        method = %trend.analysis.method,
        "emissions chart built"
    );

    Ok(EmissionsChart {
        data,
        analysis: trend.analysis,
    })
}

/// Copy projected values onto the matching years, adding years the chart
/// lacks. Leaves `data` ordered by year.
fn merge_projection(data: &mut Vec<ChartDataPoint>, projection: Vec<ChartDataPoint>) {
    for record in projection {
        match data.binary_search_by_key(&record.year, |p| p.year) {
            Ok(i) => {
                let point = &mut data[i];
                point.approximated = record.approximated;
                point.carbon_law = record.carbon_law;
                if point.total.is_none() {
                    point.total = record.total;
                }
            }
            Err(i) => data.insert(i, record),
        }
    }
}

/// Build a chart for every entity, skipping those whose computation fails.
pub fn analyze_entities(entities: &[EntityEmissions], config: &TrendConfig) -> Vec<EntityTrendRow> {
    let rows: Vec<EntityTrendRow> = entities
        .iter()
        .filter_map(|entity| {
            let chart = with_error_handling(&entity.id, || {
                build_emissions_chart(&entity.reporting_periods, entity.base_year, config)
            });
            if chart.is_none() {
                tracing::warn!(entity = %entity.id, name = %entity.name, "skipping entity");
            }
            chart.map(|chart| EntityTrendRow {
                id: entity.id.clone(),
                name: entity.name.clone(),
                analysis: chart.analysis,
                data: chart.data,
            })
        })
        .collect();

    tracing::debug!(
        entities = entities.len(),
        analyzed = rows.len(),
        "batch trend analysis complete"
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::grouping::summarize_methods;
    use crate::common::types::Emissions;
    use crate::trends::selection::TrendMethod;
    use chrono::NaiveDate;

    fn period(year: i32, total: Option<f64>) -> EmissionPeriod {
        EmissionPeriod {
            start_date: NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
            emissions: total.map(|t| Emissions {
                calculated_total_emissions: Some(t),
                ..Default::default()
            }),
            is_ai_generated: false,
        }
    }

    fn periods(first_year: i32, totals: &[f64]) -> Vec<EmissionPeriod> {
        totals
            .iter()
            .enumerate()
            .map(|(i, &t)| period(first_year + i as i32, Some(t)))
            .collect()
    }

    #[test]
    fn test_chart_years_strictly_increasing() {
        let mut input = periods(2019, &[120.0, 110.0, 100.0, 90.0, 80.0]);
        input.swap(0, 3);
        let chart = build_emissions_chart(&input, None, &TrendConfig::default()).unwrap();

        let years: Vec<i32> = chart.data.iter().map(|p| p.year).collect();
        assert_eq!(years, (2019..=2030).collect::<Vec<_>>());
        assert!(chart.data.windows(2).all(|w| w[0].year < w[1].year));
    }

    #[test]
    fn test_chart_carries_actual_trend_and_target() {
        let input = periods(2019, &[120.0, 110.0, 100.0, 90.0, 80.0]);
        let chart = build_emissions_chart(&input, None, &TrendConfig::default()).unwrap();
        assert_eq!(chart.analysis.method, TrendMethod::Linear);

        let at = |year: i32| chart.data.iter().find(|p| p.year == year).unwrap();
        assert_eq!(at(2020).total, Some(110.0));
        assert_eq!(at(2020).approximated, None);
        assert_eq!(at(2023).total, Some(80.0));
        assert_eq!(at(2023).approximated, Some(80.0));
        assert_eq!(at(2026).total, None);
        assert!((at(2026).approximated.unwrap() - 50.0).abs() < 1e-6);
        assert!(at(2024).carbon_law.is_none());
        assert!((at(2025).carbon_law.unwrap() - 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_gap_year_added_without_fabricated_total() {
        let input = vec![period(2019, Some(100.0)), period(2021, Some(90.0))];
        let chart = build_emissions_chart(&input, None, &TrendConfig::default()).unwrap();
        let gap = chart.data.iter().find(|p| p.year == 2020).unwrap();
        assert_eq!(gap.total, None);
        assert!(gap.original_values.is_empty());
    }

    #[test]
    fn test_single_period_has_no_trend() {
        let chart = build_emissions_chart(&periods(2023, &[50.0]), None, &TrendConfig::default()).unwrap();
        assert_eq!(chart.analysis.method, TrendMethod::None);
        assert!(chart.data.iter().all(|p| p.year == 2023 || p.approximated.is_none()));
    }

    #[test]
    fn test_rejects_empty_and_bad_base_year() {
        let config = TrendConfig::default();
        assert!(build_emissions_chart(&[], None, &config).is_err());

        let input = periods(2020, &[1.0, 2.0]);
        let err = build_emissions_chart(&input, Some(2040), &config).unwrap_err();
        assert!(err.to_string().starts_with("build_emissions_chart:"), "Error: {}", err);
    }

    #[test]
    fn test_batch_skips_failing_entities() {
        let entities = vec![
            EntityEmissions {
                id: "a".to_string(),
                name: "Falling AB".to_string(),
                base_year: None,
                reporting_periods: periods(2019, &[120.0, 110.0, 100.0, 90.0, 80.0]),
            },
            EntityEmissions {
                id: "b".to_string(),
                name: "Empty AB".to_string(),
                base_year: None,
                reporting_periods: Vec::new(),
            },
            EntityEmissions {
                id: "c".to_string(),
                name: "New AB".to_string(),
                base_year: None,
                reporting_periods: periods(2024, &[10.0]),
            },
        ];

        let rows = analyze_entities(&entities, &TrendConfig::default());
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let summary = summarize_methods(&rows);
        assert_eq!(summary.get(&TrendMethod::Linear), Some(&1));
        assert_eq!(summary.get(&TrendMethod::None), Some(&1));
        assert_eq!(summary.get(&TrendMethod::Exponential), None);
    }
}
