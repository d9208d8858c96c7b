pub mod models;
pub mod projection;
pub mod selection;
pub mod validation;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::error::Result;
use crate::common::params::TrendConfig;
use crate::common::types::{ChartDataPoint, YearValue};
use selection::{analyze_trend, TrendAnalysis};
use validation::validate_input_data;

/// Method selection and projection for one entity's total emissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub analysis: TrendAnalysis,
    /// One record per year through the end year: actual, approximated and
    /// Carbon Law values only.
    pub projection: Vec<ChartDataPoint>,
}

/// Select a method, fit it and project the series through the end year.
pub fn calculate_trend(
    series: &[YearValue],
    base_year: Option<i32>,
    config: &TrendConfig,
) -> Result<Trend> {
    config.validate()?;
    let analysis = analyze_trend(series, base_year, config)?;
    let projection = projection::project_emissions(series, analysis.coefficients.as_ref(), config)?;

    tracing::debug!(
        method = %analysis.method,
        years = projection.len(),
        "trend calculated"
    );

    Ok(Trend {
        analysis,
        projection,
    })
}

/// [`calculate_trend`] over a raw JSON array of `{year, value}` objects.
pub fn calculate_trend_json(
    data: &Value,
    base_year: Option<i32>,
    config: &TrendConfig,
) -> Result<Trend> {
    let series = validate_input_data(data, "calculate_trend")?;
    calculate_trend(&series, base_year, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::TrendError;
    use crate::common::types::series_from;
    use selection::TrendMethod;
    use serde_json::json;

    #[test]
    fn test_trend_projects_to_end_year() {
        let series = series_from(2019, &[Some(120.0), Some(110.0), Some(100.0), Some(90.0), Some(80.0)]);
        let trend = calculate_trend(&series, None, &TrendConfig::default()).unwrap();

        assert_eq!(trend.analysis.method, TrendMethod::Linear);
        assert_eq!(trend.projection.last().unwrap().year, 2030);

        let r2025 = trend.projection.iter().find(|r| r.year == 2025).unwrap();
        assert!((r2025.approximated.unwrap() - 60.0).abs() < 1e-6);
        assert!((r2025.carbon_law.unwrap() - 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_insufficient_data_has_no_projection() {
        let series = series_from(2023, &[Some(42.0)]);
        let trend = calculate_trend(&series, None, &TrendConfig::default()).unwrap();
        assert_eq!(trend.analysis.method, TrendMethod::None);
        assert!(trend.projection.iter().all(|r| r.year == 2023 || r.approximated.is_none()));
    }

    #[test]
    fn test_trend_from_json() {
        let data = json!([
            {"year": 2020, "value": 100.0},
            {"year": 2021, "value": 102.0},
            {"year": 2022, "value": null},
            {"year": 2023, "value": 98.0},
            {"year": 2024, "value": 97.0}
        ]);
        let trend = calculate_trend_json(&data, None, &TrendConfig::default()).unwrap();
        assert_eq!(trend.analysis.method, TrendMethod::WeightedLinear);
        assert_eq!(trend.analysis.missing_years, vec![2022]);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let values: Vec<Option<f64>> = (0..6).map(|i| Some(10.0 * (0.4 * i as f64).exp())).collect();
        let series = series_from(2018, &values);
        let config = TrendConfig::new().with_exponential_bounds(10.0, 1.0);

        let err = calculate_trend(&series, None, &config).unwrap_err();
        assert!(matches!(err, TrendError::Config(_)), "Error: {}", err);

        let data = json!([{"year": 2020, "value": 1.0}, {"year": 2021, "value": 2.0}]);
        assert!(calculate_trend_json(&data, None, &config).is_err());
    }

    #[test]
    fn test_trend_from_json_rejects_malformed() {
        let err = calculate_trend_json(&json!([{"year": "2020"}]), None, &TrendConfig::default())
            .unwrap_err();
        assert!(err.to_string().starts_with("calculate_trend:"), "Error: {}", err);
    }
}
