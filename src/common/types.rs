use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Minimum number of usable data points required to fit any trend.
pub const MIN_DATA_POINTS: usize = 2;

/// Chart keys for the three GHG Protocol scopes.
pub const SCOPE1_KEY: &str = "scope1";
pub const SCOPE2_KEY: &str = "scope2";
pub const SCOPE3_KEY: &str = "scope3";

/// Chart key for a Scope 3 category, e.g. `cat4` for upstream transportation.
pub fn category_key(category: u8) -> String {
    format!("cat{}", category)
}

/// One yearly observation of an entity's total emissions.
/// `value` is `None` when the year was not reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearValue {
    pub year: i32,
    pub value: Option<f64>,
}

impl YearValue {
    pub fn new(year: i32, value: Option<f64>) -> Self {
        YearValue { year, value }
    }

    /// The reported value, if present and finite.
    pub fn usable(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// Build a yearly series from consecutive years starting at `first_year`.
pub fn series_from(first_year: i32, values: &[Option<f64>]) -> Vec<YearValue> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| YearValue::new(first_year + i as i32, value))
        .collect()
}

/// The (year, value) pairs of a series that carry a usable value, in year order.
pub fn usable_points(series: &[YearValue]) -> Vec<(i32, f64)> {
    let mut points: Vec<(i32, f64)> = series
        .iter()
        .filter_map(|p| p.usable().map(|v| (p.year, v)))
        .collect();
    points.sort_by_key(|&(year, _)| year);
    points.dedup_by_key(|&mut (year, _)| year);
    points
}

/// Years absent from the expected annual sequence between the first and the
/// last year given. Input must be sorted ascending.
pub fn missing_years(years: &[i32]) -> Vec<i32> {
    if years.len() < 2 {
        return Vec::new();
    }

    let present: BTreeSet<i32> = years.iter().copied().collect();
    let first = years[0];
    let last = years[years.len() - 1];
    (first..=last).filter(|y| !present.contains(y)).collect()
}

/// Total emissions of one scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeTotal {
    #[serde(default)]
    pub total: Option<f64>,
}

/// Scope 2 emissions; the API reports a computed total across methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope2Emissions {
    #[serde(default)]
    pub mb: Option<f64>,
    #[serde(default)]
    pub lb: Option<f64>,
    #[serde(default)]
    pub calculated_total_emissions: Option<f64>,
}

impl Scope2Emissions {
    pub fn total(&self) -> Option<f64> {
        self.calculated_total_emissions.or(self.mb).or(self.lb)
    }
}

/// One reported Scope 3 category (1 to 16).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope3Category {
    pub category: u8,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope3Emissions {
    #[serde(default)]
    pub categories: Vec<Scope3Category>,
    #[serde(default)]
    pub calculated_total_emissions: Option<f64>,
}

impl Scope3Emissions {
    /// Reported total, falling back to the sum of reported categories.
    pub fn total(&self) -> Option<f64> {
        if self.calculated_total_emissions.is_some() {
            return self.calculated_total_emissions;
        }
        let reported: Vec<f64> = self.categories.iter().filter_map(|c| c.total).collect();
        if reported.is_empty() {
            None
        } else {
            Some(reported.iter().sum())
        }
    }

    pub fn category(&self, category: u8) -> Option<f64> {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .and_then(|c| c.total)
    }
}

/// Emissions breakdown of one reporting period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emissions {
    #[serde(default)]
    pub scope1: Option<ScopeTotal>,
    #[serde(default)]
    pub scope2: Option<Scope2Emissions>,
    #[serde(default)]
    pub scope3: Option<Scope3Emissions>,
    #[serde(default)]
    pub calculated_total_emissions: Option<f64>,
}

impl Emissions {
    pub fn scope1_total(&self) -> Option<f64> {
        self.scope1.as_ref().and_then(|s| s.total)
    }

    pub fn scope2_total(&self) -> Option<f64> {
        self.scope2.as_ref().and_then(|s| s.total())
    }

    pub fn scope3_total(&self) -> Option<f64> {
        self.scope3.as_ref().and_then(|s| s.total())
    }

    /// The reported total, falling back to the sum of reported scopes.
    /// `None` when nothing at all was reported.
    pub fn total(&self) -> Option<f64> {
        if self.calculated_total_emissions.is_some() {
            return self.calculated_total_emissions;
        }
        let scopes = [self.scope1_total(), self.scope2_total(), self.scope3_total()];
        if scopes.iter().all(Option::is_none) {
            return None;
        }
        Some(scopes.iter().flatten().sum())
    }
}

/// One reporting interval of a company or municipality, as served by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub emissions: Option<Emissions>,
    /// True when the figures were extracted by AI and not yet verified.
    #[serde(default)]
    pub is_ai_generated: bool,
}

impl EmissionPeriod {
    /// The reporting year is the calendar year the period ends in.
    pub fn year(&self) -> i32 {
        self.end_date.year()
    }

    pub fn total(&self) -> Option<f64> {
        self.emissions.as_ref().and_then(Emissions::total)
    }
}

/// One period per reporting year; when several end in the same year the one
/// ending last is kept.
pub fn periods_by_year(periods: &[EmissionPeriod]) -> BTreeMap<i32, &EmissionPeriod> {
    let mut by_year: BTreeMap<i32, &EmissionPeriod> = BTreeMap::new();
    for period in periods {
        by_year
            .entry(period.year())
            .and_modify(|kept| {
                if period.end_date > kept.end_date {
                    *kept = period;
                }
            })
            .or_insert(period);
    }
    by_year
}

/// Yearly totals of a set of periods, ordered by year.
pub fn total_series(periods: &[EmissionPeriod]) -> Vec<YearValue> {
    periods_by_year(periods)
        .into_iter()
        .map(|(year, period)| YearValue::new(year, period.total()))
        .collect()
}

/// One calendar year of chart data.
///
/// `values` holds display numbers (0 where nothing was reported, so lines stay
/// continuous) while `original_values` keeps the true absence as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataPoint {
    pub year: i32,
    pub total: Option<f64>,
    pub approximated: Option<f64>,
    pub carbon_law: Option<f64>,
    pub values: BTreeMap<String, f64>,
    pub original_values: BTreeMap<String, Option<f64>>,
    pub interpolated: BTreeSet<String>,
    pub is_ai_generated: bool,
}

impl ChartDataPoint {
    pub fn new(year: i32) -> Self {
        ChartDataPoint {
            year,
            ..Default::default()
        }
    }

    /// The reported value for `key`, `None` if it was never reported this year.
    pub fn original_value(&self, key: &str) -> Option<f64> {
        self.original_values.get(key).copied().flatten()
    }

    pub fn is_interpolated(&self, key: &str) -> bool {
        self.interpolated.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(year: i32, emissions: Option<Emissions>) -> EmissionPeriod {
        EmissionPeriod {
            start_date: NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
            emissions,
            is_ai_generated: false,
        }
    }

    #[test]
    fn test_missing_years_gap() {
        assert_eq!(missing_years(&[2019, 2020, 2023]), vec![2021, 2022]);
    }

    #[test]
    fn test_missing_years_contiguous() {
        assert!(missing_years(&[2020, 2021, 2022]).is_empty());
    }

    #[test]
    fn test_missing_years_single_point() {
        assert!(missing_years(&[2020]).is_empty());
        assert!(missing_years(&[]).is_empty());
    }

    #[test]
    fn test_usable_points_skips_nulls_and_nan() {
        let series = series_from(2020, &[Some(1.0), None, Some(f64::NAN), Some(4.0)]);
        assert_eq!(usable_points(&series), vec![(2020, 1.0), (2023, 4.0)]);
    }

    #[test]
    fn test_emissions_total_falls_back_to_scopes() {
        let emissions = Emissions {
            scope1: Some(ScopeTotal { total: Some(10.0) }),
            scope2: Some(Scope2Emissions {
                mb: Some(5.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(emissions.total(), Some(15.0));
        assert_eq!(Emissions::default().total(), None);
    }

    #[test]
    fn test_total_series_orders_by_year() {
        let with_total = |t: f64| {
            Some(Emissions {
                calculated_total_emissions: Some(t),
                ..Default::default()
            })
        };
        let periods = vec![period(2022, with_total(3.0)), period(2020, with_total(1.0)), period(2021, None)];
        let series = total_series(&periods);
        assert_eq!(
            series,
            vec![
                YearValue::new(2020, Some(1.0)),
                YearValue::new(2021, None),
                YearValue::new(2022, Some(3.0)),
            ]
        );
    }

    #[test]
    fn test_periods_by_year_keeps_latest_ending() {
        let mut broken_year = period(2021, None);
        broken_year.end_date = NaiveDate::from_ymd_opt(2021, 6, 30).unwrap();
        let full_year = period(2021, None);
        let periods = vec![full_year.clone(), broken_year];
        let by_year = periods_by_year(&periods);
        assert_eq!(by_year.len(), 1);
        assert_eq!(by_year[&2021].end_date, full_year.end_date);
    }

    #[test]
    fn test_period_deserializes_from_api_shape() {
        let json = r#"{
            "startDate": "2023-01-01",
            "endDate": "2023-12-31",
            "emissions": {
                "scope1": {"total": 120.5},
                "scope2": {"mb": 40.0, "calculatedTotalEmissions": 42.0},
                "scope3": {
                    "categories": [{"category": 1, "total": 300.0, "unit": "tCO2e"}],
                    "calculatedTotalEmissions": 300.0
                },
                "calculatedTotalEmissions": 462.5
            },
            "isAiGenerated": true
        }"#;
        let period: EmissionPeriod = serde_json::from_str(json).unwrap();
        assert_eq!(period.year(), 2023);
        assert!(period.is_ai_generated);
        let emissions = period.emissions.as_ref().unwrap();
        assert_eq!(emissions.scope2_total(), Some(42.0));
        assert_eq!(emissions.scope3.as_ref().unwrap().category(1), Some(300.0));
        assert_eq!(period.total(), Some(462.5));
    }

    #[test]
    fn test_original_value_absent_key_is_none() {
        let point = ChartDataPoint::new(2020);
        assert_eq!(point.original_value("cat7"), None);
    }
}
