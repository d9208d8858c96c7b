use super::models::Coefficients;
use super::validation::{validate_coefficients, validate_end_year};
use crate::common::error::{Result, TrendError};
use crate::common::params::TrendConfig;
use crate::common::types::{usable_points, ChartDataPoint, YearValue};

/// Project one value `dx` years away from the last actual value.
///
/// The slope or growth factor is applied to the last actual value rather than
/// evaluating the regression at the target year, so the anchor offset never
/// compounds. Linear projections are floored at zero; exponential ones are
/// clamped to the configured bounds.
pub fn project_value(
    coefficients: &Coefficients,
    last_value: f64,
    dx: f64,
    config: &TrendConfig,
) -> f64 {
    match coefficients {
        Coefficients::Linear(c) => (last_value + c.slope * dx).max(0.0),
        Coefficients::Exponential(c) => (last_value * c.growth_factor(dx))
            .clamp(config.exponential_floor, config.exponential_ceiling),
    }
}

/// Extrapolate a yearly series through the configured end year.
///
/// Produces one record per year from the first year of `series` through the
/// later of the end year and the last reported year. Years up to the last
/// actual value carry `total`; the last actual year also carries it as
/// `approximated` so the two lines meet; later years carry only
/// `approximated`. Every record from the Carbon Law start year on carries the
/// target value when an anchor exists.
pub fn project_emissions(
    series: &[YearValue],
    coefficients: Option<&Coefficients>,
    config: &TrendConfig,
) -> Result<Vec<ChartDataPoint>> {
    config.validate()?;
    let first_year = series
        .iter()
        .map(|p| p.year)
        .min()
        .ok_or_else(|| TrendError::validation("project_emissions", "input data is empty"))?;
    validate_end_year(config.end_year, first_year, "project_emissions")?;
    if let Some(c) = coefficients {
        validate_coefficients(c, "project_emissions")?;
    }

    let actual = usable_points(series);
    let last_actual = actual.last().copied();
    let series_last_year = series.iter().map(|p| p.year).max().unwrap_or(first_year);
    let horizon = config.end_year.max(series_last_year);

    let anchor = carbon_law_anchor(&actual, coefficients, config);

    let records = (first_year..=horizon)
        .map(|year| {
            let mut record = ChartDataPoint::new(year);
            match last_actual {
                Some((last_year, _)) if year < last_year => {
                    record.total = actual_value(&actual, year);
                }
                Some((last_year, last_value)) if year == last_year => {
                    record.total = Some(last_value);
                    record.approximated = Some(last_value);
                }
                Some((last_year, last_value)) => {
                    record.approximated = coefficients.map(|c| {
                        project_value(c, last_value, (year - last_year) as f64, config)
                    });
                }
                None => {}
            }
            record.carbon_law = anchor.and_then(|a| carbon_law_value(a, year, config));
            record
        })
        .collect();

    Ok(records)
}

fn actual_value(actual: &[(i32, f64)], year: i32) -> Option<f64> {
    actual
        .iter()
        .find(|&&(y, _)| y == year)
        .map(|&(_, value)| value)
}

/// Starting value of the Carbon Law line: the reported value in the start
/// year if there is one, otherwise the trend's value in that year.
pub fn carbon_law_anchor(
    actual: &[(i32, f64)],
    coefficients: Option<&Coefficients>,
    config: &TrendConfig,
) -> Option<f64> {
    let start = config.carbon_law_start_year;
    let anchor = match actual_value(actual, start) {
        Some(value) => value,
        None => {
            let &(last_year, last_value) = actual.last()?;
            project_value(coefficients?, last_value, (start - last_year) as f64, config)
        }
    };
    (anchor.is_finite() && anchor > 0.0).then_some(anchor)
}

/// anchor × (1 − rate)^(year − start); `None` before the start year and for
/// values that are not positive.
pub fn carbon_law_value(anchor: f64, year: i32, config: &TrendConfig) -> Option<f64> {
    let start = config.carbon_law_start_year;
    if year < start {
        return None;
    }
    let value = anchor * (1.0 - config.carbon_law_rate).powi(year - start);
    (value.is_finite() && value > 0.0).then_some(value)
}
