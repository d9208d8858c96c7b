//! Heuristic choice of regression method for an entity's emissions series.
//!
//! The decision is recorded in a [`TrendAnalysis`] together with the data
//! quality findings behind it, so the internal dashboard can audit why a
//! company got the trend line it got.

use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};

use super::models::{
    calculate_exponential_regression, calculate_linear_regression,
    calculate_weighted_exponential_regression, calculate_weighted_linear_regression,
    goodness_of_fit, trend_weights, Coefficients, FitComparison, Point,
};
use super::validation::{validate_base_year, validate_points, validate_year};
use crate::common::error::{Result, TrendError};
use crate::common::params::TrendConfig;
use crate::common::types::{missing_years, usable_points, YearValue};

/// Yearly change (percent) below which a trend counts as stable.
const STABLE_CHANGE_PERCENT: f64 = 1.0;

/// Regression method chosen for a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendMethod {
    None,
    Simple,
    Linear,
    WeightedLinear,
    Exponential,
    WeightedExponential,
    RecentExponential,
}

impl TrendMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendMethod::None => "none",
            TrendMethod::Simple => "simple",
            TrendMethod::Linear => "linear",
            TrendMethod::WeightedLinear => "weightedLinear",
            TrendMethod::Exponential => "exponential",
            TrendMethod::WeightedExponential => "weightedExponential",
            TrendMethod::RecentExponential => "recentExponential",
        }
    }
}

impl fmt::Display for TrendMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// A reported value whose year-over-year jump is out of line with the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnusualPoint {
    pub year: i32,
    pub value: f64,
    pub previous_year: i32,
    pub previous_value: f64,
    /// Absolute change from the previous reported value.
    pub change: f64,
    /// Relative change from the previous reported value (0.6 = 60%).
    pub relative_change: f64,
    /// Absolute change that had to be exceeded (multiplier × median change).
    pub threshold: f64,
    pub explanation: String,
}

/// Outcome of method selection for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub method: TrendMethod,
    pub base_year: Option<i32>,
    /// Usable data points in the analysed window.
    pub data_points: usize,
    /// Data points not flagged as unusual.
    pub clean_data_points: usize,
    pub missing_years: Vec<i32>,
    pub unusual_points: Vec<UnusualPoint>,
    pub direction: Option<TrendDirection>,
    pub yearly_percentage_change: Option<f64>,
    pub coefficients: Option<Coefficients>,
    pub fit: FitComparison,
    pub explanation: String,
}

impl TrendAnalysis {
    fn insufficient(base_year: Option<i32>, data_points: usize, explanation: String) -> Self {
        TrendAnalysis {
            method: TrendMethod::None,
            base_year,
            data_points,
            clean_data_points: data_points,
            missing_years: Vec::new(),
            unusual_points: Vec::new(),
            direction: None,
            yearly_percentage_change: None,
            coefficients: None,
            fit: FitComparison::default(),
            explanation,
        }
    }
}

/// Classify a yearly emissions series and fit the chosen method.
///
/// When `base_year` is given only data from that year on is analysed.
/// Too little data is not an error: it yields [`TrendMethod::None`].
pub fn analyze_trend(
    series: &[YearValue],
    base_year: Option<i32>,
    config: &TrendConfig,
) -> Result<TrendAnalysis> {
    config.validate()?;
    if series.is_empty() {
        return Err(TrendError::validation("analyze_trend", "input data is empty"));
    }
    for point in series {
        validate_year(point.year, "analyze_trend")?;
    }
    if let Some(base) = base_year {
        validate_base_year(base, config.end_year, "analyze_trend")?;
    }

    let all = usable_points(series);
    let window: Vec<(i32, f64)> = match base_year {
        Some(base) => all.iter().copied().filter(|&(year, _)| year >= base).collect(),
        None => all.clone(),
    };

    if all.len() <= 1 {
        return Ok(TrendAnalysis::insufficient(
            base_year,
            all.len(),
            format!("only {} reported year(s); no trend can be drawn", all.len()),
        ));
    }
    if window.len() <= 1 {
        return Ok(TrendAnalysis::insufficient(
            base_year,
            window.len(),
            format!(
                "only {} reported year(s) since base year {}; no comparable trend",
                window.len(),
                base_year.unwrap_or_default()
            ),
        ));
    }

    let points: Vec<Point> = window
        .iter()
        .map(|&(year, value)| Point::new(year as f64, value))
        .collect();
    validate_points(&points, "analyze_trend")?;
    let years: Vec<i32> = window.iter().map(|&(year, _)| year).collect();
    let values: Vec<f64> = window.iter().map(|&(_, value)| value).collect();

    let missing = missing_years(&years);
    let unusual = detect_unusual_points(&window, config);
    let unusual_years: Vec<i32> = unusual.iter().map(|u| u.year).collect();

    // Two points admit only one line, so gaps cannot change the method.
    let (method, fit, explanation) = if window.len() == 2 {
        let explanation = if missing.is_empty() {
            "two reported years; straight line through both".to_string()
        } else {
            format!(
                "two reported years with {} missing between them; straight line through both",
                missing.len()
            )
        };
        (TrendMethod::Simple, FitComparison::default(), explanation)
    } else {
        choose_method(&points, &values, &missing, &unusual, config)
    };

    tracing::debug!(
        method = %method,
        data_points = window.len(),
        missing = missing.len(),
        unusual = unusual.len(),
        "trend method selected"
    );

    let (method, coefficients) = fit_method(method, &points, &unusual_years, config);

    let last_value = values[values.len() - 1];
    let yearly_percentage_change =
        coefficients.and_then(|c| c.yearly_change_percent(last_value));
    let direction = yearly_percentage_change.map(|pct| {
        if pct > STABLE_CHANGE_PERCENT {
            TrendDirection::Increasing
        } else if pct < -STABLE_CHANGE_PERCENT {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    });

    Ok(TrendAnalysis {
        method,
        base_year,
        data_points: window.len(),
        clean_data_points: window.len() - unusual.len(),
        missing_years: missing,
        unusual_points: unusual,
        direction,
        yearly_percentage_change,
        coefficients,
        fit,
        explanation,
    })
}

/// Decision table for windows of three or more points; first match wins.
fn choose_method(
    points: &[Point],
    values: &[f64],
    missing: &[i32],
    unusual: &[UnusualPoint],
    config: &TrendConfig,
) -> (TrendMethod, FitComparison, String) {
    let fit = goodness_of_fit(points);
    let exponential_gain = fit.exponential_gain();
    let exponential_preferred =
        exponential_gain.map_or(false, |gain| gain > config.exponential_preference_margin);

    if !missing.is_empty() || !unusual.is_empty() {
        let issues = format!(
            "{} missing year(s), {} unusual point(s)",
            missing.len(),
            unusual.len()
        );
        if exponential_preferred {
            return (
                TrendMethod::WeightedExponential,
                fit,
                format!(
                    "{}; exponential fit better by {:.3} R²",
                    issues,
                    exponential_gain.unwrap_or_default()
                ),
            );
        }
        return (TrendMethod::WeightedLinear, fit, issues);
    }

    let recent = &values[values.len().saturating_sub(config.recent_window)..];
    if recent.len() >= config.recent_window {
        if let Some(cv) = coefficient_of_variation(recent) {
            if cv < config.stability_threshold {
                return (
                    TrendMethod::WeightedLinear,
                    fit,
                    format!(
                        "last {} years stable (variation {:.1}% < {:.0}%)",
                        recent.len(),
                        cv * 100.0,
                        config.stability_threshold * 100.0
                    ),
                );
            }
        }
    }

    if let Some(cv) = coefficient_of_variation(values) {
        if cv > config.high_variance_threshold {
            return (
                TrendMethod::WeightedLinear,
                fit,
                format!(
                    "high variance (standard deviation {:.1}% of mean > {:.0}%)",
                    cv * 100.0,
                    config.high_variance_threshold * 100.0
                ),
            );
        }
    }

    if exponential_preferred {
        return (
            TrendMethod::Exponential,
            fit,
            format!(
                "exponential fit better by {:.3} R²",
                exponential_gain.unwrap_or_default()
            ),
        );
    }

    if let Some(r2) = recent_exponential_r2(points, &fit, config) {
        return (
            TrendMethod::RecentExponential,
            fit,
            format!(
                "last {} years follow an exponential curve (R² {:.3})",
                config.recent_window, r2
            ),
        );
    }

    (
        TrendMethod::Linear,
        fit,
        "well-behaved series; linear trend".to_string(),
    )
}

/// R² of the recent window's exponential fit when it shows a strong
/// exponential pattern the full window does not.
fn recent_exponential_r2(
    points: &[Point],
    full_fit: &FitComparison,
    config: &TrendConfig,
) -> Option<f64> {
    if points.len() <= config.recent_window {
        return None;
    }
    let full_is_exponential = full_fit
        .exponential_r2
        .map_or(false, |r2| r2 >= config.recent_exponential_min_r2);
    if full_is_exponential {
        return None;
    }

    let recent = &points[points.len() - config.recent_window..];
    let recent_fit = goodness_of_fit(recent);
    let exp_r2 = recent_fit.exponential_r2?;
    let lin_r2 = recent_fit.linear_r2?;
    (exp_r2 >= config.recent_exponential_min_r2 && exp_r2 >= lin_r2).then_some(exp_r2)
}

/// Fit the coefficients for `method`, falling back to simpler methods when a
/// fit is impossible. Returns the method actually used.
fn fit_method(
    method: TrendMethod,
    points: &[Point],
    unusual_years: &[i32],
    config: &TrendConfig,
) -> (TrendMethod, Option<Coefficients>) {
    let weights = trend_weights(points, unusual_years);
    let mut candidate = method;

    loop {
        let fitted = match candidate {
            TrendMethod::None => return (TrendMethod::None, None),
            TrendMethod::Simple | TrendMethod::Linear => {
                calculate_linear_regression(points).map(Coefficients::Linear)
            }
            TrendMethod::WeightedLinear => {
                calculate_weighted_linear_regression(points, &weights).map(Coefficients::Linear)
            }
            TrendMethod::Exponential => {
                calculate_exponential_regression(points).map(Coefficients::Exponential)
            }
            TrendMethod::WeightedExponential => {
                calculate_weighted_exponential_regression(points, &weights)
                    .map(Coefficients::Exponential)
            }
            TrendMethod::RecentExponential => {
                let start = points.len().saturating_sub(config.recent_window);
                calculate_exponential_regression(&points[start..]).map(Coefficients::Exponential)
            }
        };

        if let Some(coefficients) = fitted {
            return (candidate, Some(coefficients));
        }

        let fallback = match candidate {
            TrendMethod::WeightedExponential => TrendMethod::WeightedLinear,
            TrendMethod::Exponential | TrendMethod::RecentExponential => TrendMethod::Linear,
            TrendMethod::WeightedLinear => TrendMethod::Linear,
            _ => TrendMethod::None,
        };
        tracing::debug!(from = %candidate, to = %fallback, "trend fit failed, falling back");
        candidate = fallback;
    }
}

/// Flag year-over-year jumps larger than `unusual_change_multiplier` times the
/// median absolute change that are also larger than `unusual_relative_change`
/// relative to the previous value.
///
/// A point is only flagged when it is also out of line with the last value
/// that was not flagged, so the year a spike returns to normal is kept clean
/// and a lasting level shift flags only its first year.
pub fn detect_unusual_points(window: &[(i32, f64)], config: &TrendConfig) -> Vec<UnusualPoint> {
    // A jump needs at least two other changes to be measured against.
    if window.len() < 4 {
        return Vec::new();
    }

    let changes: Vec<f64> = window.windows(2).map(|w| w[1].1 - w[0].1).collect();
    let median: f64 = Data::new(changes.iter().map(|c| c.abs()).collect::<Vec<f64>>()).median();
    let threshold = config.unusual_change_multiplier * median;
    let out_of_line = |from: f64, to: f64| {
        let change = to - from;
        change.abs() > threshold && relative_change(from, to) > config.unusual_relative_change
    };

    let mut unusual = Vec::new();
    let mut last_clean = window[0].1;
    for pair in window.windows(2) {
        let (previous_year, previous_value) = pair[0];
        let (year, value) = pair[1];

        if !(out_of_line(previous_value, value) && out_of_line(last_clean, value)) {
            last_clean = value;
            continue;
        }

        let change = value - previous_value;
        let relative = relative_change(previous_value, value);
        unusual.push(UnusualPoint {
            year,
            value,
            previous_year,
            previous_value,
            change,
            relative_change: relative,
            threshold,
            explanation: format!(
                "{} changed by {:+.1} ({:+.0}%) from {} in {}, more than {}x the median \
                 yearly change ({:.1}) and more than {:.0}%",
                year,
                change,
                relative * change.signum() * 100.0,
                previous_value,
                previous_year,
                config.unusual_change_multiplier,
                median,
                config.unusual_relative_change * 100.0
            ),
        });
    }
    unusual
}

fn relative_change(from: f64, to: f64) -> f64 {
    if from.abs() < 1e-12 {
        f64::INFINITY
    } else {
        (to - from).abs() / from.abs()
    }
}

/// Standard deviation relative to the mean; `None` when undefined.
fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean: f64 = values.iter().mean();
    if mean.abs() < 1e-12 {
        return None;
    }
    let std_dev: f64 = values.iter().std_dev();
    let cv = std_dev / mean.abs();
    cv.is_finite().then_some(cv)
}
