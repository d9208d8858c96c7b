use linregress::{FormulaRegressionBuilder, RegressionDataBuilder};
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::common::types::MIN_DATA_POINTS;

/// Weight multiplier for points next to a gap in the annual sequence.
const GAP_NEIGHBOUR_WEIGHT: f64 = 1.5;
/// Weight multiplier for points flagged as unusual.
const UNUSUAL_POINT_WEIGHT: f64 = 0.25;
/// Minimum number of points for a meaningful R² comparison.
pub const MIN_FIT_COMPARISON_POINTS: usize = 3;

/// A single regression input: x is the year, y the emissions value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// y = slope * x + intercept
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearCoefficients {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearCoefficients {
    pub fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// y = a * exp(b * (x - origin))
///
/// `origin` is the first x of the fitted window. Fitting against raw calendar
/// years would push `a` out of f64 range for steep series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialCoefficients {
    pub a: f64,
    pub b: f64,
    pub origin: f64,
}

impl ExponentialCoefficients {
    pub fn value_at(&self, x: f64) -> f64 {
        self.a * (self.b * (x - self.origin)).exp()
    }

    /// Multiplicative change over `dx` years.
    pub fn growth_factor(&self, dx: f64) -> f64 {
        (self.b * dx).exp()
    }
}

/// Fitted trend coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Coefficients {
    Linear(LinearCoefficients),
    Exponential(ExponentialCoefficients),
}

impl Coefficients {
    pub fn value_at(&self, x: f64) -> f64 {
        match self {
            Coefficients::Linear(c) => c.value_at(x),
            Coefficients::Exponential(c) => c.value_at(x),
        }
    }

    /// Yearly change in percent, relative to `reference` for linear trends.
    pub fn yearly_change_percent(&self, reference: f64) -> Option<f64> {
        let pct = match self {
            Coefficients::Linear(c) => {
                if reference.abs() < 1e-12 {
                    return None;
                }
                c.slope / reference * 100.0
            }
            Coefficients::Exponential(c) => (c.b.exp() - 1.0) * 100.0,
        };
        pct.is_finite().then_some(pct)
    }
}

/// Ordinary least squares slope, with the line anchored through the last point.
///
/// slope = (nΣxy − ΣxΣy) / (nΣxx − (Σx)²), intercept = last_y − slope·last_x.
/// Anchoring keeps the projection continuous with the most recent observation.
/// Returns `None` for fewer than 2 points or when every x is equal.
pub fn calculate_linear_regression(points: &[Point]) -> Option<LinearCoefficients> {
    if points.len() < MIN_DATA_POINTS {
        return None;
    }

    let n = points.len() as f64;
    let (sum_x, sum_y, sum_xy, sum_xx) = points.iter().fold(
        (0.0, 0.0, 0.0, 0.0),
        |(sx, sy, sxy, sxx), p| (sx + p.x, sy + p.y, sxy + p.x * p.y, sxx + p.x * p.x),
    );

    let denominator = n * sum_xx - sum_x * sum_x;
    if !denominator.is_finite() || denominator.abs() < 1e-12 {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;

    let last = points[points.len() - 1];
    let intercept = last.y - slope * last.x;

    Some(LinearCoefficients { slope, intercept })
}

/// Weighted least squares slope, anchored through the last point.
///
/// Returns `None` for fewer than 2 points, mismatched or non-positive weights,
/// or a singular system.
pub fn calculate_weighted_linear_regression(
    points: &[Point],
    weights: &[f64],
) -> Option<LinearCoefficients> {
    if points.len() < MIN_DATA_POINTS || !weights_usable(points, weights) {
        return None;
    }

    let last = points[points.len() - 1];
    // Centre on the last x; the slope is unaffected and the system stays well conditioned.
    let xs: Vec<f64> = points.iter().map(|p| p.x - last.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let (_, slope) = weighted_least_squares(&xs, &ys, weights)?;

    Some(LinearCoefficients {
        slope,
        intercept: last.y - slope * last.x,
    })
}

/// Fit y = a * exp(b * (x - origin)) by least squares on ln(y).
///
/// All y must be strictly positive. Returns `None` for fewer than 2 points
/// or any non-positive value.
pub fn calculate_exponential_regression(points: &[Point]) -> Option<ExponentialCoefficients> {
    let weights = vec![1.0; points.len()];
    calculate_weighted_exponential_regression(points, &weights)
}

/// Weighted form of [`calculate_exponential_regression`].
pub fn calculate_weighted_exponential_regression(
    points: &[Point],
    weights: &[f64],
) -> Option<ExponentialCoefficients> {
    if points.len() < MIN_DATA_POINTS || !weights_usable(points, weights) {
        return None;
    }
    if points.iter().any(|p| p.y <= 0.0 || !p.y.is_finite()) {
        return None;
    }

    let origin = points[0].x;
    let xs: Vec<f64> = points.iter().map(|p| p.x - origin).collect();
    let log_ys: Vec<f64> = points.iter().map(|p| p.y.ln()).collect();
    let (log_a, b) = weighted_least_squares(&xs, &log_ys, weights)?;

    let a = log_a.exp();
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some(ExponentialCoefficients { a, b, origin })
}

fn weights_usable(points: &[Point], weights: &[f64]) -> bool {
    weights.len() == points.len()
        && weights.iter().all(|w| w.is_finite() && *w >= 0.0)
        && weights.iter().sum::<f64>() > 0.0
}

/// Solve the 2x2 weighted normal equations (XᵀWX)β = XᵀWy.
/// Returns (intercept, slope).
fn weighted_least_squares(xs: &[f64], ys: &[f64], weights: &[f64]) -> Option<(f64, f64)> {
    let mut s_w = 0.0;
    let mut s_wx = 0.0;
    let mut s_wxx = 0.0;
    let mut s_wy = 0.0;
    let mut s_wxy = 0.0;
    for ((&x, &y), &w) in xs.iter().zip(ys).zip(weights) {
        s_w += w;
        s_wx += w * x;
        s_wxx += w * x * x;
        s_wy += w * y;
        s_wxy += w * x * y;
    }

    let normal = Matrix2::new(s_w, s_wx, s_wx, s_wxx);
    if normal.determinant().abs() < 1e-12 {
        return None;
    }
    let rhs = Vector2::new(s_wy, s_wxy);
    let beta = normal.lu().solve(&rhs)?;

    if !beta[0].is_finite() || !beta[1].is_finite() {
        return None;
    }
    Some((beta[0], beta[1]))
}

/// Regression weights for a year-sorted series.
///
/// Recent points weigh more, points next to a gap in the annual sequence are
/// boosted and points in `unusual_years` are damped. Nothing is dropped.
pub fn trend_weights(points: &[Point], unusual_years: &[i32]) -> Vec<f64> {
    let n = points.len();
    (0..n)
        .map(|i| {
            let recency = 0.5 + 0.5 * (i + 1) as f64 / n as f64;
            let gap_before = i > 0 && points[i].x - points[i - 1].x > 1.0;
            let gap_after = i + 1 < n && points[i + 1].x - points[i].x > 1.0;
            let gap = if gap_before || gap_after {
                GAP_NEIGHBOUR_WEIGHT
            } else {
                1.0
            };
            let unusual = if unusual_years.contains(&(points[i].x as i32)) {
                UNUSUAL_POINT_WEIGHT
            } else {
                1.0
            };
            recency * gap * unusual
        })
        .collect()
}

/// Goodness of fit of OLS linear and log-linear fits over the same points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitComparison {
    pub linear_r2: Option<f64>,
    pub exponential_r2: Option<f64>,
}

impl FitComparison {
    /// How much better the exponential fit explains the data, if both fits exist.
    pub fn exponential_gain(&self) -> Option<f64> {
        Some(self.exponential_r2? - self.linear_r2?)
    }
}

/// Compare linear and exponential fits by R².
///
/// The exponential R² is only computed when every value is strictly positive.
/// Both are `None` below [`MIN_FIT_COMPARISON_POINTS`].
pub fn goodness_of_fit(points: &[Point]) -> FitComparison {
    if points.len() < MIN_FIT_COMPARISON_POINTS {
        return FitComparison::default();
    }

    let origin = points[0].x;
    let xs: Vec<f64> = points.iter().map(|p| p.x - origin).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();

    let linear_r2 = ols_r_squared(xs.clone(), ys.clone());
    let exponential_r2 = if ys.iter().all(|&y| y > 0.0) {
        ols_r_squared(xs, ys.iter().map(|y| y.ln()).collect())
    } else {
        None
    };

    FitComparison {
        linear_r2,
        exponential_r2,
    }
}

fn ols_r_squared(xs: Vec<f64>, ys: Vec<f64>) -> Option<f64> {
    let data = vec![("Y".to_string(), ys), ("X".to_string(), xs)];

    let regression_data = match RegressionDataBuilder::new().build_from(data) {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!("failed to build regression data: {}", e);
            return None;
        }
    };

    let model = match FormulaRegressionBuilder::new()
        .data(&regression_data)
        .formula("Y ~ X")
        .fit()
    {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("R² regression fitting failed: {}", e);
            return None;
        }
    };

    let r2 = model.rsquared();
    r2.is_finite().then_some(r2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn yearly(first_year: i32, values: &[f64]) -> Vec<Point> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Point::new((first_year + i as i32) as f64, v))
            .collect()
    }

    // ==================== Linear regression tests ====================

    #[test]
    fn test_linear_exact_line() {
        let points = yearly(2018, &[100.0, 90.0, 80.0, 70.0]);
        let c = calculate_linear_regression(&points).unwrap();
        assert_abs_diff_eq!(c.slope, -10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.value_at(2021.0), 70.0, epsilon = 1e-6);
    }

    #[test]
    fn test_linear_anchored_through_last_point() {
        // Noisy data: OLS line would not pass through the last point
        let points = yearly(2015, &[50.0, 58.0, 49.0, 61.0, 55.0]);
        let c = calculate_linear_regression(&points).unwrap();
        assert_abs_diff_eq!(c.value_at(2019.0), 55.0, epsilon = 1e-6);
    }

    #[test]
    fn test_linear_too_few_points() {
        assert!(calculate_linear_regression(&[]).is_none());
        assert!(calculate_linear_regression(&[Point::new(2020.0, 5.0)]).is_none());
    }

    #[test]
    fn test_linear_degenerate_x() {
        let points = vec![Point::new(2020.0, 1.0), Point::new(2020.0, 3.0)];
        assert!(calculate_linear_regression(&points).is_none());
    }

    #[test]
    fn test_weighted_linear_equal_weights_matches_ols_slope() {
        let points = yearly(2015, &[50.0, 58.0, 49.0, 61.0, 55.0]);
        let ols = calculate_linear_regression(&points).unwrap();
        let wls = calculate_weighted_linear_regression(&points, &[1.0; 5]).unwrap();
        assert_abs_diff_eq!(ols.slope, wls.slope, epsilon = 1e-9);
        assert_abs_diff_eq!(ols.intercept, wls.intercept, epsilon = 1e-6);
    }

    #[test]
    fn test_weighted_linear_follows_heavy_points() {
        // Flat early data, steep recent data: weighting the recent points steepens the slope
        let points = yearly(2015, &[100.0, 100.0, 100.0, 90.0, 80.0]);
        let flat = calculate_weighted_linear_regression(&points, &[1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        let recent = calculate_weighted_linear_regression(&points, &[0.1, 0.1, 0.1, 5.0, 5.0]).unwrap();
        assert!(recent.slope < flat.slope, "{} vs {}", recent.slope, flat.slope);
    }

    #[test]
    fn test_weighted_linear_rejects_bad_weights() {
        let points = yearly(2015, &[1.0, 2.0, 3.0]);
        assert!(calculate_weighted_linear_regression(&points, &[1.0, 1.0]).is_none());
        assert!(calculate_weighted_linear_regression(&points, &[0.0, 0.0, 0.0]).is_none());
        assert!(calculate_weighted_linear_regression(&points, &[1.0, f64::NAN, 1.0]).is_none());
    }

    // ==================== Exponential regression tests ====================

    #[test]
    fn test_exponential_recovers_rate() {
        let values: Vec<f64> = (0..6).map(|i| 200.0 * (-0.1 * i as f64).exp()).collect();
        let points = yearly(2018, &values);
        let c = calculate_exponential_regression(&points).unwrap();
        assert_abs_diff_eq!(c.b, -0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(c.a, 200.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c.origin, 2018.0);
        assert_abs_diff_eq!(c.value_at(2020.0), values[2], epsilon = 1e-6);
    }

    #[test]
    fn test_exponential_rejects_non_positive() {
        assert!(calculate_exponential_regression(&yearly(2020, &[3.0, 0.0, 1.0])).is_none());
        assert!(calculate_exponential_regression(&yearly(2020, &[3.0, -2.0, 1.0])).is_none());
        assert!(calculate_exponential_regression(&yearly(2020, &[3.0])).is_none());
    }

    #[test]
    fn test_exponential_steep_series_stays_finite() {
        let points = yearly(2000, &[1e6, 1e3, 1.0]);
        let c = calculate_exponential_regression(&points).unwrap();
        assert!(c.a.is_finite() && c.b.is_finite());
    }

    // ==================== Weights and fit comparison ====================

    #[test]
    fn test_trend_weights_shapes() {
        let points = vec![
            Point::new(2018.0, 1.0),
            Point::new(2019.0, 1.0),
            Point::new(2021.0, 1.0),
            Point::new(2022.0, 1.0),
        ];
        let weights = trend_weights(&points, &[2022]);
        // 2019 and 2021 border the missing 2020
        assert!(weights[1] > weights[0]);
        assert!(weights[2] > weights[3]);
        assert_abs_diff_eq!(weights[3], 1.0 * UNUSUAL_POINT_WEIGHT);
    }

    #[test]
    fn test_goodness_of_fit_prefers_exponential_for_exponential_data() {
        let values: Vec<f64> = (0..10).map(|i| 10.0 * (0.4 * i as f64).exp()).collect();
        let fit = goodness_of_fit(&yearly(2010, &values));
        let gain = fit.exponential_gain().unwrap();
        assert!(gain > 0.05, "gain {:.4}", gain);
    }

    #[test]
    fn test_goodness_of_fit_requires_three_points() {
        let fit = goodness_of_fit(&yearly(2010, &[1.0, 2.0]));
        assert_eq!(fit, FitComparison::default());
        assert!(fit.exponential_gain().is_none());
    }

    #[test]
    fn test_goodness_of_fit_skips_exponential_for_non_positive() {
        let fit = goodness_of_fit(&yearly(2010, &[4.0, 0.0, 2.5, 1.0]));
        assert!(fit.exponential_r2.is_none());
    }

    #[test]
    fn test_coefficients_tagged_serialization() {
        let c = Coefficients::Linear(LinearCoefficients { slope: -1.5, intercept: 3050.0 });
        let json = serde_json::to_value(c).unwrap();
        assert_eq!(json["kind"], "linear");
        let back: Coefficients = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_yearly_change_percent() {
        let linear = Coefficients::Linear(LinearCoefficients { slope: -5.0, intercept: 0.0 });
        assert_abs_diff_eq!(linear.yearly_change_percent(100.0).unwrap(), -5.0);
        assert!(linear.yearly_change_percent(0.0).is_none());

        let exp = Coefficients::Exponential(ExponentialCoefficients { a: 1.0, b: 0.0, origin: 0.0 });
        assert_abs_diff_eq!(exp.yearly_change_percent(100.0).unwrap(), 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_linear_passes_through_last_point(
            values in prop::collection::vec(0.0f64..1e6, 2..20),
            first_year in 1990i32..2020
        ) {
            let points = yearly(first_year, &values);
            let c = calculate_linear_regression(&points).unwrap();
            let last = points[points.len() - 1];
            let tolerance = 1e-9 * (last.y.abs() + (c.slope * last.x).abs()) + 1e-9;
            prop_assert!((c.slope * last.x + c.intercept - last.y).abs() <= tolerance);
        }

        #[test]
        fn prop_linear_single_point_is_none(value in -1e6f64..1e6, year in 1990i32..2030) {
            prop_assert!(calculate_linear_regression(&[Point::new(year as f64, value)]).is_none());
        }
    }
}
