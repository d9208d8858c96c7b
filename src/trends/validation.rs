//! Input contract checks for the trend functions.
//!
//! Every check fails fast with a [`TrendError::Validation`] naming the calling
//! function. [`with_error_handling`] is the one place those errors are turned
//! into `None`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;

use super::models::{Coefficients, Point};
use crate::common::error::{Result, TrendError};
use crate::common::types::YearValue;

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

/// Validate a raw JSON series and parse it into yearly values.
///
/// The input must be a non-empty array of objects, each carrying an integral
/// numeric `year`. An optional numeric `value` is read; anything else there is
/// treated as not reported.
pub fn validate_input_data(data: &Value, function_name: &str) -> Result<Vec<YearValue>> {
    let items = data.as_array().ok_or_else(|| {
        TrendError::validation(function_name, "input data must be an array")
    })?;

    if items.is_empty() {
        return Err(TrendError::validation(function_name, "input data is empty"));
    }

    let mut series = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let object = item.as_object().ok_or_else(|| {
            TrendError::validation(
                function_name,
                format!("element at index {} is not an object", i),
            )
        })?;

        let year = match object.get("year") {
            None | Some(Value::Null) => {
                return Err(TrendError::validation(
                    function_name,
                    format!("element at index {} has no year", i),
                ))
            }
            Some(Value::Number(n)) => n.as_f64().filter(|y| y.is_finite()).ok_or_else(|| {
                TrendError::validation(
                    function_name,
                    format!("element at index {} has a non-numeric year", i),
                )
            })?,
            Some(other) => {
                return Err(TrendError::validation(
                    function_name,
                    format!("element at index {} has a non-numeric year: {}", i, other),
                ))
            }
        };

        if year.fract() != 0.0 {
            return Err(TrendError::validation(
                function_name,
                format!("element at index {} has a fractional year {}", i, year),
            ));
        }
        let year = year as i32;
        validate_year(year, function_name)?;

        let value = object.get("value").and_then(Value::as_f64);
        series.push(YearValue::new(year, value));
    }

    Ok(series)
}

/// Typed counterpart of [`validate_input_data`] for regression points.
pub fn validate_points(points: &[Point], function_name: &str) -> Result<()> {
    if points.is_empty() {
        return Err(TrendError::validation(function_name, "input data is empty"));
    }
    if let Some(i) = points.iter().position(|p| !p.x.is_finite()) {
        return Err(TrendError::validation(
            function_name,
            format!("point at index {} has an invalid year {}", i, points[i].x),
        ));
    }
    Ok(())
}

/// Check a year parameter is a plausible calendar year.
pub fn validate_year(year: i32, function_name: &str) -> Result<()> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(TrendError::validation(
            function_name,
            format!("year {} is outside {}..={}", year, MIN_YEAR, MAX_YEAR),
        ));
    }
    Ok(())
}

/// Check coefficients are finite and an exponential scale is positive.
pub fn validate_coefficients(coefficients: &Coefficients, function_name: &str) -> Result<()> {
    match coefficients {
        Coefficients::Linear(c) => {
            if !c.slope.is_finite() || !c.intercept.is_finite() {
                return Err(TrendError::validation(
                    function_name,
                    format!(
                        "linear coefficients must be finite, got slope={} intercept={}",
                        c.slope, c.intercept
                    ),
                ));
            }
        }
        Coefficients::Exponential(c) => {
            if !c.a.is_finite() || !c.b.is_finite() || !c.origin.is_finite() {
                return Err(TrendError::validation(
                    function_name,
                    format!(
                        "exponential coefficients must be finite, got a={} b={} origin={}",
                        c.a, c.b, c.origin
                    ),
                ));
            }
            if c.a <= 0.0 {
                return Err(TrendError::validation(
                    function_name,
                    format!("exponential scale a must be positive, got {}", c.a),
                ));
            }
        }
    }
    Ok(())
}

/// Check a base year is valid and does not lie after the projection end year.
pub fn validate_base_year(base_year: i32, end_year: i32, function_name: &str) -> Result<()> {
    validate_year(base_year, function_name)?;
    if base_year > end_year {
        return Err(TrendError::validation(
            function_name,
            format!("base year {} is after the end year {}", base_year, end_year),
        ));
    }
    Ok(())
}

/// Check an end year is valid and does not precede the reported data.
pub fn validate_end_year(end_year: i32, first_year: i32, function_name: &str) -> Result<()> {
    validate_year(end_year, function_name)?;
    if end_year < first_year {
        return Err(TrendError::validation(
            function_name,
            format!(
                "end year {} is before the first reported year {}",
                end_year, first_year
            ),
        ));
    }
    Ok(())
}

/// Run a computation, logging and swallowing any error or panic.
///
/// Lets a batch over many entities continue when one entity's data is bad.
pub fn with_error_handling<T, F>(label: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(computation = label, error = %e, "trend computation failed");
            None
        }
        Err(_) => {
            tracing::warn!(computation = label, "trend computation panicked");
            None
        }
    }
}
