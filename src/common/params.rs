use serde::{Deserialize, Serialize};

use super::error::{Result, TrendError};

/// Upper bound on empty years appended after the last reported year.
pub const MAX_PLACEHOLDER_YEARS: u32 = 100;

/// Parameters for trend selection, projection and chart assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrendConfig {
    /// Last year the projection is drawn to.
    pub end_year: i32,
    /// First year of the Carbon Law target line.
    pub carbon_law_start_year: i32,
    /// Annual compounding reduction rate of the Carbon Law line.
    pub carbon_law_rate: f64,
    /// Empty years appended after the last reported year.
    pub placeholder_years: u32,
    /// Coefficient of variation below which the recent window counts as stable.
    pub stability_threshold: f64,
    /// Coefficient of variation above which the whole series counts as noisy.
    pub high_variance_threshold: f64,
    /// Multiple of the median absolute year-over-year change that marks a jump.
    pub unusual_change_multiplier: f64,
    /// Relative year-over-year change that must also be exceeded.
    pub unusual_relative_change: f64,
    /// R² gain the exponential fit needs over the linear fit to be preferred.
    pub exponential_preference_margin: f64,
    /// Number of trailing years inspected for recent behaviour.
    pub recent_window: usize,
    /// Minimum exponential R² over the recent window for `recentExponential`.
    pub recent_exponential_min_r2: f64,
    /// Lower clamp for exponential projections (tCO2e).
    pub exponential_floor: f64,
    /// Upper clamp for exponential projections (tCO2e).
    pub exponential_ceiling: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            end_year: 2030,
            carbon_law_start_year: 2025,
            carbon_law_rate: 0.1172,
            placeholder_years: 5,
            stability_threshold: 0.10,
            high_variance_threshold: 0.20,
            unusual_change_multiplier: 4.0,
            unusual_relative_change: 0.5,
            exponential_preference_margin: 0.05,
            recent_window: 4,
            recent_exponential_min_r2: 0.9,
            exponential_floor: 0.1,
            exponential_ceiling: 1_000_000.0,
        }
    }
}

impl TrendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrendConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_end_year(mut self, year: i32) -> Self {
        self.end_year = year;
        self
    }

    pub fn with_carbon_law(mut self, start_year: i32, rate: f64) -> Self {
        self.carbon_law_start_year = start_year;
        self.carbon_law_rate = rate;
        self
    }

    pub fn with_placeholder_years(mut self, years: u32) -> Self {
        self.placeholder_years = years;
        self
    }

    pub fn with_exponential_bounds(mut self, floor: f64, ceiling: f64) -> Self {
        self.exponential_floor = floor;
        self.exponential_ceiling = ceiling;
        self
    }

    /// Check that every threshold is usable.
    pub fn validate(&self) -> Result<()> {
        if !(1900..=2100).contains(&self.end_year) {
            return Err(TrendError::Config(format!(
                "end_year must be between 1900 and 2100, got {}",
                self.end_year
            )));
        }
        if !(1900..=2100).contains(&self.carbon_law_start_year) {
            return Err(TrendError::Config(format!(
                "carbon_law_start_year must be between 1900 and 2100, got {}",
                self.carbon_law_start_year
            )));
        }
        if !(self.carbon_law_rate > 0.0 && self.carbon_law_rate < 1.0) {
            return Err(TrendError::Config(
                "carbon_law_rate must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }
        let ratios = [
            ("stability_threshold", self.stability_threshold),
            ("high_variance_threshold", self.high_variance_threshold),
            ("unusual_change_multiplier", self.unusual_change_multiplier),
            ("unusual_relative_change", self.unusual_relative_change),
            ("exponential_preference_margin", self.exponential_preference_margin),
            ("recent_exponential_min_r2", self.recent_exponential_min_r2),
        ];
        for (name, value) in ratios {
            if !value.is_finite() || value < 0.0 {
                return Err(TrendError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.placeholder_years > MAX_PLACEHOLDER_YEARS {
            return Err(TrendError::Config(format!(
                "placeholder_years must be at most {}, got {}",
                MAX_PLACEHOLDER_YEARS, self.placeholder_years
            )));
        }
        if self.recent_window < 2 {
            return Err(TrendError::Config(format!(
                "recent_window must be at least 2, got {}",
                self.recent_window
            )));
        }
        if !(self.exponential_floor > 0.0 && self.exponential_floor < self.exponential_ceiling) {
            return Err(TrendError::Config(format!(
                "exponential bounds must satisfy 0 < floor < ceiling, got [{}, {}]",
                self.exponential_floor, self.exponential_ceiling
            )));
        }
        Ok(())
    }
}
