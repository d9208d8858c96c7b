//! Emissions trend analysis for the Klimatkollen dashboards.
//!
//! Takes the reporting periods of a company or municipality and produces
//! chart-ready yearly records: reported emissions per scope and Scope 3
//! category, an approximated trend extrapolated to the end year, and the
//! Carbon Law reduction path. Each chart comes with a [`TrendAnalysis`]
//! recording which regression method was chosen and why.
//!
//! ```no_run
//! use klimatkollen_trends::{build_emissions_chart, EmissionPeriod, TrendConfig};
//!
//! # fn main() -> klimatkollen_trends::Result<()> {
//! let periods: Vec<EmissionPeriod> = serde_json::from_str("[]")?;
//! let chart = build_emissions_chart(&periods, Some(2019), &TrendConfig::default())?;
//! println!("{}: {}", chart.analysis.method, chart.analysis.explanation);
//! # Ok(())
//! # }
//! ```

pub mod chart;
pub mod common;
pub mod trends;

pub use chart::{analyze_entities, build_emissions_chart, EmissionsChart, TrendCache};
pub use common::error::{Result, TrendError};
pub use common::grouping::{summarize_methods, EntityEmissions, EntityTrendRow};
pub use common::params::TrendConfig;
pub use common::types::{ChartDataPoint, EmissionPeriod, YearValue};
pub use trends::models::Coefficients;
pub use trends::selection::{analyze_trend, TrendAnalysis, TrendDirection, TrendMethod};
pub use trends::{calculate_trend, calculate_trend_json, Trend};
