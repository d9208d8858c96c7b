use std::collections::{HashMap, VecDeque};

use sha2::{Digest, Sha256};

use super::{build_emissions_chart, EmissionsChart};
use crate::common::error::Result;
use crate::common::params::TrendConfig;
use crate::common::types::EmissionPeriod;
use crate::trends::validation::with_error_handling;

/// Memoized chart computations keyed by a content hash of their inputs.
///
/// Failed computations are cached as `None` so a broken entity is not
/// recomputed on every request. Unbounded unless built with
/// [`TrendCache::with_max_entries`], in which case the oldest entry is evicted
/// first.
#[derive(Debug, Default)]
pub struct TrendCache {
    entries: HashMap<String, Option<EmissionsChart>>,
    insertion_order: VecDeque<String>,
    max_entries: Option<usize>,
}

impl TrendCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `max_entries` charts (at least one).
    pub fn with_max_entries(max_entries: usize) -> Self {
        TrendCache {
            max_entries: Some(max_entries.max(1)),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    /// SHA-256 over the serialized periods, base year and configuration.
    pub fn content_key(
        periods: &[EmissionPeriod],
        base_year: Option<i32>,
        config: &TrendConfig,
    ) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(periods)?);
        hasher.update(serde_json::to_vec(&base_year)?);
        hasher.update(serde_json::to_vec(config)?);
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn get_or_compute(
        &mut self,
        periods: &[EmissionPeriod],
        base_year: Option<i32>,
        config: &TrendConfig,
    ) -> Option<EmissionsChart> {
        let compute = || {
            with_error_handling("build_emissions_chart", || {
                build_emissions_chart(periods, base_year, config)
            })
        };

        let key = match Self::content_key(periods, base_year, config) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "could not hash chart inputs, computing uncached");
                return compute();
            }
        };

        if let Some(cached) = self.entries.get(&key) {
            tracing::debug!(key = %key, "trend cache hit");
            return cached.clone();
        }

        let chart = compute();
        self.insert(key, chart.clone());
        chart
    }

    fn insert(&mut self, key: String, chart: Option<EmissionsChart>) {
        if let Some(max) = self.max_entries {
            while self.entries.len() >= max {
                let Some(oldest) = self.insertion_order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                tracing::debug!(key = %oldest, "trend cache eviction");
            }
        }
        self.insertion_order.push_back(key.clone());
        self.entries.insert(key, chart);
    }
}
