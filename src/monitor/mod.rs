//! Resource monitoring - per-instance memory samples and advisory limits.
//!
//! The monitor measures and reports; it never closes instances. Eviction is a
//! caller policy (typically: close the first entry of
//! [`ResourceMonitor::apps_by_memory_usage`] that is not focused).

pub mod sampler;

pub use sampler::Sampler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{AppName, ResourceLimits};

/// Latest memory reading for one instance. History depth is one: each sample
/// replaces the prior one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSample {
    pub app: AppName,
    pub memory_bytes: u64,
    pub sampled_at: DateTime<Utc>,
}

/// One row of [`ResourceMonitor::resource_report`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReportEntry {
    pub app: AppName,
    pub memory_bytes: u64,
    pub percent_of_per_app_limit: f64,
}

/// Per-instance resource bookkeeping.
///
/// NOT a separate actor - owned by the Shell and called via &mut self. The
/// background [`Sampler`] feeds it through the shell lock.
#[derive(Debug)]
pub struct ResourceMonitor {
    limits: ResourceLimits,
    samples: HashMap<AppName, ResourceSample>,
}

impl ResourceMonitor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            samples: HashMap::new(),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Record a reading, replacing the prior sample for the instance.
    pub fn record_sample(&mut self, app: AppName, memory_bytes: u64) {
        self.samples.insert(
            app.clone(),
            ResourceSample {
                app,
                memory_bytes,
                sampled_at: Utc::now(),
            },
        );
    }

    /// Drop sample history for an instance (close path).
    pub fn clear(&mut self, app: &AppName) {
        self.samples.remove(app);
    }

    pub fn get_app_resource_usage(&self, app: &AppName) -> Option<&ResourceSample> {
        self.samples.get(app)
    }

    /// One entry per sampled instance, order unspecified.
    pub fn resource_report(&self) -> Vec<ResourceReportEntry> {
        self.samples
            .values()
            .map(|s| ResourceReportEntry {
                app: s.app.clone(),
                memory_bytes: s.memory_bytes,
                percent_of_per_app_limit: (s.memory_bytes as f64
                    / self.limits.per_app_limit_bytes as f64)
                    * 100.0,
            })
            .collect()
    }

    /// App names sorted descending by last sampled memory; ties broken by
    /// name so the order is deterministic.
    pub fn apps_by_memory_usage(&self) -> Vec<AppName> {
        let mut entries: Vec<(&AppName, u64)> = self
            .samples
            .values()
            .map(|s| (&s.app, s.memory_bytes))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Sum of all current samples.
    pub fn total_memory_bytes(&self) -> u64 {
        self.samples.values().map(|s| s.memory_bytes).sum()
    }

    /// Advisory limit check: any single sample over the per-app limit, or the
    /// sum over the total limit.
    pub fn is_memory_limit_exceeded(&self) -> bool {
        let any_over = self
            .samples
            .values()
            .any(|s| s.memory_bytes > self.limits.per_app_limit_bytes);
        any_over || self.total_memory_bytes() > self.limits.total_limit_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MB: u64 = 1024 * 1024;

    fn monitor() -> ResourceMonitor {
        ResourceMonitor::new(ResourceLimits {
            per_app_limit_bytes: 500 * MB,
            total_limit_bytes: 2048 * MB,
            sample_interval: std::time::Duration::from_secs(30),
        })
    }

    fn app(name: &str) -> AppName {
        AppName::must(name)
    }

    #[test]
    fn samples_replace_prior_readings() {
        let mut m = monitor();
        m.record_sample(app("a"), 100 * MB);
        m.record_sample(app("a"), 150 * MB);

        let sample = m.get_app_resource_usage(&app("a")).unwrap();
        assert_eq!(sample.memory_bytes, 150 * MB);
        assert_eq!(m.resource_report().len(), 1);
    }

    #[test]
    fn clear_removes_history() {
        let mut m = monitor();
        m.record_sample(app("a"), 100 * MB);
        m.clear(&app("a"));
        assert!(m.get_app_resource_usage(&app("a")).is_none());
        assert_eq!(m.total_memory_bytes(), 0);
    }

    #[test]
    fn sorted_descending_with_name_tiebreak() {
        let mut m = monitor();
        m.record_sample(app("c"), 100 * MB);
        m.record_sample(app("a"), 600 * MB);
        m.record_sample(app("b"), 100 * MB);

        assert_eq!(
            m.apps_by_memory_usage(),
            vec![app("a"), app("b"), app("c")]
        );
    }

    #[test]
    fn per_app_limit_breach() {
        let mut m = monitor();
        m.record_sample(app("a"), 600 * MB);
        m.record_sample(app("b"), 100 * MB);

        assert!(m.is_memory_limit_exceeded());
        assert_eq!(m.apps_by_memory_usage(), vec![app("a"), app("b")]);
    }

    #[test]
    fn total_limit_breach_without_single_offender() {
        let mut m = monitor();
        for n in 0..5 {
            m.record_sample(app(&format!("app{n}")), 450 * MB);
        }
        // No single app over 500 MB, but 2250 MB total exceeds 2048 MB.
        assert!(m.is_memory_limit_exceeded());
    }

    #[test]
    fn within_limits() {
        let mut m = monitor();
        m.record_sample(app("a"), 100 * MB);
        m.record_sample(app("b"), 200 * MB);
        assert!(!m.is_memory_limit_exceeded());
    }

    #[test]
    fn report_percentages() {
        let mut m = monitor();
        m.record_sample(app("a"), 250 * MB);

        let report = m.resource_report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].memory_bytes, 250 * MB);
        assert!((report[0].percent_of_per_app_limit - 50.0).abs() < f64::EPSILON);
    }
}
