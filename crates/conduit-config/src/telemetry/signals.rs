//! Settings that apply to one telemetry signal only

use std::time::Duration;

use serde::Deserialize;

use super::exporters::ExporterConfig;

/// `[telemetry.tracing]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracingConfig {
    /// Fraction of root spans kept, clamped to `0.0..=1.0`
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Follow the caller's sampling decision when a parent span arrives
    #[serde(default = "default_parent_based")]
    pub parent_based: bool,
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
}

impl TracingConfig {
    pub fn sampling_rate(&self) -> f64 {
        if self.sampling_rate.is_nan() {
            return 1.0;
        }
        self.sampling_rate.clamp(0.0, 1.0)
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            sampling_rate: default_sampling_rate(),
            parent_based: default_parent_based(),
            exporter: None,
        }
    }
}

/// `[telemetry.metrics]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Seconds between pushes to the collector
    #[serde(default = "default_export_interval")]
    pub export_interval: u64,
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
}

impl MetricsConfig {
    pub fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export_interval.max(1))
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            export_interval: default_export_interval(),
            exporter: None,
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_sampling_rate() -> f64 {
    1.0
}

#[allow(clippy::missing_const_for_fn)]
fn default_parent_based() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_export_interval() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_rate_is_clamped() {
        let config: TracingConfig = toml::from_str("sampling_rate = 2.5").unwrap();
        assert!((config.sampling_rate() - 1.0).abs() < f64::EPSILON);

        let config: TracingConfig = toml::from_str("sampling_rate = -1.0").unwrap();
        assert!(config.sampling_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn export_interval_never_zero() {
        let config: MetricsConfig = toml::from_str("export_interval = 0").unwrap();
        assert_eq!(config.export_interval(), Duration::from_secs(1));
        assert_eq!(MetricsConfig::default().export_interval(), Duration::from_secs(30));
    }
}
