use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ROILensError, Result};

/// Every constant the ROI engine and bottleneck detector depend on.
///
/// Loaded once at startup and shared by reference; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoiConfig {
    /// Developer cost per hour, in USD.
    pub hourly_cost: f64,
    /// Assumed cycle time, in hours, before any CI/CD improvement.
    pub baseline_cycle_time_hours: f64,
    pub deployments_per_week: f64,
    /// Fraction of the developer rate CI/CD time is valued at.
    pub cicd_rate_factor: f64,
    /// Number of daily samples the bottleneck detector looks at.
    pub sample_window: usize,
    pub default_timeframe_days: i64,
    pub defaults: SummaryDefaults,
    pub thresholds: BottleneckThresholds,
    pub rates: BottleneckRates,
}

/// Fallbacks used when the metrics source has no rows for a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SummaryDefaults {
    pub avg_resolution_minutes: f64,
    pub resolution_rate: f64,
    pub accuracy_rate: f64,
}

/// Trigger points for the bottleneck rules. All comparisons are strict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BottleneckThresholds {
    pub review_minutes: f64,
    pub review_minutes_high: f64,
    pub conflict_rate: f64,
    pub conflict_rate_high: f64,
    pub cycle_time_hours: f64,
}

/// Rates the bottleneck detector takes as given rather than deriving them
/// from the sample window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BottleneckRates {
    pub prs_per_week: f64,
    pub conflict_rate: f64,
    pub avg_conflict_resolution_minutes: f64,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            hourly_cost: 75.0,
            baseline_cycle_time_hours: 24.0,
            deployments_per_week: 4.0,
            cicd_rate_factor: 0.5,
            sample_window: 30,
            default_timeframe_days: 30,
            defaults: SummaryDefaults::default(),
            thresholds: BottleneckThresholds::default(),
            rates: BottleneckRates::default(),
        }
    }
}

impl Default for SummaryDefaults {
    fn default() -> Self {
        Self {
            avg_resolution_minutes: 45.0,
            resolution_rate: 0.85,
            accuracy_rate: 0.78,
        }
    }
}

impl Default for BottleneckThresholds {
    fn default() -> Self {
        Self {
            review_minutes: 240.0,
            review_minutes_high: 480.0,
            conflict_rate: 0.15,
            conflict_rate_high: 0.25,
            cycle_time_hours: 48.0,
        }
    }
}

impl Default for BottleneckRates {
    fn default() -> Self {
        Self {
            prs_per_week: 20.0,
            conflict_rate: 0.12,
            avg_conflict_resolution_minutes: 45.0,
        }
    }
}

impl RoiConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    ///
    /// The result is not validated; [`RoiConfig::load`] does that once all
    /// overrides are applied.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults, then the optional file, then the hourly cost override.
    pub fn load(path: Option<&Path>, hourly_cost: Option<f64>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(cost) = hourly_cost {
            config.hourly_cost = cost;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("hourlyCost", self.hourly_cost),
            ("baselineCycleTimeHours", self.baseline_cycle_time_hours),
            ("deploymentsPerWeek", self.deployments_per_week),
            ("cicdRateFactor", self.cicd_rate_factor),
            ("defaults.avgResolutionMinutes", self.defaults.avg_resolution_minutes),
            ("thresholds.reviewMinutes", self.thresholds.review_minutes),
            ("thresholds.reviewMinutesHigh", self.thresholds.review_minutes_high),
            ("thresholds.cycleTimeHours", self.thresholds.cycle_time_hours),
            ("rates.prsPerWeek", self.rates.prs_per_week),
            (
                "rates.avgConflictResolutionMinutes",
                self.rates.avg_conflict_resolution_minutes,
            ),
        ];

        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ROILensError::Config(format!(
                    "{name} must be a finite, non-negative number (got {value})"
                )));
            }
        }

        let ratios = [
            ("defaults.resolutionRate", self.defaults.resolution_rate),
            ("defaults.accuracyRate", self.defaults.accuracy_rate),
            ("thresholds.conflictRate", self.thresholds.conflict_rate),
            ("thresholds.conflictRateHigh", self.thresholds.conflict_rate_high),
            ("rates.conflictRate", self.rates.conflict_rate),
        ];

        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ROILensError::Config(format!(
                    "{name} must be between 0 and 1 (got {value})"
                )));
            }
        }

        if self.baseline_cycle_time_hours == 0.0 {
            return Err(ROILensError::Config(
                "baselineCycleTimeHours must be positive".to_string(),
            ));
        }

        if self.sample_window == 0 {
            return Err(ROILensError::Config(
                "sampleWindow must be at least 1".to_string(),
            ));
        }

        if self.default_timeframe_days <= 0 {
            return Err(ROILensError::Config(
                "defaultTimeframeDays must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
