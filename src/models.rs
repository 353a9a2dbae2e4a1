use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::SummaryDefaults;
use crate::error::{ROILensError, Result};

const MAX_REPOSITORY_ID_LEN: usize = 255;

/// Identifier of a repository as the metrics source knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryId(String);

impl RepositoryId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(ROILensError::InvalidInput(
                "repositoryId must not be empty".to_string(),
            ));
        }

        if trimmed.chars().count() > MAX_REPOSITORY_ID_LEN {
            return Err(ROILensError::InvalidInput(format!(
                "repositoryId must be at most {MAX_REPOSITORY_ID_LEN} characters"
            )));
        }

        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ROILensError::InvalidInput(format!(
                "repositoryId '{}' contains whitespace or control characters",
                trimmed.escape_debug()
            )));
        }

        // Dot segments would be resolved away when joined onto the source URL.
        if trimmed == "." || trimmed == ".." {
            return Err(ROILensError::InvalidInput(format!(
                "repositoryId '{trimmed}' is not a valid identifier"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RepositoryId {
    type Error = ROILensError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RepositoryId> for String {
    fn from(value: RepositoryId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictSummary {
    pub total_conflicts: u64,
    pub avg_resolution_minutes: f64,
    pub resolution_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSummary {
    pub total_predictions: u64,
    pub accuracy_rate: f64,
    pub prevented_failures: u64,
}

impl ConflictSummary {
    /// Build a summary from raw aggregates, falling back to the configured
    /// defaults for anything the source could not compute.
    pub fn from_aggregate(
        total_conflicts: u64,
        avg_resolution_minutes: Option<f64>,
        resolution_rate: Option<f64>,
        defaults: &SummaryDefaults,
    ) -> Self {
        if total_conflicts == 0 {
            return Self {
                total_conflicts,
                avg_resolution_minutes: defaults.avg_resolution_minutes,
                resolution_rate: defaults.resolution_rate,
            };
        }

        Self {
            total_conflicts,
            avg_resolution_minutes: avg_resolution_minutes
                .unwrap_or(defaults.avg_resolution_minutes),
            resolution_rate: resolution_rate.unwrap_or(defaults.resolution_rate),
        }
    }
}

impl PredictionSummary {
    pub fn from_aggregate(
        total_predictions: u64,
        accuracy_rate: Option<f64>,
        prevented_failures: u64,
        defaults: &SummaryDefaults,
    ) -> Self {
        // Accuracy is undefined without predictions.
        let accuracy_rate = if total_predictions == 0 {
            defaults.accuracy_rate
        } else {
            accuracy_rate.unwrap_or(defaults.accuracy_rate)
        };

        Self {
            total_predictions,
            accuracy_rate,
            prevented_failures,
        }
    }
}

/// Window averages of the engineering samples. `None` means the window had no samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineeringAverages {
    pub avg_cycle_time_hours: Option<f64>,
    pub avg_lead_time_hours: Option<f64>,
    pub avg_deploy_frequency: Option<f64>,
}

/// One day of cycle and review metrics for a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineeringSample {
    pub date: NaiveDate,
    pub cycle_time_hours: f64,
    pub lead_time_hours: f64,
    pub deploy_frequency: f64,
    pub code_review_minutes: f64,
    pub pr_merge_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiReport {
    pub repository_id: RepositoryId,
    pub timeframe_days: i64,
    pub conflicts_avoided: u64,
    pub avg_conflict_resolution_minutes: f64,
    pub time_saved_hours: f64,
    pub cost_savings: f64,
    pub hourly_cost: f64,
    pub prevented_build_failures: u64,
    pub cicd_time_saved_hours: f64,
    pub cicd_cost_savings: f64,
    pub total_savings: f64,
    pub projected_annual_savings: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    LongPrReview,
    MergeConflicts,
    SlowCi,
    #[allow(dead_code)]
    DelayedDeployments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    #[allow(dead_code)]
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub kind: BottleneckKind,
    pub description: String,
    pub impact: Impact,
    pub estimated_cost: f64,
    pub recommendation: String,
}
