mod http;
mod memory;

pub use http::HttpMetricsSource;
pub use memory::InMemoryMetricsSource;
#[cfg(test)]
pub use memory::{ConflictRecord, PredictionRecord, RepositoryRecords};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ROILensError, Result};
use crate::models::{
    ConflictSummary, EngineeringAverages, EngineeringSample, PredictionSummary, RepositoryId,
};

fn malformed(what: &str, value: f64) -> ROILensError {
    ROILensError::SourceUnavailable(format!("malformed result: {what} = {value}"))
}

fn check_ratio(what: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(malformed(what, v)),
        _ => Ok(()),
    }
}

fn check_non_negative(what: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(malformed(what, v)),
        _ => Ok(()),
    }
}

fn check_sample(sample: &EngineeringSample) -> Result<()> {
    let fields = [
        ("cycleTimeHours", sample.cycle_time_hours),
        ("leadTimeHours", sample.lead_time_hours),
        ("deployFrequency", sample.deploy_frequency),
        ("codeReviewMinutes", sample.code_review_minutes),
        ("prMergeMinutes", sample.pr_merge_minutes),
    ];

    fields
        .into_iter()
        .try_for_each(|(what, value)| check_non_negative(what, Some(value)))
}

/// Read-only access to the aggregates the engine computes over.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn conflict_summary(
        &self,
        repository: &RepositoryId,
        since: DateTime<Utc>,
    ) -> Result<ConflictSummary>;

    async fn prediction_summary(
        &self,
        repository: &RepositoryId,
        since: DateTime<Utc>,
    ) -> Result<PredictionSummary>;

    async fn engineering_averages(
        &self,
        repository: &RepositoryId,
        since: DateTime<Utc>,
    ) -> Result<EngineeringAverages>;

    /// Most recent samples first, at most `limit` of them.
    async fn recent_engineering_samples(
        &self,
        repository: &RepositoryId,
        limit: usize,
    ) -> Result<Vec<EngineeringSample>>;
}
