use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{check_sample, MetricsSource};
use crate::config::SummaryDefaults;
use crate::error::{ROILensError, Result};
use crate::models::{
    ConflictSummary, EngineeringAverages, EngineeringSample, PredictionSummary, RepositoryId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub predicted_at: DateTime<Utc>,
    /// `None` until the outcome of the pull request is known.
    #[serde(default)]
    pub was_correct: Option<bool>,
    #[serde(default)]
    pub prevented_failure: bool,
}

/// Raw activity records for one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositoryRecords {
    pub conflicts: Vec<ConflictRecord>,
    pub predictions: Vec<PredictionRecord>,
    pub samples: Vec<EngineeringSample>,
}

impl RepositoryRecords {
    /// Reject records that would aggregate to negative or non-finite values.
    fn check(&self) -> Result<()> {
        for conflict in &self.conflicts {
            if let Some(resolved_at) = conflict.resolved_at {
                if resolved_at < conflict.detected_at {
                    return Err(ROILensError::SourceUnavailable(format!(
                        "malformed result: conflict detected at {} resolved earlier at {resolved_at}",
                        conflict.detected_at
                    )));
                }
            }
        }

        self.samples.iter().try_for_each(check_sample)
    }
}

#[derive(Debug, Deserialize)]
struct Fixture {
    repositories: HashMap<String, RepositoryRecords>,
}

/// Metrics source that aggregates raw records held in memory.
///
/// Unknown repositories behave like repositories with no activity.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSource {
    repositories: HashMap<RepositoryId, RepositoryRecords>,
    defaults: SummaryDefaults,
    unavailable: Option<String>,
}

impl InMemoryMetricsSource {
    pub fn new(defaults: SummaryDefaults) -> Self {
        Self {
            repositories: HashMap::new(),
            defaults,
            unavailable: None,
        }
    }

    /// Load a JSON fixture of the form `{"repositories": {"<id>": {...}}}`.
    pub fn from_fixture(path: &Path, defaults: SummaryDefaults) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let fixture: Fixture = serde_json::from_str(&raw)?;

        let mut source = Self::new(defaults);
        for (id, records) in fixture.repositories {
            records
                .check()
                .map_err(|e| ROILensError::Config(format!("fixture repository {id}: {e}")))?;
            source.insert(RepositoryId::parse(&id)?, records);
        }

        info!(
            "Loaded fixture {} with {} repositories",
            path.display(),
            source.repositories.len()
        );

        Ok(source)
    }

    pub fn insert(&mut self, repository: RepositoryId, records: RepositoryRecords) {
        self.repositories.insert(repository, records);
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_repository(mut self, repository: RepositoryId, records: RepositoryRecords) -> Self {
        self.insert(repository, records);
        self
    }

    /// Make every subsequent fetch fail with `SourceUnavailable`.
    #[cfg(test)]
    #[must_use]
    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable = Some(reason.to_string());
        self
    }

    fn records(&self, repository: &RepositoryId) -> Result<Option<&RepositoryRecords>> {
        if let Some(reason) = &self.unavailable {
            return Err(ROILensError::SourceUnavailable(reason.clone()));
        }

        let records = self.repositories.get(repository);
        if let Some(records) = records {
            records.check()?;
        }
        Ok(records)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    #[allow(clippy::cast_precision_loss)]
    let avg = (count > 0).then(|| sum / count as f64);
    avg
}

fn ratio(part: usize, whole: usize) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    let rate = (whole > 0).then(|| part as f64 / whole as f64);
    rate
}

#[async_trait]
impl MetricsSource for InMemoryMetricsSource {
    async fn conflict_summary(
        &self,
        repository: &RepositoryId,
        since: DateTime<Utc>,
    ) -> Result<ConflictSummary> {
        let conflicts: Vec<&ConflictRecord> = self
            .records(repository)?
            .map(|r| r.conflicts.iter().filter(|c| c.detected_at >= since).collect())
            .unwrap_or_default();

        let resolution_minutes: Vec<f64> = conflicts
            .iter()
            .filter_map(|c| c.resolved_at.map(|resolved| resolved - c.detected_at))
            .map(|elapsed| {
                #[allow(clippy::cast_precision_loss)]
                let minutes = elapsed.num_seconds() as f64 / 60.0;
                minutes
            })
            .collect();

        Ok(ConflictSummary::from_aggregate(
            conflicts.len() as u64,
            mean(resolution_minutes.iter().copied()),
            ratio(resolution_minutes.len(), conflicts.len()),
            &self.defaults,
        ))
    }

    async fn prediction_summary(
        &self,
        repository: &RepositoryId,
        since: DateTime<Utc>,
    ) -> Result<PredictionSummary> {
        let predictions: Vec<&PredictionRecord> = self
            .records(repository)?
            .map(|r| {
                r.predictions
                    .iter()
                    .filter(|p| p.predicted_at >= since)
                    .collect()
            })
            .unwrap_or_default();

        let evaluated = predictions.iter().filter(|p| p.was_correct.is_some()).count();
        let correct = predictions
            .iter()
            .filter(|p| p.was_correct == Some(true))
            .count();
        let prevented = predictions.iter().filter(|p| p.prevented_failure).count();

        Ok(PredictionSummary::from_aggregate(
            predictions.len() as u64,
            ratio(correct, evaluated),
            prevented as u64,
            &self.defaults,
        ))
    }

    async fn engineering_averages(
        &self,
        repository: &RepositoryId,
        since: DateTime<Utc>,
    ) -> Result<EngineeringAverages> {
        let since_date = since.date_naive();
        let samples: Vec<&EngineeringSample> = self
            .records(repository)?
            .map(|r| r.samples.iter().filter(|s| s.date >= since_date).collect())
            .unwrap_or_default();

        Ok(EngineeringAverages {
            avg_cycle_time_hours: mean(samples.iter().map(|s| s.cycle_time_hours)),
            avg_lead_time_hours: mean(samples.iter().map(|s| s.lead_time_hours)),
            avg_deploy_frequency: mean(samples.iter().map(|s| s.deploy_frequency)),
        })
    }

    async fn recent_engineering_samples(
        &self,
        repository: &RepositoryId,
        limit: usize,
    ) -> Result<Vec<EngineeringSample>> {
        let mut samples = self
            .records(repository)?
            .map(|r| r.samples.clone())
            .unwrap_or_default();

        samples.sort_by(|a, b| b.date.cmp(&a.date));
        samples.truncate(limit);

        Ok(samples)
    }
}
