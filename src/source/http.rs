use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{check_non_negative, check_ratio, check_sample, MetricsSource};
use crate::auth::Token;
use crate::config::SummaryDefaults;
use crate::error::{ROILensError, Result};
use crate::models::{
    ConflictSummary, EngineeringAverages, EngineeringSample, PredictionSummary, RepositoryId,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictSummaryDto {
    total_conflicts: u64,
    avg_resolution_minutes: Option<f64>,
    resolution_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictionSummaryDto {
    total_predictions: u64,
    accuracy_rate: Option<f64>,
    #[serde(default)]
    prevented_failures: u64,
}

/// Metrics source backed by the analytics store's REST API.
pub struct HttpMetricsSource {
    client: Client,
    api_url: Url,
    token: Option<Token>,
    defaults: SummaryDefaults,
}

impl HttpMetricsSource {
    pub fn new(base_url: &str, token: Option<Token>, defaults: SummaryDefaults) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ROILens/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ROILensError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut api_url = Url::parse(base_url)
            .map_err(|e| ROILensError::Config(format!("Invalid metrics source URL: {e}")))?;

        // Url::join drops the last segment unless the base ends with a slash
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        Ok(Self {
            client,
            api_url,
            token,
            defaults,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    fn repository_url(&self, repository: &RepositoryId, resource: &str) -> Result<Url> {
        let url = self
            .api_url
            .join(&format!(
                "repositories/{}/{resource}",
                urlencoding::encode(repository.as_str())
            ))
            .map_err(|e| ROILensError::Config(format!("Invalid repository URL: {e}")))?;

        let scope = format!("{}repositories/", self.api_url.path());
        if !url.path().starts_with(&scope) {
            return Err(ROILensError::InvalidInput(format!(
                "repositoryId '{repository}' does not resolve to a repository resource"
            )));
        }

        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("GET {url}");

        let request = self.auth_request(self.client.get(url).query(query));
        let response = request.send().await?.error_for_status()?;
        let body = response.json::<T>().await?;
        Ok(body)
    }
}

fn since_param(since: DateTime<Utc>) -> (&'static str, String) {
    ("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn conflict_summary(
        &self,
        repository: &RepositoryId,
        since: DateTime<Utc>,
    ) -> Result<ConflictSummary> {
        let url = self.repository_url(repository, "conflicts/summary")?;
        let dto: ConflictSummaryDto = self.get_json(url, &[since_param(since)]).await?;

        check_non_negative("avgResolutionMinutes", dto.avg_resolution_minutes)?;
        check_ratio("resolutionRate", dto.resolution_rate)?;

        Ok(ConflictSummary::from_aggregate(
            dto.total_conflicts,
            dto.avg_resolution_minutes,
            dto.resolution_rate,
            &self.defaults,
        ))
    }

    async fn prediction_summary(
        &self,
        repository: &RepositoryId,
        since: DateTime<Utc>,
    ) -> Result<PredictionSummary> {
        let url = self.repository_url(repository, "predictions/summary")?;
        let dto: PredictionSummaryDto = self.get_json(url, &[since_param(since)]).await?;

        check_ratio("accuracyRate", dto.accuracy_rate)?;

        Ok(PredictionSummary::from_aggregate(
            dto.total_predictions,
            dto.accuracy_rate,
            dto.prevented_failures,
            &self.defaults,
        ))
    }

    async fn engineering_averages(
        &self,
        repository: &RepositoryId,
        since: DateTime<Utc>,
    ) -> Result<EngineeringAverages> {
        let url = self.repository_url(repository, "engineering/averages")?;
        let averages: EngineeringAverages = self.get_json(url, &[since_param(since)]).await?;

        check_non_negative("avgCycleTimeHours", averages.avg_cycle_time_hours)?;
        check_non_negative("avgLeadTimeHours", averages.avg_lead_time_hours)?;
        check_non_negative("avgDeployFrequency", averages.avg_deploy_frequency)?;

        Ok(averages)
    }

    async fn recent_engineering_samples(
        &self,
        repository: &RepositoryId,
        limit: usize,
    ) -> Result<Vec<EngineeringSample>> {
        let url = self.repository_url(repository, "engineering/samples")?;
        let mut samples: Vec<EngineeringSample> =
            self.get_json(url, &[("limit", limit.to_string())]).await?;

        samples.iter().try_for_each(check_sample)?;

        samples.sort_by(|a, b| b.date.cmp(&a.date));
        samples.truncate(limit);

        debug!(
            "Fetched {} engineering samples for repository {repository}",
            samples.len()
        );

        Ok(samples)
    }
}
