//! Request and response shapes of the analytics HTTP endpoints, and the
//! handlers behind them:
//!
//! - `POST /api/analytics/calculate-roi` takes a [`CalculateRoiRequest`] and answers with a `RoiReport`
//! - `GET /api/analytics/bottlenecks/:repositoryId` answers with a [`BottlenecksResponse`]
//!
//! Routing belongs to the web layer; errors carry their status via [`ErrorResponse`].

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::bottlenecks::detect_bottlenecks;
use crate::config::RoiConfig;
use crate::error::{ROILensError, Result};
use crate::models::{Bottleneck, RepositoryId, RoiReport};
use crate::monitor::{RequestMonitor, RequestSample};
use crate::roi::compute_roi;
use crate::source::MetricsSource;

pub const CALCULATE_ROI: &str = "calculate-roi";
pub const BOTTLENECKS: &str = "bottlenecks";

/// Repository ids arrive either as strings or as bare numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawRepositoryId {
    Text(String),
    Number(u64),
}

impl RawRepositoryId {
    pub fn parse(&self) -> Result<RepositoryId> {
        match self {
            Self::Text(text) => RepositoryId::parse(text),
            Self::Number(number) => RepositoryId::parse(&number.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRoiRequest {
    pub repository_id: RawRepositoryId,
    #[serde(default)]
    pub timeframe_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BottlenecksResponse {
    pub bottlenecks: Vec<Bottleneck>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl From<&ROILensError> for ErrorResponse {
    fn from(error: &ROILensError) -> Self {
        Self {
            error: error.to_string(),
            status: error.status_code().as_u16(),
        }
    }
}

fn record(
    monitor: &RequestMonitor,
    operation: &str,
    repository: Option<&RepositoryId>,
    started: Instant,
    success: bool,
) {
    monitor.record_sample(RequestSample {
        recorded_at: chrono::Utc::now(),
        operation: operation.to_string(),
        repository_id: repository.map(ToString::to_string),
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        success,
    });
}

pub async fn calculate_roi<S: MetricsSource + ?Sized>(
    source: &S,
    config: &RoiConfig,
    monitor: &RequestMonitor,
    request: &CalculateRoiRequest,
) -> Result<RoiReport> {
    let started = Instant::now();

    let repository = match request.repository_id.parse() {
        Ok(repository) => repository,
        Err(e) => {
            record(monitor, CALCULATE_ROI, None, started, false);
            return Err(e);
        }
    };
    let timeframe_days = request
        .timeframe_days
        .unwrap_or(config.default_timeframe_days);

    let result = compute_roi(source, config, &repository, timeframe_days).await;
    record(monitor, CALCULATE_ROI, Some(&repository), started, result.is_ok());
    result
}

pub async fn bottlenecks<S: MetricsSource + ?Sized>(
    source: &S,
    config: &RoiConfig,
    monitor: &RequestMonitor,
    repository_id: &str,
) -> Result<BottlenecksResponse> {
    let started = Instant::now();

    let repository = match RepositoryId::parse(repository_id) {
        Ok(repository) => repository,
        Err(e) => {
            record(monitor, BOTTLENECKS, None, started, false);
            return Err(e);
        }
    };

    let result = detect_bottlenecks(source, config, &repository)
        .await
        .map(|bottlenecks| BottlenecksResponse { bottlenecks });
    record(monitor, BOTTLENECKS, Some(&repository), started, result.is_ok());
    result
}
