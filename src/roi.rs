use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::config::RoiConfig;
use crate::error::{ROILensError, Result};
use crate::models::{
    ConflictSummary, EngineeringAverages, PredictionSummary, RepositoryId, RoiReport,
};
use crate::source::MetricsSource;

const DAYS_PER_YEAR: f64 = 365.0;

/// Start of the lookback window ending at `now`.
pub fn window_start(now: DateTime<Utc>, timeframe_days: i64) -> Result<DateTime<Utc>> {
    if timeframe_days <= 0 {
        return Err(ROILensError::InvalidInput(format!(
            "timeframeDays must be a positive integer (got {timeframe_days})"
        )));
    }

    Duration::try_days(timeframe_days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            ROILensError::InvalidInput(format!("timeframeDays {timeframe_days} is out of range"))
        })
}

pub async fn compute_roi<S: MetricsSource + ?Sized>(
    source: &S,
    config: &RoiConfig,
    repository: &RepositoryId,
    timeframe_days: i64,
) -> Result<RoiReport> {
    compute_roi_at(source, config, repository, timeframe_days, Utc::now()).await
}

/// Same as [`compute_roi`], with the end of the window fixed by the caller.
pub async fn compute_roi_at<S: MetricsSource + ?Sized>(
    source: &S,
    config: &RoiConfig,
    repository: &RepositoryId,
    timeframe_days: i64,
    now: DateTime<Utc>,
) -> Result<RoiReport> {
    let since = window_start(now, timeframe_days)?;

    let conflicts = source.conflict_summary(repository, since).await?;
    let predictions = source.prediction_summary(repository, since).await?;
    let averages = source.engineering_averages(repository, since).await?;

    let report = calculate_roi(
        repository,
        timeframe_days,
        &conflicts,
        &predictions,
        &averages,
        config,
    );

    info!(
        "ROI for {repository} over {timeframe_days} days: {} conflicts avoided, ${:.2} total, ${:.2} projected annually",
        report.conflicts_avoided, report.total_savings, report.projected_annual_savings
    );

    Ok(report)
}

/// Turn the three window summaries into a report. Pure.
pub fn calculate_roi(
    repository: &RepositoryId,
    timeframe_days: i64,
    conflicts: &ConflictSummary,
    predictions: &PredictionSummary,
    averages: &EngineeringAverages,
    config: &RoiConfig,
) -> RoiReport {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let conflicts_avoided =
        (predictions.total_predictions as f64 * predictions.accuracy_rate).floor() as u64;

    #[allow(clippy::cast_precision_loss)]
    let time_saved_hours = conflicts_avoided as f64 * conflicts.avg_resolution_minutes / 60.0;
    let cost_savings = time_saved_hours * config.hourly_cost;

    // No samples in the window means no measured improvement over the baseline
    let cycle_time_hours = averages
        .avg_cycle_time_hours
        .unwrap_or(config.baseline_cycle_time_hours);
    let cicd_time_saved_hours = (config.baseline_cycle_time_hours - cycle_time_hours).max(0.0)
        * config.deployments_per_week;
    let cicd_cost_savings = cicd_time_saved_hours * config.hourly_cost * config.cicd_rate_factor;

    let total_savings = cost_savings + cicd_cost_savings;

    #[allow(clippy::cast_precision_loss)]
    let projected_annual_savings = total_savings / timeframe_days.max(1) as f64 * DAYS_PER_YEAR;

    RoiReport {
        repository_id: repository.clone(),
        timeframe_days,
        conflicts_avoided,
        avg_conflict_resolution_minutes: conflicts.avg_resolution_minutes,
        time_saved_hours,
        cost_savings,
        hourly_cost: config.hourly_cost,
        prevented_build_failures: predictions.prevented_failures,
        cicd_time_saved_hours,
        cicd_cost_savings,
        total_savings,
        projected_annual_savings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SummaryDefaults;
    use crate::source::{
        ConflictRecord, InMemoryMetricsSource, PredictionRecord, RepositoryRecords,
    };
    use chrono::{NaiveDate, TimeZone};

    fn repo() -> RepositoryId {
        RepositoryId::parse("acme/widgets").unwrap()
    }

    fn conflicts(avg_resolution_minutes: f64) -> ConflictSummary {
        ConflictSummary {
            total_conflicts: 10,
            avg_resolution_minutes,
            resolution_rate: 0.9,
        }
    }

    fn predictions(total_predictions: u64, accuracy_rate: f64) -> PredictionSummary {
        PredictionSummary {
            total_predictions,
            accuracy_rate,
            prevented_failures: 5,
        }
    }

    fn cycle_time(hours: f64) -> EngineeringAverages {
        EngineeringAverages {
            avg_cycle_time_hours: Some(hours),
            avg_lead_time_hours: Some(hours * 1.5),
            avg_deploy_frequency: Some(2.0),
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_conflict_savings_without_cicd_improvement() {
        let report = calculate_roi(
            &repo(),
            30,
            &conflicts(45.0),
            &predictions(100, 0.8),
            &cycle_time(24.0),
            &RoiConfig::default(),
        );

        assert_eq!(report.conflicts_avoided, 80);
        assert_close(report.time_saved_hours, 60.0);
        assert_close(report.cost_savings, 4500.0);
        assert_close(report.cicd_time_saved_hours, 0.0);
        assert_close(report.cicd_cost_savings, 0.0);
        assert_close(report.total_savings, 4500.0);
        assert_close(report.projected_annual_savings, 54750.0);
        assert_eq!(report.hourly_cost, 75.0);
        assert_eq!(report.prevented_build_failures, 5);
        assert_eq!(report.avg_conflict_resolution_minutes, 45.0);
    }

    #[test]
    fn test_cicd_improvement_adds_half_rate_savings() {
        let report = calculate_roi(
            &repo(),
            30,
            &conflicts(45.0),
            &predictions(100, 0.8),
            &cycle_time(12.0),
            &RoiConfig::default(),
        );

        assert_close(report.cicd_time_saved_hours, 48.0);
        assert_close(report.cicd_cost_savings, 1800.0);
        assert_close(report.total_savings, 6300.0);
        assert_close(report.projected_annual_savings, 6300.0 / 30.0 * 365.0);
    }

    #[test]
    fn test_slower_than_baseline_never_goes_negative() {
        let report = calculate_roi(
            &repo(),
            30,
            &conflicts(45.0),
            &predictions(0, 0.78),
            &cycle_time(72.0),
            &RoiConfig::default(),
        );

        assert_close(report.cicd_time_saved_hours, 0.0);
        assert_close(report.total_savings, 0.0);
        assert!(report.projected_annual_savings >= 0.0);
    }

    #[test]
    fn test_zero_predictions_means_no_conflicts_avoided() {
        let report = calculate_roi(
            &repo(),
            30,
            &conflicts(45.0),
            &predictions(0, 1.0),
            &cycle_time(24.0),
            &RoiConfig::default(),
        );

        assert_eq!(report.conflicts_avoided, 0);
        assert_close(report.time_saved_hours, 0.0);
        assert_close(report.cost_savings, 0.0);
    }

    #[test]
    fn test_conflicts_avoided_is_floored() {
        let report = calculate_roi(
            &repo(),
            30,
            &conflicts(45.0),
            &predictions(7, 0.78),
            &cycle_time(24.0),
            &RoiConfig::default(),
        );

        // 7 * 0.78 = 5.46
        assert_eq!(report.conflicts_avoided, 5);
        assert_close(report.time_saved_hours, 3.75);
    }

    #[test]
    fn test_missing_cycle_time_claims_no_cicd_savings() {
        let report = calculate_roi(
            &repo(),
            30,
            &conflicts(45.0),
            &predictions(100, 0.8),
            &EngineeringAverages::default(),
            &RoiConfig::default(),
        );

        assert_close(report.cicd_time_saved_hours, 0.0);
        assert_close(report.total_savings, 4500.0);
    }

    #[test]
    fn test_hourly_cost_comes_from_config() {
        let config = RoiConfig {
            hourly_cost: 100.0,
            ..RoiConfig::default()
        };

        let report = calculate_roi(
            &repo(),
            30,
            &conflicts(45.0),
            &predictions(100, 0.8),
            &cycle_time(12.0),
            &config,
        );

        assert_eq!(report.hourly_cost, 100.0);
        assert_close(report.cost_savings, 6000.0);
        assert_close(report.cicd_cost_savings, 2400.0);
    }

    #[test]
    fn test_calculation_is_deterministic() {
        let run = || {
            calculate_roi(
                &repo(),
                14,
                &conflicts(37.0),
                &predictions(53, 0.61),
                &cycle_time(17.5),
                &RoiConfig::default(),
            )
        };

        assert_eq!(run(), run());
        assert_eq!(
            serde_json::to_string(&run()).unwrap(),
            serde_json::to_string(&run()).unwrap()
        );
    }

    #[test]
    fn test_window_start_rejects_non_positive_days() {
        let now = Utc::now();
        assert!(matches!(
            window_start(now, 0),
            Err(ROILensError::InvalidInput(_))
        ));
        assert!(matches!(
            window_start(now, -7),
            Err(ROILensError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_window_start_rejects_overflow() {
        assert!(matches!(
            window_start(Utc::now(), i64::MAX),
            Err(ROILensError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_window_start_subtracts_days() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let since = window_start(now, 30).unwrap();
        assert_eq!(since, Utc.with_ymd_and_hms(2026, 9, 19, 12, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_compute_roi_from_raw_records() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let predicted_at = Utc.with_ymd_and_hms(2026, 10, 10, 12, 0, 0).unwrap();

        let mut predictions: Vec<_> = (0..8)
            .map(|_| PredictionRecord {
                predicted_at,
                was_correct: Some(true),
                prevented_failure: false,
            })
            .collect();
        predictions.extend((0..2).map(|_| PredictionRecord {
            predicted_at,
            was_correct: Some(false),
            prevented_failure: true,
        }));

        let samples = (1..=10)
            .map(|day| crate::models::EngineeringSample {
                date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
                cycle_time_hours: 12.0,
                lead_time_hours: 20.0,
                deploy_frequency: 1.0,
                code_review_minutes: 60.0,
                pr_merge_minutes: 120.0,
            })
            .collect();

        let records = RepositoryRecords {
            conflicts: vec![ConflictRecord {
                detected_at: predicted_at,
                resolved_at: Some(predicted_at + Duration::minutes(90)),
            }],
            predictions,
            samples,
        };

        let source = InMemoryMetricsSource::new(SummaryDefaults::default())
            .with_repository(repo(), records);

        let report = compute_roi_at(&source, &RoiConfig::default(), &repo(), 30, now)
            .await
            .unwrap();

        // 10 predictions at 80% accuracy, 90 minutes per conflict
        assert_eq!(report.conflicts_avoided, 8);
        assert_close(report.time_saved_hours, 12.0);
        assert_close(report.cost_savings, 900.0);
        assert_eq!(report.prevented_build_failures, 2);
        assert_close(report.cicd_time_saved_hours, 48.0);
        assert_close(report.total_savings, 2700.0);
    }

    #[tokio::test]
    async fn test_compute_roi_rejects_conflict_resolved_before_detection() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let detected_at = Utc.with_ymd_and_hms(2026, 10, 10, 12, 0, 0).unwrap();

        let records = RepositoryRecords {
            conflicts: vec![ConflictRecord {
                detected_at,
                resolved_at: Some(detected_at - Duration::minutes(600)),
            }],
            predictions: (0..10)
                .map(|_| PredictionRecord {
                    predicted_at: detected_at,
                    was_correct: Some(true),
                    prevented_failure: false,
                })
                .collect(),
            samples: Vec::new(),
        };

        let source = InMemoryMetricsSource::new(SummaryDefaults::default())
            .with_repository(repo(), records);

        let err = compute_roi_at(&source, &RoiConfig::default(), &repo(), 30, now)
            .await
            .unwrap_err();

        assert!(matches!(err, ROILensError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_compute_roi_with_no_activity_uses_defaults() {
        let source = InMemoryMetricsSource::new(SummaryDefaults::default());

        let report = compute_roi(&source, &RoiConfig::default(), &repo(), 30)
            .await
            .unwrap();

        assert_eq!(report.conflicts_avoided, 0);
        assert_eq!(report.avg_conflict_resolution_minutes, 45.0);
        assert_close(report.total_savings, 0.0);
        assert_close(report.projected_annual_savings, 0.0);
    }

    #[tokio::test]
    async fn test_compute_roi_propagates_source_failure() {
        let source =
            InMemoryMetricsSource::new(SummaryDefaults::default()).unavailable("timeout");

        let err = compute_roi(&source, &RoiConfig::default(), &repo(), 30)
            .await
            .unwrap_err();

        assert!(matches!(err, ROILensError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_compute_roi_validates_before_fetching() {
        // An unavailable source would fail the fetch; input validation must win.
        let source =
            InMemoryMetricsSource::new(SummaryDefaults::default()).unavailable("timeout");

        let err = compute_roi(&source, &RoiConfig::default(), &repo(), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, ROILensError::InvalidInput(_)));
    }
}
