use log::{debug, info};

use crate::config::RoiConfig;
use crate::error::Result;
use crate::models::{Bottleneck, BottleneckKind, EngineeringSample, Impact, RepositoryId};
use crate::source::MetricsSource;

/// Review time, in hours, considered acceptable before a PR counts as waiting.
const ACCEPTABLE_REVIEW_HOURS: f64 = 2.0;

/// Means over the sample window.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleAverages {
    pub sample_count: usize,
    pub code_review_minutes: f64,
    pub cycle_time_hours: f64,
    pub pr_merge_minutes: f64,
}

impl SampleAverages {
    /// `None` for an empty window.
    pub fn from_samples(samples: &[EngineeringSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let count = samples.len() as f64;
        let mean = |field: fn(&EngineeringSample) -> f64| {
            samples.iter().map(field).sum::<f64>() / count
        };

        Some(Self {
            sample_count: samples.len(),
            code_review_minutes: mean(|s| s.code_review_minutes),
            cycle_time_hours: mean(|s| s.cycle_time_hours),
            pr_merge_minutes: mean(|s| s.pr_merge_minutes),
        })
    }
}

pub async fn detect_bottlenecks<S: MetricsSource + ?Sized>(
    source: &S,
    config: &RoiConfig,
    repository: &RepositoryId,
) -> Result<Vec<Bottleneck>> {
    let samples = source
        .recent_engineering_samples(repository, config.sample_window)
        .await?;

    let Some(averages) = SampleAverages::from_samples(&samples) else {
        info!("No engineering samples for {repository}, skipping bottleneck detection");
        return Ok(vec![]);
    };

    debug!(
        "Averages over {} samples for {repository}: review {:.1} min, cycle {:.1} h, merge {:.1} min",
        averages.sample_count,
        averages.code_review_minutes,
        averages.cycle_time_hours,
        averages.pr_merge_minutes
    );

    let bottlenecks = evaluate_bottlenecks(&averages, config);

    info!(
        "Detected {} bottlenecks for {repository} from {} samples",
        bottlenecks.len(),
        averages.sample_count
    );

    Ok(bottlenecks)
}

/// Apply every rule to the averages. Findings keep rule order.
pub fn evaluate_bottlenecks(averages: &SampleAverages, config: &RoiConfig) -> Vec<Bottleneck> {
    [
        long_pr_review(averages, config),
        merge_conflicts(config),
        slow_ci(averages, config),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn long_pr_review(averages: &SampleAverages, config: &RoiConfig) -> Option<Bottleneck> {
    let minutes = averages.code_review_minutes;
    if minutes <= config.thresholds.review_minutes {
        return None;
    }

    let impact = if minutes > config.thresholds.review_minutes_high {
        Impact::High
    } else {
        Impact::Medium
    };

    let hours = minutes / 60.0;
    let estimated_cost =
        (hours - ACCEPTABLE_REVIEW_HOURS) * config.hourly_cost * config.rates.prs_per_week;

    Some(Bottleneck {
        kind: BottleneckKind::LongPrReview,
        description: format!("Pull requests wait {hours:.1} hours on average for review"),
        impact,
        estimated_cost,
        recommendation: "Set a review SLA, rotate reviewers, and keep pull requests small"
            .to_string(),
    })
}

fn merge_conflicts(config: &RoiConfig) -> Option<Bottleneck> {
    let rates = &config.rates;
    if rates.conflict_rate <= config.thresholds.conflict_rate {
        return None;
    }

    let impact = if rates.conflict_rate > config.thresholds.conflict_rate_high {
        Impact::High
    } else {
        Impact::Medium
    };

    let estimated_cost = rates.conflict_rate
        * rates.prs_per_week
        * (rates.avg_conflict_resolution_minutes / 60.0)
        * config.hourly_cost;

    Some(Bottleneck {
        kind: BottleneckKind::MergeConflicts,
        description: format!(
            "{:.0}% of pull requests run into merge conflicts",
            rates.conflict_rate * 100.0
        ),
        impact,
        estimated_cost,
        recommendation:
            "Merge from the main branch more often and act on conflict predictions early"
                .to_string(),
    })
}

fn slow_ci(averages: &SampleAverages, config: &RoiConfig) -> Option<Bottleneck> {
    let hours = averages.cycle_time_hours;
    if hours <= config.thresholds.cycle_time_hours {
        return None;
    }

    let baseline = config.baseline_cycle_time_hours;
    let estimated_cost =
        ((hours - baseline) / baseline) * config.hourly_cost * config.rates.prs_per_week;

    Some(Bottleneck {
        kind: BottleneckKind::SlowCi,
        description: format!("Changes take {hours:.1} hours on average to reach production"),
        impact: Impact::High,
        estimated_cost,
        recommendation: "Parallelize the pipeline, cache dependencies, and split slow test suites"
            .to_string(),
    })
}
