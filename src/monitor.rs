//! Bounded in-process record of recently handled requests.
//!
//! The composition root owns a single [`RequestMonitor`] and hands it by
//! reference to whatever handles requests. Once full, the oldest sample is
//! dropped for every new one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSample {
    pub recorded_at: DateTime<Utc>,
    pub operation: String,
    pub repository_id: Option<String>,
    pub duration_ms: f64,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub total_requests: usize,
    pub error_count: usize,
    pub error_rate: f64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug)]
pub struct RequestMonitor {
    capacity: usize,
    samples: Mutex<VecDeque<RequestSample>>,
}

impl RequestMonitor {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record_sample(&self, sample: RequestSample) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);

        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Retained samples recorded at or after `since`, oldest first.
    pub fn query(&self, since: DateTime<Utc>) -> Vec<RequestSample> {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);

        samples
            .iter()
            .filter(|s| s.recorded_at >= since)
            .cloned()
            .collect()
    }

    pub fn snapshot_stats(&self) -> MonitorStats {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);

        let total_requests = samples.len();
        let error_count = samples.iter().filter(|s| !s.success).count();
        let total_duration: f64 = samples.iter().map(|s| s.duration_ms).sum();
        let max_duration_ms = samples.iter().map(|s| s.duration_ms).fold(0.0, f64::max);

        #[allow(clippy::cast_precision_loss)]
        let (error_rate, avg_duration_ms) = if total_requests == 0 {
            (0.0, 0.0)
        } else {
            (
                error_count as f64 / total_requests as f64,
                total_duration / total_requests as f64,
            )
        };

        MonitorStats {
            total_requests,
            error_count,
            error_rate,
            avg_duration_ms,
            max_duration_ms,
        }
    }
}

impl Default for RequestMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
