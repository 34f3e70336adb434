//! Pipeline metric recorders and in-memory run statistics
//!
//! Recorders go through the `metrics` facade (exported by Prometheus when a
//! recorder is installed); `PipelineMetricsAggregator` keeps a local summary
//! for the end-of-batch report.

use std::collections::BTreeMap;

use contracts::{ErrorCategory, SegmentationMetrics, TissueClass};
use metrics::{counter, gauge, histogram};

/// Record a job that reached `completed`
pub fn record_job_completed(metrics: &SegmentationMetrics, elapsed_ms: f64) {
    counter!("tumorseg_jobs_total", "status" => "completed").increment(1);
    histogram!("tumorseg_job_duration_ms").record(elapsed_ms);
    histogram!("tumorseg_total_volume_cm3").record(metrics.total_volume_cm3);
    gauge!("tumorseg_last_inference_units").set(metrics.inference_units as f64);
}

/// Record a job that reached `failed`
pub fn record_job_failed(category: ErrorCategory, elapsed_ms: f64) {
    counter!(
        "tumorseg_jobs_total",
        "status" => "failed",
        "category" => category.to_string()
    )
    .increment(1);
    histogram!("tumorseg_job_duration_ms").record(elapsed_ms);
}

/// Record a submission rejected before a job was created
pub fn record_input_rejected() {
    counter!("tumorseg_submissions_rejected_total").increment(1);
}

/// Record one stage's wall time
pub fn record_stage_latency_ms(stage: &'static str, latency_ms: f64) {
    histogram!("tumorseg_stage_latency_ms", "stage" => stage).record(latency_ms);
}

/// Record a lifecycle event handed to a sink
pub fn record_event_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "tumorseg_events_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a sink queue depth
pub fn record_queue_depth(sink_name: &str, depth: usize) {
    gauge!("tumorseg_sink_queue_depth", "sink" => sink_name.to_string()).set(depth as f64);
}

/// Batch-level aggregation of job outcomes
#[derive(Debug, Clone, Default)]
pub struct PipelineMetricsAggregator {
    pub completed: u64,
    pub failed: u64,
    /// Submissions rejected before job creation
    pub rejected: u64,
    pub failures_by_category: BTreeMap<ErrorCategory, u64>,
    pub duration_ms: RunningStats,
    pub total_volume_cm3: RunningStats,
    pub class_volume_cm3: BTreeMap<TissueClass, RunningStats>,
    pub inference_units: RunningStats,
}

impl PipelineMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(&mut self, metrics: &SegmentationMetrics, elapsed_ms: f64) {
        self.completed += 1;
        self.duration_ms.push(elapsed_ms);
        self.total_volume_cm3.push(metrics.total_volume_cm3);
        self.inference_units.push(metrics.inference_units as f64);
        for segment in &metrics.segments {
            self.class_volume_cm3
                .entry(segment.class)
                .or_default()
                .push(segment.volume_cm3);
        }
    }

    pub fn record_failed(&mut self, category: ErrorCategory, elapsed_ms: f64) {
        self.failed += 1;
        self.duration_ms.push(elapsed_ms);
        *self.failures_by_category.entry(category).or_insert(0) += 1;
    }

    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    pub fn summary(&self) -> MetricsSummary {
        let attempted = self.completed + self.failed;
        MetricsSummary {
            completed: self.completed,
            failed: self.failed,
            rejected: self.rejected,
            failure_rate: if attempted > 0 {
                self.failed as f64 / attempted as f64 * 100.0
            } else {
                0.0
            },
            failures_by_category: self.failures_by_category.clone(),
            duration_ms: StatsSummary::from(&self.duration_ms),
            total_volume_cm3: StatsSummary::from(&self.total_volume_cm3),
            class_volume_cm3: self
                .class_volume_cm3
                .iter()
                .map(|(class, stats)| (*class, StatsSummary::from(stats)))
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    /// Percentage of created jobs that failed
    pub failure_rate: f64,
    pub failures_by_category: BTreeMap<ErrorCategory, u64>,
    pub duration_ms: StatsSummary,
    pub total_volume_cm3: StatsSummary,
    pub class_volume_cm3: BTreeMap<TissueClass, StatsSummary>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Segmentation Run Summary ===")?;
        writeln!(f, "Completed jobs: {}", self.completed)?;
        writeln!(f, "Failed jobs: {} ({:.2}%)", self.failed, self.failure_rate)?;
        writeln!(f, "Rejected submissions: {}", self.rejected)?;
        for (category, count) in &self.failures_by_category {
            writeln!(f, "  {category}: {count}")?;
        }
        writeln!(f, "Job duration (ms): {}", self.duration_ms)?;
        writeln!(f, "Total volume (cm3): {}", self.total_volume_cm3)?;
        for (class, stats) in &self.class_volume_cm3 {
            writeln!(f, "  {class} (cm3): {stats}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean/variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
