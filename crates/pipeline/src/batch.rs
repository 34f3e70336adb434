//! Batch runner - many independent jobs with bounded concurrency

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use artifacts::ArtifactStore;
use contracts::{Classifier, ContractError, JobId, PatientId, SeriesId};
use futures::stream::{self, StreamExt};
use jobs::{JobStore, PatientDirectory};
use observability::PipelineMetricsAggregator;
use tracing::{error, info, instrument, warn};

use crate::runner::{JobOutcome, SegmentationPipeline, SegmentationRequest};

/// What happened to one submission
#[derive(Debug)]
pub struct BatchEntry {
    /// Position in the submitted batch
    pub index: usize,
    pub patient_id: PatientId,
    pub series_id: SeriesId,
    /// Set once the job record exists
    pub job_id: Option<JobId>,
    pub elapsed: Duration,
    pub result: Result<JobOutcome, ContractError>,
}

impl BatchEntry {
    /// Refused before a job was created
    pub fn is_rejected(&self) -> bool {
        self.job_id.is_none()
    }
}

/// Statistics from a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Finished submissions in submission order
    pub entries: Vec<BatchEntry>,
    pub metrics: PipelineMetricsAggregator,
    pub duration: Duration,
    /// Stopped by the shutdown signal
    pub cancelled: bool,
    /// Jobs failed because their run was cut short
    pub abandoned: Vec<JobId>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(&e.result, Ok(outcome) if outcome.result.is_ok()))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.is_rejected())
            .count()
            - self.completed()
    }

    pub fn rejected(&self) -> usize {
        self.entries.iter().filter(|e| e.is_rejected()).count()
    }

    /// Finished jobs per minute
    pub fn throughput(&self) -> f64 {
        let minutes = self.duration.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            (self.completed() + self.failed()) as f64 / minutes
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!();
        println!("Batch finished in {:.2}s", self.duration.as_secs_f64());
        if self.cancelled {
            println!("  cancelled: {} job(s) abandoned", self.abandoned.len());
        }
        println!();

        for entry in &self.entries {
            let job = entry
                .job_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            let status = match &entry.result {
                Ok(JobOutcome { result: Ok(r), .. }) => {
                    format!("completed  total {:.3} cm3", r.metrics.total_volume_cm3)
                }
                Ok(JobOutcome {
                    result: Err(failure),
                    ..
                }) => format!("failed     {}: {}", failure.category, failure.message),
                Err(e) if entry.is_rejected() => format!("rejected   {e}"),
                Err(e) => format!("error      {e}"),
            };
            println!(
                "  [{:>3}] {} / {}  job {}  {}",
                entry.index, entry.patient_id, entry.series_id, job, status
            );
        }

        println!();
        print!("{}", self.metrics.summary());
        println!("Throughput: {:.2} jobs/min", self.throughput());
        println!();
    }
}

/// Run every request, at most `max_concurrent` at a time, until all finish
/// or `shutdown` resolves.
///
/// On shutdown the unfinished runs are dropped and any job they had created
/// is failed with its artifacts removed, so no job is left `pending` or
/// `processing` and no artifact folder outlives an abandoned run.
#[instrument(name = "batch_run", skip_all, fields(requests = requests.len(), max_concurrent))]
pub async fn run_batch<C, S, P, A, F>(
    pipeline: &SegmentationPipeline<C, S, P, A>,
    requests: Vec<SegmentationRequest>,
    max_concurrent: usize,
    shutdown: F,
) -> BatchReport
where
    C: Classifier + Sync,
    S: JobStore + Sync,
    P: PatientDirectory + Sync,
    A: ArtifactStore + Sync,
    F: Future<Output = ()>,
{
    let started = Instant::now();
    let in_flight = Mutex::new(HashSet::new());
    let mut report = BatchReport::default();

    let mut runs = stream::iter(requests.into_iter().enumerate())
        .map(|(index, request)| run_one(pipeline, &in_flight, index, request))
        .buffer_unordered(max_concurrent.max(1));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("shutdown requested, abandoning unfinished runs");
                report.cancelled = true;
                break;
            }
            next = runs.next() => match next {
                Some(entry) => {
                    record(&mut report.metrics, &entry);
                    report.entries.push(entry);
                }
                None => break,
            },
        }
    }
    drop(runs);

    let mut abandoned: Vec<JobId> = lock(&in_flight).drain().collect();
    abandoned.sort();
    for job_id in &abandoned {
        if let Err(e) = pipeline.abandon(*job_id).await {
            error!(job_id = %job_id, error = %e, "failed to record abandoned run");
        }
    }
    report.abandoned = abandoned;

    report.entries.sort_by_key(|e| e.index);
    report.duration = started.elapsed();
    info!(
        completed = report.completed(),
        failed = report.failed(),
        rejected = report.rejected(),
        duration_secs = report.duration.as_secs_f64(),
        "batch finished"
    );
    report
}

async fn run_one<C, S, P, A>(
    pipeline: &SegmentationPipeline<C, S, P, A>,
    in_flight: &Mutex<HashSet<JobId>>,
    index: usize,
    request: SegmentationRequest,
) -> BatchEntry
where
    C: Classifier + Sync,
    S: JobStore + Sync,
    P: PatientDirectory + Sync,
    A: ArtifactStore + Sync,
{
    let started = Instant::now();
    let patient_id = request.patient_id.clone();
    let series_id = request.series_id.clone();

    let (job_id, result) = match pipeline.prepare(request).await {
        Ok(prepared) => {
            let job_id = prepared.job_id();
            lock(in_flight).insert(job_id);
            let result = pipeline.execute(prepared).await;
            lock(in_flight).remove(&job_id);
            (Some(job_id), result)
        }
        Err(e) => (None, Err(e)),
    };

    BatchEntry {
        index,
        patient_id,
        series_id,
        job_id,
        elapsed: started.elapsed(),
        result,
    }
}

fn record(metrics: &mut PipelineMetricsAggregator, entry: &BatchEntry) {
    let elapsed_ms = entry.elapsed.as_secs_f64() * 1000.0;
    match &entry.result {
        Ok(JobOutcome { result: Ok(r), .. }) => metrics.record_completed(&r.metrics, elapsed_ms),
        Ok(JobOutcome {
            result: Err(failure),
            ..
        }) => metrics.record_failed(failure.category, elapsed_ms),
        Err(_) if entry.is_rejected() => metrics.record_rejected(),
        Err(e) => metrics.record_failed(e.category(), elapsed_ms),
    }
}

fn lock(set: &Mutex<HashSet<JobId>>) -> MutexGuard<'_, HashSet<JobId>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
