//! SegmentationPipeline - drives one job from input volumes to a terminal state

use std::sync::Arc;
use std::time::{Duration, Instant};

use artifacts::{ArtifactStore, JobArtifacts};
use contracts::{
    Classifier, ClinicianId, ContractError, ErrorCategory, JobConfig, JobFailure, JobId,
    JobResult, JobStatus, Modality, NormalizedTensor, PatientId, PipelineBlueprint, SeriesId,
    VolumeRef,
};
use inference::InferenceOrchestrator;
use ingestion::{Normalizer, VolumeLoader};
use jobs::{JobService, JobStore, PatientDirectory};
use postprocess::{PostProcessor, Volumetrics};
use tracing::{error, info, info_span, instrument, warn, Instrument};

/// One submission: who it is for and where the series lives
#[derive(Debug, Clone)]
pub struct SegmentationRequest {
    pub patient_id: PatientId,
    pub clinician_id: ClinicianId,
    pub series_id: SeriesId,
    pub inputs: Vec<(Modality, VolumeRef)>,
}

/// A created job together with its model-ready input
#[derive(Debug)]
pub struct PreparedJob {
    job_id: JobId,
    patient_id: PatientId,
    clinician_id: ClinicianId,
    series_id: SeriesId,
    tensor: NormalizedTensor,
}

impl PreparedJob {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn tensor(&self) -> &NormalizedTensor {
        &self.tensor
    }
}

/// Terminal state reached by one run
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub elapsed: Duration,
    pub result: Result<JobResult, JobFailure>,
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self.result {
            Ok(_) => JobStatus::Completed,
            Err(_) => JobStatus::Failed,
        }
    }
}

pub struct SegmentationPipeline<C, S, P, A> {
    loader: Arc<VolumeLoader>,
    normalizer: Arc<Normalizer>,
    orchestrator: InferenceOrchestrator<C>,
    postprocessor: PostProcessor,
    volumetrics: Volumetrics,
    jobs: Arc<JobService<S, P>>,
    artifacts: A,
    job_config: JobConfig,
}

impl<C, S, P, A> SegmentationPipeline<C, S, P, A>
where
    C: Classifier + Sync,
    S: JobStore + Sync,
    P: PatientDirectory + Sync,
    A: ArtifactStore + Sync,
{
    /// Wire every stage from one blueprint
    pub fn new(
        blueprint: &PipelineBlueprint,
        loader: VolumeLoader,
        classifier: C,
        jobs: Arc<JobService<S, P>>,
        artifacts: A,
    ) -> Self {
        let job_config = blueprint.job_config(classifier.name());
        Self {
            loader: Arc::new(loader),
            normalizer: Arc::new(Normalizer::new(
                blueprint.normalization.clone(),
                blueprint.loader.modalities.clone(),
            )),
            orchestrator: InferenceOrchestrator::new(classifier, blueprint.inference.clone()),
            postprocessor: PostProcessor::new(blueprint.postprocess.clone()),
            volumetrics: Volumetrics::new(&blueprint.method, blueprint.postprocess.connectivity),
            jobs,
            artifacts,
            job_config,
        }
    }

    pub fn jobs(&self) -> &Arc<JobService<S, P>> {
        &self.jobs
    }

    pub fn job_config(&self) -> &JobConfig {
        &self.job_config
    }

    /// Load and normalize the series, then create the `pending` job.
    ///
    /// # Errors
    /// - `ContractError::Input` when the volumes are rejected; no job exists afterwards
    /// - `ContractError::Job` when ownership cannot be resolved
    #[instrument(
        name = "pipeline_prepare",
        skip_all,
        fields(patient = %request.patient_id, series = %request.series_id)
    )]
    pub async fn prepare(&self, request: SegmentationRequest) -> Result<PreparedJob, ContractError> {
        let started = Instant::now();
        let loader = Arc::clone(&self.loader);
        let normalizer = Arc::clone(&self.normalizer);
        let inputs = request.inputs;

        let loaded = tokio::task::spawn_blocking(move || {
            let volumes = loader.load(&inputs)?;
            normalizer.normalize(&volumes)
        })
        .await
        .map_err(|e| ContractError::Io(std::io::Error::other(e.to_string())))?;

        let tensor = match loaded {
            Ok(tensor) => tensor,
            Err(e) => {
                observability::record_input_rejected();
                warn!(error = %e, "input rejected");
                return Err(e.into());
            }
        };
        observability::record_stage_latency_ms("load", elapsed_ms(started));

        let job_id = self
            .jobs
            .create(
                request.patient_id.clone(),
                request.clinician_id.clone(),
                request.series_id.clone(),
                self.job_config.clone(),
            )
            .await?;

        Ok(PreparedJob {
            job_id,
            patient_id: request.patient_id,
            clinician_id: request.clinician_id,
            series_id: request.series_id,
            tensor,
        })
    }

    /// Run a prepared job to `completed` or `failed`.
    ///
    /// Stage failures become a `failed` job and an `Ok` outcome; `Err` is
    /// returned only when the job record itself cannot be updated. If the
    /// `completed` transition cannot be recorded, the job's artifact folder is
    /// removed and the job is failed with a storage category.
    pub async fn execute(&self, prepared: PreparedJob) -> Result<JobOutcome, ContractError> {
        let span = info_span!("segmentation_run", job_id = %prepared.job_id);
        self.execute_inner(prepared).instrument(span).await
    }

    /// `prepare` then `execute`
    pub async fn process(&self, request: SegmentationRequest) -> Result<JobOutcome, ContractError> {
        let prepared = self.prepare(request).await?;
        self.execute(prepared).await
    }

    /// Fail a job whose run was abandoned before a terminal transition,
    /// removing any artifacts it had already written or staged
    #[instrument(name = "pipeline_abandon", skip(self))]
    pub async fn abandon(&self, job_id: JobId) -> Result<(), ContractError> {
        let status = self.jobs.get_status(job_id).await?;
        if status == JobStatus::Pending {
            self.jobs.begin(job_id).await?;
        } else if status != JobStatus::Processing {
            return Ok(());
        }
        if let Err(e) = self.artifacts.discard(job_id).await {
            error!(error = %e, "failed to remove artifacts of abandoned run");
        }
        self.jobs
            .fail(
                job_id,
                JobFailure::new(ErrorCategory::Inference, "run cancelled before completion"),
            )
            .await?;
        warn!(job_id = %job_id, "run abandoned");
        Ok(())
    }

    async fn execute_inner(&self, prepared: PreparedJob) -> Result<JobOutcome, ContractError> {
        let started = Instant::now();
        let job_id = prepared.job_id;
        self.jobs.begin(job_id).await?;

        match self.analyze(&prepared).await {
            Ok(result) => {
                if let Err(e) = self.jobs.complete(job_id, result.clone()).await {
                    error!(error = %e, "completion not recorded, discarding artifacts");
                    if let Err(discard) = self.artifacts.discard(job_id).await {
                        error!(error = %discard, "failed to discard artifacts");
                    }
                    let failure = JobFailure::new(
                        ErrorCategory::Storage,
                        format!("completion not recorded: {e}"),
                    );
                    return self.fail_run(job_id, started, failure).await;
                }

                let elapsed = started.elapsed();
                observability::record_job_completed(&result.metrics, elapsed.as_secs_f64() * 1000.0);
                info!(
                    total_cm3 = result.metrics.total_volume_cm3,
                    segments = result.metrics.segments.len(),
                    folder = %result.artifacts.folder.display(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "job completed"
                );
                Ok(JobOutcome {
                    job_id,
                    elapsed,
                    result: Ok(result),
                })
            }
            Err(e) => {
                let category = e.category();
                if category == ErrorCategory::Internal {
                    error!(error = %e, "invariant violated, run aborted");
                } else {
                    warn!(error = %e, category = %category, "job failed");
                }
                self.fail_run(job_id, started, JobFailure::new(category, e.to_string()))
                    .await
            }
        }
    }

    async fn fail_run(
        &self,
        job_id: JobId,
        started: Instant,
        failure: JobFailure,
    ) -> Result<JobOutcome, ContractError> {
        let elapsed = started.elapsed();
        observability::record_job_failed(failure.category, elapsed.as_secs_f64() * 1000.0);
        self.jobs.fail(job_id, failure.clone()).await?;
        Ok(JobOutcome {
            job_id,
            elapsed,
            result: Err(failure),
        })
    }

    async fn analyze(&self, prepared: &PreparedJob) -> Result<JobResult, ContractError> {
        let stage = Instant::now();
        let output = self.orchestrator.run(&prepared.tensor).await?;
        observability::record_stage_latency_ms("inference", elapsed_ms(stage));

        let stage = Instant::now();
        let processed = self.postprocessor.process(&output.prediction)?;
        observability::record_stage_latency_ms("postprocess", elapsed_ms(stage));

        let stage = Instant::now();
        let metrics = self.volumetrics.measure(
            &processed.labels,
            self.orchestrator.classifier().name(),
            output.units,
        )?;
        observability::record_stage_latency_ms("volumetrics", elapsed_ms(stage));

        let stage = Instant::now();
        let artifacts = self
            .artifacts
            .persist(JobArtifacts {
                job_id: prepared.job_id,
                patient_id: &prepared.patient_id,
                clinician_id: &prepared.clinician_id,
                series_id: &prepared.series_id,
                labels: &processed.labels,
                metrics: &metrics,
            })
            .await?;
        observability::record_stage_latency_ms("artifacts", elapsed_ms(stage));

        Ok(JobResult { metrics, artifacts })
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
