//! `job` command implementation.

use anyhow::{Context, Result};
use contracts::ClinicianId;
use jobs::SegmentationJob;
use serde::Serialize;
use tracing::info;

use crate::cli::{JobArgs, JobCommand};
use crate::context::{parse_job_id, parse_status, record_dir, record_service};

/// One row of `job list` / `job status`
#[derive(Serialize)]
struct JobSummary<'a> {
    job_id: String,
    patient_id: &'a str,
    clinician_id: &'a str,
    series_id: &'a str,
    status: &'static str,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_volume_cm3: Option<f64>,
}

impl<'a> From<&'a SegmentationJob> for JobSummary<'a> {
    fn from(job: &'a SegmentationJob) -> Self {
        Self {
            job_id: job.id().to_string(),
            patient_id: job.patient_id().as_str(),
            clinician_id: job.clinician_id().as_str(),
            series_id: job.series_id().as_str(),
            status: job.status().as_str(),
            created_at: job.created_at().to_rfc3339(),
            finished_at: job.finished_at().map(|t| t.to_rfc3339()),
            failure: job
                .failure()
                .map(|f| format!("{}: {}", f.category, f.message)),
            total_volume_cm3: job.result().map(|r| r.metrics.total_volume_cm3),
        }
    }
}

/// Execute the `job` command
pub async fn run_job(args: &JobArgs) -> Result<()> {
    let dir = record_dir(&args.config, args.store_dir.as_deref())?;
    let service = record_service(&dir);

    match &args.command {
        JobCommand::Status { job_id } => {
            let job = service.get_job(parse_job_id(job_id)?).await?;
            let summary = JobSummary::from(&job);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_job(&summary);
            }
        }
        JobCommand::Result { job_id } => {
            let result = service.get_result(parse_job_id(job_id)?).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Artifacts: {}", result.artifacts.folder.display());
                for segment in &result.metrics.segments {
                    println!(
                        "  {:<18} {:>7} voxels  {:>9.3} cm3",
                        segment.name, segment.voxel_count, segment.volume_cm3
                    );
                }
                for region in &result.metrics.regions {
                    println!("  [{}] {:.3} cm3", region.name, region.volume_cm3);
                }
                println!("  total {:.3} cm3", result.metrics.total_volume_cm3);
            }
        }
        JobCommand::Validate { job_id, clinician } => {
            let id = parse_job_id(job_id)?;
            let clinician = ClinicianId::from(clinician.as_str());
            service
                .validate(id, &clinician)
                .await
                .with_context(|| format!("Failed to validate job {id}"))?;
            info!(job_id = %id, clinician = %clinician, "Job validated");
            println!("Job {id} validated by {clinician}");
        }
        JobCommand::List { status } => {
            let filter = status.as_deref().map(parse_status).transpose()?;
            let jobs = service.list_jobs(filter).await?;
            let summaries: Vec<JobSummary<'_>> = jobs.iter().map(JobSummary::from).collect();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for summary in &summaries {
                    println!(
                        "{}  {:<10}  {} / {}  ({})",
                        summary.job_id,
                        summary.status,
                        summary.patient_id,
                        summary.series_id,
                        summary.clinician_id
                    );
                }
                println!("{} job(s)", summaries.len());
            }
        }
    }

    Ok(())
}

fn print_job(summary: &JobSummary<'_>) {
    println!("Job {}", summary.job_id);
    println!("  status:    {}", summary.status);
    println!("  patient:   {}", summary.patient_id);
    println!("  clinician: {}", summary.clinician_id);
    println!("  series:    {}", summary.series_id);
    println!("  created:   {}", summary.created_at);
    if let Some(ref finished) = summary.finished_at {
        println!("  finished:  {finished}");
    }
    if let Some(ref failure) = summary.failure {
        println!("  failure:   {failure}");
    }
    if let Some(total) = summary.total_volume_cm3 {
        println!("  total:     {total:.3} cm3");
    }
}
