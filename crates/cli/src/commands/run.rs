//! `run` command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use artifacts::FsArtifactStore;
use contracts::PipelineBlueprint;
use inference::BuiltinClassifier;
use ingestion::{FsVolumeStore, VolumeLoader};
use jobs::{
    FileJobStore, FilePatientDirectory, JobService, JobStore, MemoryJobStore,
    MemoryPatientDirectory, PatientDirectory,
};
use pipeline::{run_batch, BatchReport, SegmentationPipeline};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::context::load_blueprint;
use crate::manifest::Manifest;

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");
    let mut blueprint = load_blueprint(&args.config)?;

    // Apply CLI overrides
    if let Some(ref dir) = args.output_dir {
        info!(output_dir = %dir.display(), "Overriding artifact output directory from CLI");
        blueprint.artifacts.output_dir = dir.clone();
    }
    if let Some(ref dir) = args.store_dir {
        info!(store_dir = %dir.display(), "Overriding job record directory from CLI");
        blueprint.jobs.store_dir = Some(dir.clone());
    }

    let manifest = Manifest::load(&args.manifest)?;
    manifest.check()?;

    info!(
        modalities = ?blueprint.loader.modalities,
        classifier = ?blueprint.classifier.kind,
        patients = manifest.patients.len(),
        jobs = manifest.jobs.len(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration and manifest are valid, exiting");
        print_plan(&blueprint, &manifest);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let classifier =
        BuiltinClassifier::from_config(&blueprint.classifier, blueprint.loader.modalities.len())
            .await
            .context("Failed to initialize classifier")?;

    let report = match blueprint.jobs.store_dir.clone() {
        Some(dir) => {
            info!(store_dir = %dir.display(), "Using file job store");
            run_with(
                FileJobStore::new(&dir),
                FilePatientDirectory::new(&dir),
                &blueprint,
                &manifest,
                classifier,
                args,
            )
            .await?
        }
        None => {
            warn!("jobs.store_dir not set - job records are kept in memory only");
            run_with(
                MemoryJobStore::new(),
                MemoryPatientDirectory::new(),
                &blueprint,
                &manifest,
                classifier,
                args,
            )
            .await?
        }
    };

    report.print_summary();

    let unfinished = report.failed() + report.rejected();
    if report.cancelled {
        anyhow::bail!(
            "Batch interrupted: {} job(s) abandoned, {} submission(s) never finished",
            report.abandoned.len(),
            manifest.jobs.len() - report.entries.len()
        );
    }
    if unfinished > 0 {
        anyhow::bail!(
            "{} of {} submission(s) did not complete",
            unfinished,
            report.entries.len()
        );
    }

    info!("tumorseg finished");
    Ok(())
}

async fn run_with<S, P>(
    store: S,
    patients: P,
    blueprint: &PipelineBlueprint,
    manifest: &Manifest,
    classifier: BuiltinClassifier,
    args: &RunArgs,
) -> Result<BatchReport>
where
    S: JobStore + Sync,
    P: PatientDirectory + Sync,
{
    for patient in manifest.patients() {
        patients
            .upsert_patient(patient)
            .await
            .context("Failed to register patient")?;
    }

    // Job events -> sinks
    let (event_tx, event_rx) = mpsc::channel(args.buffer_size);
    if blueprint.sinks.is_empty() {
        warn!("No sinks configured - job events will be dropped");
    }
    let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), event_rx)
        .await
        .context("Failed to create dispatcher")?;
    let dispatcher_handle = dispatcher.spawn();

    let jobs = Arc::new(JobService::new(store, patients).with_events(event_tx));
    let volume_store = FsVolumeStore::new(&blueprint.loader.storage_root);
    let loader = VolumeLoader::new(
        Arc::new(volume_store),
        blueprint.loader.spacing_tolerance_mm,
    );
    let pipeline = SegmentationPipeline::new(
        blueprint,
        loader,
        classifier,
        jobs,
        FsArtifactStore::new(blueprint.artifacts.clone()),
    );

    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    let requests = manifest.requests(&blueprint.loader.modalities);

    info!(
        jobs = requests.len(),
        max_concurrent = args.max_concurrent_jobs,
        "Starting batch..."
    );
    let report = run_batch(
        &pipeline,
        requests,
        args.max_concurrent_jobs,
        shutdown_signal(timeout),
    )
    .await;

    // last event sender goes away with the pipeline
    drop(pipeline);
    match tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await {
        Ok(Ok(snapshots)) => {
            for (sink, snapshot) in snapshots {
                info!(sink = %sink, metrics = %snapshot, "Sink closed");
            }
        }
        Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
        Err(_) => warn!("Dispatcher did not drain within 5s"),
    }

    Ok(report)
}

/// Resolves on Ctrl+C, SIGTERM or when the batch timeout elapses
async fn shutdown_signal(timeout: Option<Duration>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, stopping batch..."),
        _ = terminate => warn!("Received SIGTERM, stopping batch..."),
        _ = deadline => warn!("Batch timeout reached, stopping batch..."),
    }
}

/// Print the batch plan for dry-run mode
fn print_plan(blueprint: &PipelineBlueprint, manifest: &Manifest) {
    println!("\n=== Batch Plan ===\n");
    println!("Modalities: {:?}", blueprint.loader.modalities);
    println!("Storage root: {}", blueprint.loader.storage_root.display());
    println!("Classifier: {:?}", blueprint.classifier.kind);
    println!("Window: {:?}", blueprint.inference.window);
    println!("Output: {}", blueprint.artifacts.output_dir.display());

    println!("\nPatients ({}):", manifest.patients.len());
    for patient in &manifest.patients {
        match &patient.clinician {
            Some(clinician) => println!("  - {} (clinician {})", patient.id, clinician),
            None => println!("  - {} (unassigned)", patient.id),
        }
    }

    println!("\nJobs ({}):", manifest.jobs.len());
    for job in &manifest.jobs {
        let source = if job.volumes.is_empty() {
            "store".to_string()
        } else {
            format!("{} file(s)", job.volumes.len())
        };
        println!(
            "  - {} / {} by {} [{}]",
            job.patient, job.series, job.clinician, source
        );
    }
    println!();
}
