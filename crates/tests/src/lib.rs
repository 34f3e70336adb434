//! Cross-crate tests
//!
//! Drives the whole segmentation path: config → volumes → inference →
//! post-processing → artifacts → job records → event sinks.

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        ClassifierKind, CombinationRule, Connectivity, JobStatus, SinkType, WindowSpec,
    };

    const FULL_CONFIG: &str = r#"
method = "tumorseg-e2e"

[loader]
modalities = ["t1"]

[normalization]
lower_percentile = 0.0
upper_percentile = 100.0

[inference]
max_retries = 0

[inference.window]
mode = "patch"
size = [3, 3, 3]
stride = [2, 2, 2]

[inference.combination]
rule = "max"

[classifier]
kind = "threshold"
params = { channel = "0", enhancing_tissue = "0.5" }

[postprocess]
min_component_voxels = 0
connectivity = "full"

[[sinks]]
name = "events"
sink_type = "log"
"#;

    #[test]
    fn test_full_config_parses() {
        let blueprint = ConfigLoader::load_from_str(FULL_CONFIG, ConfigFormat::Toml).unwrap();

        assert_eq!(blueprint.method, "tumorseg-e2e");
        assert_eq!(blueprint.loader.modalities.len(), 1);
        assert_eq!(
            blueprint.inference.window,
            WindowSpec::Patch {
                size: [3, 3, 3],
                stride: [2, 2, 2]
            }
        );
        assert_eq!(blueprint.inference.combination, CombinationRule::Max);
        assert_eq!(blueprint.classifier.kind, ClassifierKind::Threshold);
        assert_eq!(blueprint.postprocess.connectivity, Connectivity::Full);
        assert_eq!(blueprint.sinks.len(), 1);
        assert_eq!(blueprint.sinks[0].sink_type, SinkType::Log);
    }

    #[test]
    fn test_json_export_reloads() {
        let blueprint = ConfigLoader::load_from_str(FULL_CONFIG, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&blueprint).unwrap();
        let reloaded = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();

        assert_eq!(reloaded.inference.window, blueprint.inference.window);
        assert_eq!(
            reloaded.job_config("threshold"),
            blueprint.job_config("threshold")
        );
    }

    #[test]
    fn test_status_names_are_stable() {
        let names: Vec<&str> = JobStatus::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["pending", "processing", "completed", "failed", "validated"]
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use artifacts::FsArtifactStore;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        ArtifactConfig, Classifier, ClassifierError, ErrorCategory, ImagingVolume, InferenceUnit,
        JobError, JobEvent, JobStatus, Patient, PipelineBlueprint, Spacing, SubRegion,
        TissueClass, VolumeKey, VolumeRef,
    };
    use inference::{BuiltinClassifier, ThresholdClassifier};
    use ingestion::{nifti, FsVolumeStore, PhantomConfig, VolumeLoader};
    use jobs::{
        FileJobStore, FilePatientDirectory, JobService, JobStore, MemoryJobStore,
        MemoryPatientDirectory, PatientDirectory,
    };
    use ndarray::{Array3, Array4};
    use pipeline::{run_batch, SegmentationPipeline, SegmentationRequest};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    /// Marks every voxel of channel 0 above 0.5 as enhancing tissue
    struct BlockClassifier;

    impl Classifier for BlockClassifier {
        fn name(&self) -> &str {
            "block"
        }

        fn num_classes(&self) -> usize {
            TissueClass::COUNT
        }

        fn input_channels(&self) -> usize {
            1
        }

        async fn classify(&self, unit: &InferenceUnit) -> Result<Array4<f32>, ClassifierError> {
            let [x, y, z] = unit.spatial_shape();
            let mut scores = Array4::zeros((TissueClass::COUNT, x, y, z));
            for ((c, i, j, k), value) in unit.data.indexed_iter() {
                if c != 0 {
                    continue;
                }
                let class = if *value > 0.5 {
                    TissueClass::EnhancingTissue
                } else {
                    TissueClass::Background
                };
                scores[[class.id() as usize, i, j, k]] = 1.0;
            }
            Ok(scores)
        }
    }

    /// Always fails
    struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn name(&self) -> &str {
            "broken"
        }

        fn num_classes(&self) -> usize {
            TissueClass::COUNT
        }

        fn input_channels(&self) -> usize {
            1
        }

        async fn classify(&self, _unit: &InferenceUnit) -> Result<Array4<f32>, ClassifierError> {
            Err(ClassifierError::Backend("model crashed".into()))
        }
    }

    fn blueprint(root: &Path) -> PipelineBlueprint {
        let mut blueprint = PipelineBlueprint::for_modalities(["t1"]);
        blueprint.normalization.lower_percentile = 0.0;
        blueprint.normalization.upper_percentile = 100.0;
        blueprint.inference.max_retries = 0;
        blueprint.postprocess.min_component_voxels = 0;
        blueprint.artifacts = ArtifactConfig {
            output_dir: root.join("output"),
            ..ArtifactConfig::default()
        };
        blueprint
    }

    fn memory_jobs() -> Arc<JobService<MemoryJobStore, MemoryPatientDirectory>> {
        let patients = MemoryPatientDirectory::with_patients([
            Patient::new("p1", Some("dr-a".into())),
            Patient::new("p2", Some("dr-a".into())),
        ]);
        Arc::new(JobService::new(MemoryJobStore::new(), patients))
    }

    /// 4x4x4 volume with `bright` voxels set to 1.0, written as a plain NIfTI file
    fn write_series(dir: &Path, name: &str, spacing: Spacing, bright: &[[usize; 3]]) -> VolumeRef {
        let mut data = Array3::<f32>::zeros((4, 4, 4));
        for &[x, y, z] in bright {
            data[[x, y, z]] = 1.0;
        }
        let path = dir.join(format!("{name}.nii"));
        nifti::write_volume(&path, &ImagingVolume::new("t1", data, spacing)).unwrap();
        VolumeRef::Path(path)
    }

    fn block() -> Vec<[usize; 3]> {
        let mut voxels = Vec::new();
        for x in 1..3 {
            for y in 1..3 {
                for z in 1..3 {
                    voxels.push([x, y, z]);
                }
            }
        }
        voxels
    }

    fn request(patient: &str, series: &str, input: VolumeRef) -> SegmentationRequest {
        SegmentationRequest {
            patient_id: patient.into(),
            clinician_id: "dr-a".into(),
            series_id: series.into(),
            inputs: vec![("t1".into(), input)],
        }
    }

    fn loader() -> VolumeLoader {
        VolumeLoader::paths_only(1e-3)
    }

    #[tokio::test]
    async fn test_block_volume_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = blueprint(dir.path());
        let input = write_series(dir.path(), "block", Spacing::UNIT, &block());

        let pipeline = SegmentationPipeline::new(
            &blueprint,
            loader(),
            BlockClassifier,
            memory_jobs(),
            FsArtifactStore::new(blueprint.artifacts.clone()),
        );
        let outcome = pipeline.process(request("p1", "s1", input)).await.unwrap();
        assert_eq!(outcome.status(), JobStatus::Completed);

        let result = outcome.result.unwrap();
        assert_eq!(result.metrics.segments.len(), 1);
        let enhancing = result.metrics.segment(TissueClass::EnhancingTissue).unwrap();
        assert_eq!(enhancing.voxel_count, 8);
        assert_eq!(enhancing.component_count, 1);
        assert!((enhancing.volume_cm3 - 0.008).abs() < 1e-12);
        assert!(result.metrics.segment(TissueClass::NecroticCore).is_none());
        assert!(result.metrics.segment(TissueClass::PeritumoralEdema).is_none());
        let core = result.metrics.region(SubRegion::TumorCore).unwrap();
        assert!((core.volume_cm3 - 0.008).abs() < 1e-12);

        let mask = nifti::read_labels(&result.artifacts.mask).unwrap();
        assert_eq!(mask.shape(), [4, 4, 4]);
        assert_eq!(mask.histogram()[TissueClass::EnhancingTissue.id() as usize], 8);
        assert_eq!(mask.labels[[1, 1, 1]], TissueClass::EnhancingTissue.id());
        assert_eq!(mask.labels[[0, 0, 0]], TissueClass::Background.id());

        let document: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&result.artifacts.metrics).unwrap()).unwrap();
        assert_eq!(document["job_id"], outcome.job_id.to_string());
        assert_eq!(document["patient_id"], "p1");
    }

    #[tokio::test]
    async fn test_window_modes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_series(dir.path(), "block", Spacing::UNIT, &block());

        let toml = format!(
            r#"
[loader]
modalities = ["t1"]

[normalization]
lower_percentile = 0.0
upper_percentile = 100.0

[inference.window]
mode = "patch"
size = [3, 3, 3]
stride = [2, 2, 2]

[postprocess]
min_component_voxels = 0

[artifacts]
output_dir = "{}"
"#,
            dir.path().join("patched").display()
        );
        let patched = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        let whole = blueprint(dir.path());

        let mut volumes = Vec::new();
        for blueprint in [&whole, &patched] {
            let pipeline = SegmentationPipeline::new(
                blueprint,
                loader(),
                BlockClassifier,
                memory_jobs(),
                FsArtifactStore::new(blueprint.artifacts.clone()),
            );
            let outcome = pipeline
                .process(request("p1", "s1", input.clone()))
                .await
                .unwrap();
            let result = outcome.result.unwrap();
            volumes.push((result.metrics.total_volume_cm3, result.metrics.inference_units));
        }

        assert_eq!(volumes[0].0, volumes[1].0);
        assert_eq!(volumes[0].1, 1);
        assert!(volumes[1].1 > 1);
    }

    #[tokio::test]
    async fn test_statistics_average_across_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = blueprint(dir.path());
        // 1 cm3 voxels
        let spacing = Spacing::new(10.0, 10.0, 10.0);
        let small = write_series(dir.path(), "small", spacing, &[[0, 0, 0], [0, 0, 1]]);
        let large = write_series(
            dir.path(),
            "large",
            spacing,
            &[[2, 2, 0], [2, 2, 1], [2, 3, 0], [2, 3, 1]],
        );

        let jobs = memory_jobs();
        let pipeline = SegmentationPipeline::new(
            &blueprint,
            loader(),
            BlockClassifier,
            jobs.clone(),
            FsArtifactStore::new(blueprint.artifacts.clone()),
        );
        let first = pipeline.process(request("p1", "s1", small)).await.unwrap();
        let second = pipeline.process(request("p2", "s1", large)).await.unwrap();
        assert_eq!(first.status(), JobStatus::Completed);
        assert_eq!(second.status(), JobStatus::Completed);

        jobs.validate(first.job_id, &"dr-a".into()).await.unwrap();

        let stats = jobs.get_statistics(&"dr-a".into()).await.unwrap();
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.counts_by_status[&JobStatus::Completed], 1);
        assert_eq!(stats.counts_by_status[&JobStatus::Validated], 1);
        let enhancing = &stats.per_class[&TissueClass::EnhancingTissue];
        assert_eq!(enhancing.jobs, 2);
        assert_eq!(enhancing.mean_cm3, 3.0);
        assert_eq!(enhancing.min_cm3, 2.0);
        assert_eq!(enhancing.max_cm3, 4.0);
        assert_eq!(stats.mean_total_volume_cm3, Some(3.0));
        assert!(!stats.per_class.contains_key(&TissueClass::NecroticCore));
        assert!(stats.excluded.is_empty());
    }

    #[tokio::test]
    async fn test_reassigned_patient_excluded_from_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = blueprint(dir.path());
        let input = write_series(dir.path(), "block", Spacing::UNIT, &block());

        let jobs = memory_jobs();
        let pipeline = SegmentationPipeline::new(
            &blueprint,
            loader(),
            BlockClassifier,
            jobs.clone(),
            FsArtifactStore::new(blueprint.artifacts.clone()),
        );
        let outcome = pipeline.process(request("p1", "s1", input)).await.unwrap();

        jobs.patients()
            .upsert_patient(Patient::new("p1", Some("dr-b".into())))
            .await
            .unwrap();

        let stats = jobs.get_statistics(&"dr-b".into()).await.unwrap();
        assert_eq!(stats.total_jobs, 0);
        assert!(stats.per_class.is_empty());
        assert_eq!(stats.excluded.len(), 1);
        assert_eq!(stats.excluded[0].job_id, Some(outcome.job_id));

        let previous = jobs.get_statistics(&"dr-a".into()).await.unwrap();
        assert_eq!(previous.total_jobs, 0);
    }

    #[tokio::test]
    async fn test_validate_flow() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = blueprint(dir.path());
        let input = write_series(dir.path(), "block", Spacing::UNIT, &block());

        let jobs = memory_jobs();
        let pipeline = SegmentationPipeline::new(
            &blueprint,
            loader(),
            BlockClassifier,
            jobs.clone(),
            FsArtifactStore::new(blueprint.artifacts.clone()),
        );

        let prepared = pipeline.prepare(request("p1", "s1", input)).await.unwrap();
        let job_id = prepared.job_id();
        assert_eq!(jobs.get_status(job_id).await.unwrap(), JobStatus::Pending);
        assert!(matches!(
            jobs.validate(job_id, &"dr-a".into()).await.unwrap_err(),
            JobError::WrongState { .. }
        ));

        pipeline.execute(prepared).await.unwrap();
        assert!(matches!(
            jobs.validate(job_id, &"dr-b".into()).await.unwrap_err(),
            JobError::NotOwner { .. }
        ));
        assert_eq!(jobs.get_status(job_id).await.unwrap(), JobStatus::Completed);

        jobs.validate(job_id, &"dr-a".into()).await.unwrap();
        assert_eq!(jobs.get_status(job_id).await.unwrap(), JobStatus::Validated);
        assert!(matches!(
            jobs.validate(job_id, &"dr-a".into()).await.unwrap_err(),
            JobError::WrongState { .. }
        ));
        let result = jobs.get_result(job_id).await.unwrap();
        assert!(result.artifacts.mask.exists());
    }

    #[tokio::test]
    async fn test_classifier_failure_marks_job_failed() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = blueprint(dir.path());
        let input = write_series(dir.path(), "block", Spacing::UNIT, &block());

        let jobs = memory_jobs();
        let pipeline = SegmentationPipeline::new(
            &blueprint,
            loader(),
            BrokenClassifier,
            jobs.clone(),
            FsArtifactStore::new(blueprint.artifacts.clone()),
        );
        let outcome = pipeline.process(request("p1", "s1", input)).await.unwrap();
        assert_eq!(outcome.status(), JobStatus::Failed);

        let job = jobs.get_job(outcome.job_id).await.unwrap();
        let failure = job.failure().unwrap();
        assert_eq!(failure.category, ErrorCategory::Inference);
        assert!(!failure.message.contains('\n'));
        assert!(job.result().is_none());
        assert!(matches!(
            jobs.get_result(outcome.job_id).await.unwrap_err(),
            JobError::NotReady {
                status: JobStatus::Failed,
                ..
            }
        ));
        assert!(!blueprint
            .artifacts
            .output_dir
            .join(outcome.job_id.to_string())
            .exists());
    }

    #[tokio::test]
    async fn test_phantom_batch_with_file_records_and_sink() {
        let dir = tempfile::tempdir().unwrap();
        let events_path = dir.path().join("events.jsonl");
        let toml = format!(
            r#"
[loader]
modalities = ["t1", "t1ce", "t2", "flair"]
storage_root = "{root}/volumes"

[classifier]
kind = "threshold"

[artifacts]
output_dir = "{root}/output"

[jobs]
store_dir = "{root}/records"

[[sinks]]
name = "events"
sink_type = "file"
params = {{ path = "{events}" }}

[[sinks]]
name = "log"
sink_type = "log"
"#,
            root = dir.path().display(),
            events = events_path.display()
        );
        let blueprint = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();

        let store = FsVolumeStore::new(&blueprint.loader.storage_root);
        let phantom = PhantomConfig {
            shape: [16, 16, 16],
            necrotic_radius_mm: 2.0,
            enhancing_radius_mm: 4.0,
            edema_radius_mm: 6.0,
            ..PhantomConfig::default()
        }
        .generate();
        let mut requests = Vec::new();
        for patient in ["p1", "p2"] {
            let inputs = phantom
                .write_to(&store, &patient.into(), &"s1".into())
                .unwrap();
            requests.push(SegmentationRequest {
                patient_id: patient.into(),
                clinician_id: "dr-a".into(),
                series_id: "s1".into(),
                inputs,
            });
        }

        let records = blueprint.jobs.store_dir.clone().unwrap();
        let patients = FilePatientDirectory::new(&records);
        for patient in ["p1", "p2"] {
            patients
                .upsert_patient(Patient::new(patient, Some("dr-a".into())))
                .await
                .unwrap();
        }

        let (tx, rx) = mpsc::channel::<JobEvent>(64);
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), rx)
            .await
            .unwrap();
        let dispatcher_handle = dispatcher.spawn();

        let jobs = Arc::new(
            JobService::new(FileJobStore::new(&records), patients).with_events(tx),
        );
        let classifier = BuiltinClassifier::from_config(&blueprint.classifier, 4)
            .await
            .unwrap();
        let pipeline = SegmentationPipeline::new(
            &blueprint,
            VolumeLoader::new(Arc::new(store), blueprint.loader.spacing_tolerance_mm),
            classifier,
            jobs.clone(),
            FsArtifactStore::new(blueprint.artifacts.clone()),
        );

        let report = run_batch(&pipeline, requests, 2, std::future::pending()).await;
        assert_eq!(report.completed(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.rejected(), 0);

        // Identical inputs, identical measurements
        let totals: Vec<f64> = report
            .entries
            .iter()
            .map(|e| {
                let outcome = e.result.as_ref().unwrap();
                outcome.result.as_ref().unwrap().metrics.total_volume_cm3
            })
            .collect();
        assert_eq!(totals[0], totals[1]);

        // Records survive a fresh store over the same directory
        let reopened = FileJobStore::new(&records);
        let listed = reopened.list().await.unwrap().jobs;
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|j| j.status() == JobStatus::Completed));
        for job in &listed {
            let result = job.result().unwrap();
            let mask = nifti::read_labels(&result.artifacts.mask).unwrap();
            assert_eq!(mask.shape(), [16, 16, 16]);
            let counted: u64 = result.metrics.segments.iter().map(|s| s.voxel_count).sum();
            let foreground = 16 * 16 * 16 - mask.histogram()[0];
            assert_eq!(counted, foreground);
        }

        drop(pipeline);
        drop(jobs);
        let sink_metrics = timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sink_metrics.len(), 2);
        for (name, snapshot) in &sink_metrics {
            assert_eq!(snapshot.delivered, 6, "sink {name}");
            assert_eq!(snapshot.failed, 0);
            assert_eq!(snapshot.dropped, 0);
        }

        let lines: Vec<JobEvent> = std::fs::read_to_string(&events_path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 6);
        for status in [JobStatus::Pending, JobStatus::Processing, JobStatus::Completed] {
            assert_eq!(lines.iter().filter(|e| e.status == status).count(), 2);
        }
    }

    #[tokio::test]
    async fn test_rejected_inputs_leave_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = blueprint(dir.path());
        let jobs = memory_jobs();
        let pipeline = SegmentationPipeline::new(
            &blueprint,
            loader(),
            ThresholdClassifier::new(0, 1, [(TissueClass::EnhancingTissue, 0.5)]),
            jobs.clone(),
            FsArtifactStore::new(blueprint.artifacts.clone()),
        );

        let good = write_series(dir.path(), "good", Spacing::UNIT, &block());
        let coarse = write_series(dir.path(), "coarse", Spacing::new(2.0, 2.0, 2.0), &block());
        let missing = VolumeRef::Path(dir.path().join("absent.nii"));
        let stored = VolumeRef::Key(VolumeKey {
            patient_id: "p1".into(),
            series_id: "s1".into(),
            modality: "t1".into(),
        });

        let misaligned = SegmentationRequest {
            inputs: vec![("t1".into(), good.clone()), ("t2".into(), coarse)],
            ..request("p1", "s1", good.clone())
        };
        let requests = vec![
            request("p1", "s1", good),
            request("p1", "s2", missing),
            request("p1", "s3", stored),
            misaligned,
        ];
        let report = run_batch(&pipeline, requests, 4, std::future::pending()).await;

        assert_eq!(report.completed(), 1);
        assert_eq!(report.rejected(), 3);
        for entry in report.entries.iter().skip(1) {
            let err = entry.result.as_ref().unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Input);
        }
        assert_eq!(jobs.list_jobs(None).await.unwrap().len(), 1);
    }
}
