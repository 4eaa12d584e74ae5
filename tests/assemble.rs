//! Scene assembly tests.
//!
//! The encoder is a recording fake, so these run without FFmpeg.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tempfile::TempDir;

use scenestitch::{
    AssembleOptions, Dataset, ErrorKind, FieldKind, FieldValue, FrameEncoder, JsonDataset,
    MediaType, OperationType, ProgressCallback, ProgressInfo, Sample, SampleId,
    SceneVideoAssembler, StitchError, TrackOutcome, assemble_scene_videos,
};

// ── Fake encoder ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct EncodeCall {
    frames: Vec<PathBuf>,
    output: PathBuf,
    fps: f64,
}

/// Records every call; writes a placeholder output unless the output's file
/// name contains one of `fail_on`.
#[derive(Default)]
struct RecordingEncoder {
    calls: Mutex<Vec<EncodeCall>>,
    fail_on: Vec<String>,
}

impl RecordingEncoder {
    fn failing_on(sensor: &str) -> Self {
        Self {
            fail_on: vec![format!("_{sensor}_")],
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<EncodeCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl FrameEncoder for RecordingEncoder {
    fn encode(&self, frames: &[PathBuf], output: &Path, fps: f64) -> Result<(), StitchError> {
        self.calls.lock().unwrap().push(EncodeCall {
            frames: frames.to_vec(),
            output: output.to_path_buf(),
            fps,
        });
        if frames.is_empty() {
            return Err(StitchError::NoFrames);
        }
        let name = output.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail_on.iter().any(|pattern| name.contains(pattern)) {
            return Err(StitchError::EncodeError("simulated encoder crash".to_string()));
        }
        fs::write(output, b"not really a video")?;
        Ok(())
    }
}

// ── Fixture dataset ────────────────────────────────────────────────

struct Fixture {
    _directory: TempDir,
    root: PathBuf,
    dataset: JsonDataset,
}

/// Scene `s1`: `front` at 10 fps (3 frames), `left` at 5 fps (2 frames),
/// `lidar` point clouds. Scene `s2`: `front` only (2 frames).
fn fixture() -> Fixture {
    let directory = tempfile::tempdir().unwrap();
    let root = directory.path().to_path_buf();
    for sensor in ["front", "left", "lidar"] {
        fs::create_dir_all(root.join(sensor)).unwrap();
    }

    let mut dataset = JsonDataset::new("drive")
        .with_media_type("front", MediaType::Image)
        .with_media_type("left", MediaType::Image)
        .with_media_type("lidar", MediaType::PointCloud);

    let frames = [
        ("f1", "s1", "front", 0.1),
        ("f0", "s1", "front", 0.0),
        ("f2", "s1", "front", 0.2),
        ("l0", "s1", "left", 0.0),
        ("l1", "s1", "left", 0.2),
        ("g0", "s2", "front", 9.0),
        ("g1", "s2", "front", 9.5),
    ];
    for (id, scene, sensor, timestamp) in frames {
        dataset
            .add_sample(
                Sample::new(id)
                    .with_filepath(root.join(sensor).join(format!("{id}.jpg")))
                    .with_group(sensor)
                    .with_field("scene_id", scene)
                    .with_field("timestamp", timestamp),
            )
            .unwrap();
    }
    dataset
        .add_sample(
            Sample::new("p0")
                .with_filepath(root.join("lidar").join("p0.pcd"))
                .with_group("lidar")
                .with_field("scene_id", "s1")
                .with_field("timestamp", 0.0),
        )
        .unwrap();

    Fixture {
        _directory: directory,
        root,
        dataset,
    }
}

fn video_field(dataset: &JsonDataset, id: &str) -> Option<Value> {
    dataset
        .sample(&SampleId::from(id))
        .and_then(|sample| sample.get("video_path").cloned())
}

fn only_scene(scene: &str) -> AssembleOptions {
    AssembleOptions::new().with_scenes([scene])
}

// ── Success path ───────────────────────────────────────────────────

#[test]
fn writes_deterministic_path_on_every_contributing_sample() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();

    let report = assemble_scene_videos(&mut fx.dataset, &encoder, only_scene("s1")).unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(report.total_videos, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.samples_updated, 5);

    let front_video = fx.root.join("front").join("scene_s1_front_generated.mp4");
    let left_video = fx.root.join("left").join("scene_s1_left_generated.mp4");
    for id in ["f0", "f1", "f2"] {
        assert_eq!(
            video_field(&fx.dataset, id),
            Some(json!(front_video.to_string_lossy()))
        );
    }
    for id in ["l0", "l1"] {
        assert_eq!(
            video_field(&fx.dataset, id),
            Some(json!(left_video.to_string_lossy()))
        );
    }
    assert_eq!(video_field(&fx.dataset, "p0"), None, "lidar is untouched");
    assert_eq!(video_field(&fx.dataset, "g0"), None, "other scenes untouched");
}

#[test]
fn frames_reach_encoder_in_timestamp_order() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();
    let options = only_scene("s1").with_target_sensors(["front"]);

    assemble_scene_videos(&mut fx.dataset, &encoder, options).unwrap();

    let calls = encoder.calls();
    assert_eq!(calls.len(), 1);
    let names: Vec<String> = calls[0]
        .frames
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["f0.jpg", "f1.jpg", "f2.jpg"]);
    assert!((calls[0].fps - 10.0).abs() < 1e-6);
}

#[test]
fn fps_override_replaces_derived_rate() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();
    let options = only_scene("s1").with_fps_override(24);

    assemble_scene_videos(&mut fx.dataset, &encoder, options).unwrap();

    assert!(encoder.calls().iter().all(|call| call.fps == 24.0));
}

#[test]
fn every_scene_processed_by_default() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();

    let report = assemble_scene_videos(&mut fx.dataset, &encoder, AssembleOptions::new()).unwrap();

    assert_eq!(report.scenes_processed, 2);
    assert_eq!(report.created, 3);
    let scene_ids: Vec<&str> = report.scenes.iter().map(|s| s.scene_id.as_str()).collect();
    assert_eq!(scene_ids, vec!["s1", "s2"]);
    assert!(video_field(&fx.dataset, "g1").is_some());
}

// ── Skips and failures ─────────────────────────────────────────────

#[test]
fn empty_track_is_skipped_without_encoding() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();
    let options = only_scene("s2").with_target_sensors(["left"]);

    let report = assemble_scene_videos(&mut fx.dataset, &encoder, options).unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.created, 0);
    assert_eq!(report.total_videos, 0);
    assert!(encoder.calls().is_empty());
    assert!(matches!(
        report.scenes[0].tracks[0].outcome,
        TrackOutcome::Skipped { .. }
    ));
}

#[test]
fn encoder_failure_leaves_field_unset_and_continues() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::failing_on("front");

    let report = assemble_scene_videos(&mut fx.dataset, &encoder, only_scene("s1")).unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.created, 1);
    for id in ["f0", "f1", "f2"] {
        assert_eq!(video_field(&fx.dataset, id), None);
    }
    assert!(video_field(&fx.dataset, "l0").is_some());

    let front = report.scenes[0]
        .tracks
        .iter()
        .find(|track| track.sensor == "front")
        .unwrap();
    match &front.outcome {
        TrackOutcome::Failed { error } => assert!(error.contains("simulated encoder crash")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!report.is_success());
}

#[test]
fn missing_requested_scene_is_recorded() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();
    let options = AssembleOptions::new().with_scenes(["s2", "s9"]);

    let report = assemble_scene_videos(&mut fx.dataset, &encoder, options).unwrap();

    assert_eq!(report.scenes_processed, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 1);
    let missing = &report.scenes[1];
    assert_eq!(missing.scene_id, "s9");
    assert!(missing.error.as_deref().unwrap().contains("s9"));
}

// ── Reuse and overwrite ────────────────────────────────────────────

#[test]
fn existing_video_is_reused() {
    let mut fx = fixture();
    let existing = fx.root.join("front").join("scene_s2_front_generated.mp4");
    fs::write(&existing, b"old").unwrap();
    let encoder = RecordingEncoder::default();

    let report = assemble_scene_videos(&mut fx.dataset, &encoder, only_scene("s2")).unwrap();

    assert!(encoder.calls().is_empty());
    assert_eq!(report.reused, 1);
    assert_eq!(report.created, 0);
    assert_eq!(report.total_videos, 1);
    assert_eq!(
        video_field(&fx.dataset, "g0"),
        Some(json!(existing.to_string_lossy()))
    );
    assert_eq!(fs::read(&existing).unwrap(), b"old");
}

#[test]
fn overwrite_reencodes_existing_video() {
    let mut fx = fixture();
    let existing = fx.root.join("front").join("scene_s2_front_generated.mp4");
    fs::write(&existing, b"old").unwrap();
    let encoder = RecordingEncoder::default();

    let report =
        assemble_scene_videos(&mut fx.dataset, &encoder, only_scene("s2").with_overwrite(true))
            .unwrap();

    assert_eq!(encoder.calls().len(), 1);
    assert_eq!(report.created, 1);
    assert_eq!(fs::read(&existing).unwrap(), b"not really a video");
}

#[test]
fn already_linked_track_is_reused_without_touching_disk() {
    let mut fx = fixture();
    for id in ["g0", "g1"] {
        fx.dataset
            .set_field(&SampleId::from(id), "video_path", json!("/archive/s2_front.mp4"))
            .unwrap();
    }
    let encoder = RecordingEncoder::default();

    let report = assemble_scene_videos(&mut fx.dataset, &encoder, only_scene("s2")).unwrap();

    assert!(encoder.calls().is_empty());
    assert_eq!(report.reused, 1);
    assert_eq!(report.samples_updated, 0);
    assert_eq!(
        report.scenes[0].tracks[0].outcome,
        TrackOutcome::Reused {
            path: PathBuf::from("/archive/s2_front.mp4")
        }
    );
    assert_eq!(video_field(&fx.dataset, "g0"), Some(json!("/archive/s2_front.mp4")));
}

#[test]
fn partially_linked_track_is_encoded() {
    let mut fx = fixture();
    fx.dataset
        .set_field(&SampleId::from("g0"), "video_path", json!("/archive/s2_front.mp4"))
        .unwrap();
    let encoder = RecordingEncoder::default();

    let report = assemble_scene_videos(&mut fx.dataset, &encoder, only_scene("s2")).unwrap();

    assert_eq!(encoder.calls().len(), 1);
    assert_eq!(report.created, 1);
    let video = fx.root.join("front").join("scene_s2_front_generated.mp4");
    for id in ["g0", "g1"] {
        assert_eq!(video_field(&fx.dataset, id), Some(json!(video.to_string_lossy())));
    }
}

// ── Write-back failures ────────────────────────────────────────────

/// Delegates to a [`JsonDataset`] but fails the `fail_write`-th call to
/// `set_field` (1-based), or every `save` when `fail_save` is set.
struct FlakyDataset {
    inner: JsonDataset,
    writes: usize,
    fail_write: usize,
    fail_save: bool,
}

impl FlakyDataset {
    fn new(inner: JsonDataset) -> Self {
        Self {
            inner,
            writes: 0,
            fail_write: 0,
            fail_save: false,
        }
    }
}

impl Dataset for FlakyDataset {
    fn name(&self) -> &str {
        Dataset::name(&self.inner)
    }

    fn group_media_types(&self) -> BTreeMap<String, MediaType> {
        self.inner.group_media_types()
    }

    fn field_schema(&self) -> BTreeMap<String, FieldKind> {
        self.inner.field_schema()
    }

    fn samples(&self) -> Vec<Sample> {
        self.inner.samples()
    }

    fn set_field(
        &mut self,
        id: &SampleId,
        field: &str,
        value: FieldValue,
    ) -> Result<(), StitchError> {
        self.writes += 1;
        if self.writes == self.fail_write {
            return Err(StitchError::DatasetError("disk full".to_string()));
        }
        self.inner.set_field(id, field, value)
    }

    fn clear_field(&mut self, id: &SampleId, field: &str) -> Result<bool, StitchError> {
        self.inner.clear_field(id, field)
    }

    fn delete_field(&mut self, field: &str) -> Result<(), StitchError> {
        self.inner.delete_field(field)
    }

    fn save(&mut self) -> Result<(), StitchError> {
        if self.fail_save {
            return Err(StitchError::DatasetError("read-only store".to_string()));
        }
        self.inner.save()
    }
}

#[test]
fn failed_write_back_restores_previous_values() {
    let mut fx = fixture();
    fx.dataset
        .set_field(&SampleId::from("f0"), "video_path", json!("/archive/old.mp4"))
        .unwrap();
    let mut dataset = FlakyDataset::new(fx.dataset);
    // f0 is written first, then f1 fails.
    dataset.fail_write = 2;
    let encoder = RecordingEncoder::default();

    let report = assemble_scene_videos(&mut dataset, &encoder, only_scene("s1")).unwrap();

    let front = &report.scenes[0].tracks[0];
    assert_eq!(front.sensor, "front");
    assert_eq!(front.samples_updated, 0);
    match &front.outcome {
        TrackOutcome::Failed { error } => assert!(error.contains("disk full")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(video_field(&dataset.inner, "f0"), Some(json!("/archive/old.mp4")));
    for id in ["f1", "f2"] {
        assert!(
            !dataset.inner.sample(&SampleId::from(id)).unwrap().has_value("video_path"),
            "{id} must not reference the video"
        );
    }

    // The next track is unaffected.
    assert_eq!(report.created, 1);
    assert!(video_field(&dataset.inner, "l0").is_some());
}

#[test]
fn failed_save_restores_written_samples() {
    let fx = fixture();
    let mut dataset = FlakyDataset::new(fx.dataset);
    dataset.fail_save = true;
    let encoder = RecordingEncoder::default();

    let report = assemble_scene_videos(&mut dataset, &encoder, only_scene("s2")).unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.samples_updated, 0);
    for id in ["g0", "g1"] {
        assert!(!dataset.inner.sample(&SampleId::from(id)).unwrap().has_value("video_path"));
    }
}

// ── Configuration ──────────────────────────────────────────────────

#[test]
fn unknown_scene_field_fails_before_processing() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();
    let options = AssembleOptions::new().with_scene_id_field("scene_token");

    let error = assemble_scene_videos(&mut fx.dataset, &encoder, options).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Configuration);
    match error {
        StitchError::UnknownField { field, available } => {
            assert_eq!(field, "scene_token");
            assert!(available.contains("scene_id"));
        }
        other => panic!("expected UnknownField, got {other}"),
    }
    assert!(encoder.calls().is_empty());
}

#[test]
fn out_of_range_override_rejected() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();

    let result = SceneVideoAssembler::new(
        &mut fx.dataset,
        &encoder,
        AssembleOptions::new().with_fps_override(240),
    );
    assert!(matches!(result, Err(StitchError::InvalidFrameRate(fps)) if fps == 240.0));
}

#[test]
fn reserved_video_field_rejected() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();

    let result = SceneVideoAssembler::new(
        &mut fx.dataset,
        &encoder,
        AssembleOptions::new().with_video_path_field("filepath"),
    );
    assert!(matches!(result, Err(StitchError::InvalidConfiguration(_))));
}

// ── Persistence, progress, reporting ───────────────────────────────

#[test]
fn write_back_is_saved_to_disk() {
    let mut fx = fixture();
    let dataset_path = fx.root.join("drive.json");
    fx.dataset.save_as(&dataset_path).unwrap();
    let encoder = RecordingEncoder::default();

    assemble_scene_videos(&mut fx.dataset, &encoder, only_scene("s2")).unwrap();

    let reopened = JsonDataset::open(&dataset_path).unwrap();
    assert!(video_field(&reopened, "g0").is_some());
    assert!(reopened.has_field("video_path"));
}

struct RecordingProgress {
    infos: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.infos.lock().unwrap().push(info.clone());
    }
}

#[test]
fn progress_fires_once_per_scene() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::default();
    let progress = Arc::new(RecordingProgress {
        infos: Mutex::new(Vec::new()),
    });
    let options = AssembleOptions::new().with_progress(progress.clone());

    assemble_scene_videos(&mut fx.dataset, &encoder, options).unwrap();

    let infos = progress.infos.lock().unwrap();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].operation, OperationType::SceneAssembly);
    assert_eq!(infos[0].item.as_deref(), Some("s1"));
    assert_eq!(infos[1].current, 2);
    assert_eq!(infos[1].total, Some(2));
    assert_eq!(infos[1].percentage, Some(100.0));
}

#[test]
fn report_serializes_with_status_tags() {
    let mut fx = fixture();
    let encoder = RecordingEncoder::failing_on("left");

    let report = assemble_scene_videos(&mut fx.dataset, &encoder, only_scene("s1")).unwrap();
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["created"], json!(1));
    assert_eq!(value["failed"], json!(1));
    let tracks = value["scenes"][0]["tracks"].as_array().unwrap();
    let statuses: Vec<&str> = tracks
        .iter()
        .map(|track| track["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["created", "failed"]);
    assert!(tracks[0]["path"].as_str().unwrap().ends_with("scene_s1_front_generated.mp4"));
}
