//! Scene video assembly.
//!
//! [`SceneVideoAssembler`] walks scenes one at a time. For every sensor track
//! of a scene it resolves the frame rate, encodes the track next to its first
//! frame as `scene_{scene_id}_{sensor}_generated.mp4`, and writes that path
//! into the configured field of every sample that contributed a frame.
//!
//! Failures are contained: an empty track is skipped, a failed encode marks
//! only its own track as failed, and a missing scene is recorded against that
//! scene. Only configuration errors stop a run, and they are raised before any
//! scene is touched.
//!
//! # Example
//!
//! ```no_run
//! use scenestitch::{
//!     AssembleOptions, FfmpegCommandEncoder, JsonDataset, SceneVideoAssembler, StitchError,
//! };
//!
//! let mut dataset = JsonDataset::open("datasets/drive.json")?;
//! let encoder = FfmpegCommandEncoder::new();
//! let options = AssembleOptions::new().with_target_sensors(["CAM_FRONT"]);
//!
//! let report = SceneVideoAssembler::new(&mut dataset, &encoder, options)?.assemble_all()?;
//! println!(
//!     "created {}, skipped {}, failed {}",
//!     report.created, report.skipped, report.failed
//! );
//! # Ok::<(), StitchError>(())
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::configuration::AssembleOptions;
use crate::dataset::{Dataset, FieldValue};
use crate::encode::FrameEncoder;
use crate::error::StitchError;
use crate::frame_rate::resolve_frame_rate;
use crate::inventory::{Frame, SensorTrack, collect_scene_frames};
use crate::progress::{OperationType, ProgressTracker};
use crate::utilities::scene_id_label;

/// What happened to one (scene, sensor) track.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackOutcome {
    /// A video was encoded and its path written back.
    Created {
        /// Path of the new video.
        path: PathBuf,
    },
    /// The video already existed on disk and was linked without re-encoding.
    Reused {
        /// Path of the existing video.
        path: PathBuf,
    },
    /// Nothing to do.
    Skipped {
        /// Why the track was skipped.
        reason: String,
    },
    /// Encoding or write-back failed. The video field of the track's samples
    /// is left as it was before the attempt.
    Failed {
        /// Diagnostic text.
        error: String,
    },
}

impl TrackOutcome {
    /// The video path, for created and reused tracks.
    pub fn video_path(&self) -> Option<&Path> {
        match self {
            TrackOutcome::Created { path } | TrackOutcome::Reused { path } => Some(path),
            _ => None,
        }
    }
}

/// Result for one (scene, sensor) track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackReport {
    /// Sensor name.
    pub sensor: String,
    /// Usable frames in the track.
    pub frames: usize,
    /// Frame rate the track was encoded at.
    pub fps: Option<f64>,
    /// Samples whose video path field was written.
    pub samples_updated: usize,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: TrackOutcome,
}

/// Result for one scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneReport {
    /// Scene ID as it appears in file names.
    pub scene_id: String,
    /// One entry per selected sensor.
    pub tracks: Vec<TrackReport>,
    /// Scene-level failure (e.g. the scene does not exist).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SceneReport {
    fn failed(scene_id: String, error: &StitchError) -> Self {
        Self {
            scene_id,
            tracks: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate result of an assembly run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    /// Scenes visited.
    pub scenes_processed: usize,
    /// Tracks encoded.
    pub created: usize,
    /// Tracks linked to an existing video.
    pub reused: usize,
    /// Tracks with nothing to do.
    pub skipped: usize,
    /// Tracks (and scenes) that failed.
    pub failed: usize,
    /// Videos now referenced by the dataset: `created + reused`.
    pub total_videos: usize,
    /// Samples whose video path field was written.
    pub samples_updated: usize,
    /// Per-scene detail.
    pub scenes: Vec<SceneReport>,
}

impl AssemblyReport {
    fn record(&mut self, scene: SceneReport) {
        self.scenes_processed += 1;
        if scene.error.is_some() {
            self.failed += 1;
        }
        for track in &scene.tracks {
            match track.outcome {
                TrackOutcome::Created { .. } => self.created += 1,
                TrackOutcome::Reused { .. } => self.reused += 1,
                TrackOutcome::Skipped { .. } => self.skipped += 1,
                TrackOutcome::Failed { .. } => self.failed += 1,
            }
            self.samples_updated += track.samples_updated;
        }
        self.total_videos = self.created + self.reused;
        self.scenes.push(scene);
    }

    /// Returns `true` if no track or scene failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Builds one video per (scene, sensor) and links it back to the samples.
///
/// Create via [`SceneVideoAssembler::new`], which validates the options, then
/// call [`assemble_all`](SceneVideoAssembler::assemble_all) or
/// [`assemble_scene`](SceneVideoAssembler::assemble_scene).
pub struct SceneVideoAssembler<'a, D: Dataset + ?Sized, E: FrameEncoder + ?Sized> {
    dataset: &'a mut D,
    encoder: &'a E,
    options: AssembleOptions,
}

impl<'a, D: Dataset + ?Sized, E: FrameEncoder + ?Sized> SceneVideoAssembler<'a, D, E> {
    /// Create an assembler.
    ///
    /// # Errors
    ///
    /// Any configuration error from [`AssembleOptions::validate`].
    pub fn new(
        dataset: &'a mut D,
        encoder: &'a E,
        options: AssembleOptions,
    ) -> Result<Self, StitchError> {
        options.validate(&*dataset)?;
        Ok(Self {
            dataset,
            encoder,
            options,
        })
    }

    /// The options this assembler runs with.
    pub fn options(&self) -> &AssembleOptions {
        &self.options
    }

    /// Process every scene selected by the options.
    ///
    /// Per-scene and per-track failures are recorded in the report; the run
    /// always continues with the next scene.
    pub fn assemble_all(&mut self) -> Result<AssemblyReport, StitchError> {
        let scenes = self.scene_ids();
        log::info!(
            "Assembling videos for {} scenes of dataset '{}'",
            scenes.len(),
            self.dataset.name()
        );

        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::SceneAssembly,
            Some(scenes.len() as u64),
        );
        let mut report = AssemblyReport::default();

        for (label, scene_id) in scenes {
            let scene_report = match scene_id {
                Some(scene_id) => match self.assemble_scene(&scene_id) {
                    Ok(scene_report) => scene_report,
                    Err(error) => {
                        log::warn!("Scene {label} failed: {error}");
                        SceneReport::failed(label.clone(), &error)
                    }
                },
                None => {
                    let error = StitchError::SceneNotFound(label.clone());
                    log::warn!("{error}");
                    SceneReport::failed(label.clone(), &error)
                }
            };
            report.record(scene_report);
            tracker.advance(Some(label));
        }

        log::info!(
            "Assembly finished: {} created, {} reused, {} skipped, {} failed",
            report.created,
            report.reused,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Process one scene.
    ///
    /// # Errors
    ///
    /// [`StitchError::SceneNotFound`] if no sample carries `scene_id`. Track
    /// failures are reported in the returned [`SceneReport`], not as errors.
    pub fn assemble_scene(&mut self, scene_id: &FieldValue) -> Result<SceneReport, StitchError> {
        let label = scene_id_label(scene_id);
        let inventory = collect_scene_frames(&*self.dataset, scene_id, &self.options)?;
        log::info!("Processing scene {label} ({} sensors)", inventory.len());

        let tracks = inventory
            .values()
            .map(|track| self.process_track(&label, track))
            .collect();

        Ok(SceneReport {
            scene_id: label,
            tracks,
            error: None,
        })
    }

    /// Scenes to visit, as (label, value). A configured scene that matches no
    /// value in the dataset has no value.
    fn scene_ids(&self) -> Vec<(String, Option<FieldValue>)> {
        let values = self.dataset.distinct_values(&self.options.scene_id_field);
        if self.options.scenes.is_empty() {
            return values
                .into_iter()
                .map(|value| (scene_id_label(&value), Some(value)))
                .collect();
        }
        self.options
            .scenes
            .iter()
            .map(|wanted| {
                let value = values
                    .iter()
                    .find(|value| scene_id_label(value) == *wanted)
                    .cloned();
                (wanted.clone(), value)
            })
            .collect()
    }

    fn process_track(&mut self, scene_label: &str, track: &SensorTrack) -> TrackReport {
        let mut report = TrackReport {
            sensor: track.sensor.clone(),
            frames: track.len(),
            fps: None,
            samples_updated: 0,
            outcome: TrackOutcome::Skipped {
                reason: "no usable frames".to_string(),
            },
        };

        let Some(output) = track.output_path(scene_label) else {
            log::info!("Scene {scene_label}, sensor {}: no usable frames", track.sensor);
            return report;
        };

        if !self.options.overwrite {
            if let Some(linked) = track.linked_video() {
                log::info!(
                    "Scene {scene_label}, sensor {}: already linked to {:?}",
                    track.sensor,
                    linked
                );
                report.outcome = TrackOutcome::Reused { path: linked };
                return report;
            }
        }

        if !self.options.overwrite && output.is_file() {
            log::info!(
                "Scene {scene_label}, sensor {}: reusing existing {:?}",
                track.sensor,
                output
            );
            report.outcome = match self.write_back(track, &output) {
                Ok(updated) => {
                    report.samples_updated = updated;
                    TrackOutcome::Reused { path: output }
                }
                Err(error) => TrackOutcome::Failed {
                    error: error.to_string(),
                },
            };
            return report;
        }

        let fps = resolve_frame_rate(&track.timestamps(), self.options.fps_override());
        report.fps = Some(fps);
        log::info!(
            "Scene {scene_label}, sensor {}: encoding {} frames at {fps:.3} fps",
            track.sensor,
            track.len()
        );

        report.outcome = match self.encoder.encode(&track.image_paths(), &output, fps) {
            Ok(()) => match self.write_back(track, &output) {
                Ok(updated) => {
                    report.samples_updated = updated;
                    TrackOutcome::Created { path: output }
                }
                Err(error) => {
                    log::warn!(
                        "Scene {scene_label}, sensor {}: write-back failed: {error}",
                        track.sensor
                    );
                    TrackOutcome::Failed {
                        error: error.to_string(),
                    }
                }
            },
            Err(error) => {
                log::warn!(
                    "Scene {scene_label}, sensor {}: encoding failed: {error}",
                    track.sensor
                );
                TrackOutcome::Failed {
                    error: error.to_string(),
                }
            }
        };
        report
    }

    /// Point every sample of `track` at `video` and persist.
    ///
    /// On error, samples already written get their previous value back.
    fn write_back(&mut self, track: &SensorTrack, video: &Path) -> Result<usize, StitchError> {
        let value = Value::String(video.to_string_lossy().into_owned());
        let mut written = Vec::with_capacity(track.len());
        for frame in &track.frames {
            if let Err(error) =
                self.dataset
                    .set_field(&frame.sample_id, &self.options.video_path_field, value.clone())
            {
                self.restore(&written);
                return Err(error);
            }
            written.push(frame);
        }
        if let Err(error) = self.dataset.save() {
            self.restore(&written);
            return Err(error);
        }
        log::debug!(
            "Set '{}' on {} samples",
            self.options.video_path_field,
            written.len()
        );
        Ok(written.len())
    }

    fn restore(&mut self, frames: &[&Frame]) {
        let field = &self.options.video_path_field;
        for frame in frames {
            let restored = match &frame.linked_video {
                Some(previous) => self
                    .dataset
                    .set_field(&frame.sample_id, field, previous.clone()),
                None => self.dataset.clear_field(&frame.sample_id, field).map(|_| ()),
            };
            if let Err(error) = restored {
                log::warn!("Could not restore '{field}' on sample {}: {error}", frame.sample_id);
            }
        }
    }
}

/// Validate `options` and assemble every selected scene of `dataset`.
///
/// Shorthand for [`SceneVideoAssembler::new`] followed by
/// [`assemble_all`](SceneVideoAssembler::assemble_all).
pub fn assemble_scene_videos<D, E>(
    dataset: &mut D,
    encoder: &E,
    options: AssembleOptions,
) -> Result<AssemblyReport, StitchError>
where
    D: Dataset + ?Sized,
    E: FrameEncoder + ?Sized,
{
    SceneVideoAssembler::new(dataset, encoder, options)?.assemble_all()
}
