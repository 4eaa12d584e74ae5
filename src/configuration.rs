//! Run configuration.
//!
//! [`AssembleOptions`] is the validated parameter bag for an assembly run and
//! [`ResetOptions`] the one for a reset. Both are builders; every field has
//! the default an operator would see in the UI.
//!
//! # Example
//!
//! ```
//! use scenestitch::{AssembleOptions, TimestampUnit};
//!
//! let options = AssembleOptions::new()
//!     .with_scene_id_field("scene_token")
//!     .with_timestamp_unit(TimestampUnit::Microseconds)
//!     .with_target_sensors(["CAM_FRONT", "CAM_BACK"])
//!     .with_fps_override(12);
//!
//! assert_eq!(options.fps_override(), Some(12.0));
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;

use crate::dataset::{Dataset, RESERVED_FIELDS};
use crate::error::StitchError;
use crate::frame_rate::{MAX_FRAME_RATE, MIN_FRAME_RATE};
use crate::progress::{NoOpProgress, ProgressCallback};

/// Unit the timestamp field is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampUnit {
    /// Seconds. This is the default.
    #[default]
    Seconds,
    /// Milliseconds.
    Milliseconds,
    /// Microseconds (nuScenes-style logs).
    Microseconds,
    /// Nanoseconds (ROS-style logs).
    Nanoseconds,
}

impl TimestampUnit {
    /// Convert a raw timestamp to seconds.
    pub fn to_seconds(self, value: f64) -> f64 {
        match self {
            TimestampUnit::Seconds => value,
            TimestampUnit::Milliseconds => value / 1e3,
            TimestampUnit::Microseconds => value / 1e6,
            TimestampUnit::Nanoseconds => value / 1e9,
        }
    }
}

impl FromStr for TimestampUnit {
    type Err = StitchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Ok(TimestampUnit::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(TimestampUnit::Milliseconds),
            "us" | "micros" | "microseconds" => Ok(TimestampUnit::Microseconds),
            "ns" | "nanos" | "nanoseconds" => Ok(TimestampUnit::Nanoseconds),
            other => Err(StitchError::InvalidConfiguration(format!(
                "unknown timestamp unit '{other}'"
            ))),
        }
    }
}

/// Options for an assembly run.
#[derive(Clone)]
pub struct AssembleOptions {
    /// Field holding the scene identifier (default: `scene_id`).
    pub scene_id_field: String,
    /// Field holding the frame timestamp (default: `timestamp`).
    pub timestamp_field: String,
    /// Unit of the timestamp field (default: seconds).
    pub timestamp_unit: TimestampUnit,
    /// Fixed frame rate, used only when `use_fps_override` is set (default: 30).
    pub fps: u32,
    /// Use `fps` instead of deriving the rate from timestamps (default: `false`).
    pub use_fps_override: bool,
    /// Prefer the generated image variant when a sample has one (default: `false`).
    pub use_generated: bool,
    /// Field holding the generated image path (default: `generated_filepath`).
    pub generated_path_field: String,
    /// Sensors to process. Empty means every camera sensor.
    pub target_sensors: Vec<String>,
    /// Field the produced video path is written to (default: `video_path`).
    pub video_path_field: String,
    /// Re-encode even when the output video already exists (default: `false`).
    pub overwrite: bool,
    /// Scene IDs to process. Empty means every scene.
    pub scenes: Vec<String>,
    pub(crate) progress: Arc<dyn ProgressCallback>,
}

impl Debug for AssembleOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AssembleOptions")
            .field("scene_id_field", &self.scene_id_field)
            .field("timestamp_field", &self.timestamp_field)
            .field("timestamp_unit", &self.timestamp_unit)
            .field("fps", &self.fps)
            .field("use_fps_override", &self.use_fps_override)
            .field("use_generated", &self.use_generated)
            .field("generated_path_field", &self.generated_path_field)
            .field("target_sensors", &self.target_sensors)
            .field("video_path_field", &self.video_path_field)
            .field("overwrite", &self.overwrite)
            .field("scenes", &self.scenes)
            .finish()
    }
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl AssembleOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            scene_id_field: "scene_id".to_string(),
            timestamp_field: "timestamp".to_string(),
            timestamp_unit: TimestampUnit::Seconds,
            fps: 30,
            use_fps_override: false,
            use_generated: false,
            generated_path_field: "generated_filepath".to_string(),
            target_sensors: Vec::new(),
            video_path_field: "video_path".to_string(),
            overwrite: false,
            scenes: Vec::new(),
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Set the scene ID field.
    #[must_use]
    pub fn with_scene_id_field(mut self, field: impl Into<String>) -> Self {
        self.scene_id_field = field.into();
        self
    }

    /// Set the timestamp field.
    #[must_use]
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    /// Set the timestamp unit.
    #[must_use]
    pub fn with_timestamp_unit(mut self, unit: TimestampUnit) -> Self {
        self.timestamp_unit = unit;
        self
    }

    /// Use a fixed frame rate instead of deriving it from timestamps.
    #[must_use]
    pub fn with_fps_override(mut self, fps: u32) -> Self {
        self.fps = fps;
        self.use_fps_override = true;
        self
    }

    /// Prefer generated image variants.
    #[must_use]
    pub fn with_use_generated(mut self, use_generated: bool) -> Self {
        self.use_generated = use_generated;
        self
    }

    /// Set the generated image path field.
    #[must_use]
    pub fn with_generated_path_field(mut self, field: impl Into<String>) -> Self {
        self.generated_path_field = field.into();
        self
    }

    /// Restrict processing to the named sensors.
    #[must_use]
    pub fn with_target_sensors<I, S>(mut self, sensors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_sensors = sensors.into_iter().map(Into::into).collect();
        self
    }

    /// Set the field the video path is written to.
    #[must_use]
    pub fn with_video_path_field(mut self, field: impl Into<String>) -> Self {
        self.video_path_field = field.into();
        self
    }

    /// Re-encode videos that already exist on disk.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Restrict processing to the listed scene IDs.
    #[must_use]
    pub fn with_scenes<I, S>(mut self, scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scenes = scenes.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a progress callback, invoked once per processed scene.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// The frame rate override in effect, if any.
    pub fn fps_override(&self) -> Option<f64> {
        self.use_fps_override.then_some(self.fps as f64)
    }

    /// Check the options against a dataset before anything is processed.
    ///
    /// # Errors
    ///
    /// - [`StitchError::InvalidConfiguration`] for empty or reserved field names.
    /// - [`StitchError::UnknownField`] if the scene ID or timestamp field is
    ///   missing from the schema.
    /// - [`StitchError::InvalidFrameRate`] if the override is outside 1–120.
    pub fn validate<D: Dataset + ?Sized>(&self, dataset: &D) -> Result<(), StitchError> {
        let named_fields = [
            ("scene_id_field", &self.scene_id_field),
            ("timestamp_field", &self.timestamp_field),
            ("video_path_field", &self.video_path_field),
            ("generated_path_field", &self.generated_path_field),
        ];
        for (option, field) in named_fields {
            if field.trim().is_empty() {
                return Err(StitchError::InvalidConfiguration(format!(
                    "{option} must not be empty"
                )));
            }
        }

        if RESERVED_FIELDS.contains(&self.video_path_field.as_str()) {
            return Err(StitchError::InvalidConfiguration(format!(
                "video_path_field cannot be the built-in '{}' attribute",
                self.video_path_field
            )));
        }
        if self.video_path_field == self.scene_id_field
            || self.video_path_field == self.timestamp_field
        {
            return Err(StitchError::InvalidConfiguration(
                "video_path_field would overwrite an input field".to_string(),
            ));
        }

        if self.use_fps_override {
            let fps = self.fps as f64;
            if !(MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&fps) {
                return Err(StitchError::InvalidFrameRate(fps));
            }
        }

        let schema = dataset.field_schema();
        for field in [&self.scene_id_field, &self.timestamp_field] {
            if !schema.contains_key(field.as_str()) {
                let available: Vec<&str> = schema.keys().map(String::as_str).collect();
                return Err(StitchError::UnknownField {
                    field: field.clone(),
                    available: available.join(", "),
                });
            }
        }

        Ok(())
    }
}

/// Options for a reset run.
#[derive(Clone)]
pub struct ResetOptions {
    /// Field to clear (default: `video_path`).
    pub field: String,
    /// Delete the referenced video files (default: `true`).
    pub delete_files: bool,
    /// Report only; change nothing (default: `false`).
    pub dry_run: bool,
    pub(crate) progress: Arc<dyn ProgressCallback>,
}

impl Debug for ResetOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ResetOptions")
            .field("field", &self.field)
            .field("delete_files", &self.delete_files)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            field: "video_path".to_string(),
            delete_files: true,
            dry_run: false,
            progress: Arc::new(NoOpProgress),
        }
    }
}

impl ResetOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the field to clear.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Keep video files on disk; only clear the field.
    #[must_use]
    pub fn keep_videos(mut self) -> Self {
        self.delete_files = false;
        self
    }

    /// Report what would change without changing anything.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Attach a progress callback, invoked once per handled video file.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }
}
