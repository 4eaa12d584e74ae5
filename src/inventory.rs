//! Frame inventory.
//!
//! Turns the samples of one scene into per-sensor [`SensorTrack`]s: the frame
//! images of each sensor, in ascending timestamp order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::configuration::AssembleOptions;
use crate::dataset::{
    Dataset, FieldValue, MediaType, Sample, SampleId, camera_sensors, is_camera_sensor,
};
use crate::error::StitchError;
use crate::utilities::{scene_id_label, scene_video_path};

/// One usable frame of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Sample the frame came from.
    pub sample_id: SampleId,
    /// Image to encode.
    pub image_path: PathBuf,
    /// Capture time, in seconds.
    pub timestamp: f64,
    /// Non-empty value of the video path field at collection time.
    pub linked_video: Option<FieldValue>,
}

/// The timestamp-ordered frames of one (scene, sensor) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorTrack {
    /// Sensor name.
    pub sensor: String,
    /// Frames in ascending timestamp order.
    pub frames: Vec<Frame>,
}

impl SensorTrack {
    /// Create an empty track.
    pub fn new(sensor: impl Into<String>) -> Self {
        Self {
            sensor: sensor.into(),
            frames: Vec::new(),
        }
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if the track has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Image paths in encode order.
    pub fn image_paths(&self) -> Vec<PathBuf> {
        self.frames.iter().map(|frame| frame.image_path.clone()).collect()
    }

    /// Timestamps in encode order.
    pub fn timestamps(&self) -> Vec<f64> {
        self.frames.iter().map(|frame| frame.timestamp).collect()
    }

    /// Samples that contributed frames.
    pub fn sample_ids(&self) -> impl Iterator<Item = &SampleId> {
        self.frames.iter().map(|frame| &frame.sample_id)
    }

    /// The video every frame is already linked to, if they all agree.
    pub fn linked_video(&self) -> Option<PathBuf> {
        let first = self.frames.first()?.linked_video.as_ref()?.as_str()?;
        self.frames
            .iter()
            .all(|frame| frame.linked_video.as_ref().and_then(FieldValue::as_str) == Some(first))
            .then(|| PathBuf::from(first))
    }

    /// Where this track's video goes: next to its first frame.
    ///
    /// Returns `None` for an empty track.
    pub fn output_path(&self, scene_label: &str) -> Option<PathBuf> {
        let first = self.frames.first()?;
        let directory = first.image_path.parent().unwrap_or(Path::new(""));
        Some(scene_video_path(directory, scene_label, &self.sensor))
    }

    fn sort_by_timestamp(&mut self) {
        // `sort_by` is stable, so equal timestamps keep enumeration order.
        self.frames
            .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }
}

/// Tracks of one scene, keyed by sensor name.
pub type SceneInventory = BTreeMap<String, SensorTrack>;

/// Collect the frames of one scene.
///
/// With no target sensors every camera sensor gets a track; otherwise exactly
/// the named sensors do, and a named sensor that is missing from the scene or
/// is not a camera gets an empty track. Samples without an image path or a
/// numeric timestamp are skipped.
///
/// # Errors
///
/// [`StitchError::SceneNotFound`] if no sample carries `scene_id`.
pub fn collect_scene_frames<D: Dataset + ?Sized>(
    dataset: &D,
    scene_id: &FieldValue,
    options: &AssembleOptions,
) -> Result<SceneInventory, StitchError> {
    let samples = dataset.match_field(&options.scene_id_field, scene_id);
    if samples.is_empty() {
        return Err(StitchError::SceneNotFound(scene_id_label(scene_id)));
    }

    let media_types = dataset.group_media_types();
    let mut inventory = select_sensors(&media_types, &options.target_sensors);
    log::debug!(
        "Scene {}: {} samples, sensors {:?}",
        scene_id_label(scene_id),
        samples.len(),
        inventory.keys().collect::<Vec<_>>()
    );

    for sample in &samples {
        let Some(sensor) = sample
            .sensor()
            .filter(|sensor| is_camera_sensor(&media_types, sensor))
        else {
            continue;
        };
        let Some(track) = inventory.get_mut(sensor) else {
            continue;
        };
        let Some(image_path) = resolve_image_path(sample, options) else {
            log::warn!("Skipping sample {}: no image path", sample.id);
            continue;
        };
        let Some(timestamp) = read_timestamp(sample, options) else {
            log::warn!(
                "Skipping sample {}: missing or non-numeric '{}'",
                sample.id,
                options.timestamp_field
            );
            continue;
        };
        track.frames.push(Frame {
            sample_id: sample.id.clone(),
            image_path,
            timestamp,
            linked_video: sample
                .get(&options.video_path_field)
                .filter(|_| sample.has_value(&options.video_path_field))
                .cloned(),
        });
    }

    for track in inventory.values_mut() {
        track.sort_by_timestamp();
    }

    Ok(inventory)
}

/// Empty tracks for the sensors a run should cover.
fn select_sensors(
    media_types: &BTreeMap<String, MediaType>,
    target_sensors: &[String],
) -> SceneInventory {
    if target_sensors.is_empty() {
        return camera_sensors(media_types)
            .into_iter()
            .map(|sensor| (sensor.clone(), SensorTrack::new(sensor)))
            .collect();
    }

    let mut inventory = SceneInventory::new();
    for sensor in target_sensors {
        inventory.insert(sensor.clone(), SensorTrack::new(sensor.clone()));
        match media_types.get(sensor) {
            Some(MediaType::Image) | None => {}
            Some(other) => log::warn!(
                "Sensor {sensor} holds {other} media, not images; it will produce no video"
            ),
        }
    }
    inventory
}

/// Image path for a sample: the generated variant when requested and present,
/// the original otherwise.
fn resolve_image_path(sample: &Sample, options: &AssembleOptions) -> Option<PathBuf> {
    if options.use_generated {
        if let Some(Value::String(generated)) = sample.get(&options.generated_path_field) {
            if !generated.is_empty() {
                log::debug!("Sample {}: using generated image", sample.id);
                return Some(PathBuf::from(generated));
            }
        }
    }
    sample
        .filepath
        .clone()
        .filter(|path| !path.as_os_str().is_empty())
}

/// Timestamp of a sample in seconds.
fn read_timestamp(sample: &Sample, options: &AssembleOptions) -> Option<f64> {
    let raw = match sample.get(&options.timestamp_field)? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite()
        .then(|| options.timestamp_unit.to_seconds(raw))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::configuration::TimestampUnit;

    #[test]
    fn generated_variant_preferred_when_enabled() {
        let sample = Sample::new("a")
            .with_filepath("/orig/a.jpg")
            .with_field("generated_filepath", "/gen/a.jpg");

        let options = AssembleOptions::new();
        assert_eq!(
            resolve_image_path(&sample, &options),
            Some(PathBuf::from("/orig/a.jpg"))
        );

        let options = AssembleOptions::new().with_use_generated(true);
        assert_eq!(
            resolve_image_path(&sample, &options),
            Some(PathBuf::from("/gen/a.jpg"))
        );
    }

    #[test]
    fn generated_falls_back_to_original() {
        let sample = Sample::new("a")
            .with_filepath("/orig/a.jpg")
            .with_field("generated_filepath", "");
        let options = AssembleOptions::new().with_use_generated(true);
        assert_eq!(
            resolve_image_path(&sample, &options),
            Some(PathBuf::from("/orig/a.jpg"))
        );
    }

    #[test]
    fn timestamps_parse_and_scale() {
        let options = AssembleOptions::new().with_timestamp_unit(TimestampUnit::Microseconds);
        let sample = Sample::new("a").with_field("timestamp", json!(1_500_000));
        assert_eq!(read_timestamp(&sample, &options), Some(1.5));

        let options = AssembleOptions::new();
        let text = Sample::new("b").with_field("timestamp", " 2.25 ");
        assert_eq!(read_timestamp(&text, &options), Some(2.25));

        let bad = Sample::new("c").with_field("timestamp", "noon");
        assert_eq!(read_timestamp(&bad, &options), None);
        assert_eq!(read_timestamp(&Sample::new("d"), &options), None);
    }

    #[test]
    fn non_camera_target_gets_empty_track() {
        let media_types = BTreeMap::from([
            ("CAM_FRONT".to_string(), MediaType::Image),
            ("LIDAR_TOP".to_string(), MediaType::PointCloud),
        ]);
        let inventory = select_sensors(&media_types, &["LIDAR_TOP".to_string()]);
        assert_eq!(inventory.len(), 1);
        assert!(inventory["LIDAR_TOP"].is_empty());

        let all = select_sensors(&media_types, &[]);
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["CAM_FRONT"]);
    }
}
