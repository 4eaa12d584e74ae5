//! File-backed dataset.
//!
//! [`JsonDataset`] keeps a whole dataset in one JSON document:
//!
//! ```json
//! {
//!   "name": "drive-0042",
//!   "group_media_types": { "CAM_FRONT": "image", "LIDAR_TOP": "point-cloud" },
//!   "samples": [
//!     {
//!       "id": "s-0001",
//!       "filepath": "/data/drive-0042/CAM_FRONT/000001.jpg",
//!       "group": "CAM_FRONT",
//!       "fields": { "scene_id": "scene-0061", "timestamp": 1532402927.612 }
//!     }
//!   ]
//! }
//! ```
//!
//! Slices missing from `group_media_types` are typed from their sample file
//! extensions. Saving replaces the document atomically.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::dataset::{Dataset, FieldKind, FieldValue, MediaType, Sample, SampleId};
use crate::error::StitchError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DatasetDocument {
    name: String,
    #[serde(default)]
    group_media_types: BTreeMap<String, MediaType>,
    #[serde(default)]
    samples: Vec<Sample>,
}

/// A dataset stored as a single JSON document.
///
/// Created via [`open`](JsonDataset::open) for an existing file or
/// [`new`](JsonDataset::new) for an in-memory dataset. In-memory datasets
/// accept [`save`](Dataset::save) as a no-op until a path is attached with
/// [`save_as`](JsonDataset::save_as).
#[derive(Debug, Clone)]
pub struct JsonDataset {
    document: DatasetDocument,
    index: HashMap<SampleId, usize>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl JsonDataset {
    /// Create an empty in-memory dataset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            document: DatasetDocument {
                name: name.into(),
                ..DatasetDocument::default()
            },
            index: HashMap::new(),
            path: None,
            dirty: false,
        }
    }

    /// Load a dataset document from disk.
    ///
    /// # Errors
    ///
    /// - [`StitchError::IoError`] if the file cannot be read.
    /// - [`StitchError::DatasetFormat`] if it is not a valid document.
    /// - [`StitchError::DatasetError`] if two samples share an ID.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StitchError> {
        let path = path.as_ref();
        log::debug!("Opening dataset {:?}", path);
        let reader = BufReader::new(File::open(path)?);
        let document: DatasetDocument = serde_json::from_reader(reader)?;
        let mut dataset = Self {
            document,
            index: HashMap::new(),
            path: Some(path.to_path_buf()),
            dirty: false,
        };
        dataset.rebuild_index()?;
        log::info!(
            "Loaded dataset '{}' ({} samples)",
            dataset.document.name,
            dataset.len()
        );
        Ok(dataset)
    }

    /// Declare the media type of a group slice.
    #[must_use]
    pub fn with_media_type(mut self, sensor: impl Into<String>, media_type: MediaType) -> Self {
        self.document.group_media_types.insert(sensor.into(), media_type);
        self
    }

    /// Append a sample.
    ///
    /// # Errors
    ///
    /// [`StitchError::DatasetError`] if a sample with the same ID exists.
    pub fn add_sample(&mut self, sample: Sample) -> Result<(), StitchError> {
        if self.index.contains_key(&sample.id) {
            return Err(StitchError::DatasetError(format!(
                "duplicate sample id {}",
                sample.id
            )));
        }
        self.index.insert(sample.id.clone(), self.document.samples.len());
        self.document.samples.push(sample);
        self.dirty = true;
        Ok(())
    }

    /// Look up one sample.
    pub fn sample(&self, id: &SampleId) -> Option<&Sample> {
        self.index.get(id).map(|&position| &self.document.samples[position])
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.document.samples.len()
    }

    /// Returns `true` if the dataset has no samples.
    pub fn is_empty(&self) -> bool {
        self.document.samples.is_empty()
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Attach a backing file and write the document to it.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<(), StitchError> {
        self.path = Some(path.as_ref().to_path_buf());
        self.dirty = true;
        self.save()
    }

    fn rebuild_index(&mut self) -> Result<(), StitchError> {
        self.index.clear();
        for (position, sample) in self.document.samples.iter().enumerate() {
            if self.index.insert(sample.id.clone(), position).is_some() {
                return Err(StitchError::DatasetError(format!(
                    "duplicate sample id {}",
                    sample.id
                )));
            }
        }
        Ok(())
    }

    fn sample_mut(&mut self, id: &SampleId) -> Result<&mut Sample, StitchError> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| StitchError::DatasetError(format!("unknown sample id {id}")))?;
        Ok(&mut self.document.samples[position])
    }

    fn write_document(&self, path: &Path) -> Result<(), StitchError> {
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temporary = NamedTempFile::new_in(directory)?;
        {
            let mut writer = BufWriter::new(temporary.as_file());
            serde_json::to_writer_pretty(&mut writer, &self.document)?;
            writer.flush()?;
        }
        temporary.persist(path).map_err(|error| error.error)?;
        Ok(())
    }
}

/// Media type implied by a file extension.
fn media_type_from_path(path: &Path) -> MediaType {
    if ImageFormat::from_path(path).is_ok() {
        return MediaType::Image;
    }
    match path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp4" | "mov" | "mkv" | "avi" | "webm") => MediaType::Video,
        Some("pcd" | "ply" | "bin" | "las" | "laz") => MediaType::PointCloud,
        Some("fo3d" | "glb" | "gltf" | "obj") => MediaType::ThreeD,
        _ => MediaType::Other,
    }
}

impl Dataset for JsonDataset {
    fn name(&self) -> &str {
        &self.document.name
    }

    fn group_media_types(&self) -> BTreeMap<String, MediaType> {
        let mut media_types = self.document.group_media_types.clone();
        for sample in &self.document.samples {
            if let (Some(group), Some(filepath)) = (&sample.group, &sample.filepath) {
                if !media_types.contains_key(group) {
                    media_types.insert(group.clone(), media_type_from_path(filepath));
                }
            }
        }
        media_types
    }

    fn field_schema(&self) -> BTreeMap<String, FieldKind> {
        let mut schema: BTreeMap<String, FieldKind> = BTreeMap::new();
        for sample in &self.document.samples {
            for (name, value) in &sample.fields {
                let kind = FieldKind::of(value);
                schema
                    .entry(name.clone())
                    .and_modify(|existing| *existing = existing.merge(kind))
                    .or_insert(kind);
            }
        }
        schema
    }

    fn samples(&self) -> Vec<Sample> {
        self.document.samples.clone()
    }

    fn set_field(
        &mut self,
        id: &SampleId,
        field: &str,
        value: FieldValue,
    ) -> Result<(), StitchError> {
        let sample = self.sample_mut(id)?;
        sample.fields.insert(field.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    fn clear_field(&mut self, id: &SampleId, field: &str) -> Result<bool, StitchError> {
        let sample = self.sample_mut(id)?;
        let had_field = match sample.fields.get_mut(field) {
            Some(value) => {
                *value = FieldValue::Null;
                true
            }
            None => false,
        };
        self.dirty |= had_field;
        Ok(had_field)
    }

    fn delete_field(&mut self, field: &str) -> Result<(), StitchError> {
        for sample in &mut self.document.samples {
            if sample.fields.remove(field).is_some() {
                self.dirty = true;
            }
        }
        Ok(())
    }

    fn match_field(&self, field: &str, value: &FieldValue) -> Vec<Sample> {
        self.document
            .samples
            .iter()
            .filter(|sample| sample.get(field) == Some(value))
            .cloned()
            .collect()
    }

    fn save(&mut self) -> Result<(), StitchError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(path) = &self.path {
            log::debug!("Saving dataset '{}' to {:?}", self.document.name, path);
            self.write_document(path)?;
        }
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_inference() {
        assert_eq!(media_type_from_path(Path::new("a/b.JPG")), MediaType::Image);
        assert_eq!(media_type_from_path(Path::new("a/b.png")), MediaType::Image);
        assert_eq!(media_type_from_path(Path::new("a/b.pcd")), MediaType::PointCloud);
        assert_eq!(media_type_from_path(Path::new("a/b.mp4")), MediaType::Video);
        assert_eq!(media_type_from_path(Path::new("a/b")), MediaType::Other);
    }

    #[test]
    fn declared_media_type_wins() {
        let mut dataset = JsonDataset::new("t").with_media_type("CAM", MediaType::Other);
        dataset
            .add_sample(Sample::new("1").with_group("CAM").with_filepath("x.jpg"))
            .unwrap();
        dataset
            .add_sample(Sample::new("2").with_group("CAM2").with_filepath("x.jpg"))
            .unwrap();
        let media_types = dataset.group_media_types();
        assert_eq!(media_types["CAM"], MediaType::Other);
        assert_eq!(media_types["CAM2"], MediaType::Image);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut dataset = JsonDataset::new("t");
        dataset.add_sample(Sample::new("1")).unwrap();
        assert!(dataset.add_sample(Sample::new("1")).is_err());
    }
}
