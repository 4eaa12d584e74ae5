//! The dataset collaborator.
//!
//! `scenestitch` never talks to a storage engine directly. Everything it needs
//! from the grouped dataset (query by field equality, per-sample field reads
//! and writes, schema introspection, and saving mutated samples) goes through
//! the [`Dataset`] trait. [`JsonDataset`](crate::JsonDataset) is the bundled
//! file-backed implementation.
//!
//! Field names are always supplied by configuration; the only names this
//! module knows about are the built-in sample attributes in
//! [`RESERVED_FIELDS`].

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StitchError;

/// A dynamically typed sample field value.
pub type FieldValue = Value;

/// Built-in sample attributes that cannot be used as custom field names.
pub const RESERVED_FIELDS: &[&str] = &["id", "filepath", "group"];

/// Stable identifier of a sample within its dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(pub String);

impl Display for SampleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl From<&str> for SampleId {
    fn from(value: &str) -> Self {
        SampleId(value.to_string())
    }
}

/// One frame of one sensor.
///
/// `group` is the group slice the sample belongs to, which for multi-sensor
/// recordings is the sensor name (`CAM_FRONT`, `LIDAR_TOP`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Sample identifier.
    pub id: SampleId,
    /// Path of the original media file, if any.
    #[serde(default)]
    pub filepath: Option<PathBuf>,
    /// Group slice (sensor) name.
    #[serde(default)]
    pub group: Option<String>,
    /// Custom fields.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Sample {
    /// Create a sample with no custom fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: SampleId(id.into()),
            filepath: None,
            group: None,
            fields: BTreeMap::new(),
        }
    }

    /// Set the media file path.
    #[must_use]
    pub fn with_filepath(mut self, path: impl Into<PathBuf>) -> Self {
        self.filepath = Some(path.into());
        self
    }

    /// Set the group slice (sensor name).
    #[must_use]
    pub fn with_group(mut self, sensor: impl Into<String>) -> Self {
        self.group = Some(sensor.into());
        self
    }

    /// Set a custom field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Read a custom field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns `true` if `name` holds something other than null or an empty
    /// string.
    pub fn has_value(&self, name: &str) -> bool {
        match self.fields.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => !text.is_empty(),
            Some(_) => true,
        }
    }

    /// The sensor this sample was captured by.
    pub fn sensor(&self) -> Option<&str> {
        self.group.as_deref()
    }
}

/// Media type of a group slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    /// Still images; the only kind that can be stitched into a video.
    Image,
    /// Video files.
    Video,
    /// Point clouds (lidar, radar).
    PointCloud,
    /// 3D scenes.
    #[serde(rename = "3d")]
    ThreeD,
    /// Anything else.
    #[serde(other)]
    Other,
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::PointCloud => "point-cloud",
            MediaType::ThreeD => "3d",
            MediaType::Other => "other",
        };
        f.write_str(name)
    }
}

/// Inferred type of a custom field, for schema introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Only null values seen.
    Null,
    /// Boolean.
    Bool,
    /// Integer number.
    Int,
    /// Floating point number.
    Float,
    /// String.
    String,
    /// List.
    List,
    /// Embedded document.
    Object,
    /// Values of more than one type.
    Mixed,
}

impl FieldKind {
    /// The kind of a single value.
    pub fn of(value: &FieldValue) -> Self {
        match value {
            Value::Null => FieldKind::Null,
            Value::Bool(_) => FieldKind::Bool,
            Value::Number(number) if number.is_f64() => FieldKind::Float,
            Value::Number(_) => FieldKind::Int,
            Value::String(_) => FieldKind::String,
            Value::Array(_) => FieldKind::List,
            Value::Object(_) => FieldKind::Object,
        }
    }

    /// Combine the kinds of two values of the same field.
    pub fn merge(self, other: FieldKind) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (FieldKind::Null, kind) | (kind, FieldKind::Null) => kind,
            (FieldKind::Int, FieldKind::Float) | (FieldKind::Float, FieldKind::Int) => {
                FieldKind::Float
            }
            _ => FieldKind::Mixed,
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            FieldKind::Null => "null",
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::List => "list",
            FieldKind::Object => "object",
            FieldKind::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// Capability interface over a grouped multi-sensor dataset.
///
/// Reads return owned [`Sample`] snapshots; writes address samples by
/// [`SampleId`]. Mutations are not required to be durable until
/// [`save`](Dataset::save) is called.
pub trait Dataset {
    /// Dataset name.
    fn name(&self) -> &str;

    /// Media type of every group slice (sensor).
    fn group_media_types(&self) -> BTreeMap<String, MediaType>;

    /// Custom field names and their inferred kinds.
    fn field_schema(&self) -> BTreeMap<String, FieldKind>;

    /// Snapshot of every sample.
    fn samples(&self) -> Vec<Sample>;

    /// Set `field` on one sample.
    fn set_field(&mut self, id: &SampleId, field: &str, value: FieldValue)
    -> Result<(), StitchError>;

    /// Set `field` to null on one sample. Returns `false` if the sample did
    /// not have the field.
    fn clear_field(&mut self, id: &SampleId, field: &str) -> Result<bool, StitchError>;

    /// Remove `field` from every sample and from the schema.
    fn delete_field(&mut self, field: &str) -> Result<(), StitchError>;

    /// Persist pending mutations.
    fn save(&mut self) -> Result<(), StitchError>;

    /// Returns `true` if `field` is part of the schema.
    fn has_field(&self, field: &str) -> bool {
        self.field_schema().contains_key(field)
    }

    /// Samples whose `field` equals `value`.
    fn match_field(&self, field: &str, value: &FieldValue) -> Vec<Sample> {
        self.samples()
            .into_iter()
            .filter(|sample| sample.get(field) == Some(value))
            .collect()
    }

    /// Samples whose `field` holds a non-empty value.
    fn samples_with_field(&self, field: &str) -> Vec<Sample> {
        self.samples()
            .into_iter()
            .filter(|sample| sample.has_value(field))
            .collect()
    }

    /// Distinct non-null values of `field`, in a deterministic order.
    fn distinct_values(&self, field: &str) -> Vec<FieldValue> {
        let mut values: BTreeMap<String, FieldValue> = BTreeMap::new();
        for sample in self.samples() {
            if let Some(value) = sample.get(field).filter(|value| !value.is_null()) {
                values.entry(value.to_string()).or_insert_with(|| value.clone());
            }
        }
        values.into_values().collect()
    }
}

/// Returns `true` if `sensor` is a camera, i.e. its group slice holds images.
///
/// This is the default selection rule when no target sensors are configured.
pub fn is_camera_sensor(media_types: &BTreeMap<String, MediaType>, sensor: &str) -> bool {
    media_types.get(sensor) == Some(&MediaType::Image)
}

/// Names of every camera sensor, sorted.
pub fn camera_sensors(media_types: &BTreeMap<String, MediaType>) -> Vec<String> {
    media_types
        .keys()
        .filter(|name| is_camera_sensor(media_types, name))
        .cloned()
        .collect()
}
