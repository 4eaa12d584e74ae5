//! Undo an assembly run.
//!
//! [`reset_video_field`] finds every sample whose video path field is set,
//! optionally deletes the referenced videos, and removes the field from the
//! dataset. Running it twice is safe: once the field is gone the second run
//! reports nothing to do.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::configuration::ResetOptions;
use crate::dataset::{Dataset, Sample};
use crate::error::StitchError;
use crate::progress::{OperationType, ProgressTracker};

/// A video file that could not be deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionError {
    /// File that was not deleted.
    pub path: PathBuf,
    /// Why.
    pub error: String,
}

/// What a reset changed, or would change in a dry run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResetReport {
    /// Field that was reset.
    pub field: String,
    /// `true` if nothing was changed.
    pub dry_run: bool,
    /// Samples with a non-empty value in the field.
    pub affected_samples: usize,
    /// Distinct video files referenced by those samples.
    pub video_files: Vec<PathBuf>,
    /// Files deleted.
    pub deleted_files: usize,
    /// Referenced files that were already gone.
    pub missing_files: usize,
    /// Files that could not be deleted.
    pub deletion_errors: Vec<DeletionError>,
    /// `true` once the field has been removed from the dataset.
    pub field_removed: bool,
}

impl ResetReport {
    fn empty(options: &ResetOptions) -> Self {
        Self {
            field: options.field.clone(),
            dry_run: options.dry_run,
            ..Self::default()
        }
    }

    /// Returns `true` if every deletion succeeded.
    pub fn is_success(&self) -> bool {
        self.deletion_errors.is_empty()
    }
}

/// Remove the video path field and, unless told otherwise, the videos it
/// points to.
///
/// Deletion failures are recorded per file and do not stop the reset; the
/// field is cleared after every deletion has been attempted. A file that is
/// already gone counts as missing, not as an error.
///
/// # Errors
///
/// - [`StitchError::InvalidConfiguration`] for an empty field name.
/// - Any dataset error raised while clearing the field or saving.
pub fn reset_video_field<D: Dataset + ?Sized>(
    dataset: &mut D,
    options: &ResetOptions,
) -> Result<ResetReport, StitchError> {
    if options.field.trim().is_empty() {
        return Err(StitchError::InvalidConfiguration(
            "reset field must not be empty".to_string(),
        ));
    }

    let mut report = ResetReport::empty(options);
    if !dataset.has_field(&options.field) {
        log::info!(
            "Dataset '{}' has no field '{}'; nothing to reset",
            dataset.name(),
            options.field
        );
        return Ok(report);
    }

    let samples = dataset.samples_with_field(&options.field);
    report.affected_samples = samples.len();
    report.video_files = referenced_files(&samples, &options.field);
    log::info!(
        "Resetting '{}' on {} samples ({} video files){}",
        options.field,
        report.affected_samples,
        report.video_files.len(),
        if options.dry_run { " [dry run]" } else { "" }
    );

    if options.dry_run {
        return Ok(report);
    }

    if options.delete_files {
        let mut tracker = ProgressTracker::new(
            options.progress.clone(),
            OperationType::Reset,
            Some(report.video_files.len() as u64),
        );
        for path in &report.video_files {
            match fs::remove_file(path) {
                Ok(()) => {
                    log::debug!("Deleted {:?}", path);
                    report.deleted_files += 1;
                }
                Err(error) if error.kind() == IoErrorKind::NotFound => {
                    log::debug!("Already gone: {:?}", path);
                    report.missing_files += 1;
                }
                Err(error) => {
                    log::warn!("Could not delete {:?}: {error}", path);
                    report.deletion_errors.push(DeletionError {
                        path: path.clone(),
                        error: error.to_string(),
                    });
                }
            }
            tracker.advance(Some(path.display().to_string()));
        }
    }

    for sample in &samples {
        dataset.clear_field(&sample.id, &options.field)?;
    }
    dataset.delete_field(&options.field)?;
    dataset.save()?;
    report.field_removed = true;

    log::info!(
        "Reset complete: {} deleted, {} missing, {} errors",
        report.deleted_files,
        report.missing_files,
        report.deletion_errors.len()
    );
    Ok(report)
}

/// Distinct string paths held by `field`, sorted.
fn referenced_files(samples: &[Sample], field: &str) -> Vec<PathBuf> {
    samples
        .iter()
        .filter_map(|sample| match sample.get(field) {
            Some(Value::String(path)) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => None,
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_files_are_distinct() {
        let samples = vec![
            Sample::new("a").with_field("video_path", "/v/scene_1_CAM_generated.mp4"),
            Sample::new("b").with_field("video_path", "/v/scene_1_CAM_generated.mp4"),
            Sample::new("c").with_field("video_path", 7),
            Sample::new("d"),
        ];
        assert_eq!(
            referenced_files(&samples, "video_path"),
            vec![PathBuf::from("/v/scene_1_CAM_generated.mp4")]
        );
    }
}
