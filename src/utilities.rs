//! Internal utility functions.
//!
//! Helpers for output naming, scene labels, encoder argument formatting, and
//! other shared logic that does not belong in any single public module.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Render a scene ID value the way it appears in file names and reports.
///
/// Strings are used verbatim; other values use their JSON form.
pub fn scene_id_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Deterministic output path for one (scene, sensor) pair.
///
/// `directory` is the directory of the track's first frame.
pub fn scene_video_path(directory: &Path, scene_label: &str, sensor: &str) -> PathBuf {
    directory.join(format!("scene_{scene_label}_{sensor}_generated.mp4"))
}

/// Sibling path an encoder writes to before the output is complete.
pub(crate) fn partial_output_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(output.file_name().unwrap_or_default());
    name.push(".partial");
    output.with_file_name(name)
}

/// Container format name for an output path, as FFmpeg's muxers spell it.
pub(crate) fn container_format(output: &Path) -> &'static str {
    match output
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mkv") => "matroska",
        Some("mov") => "mov",
        Some("avi") => "avi",
        Some("webm") => "webm",
        _ => "mp4",
    }
}

/// Quote a path for an FFmpeg concat list.
pub(crate) fn escape_concat_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Largest even value not above `value`, at least 2.
pub(crate) fn even_dimension(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Keep the last `max_lines` non-empty lines of encoder output.
pub(crate) fn diagnostic_tail(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
