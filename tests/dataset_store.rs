//! JSON dataset store: loading, schema introspection, field edits, saving.

use std::fs;

use serde_json::{Value, json};

use scenestitch::{Dataset, FieldKind, JsonDataset, MediaType, Sample, SampleId, StitchError};

const DOCUMENT: &str = r#"{
  "name": "drive-0042",
  "group_media_types": { "LIDAR_TOP": "point-cloud" },
  "samples": [
    {
      "id": "s-1",
      "filepath": "/data/CAM_FRONT/000001.jpg",
      "group": "CAM_FRONT",
      "fields": { "scene_id": "scene-0061", "timestamp": 1532402927.612 }
    },
    {
      "id": "s-2",
      "filepath": "/data/CAM_FRONT/000002.jpg",
      "group": "CAM_FRONT",
      "fields": { "scene_id": "scene-0061", "timestamp": 1532402927.662, "weather": null }
    },
    {
      "id": "s-3",
      "filepath": "/data/LIDAR_TOP/000001.pcd.bin",
      "group": "LIDAR_TOP",
      "fields": { "scene_id": "scene-0103", "timestamp": 1532402927 }
    }
  ]
}"#;

fn open_document() -> (tempfile::TempDir, JsonDataset) {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("drive.json");
    fs::write(&path, DOCUMENT).unwrap();
    let dataset = JsonDataset::open(&path).unwrap();
    (directory, dataset)
}

#[test]
fn open_reads_document() {
    let (_directory, dataset) = open_document();
    assert_eq!(dataset.name(), "drive-0042");
    assert_eq!(dataset.len(), 3);
    assert!(dataset.path().is_some());
}

#[test]
fn media_types_declared_and_inferred() {
    let (_directory, dataset) = open_document();
    let media_types = dataset.group_media_types();
    assert_eq!(media_types["CAM_FRONT"], MediaType::Image);
    assert_eq!(media_types["LIDAR_TOP"], MediaType::PointCloud);
}

#[test]
fn schema_merges_kinds() {
    let (_directory, dataset) = open_document();
    let schema = dataset.field_schema();
    assert_eq!(schema["scene_id"], FieldKind::String);
    assert_eq!(schema["timestamp"], FieldKind::Float);
    assert_eq!(schema["weather"], FieldKind::Null);
    assert!(dataset.has_field("weather"));
    assert!(!dataset.has_field("video_path"));
}

#[test]
fn distinct_values_are_sorted_and_unique() {
    let (_directory, dataset) = open_document();
    assert_eq!(
        dataset.distinct_values("scene_id"),
        vec![json!("scene-0061"), json!("scene-0103")]
    );
    assert!(dataset.distinct_values("weather").is_empty());
}

#[test]
fn match_field_filters_by_equality() {
    let (_directory, dataset) = open_document();
    let matched = dataset.match_field("scene_id", &json!("scene-0061"));
    let ids: Vec<String> = matched.iter().map(|sample| sample.id.to_string()).collect();
    assert_eq!(ids, vec!["s-1", "s-2"]);
}

#[test]
fn edits_persist_across_save() {
    let (directory, mut dataset) = open_document();
    dataset
        .set_field(&SampleId::from("s-1"), "video_path", json!("/v/a.mp4"))
        .unwrap();
    dataset.save().unwrap();

    let reopened = JsonDataset::open(directory.path().join("drive.json")).unwrap();
    let sample = reopened.sample(&SampleId::from("s-1")).unwrap();
    assert_eq!(sample.get("video_path"), Some(&json!("/v/a.mp4")));
    assert_eq!(reopened.samples_with_field("video_path").len(), 1);
}

#[test]
fn clear_then_delete_field() {
    let (_directory, mut dataset) = open_document();
    let id = SampleId::from("s-2");

    assert!(dataset.clear_field(&id, "weather").unwrap());
    assert!(!dataset.clear_field(&id, "video_path").unwrap());
    assert_eq!(dataset.sample(&id).unwrap().get("weather"), Some(&Value::Null));

    dataset.delete_field("weather").unwrap();
    assert!(!dataset.has_field("weather"));
}

#[test]
fn unknown_sample_is_a_dataset_error() {
    let (_directory, mut dataset) = open_document();
    let result = dataset.set_field(&SampleId::from("missing"), "x", json!(1));
    assert!(matches!(result, Err(StitchError::DatasetError(_))));
}

#[test]
fn duplicate_ids_rejected_on_open() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("dup.json");
    fs::write(
        &path,
        r#"{ "name": "dup", "samples": [ { "id": "a" }, { "id": "a" } ] }"#,
    )
    .unwrap();
    assert!(matches!(
        JsonDataset::open(&path),
        Err(StitchError::DatasetError(_))
    ));
}

#[test]
fn malformed_document_is_a_format_error() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("bad.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        JsonDataset::open(&path),
        Err(StitchError::DatasetFormat(_))
    ));
}

#[test]
fn in_memory_save_is_a_no_op_until_attached() {
    let directory = tempfile::tempdir().unwrap();
    let mut dataset = JsonDataset::new("scratch");
    dataset.add_sample(Sample::new("a").with_field("k", 1)).unwrap();
    dataset.save().unwrap();
    assert!(dataset.path().is_none());

    let path = directory.path().join("scratch.json");
    dataset.save_as(&path).unwrap();
    let reopened = JsonDataset::open(&path).unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.name(), "scratch");
}
