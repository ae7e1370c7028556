//! Unit tests for pipeline orchestration
//!
//! Tests cover:
//! - Loading cells from JSON and YAML files
//! - Stage reports and stats
//! - Batch conversion with isolated failures

use std::path::{Path, PathBuf};
use std::sync::Arc;
use threatdraw::config::Config;
use threatdraw::errors::{InputError, ThreatdrawError};
use threatdraw::pipeline::{load_cells, run_batch, Pipeline};
use threatdraw::threagile::DocumentMetadata;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn metadata() -> DocumentMetadata {
    DocumentMetadata::from_config(&Config::default().mapping, "2024-05-01")
}

#[test]
fn test_load_wrapped_json_fixture() {
    let cells = load_cells(&fixture("shop.json")).unwrap();
    assert_eq!(cells.len(), 5);
    assert_eq!(cells[2].label, "Web App");
    assert!(cells[4].edge);
    assert_eq!(cells[4].source.as_deref(), Some("2"));
}

#[test]
fn test_load_missing_file_fails() {
    assert!(load_cells(&fixture("does-not-exist.json")).is_err());
}

#[test]
fn test_run_file_reports_every_stage() {
    let pipeline = Pipeline::new(Config::default()).unwrap();
    let out = pipeline.run_file(&fixture("shop.json"), &metadata()).unwrap();

    let stages: Vec<_> = out.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(
        stages,
        vec!["components", "composites", "flows", "threats", "mapping", "validation"]
    );
    assert_eq!(out.stats.components, 2);
    assert_eq!(out.stats.flows, 1);
    assert_eq!(out.stats.relations, 1);
    assert_eq!(out.stats.trust_boundaries, 1);
}

#[test]
fn test_style_annotations_reach_document() {
    let pipeline = Pipeline::new(Config::default()).unwrap();
    let out = pipeline.run_file(&fixture("shop.json"), &metadata()).unwrap();
    let db = out.components.iter().find(|c| c.id == "3").unwrap();
    assert_eq!(db.data_sensitivity.as_str(), "restricted");

    let asset = out
        .document
        .technical_assets
        .iter()
        .find(|a| a.id == "asset-3")
        .unwrap();
    assert_eq!(asset.integrity, "mission-critical");
}

#[test]
fn test_duplicate_ids_fail_the_file() {
    let pipeline = Pipeline::new(Config::default()).unwrap();
    let err = pipeline
        .run_file(&fixture("broken.json"), &metadata())
        .unwrap_err();
    assert!(matches!(
        err,
        ThreatdrawError::Input(InputError::DuplicateId { ref id }) if id == "2"
    ));
}

#[test]
fn test_metadata_overrides() {
    let pipeline = Pipeline::new(Config::default()).unwrap();
    let meta = metadata().with_title("Shop").with_author("secops");
    let out = pipeline.run_file(&fixture("shop.json"), &meta).unwrap();
    assert_eq!(out.document.title, "Shop");
    assert_eq!(out.document.author, "secops");
}

#[tokio::test]
async fn test_batch_keeps_input_order() {
    let pipeline = Arc::new(Pipeline::new(Config::default()).unwrap());
    let paths = vec![fixture("broken.json"), fixture("shop.json")];
    let results = run_batch(pipeline, paths.clone(), metadata()).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].path, paths[0]);
    assert!(results[0].outcome.is_err());
    assert_eq!(results[1].path, paths[1]);
    assert!(results[1].outcome.as_ref().unwrap().is_valid());
}
