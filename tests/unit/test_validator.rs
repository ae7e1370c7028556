//! Unit tests for the output validator
//!
//! Documents are produced by the pipeline, then tampered with to exercise
//! each rule family.

use serde_json::{json, Value};
use threatdraw::config::{Config, ValidationRules};
use threatdraw::errors::ValidationError;
use threatdraw::model::Cell;
use threatdraw::pipeline::Pipeline;
use threatdraw::threagile::{parse_document, DocumentMetadata, OutputValidator};

fn generated() -> Value {
    let cells = vec![
        Cell::vertex("2", "Web App", "rounded=1"),
        Cell::vertex("3", "Database", "shape=cylinder"),
        Cell::connector("4", "HTTPS", "2", "3"),
    ];
    let meta = DocumentMetadata::from_config(&Config::default().mapping, "2024-05-01");
    let out = Pipeline::new(Config::default())
        .unwrap()
        .run("validator", &cells, &meta)
        .unwrap();
    out.document.to_value().unwrap()
}

fn validator() -> OutputValidator {
    OutputValidator::new(&ValidationRules::default()).unwrap()
}

#[test]
fn test_generated_document_passes() {
    let report = validator().validate_post_conversion(&generated());
    assert!(report.is_valid, "{:?}", report.errors);
}

#[test]
fn test_yaml_round_trip_through_parser() {
    let meta = DocumentMetadata::from_config(&Config::default().mapping, "2024-05-01");
    let out = Pipeline::new(Config::default())
        .unwrap()
        .run("yaml", &[Cell::vertex("2", "Web App", "")], &meta)
        .unwrap();
    let value = parse_document(&out.document.to_yaml().unwrap()).unwrap();
    assert!(validator().validate_post_conversion(&value).is_valid);
}

#[test]
fn test_parse_rejects_non_mapping() {
    let list = parse_document("- just\n- a list\n").unwrap();
    let report = validator().validate_post_conversion(&list);
    assert!(!report.is_valid);
    assert_eq!(report.errors, vec![ValidationError::NotAMapping.to_string()]);
    assert!(matches!(
        parse_document("title: [unclosed"),
        Err(ValidationError::Parse(_))
    ));
}

#[test]
fn test_missing_trust_boundaries_fails_compliance() {
    let mut doc = generated();
    doc["trust_boundaries"] = json!([]);
    let report = validator().validate_post_conversion(&doc);
    assert!(!report.is_valid);
    assert!(report
        .errors
        .iter()
        .any(|e| e.starts_with("Compliance:")));
}

#[test]
fn test_dangling_relation_target() {
    let mut doc = generated();
    doc["relations"][0]["target"] = json!("ghost");
    let report = validator().validate_post_conversion(&doc);
    assert!(!report.is_valid);
    assert!(report
        .unresolved_references()
        .any(|e| e.contains("'ghost'")));
}

#[test]
fn test_bad_date_and_level() {
    let mut doc = generated();
    doc["date"] = json!("May 1st");
    doc["technical_assets"][0]["confidentiality"] = json!("top-secret");
    let report = validator().validate_post_conversion(&doc);
    assert!(report.errors.iter().any(|e| e.contains("date 'May 1st'")));
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("invalid confidentiality level 'top-secret'")));
}

#[test]
fn test_unknown_vocabulary_is_only_a_warning() {
    let mut doc = generated();
    doc["components"][0]["type"] = json!("mainframe");
    let report = validator().validate_post_conversion(&doc);
    assert!(report.is_valid, "{:?}", report.errors);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("unknown component type 'mainframe'")));
}

#[test]
fn test_naming_follows_configured_pattern() {
    let rules = ValidationRules {
        component_naming: "^[a-z]+$".into(),
        ..Default::default()
    };
    let report = OutputValidator::new(&rules)
        .unwrap()
        .validate_value(&generated());
    // "web-app" carries a hyphen
    assert!(report.errors.iter().any(|e| e.contains("name 'web-app'")));
}
