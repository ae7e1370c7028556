//! Unit tests for the config module
//!
//! Tests cover:
//! - Defaults
//! - YAML and TOML loading
//! - Rejection of unusable settings

use std::io::Write;
use threatdraw::config::Config;
use threatdraw::errors::ConfigError;
use threatdraw::model::ThreatType;

mod default_tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mapping.metadata.title, "Threat Model");
        assert_eq!(config.validation.component_naming, "^[a-z0-9-]+$");
        assert!(config.validation.require_trust_boundaries);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }
}

mod loading_tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
detection:
  min_confidence: 0.5
mapping:
  metadata:
    author: secops
validation:
  max_tags: 3
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.detection.min_confidence, 0.5);
        assert_eq!(config.mapping.metadata.author, "secops");
        assert_eq!(config.mapping.metadata.title, "Threat Model");
        assert_eq!(config.validation.max_tags, 3);
        assert_eq!(
            config.validation.max_relations,
            Config::default().validation.max_relations
        );
    }

    #[test]
    fn test_toml_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[detection.risk_factors.injection]\ninput_validation = 0.2\n\n[mapping.metadata]\ntitle = \"Payments\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.mapping.metadata.title, "Payments");
        let factors = &config.detection.risk_factors[&ThreatType::Injection];
        assert_eq!(factors["input_validation"], 0.2);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "validation:\n  max_relations: 7").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.validation.max_relations, 7);
    }

    #[test]
    fn test_load_missing_path_fails() {
        assert!(Config::load(Some("/nonexistent/threatdraw.yaml")).is_err());
    }
}

mod validation_tests {
    use super::*;

    #[test]
    fn test_confidence_out_of_range() {
        let mut config = Config::default();
        config.detection.min_confidence = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_naming_pattern() {
        let mut config = Config::default();
        config.validation.asset_naming = "[a-z".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { ref field, .. }) if field == "validation.asset_naming"
        ));
    }

    #[test]
    fn test_inverted_bounds() {
        let mut config = Config::default();
        config.validation.min_description_length = 100;
        config.validation.max_description_length = 10;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_composite_risk_factors_rejected() {
        let config = Config::from_yaml(
            "detection:\n  risk_factors:\n    data_breach:\n      exposure: 0.5\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
