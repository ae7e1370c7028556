//! Configuration Management
//!
//! Resolved configuration consumed by the pipeline. Every field has a
//! built-in default so an empty file (or no file at all) is valid.
//! Configuration covers:
//! - Detection thresholds and risk-factor overrides
//! - Output mappings (component types, protocols, security levels, relations)
//! - Document metadata defaults
//! - Validation rules (naming patterns, length bounds, collection limits)

use crate::errors::ConfigError;
use crate::model::ThreatType;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_CONFIG_PATHS: [&str; 3] = ["threatdraw.yaml", "threatdraw.yml", "threatdraw.toml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub mapping: MappingConfig,

    #[serde(default)]
    pub validation: ValidationRules,
}

// ============================================================================
// Detection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Winning component scores below this emit a low-confidence warning
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Replaces the built-in risk factors of a simple threat type
    #[serde(default)]
    pub risk_factors: BTreeMap<ThreatType, BTreeMap<String, f64>>,
}

fn default_min_confidence() -> f64 {
    0.3
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            risk_factors: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Mapping
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Internal component type -> output component type
    #[serde(default = "default_component_type_map")]
    pub component_types: BTreeMap<String, String>,
    #[serde(default = "default_component_type")]
    pub default_component_type: String,

    #[serde(default = "default_protocol_map")]
    pub protocols: BTreeMap<String, String>,
    #[serde(default = "default_protocol")]
    pub default_protocol: String,

    #[serde(default = "default_relation_type_map")]
    pub relation_types: BTreeMap<String, String>,
    #[serde(default = "default_relation_type")]
    pub default_relation_type: String,

    #[serde(default)]
    pub security_levels: SecurityLevelMapping,

    #[serde(default)]
    pub metadata: MetadataDefaults,
}

fn default_component_type() -> String {
    "service".to_string()
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_relation_type() -> String {
    "data-flow".to_string()
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn identity_map(values: &[&str]) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|v| (v.to_string(), v.to_string()))
        .collect()
}

fn default_component_type_map() -> BTreeMap<String, String> {
    string_map(&[
        ("web-application", "web-application"),
        ("api", "api"),
        ("database", "database"),
        ("cloud-service", "service"),
        ("serverless", "function"),
        ("microservice", "service"),
        ("load-balancer", "load-balancer"),
        ("cache", "cache"),
        ("message-queue", "message-queue"),
        ("process", "service"),
        ("gateway", "gateway"),
        ("cdn", "content-delivery"),
        ("monitoring", "monitoring"),
    ])
}

fn default_protocol_map() -> BTreeMap<String, String> {
    identity_map(&[
        "http", "https", "ws", "wss", "grpc", "tcp", "udp", "mqtt", "amqp", "kafka",
    ])
}

fn default_relation_type_map() -> BTreeMap<String, String> {
    identity_map(&[
        "data-flow",
        "trust-boundary",
        "communication",
        "dependency",
        "inheritance",
        "composition",
        "aggregation",
        "association",
    ])
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            component_types: default_component_type_map(),
            default_component_type: default_component_type(),
            protocols: default_protocol_map(),
            default_protocol: default_protocol(),
            relation_types: default_relation_type_map(),
            default_relation_type: default_relation_type(),
            security_levels: SecurityLevelMapping::default(),
            metadata: MetadataDefaults::default(),
        }
    }
}

impl MappingConfig {
    pub fn component_type(&self, internal: &str) -> String {
        self.component_types
            .get(internal)
            .cloned()
            .unwrap_or_else(|| self.default_component_type.clone())
    }

    pub fn protocol(&self, internal: &str) -> String {
        self.protocols
            .get(internal)
            .cloned()
            .unwrap_or_else(|| self.default_protocol.clone())
    }

    pub fn relation_type(&self, internal: &str) -> String {
        self.relation_types
            .get(internal)
            .cloned()
            .unwrap_or_else(|| self.default_relation_type.clone())
    }
}

/// Input level -> output level, with a default for unknown inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityLevelMapping {
    #[serde(default = "default_confidentiality_map")]
    pub confidentiality: BTreeMap<String, String>,
    #[serde(default = "default_confidentiality")]
    pub default_confidentiality: String,

    #[serde(default = "default_criticality_map")]
    pub integrity: BTreeMap<String, String>,
    #[serde(default = "default_criticality")]
    pub default_integrity: String,

    #[serde(default = "default_criticality_map")]
    pub availability: BTreeMap<String, String>,
    #[serde(default = "default_criticality")]
    pub default_availability: String,
}

fn default_confidentiality() -> String {
    "internal".to_string()
}

fn default_criticality() -> String {
    "operational".to_string()
}

fn default_confidentiality_map() -> BTreeMap<String, String> {
    identity_map(&[
        "public",
        "internal",
        "restricted",
        "confidential",
        "strictly-confidential",
    ])
}

fn default_criticality_map() -> BTreeMap<String, String> {
    identity_map(&["operational", "important", "critical", "mission-critical"])
}

impl Default for SecurityLevelMapping {
    fn default() -> Self {
        Self {
            confidentiality: default_confidentiality_map(),
            default_confidentiality: default_confidentiality(),
            integrity: default_criticality_map(),
            default_integrity: default_criticality(),
            availability: default_criticality_map(),
            default_availability: default_criticality(),
        }
    }
}

impl SecurityLevelMapping {
    pub fn confidentiality(&self, level: Option<&str>) -> String {
        lookup_level(&self.confidentiality, level, &self.default_confidentiality)
    }

    pub fn integrity(&self, level: Option<&str>) -> String {
        lookup_level(&self.integrity, level, &self.default_integrity)
    }

    pub fn availability(&self, level: Option<&str>) -> String {
        lookup_level(&self.availability, level, &self.default_availability)
    }
}

fn lookup_level(map: &BTreeMap<String, String>, level: Option<&str>, default: &str) -> String {
    level
        .and_then(|l| map.get(&l.trim().to_lowercase()))
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDefaults {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_author")]
    pub author: String,
}

fn default_title() -> String {
    "Threat Model".to_string()
}

fn default_description() -> String {
    "Threat model generated from an architecture diagram".to_string()
}

fn default_author() -> String {
    "threatdraw".to_string()
}

impl Default for MetadataDefaults {
    fn default() -> Self {
        Self {
            title: default_title(),
            description: default_description(),
            author: default_author(),
        }
    }
}

// ============================================================================
// Validation rules
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default = "default_naming")]
    pub component_naming: String,
    #[serde(default = "default_naming")]
    pub asset_naming: String,
    #[serde(default = "default_date_format")]
    pub date_format: String,

    #[serde(default = "default_min_description_length")]
    pub min_description_length: usize,
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,
    #[serde(default = "default_min_name_length")]
    pub min_name_length: usize,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,

    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default = "default_max_assets")]
    pub max_technical_assets: usize,
    #[serde(default = "default_max_assets")]
    pub max_data_assets: usize,
    #[serde(default = "default_max_trust_boundaries")]
    pub max_trust_boundaries: usize,
    #[serde(default = "default_max_relations")]
    pub max_relations: usize,

    #[serde(default = "default_confidentiality_levels")]
    pub confidentiality_levels: Vec<String>,
    #[serde(default = "default_criticality_levels")]
    pub integrity_levels: Vec<String>,
    #[serde(default = "default_criticality_levels")]
    pub availability_levels: Vec<String>,

    #[serde(default = "default_component_types")]
    pub component_types: Vec<String>,
    #[serde(default = "default_asset_types")]
    pub asset_types: Vec<String>,
    #[serde(default = "default_trust_boundary_types")]
    pub trust_boundary_types: Vec<String>,
    #[serde(default = "default_relation_types")]
    pub relation_types: Vec<String>,

    #[serde(default = "default_true")]
    pub require_trust_boundaries: bool,
    #[serde(default = "default_true")]
    pub require_data_assets: bool,
    #[serde(default = "default_true")]
    pub require_technical_assets: bool,
}

fn default_naming() -> String {
    "^[a-z0-9-]+$".to_string()
}

fn default_date_format() -> String {
    r"^\d{4}-\d{2}-\d{2}$".to_string()
}

fn default_min_description_length() -> usize {
    10
}

fn default_max_description_length() -> usize {
    500
}

fn default_min_name_length() -> usize {
    3
}

fn default_max_name_length() -> usize {
    100
}

fn default_max_tags() -> usize {
    10
}

fn default_max_assets() -> usize {
    50
}

fn default_max_trust_boundaries() -> usize {
    20
}

fn default_max_relations() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_confidentiality_levels() -> Vec<String> {
    strings(&[
        "public",
        "internal",
        "restricted",
        "confidential",
        "strictly-confidential",
    ])
}

fn default_criticality_levels() -> Vec<String> {
    strings(&["operational", "important", "critical", "mission-critical"])
}

fn default_component_types() -> Vec<String> {
    strings(&[
        "web-application",
        "api",
        "database",
        "service",
        "function",
        "load-balancer",
        "cache",
        "message-queue",
        "gateway",
        "content-delivery",
        "monitoring",
        "storage",
        "external-service",
    ])
}

fn default_asset_types() -> Vec<String> {
    strings(&["process", "datastore", "external-entity"])
}

fn default_trust_boundary_types() -> Vec<String> {
    strings(&[
        "network",
        "physical",
        "logical",
        "organizational",
        "legal",
        "regulatory",
    ])
}

fn default_relation_types() -> Vec<String> {
    strings(&[
        "data-flow",
        "trust-boundary",
        "communication",
        "dependency",
        "inheritance",
        "composition",
        "aggregation",
        "association",
    ])
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            component_naming: default_naming(),
            asset_naming: default_naming(),
            date_format: default_date_format(),
            min_description_length: default_min_description_length(),
            max_description_length: default_max_description_length(),
            min_name_length: default_min_name_length(),
            max_name_length: default_max_name_length(),
            max_tags: default_max_tags(),
            max_technical_assets: default_max_assets(),
            max_data_assets: default_max_assets(),
            max_trust_boundaries: default_max_trust_boundaries(),
            max_relations: default_max_relations(),
            confidentiality_levels: default_confidentiality_levels(),
            integrity_levels: default_criticality_levels(),
            availability_levels: default_criticality_levels(),
            component_types: default_component_types(),
            asset_types: default_asset_types(),
            trust_boundary_types: default_trust_boundary_types(),
            relation_types: default_relation_types(),
            require_trust_boundaries: true,
            require_data_assets: true,
            require_technical_assets: true,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Load configuration from `path`, or from the first default location
    /// that exists, then apply `THREATDRAW_*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(Path::new(p))?,
            None => {
                let mut loaded = None;
                for p in DEFAULT_CONFIG_PATHS {
                    let candidate = Path::new(p);
                    if candidate.is_file() {
                        loaded = Some(Self::from_file(candidate)?);
                        break;
                    }
                }
                loaded.unwrap_or_else(|| {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                })
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML (or, by extension, TOML) configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            toml::from_str(&content).context("Failed to parse config")?
        } else {
            Self::from_yaml(&content)?
        };
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse config")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("THREATDRAW_MIN_CONFIDENCE") {
            if let Ok(v) = value.parse::<f64>() {
                self.detection.min_confidence = v;
            }
        }
        if let Ok(title) = std::env::var("THREATDRAW_TITLE") {
            self.mapping.metadata.title = title;
        }
        if let Ok(author) = std::env::var("THREATDRAW_AUTHOR") {
            self.mapping.metadata.author = author;
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let confidence = self.detection.min_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ConfigError::InvalidValue {
                field: "detection.min_confidence".into(),
                message: format!("{} is outside [0, 1]", confidence),
            });
        }
        for (threat_type, factors) in &self.detection.risk_factors {
            if threat_type.is_composite() {
                return Err(ConfigError::InvalidValue {
                    field: "detection.risk_factors".into(),
                    message: format!("{} is a composite archetype", threat_type),
                });
            }
            if let Some((name, weight)) = factors.iter().find(|(_, w)| !w.is_finite() || **w < 0.0)
            {
                return Err(ConfigError::InvalidValue {
                    field: format!("detection.risk_factors.{}.{}", threat_type, name),
                    message: format!("weight {} must be a non-negative number", weight),
                });
            }
        }

        let rules = &self.validation;
        for (field, pattern) in [
            ("validation.component_naming", &rules.component_naming),
            ("validation.asset_naming", &rules.asset_naming),
            ("validation.date_format", &rules.date_format),
        ] {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                field: field.to_string(),
                message: e.to_string(),
            })?;
        }
        for (field, min, max) in [
            (
                "validation.description_length",
                rules.min_description_length,
                rules.max_description_length,
            ),
            (
                "validation.name_length",
                rules.min_name_length,
                rules.max_name_length,
            ),
        ] {
            if min > max {
                return Err(ConfigError::InvalidBounds {
                    field: field.to_string(),
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}
