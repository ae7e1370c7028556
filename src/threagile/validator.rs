//! Output Validator
//!
//! Checks a Threagile-shaped document held as a generic `serde_json::Value`,
//! so documents loaded from disk get the same field presence and type checks
//! as freshly mapped ones. The validator only reads; it never repairs.

use crate::config::ValidationRules;
use crate::errors::{ConfigError, ValidationError};
use crate::threagile::document::ThreagileDocument;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

// ============================================================================
// Field tables
// ============================================================================

/// Expected shape of a document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    StringList,
    List,
}

impl FieldKind {
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::Boolean, Value::Bool(_)) => true,
            (FieldKind::StringList, Value::Array(items)) => items.iter().all(Value::is_string),
            (FieldKind::List, Value::Array(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "a string"),
            FieldKind::Number => write!(f, "a number"),
            FieldKind::Boolean => write!(f, "a boolean"),
            FieldKind::StringList => write!(f, "a list of strings"),
            FieldKind::List => write!(f, "a list"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

use FieldKind::{Boolean, List, Number, String as Text, StringList};

static TOP_LEVEL_FIELDS: &[FieldSpec] = &[
    required("title", Text),
    required("description", Text),
    required("date", Text),
    required("author", Text),
    required("components", List),
    required("technical_assets", List),
    required("data_assets", List),
    required("trust_boundaries", List),
    required("relations", List),
    optional("threats", List),
];

static COMPONENT_FIELDS: &[FieldSpec] = &[
    required("id", Text),
    required("name", Text),
    required("type", Text),
    required("description", Text),
    required("technical_assets", StringList),
    optional("tags", StringList),
    optional("data_assets", StringList),
    optional("trust_boundaries", StringList),
    optional("security_controls", StringList),
    optional("compliance_requirements", StringList),
];

static TECHNICAL_ASSET_FIELDS: &[FieldSpec] = &[
    required("id", Text),
    required("name", Text),
    required("type", Text),
    required("description", Text),
    required("usage", Text),
    required("owner", Text),
    required("confidentiality", Text),
    required("integrity", Text),
    required("availability", Text),
    optional("technology", Text),
    optional("justification_cia_rating", Text),
    optional("internet", Boolean),
    optional("used_as_client_by_human", Boolean),
    optional("multi_tenant", Boolean),
    optional("redundant", Boolean),
    optional("custom_developed_parts", Boolean),
    optional("encryption", Text),
    optional("authentication", Text),
    optional("authorization", Text),
    optional("data_assets_processed", StringList),
    optional("data_assets_stored", StringList),
    optional("tags", StringList),
];

static DATA_ASSET_FIELDS: &[FieldSpec] = &[
    required("id", Text),
    required("name", Text),
    required("description", Text),
    required("usage", Text),
    required("owner", Text),
    required("confidentiality", Text),
    required("integrity", Text),
    required("availability", Text),
    optional("justification_cia_rating", Text),
    optional("data_classification", Text),
    optional("tags", StringList),
];

static TRUST_BOUNDARY_FIELDS: &[FieldSpec] = &[
    required("id", Text),
    required("name", Text),
    required("description", Text),
    required("type", Text),
    optional("components", StringList),
    optional("technical_assets", StringList),
    optional("data_assets", StringList),
    optional("trust_boundaries_nested", StringList),
];

static RELATION_FIELDS: &[FieldSpec] = &[
    required("id", Text),
    required("name", Text),
    required("type", Text),
    required("source", Text),
    required("target", Text),
    required("protocol", Text),
    optional("description", Text),
    optional("authentication", Text),
    optional("authorization", Text),
    optional("encryption", Text),
    optional("bidirectional", Boolean),
    optional("data_assets", StringList),
    optional("tags", StringList),
];

static THREAT_FIELDS: &[FieldSpec] = &[
    required("id", Text),
    required("name", Text),
    required("type", Text),
    required("risk_score", Number),
    required("priority", Text),
    optional("description", Text),
    optional("is_composite", Boolean),
    optional("affected_components", StringList),
    optional("affected_relations", StringList),
    optional("base_threat_types", StringList),
    optional("mitigations", StringList),
];

static COLLECTIONS: &[(&str, &[FieldSpec])] = &[
    ("components", COMPONENT_FIELDS),
    ("technical_assets", TECHNICAL_ASSET_FIELDS),
    ("data_assets", DATA_ASSET_FIELDS),
    ("trust_boundaries", TRUST_BOUNDARY_FIELDS),
    ("relations", RELATION_FIELDS),
    ("threats", THREAT_FIELDS),
];

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record a hard error. Repeated messages are kept once.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }
        self.is_valid = false;
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }

    pub fn merge(&mut self, other: ValidationReport) {
        for e in other.errors {
            self.error(e);
        }
        for w in other.warnings {
            self.warning(w);
        }
    }

    pub fn unresolved_references(&self) -> impl Iterator<Item = &str> {
        self.errors
            .iter()
            .map(String::as_str)
            .filter(|e| e.contains("unresolved reference"))
    }
}

// ============================================================================
// Value helpers
// ============================================================================

/// Object entries of a top-level collection with their positions.
fn entries<'v>(root: &'v Map<String, Value>, key: &str) -> Vec<(usize, &'v Map<String, Value>)> {
    root.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.as_object().map(|o| (i, o)))
                .collect()
        })
        .unwrap_or_default()
}

fn text<'v>(item: &'v Map<String, Value>, field: &str) -> Option<&'v str> {
    item.get(field).and_then(Value::as_str)
}

fn string_list<'v>(item: &'v Map<String, Value>, field: &str) -> Vec<&'v str> {
    item.get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn ids<'v>(root: &'v Map<String, Value>, key: &str) -> BTreeSet<&'v str> {
    entries(root, key)
        .into_iter()
        .filter_map(|(_, item)| text(item, "id"))
        .collect()
}

/// `components[2] 'db'`, or `components[2]` when the id is missing.
fn entity(key: &str, index: usize, item: &Map<String, Value>) -> String {
    match text(item, "id") {
        Some(id) => format!("{}[{}] '{}'", key, index, id),
        None => format!("{}[{}]", key, index),
    }
}

fn count(root: &Map<String, Value>, key: &str) -> usize {
    root.get(key)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Parse a YAML (or JSON) document into the generic form.
pub fn parse_document(content: &str) -> Result<Value, ValidationError> {
    serde_yaml::from_str::<Value>(content).map_err(|e| ValidationError::Parse(e.to_string()))
}

// ============================================================================
// Validator
// ============================================================================

pub struct OutputValidator {
    rules: ValidationRules,
    component_naming: Regex,
    asset_naming: Regex,
    date_format: Regex,
}

impl OutputValidator {
    pub fn new(rules: &ValidationRules) -> Result<Self, ConfigError> {
        let compile = |field: &str, pattern: &str| {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                field: field.to_string(),
                message: e.to_string(),
            })
        };
        Ok(Self {
            component_naming: compile("validation.component_naming", &rules.component_naming)?,
            asset_naming: compile("validation.asset_naming", &rules.asset_naming)?,
            date_format: compile("validation.date_format", &rules.date_format)?,
            rules: rules.clone(),
        })
    }

    pub fn validate(&self, document: &ThreagileDocument) -> ValidationReport {
        match document.to_value() {
            Ok(value) => self.validate_value(&value),
            Err(e) => {
                let mut report = ValidationReport::new();
                report.error(e.to_string());
                report
            }
        }
    }

    /// Field presence and types, naming, description length, security
    /// levels, id uniqueness and component references.
    pub fn validate_value(&self, value: &Value) -> ValidationReport {
        let mut report = ValidationReport::new();
        let Some(root) = value.as_object() else {
            report.error(ValidationError::NotAMapping.to_string());
            return report;
        };

        check_fields("document", root, TOP_LEVEL_FIELDS, &mut report);
        for (key, fields) in COLLECTIONS {
            let Some(items) = root.get(*key).and_then(Value::as_array) else {
                continue;
            };
            for (index, item) in items.iter().enumerate() {
                match item.as_object() {
                    Some(object) => {
                        check_fields(&entity(key, index, object), object, fields, &mut report)
                    }
                    None => report.error(format!("{}[{}]: entry is not a mapping", key, index)),
                }
            }
        }

        self.check_naming(root, &mut report);
        self.check_descriptions(root, &mut report);
        self.check_security_levels(root, &mut report);
        check_unique_ids(root, &mut report);
        check_component_references(root, &mut report);

        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Base validation complete"
        );
        report
    }

    /// Base checks plus compliance, date, limits, vocabularies and the
    /// remaining cross-references, accumulated into one report.
    pub fn validate_post_conversion(&self, value: &Value) -> ValidationReport {
        let mut report = self.validate_value(value);
        let Some(root) = value.as_object() else {
            return report;
        };

        self.check_compliance(root, &mut report);
        self.check_date(root, &mut report);
        self.check_limits(root, &mut report);
        self.check_name_lengths(root, &mut report);
        self.check_vocabularies(root, &mut report);
        check_relationships(root, &mut report);

        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Post-conversion validation complete"
        );
        report
    }

    fn check_naming(&self, root: &Map<String, Value>, report: &mut ValidationReport) {
        for (key, pattern) in [
            ("components", &self.component_naming),
            ("technical_assets", &self.asset_naming),
            ("data_assets", &self.asset_naming),
        ] {
            for (index, item) in entries(root, key) {
                if let Some(name) = text(item, "name") {
                    if !pattern.is_match(name) {
                        report.error(format!(
                            "{}: name '{}' does not match {}",
                            entity(key, index, item),
                            name,
                            pattern.as_str()
                        ));
                    }
                }
            }
        }
    }

    fn check_descriptions(&self, root: &Map<String, Value>, report: &mut ValidationReport) {
        let (min, max) = (
            self.rules.min_description_length,
            self.rules.max_description_length,
        );
        let mut check = |owner: String, description: &str| {
            let length = description.chars().count();
            if length < min || length > max {
                report.warning(format!(
                    "{}: description length {} outside [{}, {}]",
                    owner, length, min, max
                ));
            }
        };

        if let Some(description) = text(root, "description") {
            check("document".to_string(), description);
        }
        for (key, _) in COLLECTIONS {
            for (index, item) in entries(root, key) {
                if let Some(description) = text(item, "description") {
                    check(entity(key, index, item), description);
                }
            }
        }
    }

    fn check_security_levels(&self, root: &Map<String, Value>, report: &mut ValidationReport) {
        let levels = [
            ("confidentiality", &self.rules.confidentiality_levels),
            ("integrity", &self.rules.integrity_levels),
            ("availability", &self.rules.availability_levels),
        ];
        for key in ["technical_assets", "data_assets"] {
            for (index, item) in entries(root, key) {
                for (field, valid) in &levels {
                    if let Some(level) = text(item, field) {
                        if !valid.iter().any(|v| v == level) {
                            report.error(format!(
                                "{}: invalid {} level '{}'",
                                entity(key, index, item),
                                field,
                                level
                            ));
                        }
                    }
                }
            }
        }
    }

    fn check_compliance(&self, root: &Map<String, Value>, report: &mut ValidationReport) {
        for (required, key, label) in [
            (
                self.rules.require_trust_boundaries,
                "trust_boundaries",
                "trust boundary",
            ),
            (self.rules.require_data_assets, "data_assets", "data asset"),
            (
                self.rules.require_technical_assets,
                "technical_assets",
                "technical asset",
            ),
        ] {
            if required && count(root, key) == 0 {
                report.error(format!("Compliance: at least one {} is required", label));
            }
        }
    }

    fn check_date(&self, root: &Map<String, Value>, report: &mut ValidationReport) {
        if let Some(date) = text(root, "date") {
            if !self.date_format.is_match(date) {
                report.error(format!(
                    "document: date '{}' does not match {}",
                    date,
                    self.date_format.as_str()
                ));
            }
        }
    }

    fn check_limits(&self, root: &Map<String, Value>, report: &mut ValidationReport) {
        for (key, max) in [
            ("technical_assets", self.rules.max_technical_assets),
            ("data_assets", self.rules.max_data_assets),
            ("trust_boundaries", self.rules.max_trust_boundaries),
            ("relations", self.rules.max_relations),
        ] {
            let size = count(root, key);
            if size > max {
                report.warning(format!("{}: {} entries exceed maximum of {}", key, size, max));
            }
        }

        for key in ["components", "technical_assets", "data_assets", "relations"] {
            for (index, item) in entries(root, key) {
                let tags = string_list(item, "tags").len();
                if tags > self.rules.max_tags {
                    report.warning(format!(
                        "{}: {} tags exceed maximum of {}",
                        entity(key, index, item),
                        tags,
                        self.rules.max_tags
                    ));
                }
            }
        }
    }

    fn check_name_lengths(&self, root: &Map<String, Value>, report: &mut ValidationReport) {
        let (min, max) = (self.rules.min_name_length, self.rules.max_name_length);
        for (key, _) in COLLECTIONS {
            for (index, item) in entries(root, key) {
                if let Some(name) = text(item, "name") {
                    let length = name.chars().count();
                    if length < min || length > max {
                        report.warning(format!(
                            "{}: name length {} outside [{}, {}]",
                            entity(key, index, item),
                            length,
                            min,
                            max
                        ));
                    }
                }
            }
        }
    }

    fn check_vocabularies(&self, root: &Map<String, Value>, report: &mut ValidationReport) {
        for (key, valid, label) in [
            ("components", &self.rules.component_types, "component type"),
            ("technical_assets", &self.rules.asset_types, "asset type"),
            (
                "trust_boundaries",
                &self.rules.trust_boundary_types,
                "trust boundary type",
            ),
            ("relations", &self.rules.relation_types, "relation type"),
        ] {
            for (index, item) in entries(root, key) {
                if let Some(value) = text(item, "type") {
                    if !valid.iter().any(|v| v == value) {
                        report.warning(format!(
                            "{}: unknown {} '{}'",
                            entity(key, index, item),
                            label,
                            value
                        ));
                    }
                }
            }
        }
    }
}

fn check_fields(
    owner: &str,
    object: &Map<String, Value>,
    fields: &[FieldSpec],
    report: &mut ValidationReport,
) {
    for field in fields {
        match object.get(field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    report.error(format!("{}: missing required field '{}'", owner, field.name));
                }
            }
            Some(value) if !field.kind.matches(value) => {
                report.error(format!(
                    "{}: field '{}' must be {}",
                    owner, field.name, field.kind
                ));
            }
            Some(_) => {}
        }
    }
}

fn check_unique_ids(root: &Map<String, Value>, report: &mut ValidationReport) {
    let mut seen = BTreeSet::new();
    for (key, _) in COLLECTIONS {
        for (_, item) in entries(root, key) {
            if let Some(id) = text(item, "id") {
                if !seen.insert(id) {
                    report.error(format!("duplicate id '{}'", id));
                }
            }
        }
    }
}

fn unresolved(report: &mut ValidationReport, owner: &str, kind: &str, id: &str) {
    report.error(format!("{}: unresolved reference to {} '{}'", owner, kind, id));
}

fn check_component_references(root: &Map<String, Value>, report: &mut ValidationReport) {
    let technical = ids(root, "technical_assets");
    let data = ids(root, "data_assets");
    let boundaries = ids(root, "trust_boundaries");

    for (index, item) in entries(root, "components") {
        let owner = entity("components", index, item);
        for (field, known, kind) in [
            ("technical_assets", &technical, "technical asset"),
            ("data_assets", &data, "data asset"),
            ("trust_boundaries", &boundaries, "trust boundary"),
        ] {
            for id in string_list(item, field) {
                if !known.contains(id) {
                    unresolved(report, &owner, kind, id);
                }
            }
        }
    }
}

fn check_relationships(root: &Map<String, Value>, report: &mut ValidationReport) {
    let components = ids(root, "components");
    let technical = ids(root, "technical_assets");
    let data = ids(root, "data_assets");
    let boundaries = ids(root, "trust_boundaries");
    let relations = ids(root, "relations");

    for (index, item) in entries(root, "technical_assets") {
        let owner = entity("technical_assets", index, item);
        for field in ["data_assets_processed", "data_assets_stored"] {
            for id in string_list(item, field) {
                if !data.contains(id) {
                    unresolved(report, &owner, "data asset", id);
                }
            }
        }
    }

    for (index, item) in entries(root, "trust_boundaries") {
        let owner = entity("trust_boundaries", index, item);
        for (field, known, kind) in [
            ("components", &components, "component"),
            ("technical_assets", &technical, "technical asset"),
            ("data_assets", &data, "data asset"),
            ("trust_boundaries_nested", &boundaries, "trust boundary"),
        ] {
            for id in string_list(item, field) {
                if !known.contains(id) {
                    unresolved(report, &owner, kind, id);
                }
            }
        }
    }

    for (index, item) in entries(root, "relations") {
        let owner = entity("relations", index, item);
        for field in ["source", "target"] {
            if let Some(id) = text(item, field) {
                if !components.contains(id) && !technical.contains(id) {
                    unresolved(report, &owner, field, id);
                }
            }
        }
        for id in string_list(item, "data_assets") {
            if !data.contains(id) {
                unresolved(report, &owner, "data asset", id);
            }
        }
    }

    for (index, item) in entries(root, "threats") {
        let owner = entity("threats", index, item);
        for id in string_list(item, "affected_components") {
            if !components.contains(id) {
                unresolved(report, &owner, "component", id);
            }
        }
        for id in string_list(item, "affected_relations") {
            if !relations.contains(id) {
                unresolved(report, &owner, "relation", id);
            }
        }
    }
}
