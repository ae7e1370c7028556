//! Component Detector
//!
//! Classifies shape cells into typed components in two passes:
//!
//! 1. **Scoring**: every candidate type gets a weighted score from style-token
//!    overlap, label-keyword overlap, an attribute-consistency check and an
//!    archetype pattern match. The highest score wins; ties go to the type
//!    declared first.
//! 2. **Refinement**: a `DetectionContext` is built from the frozen first-pass
//!    result. Components whose label matches an archetype pattern *and* whose
//!    connected types satisfy a context rule gain confidence, all others lose
//!    some. Types never change in this pass.
//!
//! Each component then runs through `correction::correct_component`.

use crate::config::DetectionConfig;
use crate::detection::correction::correct_component;
use crate::detection::StageOutput;
use crate::model::{
    style_value, tokenize, Cell, Component, ComponentType, DataSensitivity, Diagnostics,
    Requirement, SecurityContext, STRUCTURAL_IDS,
};
use crate::observability::telemetry::sanitize_for_log;
use crate::rules::{component_rule, ComponentRule, COMPONENT_RULES};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const STYLE_WEIGHT: f64 = 0.4;
pub const LABEL_WEIGHT: f64 = 0.3;
pub const ATTRIBUTE_WEIGHT: f64 = 0.2;
pub const PATTERN_WEIGHT: f64 = 0.1;

pub const CONTEXT_BONUS: f64 = 0.2;
pub const CONTEXT_PENALTY: f64 = 0.1;

pub const LOW_CONFIDENCE_TAG: &str = "low-confidence";

/// Authentication/authorization hints carried by a style string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecuritySignals {
    pub authentication: bool,
    pub authorization: bool,
}

impl SecuritySignals {
    pub fn from_style(style: &str) -> Self {
        let lowered = style.to_lowercase();
        Self {
            authentication: lowered.contains("auth") || lowered.contains("login"),
            authorization: lowered.contains("role") || lowered.contains("permission"),
        }
    }

    pub fn any(&self) -> bool {
        self.authentication || self.authorization
    }

    /// At least one signal present and the signals equal the type's requirements.
    pub fn consistent_with(&self, rule: &ComponentRule) -> bool {
        self.any()
            && self.authentication == rule.authentication.is_required()
            && self.authorization == rule.authorization.is_required()
    }
}

/// Scoring features extracted once per cell.
#[derive(Debug, Clone)]
struct CellFeatures<'a> {
    label: &'a str,
    label_tokens: BTreeSet<String>,
    style_tokens: BTreeSet<String>,
    signals: SecuritySignals,
}

impl<'a> CellFeatures<'a> {
    fn new(cell: &'a Cell) -> Self {
        Self {
            label: &cell.label,
            label_tokens: tokenize(&cell.label),
            style_tokens: tokenize(&cell.style),
            signals: SecuritySignals::from_style(&cell.style),
        }
    }
}

// Divides by the cell's own token count, so two types hitting the same number
// of tokens tie and the earlier declared type wins.
fn overlap(tokens: &BTreeSet<String>, is_keyword: impl Fn(&str) -> bool) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens.iter().filter(|t| is_keyword(t)).count();
    hits as f64 / tokens.len() as f64
}

fn score_features(features: &CellFeatures<'_>, rule: &ComponentRule) -> f64 {
    let mut score = STYLE_WEIGHT * overlap(&features.style_tokens, |t| rule.is_style_keyword(t));
    score += LABEL_WEIGHT * overlap(&features.label_tokens, |t| rule.is_label_keyword(t));
    if features.signals.consistent_with(rule) {
        score += ATTRIBUTE_WEIGHT;
    }
    if rule.matches_pattern(features.label) {
        score += PATTERN_WEIGHT;
    }
    score.min(1.0)
}

/// Score of `cell` against one candidate type, in [0, 1].
pub fn score_cell(cell: &Cell, component_type: ComponentType) -> f64 {
    score_features(&CellFeatures::new(cell), component_rule(component_type))
}

/// Highest-scoring type and its score. First-declared type wins ties;
/// `None` when every type scores zero.
pub fn classify(cell: &Cell) -> Option<(ComponentType, f64)> {
    let features = CellFeatures::new(cell);
    let mut best: Option<(ComponentType, f64)> = None;
    for rule in COMPONENT_RULES.iter() {
        let score = score_features(&features, rule);
        if score > best.map_or(0.0, |(_, s)| s) {
            best = Some((rule.component_type, score));
        }
    }
    best
}

/// Security attributes from the type defaults, overridden by explicit style
/// annotations. Unrecognised annotation values come back `Unspecified`.
pub fn security_from_style(style: &str, defaults: SecurityContext) -> SecurityContext {
    let mut context = defaults;
    if let Some(value) = style_value(style, "authentication") {
        context.authentication = Requirement::parse_lenient(value);
    }
    if let Some(value) = style_value(style, "authorization") {
        context.authorization = Requirement::parse_lenient(value);
    }
    let sensitivity = ["data_sensitivity", "datasensitivity", "data-sensitivity", "sensitivity"]
        .iter()
        .find_map(|key| style_value(style, key));
    if let Some(value) = sensitivity {
        context.data_sensitivity = DataSensitivity::parse_lenient(value);
    }
    context
}

// ============================================================================
// Detection context
// ============================================================================

/// Per-run aggregate built from a frozen set of components.
#[derive(Debug, Clone, Default)]
pub struct DetectionContext {
    connected: BTreeMap<String, BTreeSet<ComponentType>>,
    security: BTreeMap<String, SecurityContext>,
}

/// Parent key that puts root-level components in one sibling group.
fn sibling_group(parent: Option<&str>) -> &str {
    match parent {
        None => STRUCTURAL_IDS[1],
        Some(p) if STRUCTURAL_IDS.contains(&p) => STRUCTURAL_IDS[1],
        Some(p) => p,
    }
}

impl DetectionContext {
    /// Connected types are the types of a component's hierarchy parent,
    /// children and siblings.
    pub fn build(components: &[Component]) -> Self {
        let by_id: BTreeMap<&str, &Component> =
            components.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut groups: BTreeMap<&str, Vec<&Component>> = BTreeMap::new();
        for component in components {
            groups
                .entry(sibling_group(component.parent_id.as_deref()))
                .or_default()
                .push(component);
        }

        let mut connected = BTreeMap::new();
        let mut security = BTreeMap::new();
        for component in components {
            let mut types = BTreeSet::new();
            if let Some(parent) = component.parent_id.as_deref().and_then(|p| by_id.get(p)) {
                types.insert(parent.component_type);
            }
            if let Some(children) = groups.get(component.id.as_str()) {
                types.extend(children.iter().map(|c| c.component_type));
            }
            if let Some(siblings) = groups.get(sibling_group(component.parent_id.as_deref())) {
                types.extend(
                    siblings
                        .iter()
                        .filter(|s| s.id != component.id)
                        .map(|s| s.component_type),
                );
            }
            connected.insert(component.id.clone(), types);
            security.insert(component.id.clone(), component.security_context());
        }

        Self {
            connected,
            security,
        }
    }

    pub fn connected_types(&self, id: &str) -> Option<&BTreeSet<ComponentType>> {
        self.connected.get(id)
    }

    pub fn security_context(&self, id: &str) -> Option<&SecurityContext> {
        self.security.get(id)
    }

    pub fn len(&self) -> usize {
        self.connected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connected.is_empty()
    }
}

// ============================================================================
// Detector
// ============================================================================

pub struct ComponentDetector {
    min_confidence: f64,
}

impl Default for ComponentDetector {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}

impl ComponentDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
        }
    }

    /// Full detection: scoring, refinement, correction. Never fails.
    pub fn detect(&self, cells: &[Cell]) -> StageOutput<Component> {
        let first = self.first_pass(cells);
        let mut diagnostics = first.diagnostics;
        let refined = self.refine(&first.items);

        let mut components = Vec::with_capacity(refined.len());
        for component in refined {
            let (mut corrected, warnings) = correct_component(&component);
            for message in warnings {
                warn!("{}", message);
                diagnostics.warn(message);
            }
            corrected.tags = self.tags_for(&corrected);
            components.push(corrected);
        }

        debug!(components = components.len(), "Component detection complete");
        StageOutput::new(components, diagnostics)
    }

    /// Classify every shape cell independently.
    pub fn first_pass(&self, cells: &[Cell]) -> StageOutput<Component> {
        let mut diagnostics = Diagnostics::new();
        let mut components = Vec::new();

        for cell in cells.iter().filter(|c| c.is_shape()) {
            let (component_type, score) = match classify(cell) {
                Some(best) => best,
                None => {
                    let message = format!(
                        "Component '{}' ({}): no archetype matched, defaulting to process",
                        cell.id,
                        sanitize_for_log(&cell.label)
                    );
                    warn!("{}", message);
                    diagnostics.warn(message);
                    (ComponentType::Process, 0.0)
                }
            };

            if score > 0.0 && score < self.min_confidence {
                let message = format!(
                    "Component '{}' ({}): low confidence {:.2} for type {}",
                    cell.id,
                    sanitize_for_log(&cell.label),
                    score,
                    component_type
                );
                warn!("{}", message);
                diagnostics.warn(message);
            }

            let rule = component_rule(component_type);
            let security = security_from_style(&cell.style, rule.defaults());
            let mut component = Component::new(&cell.id, &cell.label, component_type)
                .with_confidence(score)
                .with_security(security)
                .with_style(&cell.style);
            component.parent_id = cell.parent.clone();
            components.push(component);
        }

        StageOutput::new(components, diagnostics)
    }

    /// Context-driven confidence adjustment over a frozen first pass.
    pub fn refine(&self, components: &[Component]) -> Vec<Component> {
        let context = DetectionContext::build(components);
        let empty = BTreeSet::new();
        components
            .iter()
            .map(|component| {
                let rule = component_rule(component.component_type);
                if rule.context_rules.is_empty() {
                    return component.clone();
                }
                let connected = context.connected_types(&component.id).unwrap_or(&empty);
                let confidence = if rule.matches_pattern(&component.name)
                    && rule.matches_context(connected)
                {
                    (component.confidence_score + CONTEXT_BONUS).min(1.0)
                } else {
                    (component.confidence_score - CONTEXT_PENALTY).max(0.0)
                };
                let mut refined = component.clone();
                refined.confidence_score = confidence;
                refined
            })
            .collect()
    }

    fn tags_for(&self, component: &Component) -> Vec<String> {
        let mut tags = vec![component.component_type.as_str().to_string()];
        if component.confidence_score < self.min_confidence {
            tags.push(LOW_CONFIDENCE_TAG.to_string());
        }
        tags
    }
}
