//! Validate-and-correct transforms
//!
//! Each function takes an entity by reference and returns a corrected copy plus
//! the warnings describing every substitution. Running a function on its own
//! output returns the same entity and no warnings.

use crate::detection::slugify;
use crate::model::{Component, Flow, Priority, Protocol, Requirement, Threat};
use crate::observability::telemetry::sanitize_for_log;
use crate::rules::{component_rule, protocol_for_types, protocol_rule};

pub const UNNAMED_COMPONENT: &str = "Unnamed Component";
pub const UNNAMED_THREAT: &str = "Unnamed Threat";

/// Score substituted for a threat whose score is not a number.
pub const FALLBACK_RISK_SCORE: f64 = 0.5;

pub fn correct_component(component: &Component) -> (Component, Vec<String>) {
    let mut corrected = component.clone();
    let mut warnings = Vec::new();

    if corrected.id.trim().is_empty() {
        let slug = slugify(&corrected.name);
        let slug = if slug.is_empty() { "unnamed".to_string() } else { slug };
        corrected.id = format!("component-{}", slug);
        warnings.push(format!(
            "Component '{}': empty id replaced with '{}'",
            sanitize_for_log(&corrected.name),
            corrected.id
        ));
    }

    if corrected.name.trim().is_empty() {
        corrected.name = UNNAMED_COMPONENT.to_string();
        warnings.push(format!(
            "Component '{}': blank name replaced with '{}'",
            corrected.id, UNNAMED_COMPONENT
        ));
    }

    let confidence = if corrected.confidence_score.is_nan() {
        0.0
    } else {
        corrected.confidence_score.clamp(0.0, 1.0)
    };
    if confidence != corrected.confidence_score {
        warnings.push(format!(
            "Component '{}': confidence {} clamped to {:.2}",
            corrected.id, corrected.confidence_score, confidence
        ));
        corrected.confidence_score = confidence;
    }

    let defaults = component_rule(corrected.component_type).defaults();
    if !corrected.authentication.is_specified() {
        corrected.authentication = defaults.authentication;
        warnings.push(format!(
            "Component '{}': authentication unspecified, defaulting to {} for {}",
            corrected.id, defaults.authentication, corrected.component_type
        ));
    }
    if !corrected.authorization.is_specified() {
        corrected.authorization = defaults.authorization;
        warnings.push(format!(
            "Component '{}': authorization unspecified, defaulting to {} for {}",
            corrected.id, defaults.authorization, corrected.component_type
        ));
    }
    if !corrected.data_sensitivity.is_specified() {
        corrected.data_sensitivity = defaults.data_sensitivity;
        warnings.push(format!(
            "Component '{}': data sensitivity unspecified, defaulting to {} for {}",
            corrected.id, defaults.data_sensitivity, corrected.component_type
        ));
    }

    (corrected, warnings)
}

/// Protocol compatibility and security escalation against both endpoints.
pub fn correct_flow(flow: &Flow, source: &Component, target: &Component) -> (Flow, Vec<String>) {
    let mut corrected = flow.clone();
    let mut warnings = Vec::new();
    let (source_type, target_type) = (source.component_type, target.component_type);

    if !protocol_rule(corrected.protocol).is_compatible(source_type, target_type) {
        let replacement = protocol_for_types(source_type, target_type)
            .filter(|p| protocol_rule(*p).is_compatible(source_type, target_type))
            .unwrap_or(Protocol::Tcp);
        warnings.push(format!(
            "Flow '{}': protocol {} is incompatible with {} -> {}, corrected to {}",
            corrected.id, corrected.protocol, source_type, target_type, replacement
        ));
        corrected.protocol = replacement;
        corrected.security_context = protocol_rule(replacement).security();
    }

    let defaults = protocol_rule(corrected.protocol).security();
    if !corrected.security_context.authentication.is_specified() {
        corrected.security_context.authentication = defaults.authentication;
        warnings.push(format!(
            "Flow '{}': authentication unspecified, defaulting to {}",
            corrected.id, defaults.authentication
        ));
    }
    if !corrected.security_context.authorization.is_specified() {
        corrected.security_context.authorization = defaults.authorization;
        warnings.push(format!(
            "Flow '{}': authorization unspecified, defaulting to {}",
            corrected.id, defaults.authorization
        ));
    }

    // Endpoint requirements always win over the protocol default
    if source.requires_authentication() || target.requires_authentication() {
        corrected.security_context.authentication = Requirement::Required;
    }
    if source.requires_authorization() || target.requires_authorization() {
        corrected.security_context.authorization = Requirement::Required;
    }

    (corrected, warnings)
}

pub fn correct_threat(threat: &Threat) -> (Threat, Vec<String>) {
    let mut corrected = threat.clone();
    let mut warnings = Vec::new();

    if corrected.name.trim().is_empty() {
        corrected.name = UNNAMED_THREAT.to_string();
        warnings.push(format!(
            "Threat '{}': blank name replaced with '{}'",
            corrected.id, UNNAMED_THREAT
        ));
    }

    if !corrected.risk_score.is_finite() {
        warnings.push(format!(
            "Threat '{}': risk score {} replaced with {}",
            corrected.id, corrected.risk_score, FALLBACK_RISK_SCORE
        ));
        corrected.risk_score = FALLBACK_RISK_SCORE;
    } else if !(0.0..=1.0).contains(&corrected.risk_score) {
        let clamped = corrected.risk_score.clamp(0.0, 1.0);
        warnings.push(format!(
            "Threat '{}': risk score {} clamped to {}",
            corrected.id, corrected.risk_score, clamped
        ));
        corrected.risk_score = clamped;
    }

    let priority = Priority::from_score(corrected.risk_score);
    if priority != corrected.priority {
        warnings.push(format!(
            "Threat '{}': priority {} does not match score {:.2}, set to {}",
            corrected.id, corrected.priority, corrected.risk_score, priority
        ));
        corrected.priority = priority;
    }

    let composite = corrected.threat_type.is_composite();
    if corrected.is_composite != composite {
        warnings.push(format!(
            "Threat '{}': composite flag set to {} for type {}",
            corrected.id, composite, corrected.threat_type
        ));
        corrected.is_composite = composite;
    }
    if !composite && !corrected.base_threat_types.is_empty() {
        warnings.push(format!(
            "Threat '{}': base threat types cleared on simple threat",
            corrected.id
        ));
        corrected.base_threat_types.clear();
    }

    (corrected, warnings)
}
