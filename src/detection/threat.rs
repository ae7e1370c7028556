//! Threat Detector
//!
//! Simple threats come from shape cells whose label carries a threat
//! signature. Co-occurring simple threats are then correlated into composite
//! threats, every score is normalised against the diagram-wide blast radius,
//! and the final list is sorted critical first.

use crate::config::DetectionConfig;
use crate::detection::correction::correct_threat;
use crate::detection::StageOutput;
use crate::model::{Cell, Component, Diagnostics, Flow, Threat, ThreatType};
use crate::observability::telemetry::sanitize_for_log;
use crate::rules::catalog::lookup;
use crate::rules::{classify_threat, threat_rule, CompositeThreatRule, COMPOSITE_THREAT_RULES};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Component count at which the blast-radius factor saturates.
pub const COMPONENT_SATURATION: f64 = 5.0;
/// Flow count at which the blast-radius factor saturates.
pub const FLOW_SATURATION: f64 = 3.0;

pub struct ThreatDetector {
    base_weights: BTreeMap<ThreatType, f64>,
}

impl Default for ThreatDetector {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}

impl ThreatDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        let base_weights = ThreatType::simple()
            .iter()
            .map(|t| {
                let weight = match config.risk_factors.get(t) {
                    Some(factors) => factors.values().sum(),
                    None => threat_rule(*t).map_or(0.0, |r| r.base_weight()),
                };
                (*t, weight)
            })
            .collect();
        Self { base_weights }
    }

    /// Sum of the risk-factor weights for a simple threat type.
    pub fn base_weight(&self, threat_type: ThreatType) -> f64 {
        self.base_weights.get(&threat_type).copied().unwrap_or(0.0)
    }

    /// Base score amplified by blast radius, clamped to [0, 1].
    pub fn risk_score(&self, threat_type: ThreatType, components: usize, flows: usize) -> f64 {
        let component_factor = 1.0 + (components as f64 / COMPONENT_SATURATION).min(1.0);
        let flow_factor = 1.0 + (flows as f64 / FLOW_SATURATION).min(1.0);
        (self.base_weight(threat_type) * component_factor * flow_factor).clamp(0.0, 1.0)
    }

    pub fn detect(
        &self,
        cells: &[Cell],
        components: &[Component],
        flows: &[Flow],
    ) -> StageOutput<Threat> {
        let mut diagnostics = Diagnostics::new();

        let simple = self.detect_simple(cells, components, flows);
        let composite = self.correlate(&simple);
        debug!(
            simple = simple.len(),
            composite = composite.len(),
            "Threat correlation complete"
        );

        let mut threats = simple;
        threats.extend(composite);
        apply_context_factors(&mut threats);

        let mut corrected = Vec::with_capacity(threats.len());
        for threat in &threats {
            let (threat, warnings) = correct_threat(threat);
            for message in warnings {
                warn!("{}", message);
                diagnostics.warn(message);
            }
            corrected.push(threat);
        }
        sort_threats(&mut corrected);

        StageOutput::new(corrected, diagnostics)
    }

    /// One threat per shape cell whose label matches a signature.
    pub fn detect_simple(
        &self,
        cells: &[Cell],
        components: &[Component],
        flows: &[Flow],
    ) -> Vec<Threat> {
        let mut threats = Vec::new();
        for cell in cells.iter().filter(|c| c.is_shape()) {
            let Some(threat_type) = classify_threat(&cell.label) else {
                continue;
            };
            let label = cell.label.to_lowercase();
            let affected_components: Vec<&str> = components
                .iter()
                .filter(|c| c.id != cell.id)
                .filter(|c| {
                    mentions(&label, &c.name, &c.id) || c.component_type.is_inherently_sensitive()
                })
                .map(|c| c.id.as_str())
                .collect();
            let affected_flows: Vec<&str> = flows
                .iter()
                .filter(|f| mentions(&label, &f.label, &f.id) || f.protocol.is_weak())
                .map(|f| f.id.as_str())
                .collect();

            let score =
                self.risk_score(threat_type, affected_components.len(), affected_flows.len());
            let mut threat = Threat::new(&format!("threat-{}", cell.id), &cell.label, threat_type)
                .with_components(affected_components)
                .with_flows(affected_flows)
                .with_risk_score(score);
            enrich(&mut threat, &cell.label);
            debug!(
                id = %threat.id,
                label = %sanitize_for_log(&cell.label),
                threat_type = %threat_type,
                score = threat.risk_score,
                "Detected threat"
            );
            threats.push(threat);
        }
        threats
    }

    /// Composite threats for every archetype whose required types all occur.
    pub fn correlate(&self, simple: &[Threat]) -> Vec<Threat> {
        let present: BTreeSet<ThreatType> = simple.iter().map(|t| t.threat_type).collect();
        COMPOSITE_THREAT_RULES
            .iter()
            .filter(|rule| rule.required.iter().all(|t| present.contains(t)))
            .map(|rule| compose(rule, simple))
            .collect()
    }
}

/// Literal containment of a non-empty name, or of the id, in a lowercase label.
fn mentions(label: &str, name: &str, id: &str) -> bool {
    let name = name.trim().to_lowercase();
    (!name.is_empty() && label.contains(&name)) || (!id.is_empty() && label.contains(&id.to_lowercase()))
}

fn compose(rule: &CompositeThreatRule, simple: &[Threat]) -> Threat {
    let contributing: Vec<&Threat> = simple
        .iter()
        .filter(|t| rule.required.contains(&t.threat_type) || rule.optional.contains(&t.threat_type))
        .collect();
    let max_base = contributing
        .iter()
        .map(|t| t.risk_score)
        .fold(0.0_f64, f64::max);

    let archetype = rule.archetype.as_str();
    let mut threat = Threat::new(
        &format!("composite_{}", archetype),
        &format!("Composite Threat: {}", archetype),
        rule.archetype,
    )
    .with_components(
        contributing
            .iter()
            .flat_map(|t| t.affected_component_ids.iter().cloned()),
    )
    .with_flows(
        contributing
            .iter()
            .flat_map(|t| t.affected_flow_ids.iter().cloned()),
    )
    .with_risk_score((max_base * rule.multiplier).min(1.0));
    threat.base_threat_types = contributing.iter().map(|t| t.threat_type).collect();
    threat.description = format!(
        "Correlated from {} simple threat(s): {}",
        contributing.len(),
        threat
            .base_threat_types
            .iter()
            .map(ThreatType::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    enrich(&mut threat, "");
    threat
}

/// Attach catalog metadata. Keeps an existing description.
fn enrich(threat: &mut Threat, label: &str) {
    let Some(entry) = lookup(label, threat.threat_type) else {
        return;
    };
    threat.owasp_category = Some(entry.owasp_category.to_string());
    threat.cwe = Some(entry.cwe.to_string());
    threat.mitigations = entry.mitigations.iter().map(|m| m.to_string()).collect();
    if threat.description.is_empty() {
        threat.description = entry.description.to_string();
    }
}

/// Scale every score by the threat's share of the diagram-wide affected sets.
pub fn apply_context_factors(threats: &mut [Threat]) {
    let all_components: BTreeSet<&String> = threats
        .iter()
        .flat_map(|t| t.affected_component_ids.iter())
        .collect();
    let all_flows: BTreeSet<&String> = threats
        .iter()
        .flat_map(|t| t.affected_flow_ids.iter())
        .collect();
    let (component_total, flow_total) = (all_components.len(), all_flows.len());

    let ratio = |count: usize, total: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    for threat in threats.iter_mut() {
        let factor = (1.0 + ratio(threat.affected_component_ids.len(), component_total))
            * (1.0 + ratio(threat.affected_flow_ids.len(), flow_total));
        let adjusted = threat.risk_score * factor;
        threat.set_risk_score(adjusted);
    }
}

/// Critical first, then higher score, then id.
pub fn sort_threats(threats: &mut [Threat]) {
    threats.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.risk_score.total_cmp(&a.risk_score))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::correction::correct_component;
    use crate::model::{ComponentType, Priority, Protocol};
    use crate::rules::protocol_rule;

    fn component(id: &str, name: &str, t: ComponentType) -> Component {
        correct_component(&Component::new(id, name, t)).0
    }

    fn flow(id: &str, label: &str, protocol: Protocol) -> Flow {
        Flow {
            id: id.into(),
            label: label.into(),
            source_id: "a".into(),
            target_id: "b".into(),
            protocol,
            bidirectional: false,
            conditional: false,
            conditions: Vec::new(),
            security_context: protocol_rule(protocol).security(),
        }
    }

    fn low_weights() -> DetectionConfig {
        let mut config = DetectionConfig::default();
        for t in ThreatType::simple() {
            config
                .risk_factors
                .insert(*t, [("base".to_string(), 0.1)].into_iter().collect());
        }
        config
    }

    #[test]
    fn test_no_threats_for_plain_components() {
        let cells = vec![
            Cell::vertex("2", "Web App", "rounded"),
            Cell::vertex("3", "Database", "cylinder"),
        ];
        let components = vec![
            component("2", "Web App", ComponentType::WebApplication),
            component("3", "Database", ComponentType::Database),
        ];
        let out = ThreatDetector::default().detect(&cells, &components, &[]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_sql_injection_single_threat() {
        let cells = vec![
            Cell::vertex("2", "API Gateway", ""),
            Cell::vertex("3", "SQL Injection", ""),
            Cell::connector("4", "", "2", "3"),
        ];
        let components = vec![
            component("2", "API Gateway", ComponentType::Gateway),
            component("3", "SQL Injection", ComponentType::Database),
        ];
        let flows = vec![flow("4", "", Protocol::Tcp)];
        let out = ThreatDetector::default().detect(&cells, &components, &flows);
        assert_eq!(out.len(), 1);
        let threat = &out.items[0];
        assert_eq!(threat.threat_type, ThreatType::Injection);
        assert_eq!(threat.priority, Priority::from_score(threat.risk_score));
        // own component excluded, gateway is not inherently sensitive
        assert!(threat.affected_component_ids.is_empty());
        assert!(threat.affected_flow_ids.contains("4"));
        assert_eq!(threat.cwe.as_deref(), Some("CWE-89"));
    }

    #[test]
    fn test_literal_and_sensitive_matches() {
        let cells = vec![Cell::vertex("9", "Token theft on checkout", "")];
        let components = vec![
            component("c1", "Checkout", ComponentType::Process),
            component("c2", "Orders DB", ComponentType::Database),
            component("c3", "Edge", ComponentType::Cdn),
            component("c4", "", ComponentType::Cdn),
        ];
        let flows = vec![
            flow("f1", "", Protocol::Https),
            flow("f2", "", Protocol::Http),
            flow("f3", "checkout", Protocol::Grpc),
        ];
        let threats = ThreatDetector::default().detect_simple(&cells, &components, &flows);
        let threat = &threats[0];
        let comps: Vec<_> = threat.affected_component_ids.iter().map(String::as_str).collect();
        assert_eq!(comps, vec!["c1", "c2"]);
        let flows: Vec<_> = threat.affected_flow_ids.iter().map(String::as_str).collect();
        assert_eq!(flows, vec!["f2", "f3"]);
    }

    #[test]
    fn test_risk_score_formula() {
        let detector = ThreatDetector::new(&low_weights());
        assert!((detector.risk_score(ThreatType::Dos, 0, 0) - 0.1).abs() < 1e-9);
        // 0.1 * (1 + 1/5) * (1 + 3/3)
        assert!((detector.risk_score(ThreatType::Dos, 1, 3) - 0.24).abs() < 1e-9);
        // saturated at 10x, 6x
        assert!((detector.risk_score(ThreatType::Dos, 10, 6) - 0.4).abs() < 1e-9);
        assert_eq!(ThreatDetector::default().risk_score(ThreatType::Dos, 0, 0), 1.0);
    }

    #[test]
    fn test_risk_factor_override_replaces_builtin() {
        let detector = ThreatDetector::new(&low_weights());
        assert!((detector.base_weight(ThreatType::Injection) - 0.1).abs() < 1e-9);
        let detector = ThreatDetector::default();
        assert!((detector.base_weight(ThreatType::Injection) - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_authentication_bypass_composite() {
        let cells = vec![
            Cell::vertex("t1", "Weak password policy", ""),
            Cell::vertex("t2", "Missing role checks", ""),
        ];
        let components = vec![component("api", "API", ComponentType::Api)];
        let detector = ThreatDetector::new(&low_weights());
        let simple = detector.detect_simple(&cells, &components, &[]);
        assert_eq!(simple[0].threat_type, ThreatType::Authentication);
        assert_eq!(simple[1].threat_type, ThreatType::Authorization);

        let composite = detector.correlate(&simple);
        assert_eq!(composite.len(), 1);
        let bypass = &composite[0];
        assert_eq!(bypass.id, "composite_authentication_bypass");
        assert_eq!(bypass.name, "Composite Threat: authentication_bypass");
        assert!(bypass.is_composite);
        let max_base = simple.iter().map(|t| t.risk_score).fold(0.0, f64::max);
        assert!((bypass.risk_score - (max_base * 1.5).min(1.0)).abs() < 1e-9);
        assert_eq!(
            bypass.base_threat_types,
            [ThreatType::Authentication, ThreatType::Authorization].into()
        );
        assert!(bypass.affected_component_ids.contains("api"));
    }

    #[test]
    fn test_composite_requires_all_required_types() {
        let cells = vec![Cell::vertex("t1", "Weak password policy", "")];
        let detector = ThreatDetector::default();
        let simple = detector.detect_simple(&cells, &[], &[]);
        assert!(detector.correlate(&simple).is_empty());
    }

    #[test]
    fn test_context_factors_use_union_share() {
        let mut threats = vec![
            Threat::new("a", "A", ThreatType::Dos)
                .with_components(["c1", "c2"])
                .with_risk_score(0.2),
            Threat::new("b", "B", ThreatType::Dos)
                .with_components(["c2"])
                .with_flows(["f1"])
                .with_risk_score(0.2),
        ];
        apply_context_factors(&mut threats);
        // a: 0.2 * (1 + 2/2) * (1 + 0/1)
        assert!((threats[0].risk_score - 0.4).abs() < 1e-9);
        // b: 0.2 * (1 + 1/2) * (1 + 1/1)
        assert!((threats[1].risk_score - 0.6).abs() < 1e-9);
        assert_eq!(threats[1].priority, Priority::High);
    }

    #[test]
    fn test_context_factors_with_empty_unions() {
        let mut threats = vec![Threat::new("a", "A", ThreatType::Dos).with_risk_score(0.3)];
        apply_context_factors(&mut threats);
        assert!((threats[0].risk_score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_sorted_by_priority_score_then_id() {
        let mut threats = vec![
            Threat::new("b", "B", ThreatType::Dos).with_risk_score(0.5),
            Threat::new("c", "C", ThreatType::Dos).with_risk_score(0.9),
            Threat::new("a", "A", ThreatType::Dos).with_risk_score(0.5),
            Threat::new("d", "D", ThreatType::Dos).with_risk_score(0.45),
        ];
        sort_threats(&mut threats);
        let ids: Vec<_> = threats.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_detect_output_is_consistent() {
        let cells = vec![
            Cell::vertex("t1", "Session hijacking", ""),
            Cell::vertex("t2", "Privilege escalation via roles", ""),
            Cell::vertex("t3", "DDoS flood", ""),
        ];
        let components = vec![component("db", "DB", ComponentType::Database)];
        let out = ThreatDetector::new(&low_weights()).detect(&cells, &components, &[]);
        assert_eq!(out.len(), 4);
        for threat in &out.items {
            assert_eq!(threat.priority, Priority::from_score(threat.risk_score));
            assert!((0.0..=1.0).contains(&threat.risk_score));
        }
        assert!(out.items.iter().any(|t| t.is_composite));
        assert!(out.diagnostics.is_clean());
    }
}
