//! Flow Detector
//!
//! Turns connector cells into flows between known components. Endpoints that
//! point inside a promoted composite resolve to the composite; connectors that
//! end up inside a single composite are internal and dropped.

use crate::detection::correction::correct_flow;
use crate::detection::StageOutput;
use crate::model::{style_flag, style_value, Cell, Component, ComponentType, Diagnostics, Flow, Protocol};
use crate::observability::telemetry::sanitize_for_log;
use crate::rules::components::word_pattern;
use crate::rules::{protocol_for_types, protocol_rule, PROTOCOL_RULES};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Label patterns marking two-way communication.
static BIDIRECTIONAL_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("sync", word_pattern(r"sync|synchronous|request-response")),
        ("async", word_pattern(r"async|asynchronous|events?")),
        ("stream", word_pattern(r"stream|streaming|continuous|realtime|real-time")),
        ("websocket", word_pattern(r"websockets?|ws|wss")),
        ("grpc", word_pattern(r"grpc|rpc|remote")),
    ]
});

/// Condition categories, in the order they are reported.
static CONDITION_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("if", word_pattern(r"if|when|conditions?|check")),
        ("error", word_pattern(r"errors?|exceptions?|fail|failure|invalid")),
        ("timeout", word_pattern(r"timeout|timeouts|expire|expired|deadline")),
        ("retry", word_pattern(r"retry|retries|attempt|repeat")),
        ("fallback", word_pattern(r"fallback|alternative|backup")),
    ]
});

static IF_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bif\s+([^.]+)").expect("Invalid regex"));

/// Protocol by label, then endpoint types, then line style, then tcp.
pub fn infer_protocol(
    label: &str,
    style: &str,
    source: ComponentType,
    target: ComponentType,
) -> Protocol {
    if let Some(rule) = PROTOCOL_RULES.iter().find(|r| r.matches(label)) {
        return rule.protocol;
    }
    if let Some(protocol) = protocol_for_types(source, target) {
        return protocol;
    }
    if style_flag(style, "dashed") {
        return Protocol::Udp;
    }
    if style_flag(style, "dotted") {
        return Protocol::Ws;
    }
    Protocol::Tcp
}

pub fn is_bidirectional(label: &str, style: &str) -> bool {
    BIDIRECTIONAL_PATTERNS.iter().any(|(_, p)| p.is_match(label))
        || style_flag(style, "double")
        || style_value(style, "startArrow").is_some_and(|v| !v.eq_ignore_ascii_case("none"))
}

/// Matched condition categories followed by explicit `if <clause>` text.
pub fn extract_conditions(label: &str) -> Vec<String> {
    let mut conditions: Vec<String> = CONDITION_PATTERNS
        .iter()
        .filter(|(_, p)| p.is_match(label))
        .map(|(name, _)| name.to_string())
        .collect();
    for capture in IF_CLAUSE.captures_iter(label) {
        let clause = capture[1].trim().to_string();
        if !clause.is_empty() && !conditions.contains(&clause) {
            conditions.push(clause);
        }
    }
    conditions
}

/// A component id, or the composite that absorbed it.
fn resolve<'a>(
    id: &str,
    by_id: &BTreeMap<&str, &'a Component>,
    owners: &BTreeMap<&str, &str>,
) -> Option<&'a Component> {
    by_id
        .get(id)
        .or_else(|| owners.get(id).and_then(|owner| by_id.get(owner)))
        .copied()
}

#[derive(Debug, Default)]
pub struct FlowDetector;

impl FlowDetector {
    pub fn new() -> Self {
        Self
    }

    /// Flows for every connector whose endpoints resolve to two components,
    /// in cell order.
    pub fn detect(&self, cells: &[Cell], components: &[Component]) -> StageOutput<Flow> {
        let by_id: BTreeMap<&str, &Component> =
            components.iter().map(|c| (c.id.as_str(), c)).collect();
        let owners: BTreeMap<&str, &str> = components
            .iter()
            .filter(|c| c.is_composite)
            .flat_map(|c| c.member_ids().map(move |m| (m, c.id.as_str())))
            .collect();

        let mut diagnostics = Diagnostics::new();
        let mut flows = Vec::new();

        for cell in cells.iter().filter(|c| c.edge) {
            let (source_ref, target_ref) = match (cell.source.as_deref(), cell.target.as_deref()) {
                (Some(s), Some(t)) => (s, t),
                _ => {
                    info!(id = %cell.id, "Dropping connector with a missing endpoint");
                    continue;
                }
            };
            let (source, target) = match (
                resolve(source_ref, &by_id, &owners),
                resolve(target_ref, &by_id, &owners),
            ) {
                (Some(s), Some(t)) => (s, t),
                _ => {
                    info!(
                        id = %cell.id,
                        source = %source_ref,
                        target = %target_ref,
                        "Dropping connector with an unknown endpoint"
                    );
                    continue;
                }
            };
            if source.id == target.id && source_ref != target_ref {
                info!(
                    id = %cell.id,
                    composite = %source.id,
                    "Dropping connector internal to a composite"
                );
                continue;
            }

            let flow = self.build_flow(cell, source, target);
            let (flow, warnings) = correct_flow(&flow, source, target);
            for message in warnings {
                warn!("{}", message);
                diagnostics.warn(message);
            }
            flows.push(flow);
        }

        debug!(flows = flows.len(), "Flow detection complete");
        StageOutput::new(flows, diagnostics)
    }

    fn build_flow(&self, cell: &Cell, source: &Component, target: &Component) -> Flow {
        let protocol = infer_protocol(
            &cell.label,
            &cell.style,
            source.component_type,
            target.component_type,
        );
        let conditions = extract_conditions(&cell.label);
        debug!(
            id = %cell.id,
            label = %sanitize_for_log(&cell.label),
            protocol = %protocol,
            "Classified connector"
        );
        Flow {
            id: cell.id.clone(),
            label: cell.label.clone(),
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            protocol,
            bidirectional: is_bidirectional(&cell.label, &cell.style),
            conditional: !conditions.is_empty(),
            conditions,
            security_context: protocol_rule(protocol).security(),
        }
    }
}
