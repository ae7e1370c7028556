//! Composite Component Manager
//!
//! Promotes a component to a composite when its label matches an archetype
//! naming pattern and its hierarchy children cover the archetype's required
//! types plus at least one optional type. Promoted composites then replace
//! their candidate in the flat component list and absorb their members.

use crate::detection::StageOutput;
use crate::model::{
    Component, ComponentType, CompositeComponent, DataSensitivity, Diagnostics, Requirement,
    SecurityContext,
};
use crate::observability::telemetry::sanitize_for_log;
use crate::rules::{CompositeRule, COMPOSITE_RULES};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct CompositeComponentManager;

impl CompositeComponentManager {
    pub fn new() -> Self {
        Self
    }

    /// Promoted composites in input order. Only outermost composites are
    /// emitted; a nested candidate stays a plain member of its owner.
    pub fn detect_composites(&self, components: &[Component]) -> StageOutput<CompositeComponent> {
        let mut children: BTreeMap<&str, Vec<&Component>> = BTreeMap::new();
        for component in components {
            if let Some(parent) = component.parent_id.as_deref() {
                children.entry(parent).or_default().push(component);
            }
        }

        let mut promoted = Vec::new();
        for candidate in components {
            let members = match children.get(candidate.id.as_str()) {
                Some(members) if !members.is_empty() => members,
                _ => continue,
            };
            let member_types: BTreeSet<ComponentType> =
                members.iter().map(|m| m.component_type).collect();

            if let Some(rule) = COMPOSITE_RULES
                .iter()
                .find(|rule| rule.is_candidate(&candidate.name) && rule.accepts(&member_types))
            {
                debug!(
                    id = %candidate.id,
                    archetype = %rule.archetype,
                    members = members.len(),
                    "Promoting composite candidate"
                );
                promoted.push(Self::promote(candidate, members, rule));
            }
        }

        let mut diagnostics = Diagnostics::new();
        let surviving = Self::resolve_nesting(promoted, &mut diagnostics);
        StageOutput::new(surviving, diagnostics)
    }

    fn promote(
        candidate: &Component,
        members: &[&Component],
        rule: &CompositeRule,
    ) -> CompositeComponent {
        // The candidate's own annotations do not count, only its members
        let mut security_context = SecurityContext::new(
            Requirement::NotRequired,
            Requirement::NotRequired,
            DataSensitivity::Public,
        );
        for member in members {
            security_context.escalate(&member.security_context());
        }
        CompositeComponent {
            id: candidate.id.clone(),
            name: candidate.name.clone(),
            archetype: rule.archetype,
            subcomponents: members.iter().map(|m| (*m).clone()).collect(),
            parent_id: candidate.parent_id.clone(),
            security_context,
            style: candidate.style.clone(),
            confidence_score: candidate.confidence_score,
        }
    }

    /// Keep composites that no other promoted composite owns.
    ///
    /// Anything nested at any depth is absorbed by the outermost composite.
    /// A cycle in the ownership chain leaves no outermost composite, so every
    /// composite on it is dropped with a warning.
    fn resolve_nesting(
        promoted: Vec<CompositeComponent>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<CompositeComponent> {
        let owner = owner_index(&promoted);

        promoted
            .into_iter()
            .filter(|composite| {
                let mut seen = BTreeSet::from([composite.id.as_str()]);
                let mut current = composite.id.as_str();
                while let Some(next) = owner.get(current) {
                    if !seen.insert(next.as_str()) {
                        diagnostics.warn(format!(
                            "Composite '{}': ownership cycle, not promoted",
                            composite.id
                        ));
                        return false;
                    }
                    current = next.as_str();
                }
                if current != composite.id {
                    info!(
                        id = %composite.id,
                        name = %sanitize_for_log(&composite.name),
                        outer = %current,
                        "Nested composite absorbed by outermost composite"
                    );
                    return false;
                }
                true
            })
            .collect()
    }

    /// Replace each candidate with its flattened composite and drop members.
    pub fn merge(
        &self,
        components: &[Component],
        composites: &[CompositeComponent],
    ) -> Vec<Component> {
        let by_id: BTreeMap<&str, &CompositeComponent> =
            composites.iter().map(|c| (c.id.as_str(), c)).collect();
        let members: BTreeSet<&str> = composites
            .iter()
            .flat_map(|c| c.subcomponents.iter().map(|m| m.id.as_str()))
            .collect();

        components
            .iter()
            .filter(|c| !members.contains(c.id.as_str()))
            .map(|c| match by_id.get(c.id.as_str()) {
                Some(composite) => (*composite).clone().into_component(),
                None => c.clone(),
            })
            .collect()
    }
}

/// Member id to the id of the composite that absorbed it.
pub fn owner_index(composites: &[CompositeComponent]) -> BTreeMap<String, String> {
    composites
        .iter()
        .flat_map(|c| c.subcomponents.iter().map(move |m| (m.id.clone(), c.id.clone())))
        .collect()
}
