//! Composite component archetypes

use crate::model::ComponentType;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

#[derive(Debug)]
pub struct CompositeRule {
    pub archetype: ComponentType,
    pub required: &'static [ComponentType],
    pub optional: &'static [ComponentType],
    /// Naming patterns match anywhere in the label, so `PaymentService` counts
    pub naming: Vec<Regex>,
}

impl CompositeRule {
    pub fn is_candidate(&self, label: &str) -> bool {
        self.naming.iter().any(|p| p.is_match(label))
    }

    /// All required types present and at least one optional type.
    pub fn accepts(&self, child_types: &BTreeSet<ComponentType>) -> bool {
        self.required.iter().all(|t| child_types.contains(t))
            && self.optional.iter().any(|t| child_types.contains(t))
    }
}

fn naming(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("Invalid regex"))
        .collect()
}

/// Archetypes in promotion order.
pub static COMPOSITE_RULES: LazyLock<Vec<CompositeRule>> = LazyLock::new(|| {
    use ComponentType::*;
    vec![
        CompositeRule {
            archetype: Microservice,
            required: &[Api, Database],
            optional: &[Cache, MessageQueue],
            naming: naming(&[r"(service|microservice|backend)", r"(bounded\s*context|domain)"]),
        },
        CompositeRule {
            archetype: WebApplication,
            required: &[WebApplication, Api],
            optional: &[Cdn, Cache],
            naming: naming(&[r"(web|application|portal)", r"(spa|mpa|frontend)"]),
        },
        CompositeRule {
            archetype: CloudService,
            required: &[Api, Database],
            optional: &[Serverless, Monitoring],
            naming: naming(&[r"(cloud|aws|azure|gcp)", r"(managed\s*service|platform)"]),
        },
    ]
});
