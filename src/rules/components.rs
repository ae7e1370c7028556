//! Component archetype table
//!
//! One entry per `ComponentType`, in declaration order. Each entry carries the
//! keyword set used for token overlap, the security defaults applied to a
//! freshly classified component, three archetype patterns and the context
//! rules consulted by the refinement pass.

use crate::model::{ComponentType, DataSensitivity, Requirement, SecurityContext};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Predicate over the set of types connected to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRule {
    Has(ComponentType),
    HasAny(&'static [ComponentType]),
    MoreThan(usize),
}

impl ContextRule {
    pub fn matches(&self, connected: &BTreeSet<ComponentType>) -> bool {
        match self {
            ContextRule::Has(t) => connected.contains(t),
            ContextRule::HasAny(types) => types.iter().any(|t| connected.contains(t)),
            ContextRule::MoreThan(n) => connected.len() > *n,
        }
    }
}

#[derive(Debug)]
pub struct ComponentRule {
    pub component_type: ComponentType,
    /// Matched against both label and style tokens
    pub keywords: &'static [&'static str],
    /// Diagram shape names that only show up in styles
    pub shape_hints: &'static [&'static str],
    pub authentication: Requirement,
    pub authorization: Requirement,
    pub data_sensitivity: DataSensitivity,
    pub patterns: Vec<Regex>,
    pub context_rules: Vec<ContextRule>,
}

impl ComponentRule {
    pub fn defaults(&self) -> SecurityContext {
        SecurityContext::new(self.authentication, self.authorization, self.data_sensitivity)
    }

    pub fn matches_pattern(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }

    pub fn matches_context(&self, connected: &BTreeSet<ComponentType>) -> bool {
        self.context_rules.iter().any(|r| r.matches(connected))
    }

    pub fn is_style_keyword(&self, token: &str) -> bool {
        self.keywords.contains(&token) || self.shape_hints.contains(&token)
    }

    pub fn is_label_keyword(&self, token: &str) -> bool {
        self.keywords.contains(&token)
    }
}

/// Case-insensitive, word-bounded alternation.
pub(crate) fn word_pattern(alternatives: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives)).expect("Invalid regex")
}

fn rule(
    component_type: ComponentType,
    keywords: &'static [&'static str],
    shape_hints: &'static [&'static str],
    security: (Requirement, Requirement, DataSensitivity),
    patterns: [&str; 3],
    context_rules: Vec<ContextRule>,
) -> ComponentRule {
    ComponentRule {
        component_type,
        keywords,
        shape_hints,
        authentication: security.0,
        authorization: security.1,
        data_sensitivity: security.2,
        patterns: patterns.iter().map(|p| word_pattern(p)).collect(),
        context_rules,
    }
}

const GUARDED_INTERNAL: (Requirement, Requirement, DataSensitivity) = (
    Requirement::Required,
    Requirement::Required,
    DataSensitivity::Internal,
);

const OPEN_PUBLIC: (Requirement, Requirement, DataSensitivity) = (
    Requirement::NotRequired,
    Requirement::NotRequired,
    DataSensitivity::Public,
);

pub static COMPONENT_RULES: LazyLock<Vec<ComponentRule>> = LazyLock::new(|| {
    use ComponentType::*;
    vec![
        rule(
            WebApplication,
            &["web", "browser", "client", "frontend", "ui", "interface"],
            &[],
            GUARDED_INTERNAL,
            [
                r"web|browser|client|frontend|ui|interface",
                r"spa|mpa|application",
                r"portal|dashboard|console",
            ],
            vec![ContextRule::Has(Api), ContextRule::Has(Cdn)],
        ),
        rule(
            Api,
            &["api", "rest", "graphql", "endpoint", "service"],
            &[],
            GUARDED_INTERNAL,
            [
                r"api|rest|graphql|endpoint|service",
                r"resource|controller|handler",
                r"gateway|proxy|router",
            ],
            vec![ContextRule::Has(WebApplication), ContextRule::Has(Database)],
        ),
        rule(
            Database,
            &["database", "db", "sql", "nosql", "postgres", "mysql", "mongodb", "oracle"],
            &["cylinder", "cylinder3", "datastore"],
            (
                Requirement::Required,
                Requirement::Required,
                DataSensitivity::Confidential,
            ),
            [
                r"db|database|sql|nosql|postgres|mysql|mongodb|oracle",
                r"data\s*store|data\s*warehouse|data\s*lake",
                r"rdbms|document\s*store|key\s*value",
            ],
            vec![ContextRule::Has(Api), ContextRule::Has(WebApplication)],
        ),
        rule(
            CloudService,
            &["cloud", "aws", "azure", "gcp", "s3", "lambda", "function"],
            &[],
            GUARDED_INTERNAL,
            [
                r"cloud|aws|azure|gcp|s3|lambda|function",
                r"managed\s*service|platform\s*service",
                r"infrastructure\s*as\s*code|iac",
            ],
            vec![
                ContextRule::HasAny(&[Api, Database, Serverless]),
                ContextRule::Has(Monitoring),
            ],
        ),
        rule(
            Serverless,
            &["lambda", "function", "serverless", "faas"],
            &[],
            GUARDED_INTERNAL,
            [
                r"lambda|function|serverless|faas",
                r"event\s*driven|trigger",
                r"stateless|ephemeral",
            ],
            vec![ContextRule::Has(CloudService), ContextRule::Has(Api)],
        ),
        rule(
            Microservice,
            &["service", "microservice", "ms", "backend"],
            &[],
            GUARDED_INTERNAL,
            [
                r"service|microservice|ms|backend",
                r"bounded\s*context|domain",
                r"service\s*mesh|sidecar",
            ],
            vec![ContextRule::Has(Api), ContextRule::Has(MessageQueue)],
        ),
        rule(
            LoadBalancer,
            &["load-balancer", "lb", "haproxy", "nginx"],
            &[],
            OPEN_PUBLIC,
            [
                r"load-balancer|lb|haproxy|nginx",
                r"traffic\s*manager|ingress",
                r"reverse\s*proxy|forward\s*proxy",
            ],
            vec![ContextRule::MoreThan(2), ContextRule::Has(WebApplication)],
        ),
        rule(
            Cache,
            &["cache", "redis", "memcached", "memory"],
            &[],
            GUARDED_INTERNAL,
            [
                r"cache|redis|memcached|memory",
                r"distributed\s*cache|session\s*store",
                r"in-memory|temporary\s*storage",
            ],
            vec![ContextRule::Has(Database), ContextRule::Has(Api)],
        ),
        rule(
            MessageQueue,
            &["queue", "kafka", "rabbitmq", "mq", "message"],
            &[],
            GUARDED_INTERNAL,
            [
                r"queue|kafka|rabbitmq|mq|message",
                r"event\s*bus|pub\s*sub",
                r"stream|pipeline",
            ],
            vec![ContextRule::Has(Microservice), ContextRule::Has(Serverless)],
        ),
        rule(
            Process,
            &["process", "application", "app", "program"],
            &[],
            OPEN_PUBLIC,
            [
                r"process|application|app|program",
                r"worker|job|task",
                r"batch|scheduled",
            ],
            vec![ContextRule::Has(Database), ContextRule::Has(MessageQueue)],
        ),
        rule(
            Gateway,
            &["gateway", "api-gateway", "proxy"],
            &[],
            GUARDED_INTERNAL,
            [
                r"gateway|api-gateway|proxy",
                r"bff|backend\s*for\s*frontend",
                r"edge\s*service|entry\s*point",
            ],
            vec![ContextRule::Has(Api), ContextRule::Has(WebApplication)],
        ),
        rule(
            Cdn,
            &["cdn", "content-delivery", "edge"],
            &[],
            OPEN_PUBLIC,
            [
                r"cdn|content-delivery|edge",
                r"static\s*content|media\s*delivery",
                r"cache\s*network|distributed\s*network",
            ],
            vec![ContextRule::Has(WebApplication), ContextRule::Has(CloudService)],
        ),
        rule(
            Monitoring,
            &["monitoring", "metrics", "logging", "prometheus", "grafana"],
            &[],
            GUARDED_INTERNAL,
            [
                r"monitoring|metrics|logging|prometheus|grafana",
                r"observability|telemetry",
                r"alert|dashboard|visualization",
            ],
            vec![ContextRule::MoreThan(1), ContextRule::Has(CloudService)],
        ),
    ]
});

/// Rule entry for a type.
pub fn component_rule(component_type: ComponentType) -> &'static ComponentRule {
    // Table order mirrors `ComponentType::all()`
    let index = ComponentType::all()
        .iter()
        .position(|t| *t == component_type)
        .unwrap_or(0);
    &COMPONENT_RULES[index]
}
