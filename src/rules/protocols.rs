//! Protocol table
//!
//! Security defaults, label patterns and compatible endpoint types per
//! protocol. An empty compatible set means the protocol fits any endpoint.

use crate::model::{ComponentType, DataSensitivity, FlowSecurity, Protocol, Requirement};
use crate::rules::components::word_pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug)]
pub struct ProtocolRule {
    pub protocol: Protocol,
    pub encryption: bool,
    pub authentication: Requirement,
    pub authorization: Requirement,
    pub security_level: SecurityLevel,
    pub data_sensitivity: DataSensitivity,
    pub patterns: Vec<Regex>,
    pub compatible_types: &'static [ComponentType],
}

impl ProtocolRule {
    pub fn security(&self) -> FlowSecurity {
        FlowSecurity {
            encryption: self.encryption,
            authentication: self.authentication,
            authorization: self.authorization,
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(label))
    }

    /// True when the set is empty or holds either endpoint type.
    pub fn is_compatible(&self, source: ComponentType, target: ComponentType) -> bool {
        self.compatible_types.is_empty()
            || self.compatible_types.contains(&source)
            || self.compatible_types.contains(&target)
    }
}

fn plain(protocol: Protocol, patterns: &str) -> ProtocolRule {
    ProtocolRule {
        protocol,
        encryption: false,
        authentication: Requirement::NotRequired,
        authorization: Requirement::NotRequired,
        security_level: SecurityLevel::Low,
        data_sensitivity: DataSensitivity::Public,
        patterns: vec![word_pattern(patterns)],
        compatible_types: &[],
    }
}

fn secured(
    protocol: Protocol,
    level: SecurityLevel,
    patterns: &str,
    compatible_types: &'static [ComponentType],
) -> ProtocolRule {
    ProtocolRule {
        protocol,
        encryption: true,
        authentication: Requirement::Required,
        authorization: Requirement::Required,
        security_level: level,
        data_sensitivity: DataSensitivity::Internal,
        patterns: vec![word_pattern(patterns)],
        compatible_types,
    }
}

pub static PROTOCOL_RULES: LazyLock<Vec<ProtocolRule>> = LazyLock::new(|| {
    use ComponentType::*;
    vec![
        plain(Protocol::Http, "http"),
        secured(Protocol::Https, SecurityLevel::High, "https|tls|ssl", &[]),
        plain(Protocol::Ws, "ws|websocket"),
        secured(Protocol::Wss, SecurityLevel::High, "wss", &[]),
        secured(
            Protocol::Grpc,
            SecurityLevel::Medium,
            "grpc|protobuf",
            &[Api, Microservice, Gateway, Serverless, CloudService, Process],
        ),
        plain(Protocol::Tcp, "tcp"),
        plain(Protocol::Udp, "udp"),
        secured(
            Protocol::Mqtt,
            SecurityLevel::Medium,
            "mqtt",
            &[MessageQueue, Monitoring, CloudService, Serverless, Process],
        ),
        secured(
            Protocol::Amqp,
            SecurityLevel::High,
            "amqp|rabbitmq",
            &[MessageQueue, Microservice, Serverless, Process],
        ),
        secured(
            Protocol::Kafka,
            SecurityLevel::High,
            "kafka",
            &[MessageQueue, Microservice, Monitoring, Process],
        ),
    ]
});

pub fn protocol_rule(protocol: Protocol) -> &'static ProtocolRule {
    let index = Protocol::all()
        .iter()
        .position(|p| *p == protocol)
        .unwrap_or(0);
    &PROTOCOL_RULES[index]
}

/// Endpoint-type heuristic shared by inference and correction.
///
/// Checked in order: database, api, message-queue, cache, web-application.
pub fn protocol_for_types(source: ComponentType, target: ComponentType) -> Option<Protocol> {
    const HEURISTIC: [(ComponentType, Protocol); 5] = [
        (ComponentType::Database, Protocol::Tcp),
        (ComponentType::Api, Protocol::Https),
        (ComponentType::MessageQueue, Protocol::Amqp),
        (ComponentType::Cache, Protocol::Tcp),
        (ComponentType::WebApplication, Protocol::Https),
    ];
    HEURISTIC
        .iter()
        .find(|(t, _)| *t == source || *t == target)
        .map(|(_, p)| *p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_enum() {
        let order: Vec<_> = PROTOCOL_RULES.iter().map(|r| r.protocol).collect();
        assert_eq!(order, Protocol::all().to_vec());
    }

    #[test]
    fn test_secure_protocols_require_auth() {
        for rule in PROTOCOL_RULES.iter() {
            assert_eq!(rule.encryption, rule.authentication.is_required());
            assert_eq!(rule.encryption, rule.authorization.is_required());
        }
        assert_eq!(protocol_rule(Protocol::Grpc).security_level, SecurityLevel::Medium);
    }

    #[test]
    fn test_patterns_do_not_overlap_prefixes() {
        assert!(protocol_rule(Protocol::Https).matches("HTTPS call"));
        assert!(!protocol_rule(Protocol::Http).matches("HTTPS call"));
        assert!(protocol_rule(Protocol::Wss).matches("over wss"));
        assert!(!protocol_rule(Protocol::Ws).matches("over wss"));
        assert!(protocol_rule(Protocol::Ws).matches("WebSocket updates"));
    }

    #[test]
    fn test_compatibility() {
        let kafka = protocol_rule(Protocol::Kafka);
        assert!(kafka.is_compatible(ComponentType::WebApplication, ComponentType::MessageQueue));
        assert!(!kafka.is_compatible(ComponentType::WebApplication, ComponentType::Database));
        assert!(protocol_rule(Protocol::Tcp)
            .is_compatible(ComponentType::Cdn, ComponentType::Cdn));
    }

    #[test]
    fn test_type_heuristic_order() {
        use ComponentType::*;
        assert_eq!(protocol_for_types(WebApplication, Database), Some(Protocol::Tcp));
        assert_eq!(protocol_for_types(Api, MessageQueue), Some(Protocol::Https));
        assert_eq!(protocol_for_types(Process, MessageQueue), Some(Protocol::Amqp));
        assert_eq!(protocol_for_types(Cache, Process), Some(Protocol::Tcp));
        assert_eq!(protocol_for_types(Cdn, WebApplication), Some(Protocol::Https));
        assert_eq!(protocol_for_types(Cdn, Process), None);
    }
}
