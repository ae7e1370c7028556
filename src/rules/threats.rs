//! Threat signature tables
//!
//! - `THREAT_RULES`: per simple threat type, three word-bounded label
//!   patterns and the weighted risk factors summed into the base score
//! - `COMPOSITE_THREAT_RULES`: co-occurrence archetypes with their multiplier

use crate::model::ThreatType;
use crate::rules::components::word_pattern;
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug)]
pub struct ThreatRule {
    pub threat_type: ThreatType,
    pub patterns: Vec<Regex>,
    pub risk_factors: &'static [(&'static str, f64)],
}

impl ThreatRule {
    pub fn matches(&self, label: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(label))
    }

    pub fn base_weight(&self) -> f64 {
        self.risk_factors.iter().map(|(_, w)| w).sum()
    }
}

#[derive(Debug, Clone)]
pub struct CompositeThreatRule {
    pub archetype: ThreatType,
    pub required: &'static [ThreatType],
    pub optional: &'static [ThreatType],
    pub multiplier: f64,
}

fn rule(
    threat_type: ThreatType,
    patterns: [&str; 3],
    risk_factors: &'static [(&'static str, f64)],
) -> ThreatRule {
    ThreatRule {
        threat_type,
        patterns: patterns.iter().map(|p| word_pattern(p)).collect(),
        risk_factors,
    }
}

/// Simple threat types in detection order. The first matching type wins.
pub static THREAT_RULES: LazyLock<Vec<ThreatRule>> = LazyLock::new(|| {
    vec![
        rule(
            ThreatType::Authentication,
            [
                r"auth|authn|authenticat\w*|log-?in|logon|passwords?|credentials?",
                r"tokens?|sessions?|cookies?",
                r"identity|identities|users?|accounts?",
            ],
            &[
                ("authentication", 0.8),
                ("authorization", 0.6),
                ("data_sensitivity", 0.4),
            ],
        ),
        rule(
            ThreatType::Authorization,
            [
                r"authz|authori[sz]\w*|permissions?|roles?|access",
                r"privileges?|rights?|polic(?:y|ies)",
                r"control|restrict\w*|limits?",
            ],
            &[
                ("authorization", 0.8),
                ("data_sensitivity", 0.6),
                ("authentication", 0.4),
            ],
        ),
        rule(
            ThreatType::DataExposure,
            [
                r"data|information|sensitive",
                r"exposure|exposed|leaks?|leakage|breach(?:es)?",
                r"pii|personal|confidential",
            ],
            &[
                ("data_sensitivity", 0.8),
                ("encryption", 0.6),
                ("authentication", 0.4),
            ],
        ),
        rule(
            ThreatType::Injection,
            [
                r"injection|sqli|sql|nosql",
                r"xss|script|scripting|code",
                r"command|shell|exec",
            ],
            &[
                ("input_validation", 0.8),
                ("authentication", 0.6),
                ("authorization", 0.4),
            ],
        ),
        rule(
            ThreatType::Dos,
            [
                r"dos|ddos|flood\w*",
                r"overload\w*|exhaust\w*|resources?",
                r"bottlenecks?|throttl\w*|limits?",
            ],
            &[
                ("availability", 0.8),
                ("resource_limits", 0.6),
                ("monitoring", 0.4),
            ],
        ),
    ]
});

pub static COMPOSITE_THREAT_RULES: LazyLock<Vec<CompositeThreatRule>> = LazyLock::new(|| {
    use ThreatType::*;
    vec![
        CompositeThreatRule {
            archetype: AuthenticationBypass,
            required: &[Authentication, Authorization],
            optional: &[Injection, DataExposure],
            multiplier: 1.5,
        },
        CompositeThreatRule {
            archetype: DataBreach,
            required: &[DataExposure, Authorization],
            optional: &[Authentication, Injection],
            multiplier: 1.8,
        },
        CompositeThreatRule {
            archetype: ServiceCompromise,
            required: &[Injection, Dos],
            optional: &[Authentication, Authorization],
            multiplier: 1.6,
        },
    ]
});

pub fn threat_rule(threat_type: ThreatType) -> Option<&'static ThreatRule> {
    THREAT_RULES.iter().find(|r| r.threat_type == threat_type)
}

/// First simple threat type whose patterns match `label`.
pub fn classify_threat(label: &str) -> Option<ThreatType> {
    THREAT_RULES
        .iter()
        .find(|r| r.matches(label))
        .map(|r| r.threat_type)
}
