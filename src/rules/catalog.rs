//! Known-threat catalog
//!
//! Reference entries used to enrich detected threats with an OWASP category,
//! a CWE id and suggested mitigations.

use crate::model::{ComponentType, ThreatType};

#[derive(Debug, Clone, PartialEq)]
pub struct KnownThreat {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub owasp_category: &'static str,
    pub cwe: &'static str,
    /// Empty means every component type
    pub affected_types: &'static [ComponentType],
    pub mitigations: &'static [&'static str],
    /// Lowercase phrases that identify the entry in a label
    pub keywords: &'static [&'static str],
}

impl KnownThreat {
    pub fn affects(&self, component_type: ComponentType) -> bool {
        self.affected_types.is_empty() || self.affected_types.contains(&component_type)
    }
}

pub static KNOWN_THREATS: &[KnownThreat] = &[
    KnownThreat {
        id: "xss",
        name: "Cross-Site Scripting",
        description: "Malicious script injected into pages served to other users",
        owasp_category: "A7:2021",
        cwe: "CWE-79",
        affected_types: &[ComponentType::WebApplication, ComponentType::Api],
        mitigations: &["input-validation", "output-encoding"],
        keywords: &["xss", "cross-site scripting", "script"],
    },
    KnownThreat {
        id: "sql-injection",
        name: "SQL Injection",
        description: "Attacker-controlled input executed as a database query",
        owasp_category: "A3:2021",
        cwe: "CWE-89",
        affected_types: &[ComponentType::Database, ComponentType::Api],
        mitigations: &["prepared-statements", "input-validation"],
        keywords: &["sql", "injection", "sqli"],
    },
    KnownThreat {
        id: "csrf",
        name: "Cross-Site Request Forgery",
        description: "Forged request riding on an authenticated user session",
        owasp_category: "A1:2021",
        cwe: "CWE-352",
        affected_types: &[ComponentType::WebApplication],
        mitigations: &["csrf-tokens", "same-site-cookies"],
        keywords: &["csrf", "request forgery"],
    },
    KnownThreat {
        id: "dos",
        name: "Denial of Service",
        description: "Service made unavailable through resource exhaustion",
        owasp_category: "A5:2021",
        cwe: "CWE-400",
        affected_types: &[],
        mitigations: &["rate-limiting", "load-balancing"],
        keywords: &["dos", "ddos", "denial of service", "flood"],
    },
    KnownThreat {
        id: "data-leak",
        name: "Data Leakage",
        description: "Unauthorised exposure of sensitive data",
        owasp_category: "A4:2021",
        cwe: "CWE-200",
        affected_types: &[
            ComponentType::Database,
            ComponentType::Api,
            ComponentType::WebApplication,
        ],
        mitigations: &["encryption", "access-controls"],
        keywords: &["leak", "exposure", "breach"],
    },
    KnownThreat {
        id: "auth-bypass",
        name: "Authentication Bypass",
        description: "Authentication controls circumvented",
        owasp_category: "A2:2021",
        cwe: "CWE-287",
        affected_types: &[],
        mitigations: &["strong-auth", "mfa"],
        keywords: &["bypass", "auth bypass", "authentication bypass"],
    },
    KnownThreat {
        id: "man-in-middle",
        name: "Man in the Middle",
        description: "Traffic intercepted between two parties",
        owasp_category: "A6:2021",
        cwe: "CWE-300",
        affected_types: &[],
        mitigations: &["tls", "certificate-pinning"],
        keywords: &["mitm", "man in the middle", "man-in-the-middle", "interception"],
    },
    KnownThreat {
        id: "insecure-api",
        name: "Insecure API",
        description: "API exposing exploitable weaknesses",
        owasp_category: "A8:2021",
        cwe: "CWE-20",
        affected_types: &[ComponentType::Api],
        mitigations: &["api-security", "rate-limiting"],
        keywords: &["insecure api", "api abuse"],
    },
    KnownThreat {
        id: "weak-crypto",
        name: "Weak Cryptography",
        description: "Weak or obsolete cryptographic primitives",
        owasp_category: "A9:2021",
        cwe: "CWE-326",
        affected_types: &[],
        mitigations: &["strong-crypto", "key-management"],
        keywords: &["weak crypto", "cryptography", "cipher", "md5", "sha1"],
    },
    KnownThreat {
        id: "misconfig",
        name: "Security Misconfiguration",
        description: "Incorrect or default security configuration",
        owasp_category: "A5:2021",
        cwe: "CWE-16",
        affected_types: &[],
        mitigations: &["security-hardening", "configuration-management"],
        keywords: &["misconfig", "misconfiguration", "default config"],
    },
];

pub fn known_threat(id: &str) -> Option<&'static KnownThreat> {
    KNOWN_THREATS.iter().find(|t| t.id == id)
}

/// Catalog entries that can affect a component type.
pub fn threats_for_component(component_type: ComponentType) -> Vec<&'static KnownThreat> {
    KNOWN_THREATS
        .iter()
        .filter(|t| t.affects(component_type))
        .collect()
}

/// Fallback entry per threat type when no keyword matches.
fn default_entry(threat_type: ThreatType) -> Option<&'static str> {
    match threat_type {
        ThreatType::Authentication | ThreatType::AuthenticationBypass => Some("auth-bypass"),
        ThreatType::Authorization => Some("misconfig"),
        ThreatType::DataExposure | ThreatType::DataBreach => Some("data-leak"),
        ThreatType::Injection => Some("sql-injection"),
        ThreatType::Dos => Some("dos"),
        ThreatType::ServiceCompromise => None,
    }
}

/// Catalog entry for a detected threat: first keyword hit in the label,
/// otherwise the threat type's default entry.
pub fn lookup(label: &str, threat_type: ThreatType) -> Option<&'static KnownThreat> {
    let lowered = label.to_lowercase();
    KNOWN_THREATS
        .iter()
        .find(|t| t.keywords.iter().any(|k| lowered.contains(k)))
        .or_else(|| default_entry(threat_type).and_then(known_threat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_unique() {
        let mut ids: Vec<_> = KNOWN_THREATS.iter().map(|t| t.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), KNOWN_THREATS.len());
    }

    #[test]
    fn test_lookup_by_keyword() {
        let entry = lookup("SQL Injection", ThreatType::Injection).unwrap();
        assert_eq!(entry.cwe, "CWE-89");
        let entry = lookup("Stored XSS in comments", ThreatType::Injection).unwrap();
        assert_eq!(entry.id, "xss");
    }

    #[test]
    fn test_lookup_falls_back_to_type_default() {
        let entry = lookup("Stolen session cookie", ThreatType::Authentication).unwrap();
        assert_eq!(entry.id, "auth-bypass");
        assert!(lookup("", ThreatType::ServiceCompromise).is_none());
    }

    #[test]
    fn test_threats_for_component() {
        let db = threats_for_component(ComponentType::Database);
        assert!(db.iter().any(|t| t.id == "sql-injection"));
        assert!(db.iter().any(|t| t.id == "dos"));
        assert!(!db.iter().any(|t| t.id == "csrf"));
    }
}
