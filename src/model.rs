//! Core domain types
//!
//! Everything the pipeline passes between stages lives here:
//! - `Cell`: the raw shape/connector record produced by a diagram ingester
//! - `Component` / `CompositeComponent`: classified architectural elements
//! - `Flow`: a classified connector between two components
//! - `Threat`: a detected security concern with score and priority
//! - `Diagnostics`: the warnings/errors pair every stage returns

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Ids of the diagram root and default layer. Never classified.
pub const STRUCTURAL_IDS: [&str; 2] = ["0", "1"];

// ============================================================================
// Cell
// ============================================================================

/// A raw shape or connector extracted from a diagram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: String,
    #[serde(default, alias = "value")]
    pub label: String,
    #[serde(default)]
    pub style: String,
    #[serde(default, alias = "is_edge", alias = "isEdge")]
    pub edge: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl Cell {
    /// Create a shape cell
    pub fn vertex(id: &str, label: &str, style: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            style: style.to_string(),
            ..Default::default()
        }
    }

    /// Create a connector cell
    pub fn connector(id: &str, label: &str, source: &str, target: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            edge: true,
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn with_style(mut self, style: &str) -> Self {
        self.style = style.to_string();
        self
    }

    pub fn is_structural(&self) -> bool {
        STRUCTURAL_IDS.contains(&self.id.as_str())
    }

    /// A non-edge, non-structural cell.
    pub fn is_shape(&self) -> bool {
        !self.edge && !self.is_structural()
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Declared component types, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentType {
    WebApplication,
    Api,
    Database,
    CloudService,
    Serverless,
    Microservice,
    LoadBalancer,
    Cache,
    MessageQueue,
    Process,
    Gateway,
    Cdn,
    Monitoring,
}

impl ComponentType {
    pub fn all() -> &'static [ComponentType] {
        &[
            ComponentType::WebApplication,
            ComponentType::Api,
            ComponentType::Database,
            ComponentType::CloudService,
            ComponentType::Serverless,
            ComponentType::Microservice,
            ComponentType::LoadBalancer,
            ComponentType::Cache,
            ComponentType::MessageQueue,
            ComponentType::Process,
            ComponentType::Gateway,
            ComponentType::Cdn,
            ComponentType::Monitoring,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::WebApplication => "web-application",
            ComponentType::Api => "api",
            ComponentType::Database => "database",
            ComponentType::CloudService => "cloud-service",
            ComponentType::Serverless => "serverless",
            ComponentType::Microservice => "microservice",
            ComponentType::LoadBalancer => "load-balancer",
            ComponentType::Cache => "cache",
            ComponentType::MessageQueue => "message-queue",
            ComponentType::Process => "process",
            ComponentType::Gateway => "gateway",
            ComponentType::Cdn => "cdn",
            ComponentType::Monitoring => "monitoring",
        }
    }

    /// Types every threat is assumed to touch.
    pub fn is_inherently_sensitive(&self) -> bool {
        matches!(
            self,
            ComponentType::Database | ComponentType::Api | ComponentType::WebApplication
        )
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        ComponentType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| format!("unknown component type: {}", s))
    }
}

/// Whether a security control is required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Requirement {
    /// Missing or unrecognised; rewritten by the correction pass
    #[default]
    Unspecified,
    #[serde(rename = "none")]
    NotRequired,
    Required,
}

impl Requirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Requirement::Unspecified => "unspecified",
            Requirement::NotRequired => "none",
            Requirement::Required => "required",
        }
    }

    pub fn is_required(&self) -> bool {
        *self == Requirement::Required
    }

    pub fn is_specified(&self) -> bool {
        *self != Requirement::Unspecified
    }

    /// Parse a style annotation value. Unknown values become `Unspecified`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "required" | "true" | "yes" | "1" => Requirement::Required,
            "none" | "false" | "no" | "0" => Requirement::NotRequired,
            _ => Requirement::Unspecified,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data sensitivity ladder. `Ord` follows escalation order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSensitivity {
    #[default]
    Unspecified,
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl DataSensitivity {
    pub fn all() -> &'static [DataSensitivity] {
        &[
            DataSensitivity::Public,
            DataSensitivity::Internal,
            DataSensitivity::Confidential,
            DataSensitivity::Restricted,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSensitivity::Unspecified => "unspecified",
            DataSensitivity::Public => "public",
            DataSensitivity::Internal => "internal",
            DataSensitivity::Confidential => "confidential",
            DataSensitivity::Restricted => "restricted",
        }
    }

    pub fn is_specified(&self) -> bool {
        *self != DataSensitivity::Unspecified
    }

    pub fn parse_lenient(value: &str) -> Self {
        let needle = value.trim().to_lowercase();
        DataSensitivity::all()
            .iter()
            .copied()
            .find(|s| s.as_str() == needle)
            .unwrap_or(DataSensitivity::Unspecified)
    }
}

impl fmt::Display for DataSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Communication protocols a flow can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Ws,
    Wss,
    Grpc,
    Tcp,
    Udp,
    Mqtt,
    Amqp,
    Kafka,
}

impl Protocol {
    pub fn all() -> &'static [Protocol] {
        &[
            Protocol::Http,
            Protocol::Https,
            Protocol::Ws,
            Protocol::Wss,
            Protocol::Grpc,
            Protocol::Tcp,
            Protocol::Udp,
            Protocol::Mqtt,
            Protocol::Amqp,
            Protocol::Kafka,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
            Protocol::Grpc => "grpc",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Mqtt => "mqtt",
            Protocol::Amqp => "amqp",
            Protocol::Kafka => "kafka",
        }
    }

    /// Plaintext protocols every threat is assumed to reach.
    pub fn is_weak(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Ws | Protocol::Tcp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Threat types: five simple signatures and three composite archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    Authentication,
    Authorization,
    DataExposure,
    Injection,
    Dos,
    AuthenticationBypass,
    DataBreach,
    ServiceCompromise,
}

impl ThreatType {
    /// Simple threat types in detection order
    pub fn simple() -> &'static [ThreatType] {
        &[
            ThreatType::Authentication,
            ThreatType::Authorization,
            ThreatType::DataExposure,
            ThreatType::Injection,
            ThreatType::Dos,
        ]
    }

    /// Composite archetypes in promotion order
    pub fn composite() -> &'static [ThreatType] {
        &[
            ThreatType::AuthenticationBypass,
            ThreatType::DataBreach,
            ThreatType::ServiceCompromise,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::Authentication => "authentication",
            ThreatType::Authorization => "authorization",
            ThreatType::DataExposure => "data_exposure",
            ThreatType::Injection => "injection",
            ThreatType::Dos => "dos",
            ThreatType::AuthenticationBypass => "authentication_bypass",
            ThreatType::DataBreach => "data_breach",
            ThreatType::ServiceCompromise => "service_compromise",
        }
    }

    pub fn is_composite(&self) -> bool {
        ThreatType::composite().contains(self)
    }
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ThreatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        ThreatType::simple()
            .iter()
            .chain(ThreatType::composite())
            .copied()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| format!("unknown threat type: {}", s))
    }
}

/// Priority tier. `Ord` puts critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Threshold mapping: >=0.8 critical, >=0.6 high, >=0.4 medium, else low
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Priority::Critical
        } else if score >= 0.6 {
            Priority::High
        } else if score >= 0.4 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// 1 for critical through 4 for low
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 1,
            Priority::High => 2,
            Priority::Medium => 3,
            Priority::Low => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Components
// ============================================================================

/// Security attributes shared by components and composites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub authentication: Requirement,
    pub authorization: Requirement,
    pub data_sensitivity: DataSensitivity,
}

impl SecurityContext {
    pub fn new(
        authentication: Requirement,
        authorization: Requirement,
        data_sensitivity: DataSensitivity,
    ) -> Self {
        Self {
            authentication,
            authorization,
            data_sensitivity,
        }
    }

    /// Fold another context in. Requirements and sensitivity only ever rise.
    pub fn escalate(&mut self, other: &SecurityContext) {
        self.authentication = self.authentication.max(other.authentication);
        self.authorization = self.authorization.max(other.authorization);
        self.data_sensitivity = self.data_sensitivity.max(other.data_sensitivity);
    }
}

/// A classified architectural element.
///
/// Promoted composites share this shape with `is_composite` set and a
/// non-empty `subcomponents` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub confidence_score: f64,
    pub authentication: Requirement,
    pub authorization: Requirement,
    pub data_sensitivity: DataSensitivity,
    #[serde(default)]
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_composite: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcomponents: Vec<Component>,
}

impl Component {
    pub fn new(id: &str, name: &str, component_type: ComponentType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            component_type,
            confidence_score: 0.0,
            authentication: Requirement::Unspecified,
            authorization: Requirement::Unspecified,
            data_sensitivity: DataSensitivity::Unspecified,
            style: String::new(),
            parent_id: None,
            tags: Vec::new(),
            is_composite: false,
            subcomponents: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, score: f64) -> Self {
        self.confidence_score = score;
        self
    }

    pub fn with_security(mut self, context: SecurityContext) -> Self {
        self.authentication = context.authentication;
        self.authorization = context.authorization;
        self.data_sensitivity = context.data_sensitivity;
        self
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent_id = Some(parent.to_string());
        self
    }

    pub fn with_style(mut self, style: &str) -> Self {
        self.style = style.to_string();
        self
    }

    pub fn security_context(&self) -> SecurityContext {
        SecurityContext::new(self.authentication, self.authorization, self.data_sensitivity)
    }

    pub fn requires_authentication(&self) -> bool {
        self.authentication.is_required()
    }

    pub fn requires_authorization(&self) -> bool {
        self.authorization.is_required()
    }

    /// Ids of the direct subcomponents of a composite.
    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.subcomponents.iter().map(|c| c.id.as_str())
    }
}

/// A promoted grouping of components matching a composite archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeComponent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub archetype: ComponentType,
    pub subcomponents: Vec<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub security_context: SecurityContext,
    #[serde(default)]
    pub style: String,
    pub confidence_score: f64,
}

impl CompositeComponent {
    /// Flatten into the common component shape.
    pub fn into_component(self) -> Component {
        let tags = vec![self.archetype.as_str().to_string(), "composite".to_string()];
        Component {
            id: self.id,
            name: self.name,
            component_type: self.archetype,
            confidence_score: self.confidence_score,
            authentication: self.security_context.authentication,
            authorization: self.security_context.authorization,
            data_sensitivity: self.security_context.data_sensitivity,
            style: self.style,
            parent_id: self.parent_id,
            tags,
            is_composite: true,
            subcomponents: self.subcomponents,
        }
    }
}

// ============================================================================
// Flows
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSecurity {
    pub encryption: bool,
    pub authentication: Requirement,
    pub authorization: Requirement,
}

/// A classified connector between two known components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub source_id: String,
    pub target_id: String,
    pub protocol: Protocol,
    pub bidirectional: bool,
    pub conditional: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    pub security_context: FlowSecurity,
}

// ============================================================================
// Threats
// ============================================================================

/// A detected security concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    pub id: String,
    #[serde(rename = "type")]
    pub threat_type: ThreatType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub affected_component_ids: BTreeSet<String>,
    pub affected_flow_ids: BTreeSet<String>,
    pub risk_score: f64,
    pub priority: Priority,
    pub is_composite: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub base_threat_types: BTreeSet<ThreatType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owasp_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mitigations: Vec<String>,
}

impl Threat {
    pub fn new(id: &str, name: &str, threat_type: ThreatType) -> Self {
        Self {
            id: id.to_string(),
            threat_type,
            name: name.to_string(),
            description: String::new(),
            affected_component_ids: BTreeSet::new(),
            affected_flow_ids: BTreeSet::new(),
            risk_score: 0.0,
            priority: Priority::Low,
            is_composite: threat_type.is_composite(),
            base_threat_types: BTreeSet::new(),
            owasp_category: None,
            cwe: None,
            mitigations: Vec::new(),
        }
    }

    /// Set the score clamped to [0, 1] and re-derive the priority.
    pub fn set_risk_score(&mut self, score: f64) {
        self.risk_score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.priority = Priority::from_score(self.risk_score);
    }

    pub fn with_risk_score(mut self, score: f64) -> Self {
        self.set_risk_score(score);
        self
    }

    pub fn with_components<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_component_ids
            .extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_flows<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_flow_ids.extend(ids.into_iter().map(Into::into));
        self
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Non-fatal warnings and entity-level errors produced by a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

// ============================================================================
// Style helpers
// ============================================================================

/// Lowercase alphanumeric/hyphen runs of `text`, deduplicated.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|t| t.trim_matches('-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Look up `key=value` in a `;`-separated style string (case-insensitive key).
pub fn style_value<'a>(style: &'a str, key: &str) -> Option<&'a str> {
    style.split(';').find_map(|part| {
        let (k, v) = part.split_once('=')?;
        k.trim().eq_ignore_ascii_case(key).then(|| v.trim())
    })
}

/// A style flag is set when present bare or with a value other than `0`.
pub fn style_flag(style: &str, key: &str) -> bool {
    style.split(';').any(|part| {
        let part = part.trim();
        match part.split_once('=') {
            Some((k, v)) => k.trim().eq_ignore_ascii_case(key) && v.trim() != "0",
            None => part.eq_ignore_ascii_case(key),
        }
    })
}
