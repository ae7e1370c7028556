//! Data-driven rule tables
//!
//! Every heuristic the detectors apply is declared here as a static table
//! keyed by archetype, so rules can be tested on their own and partially
//! overridden through configuration.

pub mod catalog;
pub mod components;
pub mod composites;
pub mod data_assets;
pub mod protocols;
pub mod threats;

pub use catalog::{KnownThreat, KNOWN_THREATS};
pub use components::{component_rule, ComponentRule, ContextRule, COMPONENT_RULES};
pub use composites::{CompositeRule, COMPOSITE_RULES};
pub use data_assets::{DataClass, DATA_CLASSES};
pub use protocols::{protocol_for_types, protocol_rule, ProtocolRule, SecurityLevel, PROTOCOL_RULES};
pub use threats::{
    classify_threat, threat_rule, CompositeThreatRule, ThreatRule, COMPOSITE_THREAT_RULES,
    THREAT_RULES,
};
