//! Threagile-shaped output document

use crate::errors::MappingError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreagileDocument {
    pub title: String,
    pub description: String,
    pub date: String,
    pub author: String,
    pub components: Vec<MappedComponent>,
    pub technical_assets: Vec<TechnicalAsset>,
    pub data_assets: Vec<DataAsset>,
    pub trust_boundaries: Vec<TrustBoundary>,
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub threats: Vec<MappedThreat>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappedComponent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub description: String,
    pub tags: Vec<String>,
    pub technical_assets: Vec<String>,
    pub data_assets: Vec<String>,
    pub trust_boundaries: Vec<String>,
    pub security_controls: Vec<String>,
    pub compliance_requirements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAsset {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    pub description: String,
    pub technology: String,
    pub usage: String,
    pub owner: String,
    pub confidentiality: String,
    pub integrity: String,
    pub availability: String,
    pub justification_cia_rating: String,
    pub internet: bool,
    pub used_as_client_by_human: bool,
    pub multi_tenant: bool,
    pub redundant: bool,
    pub custom_developed_parts: bool,
    pub encryption: String,
    pub authentication: String,
    pub authorization: String,
    pub data_assets_processed: Vec<String>,
    pub data_assets_stored: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataAsset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub usage: String,
    pub owner: String,
    pub confidentiality: String,
    pub integrity: String,
    pub availability: String,
    pub justification_cia_rating: String,
    pub data_classification: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustBoundary {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub boundary_type: String,
    pub components: Vec<String>,
    pub technical_assets: Vec<String>,
    pub data_assets: Vec<String>,
    pub trust_boundaries_nested: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub source: String,
    pub target: String,
    pub protocol: String,
    pub authentication: String,
    pub authorization: String,
    pub encryption: String,
    pub bidirectional: bool,
    pub data_assets: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappedThreat {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub threat_type: String,
    pub description: String,
    pub risk_score: f64,
    pub priority: String,
    pub is_composite: bool,
    pub affected_components: Vec<String>,
    pub affected_relations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_threat_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owasp_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(default)]
    pub mitigations: Vec<String>,
}

impl ThreagileDocument {
    pub fn to_yaml(&self) -> Result<String, MappingError> {
        serde_yaml::to_string(self).map_err(|e| MappingError::Serialize(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, MappingError> {
        serde_json::to_string_pretty(self).map_err(|e| MappingError::Serialize(e.to_string()))
    }

    /// Generic tree form consumed by the validator.
    pub fn to_value(&self) -> Result<serde_json::Value, MappingError> {
        serde_json::to_value(self).map_err(|e| MappingError::Serialize(e.to_string()))
    }

    /// Ids of every collection, in document order.
    pub fn all_ids(&self) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .map(|c| c.id.as_str())
            .chain(self.technical_assets.iter().map(|a| a.id.as_str()))
            .chain(self.data_assets.iter().map(|a| a.id.as_str()))
            .chain(self.trust_boundaries.iter().map(|b| b.id.as_str()))
            .chain(self.relations.iter().map(|r| r.id.as_str()))
            .chain(self.threats.iter().map(|t| t.id.as_str()))
    }
}
