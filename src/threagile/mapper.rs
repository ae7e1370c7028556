//! Threagile Mapper
//!
//! Projects the detected component/flow/threat graph onto the output document.
//! Every emitted id is recorded in a [`ReferenceCache`]; once all collections
//! are mapped, each cross-reference is checked against the cache. Unresolved
//! references become errors on the owning entity, which is kept.

use crate::config::MappingConfig;
use crate::detection::slugify;
use crate::model::{Component, ComponentType, DataSensitivity, Flow, Threat};
use crate::rules::data_assets::{classify_label, DataClass};
use crate::threagile::document::{
    DataAsset, MappedComponent, MappedThreat, Relation, TechnicalAsset, ThreagileDocument,
    TrustBoundary,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const DEFAULT_BOUNDARY_ID: &str = "boundary-default";

// ============================================================================
// Inputs
// ============================================================================

/// Title, description, date and author written at the top of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub description: String,
    pub date: String,
    pub author: String,
}

impl DocumentMetadata {
    /// Metadata from configured defaults and an explicit run date.
    pub fn from_config(config: &MappingConfig, date: &str) -> Self {
        Self {
            title: config.metadata.title.clone(),
            description: config.metadata.description.clone(),
            date: date.to_string(),
            author: config.metadata.author.clone(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }
}

/// The detected graph handed to the mapper.
#[derive(Debug, Clone, Copy)]
pub struct InternalGraph<'a> {
    pub metadata: &'a DocumentMetadata,
    /// Merged component list; composites carry their members
    pub components: &'a [Component],
    pub flows: &'a [Flow],
    pub threats: &'a [Threat],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTechnicalAsset {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
    pub description: Option<String>,
    pub technology: Option<String>,
    pub usage: Option<String>,
    pub owner: Option<String>,
    pub confidentiality: Option<String>,
    pub integrity: Option<String>,
    pub availability: Option<String>,
    pub internet: Option<bool>,
    pub encryption: Option<String>,
    pub authentication: Option<String>,
    pub authorization: Option<String>,
    pub data_assets_processed: Option<Vec<String>>,
    pub data_assets_stored: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDataAsset {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub owner: Option<String>,
    pub confidentiality: Option<String>,
    pub integrity: Option<String>,
    pub availability: Option<String>,
    pub data_classification: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTrustBoundary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub boundary_type: Option<String>,
    pub components: Option<Vec<String>>,
    pub technical_assets: Option<Vec<String>>,
    pub data_assets: Option<Vec<String>>,
    pub trust_boundaries_nested: Option<Vec<String>>,
}

/// Assets supplied alongside the diagram and appended to the output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExistingAssets {
    pub technical_assets: Vec<RawTechnicalAsset>,
    pub data_assets: Vec<RawDataAsset>,
    pub trust_boundaries: Vec<RawTrustBoundary>,
}

impl ExistingAssets {
    pub fn is_empty(&self) -> bool {
        self.technical_assets.is_empty()
            && self.data_assets.is_empty()
            && self.trust_boundaries.is_empty()
    }
}

// ============================================================================
// Result
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MappingResult {
    /// Exactly `errors.is_empty()`
    pub success: bool,
    pub document: ThreagileDocument,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Ids emitted so far, per collection.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCache {
    pub components: BTreeSet<String>,
    pub technical_assets: BTreeSet<String>,
    pub data_assets: BTreeSet<String>,
    pub trust_boundaries: BTreeSet<String>,
    pub relations: BTreeSet<String>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relation endpoints may name a component or a technical asset.
    pub fn has_endpoint(&self, id: &str) -> bool {
        self.components.contains(id) || self.technical_assets.contains(id)
    }
}

// ============================================================================
// Mapper
// ============================================================================

fn integrity_for(sensitivity: DataSensitivity) -> Option<&'static str> {
    match sensitivity {
        DataSensitivity::Unspecified => None,
        DataSensitivity::Public => Some("operational"),
        DataSensitivity::Internal => Some("important"),
        DataSensitivity::Confidential => Some("critical"),
        DataSensitivity::Restricted => Some("mission-critical"),
    }
}

fn availability_for(sensitivity: DataSensitivity) -> Option<&'static str> {
    match sensitivity {
        DataSensitivity::Unspecified => None,
        DataSensitivity::Public | DataSensitivity::Internal => Some("operational"),
        DataSensitivity::Confidential => Some("important"),
        DataSensitivity::Restricted => Some("critical"),
    }
}

fn sensitivity_level(sensitivity: DataSensitivity) -> Option<&'static str> {
    sensitivity.is_specified().then(|| sensitivity.as_str())
}

fn asset_id(component_id: &str) -> String {
    format!("asset-{}", component_id)
}

/// Slug of `text`, or `fallback` when nothing alphanumeric remains.
fn name_or(text: &str, fallback: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

fn is_datastore(component_type: ComponentType) -> bool {
    matches!(component_type, ComponentType::Database | ComponentType::Cache)
}

fn is_internet_facing(component_type: ComponentType) -> bool {
    matches!(
        component_type,
        ComponentType::WebApplication
            | ComponentType::Gateway
            | ComponentType::Cdn
            | ComponentType::LoadBalancer
    )
}

fn is_custom_developed(component_type: ComponentType) -> bool {
    matches!(
        component_type,
        ComponentType::WebApplication
            | ComponentType::Api
            | ComponentType::Microservice
            | ComponentType::Serverless
            | ComponentType::Process
    )
}

fn encryption_for(sensitivity: DataSensitivity) -> &'static str {
    if sensitivity >= DataSensitivity::Confidential {
        "transparent"
    } else {
        "none"
    }
}

/// Mutable state of one `map` call.
struct MappingRun<'c> {
    config: &'c MappingConfig,
    owner: String,
    document: ThreagileDocument,
    cache: ReferenceCache,
    /// Component id -> data asset ids derived for it
    component_data: BTreeMap<String, Vec<String>>,
    /// Every id emitted or reserved so far, across all collections
    used_ids: BTreeSet<String>,
    /// Component id -> technical asset id
    asset_ids: BTreeMap<String, String>,
    /// Composite id -> logical boundary id
    boundary_ids: BTreeMap<String, String>,
    /// Base id (`data-<class>`) -> emitted data asset id
    data_ids: BTreeMap<String, String>,
    default_boundary: String,
    errors: Vec<String>,
    warnings: Vec<String>,
}

pub struct ThreagileMapper {
    config: MappingConfig,
}

impl ThreagileMapper {
    pub fn new(config: &MappingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Build the document. Never fails; problems land in `errors`/`warnings`.
    pub fn map(&self, graph: &InternalGraph<'_>, existing: &ExistingAssets) -> MappingResult {
        let metadata = graph.metadata;
        let mut run = MappingRun {
            config: &self.config,
            owner: metadata.author.clone(),
            document: ThreagileDocument {
                title: metadata.title.clone(),
                description: metadata.description.clone(),
                date: metadata.date.clone(),
                author: metadata.author.clone(),
                ..Default::default()
            },
            cache: ReferenceCache::new(),
            component_data: BTreeMap::new(),
            used_ids: BTreeSet::new(),
            asset_ids: BTreeMap::new(),
            boundary_ids: BTreeMap::new(),
            data_ids: BTreeMap::new(),
            default_boundary: DEFAULT_BOUNDARY_ID.to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        run.reserve_ids(graph, existing);
        run.map_components(graph.components);
        run.map_boundaries(graph.components);
        run.map_relations(graph.components, graph.flows);
        run.map_threats(graph.threats);
        run.append_existing(existing);
        run.check_references();

        debug!(
            components = run.document.components.len(),
            technical_assets = run.document.technical_assets.len(),
            data_assets = run.document.data_assets.len(),
            trust_boundaries = run.document.trust_boundaries.len(),
            relations = run.document.relations.len(),
            errors = run.errors.len(),
            "Mapping complete"
        );

        MappingResult {
            success: run.errors.is_empty(),
            document: run.document,
            errors: run.errors,
            warnings: run.warnings,
        }
    }
}

impl MappingRun<'_> {
    /// Reserve the ids taken verbatim from the diagram and the existing
    /// assets, then allocate the boundary ids so generated ids never shadow them.
    fn reserve_ids(&mut self, graph: &InternalGraph<'_>, existing: &ExistingAssets) {
        for component in graph.components {
            self.used_ids.insert(component.id.clone());
            self.used_ids
                .extend(component.member_ids().map(str::to_string));
        }
        self.used_ids
            .extend(graph.flows.iter().map(|flow| flow.id.clone()));
        let explicit = existing
            .technical_assets
            .iter()
            .map(|a| a.id.as_deref())
            .chain(existing.data_assets.iter().map(|a| a.id.as_deref()))
            .chain(existing.trust_boundaries.iter().map(|b| b.id.as_deref()));
        for id in explicit.flatten().map(str::trim).filter(|id| !id.is_empty()) {
            self.used_ids.insert(id.to_string());
        }

        self.default_boundary = self.claim(DEFAULT_BOUNDARY_ID);
        for component in graph.components.iter().filter(|c| c.is_composite) {
            let id = self.claim(&format!("boundary-{}", component.id));
            self.boundary_ids.insert(component.id.clone(), id);
        }
    }

    /// `base` if unused, otherwise the first free `base-N` from 2.
    fn claim(&mut self, base: &str) -> String {
        let mut id = base.to_string();
        let mut n = 2;
        while self.used_ids.contains(&id) {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        if id != base {
            debug!(base = %base, id = %id, "Generated id already taken");
        }
        self.used_ids.insert(id.clone());
        id
    }

    fn boundary_for(&self, component: &Component) -> String {
        self.boundary_ids
            .get(&component.id)
            .cloned()
            .unwrap_or_else(|| self.default_boundary.clone())
    }

    fn map_components(&mut self, components: &[Component]) {
        for component in components {
            let mut asset_ids = vec![self.map_asset(component)];
            for member in &component.subcomponents {
                asset_ids.push(self.map_asset(member));
            }
            let mut data_ids: Vec<String> = Vec::new();
            for id in std::iter::once(component.id.as_str()).chain(component.member_ids()) {
                for data_id in self.component_data.get(id).into_iter().flatten() {
                    if !data_ids.contains(data_id) {
                        data_ids.push(data_id.clone());
                    }
                }
            }

            let internal = component.component_type.as_str();
            if !self.config.component_types.contains_key(internal) {
                let message = format!(
                    "Component '{}': type '{}' has no mapping, using '{}'",
                    component.id, internal, self.config.default_component_type
                );
                warn!("{}", message);
                self.warnings.push(message);
            }

            let mut security_controls = Vec::new();
            if component.requires_authentication() {
                security_controls.push("authentication".to_string());
            }
            if component.requires_authorization() {
                security_controls.push("authorization".to_string());
            }
            if component.data_sensitivity >= DataSensitivity::Confidential {
                security_controls.push("encryption".to_string());
            }

            let boundary = self.boundary_for(component);

            self.cache.components.insert(component.id.clone());
            self.document.components.push(MappedComponent {
                id: component.id.clone(),
                name: name_or(&component.name, "unnamed-component"),
                component_type: self.config.component_type(internal),
                description: format!(
                    "{} ({}, confidence {:.2})",
                    component.name, internal, component.confidence_score
                ),
                tags: component.tags.clone(),
                technical_assets: asset_ids,
                data_assets: data_ids,
                trust_boundaries: vec![boundary],
                security_controls,
                compliance_requirements: Vec::new(),
            });
        }
    }

    /// Emit the technical asset (and its data assets) for one component.
    fn map_asset(&mut self, component: &Component) -> String {
        let data_ids = self.map_data_assets(component);
        let sensitivity = component.data_sensitivity;
        let levels = &self.config.security_levels;
        let id = self.claim(&asset_id(&component.id));

        self.asset_ids.insert(component.id.clone(), id.clone());
        self.cache.technical_assets.insert(id.clone());
        self.document.technical_assets.push(TechnicalAsset {
            id: id.clone(),
            name: name_or(&component.name, "unnamed-component"),
            asset_type: if is_datastore(component.component_type) {
                "datastore".to_string()
            } else {
                "process".to_string()
            },
            description: format!("Technical asset backing {}", component.name),
            technology: self.config.component_type(component.component_type.as_str()),
            usage: "business".to_string(),
            owner: self.owner.clone(),
            confidentiality: levels.confidentiality(sensitivity_level(sensitivity)),
            integrity: levels.integrity(integrity_for(sensitivity)),
            availability: levels.availability(availability_for(sensitivity)),
            justification_cia_rating: format!(
                "Derived from {} data sensitivity",
                sensitivity.as_str()
            ),
            internet: is_internet_facing(component.component_type),
            used_as_client_by_human: false,
            multi_tenant: false,
            redundant: false,
            custom_developed_parts: is_custom_developed(component.component_type),
            encryption: encryption_for(sensitivity).to_string(),
            authentication: component.authentication.as_str().to_string(),
            authorization: component.authorization.as_str().to_string(),
            data_assets_stored: if is_datastore(component.component_type) {
                data_ids.clone()
            } else {
                Vec::new()
            },
            data_assets_processed: data_ids,
            tags: component.tags.clone(),
        });
        id
    }

    /// Data assets for a component's label, deduplicated by class.
    fn map_data_assets(&mut self, component: &Component) -> Vec<String> {
        let classes = classify_label(&component.name);
        let ids: Vec<String> = if classes.is_empty() {
            let sensitivity = if component.data_sensitivity.is_specified() {
                component.data_sensitivity
            } else {
                DataSensitivity::Internal
            };
            vec![self.ensure_sensitivity_asset(sensitivity)]
        } else {
            classes
                .into_iter()
                .map(|class| self.ensure_class_asset(class))
                .collect()
        };
        self.component_data
            .insert(component.id.clone(), ids.clone());
        ids
    }

    fn ensure_class_asset(&mut self, class: &DataClass) -> String {
        let key = format!("data-{}", class.name);
        if let Some(id) = self.data_ids.get(&key) {
            return id.clone();
        }
        let id = self.claim(&key);
        self.data_ids.insert(key, id.clone());
        let asset = self.data_asset(
            &id,
            class.name,
            class.description,
            class.sensitivity,
        );
        self.cache.data_assets.insert(id.clone());
        self.document.data_assets.push(asset);
        id
    }

    fn ensure_sensitivity_asset(&mut self, sensitivity: DataSensitivity) -> String {
        let key = format!("data-{}", sensitivity.as_str());
        if let Some(id) = self.data_ids.get(&key) {
            return id.clone();
        }
        let id = self.claim(&key);
        self.data_ids.insert(key, id.clone());
        let description = format!("Data handled at {} sensitivity", sensitivity.as_str());
        let asset = self.data_asset(&id, sensitivity.as_str(), &description, sensitivity);
        self.cache.data_assets.insert(id.clone());
        self.document.data_assets.push(asset);
        id
    }

    fn data_asset(
        &self,
        id: &str,
        classification: &str,
        description: &str,
        sensitivity: DataSensitivity,
    ) -> DataAsset {
        let levels = &self.config.security_levels;
        DataAsset {
            id: id.to_string(),
            name: format!("{}-data", classification),
            description: description.to_string(),
            usage: "business".to_string(),
            owner: self.owner.clone(),
            confidentiality: levels.confidentiality(sensitivity_level(sensitivity)),
            integrity: levels.integrity(integrity_for(sensitivity)),
            availability: levels.availability(availability_for(sensitivity)),
            justification_cia_rating: format!(
                "Classified as {} data",
                classification
            ),
            data_classification: classification.to_string(),
            tags: vec![classification.to_string()],
        }
    }

    /// One logical boundary per composite, one default network boundary.
    fn map_boundaries(&mut self, components: &[Component]) {
        let mut nested = Vec::new();
        let mut default = TrustBoundary {
            id: self.default_boundary.clone(),
            name: "default-network".to_string(),
            description: "Network boundary for components outside any composite".to_string(),
            boundary_type: "network".to_string(),
            ..Default::default()
        };

        for component in components {
            let mut assets = vec![self.asset_id_for(&component.id)];
            let mut data = self.data_ids_for(&component.id);
            if component.is_composite {
                for member in component.member_ids() {
                    assets.push(self.asset_id_for(member));
                    for id in self.data_ids_for(member) {
                        if !data.contains(&id) {
                            data.push(id);
                        }
                    }
                }
                let id = self.boundary_for(component);
                self.cache.trust_boundaries.insert(id.clone());
                self.document.trust_boundaries.push(TrustBoundary {
                    id: id.clone(),
                    name: format!("{}-boundary", name_or(&component.name, "composite")),
                    description: format!("Logical boundary around {}", component.name),
                    boundary_type: "logical".to_string(),
                    components: vec![component.id.clone()],
                    technical_assets: assets,
                    data_assets: data,
                    trust_boundaries_nested: Vec::new(),
                });
                nested.push(id);
            } else {
                default.components.push(component.id.clone());
                default.technical_assets.extend(assets);
                for id in data {
                    if !default.data_assets.contains(&id) {
                        default.data_assets.push(id);
                    }
                }
            }
        }

        default.trust_boundaries_nested = nested;
        self.cache.trust_boundaries.insert(default.id.clone());
        self.document.trust_boundaries.push(default);
    }

    fn asset_id_for(&self, component_id: &str) -> String {
        self.asset_ids
            .get(component_id)
            .cloned()
            .unwrap_or_else(|| asset_id(component_id))
    }

    fn data_ids_for(&self, component_id: &str) -> Vec<String> {
        self.component_data
            .get(component_id)
            .cloned()
            .unwrap_or_default()
    }

    fn map_relations(&mut self, components: &[Component], flows: &[Flow]) {
        let names: BTreeMap<&str, &str> = components
            .iter()
            .map(|c| (c.id.as_str(), c.name.as_str()))
            .collect();

        for flow in flows {
            let source_name = names
                .get(flow.source_id.as_str())
                .copied()
                .unwrap_or(flow.source_id.as_str());
            let target_name = names
                .get(flow.target_id.as_str())
                .copied()
                .unwrap_or(flow.target_id.as_str());
            let name = if flow.label.trim().is_empty() {
                name_or(&format!("{} to {}", source_name, target_name), "relation")
            } else {
                name_or(&flow.label, "relation")
            };

            let mut data_assets = self.data_ids_for(&flow.source_id);
            for id in self.data_ids_for(&flow.target_id) {
                if !data_assets.contains(&id) {
                    data_assets.push(id);
                }
            }

            let internal_type = if flow.bidirectional {
                "communication"
            } else {
                "data-flow"
            };
            let security = flow.security_context;

            self.cache.relations.insert(flow.id.clone());
            self.document.relations.push(Relation {
                id: flow.id.clone(),
                name,
                description: format!(
                    "{} flow from {} to {}",
                    flow.protocol, source_name, target_name
                ),
                relation_type: self.config.relation_type(internal_type),
                source: flow.source_id.clone(),
                target: flow.target_id.clone(),
                protocol: self.config.protocol(flow.protocol.as_str()),
                authentication: security.authentication.as_str().to_string(),
                authorization: security.authorization.as_str().to_string(),
                encryption: if security.encryption {
                    "transparent".to_string()
                } else {
                    "none".to_string()
                },
                bidirectional: flow.bidirectional,
                data_assets,
                tags: flow.conditions.clone(),
            });
        }
    }

    fn map_threats(&mut self, threats: &[Threat]) {
        for threat in threats {
            let description = if threat.description.is_empty() {
                format!("{} threat: {}", threat.threat_type, threat.name)
            } else {
                threat.description.clone()
            };
            let id = self.claim(&threat.id);
            self.document.threats.push(MappedThreat {
                id,
                name: threat.name.clone(),
                threat_type: threat.threat_type.as_str().to_string(),
                description,
                risk_score: threat.risk_score,
                priority: threat.priority.as_str().to_string(),
                is_composite: threat.is_composite,
                affected_components: threat.affected_component_ids.iter().cloned().collect(),
                affected_relations: threat.affected_flow_ids.iter().cloned().collect(),
                base_threat_types: threat
                    .base_threat_types
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect(),
                owasp_category: threat.owasp_category.clone(),
                cwe: threat.cwe.clone(),
                mitigations: threat.mitigations.clone(),
            });
        }
    }

    /// Append caller-supplied assets with defaults for missing fields.
    fn append_existing(&mut self, existing: &ExistingAssets) {
        let config = self.config;
        let levels = &config.security_levels;

        for (index, raw) in existing.data_assets.iter().enumerate() {
            let id = self.existing_id(raw.id.as_deref(), "data-existing", index);
            let name = raw.name.clone().unwrap_or_else(|| id.clone());
            let classification = raw
                .data_classification
                .clone()
                .unwrap_or_else(|| "unclassified".to_string());
            self.cache.data_assets.insert(id.clone());
            self.document.data_assets.push(DataAsset {
                id,
                description: raw
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("Pre-existing data asset {}", name)),
                name,
                usage: raw.usage.clone().unwrap_or_else(|| "business".to_string()),
                owner: raw.owner.clone().unwrap_or_else(|| self.owner.clone()),
                confidentiality: levels.confidentiality(raw.confidentiality.as_deref()),
                integrity: levels.integrity(raw.integrity.as_deref()),
                availability: levels.availability(raw.availability.as_deref()),
                justification_cia_rating: "Supplied with the diagram".to_string(),
                data_classification: classification,
                tags: raw.tags.clone().unwrap_or_default(),
            });
        }

        for (index, raw) in existing.technical_assets.iter().enumerate() {
            let id = self.existing_id(raw.id.as_deref(), "asset-existing", index);
            let name = raw.name.clone().unwrap_or_else(|| id.clone());
            self.cache.technical_assets.insert(id.clone());
            self.document.technical_assets.push(TechnicalAsset {
                id,
                description: raw
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("Pre-existing technical asset {}", name)),
                name,
                asset_type: raw.asset_type.clone().unwrap_or_else(|| "process".to_string()),
                technology: raw
                    .technology
                    .clone()
                    .unwrap_or_else(|| config.default_component_type.clone()),
                usage: raw.usage.clone().unwrap_or_else(|| "business".to_string()),
                owner: raw.owner.clone().unwrap_or_else(|| self.owner.clone()),
                confidentiality: levels.confidentiality(raw.confidentiality.as_deref()),
                integrity: levels.integrity(raw.integrity.as_deref()),
                availability: levels.availability(raw.availability.as_deref()),
                justification_cia_rating: "Supplied with the diagram".to_string(),
                internet: raw.internet.unwrap_or(false),
                used_as_client_by_human: false,
                multi_tenant: false,
                redundant: false,
                custom_developed_parts: false,
                encryption: raw.encryption.clone().unwrap_or_else(|| "none".to_string()),
                authentication: raw
                    .authentication
                    .clone()
                    .unwrap_or_else(|| "none".to_string()),
                authorization: raw
                    .authorization
                    .clone()
                    .unwrap_or_else(|| "none".to_string()),
                data_assets_processed: raw.data_assets_processed.clone().unwrap_or_default(),
                data_assets_stored: raw.data_assets_stored.clone().unwrap_or_default(),
                tags: raw.tags.clone().unwrap_or_default(),
            });
        }

        for (index, raw) in existing.trust_boundaries.iter().enumerate() {
            let id = self.existing_id(raw.id.as_deref(), "boundary-existing", index);
            let name = raw.name.clone().unwrap_or_else(|| id.clone());
            self.cache.trust_boundaries.insert(id.clone());
            self.document.trust_boundaries.push(TrustBoundary {
                id,
                description: raw
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("Pre-existing trust boundary {}", name)),
                name,
                boundary_type: raw
                    .boundary_type
                    .clone()
                    .unwrap_or_else(|| "network".to_string()),
                components: raw.components.clone().unwrap_or_default(),
                technical_assets: raw.technical_assets.clone().unwrap_or_default(),
                data_assets: raw.data_assets.clone().unwrap_or_default(),
                trust_boundaries_nested: raw.trust_boundaries_nested.clone().unwrap_or_default(),
            });
        }
    }

    fn existing_id(&mut self, id: Option<&str>, prefix: &str, index: usize) -> String {
        match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let generated = self.claim(&format!("{}-{}", prefix, index + 1));
                let message = format!("Pre-existing entry without id, assigned '{}'", generated);
                warn!("{}", message);
                self.warnings.push(message);
                generated
            }
        }
    }

    fn unresolved(&mut self, owner: &str, kind: &str, id: &str) {
        let message = format!("{}: unresolved reference to {} '{}'", owner, kind, id);
        warn!("{}", message);
        self.errors.push(message);
    }

    fn check_references(&mut self) {
        let cache = std::mem::take(&mut self.cache);
        let document = std::mem::take(&mut self.document);

        for c in &document.components {
            let owner = format!("Component '{}'", c.id);
            for id in c.technical_assets.iter().filter(|id| !cache.technical_assets.contains(*id)) {
                self.unresolved(&owner, "technical asset", id);
            }
            for id in c.data_assets.iter().filter(|id| !cache.data_assets.contains(*id)) {
                self.unresolved(&owner, "data asset", id);
            }
            for id in c.trust_boundaries.iter().filter(|id| !cache.trust_boundaries.contains(*id)) {
                self.unresolved(&owner, "trust boundary", id);
            }
        }

        for a in &document.technical_assets {
            let owner = format!("Technical asset '{}'", a.id);
            for id in a
                .data_assets_processed
                .iter()
                .chain(&a.data_assets_stored)
                .filter(|id| !cache.data_assets.contains(*id))
            {
                self.unresolved(&owner, "data asset", id);
            }
        }

        for b in &document.trust_boundaries {
            let owner = format!("Trust boundary '{}'", b.id);
            for id in b.components.iter().filter(|id| !cache.components.contains(*id)) {
                self.unresolved(&owner, "component", id);
            }
            for id in b.technical_assets.iter().filter(|id| !cache.technical_assets.contains(*id)) {
                self.unresolved(&owner, "technical asset", id);
            }
            for id in b.data_assets.iter().filter(|id| !cache.data_assets.contains(*id)) {
                self.unresolved(&owner, "data asset", id);
            }
            for id in b
                .trust_boundaries_nested
                .iter()
                .filter(|id| !cache.trust_boundaries.contains(*id))
            {
                self.unresolved(&owner, "trust boundary", id);
            }
        }

        for r in &document.relations {
            let owner = format!("Relation '{}'", r.id);
            if !cache.has_endpoint(&r.source) {
                self.unresolved(&owner, "source", &r.source);
            }
            if !cache.has_endpoint(&r.target) {
                self.unresolved(&owner, "target", &r.target);
            }
            for id in r.data_assets.iter().filter(|id| !cache.data_assets.contains(*id)) {
                self.unresolved(&owner, "data asset", id);
            }
        }

        for t in &document.threats {
            let owner = format!("Threat '{}'", t.id);
            for id in t.affected_components.iter().filter(|id| !cache.components.contains(*id)) {
                self.unresolved(&owner, "component", id);
            }
            for id in t.affected_relations.iter().filter(|id| !cache.relations.contains(*id)) {
                self.unresolved(&owner, "relation", id);
            }
        }

        self.cache = cache;
        self.document = document;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowSecurity, Protocol, Requirement, SecurityContext, ThreatType};

    fn metadata() -> DocumentMetadata {
        DocumentMetadata::from_config(&MappingConfig::default(), "2024-05-01")
    }

    fn component(id: &str, name: &str, t: ComponentType, sensitivity: DataSensitivity) -> Component {
        Component::new(id, name, t).with_security(SecurityContext::new(
            Requirement::Required,
            Requirement::NotRequired,
            sensitivity,
        ))
    }

    fn flow(id: &str, source: &str, target: &str) -> Flow {
        Flow {
            id: id.into(),
            label: String::new(),
            source_id: source.into(),
            target_id: target.into(),
            protocol: Protocol::Tcp,
            bidirectional: false,
            conditional: false,
            conditions: Vec::new(),
            security_context: FlowSecurity {
                encryption: false,
                authentication: Requirement::Required,
                authorization: Requirement::NotRequired,
            },
        }
    }

    fn map(components: &[Component], flows: &[Flow], threats: &[Threat]) -> MappingResult {
        let metadata = metadata();
        let graph = InternalGraph {
            metadata: &metadata,
            components,
            flows,
            threats,
        };
        ThreagileMapper::new(&MappingConfig::default()).map(&graph, &ExistingAssets::default())
    }

    #[test]
    fn test_web_and_database_mapping() {
        let components = vec![
            component("2", "Web App", ComponentType::WebApplication, DataSensitivity::Internal),
            component("3", "Database", ComponentType::Database, DataSensitivity::Confidential),
        ];
        let result = map(&components, &[flow("4", "2", "3")], &[]);
        assert!(result.success, "{:?}", result.errors);
        let doc = &result.document;

        assert_eq!(doc.title, "Threat Model");
        assert_eq!(doc.date, "2024-05-01");
        assert_eq!(doc.components[0].name, "web-app");
        assert_eq!(doc.components[0].component_type, "web-application");
        assert_eq!(doc.components[0].technical_assets, vec!["asset-2"]);
        assert_eq!(doc.components[0].trust_boundaries, vec![DEFAULT_BOUNDARY_ID]);

        let db_asset = &doc.technical_assets[1];
        assert_eq!(db_asset.id, "asset-3");
        assert_eq!(db_asset.asset_type, "datastore");
        assert_eq!(db_asset.confidentiality, "confidential");
        assert_eq!(db_asset.integrity, "critical");
        assert_eq!(db_asset.availability, "important");
        assert_eq!(db_asset.data_assets_stored, db_asset.data_assets_processed);

        let relation = &doc.relations[0];
        assert_eq!(relation.relation_type, "data-flow");
        assert_eq!(relation.protocol, "tcp");
        assert_eq!(relation.name, "web-app-to-database");
        assert_eq!(relation.authentication, "required");
        assert_eq!(relation.encryption, "none");

        assert_eq!(doc.trust_boundaries.len(), 1);
        assert_eq!(doc.trust_boundaries[0].components, vec!["2", "3"]);
    }

    #[test]
    fn test_data_assets_deduplicated_by_class() {
        let components = vec![
            component("a", "User Profile", ComponentType::Api, DataSensitivity::Internal),
            component("b", "User Accounts DB", ComponentType::Database, DataSensitivity::Internal),
            component("c", "Worker", ComponentType::Process, DataSensitivity::Unspecified),
        ];
        let result = map(&components, &[], &[]);
        let ids: Vec<_> = result.document.data_assets.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["data-user", "data-internal"]);
        let user = &result.document.data_assets[0];
        assert_eq!(user.name, "user-data");
        assert_eq!(user.confidentiality, "confidential");
        assert_eq!(result.document.components[2].data_assets, vec!["data-internal"]);
    }

    #[test]
    fn test_composite_gets_logical_boundary() {
        let mut svc = component("svc", "Order Service", ComponentType::Microservice, DataSensitivity::Confidential);
        svc.is_composite = true;
        svc.subcomponents = vec![
            component("api", "Orders API", ComponentType::Api, DataSensitivity::Internal),
            component("db", "Orders DB", ComponentType::Database, DataSensitivity::Confidential),
        ];
        let components = vec![
            svc,
            component("web", "Shop", ComponentType::WebApplication, DataSensitivity::Public),
        ];
        let result = map(&components, &[flow("e1", "web", "svc")], &[]);
        assert!(result.success, "{:?}", result.errors);
        let doc = &result.document;

        assert_eq!(doc.components.len(), 2);
        assert_eq!(doc.components[0].technical_assets, vec!["asset-svc", "asset-api", "asset-db"]);
        assert_eq!(doc.components[0].trust_boundaries, vec!["boundary-svc"]);

        let logical = &doc.trust_boundaries[0];
        assert_eq!(logical.boundary_type, "logical");
        assert_eq!(logical.name, "order-service-boundary");
        assert_eq!(logical.technical_assets.len(), 3);

        let default = &doc.trust_boundaries[1];
        assert_eq!(default.id, DEFAULT_BOUNDARY_ID);
        assert_eq!(default.components, vec!["web"]);
        assert_eq!(default.trust_boundaries_nested, vec!["boundary-svc"]);
    }

    fn document_ids(doc: &ThreagileDocument) -> Vec<&str> {
        doc.components
            .iter()
            .map(|c| c.id.as_str())
            .chain(doc.technical_assets.iter().map(|a| a.id.as_str()))
            .chain(doc.data_assets.iter().map(|d| d.id.as_str()))
            .chain(doc.trust_boundaries.iter().map(|b| b.id.as_str()))
            .chain(doc.relations.iter().map(|r| r.id.as_str()))
            .chain(doc.threats.iter().map(|t| t.id.as_str()))
            .collect()
    }

    fn assert_unique_ids(doc: &ThreagileDocument) {
        let ids = document_ids(doc);
        let unique: BTreeSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate ids in {:?}", ids);

        let value = doc.to_value().unwrap();
        let validator = crate::threagile::validator::OutputValidator::new(
            &crate::config::ValidationRules::default(),
        )
        .unwrap();
        let report = validator.validate_value(&value);
        assert!(
            !report.errors.iter().any(|e| e.starts_with("duplicate id")),
            "{:?}",
            report.errors
        );
    }

    #[test]
    fn test_composite_named_default_keeps_boundaries_distinct() {
        let mut default = component("default", "Order Service", ComponentType::Microservice, DataSensitivity::Internal);
        default.is_composite = true;
        default.subcomponents = vec![
            component("api", "Orders API", ComponentType::Api, DataSensitivity::Internal),
            component("db", "Orders DB", ComponentType::Database, DataSensitivity::Internal),
        ];
        let components = vec![
            default,
            component("web", "Shop", ComponentType::WebApplication, DataSensitivity::Public),
        ];
        let result = map(&components, &[flow("e1", "web", "default")], &[]);
        assert!(result.success, "{:?}", result.errors);
        let doc = &result.document;

        let ids: Vec<&str> = doc.trust_boundaries.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["boundary-default-2", DEFAULT_BOUNDARY_ID]);
        assert_eq!(doc.components[0].trust_boundaries, vec!["boundary-default-2"]);
        assert_eq!(doc.components[1].trust_boundaries, vec![DEFAULT_BOUNDARY_ID]);

        let outer = &doc.trust_boundaries[1];
        assert_eq!(outer.components, vec!["web"]);
        assert_eq!(outer.trust_boundaries_nested, vec!["boundary-default-2"]);
        assert_unique_ids(doc);
    }

    #[test]
    fn test_generated_ids_skip_cell_ids() {
        let components = vec![
            component("2", "Web App", ComponentType::WebApplication, DataSensitivity::Internal),
            component("asset-2", "Database", ComponentType::Database, DataSensitivity::Confidential),
            component("data-internal", "Worker", ComponentType::Process, DataSensitivity::Internal),
        ];
        let threat = Threat::new("2", "Injection", ThreatType::Injection)
            .with_components(["2"])
            .with_risk_score(0.5);
        let result = map(&components, &[flow("4", "2", "asset-2")], &[threat]);
        assert!(result.success, "{:?}", result.errors);
        let doc = &result.document;

        assert_eq!(doc.components[0].technical_assets, vec!["asset-2-2"]);
        assert_eq!(doc.components[1].technical_assets, vec!["asset-asset-2"]);
        assert_eq!(doc.components[0].data_assets, vec!["data-internal-2"]);
        assert_eq!(doc.components[2].data_assets, vec!["data-internal-2"]);
        assert_eq!(doc.threats[0].id, "2-2");
        assert!(doc.trust_boundaries[0].technical_assets.contains(&"asset-2-2".to_string()));
        assert_unique_ids(doc);
    }

    #[test]
    fn test_generated_existing_id_skips_taken_id() {
        let metadata = metadata();
        let components = vec![component("data-existing-1", "Worker", ComponentType::Process, DataSensitivity::Internal)];
        let graph = InternalGraph {
            metadata: &metadata,
            components: &components,
            flows: &[],
            threats: &[],
        };
        let existing = ExistingAssets {
            data_assets: vec![RawDataAsset {
                name: Some("payroll".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let result = ThreagileMapper::new(&MappingConfig::default()).map(&graph, &existing);
        let payroll = result.document.data_assets.iter().find(|d| d.name == "payroll").unwrap();
        assert_eq!(payroll.id, "data-existing-1-2");
        assert_unique_ids(&result.document);
    }

    #[test]
    fn test_bidirectional_flow_is_communication() {
        let components = vec![
            component("a", "Client", ComponentType::WebApplication, DataSensitivity::Public),
            component("b", "Server", ComponentType::Api, DataSensitivity::Internal),
        ];
        let mut f = flow("e", "a", "b");
        f.bidirectional = true;
        f.label = "Sync calls".into();
        f.conditions = vec!["retry".into()];
        let result = map(&components, &[f], &[]);
        let relation = &result.document.relations[0];
        assert_eq!(relation.relation_type, "communication");
        assert_eq!(relation.name, "sync-calls");
        assert_eq!(relation.tags, vec!["retry"]);
    }

    #[test]
    fn test_unresolved_threat_reference_is_error_and_kept() {
        let components = vec![component("a", "Api", ComponentType::Api, DataSensitivity::Internal)];
        let threat = Threat::new("threat-x", "Injection", ThreatType::Injection)
            .with_components(["a", "ghost"])
            .with_risk_score(0.5);
        let result = map(&components, &[], &[threat]);
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("unresolved reference"));
        assert!(result.errors[0].contains("ghost"));
        assert_eq!(result.document.threats.len(), 1);
        assert_eq!(result.document.threats[0].priority, "medium");
    }

    #[test]
    fn test_existing_assets_appended_with_defaults() {
        let metadata = metadata();
        let graph = InternalGraph {
            metadata: &metadata,
            components: &[],
            flows: &[],
            threats: &[],
        };
        let existing = ExistingAssets {
            technical_assets: vec![RawTechnicalAsset {
                id: Some("legacy-erp".into()),
                name: Some("Legacy ERP".into()),
                confidentiality: Some("Restricted".into()),
                data_assets_processed: Some(vec!["payroll".into()]),
                ..Default::default()
            }],
            data_assets: vec![RawDataAsset {
                name: Some("payroll".into()),
                ..Default::default()
            }],
            trust_boundaries: vec![RawTrustBoundary {
                id: Some("dmz".into()),
                technical_assets: Some(vec!["legacy-erp".into()]),
                ..Default::default()
            }],
        };
        let result = ThreagileMapper::new(&MappingConfig::default()).map(&graph, &existing);
        let doc = &result.document;

        let erp = doc.technical_assets.iter().find(|a| a.id == "legacy-erp").unwrap();
        assert_eq!(erp.name, "Legacy ERP");
        assert_eq!(erp.confidentiality, "restricted");
        assert_eq!(erp.integrity, "operational");
        assert_eq!(erp.owner, "threatdraw");

        let payroll = doc.data_assets.iter().find(|d| d.name == "payroll").unwrap();
        assert_eq!(payroll.id, "data-existing-1");
        assert_eq!(payroll.confidentiality, "internal");
        assert_eq!(result.warnings.len(), 1);

        // 'payroll' is a name, not an id
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Technical asset 'legacy-erp'"));

        let dmz = doc.trust_boundaries.iter().find(|b| b.id == "dmz").unwrap();
        assert_eq!(dmz.boundary_type, "network");
    }

    #[test]
    fn test_unnamed_label_gets_fallback_name() {
        let components = vec![component("9", "!!!", ComponentType::Process, DataSensitivity::Internal)];
        let result = map(&components, &[], &[]);
        assert_eq!(result.document.components[0].name, "unnamed-component");
        assert_eq!(result.document.components[0].component_type, "service");
    }
}
