//! End-to-end diagram scenarios
//!
//! Tests cover:
//! - A two-tier web shop with an encrypted flow
//! - Threat shapes next to the components they endanger
//! - Microservice composites and their trust boundaries
//! - Cell ids shaped like generated ids
//! - Existing assets merged into the generated document

use threatdraw::config::Config;
use threatdraw::model::{Cell, ComponentType, Protocol, ThreatType};
use threatdraw::pipeline::{Pipeline, PipelineOutput};
use threatdraw::threagile::mapper::{RawDataAsset, RawTechnicalAsset};
use threatdraw::threagile::{DocumentMetadata, ExistingAssets};

fn metadata() -> DocumentMetadata {
    DocumentMetadata::from_config(&Config::default().mapping, "2024-05-01")
}

fn run(cells: &[Cell]) -> PipelineOutput {
    Pipeline::new(Config::default())
        .unwrap()
        .run("scenario", cells, &metadata())
        .unwrap()
}

fn layers() -> Vec<Cell> {
    vec![Cell::vertex("0", "", ""), Cell::vertex("1", "", "").with_parent("0")]
}

// ============================================================================
// Two-tier shop
// ============================================================================

mod web_shop_tests {
    use super::*;

    fn shop() -> Vec<Cell> {
        let mut cells = layers();
        cells.extend([
            Cell::vertex("2", "Web App", "rounded=1").with_parent("1"),
            Cell::vertex("3", "Database", "shape=cylinder;data_sensitivity=restricted")
                .with_parent("1"),
            Cell::connector("4", "HTTPS", "2", "3").with_parent("1"),
        ]);
        cells
    }

    #[test]
    fn test_components_classified() {
        let out = run(&shop());
        let types: Vec<_> = out.components.iter().map(|c| c.component_type).collect();
        assert_eq!(
            types,
            vec![ComponentType::WebApplication, ComponentType::Database]
        );
    }

    #[test]
    fn test_flow_is_encrypted_https() {
        let out = run(&shop());
        assert_eq!(out.flows.len(), 1);
        assert_eq!(out.flows[0].protocol, Protocol::Https);
        assert!(out.flows[0].security_context.encryption);

        let relation = &out.document.relations[0];
        assert_eq!(relation.id, "4");
        assert_eq!(relation.source, "2");
        assert_eq!(relation.target, "3");
        assert_eq!(relation.encryption, "transparent");
        assert!(!relation.data_assets.is_empty());
    }

    #[test]
    fn test_restricted_database_becomes_stored_asset() {
        let out = run(&shop());
        let asset = out
            .document
            .technical_assets
            .iter()
            .find(|a| a.id == "asset-3")
            .unwrap();
        assert_eq!(asset.asset_type, "datastore");
        assert_eq!(asset.encryption, "transparent");
        assert!(!asset.data_assets_stored.is_empty());
    }

    #[test]
    fn test_default_boundary_holds_everything() {
        let out = run(&shop());
        let boundary = out
            .document
            .trust_boundaries
            .iter()
            .find(|b| b.id == "boundary-default")
            .unwrap();
        assert_eq!(boundary.components, vec!["2".to_string(), "3".to_string()]);
        assert!(boundary.trust_boundaries_nested.is_empty());
    }

    #[test]
    fn test_document_is_valid() {
        let out = run(&shop());
        assert!(out.is_valid(), "{:?}", out.validation.errors);
        assert_eq!(out.document.date, "2024-05-01");
        assert_eq!(out.document.title, "Threat Model");
    }
}

// ============================================================================
// Threats
// ============================================================================

mod threat_tests {
    use super::*;

    #[test]
    fn test_sql_injection_mapped_into_document() {
        let mut cells = layers();
        cells.extend([
            Cell::vertex("2", "API Gateway", "").with_parent("1"),
            Cell::vertex("3", "SQL Injection", "").with_parent("1"),
            Cell::connector("4", "", "2", "3").with_parent("1"),
        ]);
        let out = run(&cells);

        let threat = out
            .threats
            .iter()
            .find(|t| t.threat_type == ThreatType::Injection)
            .unwrap();
        assert!(threat.affected_flow_ids.contains("4"));

        let mapped = out
            .document
            .threats
            .iter()
            .find(|t| t.id == threat.id)
            .unwrap();
        assert_eq!(mapped.threat_type, "injection");
        assert_eq!(mapped.priority, threat.priority.as_str());
        assert_eq!(mapped.cwe.as_deref(), Some("CWE-89"));
    }

    #[test]
    fn test_threats_sorted_by_priority() {
        let mut cells = layers();
        cells.extend([
            Cell::vertex("2", "Customer API", "").with_parent("1"),
            Cell::vertex("t1", "Session hijacking", "").with_parent("1"),
            Cell::vertex("t2", "Privilege escalation via roles", "").with_parent("1"),
            Cell::vertex("t3", "DDoS flood", "").with_parent("1"),
        ]);
        let out = run(&cells);
        assert!(out.threats.len() >= 3);
        for pair in out.threats.windows(2) {
            assert!(pair[0].priority.rank() <= pair[1].priority.rank());
        }
    }

    #[test]
    fn test_plain_diagram_has_no_threats() {
        let mut cells = layers();
        cells.push(Cell::vertex("2", "Web App", "").with_parent("1"));
        let out = run(&cells);
        assert!(out.threats.is_empty());
        assert!(out.document.threats.is_empty());
    }
}

// ============================================================================
// Composites
// ============================================================================

mod composite_tests {
    use super::*;

    fn order_service() -> Vec<Cell> {
        let mut cells = layers();
        cells.extend([
            Cell::vertex("svc", "Order Service", "").with_parent("1"),
            Cell::vertex("api", "Orders API", "").with_parent("svc"),
            Cell::vertex("db", "Orders DB", "shape=cylinder").with_parent("svc"),
            Cell::vertex("cache", "Redis Cache", "").with_parent("svc"),
            Cell::vertex("web", "Web App", "rounded=1").with_parent("1"),
            Cell::connector("e1", "HTTPS", "web", "api").with_parent("1"),
        ]);
        cells
    }

    #[test]
    fn test_members_folded_into_composite() {
        let out = run(&order_service());
        assert_eq!(out.stats.composites, 1);
        let composite = out.components.iter().find(|c| c.id == "svc").unwrap();
        assert!(composite.is_composite);
        assert_eq!(composite.component_type, ComponentType::Microservice);
        assert_eq!(composite.subcomponents.len(), 3);
        assert!(!out.components.iter().any(|c| c.id == "api"));
    }

    #[test]
    fn test_flow_endpoint_resolves_through_composite() {
        let out = run(&order_service());
        assert_eq!(out.flows.len(), 1);
        assert_eq!(out.flows[0].target_id, "svc");
    }

    #[test]
    fn test_composite_gets_nested_boundary() {
        let out = run(&order_service());
        let doc = &out.document;
        let boundary = doc
            .trust_boundaries
            .iter()
            .find(|b| b.id == "boundary-svc")
            .unwrap();
        assert!(boundary.technical_assets.contains(&"asset-api".to_string()));

        let default = doc
            .trust_boundaries
            .iter()
            .find(|b| b.id == "boundary-default")
            .unwrap();
        assert_eq!(default.trust_boundaries_nested, vec!["boundary-svc".to_string()]);
        assert!(out.validation.is_valid, "{:?}", out.validation.errors);
    }

    #[test]
    fn test_composite_with_id_default() {
        let cells: Vec<Cell> = order_service()
            .into_iter()
            .map(|mut cell| {
                if cell.id == "svc" {
                    cell.id = "default".into();
                }
                if cell.parent.as_deref() == Some("svc") {
                    cell.parent = Some("default".into());
                }
                cell
            })
            .collect();
        let out = run(&cells);
        let ids: Vec<&str> = out
            .document
            .trust_boundaries
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids, vec!["boundary-default-2", "boundary-default"]);
        assert!(out.validation.is_valid, "{:?}", out.validation.errors);
    }
}

// ============================================================================
// Existing assets
// ============================================================================

mod id_collision_tests {
    use super::*;

    #[test]
    fn test_cell_id_shaped_like_generated_asset_id() {
        let mut cells = layers();
        cells.extend([
            Cell::vertex("2", "Web App", "rounded=1").with_parent("1"),
            Cell::vertex("asset-2", "Database", "shape=cylinder").with_parent("1"),
            Cell::connector("4", "HTTPS", "2", "asset-2").with_parent("1"),
        ]);
        let out = run(&cells);
        let assets: Vec<&str> = out
            .document
            .technical_assets
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(assets, vec!["asset-2-2", "asset-asset-2"]);
        assert!(out.validation.is_valid, "{:?}", out.validation.errors);
    }
}

// ============================================================================
// Existing assets
// ============================================================================

mod existing_asset_tests {
    use super::*;

    #[test]
    fn test_existing_assets_appended() {
        let existing = ExistingAssets {
            technical_assets: vec![RawTechnicalAsset {
                id: Some("asset-legacy-erp".into()),
                name: Some("legacy-erp".into()),
                ..Default::default()
            }],
            data_assets: vec![RawDataAsset {
                name: Some("invoices".into()),
                ..Default::default()
            }],
            trust_boundaries: vec![],
        };
        let pipeline = Pipeline::new(Config::default())
            .unwrap()
            .with_existing_assets(existing);
        let mut cells = layers();
        cells.push(Cell::vertex("2", "Web App", "").with_parent("1"));
        let out = pipeline.run("erp", &cells, &metadata()).unwrap();

        let doc = &out.document;
        assert!(doc.technical_assets.iter().any(|a| a.id == "asset-legacy-erp"));
        assert!(doc.data_assets.iter().any(|a| a.id.starts_with("data-existing-")));
        assert!(out.warnings().any(|w| w.contains("data-existing-")));
    }
}
