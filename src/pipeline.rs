//! Pipeline orchestration
//!
//! Runs the six stages in order over one diagram's cells:
//! components → composites → flows → threats → mapping → validation.
//! Each stage sees the corrected output of the previous one and contributes
//! its own diagnostics to a [`StageReport`]. Diagrams are independent, so a
//! batch fans out over the blocking pool and one malformed file fails alone.

use crate::config::Config;
use crate::detection::{
    CompositeComponentManager, ComponentDetector, FlowDetector, StageOutput, ThreatDetector,
};
use crate::errors::{InputError, Result, ThreatdrawError};
use crate::model::{Cell, Component, Diagnostics, Flow, Threat};
use crate::observability::telemetry::{record_stage_outcome, stage_span};
use crate::threagile::{
    DocumentMetadata, ExistingAssets, InternalGraph, OutputValidator, ThreagileDocument,
    ThreagileMapper, ValidationReport,
};
use anyhow::Context;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Input
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum CellSource {
    List(Vec<Cell>),
    Wrapped { cells: Vec<Cell> },
}

/// Parse cells from JSON or YAML: a bare list or an object with `cells`.
pub fn parse_cells(content: &str, path: &Path) -> std::result::Result<Vec<Cell>, InputError> {
    // YAML is a superset of JSON for this shape
    let source: CellSource = serde_yaml::from_str(content).map_err(|e| InputError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(match source {
        CellSource::List(cells) | CellSource::Wrapped { cells } => cells,
    })
}

pub fn load_cells(path: &Path) -> Result<Vec<Cell>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read diagram cells from {}", path.display()))?;
    Ok(parse_cells(&content, path)?)
}

/// Structural checks that make a diagram unusable: empty or duplicate ids
/// and shape cells carrying connector endpoints.
pub fn validate_cells(cells: &[Cell]) -> std::result::Result<(), InputError> {
    let mut seen = BTreeSet::new();
    for (index, cell) in cells.iter().enumerate() {
        if cell.id.trim().is_empty() {
            return Err(InputError::EmptyId { index });
        }
        if !seen.insert(cell.id.as_str()) {
            return Err(InputError::DuplicateId {
                id: cell.id.clone(),
            });
        }
        if !cell.edge && (cell.source.is_some() || cell.target.is_some()) {
            return Err(InputError::UnexpectedEndpoints {
                id: cell.id.clone(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

/// Diagnostics of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub items: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl StageReport {
    fn new(stage: &str, items: usize, diagnostics: Diagnostics) -> Self {
        Self {
            stage: stage.to_string(),
            items,
            warnings: diagnostics.warnings,
            errors: diagnostics.errors,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub components: usize,
    pub composites: usize,
    pub flows: usize,
    pub threats: usize,
    pub technical_assets: usize,
    pub data_assets: usize,
    pub trust_boundaries: usize,
    pub relations: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl ConversionStats {
    /// Sum of two runs, used for batch totals.
    pub fn add(&mut self, other: &ConversionStats) {
        self.components += other.components;
        self.composites += other.composites;
        self.flows += other.flows;
        self.threats += other.threats;
        self.technical_assets += other.technical_assets;
        self.data_assets += other.data_assets;
        self.trust_boundaries += other.trust_boundaries;
        self.relations += other.relations;
        self.warnings += other.warnings;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub document: ThreagileDocument,
    /// Final merged component list
    pub components: Vec<Component>,
    pub flows: Vec<Flow>,
    pub threats: Vec<Threat>,
    pub stages: Vec<StageReport>,
    pub validation: ValidationReport,
    pub stats: ConversionStats,
}

impl PipelineOutput {
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .flat_map(|s| s.warnings.iter().map(String::as_str))
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .flat_map(|s| s.errors.iter().map(String::as_str))
    }

    /// No stage reported an error and the document validated.
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid && self.errors().next().is_none()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    config: Config,
    existing: ExistingAssets,
    validator: OutputValidator,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let validator = OutputValidator::new(&config.validation)?;
        Ok(Self {
            config,
            existing: ExistingAssets::default(),
            validator,
        })
    }

    /// Assets appended to every document this pipeline produces.
    pub fn with_existing_assets(mut self, existing: ExistingAssets) -> Self {
        self.existing = existing;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Convert one diagram. Fails only on structurally invalid cells.
    pub fn run(
        &self,
        name: &str,
        cells: &[Cell],
        metadata: &DocumentMetadata,
    ) -> Result<PipelineOutput> {
        validate_cells(cells)?;
        let mut stages = Vec::with_capacity(6);

        let detected = run_stage("components", name, &mut stages, || {
            ComponentDetector::new(&self.config.detection).detect(cells)
        });

        let manager = CompositeComponentManager::new();
        let composites = run_stage("composites", name, &mut stages, || {
            manager.detect_composites(&detected)
        });
        let components = manager.merge(&detected, &composites);

        let flows = run_stage("flows", name, &mut stages, || {
            FlowDetector::new().detect(cells, &components)
        });

        let threats = run_stage("threats", name, &mut stages, || {
            ThreatDetector::new(&self.config.detection).detect(cells, &components, &flows)
        });

        let mapping = {
            let span = stage_span("mapping", name);
            let _guard = span.enter();
            let graph = InternalGraph {
                metadata,
                components: &components,
                flows: &flows,
                threats: &threats,
            };
            let result = ThreagileMapper::new(&self.config.mapping).map(&graph, &self.existing);
            record_stage_outcome(&span, result.warnings.len(), result.errors.len());
            result
        };
        stages.push(StageReport {
            stage: "mapping".to_string(),
            items: mapping.document.components.len(),
            warnings: mapping.warnings,
            errors: mapping.errors,
        });
        let document = mapping.document;

        let validation = {
            let span = stage_span("validation", name);
            let _guard = span.enter();
            let report = match document.to_value() {
                Ok(value) => self.validator.validate_post_conversion(&value),
                Err(e) => return Err(ThreatdrawError::Mapping(e)),
            };
            record_stage_outcome(&span, report.warnings.len(), report.errors.len());
            report
        };
        stages.push(StageReport {
            stage: "validation".to_string(),
            items: usize::from(validation.is_valid),
            warnings: validation.warnings.clone(),
            errors: validation.errors.clone(),
        });

        let mut stats = ConversionStats {
            components: components.len(),
            composites: composites.len(),
            flows: flows.len(),
            threats: threats.len(),
            technical_assets: document.technical_assets.len(),
            data_assets: document.data_assets.len(),
            trust_boundaries: document.trust_boundaries.len(),
            relations: document.relations.len(),
            ..Default::default()
        };
        for stage in &stages {
            stats.warnings += stage.warnings.len();
            stats.errors += stage.errors.len();
        }

        info!(
            diagram = %name,
            components = stats.components,
            flows = stats.flows,
            threats = stats.threats,
            valid = validation.is_valid,
            "Conversion complete"
        );

        Ok(PipelineOutput {
            document,
            components,
            flows,
            threats,
            stages,
            validation,
            stats,
        })
    }

    pub fn run_file(&self, path: &Path, metadata: &DocumentMetadata) -> Result<PipelineOutput> {
        let cells = load_cells(path)?;
        self.run(&path.display().to_string(), &cells, metadata)
    }
}

/// Run a detection stage inside its span and record its report.
fn run_stage<T>(
    stage: &str,
    diagram: &str,
    stages: &mut Vec<StageReport>,
    detect: impl FnOnce() -> StageOutput<T>,
) -> Vec<T> {
    let span = stage_span(stage, diagram);
    let _guard = span.enter();
    let output = detect();
    record_stage_outcome(
        &span,
        output.diagnostics.warnings.len(),
        output.diagnostics.errors.len(),
    );
    debug!(stage, items = output.len(), "Stage finished");
    stages.push(StageReport::new(stage, output.len(), output.diagnostics));
    output.items
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug)]
pub struct BatchResult {
    pub path: PathBuf,
    pub outcome: Result<PipelineOutput>,
}

/// Convert several diagram files in parallel on the blocking pool. Results
/// come back in input order.
pub async fn run_batch(
    pipeline: Arc<Pipeline>,
    paths: Vec<PathBuf>,
    metadata: DocumentMetadata,
) -> Vec<BatchResult> {
    let metadata = Arc::new(metadata);
    let handles: Vec<_> = paths
        .iter()
        .cloned()
        .map(|path| {
            let pipeline = Arc::clone(&pipeline);
            let metadata = Arc::clone(&metadata);
            tokio::task::spawn_blocking(move || pipeline.run_file(&path, &metadata))
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .zip(paths)
        .map(|(joined, path)| {
            let outcome = joined.unwrap_or_else(|e| {
                Err(ThreatdrawError::Other(anyhow::anyhow!(
                    "Conversion task for {} failed: {}",
                    path.display(),
                    e
                )))
            });
            BatchResult { path, outcome }
        })
        .collect()
}
