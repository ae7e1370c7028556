//! threatdraw - threat models from architecture diagrams
//!
//! Reads the cells of a draw.io style diagram and produces a Threagile
//! document:
//!
//! - **Detection**: component typing, composite patterns, data flows
//! - **Threats**: simple and composite threats with context-aware risk scores
//! - **Mapping**: Threagile assets, trust boundaries and relations
//! - **Validation**: schema, naming, reference and compliance checks
//!
//! # Quick Start
//!
//! ```ignore
//! use threatdraw::{config::Config, pipeline::Pipeline, threagile::DocumentMetadata};
//!
//! let config = Config::load(None)?;
//! let metadata = DocumentMetadata::from_config(&config.mapping, "2024-05-01");
//! let pipeline = Pipeline::new(config)?;
//! let output = pipeline.run_file(Path::new("shop.json"), &metadata)?;
//! println!("{}", output.document.to_yaml()?);
//! ```

pub mod cli;
pub mod config;
pub mod detection;
pub mod errors;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod rules;
pub mod threagile;
