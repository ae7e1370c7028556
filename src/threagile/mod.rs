//! Threagile output: document schema, mapper and validator

pub mod document;
pub mod mapper;
pub mod validator;

pub use document::ThreagileDocument;
pub use mapper::{DocumentMetadata, ExistingAssets, InternalGraph, MappingResult, ThreagileMapper};
pub use validator::{parse_document, OutputValidator, ValidationReport};
