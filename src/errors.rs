use std::path::PathBuf;
use thiserror::Error;

/// The central error type for threatdraw.
///
/// Entity-level problems (a dangling relation, a low-confidence guess) are
/// reported through `Diagnostics` and never surface here. These variants are
/// the failures that stop a whole diagram or run.
#[derive(Error, Debug)]
pub enum ThreatdrawError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Malformed diagram input. Fatal for that diagram only.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InputError {
    #[error("Cell at position {index} has an empty id")]
    EmptyId { index: usize },

    #[error("Duplicate cell id '{id}'")]
    DuplicateId { id: String },

    #[error("Shape cell '{id}' carries connector endpoints")]
    UnexpectedEndpoints { id: String },

    #[error("Failed to parse cells from {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid pattern for '{field}': {message}")]
    InvalidPattern { field: String, message: String },

    #[error("Invalid bounds for '{field}': min {min} > max {max}")]
    InvalidBounds { field: String, min: usize, max: usize },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Failed to serialize document: {0}")]
    Serialize(String),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Document is not a mapping")]
    NotAMapping,

    #[error("Failed to parse document: {0}")]
    Parse(String),

    #[error("Document failed validation with {errors} error(s)")]
    Failed { errors: usize },
}

pub type Result<T> = std::result::Result<T, ThreatdrawError>;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_INPUT_ERROR: u8 = 3;
pub const EXIT_VALIDATION_FAILED: u8 = 4;

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<ThreatdrawError>() {
        return match err {
            ThreatdrawError::Config(_) => EXIT_CONFIG_ERROR,
            ThreatdrawError::Input(_) => EXIT_INPUT_ERROR,
            ThreatdrawError::Validation(_) => EXIT_VALIDATION_FAILED,
            _ => EXIT_ERROR,
        };
    }

    // Stage errors converted straight into anyhow without the wrapper
    if e.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG_ERROR;
    }
    if e.downcast_ref::<InputError>().is_some() {
        return EXIT_INPUT_ERROR;
    }
    if e.downcast_ref::<ValidationError>().is_some() {
        return EXIT_VALIDATION_FAILED;
    }

    EXIT_ERROR
}
