//! Unit tests for threatdraw modules
//!
//! These tests drive the public API with in-memory diagrams; nothing here
//! spawns the binary.

mod test_config;
mod test_pipeline;
mod test_scenarios;
mod test_validator;
