//! Observability
//!
//! Tracing setup and helpers for logging untrusted diagram text.

pub mod telemetry;
