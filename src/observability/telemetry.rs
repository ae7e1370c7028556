//! Tracing setup for conversion runs
//!
//! Each pipeline stage runs inside its own span carrying warning and error
//! counts. Log output goes to stderr and honours RUST_LOG. Diagram labels
//! pass through [`sanitize_for_log`] before they reach a log line.

use tracing::{info_span, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Longest label fragment written to a log line.
pub const MAX_LOGGED_LABEL: usize = 80;

/// Escape control characters and truncate to [`MAX_LOGGED_LABEL`] chars.
/// Labels are free text and embedded newlines could forge entries.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_LOGGED_LABEL + 3));
    for (count, c) in s.chars().enumerate() {
        if count == MAX_LOGGED_LABEL {
            out.push_str("...");
            break;
        }
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x1b' => out.push_str("\\e"),
            '\x00' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

/// Initialize global tracing subscriber from RUST_LOG.
/// Without RUST_LOG only errors are shown; stage warnings already reach the
/// conversion summary.
pub fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "error".to_string());
    init_tracing_with_filter(&filter);
}

/// Initialize tracing for --verbose
pub fn init_tracing_verbose() {
    init_tracing_with_filter("debug")
}

/// Initialize with custom filter string
pub fn init_tracing_with_filter(filter: &str) {
    // Skip if already initialized
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_level(true)
            .compact()
            .with_writer(std::io::stderr); // stdout carries the document

        let filter_layer = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// Span covering one pipeline stage of one diagram.
pub fn stage_span(stage: &str, diagram: &str) -> Span {
    info_span!(
        "pipeline.stage",
        stage = stage,
        diagram = sanitize_for_log(diagram).as_str(),
        warnings = tracing::field::Empty,
        errors = tracing::field::Empty,
    )
}

/// Record a stage outcome on its span.
pub fn record_stage_outcome(span: &Span, warnings: usize, errors: usize) {
    span.record("warnings", warnings);
    span.record("errors", errors);
}

#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
