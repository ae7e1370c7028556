//! Detection stages
//!
//! Each detector is a pure function of its inputs: it returns the entities it
//! produced together with the warnings/errors raised while producing them.
//! Detection context objects are built per call and dropped afterwards.

pub mod component;
pub mod composite;
pub mod correction;
pub mod flow;
pub mod threat;

pub use component::{ComponentDetector, DetectionContext};
pub use composite::CompositeComponentManager;
pub use flow::FlowDetector;
pub use threat::ThreatDetector;

use crate::model::Diagnostics;

/// Entities produced by a stage plus its diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<T> {
    pub items: Vec<T>,
    pub diagnostics: Diagnostics,
}

impl<T> StageOutput<T> {
    pub fn new(items: Vec<T>, diagnostics: Diagnostics) -> Self {
        Self { items, diagnostics }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lower-kebab-case slug of free text. Empty when nothing alphanumeric remains.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
