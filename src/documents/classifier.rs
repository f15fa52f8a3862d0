//! Routes raw model text to the first document type that accepts it.

use tracing::debug;

use super::specs::DEFAULT_REGISTRY;
use super::{DocumentSpec, NormalizedRecord, normalize};
use crate::error::ClassifyError;

/// Ordered registry of document specs.
///
/// Classification is side-effect-free: the same text always yields the same
/// record or the same aggregate error.
#[derive(Debug, Clone)]
pub struct Classifier {
    specs: Vec<&'static DocumentSpec>,
}

impl Classifier {
    /// ID card, driver's license, log card, in that order.
    pub fn new() -> Self {
        Self {
            specs: DEFAULT_REGISTRY.to_vec(),
        }
    }

    /// A classifier with no registered types (for tests and custom registries).
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    /// Register another document type after the existing ones.
    pub fn register(mut self, spec: &'static DocumentSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Return the first successful normalization, or every failure reason.
    pub fn classify(&self, raw_text: &str) -> Result<NormalizedRecord, ClassifyError> {
        let mut failures = Vec::with_capacity(self.specs.len());

        for spec in &self.specs {
            match normalize(spec, raw_text) {
                Ok(record) => {
                    debug!(document_type = %spec.document_type, "Document classified");
                    return Ok(record);
                }
                Err(e) => failures.push((spec.document_type, e)),
            }
        }

        Err(ClassifyError::Unidentified { failures })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
