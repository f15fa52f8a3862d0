//! Document types, canonical field tables, and text normalization.
//!
//! Each supported document type is described by a [`DocumentSpec`]: its
//! canonical fields, an alias table, and the keywords that identify it. The
//! normalizer is a single pure function driven by that table, and the
//! classifier tries the registered specs in order.

pub mod classifier;
pub mod fields;
pub mod normalizer;
pub mod specs;

pub use classifier::Classifier;
pub use normalizer::normalize;
pub use specs::{DRIVERS_LICENSE, ID_CARD, LOG_CARD};

use serde::{Deserialize, Serialize};

/// Marker stored for a canonical field with no extractable value.
pub const SENTINEL: &str = "-";

/// The document types the intake flow collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    IdCard,
    DriversLicense,
    LogCard,
}

impl DocumentType {
    /// Display name used in replies.
    pub fn title(&self) -> &'static str {
        match self {
            Self::IdCard => "Identity Card",
            Self::DriversLicense => "Driver's License",
            Self::LogCard => "Log Card",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::IdCard => "ID card",
            Self::DriversLicense => "driver's license",
            Self::LogCard => "log card",
        };
        write!(f, "{s}")
    }
}

/// How a field's value is canonicalized after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Money,
    Weight,
}

/// A canonical field of a document type.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Text }
    }

    pub const fn date(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Date }
    }

    pub const fn money(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Money }
    }

    pub const fn weight(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Weight }
    }
}

/// Everything the normalizer needs to know about one document type.
#[derive(Debug)]
pub struct DocumentSpec {
    pub document_type: DocumentType,
    /// Canonical fields in output order.
    pub fields: &'static [FieldSpec],
    /// `(alias, canonical)` pairs, matched case-insensitively.
    pub aliases: &'static [(&'static str, &'static str)],
    /// At least one must appear in the text.
    pub markers: &'static [&'static str],
    /// At least one must appear in the text.
    pub required_keywords: &'static [&'static str],
    /// Field used as the secondary identifier in record names.
    pub identifier_field: &'static str,
}

impl DocumentSpec {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One canonical field and its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValue {
    pub name: &'static str,
    pub value: String,
}

/// A fully populated, immutable field record for one classified document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    document_type: DocumentType,
    fields: Vec<FieldValue>,
    raw_model_text: String,
}

impl NormalizedRecord {
    pub(crate) fn new(
        document_type: DocumentType,
        fields: Vec<FieldValue>,
        raw_model_text: String,
    ) -> Self {
        Self {
            document_type,
            fields,
            raw_model_text,
        }
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Fields in canonical order.
    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    pub fn raw_model_text(&self) -> &str {
        &self.raw_model_text
    }

    /// Value of a canonical field (the sentinel when nothing was found).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// True when the field holds an extracted value rather than the sentinel.
    pub fn is_found(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| v != SENTINEL)
    }
}
