//! Canonical field → external column mapping.
//!
//! Column ids default to the board the service was first deployed against.
//! Each one can be overridden by the environment variable named in its
//! binding (e.g. `CHASSIS_NO=text_999`).

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::documents::fields::normalize_date;
use crate::documents::specs::spec_for;
use crate::documents::NormalizedRecord;

/// Item name used when a record has neither a name nor an identifier.
pub const DEFAULT_ITEM_NAME: &str = "New Policy";

/// Canonical field holding the composite vehicle make and model.
const MAKE_MODEL_FIELD: &str = "Make/Model";

/// How a field's value is written into its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    /// Re-canonicalized; omitted when it cannot be parsed.
    Date,
    /// First `/` segment of the composite field.
    MakeSegment,
    /// Second `/` segment of the composite field.
    ModelSegment,
}

/// One mapped field.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBinding {
    pub field: &'static str,
    /// Environment variable that overrides the column id.
    pub key: &'static str,
    pub default_column: &'static str,
    pub kind: ColumnKind,
}

const fn bind(
    field: &'static str,
    key: &'static str,
    default_column: &'static str,
    kind: ColumnKind,
) -> ColumnBinding {
    ColumnBinding {
        field,
        key,
        default_column,
        kind,
    }
}

use ColumnKind::{Date, MakeSegment, ModelSegment, Text};

/// Every mapped field, in payload order.
pub const BINDINGS: &[ColumnBinding] = &[
    // Identity
    bind("Name", "FULL_NAME", "text9", Text),
    bind("Date of birth", "DATE_OF_BIRTH", "text99", Date),
    bind("Sex", "SEX", "text96", Text),
    bind("Country/Place of birth", "NATIONALITY", "short_text", Text),
    bind("Race", "RACE", "text_17", Text),
    // License
    bind("License Number", "LICENSE_NUMBER", "text8", Text),
    bind("Issue Date", "ISSUE_DATE", "date988", Date),
    bind("Valid From", "VALID_FROM", "date4", Date),
    bind("Valid To", "VALID_TO", "date5", Date),
    bind("Classes", "CLASSES", "text_13", Text),
    // Vehicle
    bind("Vehicle No", "VEHICLE_NO", "text_1195", Text),
    bind(MAKE_MODEL_FIELD, "VEHICLE_MAKE", "text2", MakeSegment),
    bind(MAKE_MODEL_FIELD, "VEHICLE_MODEL", "text6", ModelSegment),
    bind("Vehicle Type", "VEHICLE_TYPE", "text_1140", Text),
    bind("Vehicle Attachment 1", "VEHICLE_ATTACHMENT", "text_18", Text),
    bind("Vehicle Scheme", "VEHICLE_SCHEME", "text_157", Text),
    bind("Chassis No", "CHASSIS_NO", "text775", Text),
    bind("Propellant", "PROPELLANT", "text_153", Text),
    bind("Engine No", "ENGINE_NUMBER", "engine_number", Text),
    bind("Motor No", "MOTOR_NO", "text_155", Text),
    bind("Engine Capacity", "ENGINE_CAPACITY", "text_12", Text),
    bind("Power Rating", "POWER_RATING", "text_156", Text),
    bind("Maximum Power Output", "MAXIMUM_POWER_OUTPUT", "text_10", Text),
    bind("Maximum Laden Weight", "MAXIMUM_LADEN_WEIGHT", "text_15", Text),
    bind("Unladen Weight", "UNLADEN_WEIGHT", "text_14", Text),
    bind("Year Of Manufacture", "YEAR_OF_MANUFACTURE", "text_11", Text),
    bind("COE Category", "COE_CATEGORY", "text_171", Text),
    bind("PQP Paid", "PQP_PAID", "text_114", Text),
    // Vehicle dates
    bind("Original Registration Date", "ORIGINAL_REGISTRATION_DATE", "date8", Date),
    bind("COE Expiry Date", "COE_EXPIRY_DATE", "date1", Date),
    bind("Road Tax Expiry Date", "ROAD_TAX_EXPIRY_DATE", "date57", Date),
    bind("PARF Eligibility Expiry Date", "PARF_ELIGIBILITY_EXPIRY_DATE", "date44", Date),
    bind("Inspection Due Date", "INSPECTION_DUE_DATE", "date7", Date),
    bind("Intended Transfer Date", "INTENDED_TRANSFER_DATE", "date75", Date),
    // Referral. No built-in document carries these; registered types may.
    bind("Referrer's Name", "REFERRER_NAME", "text23", Text),
    bind("Contact Number", "CONTACT_NUMBER", "phone0", Text),
    bind("Dealership", "DEALERSHIP", "text3", Text),
];

/// Resolved column ids, keyed by binding key.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    columns: HashMap<&'static str, String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ColumnMap {
    /// Defaults, overridden by whatever `lookup` returns for a binding key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let columns = BINDINGS
            .iter()
            .map(|b| {
                let column = lookup(b.key)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| b.default_column.to_string());
                (b.key, column)
            })
            .collect();
        Self { columns }
    }

    /// Override a single column id. Unknown keys are ignored.
    pub fn with_override(mut self, key: &str, column: impl Into<String>) -> Self {
        if let Some(binding) = BINDINGS.iter().find(|b| b.key == key) {
            self.columns.insert(binding.key, column.into());
        }
        self
    }

    /// Column id for a binding key.
    pub fn column(&self, key: &str) -> Option<&str> {
        self.columns.get(key).map(String::as_str)
    }

    /// Column id → value for every mapped field that carries a value.
    pub fn column_values(&self, record: &NormalizedRecord) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();

        for binding in BINDINGS {
            if !record.is_found(binding.field) {
                continue;
            }
            let Some(raw) = record.get(binding.field) else {
                continue;
            };
            let Some(value) = column_value(binding, raw) else {
                continue;
            };
            if let Some(column) = self.column(binding.key) {
                values.insert(column.to_string(), value);
            }
        }

        values
    }
}

fn column_value(binding: &ColumnBinding, raw: &str) -> Option<String> {
    let value = match binding.kind {
        ColumnKind::Text => Some(raw.trim().to_string()),
        ColumnKind::Date => {
            let date = normalize_date(raw);
            if date.is_none() {
                warn!(field = binding.field, value = raw, "Unparseable date omitted from sync");
            }
            date
        }
        ColumnKind::MakeSegment => raw.split('/').next().map(|s| s.trim().to_string()),
        ColumnKind::ModelSegment => raw.split('/').nth(1).map(|s| s.trim().to_string()),
    };
    value.filter(|v| !v.is_empty())
}

/// `<Name> - <identifier>`, dropping whichever part is missing.
pub fn item_name(record: &NormalizedRecord) -> String {
    let identifier_field = spec_for(record.document_type()).identifier_field;
    let parts: Vec<&str> = ["Name", identifier_field]
        .into_iter()
        .filter(|field| record.is_found(field))
        .filter_map(|field| record.get(field))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    if parts.is_empty() {
        DEFAULT_ITEM_NAME.to_string()
    } else {
        parts.join(" - ")
    }
}
