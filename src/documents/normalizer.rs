//! Turns free-form model output into a canonical field record.
//!
//! Parsing is line-oriented: `label: value` lines open a field, lines without
//! a separator continue the most recently opened one. Labels resolve through
//! an exact match, then the document's alias table, then fuzzy similarity.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::fields::{canonicalize, is_not_found};
use super::{DocumentSpec, FieldValue, NormalizedRecord};
use crate::error::ValidationError;

/// Minimum normalized Levenshtein similarity for a fuzzy label match.
pub const MIN_LABEL_SIMILARITY: f64 = 0.8;

/// Absorbs float error so a similarity of exactly 0.8 is accepted.
const SIMILARITY_EPSILON: f64 = 1e-9;

const SEPARATOR: char = ':';

/// Vision models sometimes echo the chat role before the answer.
static ECHO_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*assistant\s*:\s*").unwrap());

/// Numbered list prefixes such as `1.` or `2)`.
static LIST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s+").unwrap());

/// Normalize `raw_text` as a document of the given type.
///
/// Fails only when the text lacks the signals that identify the document
/// type. Missing fields are filled with the sentinel.
pub fn normalize(
    spec: &DocumentSpec,
    raw_text: &str,
) -> Result<NormalizedRecord, ValidationError> {
    validate(spec, raw_text)?;

    let parsed = parse_fields(spec, raw_text);
    let fields = spec
        .fields
        .iter()
        .zip(parsed)
        .map(|(field, value)| FieldValue {
            name: field.name,
            value: canonicalize(field.name, field.kind, value.as_deref().unwrap_or("")),
        })
        .collect();

    Ok(NormalizedRecord::new(
        spec.document_type,
        fields,
        raw_text.to_string(),
    ))
}

/// Check the document-identifying signal: one marker and one required keyword.
pub fn validate(spec: &DocumentSpec, raw_text: &str) -> Result<(), ValidationError> {
    if raw_text.trim().is_empty() {
        return Err(ValidationError::EmptyText);
    }

    let lowered = raw_text.to_lowercase();
    if !spec.markers.iter().any(|m| lowered.contains(m)) {
        return Err(ValidationError::NotRecognized {
            document_type: spec.document_type,
            reason: format!("none of [{}] mentioned", spec.markers.join(", ")),
        });
    }
    if !spec.required_keywords.iter().any(|k| lowered.contains(k)) {
        return Err(ValidationError::NotRecognized {
            document_type: spec.document_type,
            reason: format!("none of [{}] mentioned", spec.required_keywords.join(", ")),
        });
    }
    Ok(())
}

/// Parse raw values, indexed like `spec.fields`.
fn parse_fields(spec: &DocumentSpec, raw_text: &str) -> Vec<Option<String>> {
    let mut values: Vec<Option<String>> = vec![None; spec.fields.len()];
    let mut open: Option<usize> = None;

    for line in raw_text.lines() {
        let line = ECHO_PREFIX.replace(line, "");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((label, value)) = line.split_once(SEPARATOR) else {
            // Continuation of the open field, if any.
            if let Some(slot) = open.and_then(|idx| values[idx].as_mut()) {
                if slot.is_empty() {
                    *slot = clean_value(line);
                } else {
                    slot.push(' ');
                    slot.push_str(&clean_value(line));
                }
            }
            continue;
        };

        open = match resolve_label(spec, label) {
            Some(idx) if values[idx].as_deref().is_some_and(|v| !is_not_found(v)) => {
                debug!(
                    field = spec.fields[idx].name,
                    "Ignoring repeated label, field already has a value"
                );
                None
            }
            Some(idx) => {
                values[idx] = Some(clean_value(value));
                Some(idx)
            }
            None => {
                debug!(label, document_type = %spec.document_type, "Discarding unrecognized label");
                None
            }
        };
    }

    values
}

/// Resolve a label to the index of a canonical field.
pub(crate) fn resolve_label(spec: &DocumentSpec, label: &str) -> Option<usize> {
    let key = label_key(label);
    if key.is_empty() {
        return None;
    }

    if let Some(idx) = spec.fields.iter().position(|f| label_key(f.name) == key) {
        return Some(idx);
    }

    if let Some((_, canonical)) = spec.aliases.iter().find(|(alias, _)| label_key(alias) == key) {
        return spec.fields.iter().position(|f| f.name == *canonical);
    }

    let mut best: Option<(usize, f64)> = None;
    for (idx, field) in spec.fields.iter().enumerate() {
        let score = strsim::normalized_levenshtein(&key, &label_key(field.name));
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((idx, score));
        }
    }
    best.filter(|(_, score)| *score + SIMILARITY_EPSILON >= MIN_LABEL_SIMILARITY)
        .map(|(idx, _)| idx)
}

/// Comparison key: markup stripped, lowercase, whitespace collapsed.
fn label_key(label: &str) -> String {
    let trimmed = label.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '*' | '_' | '•' | '#' | '>' | '-')
    });
    let trimmed = LIST_NUMBER.replace(trimmed, "");
    trimmed
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" /", "/")
        .replace("/ ", "/")
}

fn clean_value(value: &str) -> String {
    value
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_'))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::specs::{DRIVERS_LICENSE, ID_CARD, LOG_CARD};
    use crate::documents::{DocumentType, SENTINEL};

    #[test]
    fn id_card_fields_in_canonical_order() {
        let record = normalize(&ID_CARD, "Identity Card\nName: Jane Tan\nID Number: S1234567A")
            .unwrap();
        assert_eq!(record.document_type(), DocumentType::IdCard);

        let names: Vec<_> = record.fields().iter().map(|f| f.name).collect();
        let canonical: Vec<_> = ID_CARD.fields.iter().map(|f| f.name).collect();
        assert_eq!(names, canonical);

        assert_eq!(record.get("Name"), Some("Jane Tan"));
        assert_eq!(record.get("ID Number"), Some("S1234567A"));
        assert_eq!(record.get("Race"), Some(SENTINEL));
        assert!(!record.is_found("Sex"));
    }

    #[test]
    fn log_card_is_always_fully_populated() {
        let texts = [
            "Vehicle Log Card\nVehicle No: SBA1234A",
            "log card registration\n",
            "LOG CARD\nOwner: someone\nChassis No: X\nPQP Paid: 12,000\nUnladen Weight: 1,320 kg",
        ];
        for text in texts {
            let record = normalize(&LOG_CARD, text).unwrap();
            assert_eq!(record.fields().len(), 23, "input {text:?}");
            assert!(record.fields().iter().all(|f| !f.value.is_empty()));
        }
    }

    #[test]
    fn fuzzy_label_maps_to_canonical_field() {
        let record = normalize(&LOG_CARD, "Vehicle Log\nVehical No: SBA1234A").unwrap();
        assert_eq!(record.get("Vehicle No"), Some("SBA1234A"));
    }

    #[test]
    fn dissimilar_label_is_discarded() {
        assert_eq!(resolve_label(&LOG_CARD, "Favourite Colour"), None);
        assert_eq!(resolve_label(&ID_CARD, "Nam"), None);

        let record = normalize(&LOG_CARD, "Vehicle Log\nFavourite Colour: blue").unwrap();
        assert!(record.fields().iter().all(|f| f.value == SENTINEL));
    }

    #[test]
    fn alias_table_resolves_before_fuzzy() {
        assert_eq!(
            resolve_label(&LOG_CARD, "Vehicle Number").map(|i| LOG_CARD.fields[i].name),
            Some("Vehicle No")
        );
        assert_eq!(
            resolve_label(&DRIVERS_LICENSE, "licence no").map(|i| DRIVERS_LICENSE.fields[i].name),
            Some("License Number")
        );
        assert_eq!(
            resolve_label(&LOG_CARD, "Make / Model").map(|i| LOG_CARD.fields[i].name),
            Some("Make/Model")
        );
    }

    #[test]
    fn continuation_lines_extend_open_field() {
        let text = "Vehicle Log Card\nMake/Model: TOYOTA /\nCOROLLA ALTIS\nVehicle No: SBA1234A";
        let record = normalize(&LOG_CARD, text).unwrap();
        assert_eq!(record.get("Make/Model"), Some("TOYOTA / COROLLA ALTIS"));
    }

    #[test]
    fn continuation_after_discarded_label_is_dropped() {
        let text = "Identity Card\nName: Jane Tan\nRemarks: none\nextra words\n";
        let record = normalize(&ID_CARD, text).unwrap();
        assert_eq!(record.get("Name"), Some("Jane Tan"));
    }

    #[test]
    fn empty_label_value_filled_by_continuation() {
        let text = "Identity Card\nCountry/Place of birth:\nSINGAPORE";
        let record = normalize(&ID_CARD, text).unwrap();
        assert_eq!(record.get("Country/Place of birth"), Some("SINGAPORE"));
    }

    #[test]
    fn repeated_label_only_replaces_missing_value() {
        let text = "Identity Card\nName: not found\nName: Jane Tan\nName: Echoed Prompt";
        let record = normalize(&ID_CARD, text).unwrap();
        assert_eq!(record.get("Name"), Some("Jane Tan"));
    }

    #[test]
    fn markup_and_echo_prefix_are_stripped() {
        let text = "Assistant: Identity Card\n- **Name:** Jane Tan\n2. Sex: F\nAssistant: Race: Chinese";
        let record = normalize(&ID_CARD, text).unwrap();
        assert_eq!(record.get("Name"), Some("Jane Tan"));
        assert_eq!(record.get("Sex"), Some("F"));
        assert_eq!(record.get("Race"), Some("Chinese"));
    }

    #[test]
    fn field_kinds_are_canonicalized() {
        let text = "\
Vehicle Log Card
Original Registration Date: 22 Jun 2015
PQP Paid: S$12,345.6
Maximum Laden Weight: 1,850 kg
COE Expiry Date: sometime";
        let record = normalize(&LOG_CARD, text).unwrap();
        assert_eq!(record.get("Original Registration Date"), Some("2015-06-22"));
        assert_eq!(record.get("PQP Paid"), Some("$12345.60"));
        assert_eq!(record.get("Maximum Laden Weight"), Some("1850 kg"));
        assert_eq!(record.get("COE Expiry Date"), Some("sometime"));
    }

    #[test]
    fn output_is_deterministic_and_independent_of_line_order() {
        let a = "Identity Card\nSex: F\nName: Jane Tan\nID Number: S1234567A";
        let b = "Identity Card\nID Number: S1234567A\nName: Jane Tan\nSex: F";
        let first = normalize(&ID_CARD, a).unwrap();
        assert_eq!(first, normalize(&ID_CARD, a).unwrap());
        assert_eq!(first.fields(), normalize(&ID_CARD, b).unwrap().fields());
    }

    #[test]
    fn validation_requires_marker_and_keyword() {
        assert_eq!(validate(&ID_CARD, "   \n"), Err(ValidationError::EmptyText));
        assert!(matches!(
            validate(&LOG_CARD, "Vehicle registration details"),
            Err(ValidationError::NotRecognized { document_type: DocumentType::LogCard, .. })
        ));
        assert!(matches!(
            validate(&DRIVERS_LICENSE, "Driver: John"),
            Err(ValidationError::NotRecognized { .. })
        ));
        assert!(validate(&DRIVERS_LICENSE, "Driving Licence\nClass: 3").is_ok());
    }

    #[test]
    fn missing_fields_do_not_fail_validation() {
        let record = normalize(&DRIVERS_LICENSE, "Driver License class 3").unwrap();
        assert!(record.fields().iter().all(|f| f.value == SENTINEL));
        assert_eq!(record.raw_model_text(), "Driver License class 3");
    }
}
