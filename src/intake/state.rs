//! Intake state machine — tracks which document a user must submit next.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::documents::{DocumentType, NormalizedRecord};

/// The slots of the intake flow.
///
/// Progresses linearly: AwaitingId → AwaitingLicense → AwaitingLogCard →
/// Complete. Only an explicit reset moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeState {
    AwaitingId,
    AwaitingLicense,
    AwaitingLogCard,
    Complete,
}

impl IntakeState {
    /// Check if a transition from `self` to `target` is a forward step.
    pub fn can_transition_to(&self, target: IntakeState) -> bool {
        use IntakeState::*;
        matches!(
            (self, target),
            (AwaitingId, AwaitingLicense)
                | (AwaitingLicense, AwaitingLogCard)
                | (AwaitingLogCard, Complete)
        )
    }

    /// Whether this state is terminal (every document collected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Get the next state in the fixed order, if any.
    pub fn next(&self) -> Option<IntakeState> {
        use IntakeState::*;
        match self {
            AwaitingId => Some(AwaitingLicense),
            AwaitingLicense => Some(AwaitingLogCard),
            AwaitingLogCard => Some(Complete),
            Complete => None,
        }
    }

    /// Document type this slot nominally expects.
    pub fn expected_document(&self) -> Option<DocumentType> {
        match self {
            Self::AwaitingId => Some(DocumentType::IdCard),
            Self::AwaitingLicense => Some(DocumentType::DriversLicense),
            Self::AwaitingLogCard => Some(DocumentType::LogCard),
            Self::Complete => None,
        }
    }
}

impl Default for IntakeState {
    fn default() -> Self {
        Self::AwaitingId
    }
}

impl std::fmt::Display for IntakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingId => "awaiting_id",
            Self::AwaitingLicense => "awaiting_license",
            Self::AwaitingLogCard => "awaiting_log_card",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

macro_rules! upload_text {
    (id) => {
        "Please upload your ID card photo"
    };
    (license) => {
        "Please upload your driver's license photo"
    };
    (log_card) => {
        "Please upload your log card photo"
    };
}

/// Instruction shown to the user for a state.
pub fn expected_prompt(state: IntakeState) -> &'static str {
    match state {
        IntakeState::AwaitingId => upload_text!(id),
        IntakeState::AwaitingLicense => concat!("ID card processed. ", upload_text!(license)),
        IntakeState::AwaitingLogCard => {
            concat!("Driver's license processed. ", upload_text!(log_card))
        }
        IntakeState::Complete => "All documents have been processed successfully!",
    }
}

/// The bare upload request for a state; `None` once complete.
pub fn upload_request(state: IntakeState) -> Option<&'static str> {
    match state {
        IntakeState::AwaitingId => Some(upload_text!(id)),
        IntakeState::AwaitingLicense => Some(upload_text!(license)),
        IntakeState::AwaitingLogCard => Some(upload_text!(log_card)),
        IntakeState::Complete => None,
    }
}

/// Why a document could not be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyComplete;

/// Per-user intake: current slot plus the records collected so far.
#[derive(Debug, Clone, Default)]
pub struct UserIntake {
    state: IntakeState,
    collected: BTreeMap<DocumentType, NormalizedRecord>,
}

impl UserIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IntakeState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn collected(&self) -> &BTreeMap<DocumentType, NormalizedRecord> {
        &self.collected
    }

    pub fn has_document(&self, document_type: DocumentType) -> bool {
        self.collected.contains_key(&document_type)
    }

    /// Store a classified record and advance one slot.
    ///
    /// Advancement is positional: the slot moves forward whichever type was
    /// detected, and the record is filed under its detected type (replacing
    /// an earlier one of the same type).
    pub fn record_document(
        &mut self,
        record: NormalizedRecord,
    ) -> Result<IntakeState, AlreadyComplete> {
        let next = self.state.next().ok_or(AlreadyComplete)?;
        debug_assert!(self.state.can_transition_to(next));

        self.collected.insert(record.document_type(), record);
        self.state = next;
        Ok(next)
    }

    /// Back to the first slot with nothing collected.
    pub fn reset(&mut self) {
        self.state = IntakeState::AwaitingId;
        self.collected.clear();
    }
}
