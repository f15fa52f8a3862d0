//! Reply texts sent back to the user.

use crate::documents::DocumentType;
use crate::intake::{IntakeState, UserIntake, expected_prompt, upload_request};

use super::types::Command;

pub fn welcome() -> String {
    "Welcome to the document intake bot! 👋\n\n\
     Please upload the following documents:\n\
     1. Identity Card\n\
     2. Driver's License\n\
     3. Log Card\n\n\
     Type 'CHECK_STATUS' to see your progress.\n\
     Type 'HELP' for available commands."
        .to_string()
}

pub fn help() -> String {
    let lines = Command::descriptions()
        .iter()
        .map(|(cmd, desc)| format!("• {cmd}: {desc}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Available commands:\n\n{lines}")
}

/// Per-document Uploaded/Missing listing.
pub fn status(intake: &UserIntake) -> String {
    let mut out = String::from("Document Upload Status:");
    for document_type in [
        DocumentType::IdCard,
        DocumentType::DriversLicense,
        DocumentType::LogCard,
    ] {
        let (mark, label) = if intake.has_document(document_type) {
            ("✅", "Uploaded")
        } else {
            ("⬜", "Missing")
        };
        out.push_str(&format!("\n{mark} {}: {label}", document_type.title()));
    }
    out.push_str("\n\n");
    out.push_str(expected_prompt(intake.state()));
    out
}

/// Upload rejected; carries the reason.
pub fn document_error(reason: &str) -> String {
    format!(
        "❌ Document validation failed.\n\n\
         Details: {reason}\n\n\
         Please ensure:\n\
         - The image is clear and readable\n\
         - The document is properly oriented\n\
         - All required information is visible"
    )
}

/// Upload accepted; tells the user what to send next.
pub fn document_accepted(document_type: DocumentType, state: IntakeState) -> String {
    let next = match upload_request(state) {
        Some(request) => request.to_string(),
        None => completion(),
    };
    format!("✅ {} processed successfully!\n\n{next}", document_type.title())
}

pub fn completion() -> String {
    format!(
        "🎉 {}\nAll required documents have been uploaded.",
        expected_prompt(IntakeState::Complete)
    )
}

pub fn already_complete() -> String {
    "All your documents are already processed. Type 'RESET' to start over.".to_string()
}

pub fn model_failure() -> String {
    "⚠️ We couldn't read your document right now. Please retry the upload in a moment."
        .to_string()
}

pub fn media_failure(reason: &str) -> String {
    format!("⚠️ We couldn't download your image ({reason}). Please retry the upload.")
}

/// Appended when the document was accepted but the record sync failed.
pub fn sync_failed() -> String {
    "Note: your document was captured, but saving the record failed. Our team has been notified."
        .to_string()
}

pub fn reset_done() -> String {
    format!(
        "Your uploads have been cleared.\n\n{}",
        expected_prompt(IntakeState::AwaitingId)
    )
}

/// Text that is neither a command nor a first contact.
pub fn unknown(state: IntakeState) -> String {
    format!(
        "Please send a document image or use one of the available commands. \
         Type 'HELP' for more information.\n\n{}",
        expected_prompt(state)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_lists_every_command() {
        let text = help();
        for (cmd, _) in Command::descriptions() {
            assert!(text.contains(cmd));
        }
    }

    #[test]
    fn status_marks_uploaded_and_missing() {
        let text = status(&UserIntake::new());
        assert_eq!(text.matches("Missing").count(), 3);
        assert!(text.ends_with(expected_prompt(IntakeState::AwaitingId)));
    }

    #[test]
    fn accepted_reply_names_next_document() {
        let text = document_accepted(DocumentType::IdCard, IntakeState::AwaitingLicense);
        assert!(text.starts_with("✅ Identity Card processed successfully!"));
        assert!(text.contains("driver's license"));

        for state in [IntakeState::AwaitingId, IntakeState::AwaitingLogCard] {
            let text = document_accepted(DocumentType::DriversLicense, state);
            assert!(text.ends_with(upload_request(state).unwrap()));
        }

        let done = document_accepted(DocumentType::LogCard, IntakeState::Complete);
        assert!(done.contains("All documents have been processed successfully!"));
    }

    #[test]
    fn document_error_carries_reason() {
        assert!(document_error("Could not identify document type").contains("Details: Could not identify document type"));
    }
}
