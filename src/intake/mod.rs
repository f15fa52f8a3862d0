//! Per-user intake: which document comes next, and what has been collected.

pub mod state;
pub mod store;

pub use state::{IntakeState, UserIntake, expected_prompt, upload_request};
pub use store::{ExpiryPolicy, IntakeGuard, IntakeStore, spawn_expiry_task};
