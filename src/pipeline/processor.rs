//! Intake processor — handles one inbound message end to end.
//!
//! Flow, under the user's intake lock:
//! 1. Commands and plain text → fixed replies
//! 2. Media → download, size check, inference, classification
//! 3. Accepted record → state transition, then record sync
//! 4. Reply through the gateway
//!
//! Every failure becomes a [`ProcessOutcome`]; nothing here returns an error.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::replies;
use super::types::{Command, InboundMessage, MessageBody, OutcomeKind, ProcessOutcome, SyncStatus};
use crate::channels::MessagingGateway;
use crate::documents::{Classifier, DocumentType};
use crate::intake::store::advance;
use crate::intake::{IntakeGuard, IntakeStore};
use crate::sync::RecordSyncClient;
use crate::vision::ModelHandle;

/// Downloads smaller than this are not real photos.
pub const MIN_IMAGE_BYTES: usize = 1024;

/// Everything decided about a message before the reply is sent.
struct Handled {
    kind: OutcomeKind,
    document_type: Option<DocumentType>,
    sync: SyncStatus,
    reply: String,
    /// Drop the user's intake once the reply is out.
    release: bool,
}

impl Handled {
    fn reply(kind: OutcomeKind, reply: String) -> Self {
        Self {
            kind,
            document_type: None,
            sync: SyncStatus::NotApplicable,
            reply,
            release: false,
        }
    }
}

pub struct IntakeProcessor {
    store: Arc<IntakeStore>,
    classifier: Classifier,
    model: ModelHandle,
    gateway: Arc<dyn MessagingGateway>,
    sync: Option<Arc<RecordSyncClient>>,
}

impl IntakeProcessor {
    pub fn new(
        store: Arc<IntakeStore>,
        model: ModelHandle,
        gateway: Arc<dyn MessagingGateway>,
    ) -> Self {
        Self {
            store,
            classifier: Classifier::new(),
            model,
            gateway,
            sync: None,
        }
    }

    pub fn with_sync(mut self, sync: Arc<RecordSyncClient>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn store(&self) -> &Arc<IntakeStore> {
        &self.store
    }

    /// Process one message. The user's lock is taken first and held until
    /// the reply has been sent, so a user's messages are handled in order.
    pub async fn process(&self, message: InboundMessage) -> ProcessOutcome {
        debug!(id = %message.id, user_id = %message.chat_id, "Processing inbound message");

        let mut intake = self.store.lock(&message.chat_id).await;
        let handled = self.handle(&message, &mut intake).await;

        let reply_sent = match self.gateway.send_text(&message.chat_id, &handled.reply).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    user_id = %message.chat_id,
                    gateway = self.gateway.name(),
                    error = %e,
                    "Failed to send reply"
                );
                false
            }
        };

        let state = intake.state();
        drop(intake);
        if handled.release {
            self.store.remove(&message.chat_id).await;
        }

        let elapsed_ms = (Utc::now() - message.received_at).num_milliseconds();
        info!(
            id = %message.id,
            user_id = %message.chat_id,
            kind = ?handled.kind,
            elapsed_ms,
            "Message handled"
        );

        ProcessOutcome {
            message_id: message.id,
            chat_id: message.chat_id,
            kind: handled.kind,
            state,
            document_type: handled.document_type,
            sync: handled.sync,
            reply: handled.reply,
            reply_sent,
        }
    }

    async fn handle(&self, message: &InboundMessage, intake: &mut IntakeGuard) -> Handled {
        match &message.body {
            MessageBody::Text(text) => match Command::parse(text) {
                Some(command) => Handled {
                    release: command == Command::Reset,
                    ..Handled::reply(OutcomeKind::Command, run_command(command, intake))
                },
                None => greet_or_hint(intake),
            },
            MessageBody::Empty => greet_or_hint(intake),
            MessageBody::Media { url } => self.handle_document(&message.chat_id, url, intake).await,
        }
    }

    async fn handle_document(&self, user_id: &str, url: &str, intake: &mut IntakeGuard) -> Handled {
        if intake.is_complete() {
            info!(user_id, "Upload ignored, intake already complete");
            return Handled::reply(OutcomeKind::AlreadyComplete, replies::already_complete());
        }

        let image = match self.gateway.fetch_media(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(user_id, error = %e, "Media download failed");
                return Handled::reply(
                    OutcomeKind::MediaFailed,
                    replies::media_failure("download failed"),
                );
            }
        };
        if image.len() < MIN_IMAGE_BYTES {
            warn!(user_id, bytes = image.len(), "Image too small");
            return Handled::reply(
                OutcomeKind::MediaFailed,
                replies::media_failure("Image file is too small"),
            );
        }

        let text = match self.model.infer(&image).await {
            Ok(text) => text,
            Err(e) => {
                error!(user_id, model = self.model.model_name(), error = %e, "Inference failed");
                return Handled::reply(OutcomeKind::ModelFailed, replies::model_failure());
            }
        };

        let record = match self.classifier.classify(&text) {
            Ok(record) => record,
            Err(e) => {
                info!(user_id, error = %e, "Document not recognized");
                return Handled::reply(
                    OutcomeKind::ClassificationFailed,
                    replies::document_error(&e.to_string()),
                );
            }
        };
        let document_type = record.document_type();

        let state = match advance(user_id, intake, record) {
            Ok(state) => state,
            Err(e) => {
                info!(user_id, error = %e, "Document not recorded");
                return Handled::reply(OutcomeKind::AlreadyComplete, replies::already_complete());
            }
        };

        let sync = match (&self.sync, intake.collected().get(&document_type)) {
            (Some(client), Some(record)) => client.sync_record(record).await.into(),
            _ => SyncStatus::Disabled,
        };

        let mut reply = replies::document_accepted(document_type, state);
        if matches!(sync, SyncStatus::Failed { .. }) {
            reply.push_str("\n\n");
            reply.push_str(&replies::sync_failed());
        }

        Handled {
            kind: OutcomeKind::DocumentAccepted,
            document_type: Some(document_type),
            sync,
            reply,
            release: false,
        }
    }
}

fn run_command(command: Command, intake: &mut IntakeGuard) -> String {
    match command {
        Command::Help => replies::help(),
        Command::Status => replies::status(intake),
        Command::Reset => {
            intake.reset();
            replies::reset_done()
        }
    }
}

fn greet_or_hint(intake: &IntakeGuard) -> Handled {
    if intake.created {
        Handled::reply(OutcomeKind::Welcome, replies::welcome())
    } else {
        Handled::reply(OutcomeKind::UnknownMessage, replies::unknown(intake.state()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ChannelError, ModelError};
    use crate::intake::IntakeState;
    use crate::sync::{RetryPolicy, SyncTransport, TransportResponse};
    use crate::vision::{ModelOptions, VisionModel};

    /// Returns whatever text was queued for the next image.
    struct ScriptedModel {
        texts: Mutex<Vec<Result<String, ()>>>,
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn health_check(&self) -> Result<(), ModelError> {
            Ok(())
        }
        async fn load(&self) -> Result<(), ModelError> {
            Ok(())
        }
        async fn infer(&self, _image: &[u8]) -> Result<String, ModelError> {
            let next = self.texts.lock().unwrap().remove(0);
            next.map_err(|_| ModelError::RequestFailed {
                model: "scripted".into(),
                reason: "boom".into(),
            })
        }
        async fn shutdown(&self) -> Result<(), ModelError> {
            Ok(())
        }
    }

    /// Records replies; serves a fixed-size image or fails.
    struct RecordingGateway {
        sent: Mutex<Vec<(String, String)>>,
        image_size: usize,
        fail_fetch: bool,
    }

    impl RecordingGateway {
        fn new(image_size: usize) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                image_size,
                fail_fetch: false,
            })
        }
    }

    #[async_trait]
    impl MessagingGateway for RecordingGateway {
        fn name(&self) -> &str {
            "recording"
        }
        async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push((chat_id.into(), text.into()));
            Ok(())
        }
        async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, ChannelError> {
            if self.fail_fetch {
                return Err(ChannelError::MediaFetchFailed {
                    url: url.into(),
                    reason: "404".into(),
                });
            }
            Ok(vec![0u8; self.image_size])
        }
    }

    struct FixedTransport(u16, String);

    #[async_trait]
    impl SyncTransport for FixedTransport {
        async fn post(&self, _payload: &serde_json::Value) -> anyhow::Result<TransportResponse> {
            Ok(TransportResponse::new(self.0, self.1.clone()))
        }
    }

    const ID_TEXT: &str = "Identity Card\nName: Jane Tan\nID Number: S1234567A";
    const LICENSE_TEXT: &str = "Driver License\nLicense Number: S1234567A\nClasses: 3";
    const LOG_TEXT: &str = "Vehicle Log Card\nVehicle No: SBA1234A";

    async fn processor(
        texts: Vec<Result<String, ()>>,
        gateway: Arc<RecordingGateway>,
    ) -> IntakeProcessor {
        let model = Arc::new(ScriptedModel {
            texts: Mutex::new(texts),
        });
        let handle = ModelHandle::start(model, ModelOptions::default()).await.unwrap();
        IntakeProcessor::new(IntakeStore::new(), handle, gateway)
    }

    fn media(chat_id: &str) -> InboundMessage {
        InboundMessage::new(
            chat_id,
            MessageBody::Media {
                url: "https://media.example/1.jpg".into(),
            },
        )
    }

    fn text(chat_id: &str, body: &str) -> InboundMessage {
        InboundMessage::new(chat_id, MessageBody::Text(body.into()))
    }

    #[tokio::test]
    async fn id_card_advances_and_asks_for_license() {
        let gateway = RecordingGateway::new(4096);
        let p = processor(vec![Ok(ID_TEXT.into())], gateway.clone()).await;

        let outcome = p.process(media("u1")).await;
        assert_eq!(outcome.kind, OutcomeKind::DocumentAccepted);
        assert_eq!(outcome.document_type, Some(DocumentType::IdCard));
        assert_eq!(outcome.state, IntakeState::AwaitingLicense);
        assert_eq!(outcome.sync, SyncStatus::Disabled);
        assert!(outcome.reply_sent);
        assert!(outcome.reply.contains("Please upload your driver's license photo"));

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "u1");
    }

    #[tokio::test]
    async fn unrecognized_text_leaves_state_unchanged() {
        let gateway = RecordingGateway::new(4096);
        let p = processor(vec![Ok("a photo of a cat".into())], gateway).await;

        let outcome = p.process(media("u1")).await;
        assert_eq!(outcome.kind, OutcomeKind::ClassificationFailed);
        assert_eq!(outcome.state, IntakeState::AwaitingId);
        assert!(outcome.reply.contains("Could not identify document type"));
    }

    #[tokio::test]
    async fn three_documents_complete_then_fourth_is_a_no_op() {
        let gateway = RecordingGateway::new(4096);
        let texts = vec![Ok(ID_TEXT.into()), Ok(LICENSE_TEXT.into()), Ok(LOG_TEXT.into())];
        let p = processor(texts, gateway).await;

        for _ in 0..3 {
            p.process(media("u1")).await;
        }
        assert!(p.store().is_complete("u1").await);

        // No inference is queued: the fourth upload must not reach the model.
        let fourth = p.process(media("u1")).await;
        assert_eq!(fourth.kind, OutcomeKind::AlreadyComplete);
        assert_eq!(fourth.state, IntakeState::Complete);
        assert!(fourth.reply.contains("already processed"));
    }

    #[tokio::test]
    async fn small_images_are_rejected_before_inference() {
        let gateway = RecordingGateway::new(100);
        let p = processor(vec![], gateway).await;

        let outcome = p.process(media("u1")).await;
        assert_eq!(outcome.kind, OutcomeKind::MediaFailed);
        assert!(outcome.reply.contains("Image file is too small"));
    }

    #[tokio::test]
    async fn failed_download_gets_a_reply() {
        let gateway = Arc::new(RecordingGateway {
            sent: Mutex::new(Vec::new()),
            image_size: 4096,
            fail_fetch: true,
        });
        let p = processor(vec![], gateway.clone()).await;

        let outcome = p.process(media("u1")).await;
        assert_eq!(outcome.kind, OutcomeKind::MediaFailed);
        assert_eq!(gateway.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn model_failure_asks_for_retry() {
        let gateway = RecordingGateway::new(4096);
        let p = processor(vec![Err(())], gateway).await;

        let outcome = p.process(media("u1")).await;
        assert_eq!(outcome.kind, OutcomeKind::ModelFailed);
        assert_eq!(outcome.state, IntakeState::AwaitingId);
        assert!(outcome.reply.contains("retry"));
    }

    #[tokio::test]
    async fn first_text_gets_welcome_then_hint() {
        let gateway = RecordingGateway::new(4096);
        let p = processor(vec![], gateway).await;

        assert_eq!(p.process(text("u1", "hi")).await.kind, OutcomeKind::Welcome);
        let second = p.process(text("u1", "hello?")).await;
        assert_eq!(second.kind, OutcomeKind::UnknownMessage);
        assert!(second.reply.contains("Please upload your ID card photo"));
    }

    #[tokio::test]
    async fn commands_report_status_and_reset() {
        let gateway = RecordingGateway::new(4096);
        let p = processor(vec![Ok(ID_TEXT.into())], gateway).await;
        p.process(media("u1")).await;

        let status = p.process(text("u1", "check_status")).await;
        assert_eq!(status.kind, OutcomeKind::Command);
        assert!(status.reply.contains("Identity Card: Uploaded"));
        assert!(status.reply.contains("Log Card: Missing"));

        let reset = p.process(text("u1", "RESET")).await;
        assert_eq!(reset.state, IntakeState::AwaitingId);
        assert!(!p.store().is_complete("u1").await);
        // The reset intake is dropped; the next message starts afresh.
        assert_eq!(p.store().state("u1").await, None);
        assert!(p.store().is_empty().await);

        let help = p.process(text("u1", "Help")).await;
        assert!(help.reply.contains("CHECK_STATUS"));
    }

    #[tokio::test]
    async fn sync_success_and_failure_are_reported() {
        let gateway = RecordingGateway::new(4096);
        let ok = r#"{"data":{"create_item":{"id":"77"}}}"#.to_string();
        let client = RecordSyncClient::new(Arc::new(FixedTransport(200, ok)), "1");
        let p = processor(vec![Ok(ID_TEXT.into())], gateway.clone())
            .await
            .with_sync(Arc::new(client));
        let outcome = p.process(media("u1")).await;
        assert_eq!(
            outcome.sync,
            SyncStatus::Synced {
                item_id: "77".into(),
                attempts: 1
            }
        );

        let client = RecordSyncClient::new(Arc::new(FixedTransport(401, String::new())), "1")
            .with_policy(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            });
        let p = processor(vec![Ok(ID_TEXT.into())], gateway)
            .await
            .with_sync(Arc::new(client));
        let outcome = p.process(media("u2")).await;

        // The transition stands even though the record was not saved.
        assert_eq!(outcome.state, IntakeState::AwaitingLicense);
        assert!(matches!(outcome.sync, SyncStatus::Failed { retriable: false, .. }));
        assert!(outcome.reply.contains("saving the record failed"));
    }

    #[tokio::test]
    async fn users_are_processed_independently() {
        let gateway = RecordingGateway::new(4096);
        let p = processor(vec![Ok(ID_TEXT.into()), Ok(ID_TEXT.into())], gateway).await;

        let (a, b) = tokio::join!(p.process(media("alice")), p.process(media("bob")));
        assert_eq!(a.state, IntakeState::AwaitingLicense);
        assert_eq!(b.state, IntakeState::AwaitingLicense);
    }
}
