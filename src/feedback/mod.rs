//! Delivery-Feedback Dispatcher.
//!
//! [`FeedbackDispatcher::handle_batch`] decodes each opaque notification
//! record into a [`FeedbackEvent`], classifies it, and applies the resulting
//! subscriber-list action through the [`SubscriptionAgent`]. A record that
//! fails to parse is logged and skipped; it never aborts the batch. Remove
//! and restore actions run once per recipient, independently, so one failing
//! agent call cannot block the others.

pub(crate) mod event;

pub use event::{classify, EventAction, FeedbackEvent, FeedbackKind};

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::audit::AuditLog;
use crate::ops::SubscriptionAgent;

/// Concurrency bounds for batch processing. Updates are capped to protect
/// the downstream subscription agent from overload.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub max_concurrent_records: usize,
    pub max_concurrent_updates: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent_records: 4,
            max_concurrent_updates: 4,
        }
    }
}

/// Outcome of one agent call for one recipient, independent of its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub succeeded: bool,
    pub message: String,
}

#[derive(Clone, Copy)]
enum UpdateKind {
    Remove,
    Restore,
}

impl UpdateKind {
    fn success_prefix(self) -> &'static str {
        match self {
            Self::Remove => "removed",
            Self::Restore => "restored",
        }
    }

    fn error_prefix(self) -> &'static str {
        match self {
            Self::Remove => "error removing",
            Self::Restore => "error restoring",
        }
    }
}

pub struct FeedbackDispatcher {
    agent: Arc<dyn SubscriptionAgent>,
    log: Arc<dyn AuditLog>,
    options: DispatchOptions,
}

impl FeedbackDispatcher {
    pub fn new(agent: Arc<dyn SubscriptionAgent>, log: Arc<dyn AuditLog>) -> Self {
        Self {
            agent,
            log,
            options: DispatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Processes every record in the batch. Records are independent and run
    /// concurrently; audit line ordering across records is not guaranteed,
    /// but all lines for one record are emitted before its handling
    /// completes.
    pub async fn handle_batch<I>(&self, records: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        stream::iter(records)
            .for_each_concurrent(self.options.max_concurrent_records.max(1), |record| async move {
                self.handle_record(record.as_ref()).await;
            })
            .await;
    }

    pub async fn handle_record(&self, raw: &str) {
        match FeedbackEvent::parse(raw) {
            Err(err) => {
                self.log
                    .log(&format!("parsing feedback event failed: {err}: {raw}"));
            }
            Ok(feedback) => self.handle_event(&feedback).await,
        }
    }

    pub async fn handle_event(&self, feedback: &FeedbackEvent) {
        match classify(&feedback.kind) {
            EventAction::NoOp { outcome } => self.log_outcome(feedback, &outcome),
            EventAction::Unimplemented { type_name } => {
                self.log_outcome(feedback, &format!("unimplemented event type: {type_name}"));
            }
            EventAction::Remove { reason } => {
                self.update_recipients(feedback, &reason, UpdateKind::Remove)
                    .await;
            }
            EventAction::Restore { reason } => {
                self.update_recipients(feedback, &reason, UpdateKind::Restore)
                    .await;
            }
        }
    }

    async fn update_recipients(&self, feedback: &FeedbackEvent, reason: &str, kind: UpdateKind) {
        stream::iter(&feedback.to)
            .for_each_concurrent(self.options.max_concurrent_updates.max(1), |recipient| async move {
                let outcome = self.update_recipient(kind, recipient, reason).await;
                self.log_outcome(feedback, &outcome.message);
            })
            .await;
    }

    async fn update_recipient(
        &self,
        kind: UpdateKind,
        recipient: &str,
        reason: &str,
    ) -> RecipientOutcome {
        let result = match kind {
            UpdateKind::Remove => self.agent.remove(recipient).await,
            UpdateKind::Restore => self.agent.restore(recipient).await,
        };

        let recipient_and_reason = format!(" {recipient} due to: {reason}");
        match result {
            Ok(()) => RecipientOutcome {
                recipient: recipient.to_string(),
                succeeded: true,
                message: format!("{}{recipient_and_reason}", kind.success_prefix()),
            },
            Err(err) => RecipientOutcome {
                recipient: recipient.to_string(),
                succeeded: false,
                message: format!("{}{recipient_and_reason}: {err}", kind.error_prefix()),
            },
        }
    }

    /// Exact punctuation matters here: downstream log scraping keys off this
    /// format.
    fn log_outcome(&self, feedback: &FeedbackEvent, outcome: &str) {
        self.log.log(&format!(
            r#"{} [Id:"{}" From:"{}" To:"{}" Subject:"{}"]: {}: {}"#,
            feedback.kind.type_name(),
            feedback.message_id,
            feedback.from.join(","),
            feedback.to.join(","),
            feedback.subject,
            outcome,
            feedback.raw,
        ));
    }
}

#[cfg(test)]
mod tests;
