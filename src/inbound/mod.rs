//! Inbound-mail abuse filter.
//!
//! Raw inbound delivery notifications (mail sent *to* the system, as opposed
//! to delivery feedback about mail the system sent) pass through three gates
//! before anything touches the subscriber store:
//!
//! 1. DMARC verdict FAIL with policy REJECT bounces the message outright.
//! 2. Any failing SPF/DKIM/spam/virus verdict classifies it as spam.
//! 3. Otherwise the message is parsed as an unsubscribe command addressed to
//!    `unsubscribe+<subscriber-email>+<token>@<system-domain>` and forwarded
//!    to the subscription agent.
//!
//! Exactly one audit line is logged per inbound message.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::address::EmailAddress;
use crate::audit::AuditLog;
use crate::feedback::event::MailObject;
use crate::ops::{Bouncer, SubscriptionAgent, UnsubscribeOutcome};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundRecord {
    #[serde(default)]
    mail: MailObject,
    #[serde(default)]
    receipt: Receipt,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Receipt {
    timestamp: String,
    recipients: Vec<String>,
    spf_verdict: VerdictStatus,
    dkim_verdict: VerdictStatus,
    spam_verdict: VerdictStatus,
    virus_verdict: VerdictStatus,
    dmarc_verdict: VerdictStatus,
    dmarc_policy: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VerdictStatus {
    status: String,
}

/// One decoded inbound message with its authentication verdicts. Provider
/// documentation disagrees on verdict casing, so everything is uppercased
/// at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub timestamp: String,
    pub recipients: Vec<String>,
    pub spf_verdict: String,
    pub dkim_verdict: String,
    pub spam_verdict: String,
    pub virus_verdict: String,
    pub dmarc_verdict: String,
    pub dmarc_policy: String,
}

impl InboundMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let record: InboundRecord = serde_json::from_str(raw)?;
        let headers = record.mail.common_headers;
        let receipt = record.receipt;
        Ok(Self {
            message_id: record.mail.message_id,
            from: headers.from,
            to: headers.to,
            subject: headers.subject,
            timestamp: receipt.timestamp,
            recipients: receipt.recipients,
            spf_verdict: receipt.spf_verdict.status.to_uppercase(),
            dkim_verdict: receipt.dkim_verdict.status.to_uppercase(),
            spam_verdict: receipt.spam_verdict.status.to_uppercase(),
            virus_verdict: receipt.virus_verdict.status.to_uppercase(),
            dmarc_verdict: receipt.dmarc_verdict.status.to_uppercase(),
            dmarc_policy: receipt.dmarc_policy.to_uppercase(),
        })
    }

    fn dmarc_rejects(&self) -> bool {
        self.dmarc_verdict == "FAIL" && self.dmarc_policy == "REJECT"
    }

    fn is_spam(&self) -> bool {
        self.spf_verdict == "FAIL"
            || self.dkim_verdict == "FAIL"
            || self.spam_verdict == "FAIL"
            || self.virus_verdict == "FAIL"
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
enum CommandError {
    #[error("no unsubscribe recipient")]
    NoRecipient,
    #[error("missing unsubscribe token")]
    MissingToken,
    #[error("invalid subscriber address: {0}")]
    InvalidAddress(crate::address::ParseError),
}

#[derive(Debug, PartialEq, Eq)]
struct UnsubscribeCommand {
    email: String,
    token: String,
}

/// Finds a recipient of the form `unsubscribe+<email>+<token>@<domain>` and
/// splits out the subscriber address and token. The token is everything
/// after the last `+`, so tagged subscriber addresses survive.
fn parse_unsubscribe_command(
    recipients: &[String],
    email_domain: &str,
) -> Result<UnsubscribeCommand, CommandError> {
    for recipient in recipients {
        let Some((local, domain)) = recipient.rsplit_once('@') else {
            continue;
        };
        if !domain.eq_ignore_ascii_case(email_domain) {
            continue;
        }
        let Some(rest) = local.strip_prefix("unsubscribe+") else {
            continue;
        };

        let Some((email, token)) = rest.rsplit_once('+') else {
            return Err(CommandError::MissingToken);
        };
        if token.is_empty() {
            return Err(CommandError::MissingToken);
        }
        let email = EmailAddress::parse(email).map_err(CommandError::InvalidAddress)?;
        return Ok(UnsubscribeCommand {
            email: email.canonical(),
            token: token.to_string(),
        });
    }
    Err(CommandError::NoRecipient)
}

pub struct InboundHandler {
    email_domain: String,
    agent: Arc<dyn SubscriptionAgent>,
    bouncer: Arc<dyn Bouncer>,
    log: Arc<dyn AuditLog>,
}

impl InboundHandler {
    pub fn new(
        email_domain: impl Into<String>,
        agent: Arc<dyn SubscriptionAgent>,
        bouncer: Arc<dyn Bouncer>,
        log: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            email_domain: email_domain.into(),
            agent,
            bouncer,
            log,
        }
    }

    pub async fn handle(&self, raw: &str) {
        match InboundMessage::parse(raw) {
            Err(err) => {
                self.log
                    .log(&format!("parsing inbound message failed: {err}: {raw}"));
            }
            Ok(message) => self.handle_message(&message).await,
        }
    }

    pub async fn handle_message(&self, message: &InboundMessage) {
        let outcome = self.outcome_for(message).await;
        self.log.log(&format!(
            r#"unsubscribe [Id:"{}" From:"{}" To:"{}" Subject:"{}"]: {}"#,
            message.message_id,
            message.from.join(","),
            message.to.join(","),
            message.subject,
            outcome,
        ));
    }

    async fn outcome_for(&self, message: &InboundMessage) -> String {
        if message.dmarc_rejects() {
            return match self
                .bouncer
                .bounce(&self.email_domain, &message.recipients, &message.timestamp)
                .await
            {
                Ok(bounce_message_id) => {
                    format!("DMARC bounced with message ID: {bounce_message_id}")
                }
                Err(err) => format!("DMARC bounce failed: {err}"),
            };
        }

        if message.is_spam() {
            return "marked as spam, ignored".to_string();
        }

        let command = match parse_unsubscribe_command(&message.recipients, &self.email_domain) {
            Ok(command) => command,
            Err(err) => return format!("failed to parse, ignoring: {err}"),
        };
        match self.agent.unsubscribe(&command.email, &command.token).await {
            Ok(UnsubscribeOutcome::Unsubscribed) => "success".to_string(),
            Ok(other) => format!("failed: {other}"),
            Err(err) => format!("error: {err}"),
        }
    }
}
