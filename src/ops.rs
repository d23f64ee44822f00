//! Contracts for the external collaborators this crate drives: the durable
//! suppression list, the subscriber store's mutation agent, and the outbound
//! non-delivery bouncer. All persistent state lives behind these traits;
//! nothing in this crate outlives a single call.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by an external capability. The message is rendered into
/// audit lines, so implementations should keep it one line.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct OpsError {
    message: String,
}

impl OpsError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Durable record of addresses never to mail.
#[async_trait]
pub trait Suppressor: Send + Sync {
    async fn is_suppressed(&self, email: &str) -> Result<bool, OpsError>;

    async fn suppress(&self, email: &str) -> Result<(), OpsError>;
}

/// Result of an unsubscribe request against the subscriber store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotSubscribed,
    Invalid,
}

impl fmt::Display for UnsubscribeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unsubscribed => "unsubscribed",
            Self::NotSubscribed => "not subscribed",
            Self::Invalid => "invalid unsubscribe request",
        })
    }
}

/// Mutations on the subscriber store.
#[async_trait]
pub trait SubscriptionAgent: Send + Sync {
    async fn remove(&self, email: &str) -> Result<(), OpsError>;

    async fn restore(&self, email: &str) -> Result<(), OpsError>;

    async fn unsubscribe(&self, email: &str, token: &str)
        -> Result<UnsubscribeOutcome, OpsError>;
}

/// Issues an outbound non-delivery bounce. Message construction itself is the
/// implementation's concern; the returned string is the bounce message id.
#[async_trait]
pub trait Bouncer: Send + Sync {
    async fn bounce(
        &self,
        email_domain: &str,
        recipients: &[String],
        timestamp: &str,
    ) -> Result<String, OpsError>;
}
