#![forbid(unsafe_code)]
//! listguard — trust layer for an email-list manager.
//!
//! Two entry points: [`validate::AddressVerifier`] decides whether an address
//! is safe to add to a mailing list, and [`feedback::FeedbackDispatcher`]
//! reacts to delivery-feedback notifications (bounce, complaint, reject) by
//! adjusting list membership through an external subscription agent.

pub mod address;
pub mod audit;
pub mod feedback;
pub mod inbound;
pub mod ops;
pub mod validate;

pub use address::EmailAddress;
pub use audit::{AuditLog, MemoryAuditLog, TracingAuditLog};
pub use feedback::{
    DispatchOptions, EventAction, FeedbackDispatcher, FeedbackEvent, FeedbackKind,
    RecipientOutcome, classify,
};
pub use inbound::InboundHandler;
pub use ops::{Bouncer, OpsError, SubscriptionAgent, Suppressor, UnsubscribeOutcome};
pub use validate::{AddressVerifier, Error as ValidateError, LookupError, MxCandidate, Resolver, Verdict};
