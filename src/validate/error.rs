use thiserror::Error;

use crate::ops::OpsError;

use super::resolver::LookupError;

/// Inconclusive validation failure. Callers must treat this as "unknown",
/// never as a rejection: retry later or leave the address unverified.
#[derive(Debug, Error)]
pub enum Error {
    #[error("suppression lookup failed for {email}: {source}")]
    Suppression {
        email: String,
        #[source]
        source: OpsError,
    },
    #[error("failed to retrieve MX records for {domain}: {source}")]
    MxLookup {
        domain: String,
        #[source]
        source: LookupError,
    },
}

impl Error {
    pub(crate) fn suppression(email: impl Into<String>, source: OpsError) -> Self {
        Self::Suppression {
            email: email.into(),
            source,
        }
    }

    pub(crate) fn mx_lookup(domain: impl Into<String>, source: LookupError) -> Self {
        Self::MxLookup {
            domain: domain.into(),
            source,
        }
    }
}
