/// Policy decision for one address. Infrastructure faults are reported
/// through [`super::Error`] instead, so a rejection is always conclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Self::Accepted => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

/// One MX record from the resolver response. Response order is preserved and
/// defines the verification attempt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxCandidate {
    pub host: String,
    pub priority: u16,
}

impl MxCandidate {
    pub fn new(host: impl Into<String>, priority: u16) -> Self {
        Self {
            host: host.into(),
            priority,
        }
    }
}
