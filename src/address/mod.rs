//! Email address parsing and static policy filters.
//!
//! Parsing accepts a pragmatic RFC 5322 subset: an optional display name in
//! `Name <addr>` form, an atext-or-quoted local part, and either a hostname
//! (normalized through IDNA), a bracketed address literal, or a bare IP
//! literal as the domain. Literal domains parse successfully so the policy
//! layer can reject them with a user-facing reason instead of a parse error.

use std::fmt;
use std::net::IpAddr;

use phf::phf_set;
use thiserror::Error;

/// A syntactically valid email address, decomposed into local part and
/// domain. The canonical string form round-trips the parse: local part
/// verbatim, domain lowercased ASCII.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    local: String,
    domain: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("address is empty")]
    Empty,
    #[error("address length {0} > 254")]
    TooLong(usize),
    #[error("must contain a local part and a domain separated by '@'")]
    MissingSeparator,
    #[error("invalid local part")]
    InvalidLocal,
    #[error("invalid domain: {0}")]
    InvalidDomain(String),
}

impl EmailAddress {
    /// Parses `input`, stripping any display name and normalizing the domain.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }

        let bare = strip_display_name(trimmed);
        if bare.len() > 254 {
            return Err(ParseError::TooLong(bare.len()));
        }

        let (local, domain) = bare
            .rsplit_once('@')
            .ok_or(ParseError::MissingSeparator)?;

        if local.is_empty() || local.len() > 64 || !is_valid_local(local) {
            return Err(ParseError::InvalidLocal);
        }

        let domain = normalize_domain(domain)?;
        Ok(Self {
            local: local.to_string(),
            domain,
        })
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The canonical `local@domain` form used for suppression lookups and
    /// subscriber records.
    pub fn canonical(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

fn strip_display_name(input: &str) -> &str {
    if let Some(start) = input.rfind('<') {
        if let Some(inner) = input[start + 1..].strip_suffix('>') {
            return inner;
        }
    }
    input
}

/// atext ASCII plus '.' (not leading, trailing, or doubled), or a simple
/// quoted string.
fn is_valid_local(s: &str) -> bool {
    if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        return true;
    }
    if s.starts_with('.') || s.ends_with('.') || s.contains("..") {
        return false;
    }
    s.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || matches!(
                c,
                '!' | '#'
                    | '$'
                    | '%'
                    | '&'
                    | '\''
                    | '*'
                    | '+'
                    | '-'
                    | '/'
                    | '='
                    | '?'
                    | '^'
                    | '_'
                    | '`'
                    | '{'
                    | '|'
                    | '}'
                    | '~'
                    | '.'
            )
    })
}

/// Validates the domain and returns its lowercased ASCII form. Bracketed
/// address literals and bare IP literals pass through untouched; the policy
/// filter rejects them downstream.
fn normalize_domain(domain: &str) -> Result<String, ParseError> {
    if domain.is_empty() {
        return Err(ParseError::InvalidDomain("empty".to_string()));
    }
    if domain.starts_with('[') && domain.ends_with(']') {
        return Ok(domain.to_string());
    }
    if domain.parse::<IpAddr>().is_ok() {
        return Ok(domain.to_string());
    }

    let ascii = idna::domain_to_ascii(domain)
        .map_err(|_| ParseError::InvalidDomain("punycode conversion failed".to_string()))?;
    if ascii.is_empty() {
        return Err(ParseError::InvalidDomain(
            "empty after IDNA conversion".to_string(),
        ));
    }

    for label in ascii.split('.') {
        if label.is_empty() {
            return Err(ParseError::InvalidDomain("empty label".to_string()));
        }
        if label.len() > 63 {
            return Err(ParseError::InvalidDomain(format!(
                "label '{label}' length {} > 63",
                label.len()
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ParseError::InvalidDomain(format!(
                "label '{label}' cannot start/end with '-'"
            )));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ParseError::InvalidDomain(format!(
                "label '{label}' has invalid chars"
            )));
        }
    }
    Ok(ascii)
}

/// Role accounts that should never join a mailing list.
static DENIED_LOCAL_PARTS: phf::Set<&'static str> = phf_set! {
    "postmaster",
    "abuse",
};

static DENIED_DOMAINS: phf::Set<&'static str> = phf_set! {
    "localhost",
    "example.com",
};

/// Static policy filter: deny-listed local part (after stripping any `+tag`
/// suffix), address-literal domains, and deny-listed domains, checked against
/// both the full domain and its primary (last two labels) form.
pub fn is_known_invalid(address: &EmailAddress) -> bool {
    let base_local = address
        .local()
        .split('+')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let domain = address.domain();

    DENIED_LOCAL_PARTS.contains(base_local.as_str())
        || domain.starts_with('[')
        || domain.parse::<IpAddr>().is_ok()
        || DENIED_DOMAINS.contains(domain)
        || DENIED_DOMAINS.contains(primary_domain(domain))
}

fn primary_domain(domain: &str) -> &str {
    match domain.rmatch_indices('.').nth(1) {
        Some((i, _)) => &domain[i + 1..],
        None => domain,
    }
}
