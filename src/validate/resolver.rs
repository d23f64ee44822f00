//! Resolver seam for the verification chain.
//!
//! Every lookup must let the caller distinguish "the response conclusively
//! holds no records" from "the lookup itself failed". [`normalize`] is the
//! single point where that split happens for all three structurally
//! different lookups.

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};

use super::MxCandidate;

/// Why a lookup produced no usable records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// The resolver answered and the answer is empty. A normal,
    /// non-retryable negative signal.
    #[error("no records for {name}")]
    NotFound { name: String },
    /// Network or resolver failure. Must never be conflated with
    /// [`LookupError::NotFound`].
    #[error("failed to resolve {name}: {message}")]
    External { name: String, message: String },
}

impl LookupError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn external(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::External {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Forward and reverse DNS lookups consumed by the validator.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// MX records for `domain`, in resolver response order.
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxCandidate>, LookupError>;

    /// IP addresses for `host`.
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, LookupError>;

    /// Reverse (PTR) hostnames for `addr`.
    async fn lookup_addr(&self, addr: IpAddr) -> Result<Vec<String>, LookupError>;
}

/// Normalizes a raw resolver result into the [`LookupError`] contract: a
/// non-empty answer passes through, an empty answer or a no-records response
/// becomes `NotFound`, and anything else is an external fault.
pub(crate) fn normalize<T>(
    name: &str,
    result: Result<Vec<T>, ResolveError>,
) -> Result<Vec<T>, LookupError> {
    match result {
        Ok(values) if !values.is_empty() => Ok(values),
        Ok(_) => Err(LookupError::not_found(name)),
        Err(err) if is_no_records(&err) => Err(LookupError::not_found(name)),
        Err(err) => Err(LookupError::external(name, err.to_string())),
    }
}

fn is_no_records(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// Production resolver backed by the system configuration.
pub struct DnsResolver {
    inner: TokioAsyncResolver,
}

impl DnsResolver {
    pub fn from_system_conf() -> Result<Self, ResolveError> {
        Ok(Self {
            inner: TokioAsyncResolver::tokio_from_system_conf()?,
        })
    }

    pub fn new(inner: TokioAsyncResolver) -> Self {
        Self { inner }
    }
}

fn normalize_host(name: String) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxCandidate>, LookupError> {
        let result = self.inner.mx_lookup(domain).await.map(|lookup| {
            lookup
                .iter()
                .map(|mx| MxCandidate::new(normalize_host(mx.exchange().to_utf8()), mx.preference()))
                .collect()
        });
        normalize(domain, result)
    }

    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let result = self
            .inner
            .lookup_ip(host)
            .await
            .map(|lookup| lookup.iter().collect());
        normalize(host, result)
    }

    async fn lookup_addr(&self, addr: IpAddr) -> Result<Vec<String>, LookupError> {
        let result = self.inner.reverse_lookup(addr).await.map(|lookup| {
            lookup
                .iter()
                .map(|ptr| normalize_host(ptr.0.to_utf8()))
                .collect()
        });
        normalize(&addr.to_string(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_passes_through_records() {
        let out = normalize("example.com", Ok(vec![1, 2])).expect("records");
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn normalize_maps_empty_answer_to_not_found() {
        let err = normalize::<u8>("example.com", Ok(Vec::new())).expect_err("empty");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no records for example.com");
    }

    #[test]
    fn normalize_wraps_other_failures_as_external() {
        let source = ResolveError::from(ResolveErrorKind::Message("connection refused"));
        let err = normalize::<u8>("example.com", Err(source)).expect_err("external");
        assert!(!err.is_not_found());
        assert!(err.to_string().starts_with("failed to resolve example.com:"));
    }

    #[test]
    fn normalize_host_trims_root_dot_and_lowercases() {
        assert_eq!(normalize_host("Mail.EXAMPLE.com.".to_string()), "mail.example.com");
    }
}
