//! Address Validation Engine.
//!
//! [`AddressVerifier::verify`] combines syntax and policy checks, a
//! suppression-list lookup, and a multi-stage DNS verification chain into a
//! single verdict:
//!
//! - parse the address and apply the static policy filters
//! - reject addresses already on the suppression list, before any DNS work
//! - resolve the domain's MX records
//! - for each MX host, in response order: resolve it to IP addresses,
//!   reverse-resolve each IP, and confirm that some reverse hostname
//!   forward-resolves back to the original IP
//!
//! The first passing MX host accepts the address. If MX resolution itself
//! comes up empty the result is inconclusive (possibly a typo or a transient
//! outage) and surfaces as [`Error`]; if MX resolution succeeded but every
//! host fails verification, the domain's mail infrastructure is presumed
//! broken or hostile, the address is suppressed, and the rejection reason
//! aggregates every failed attempt.

mod error;
mod resolver;
mod types;

pub use error::Error;
pub use resolver::{DnsResolver, LookupError, Resolver};
pub use types::{MxCandidate, Verdict};

use std::net::IpAddr;

use crate::address::{self, EmailAddress};
use crate::ops::Suppressor;

/// Validates addresses before they join a mailing list, to cut down on
/// bounces and abuse.
pub struct AddressVerifier<R, S> {
    resolver: R,
    suppressor: S,
}

impl<R: Resolver, S: Suppressor> AddressVerifier<R, S> {
    pub fn new(resolver: R, suppressor: S) -> Self {
        Self {
            resolver,
            suppressor,
        }
    }

    /// Returns the policy verdict for `address`, or [`Error`] when an
    /// external dependency left the check inconclusive.
    ///
    /// Cancellation is cooperative: dropping the returned future (for
    /// example via a caller-side timeout) abandons the chain before the
    /// suppression write, which only happens on a conclusive result.
    pub async fn verify(&self, address: &str) -> Result<Verdict, Error> {
        let email = match EmailAddress::parse(address) {
            Ok(email) => email,
            Err(err) => {
                tracing::debug!(address, error = %err, "address failed to parse");
                return Ok(Verdict::Rejected(format!(
                    "address failed to parse: {address}"
                )));
            }
        };

        if address::is_known_invalid(&email) {
            return Ok(Verdict::Rejected(format!("invalid email address: {address}")));
        }

        let canonical = email.canonical();
        let suppressed = self
            .suppressor
            .is_suppressed(&canonical)
            .await
            .map_err(|source| Error::suppression(&canonical, source))?;
        if suppressed {
            return Ok(Verdict::Rejected(format!(
                "suppressed email address: {address}"
            )));
        }

        match self.check_mail_hosts(&email).await? {
            Ok(()) => Ok(Verdict::Accepted),
            Err(reason) => Ok(Verdict::Rejected(format!(
                "address failed DNS validation: {address}: {reason}"
            ))),
        }
    }

    /// Resolves the domain's MX records and verifies its hosts.
    ///
    /// An empty or failed MX lookup could be a typo as easily as an outage,
    /// so it is inconclusive and never touches the suppression list. If MX
    /// resolution succeeded but no host verifies, sending to the address
    /// would bounce: the address is suppressed so later validation calls
    /// short-circuit at the suppression check.
    ///
    /// Note this conflates "permanently broken mail infrastructure" with "a
    /// transient outage affecting every host we tried", and can suppress a
    /// deliverable address. If the outage is network-wide the suppression
    /// write itself will likely fail too.
    async fn check_mail_hosts(&self, email: &EmailAddress) -> Result<Result<(), String>, Error> {
        let domain = email.domain();
        let candidates = match self.resolver.lookup_mx(domain).await {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => return Err(Error::mx_lookup(domain, LookupError::not_found(domain))),
            Err(source) => return Err(Error::mx_lookup(domain, source)),
        };

        let mut failures = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match self.check_mail_host(&candidate.host).await {
                Ok(()) => return Ok(Ok(())),
                Err(reason) => failures.push(format!("{}: {}", candidate.host, reason)),
            }
        }

        let canonical = email.canonical();
        if let Err(err) = self.suppressor.suppress(&canonical).await {
            tracing::warn!(email = %canonical, error = %err, "suppression write failed");
        }
        Ok(Err(format!(
            "no valid MX hosts for {domain}: {}",
            failures.join("; ")
        )))
    }

    /// One MX host passes if any of its IP addresses has a reverse hostname
    /// that resolves back to that same IP.
    async fn check_mail_host(&self, host: &str) -> Result<(), String> {
        let ips = self
            .resolver
            .lookup_host(host)
            .await
            .map_err(|err| err.to_string())?;

        let mut failures = Vec::with_capacity(ips.len());
        for ip in ips {
            match self.check_reverse_chain(ip).await {
                Ok(()) => return Ok(()),
                Err(reason) => failures.push(reason),
            }
        }
        Err(format!(
            "reverse lookup of addresses for {host} failed: {}",
            failures.join("; ")
        ))
    }

    async fn check_reverse_chain(&self, ip: IpAddr) -> Result<(), String> {
        let hosts = self
            .resolver
            .lookup_addr(ip)
            .await
            .map_err(|err| err.to_string())?;

        let mut failures = Vec::with_capacity(hosts.len());
        for host in &hosts {
            match self.check_host_resolves_to(host, ip).await {
                Ok(()) => return Ok(()),
                Err(reason) => failures.push(reason),
            }
        }
        Err(format!("no host resolves to {ip}: {}", failures.join("; ")))
    }

    async fn check_host_resolves_to(&self, host: &str, ip: IpAddr) -> Result<(), String> {
        let addrs = self
            .resolver
            .lookup_host(host)
            .await
            .map_err(|err| err.to_string())?;

        if addrs.contains(&ip) {
            return Ok(());
        }
        let listed = addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Err(format!("{host} resolves to {listed}"))
    }
}
