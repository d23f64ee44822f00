use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use listguard::validate::DnsResolver;
use listguard::{
    AddressVerifier, AuditLog, FeedbackDispatcher, InboundHandler, OpsError, SubscriptionAgent,
    Suppressor, UnsubscribeOutcome, Verdict,
};

#[derive(Parser)]
#[command(name = "listguard-cli")]
#[command(about = "Validate list addresses and replay delivery-feedback notifications")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an email address against policy and live DNS.
    Validate { email: String },
    /// Process feedback notification records from stdin, one JSON record per
    /// line, printing the audit line for each (dry run: no agent backend).
    Feedback,
    /// Process inbound-mail notifications from stdin, one JSON record per
    /// line (dry run).
    Inbound {
        /// The system's own email domain, for unsubscribe recipients.
        #[arg(long, default_value = "example.org")]
        domain: String,
    },
}

/// Prints audit lines straight to stdout.
struct StdoutLog;

impl AuditLog for StdoutLog {
    fn log(&self, line: &str) {
        println!("{line}");
    }
}

/// The CLI has no suppression store; everything reads as unsuppressed and
/// writes are logged only.
struct NullSuppressor;

#[async_trait]
impl Suppressor for NullSuppressor {
    async fn is_suppressed(&self, _email: &str) -> Result<bool, OpsError> {
        Ok(false)
    }

    async fn suppress(&self, email: &str) -> Result<(), OpsError> {
        tracing::info!(email, "would suppress");
        Ok(())
    }
}

/// Logs every mutation instead of applying one.
struct DryRunAgent;

#[async_trait]
impl SubscriptionAgent for DryRunAgent {
    async fn remove(&self, email: &str) -> Result<(), OpsError> {
        tracing::info!(email, "would remove");
        Ok(())
    }

    async fn restore(&self, email: &str) -> Result<(), OpsError> {
        tracing::info!(email, "would restore");
        Ok(())
    }

    async fn unsubscribe(
        &self,
        email: &str,
        token: &str,
    ) -> Result<UnsubscribeOutcome, OpsError> {
        tracing::info!(email, token, "would unsubscribe");
        Ok(UnsubscribeOutcome::Unsubscribed)
    }
}

struct DryRunBouncer;

#[async_trait]
impl listguard::Bouncer for DryRunBouncer {
    async fn bounce(
        &self,
        email_domain: &str,
        recipients: &[String],
        timestamp: &str,
    ) -> Result<String, OpsError> {
        tracing::info!(email_domain, ?recipients, timestamp, "would bounce");
        Ok("dry-run-bounce-id".to_string())
    }
}

async fn read_stdin_records() -> Result<Vec<String>> {
    let mut records = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if !line.trim().is_empty() {
            records.push(line);
        }
    }
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Validate { email } => {
            let resolver = DnsResolver::from_system_conf()
                .context("initializing system resolver")?;
            let verifier = AddressVerifier::new(resolver, NullSuppressor);
            match verifier.verify(&email).await? {
                Verdict::Accepted => println!("{email}: accepted"),
                Verdict::Rejected(reason) => {
                    println!("{email}: rejected: {reason}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Feedback => {
            let dispatcher = FeedbackDispatcher::new(Arc::new(DryRunAgent), Arc::new(StdoutLog));
            dispatcher.handle_batch(read_stdin_records().await?).await;
        }
        Commands::Inbound { domain } => {
            let handler = InboundHandler::new(
                domain,
                Arc::new(DryRunAgent),
                Arc::new(DryRunBouncer),
                Arc::new(StdoutLog),
            );
            for record in read_stdin_records().await? {
                handler.handle(&record).await;
            }
        }
    }
    Ok(())
}
