//! Outcome logging seam. Every processed notification record and inbound
//! message produces at least one line through [`AuditLog`]; downstream log
//! scraping depends on the exact format, so the line is built by the caller
//! and emitted verbatim.

use std::sync::Mutex;

pub trait AuditLog: Send + Sync {
    fn log(&self, line: &str);
}

/// Production log: emits each audit line through `tracing` under the
/// `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn log(&self, line: &str) {
        tracing::info!(target: "audit", "{line}");
    }
}

/// Captures audit lines in memory. Intended for tests and tooling that need
/// to assert on exact line content.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("audit log poisoned").clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl AuditLog for MemoryAuditLog {
    fn log(&self, line: &str) {
        self.lines.lock().expect("audit log poisoned").push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_log_captures_lines_in_order() {
        let log = MemoryAuditLog::new();
        log.log("first");
        log.log("second");
        assert_eq!(log.lines(), vec!["first", "second"]);
        assert!(log.contains("sec"));
        assert!(!log.contains("third"));
    }
}
