//! Backend-agnostic checks for [`StorageBackend`] implementations.
//!
//! Documents: absent loads, round trips, whole-document replacement, name
//! isolation and validation. Collections: typed access through
//! [`DurableStore`] including guarded read-modify-write. Concurrency: racing
//! writers never tear a document and locked increments are never lost.
//!
//! ```ignore
//! use relaybot_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn s3_conformance() {
//!     let report = run_conformance_suite(|| async { create_test_backend().await }).await;
//!     assert!(report.is_clean(), "{report}");
//! }
//! ```
//!
//! [`DurableStore`]: crate::DurableStore

mod collection;
mod concurrent;
mod document;

use std::fmt;
use std::future::Future;

use crate::StorageBackend;

/// One named check and what it found.
#[derive(Debug, Clone)]
pub struct Check {
    pub name: &'static str,
    pub outcome: Result<(), String>,
}

impl Check {
    fn new(name: &'static str, outcome: Result<(), String>) -> Self {
        Check { name, outcome }
    }

    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Every check from one suite run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct ConformanceReport {
    pub checks: Vec<Check>,
}

impl ConformanceReport {
    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        write!(f, "{} storage checks, {} failed", self.checks.len(), failed)?;
        for check in self.failures() {
            if let Err(msg) = &check.outcome {
                write!(f, "\n  {}: {}", check.name, msg)?;
            }
        }
        Ok(())
    }
}

/// Run every check against fresh backends produced by `factory`.
pub async fn run_conformance_suite<B, F, Fut>(factory: F) -> ConformanceReport
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let mut checks = document::run_document_tests(&factory).await;
    checks.extend(collection::run_collection_tests(&factory).await);
    checks.extend(concurrent::run_concurrent_tests(&factory).await);
    ConformanceReport { checks }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn sample_document(marker: &str) -> Vec<u8> {
    serde_json::to_vec_pretty(&serde_json::json!({
        "marker": marker,
        "items": {
            "1": {"recipient": "chat-1", "text": "hello"},
            "2": {"recipient": "chat-2", "text": "спасибо за заказ"},
        }
    }))
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_only_failures() {
        let report = ConformanceReport {
            checks: vec![
                Check::new("round_trip", Ok(())),
                Check::new("names_are_isolated", Err("saw b's bytes under a".to_string())),
            ],
        };
        assert!(!report.is_clean());
        assert_eq!(
            report.to_string(),
            "2 storage checks, 1 failed\n  names_are_isolated: saw b's bytes under a"
        );
        assert!(ConformanceReport::default().is_clean());
    }
}
