//! Concurrent fan-out of reviewer instances and fan-in of their outcomes.

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::finding::Finding;
use crate::llm::ReviewClient;

/// Result of one reviewer instance. Failures are kept distinct from reviews
/// that simply found nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewerOutcome {
    Completed {
        instance: usize,
        temperature: f32,
        findings: Vec<Finding>,
    },
    Failed {
        instance: usize,
        temperature: f32,
        reason: String,
    },
}

impl ReviewerOutcome {
    /// 1-based launch position of the reviewer.
    pub fn instance(&self) -> usize {
        match self {
            Self::Completed { instance, .. } | Self::Failed { instance, .. } => *instance,
        }
    }

    /// Findings reported by the reviewer; empty when it failed.
    pub fn findings(&self) -> &[Finding] {
        match self {
            Self::Completed { findings, .. } => findings,
            Self::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Launch one review per temperature concurrently and wait for all of them.
///
/// Outcomes are returned in launch order. An error from one reviewer becomes a
/// [`ReviewerOutcome::Failed`] and never affects its siblings.
#[instrument(skip(client, diff), fields(reviewers = temperatures.len()))]
pub async fn run_panel(
    client: &dyn ReviewClient,
    diff: &str,
    temperatures: &[f32],
) -> Vec<ReviewerOutcome> {
    let reviews = temperatures
        .iter()
        .enumerate()
        .map(|(idx, &temperature)| async move {
            let instance = idx + 1;
            match client.review(diff, temperature).await {
                Ok(findings) => {
                    info!(instance, temperature, findings = findings.len(), "reviewer completed");
                    ReviewerOutcome::Completed {
                        instance,
                        temperature,
                        findings,
                    }
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    warn!(instance, temperature, %reason, "reviewer failed");
                    ReviewerOutcome::Failed {
                        instance,
                        temperature,
                        reason,
                    }
                }
            }
        });
    join_all(reviews).await
}
