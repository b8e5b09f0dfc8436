//! End-to-end review run: fetch diff, fan out reviewers, aggregate, publish.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::config::RunConfig;
use crate::consensus::{aggregate_outcomes, ConsensusGroup};
use crate::llm::ReviewClient;
use crate::panel::{run_panel, ReviewerOutcome};
use crate::prompt::truncate;
use crate::report::{render_report, LinkBuilder, OutputFormat, ReportContext};

/// Where the change under review comes from.
#[async_trait]
pub trait DiffSource: Send + Sync {
    /// Unified diff text of the change.
    async fn diff(&self) -> Result<String>;

    /// Head commit of the change, when the source knows it.
    async fn head_sha(&self) -> Result<Option<String>>;
}

/// Destination of the rendered report.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, body: &str) -> Result<()>;
}

/// Diff read from a local file instead of the hosting API.
#[derive(Debug, Clone)]
pub struct FileDiffSource {
    path: PathBuf,
}

impl FileDiffSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DiffSource for FileDiffSource {
    async fn diff(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read diff from {}", self.path.display()))
    }

    async fn head_sha(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// What a run did.
#[derive(Debug)]
pub enum RunOutcome {
    /// Exactly one report was handed to the publisher.
    Published {
        report: String,
        groups: Vec<ConsensusGroup>,
        outcomes: Vec<ReviewerOutcome>,
    },
    /// The diff was empty or unavailable, so nothing was published.
    SkippedNoDiff,
}

/// Execute one review run against the given collaborators.
///
/// Reviewer failures never fail the run; a publish failure does.
#[instrument(
    skip_all,
    fields(
        repo = %config.github.repo,
        pr = config.github.pr_number,
        reviewers = config.temperatures.len()
    )
)]
pub async fn run(
    config: &RunConfig,
    source: &dyn DiffSource,
    reviewer: &dyn ReviewClient,
    publisher: &dyn Publisher,
) -> Result<RunOutcome> {
    let diff = match source.diff().await {
        Ok(diff) if !diff.trim().is_empty() => diff,
        Ok(_) => {
            warn!("diff is empty; nothing to review");
            return Ok(RunOutcome::SkippedNoDiff);
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "diff unavailable; skipping review");
            return Ok(RunOutcome::SkippedNoDiff);
        }
    };

    let head_sha = match source.head_sha().await {
        Ok(sha) => sha,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "could not read head commit; continuing without it");
            None
        }
    };

    let diff_chars = diff.chars().count();
    if diff_chars > config.max_diff_chars {
        warn!(
            diff_chars,
            limit = config.max_diff_chars,
            "diff exceeds prompt budget; truncating"
        );
    }
    let diff = truncate(&diff, config.max_diff_chars);

    let outcomes = run_panel(reviewer, &diff, &config.temperatures).await;
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    let groups = aggregate_outcomes(&outcomes, config.quorum);
    info!(
        failed_reviewers = failed,
        consensus = groups.len(),
        quorum = config.quorum,
        "aggregation finished"
    );

    let links = LinkBuilder::new(
        &config.github.server_url,
        &config.github.repo,
        config.github.pr_number,
    );
    let context = ReportContext {
        reviewers: config.temperatures.len(),
        quorum: config.quorum,
        head_sha: head_sha.as_deref(),
        links: Some(&links),
    };
    let report = render_report(&groups, &context, OutputFormat::Markdown)?;

    publisher
        .publish(&report)
        .await
        .context("failed to publish review report")?;

    Ok(RunOutcome::Published {
        report,
        groups,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, RunConfig};
    use crate::finding::{decode_reviews, Finding};
    use crate::report::NO_ISSUES_MESSAGE;
    use anyhow::bail;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn config() -> RunConfig {
        let vars: HashMap<String, String> = [
            ("GITHUB_TOKEN", "t"),
            ("GITHUB_REPO", "acme/widgets"),
            ("PR_NUMBER", "3"),
            ("CONSENSUS_REVIEW_PROVIDER", "noop"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        RunConfig::from_sources(&vars, &FileConfig::default()).unwrap()
    }

    struct StaticDiff {
        diff: Option<&'static str>,
        sha: Option<&'static str>,
    }

    #[async_trait]
    impl DiffSource for StaticDiff {
        async fn diff(&self) -> Result<String> {
            match self.diff {
                Some(diff) => Ok(diff.to_string()),
                None => bail!("404 Not Found"),
            }
        }

        async fn head_sha(&self) -> Result<Option<String>> {
            match self.sha {
                Some(sha) => Ok(Some(sha.to_string())),
                None => bail!("metadata unavailable"),
            }
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        bodies: Mutex<Vec<String>>,
        reject: bool,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, body: &str) -> Result<()> {
            if self.reject {
                bail!("403 Forbidden");
            }
            self.bodies.lock().unwrap().push(body.to_string());
            Ok(())
        }
    }

    /// Replies per temperature with a canned model payload.
    struct CannedReviewer {
        replies: Vec<(f32, &'static str)>,
        seen_diffs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReviewClient for CannedReviewer {
        async fn review(&self, diff: &str, temperature: f32) -> Result<Vec<Finding>> {
            self.seen_diffs.lock().unwrap().push(diff.to_string());
            let reply = self
                .replies
                .iter()
                .find(|(t, _)| (*t - temperature).abs() < f32::EPSILON)
                .map(|(_, reply)| *reply)
                .unwrap_or("");
            Ok(decode_reviews(reply)?)
        }
    }

    fn canned(replies: Vec<(f32, &'static str)>) -> CannedReviewer {
        CannedReviewer {
            replies,
            seen_diffs: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn publishes_majority_findings() {
        let reviewer = canned(vec![
            (
                0.2,
                r#"{"reviews":[{"file":"X.py","line":10,"side":"ADDED","category":"LOGIC","issue":"off by one","severity":"MAJOR"}]}"#,
            ),
            (
                0.7,
                r#"{"reviews":[{"file":"X.py","line":10,"side":"ADDED","category":"LOGIC","issue":"index error","severity":"CRITICAL"},{"file":"Z.py","line":1,"issue":"lonely"}]}"#,
            ),
            (1.0, r#"{"reviews":[]}"#),
        ]);
        let source = StaticDiff {
            diff: Some("diff --git a/X.py b/X.py\n"),
            sha: Some("deadbeefcafe"),
        };
        let publisher = RecordingPublisher::default();

        let outcome = run(&config(), &source, &reviewer, &publisher).await.unwrap();
        let RunOutcome::Published { report, groups, .. } = outcome else {
            panic!("expected a published report");
        };
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].vote_count, 2);
        assert!(report.contains("off by one (2/3)"));
        assert!(report.contains("⚠️"));
        assert!(!report.contains("lonely"));
        assert!(report.contains("at `deadbee`"));
        assert!(report.contains("https://github.com/acme/widgets/pull/3/files#diff-"));
        assert_eq!(publisher.bodies.lock().unwrap().as_slice(), [report]);
    }

    #[tokio::test]
    async fn failed_reviewers_do_not_sink_the_run() {
        let reviewer = canned(vec![
            (0.2, "not json at all"),
            (0.7, r#"{"reviews":[{"file":"a.rs","line":2}]}"#),
            (1.0, r#"{"reviews":[{"file":"a.rs","line":2}]}"#),
        ]);
        let source = StaticDiff {
            diff: Some("diff"),
            sha: None,
        };
        let publisher = RecordingPublisher::default();

        let outcome = run(&config(), &source, &reviewer, &publisher).await.unwrap();
        let RunOutcome::Published {
            outcomes, groups, report,
        } = outcome
        else {
            panic!("expected a published report");
        };
        assert!(outcomes[0].is_failed());
        assert_eq!(groups.len(), 1);
        assert!(!report.contains(" at `"));
    }

    #[tokio::test]
    async fn no_consensus_posts_fixed_message() {
        let reviewer = canned(vec![
            (0.2, r#"{"reviews":[]}"#),
            (0.7, r#"{"reviews":[]}"#),
            (1.0, r#"{"reviews":[]}"#),
        ]);
        let source = StaticDiff {
            diff: Some("diff"),
            sha: Some("abc"),
        };
        let publisher = RecordingPublisher::default();

        run(&config(), &source, &reviewer, &publisher).await.unwrap();
        assert_eq!(
            publisher.bodies.lock().unwrap().as_slice(),
            [NO_ISSUES_MESSAGE.to_string()]
        );
    }

    #[tokio::test]
    async fn empty_or_missing_diff_posts_nothing() {
        let reviewer = canned(vec![]);
        let publisher = RecordingPublisher::default();

        for diff in [Some("  \n"), None] {
            let source = StaticDiff { diff, sha: None };
            let outcome = run(&config(), &source, &reviewer, &publisher).await.unwrap();
            assert!(matches!(outcome, RunOutcome::SkippedNoDiff));
        }
        assert!(publisher.bodies.lock().unwrap().is_empty());
        assert!(reviewer.seen_diffs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_propagated() {
        let reviewer = canned(vec![]);
        let source = StaticDiff {
            diff: Some("diff"),
            sha: None,
        };
        let publisher = RecordingPublisher {
            reject: true,
            ..RecordingPublisher::default()
        };
        let err = run(&config(), &source, &reviewer, &publisher)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("403"));
    }

    #[tokio::test]
    async fn oversized_diff_is_truncated_for_every_reviewer() {
        let mut config = config();
        config.max_diff_chars = 4;
        let reviewer = canned(vec![]);
        let source = StaticDiff {
            diff: Some("abcdefgh"),
            sha: None,
        };
        let publisher = RecordingPublisher::default();

        run(&config, &source, &reviewer, &publisher).await.unwrap();
        let seen = reviewer.seen_diffs.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|diff| diff == "abcd…"));
    }
}
