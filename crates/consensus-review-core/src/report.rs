use std::fmt::Write;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::consensus::ConsensusGroup;
use crate::finding::{Category, FindingKey, Side, UNKNOWN_FILE};

/// Comment posted when no finding reaches quorum.
pub const NO_ISSUES_MESSAGE: &str = "## ✅ Consensus code review complete\n\nNo issue was reported by enough independent reviewers to reach consensus.\n";

/// Format styles supported by [`render_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Json,
}

/// Builds deep links into the "Files changed" view of a pull request.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base: String,
}

impl LinkBuilder {
    pub fn new(server_url: &str, repo: &str, pr_number: u64) -> Self {
        Self {
            base: format!(
                "{}/{}/pull/{}/files",
                server_url.trim_end_matches('/'),
                repo,
                pr_number
            ),
        }
    }

    /// Anchor for a diff location, or `None` when the location cannot be linked.
    pub fn link(&self, key: &FindingKey) -> Option<String> {
        let line = key.line.number()?;
        if key.file == UNKNOWN_FILE {
            return None;
        }
        let digest = hex::encode(Sha256::digest(key.file.as_bytes()));
        Some(format!(
            "{}#diff-{}{}{}",
            self.base,
            digest,
            key.side.anchor_letter(),
            line
        ))
    }
}

/// Run details shown alongside the findings.
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    pub reviewers: usize,
    pub quorum: usize,
    pub head_sha: Option<&'a str>,
    pub links: Option<&'a LinkBuilder>,
}

/// Order groups by category priority, then file, line and side.
pub fn sort_groups(groups: &mut [ConsensusGroup]) {
    groups.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.key.file.cmp(&b.key.file))
            .then_with(|| a.key.line.cmp(&b.key.line))
            .then_with(|| a.key.side.cmp(&b.key.side))
    });
}

/// Render consensus groups in the requested format. Groups may be in any order.
pub fn render_report(
    groups: &[ConsensusGroup],
    context: &ReportContext<'_>,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let mut sorted = groups.to_vec();
    sort_groups(&mut sorted);
    match format {
        OutputFormat::Markdown => render_markdown(&sorted, context),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonReport {
            reviewers: context.reviewers,
            quorum: context.quorum,
            head_sha: context.head_sha,
            findings: &sorted,
        })?),
    }
}

fn render_markdown(
    sorted: &[ConsensusGroup],
    context: &ReportContext<'_>,
) -> anyhow::Result<String> {
    if sorted.is_empty() {
        return Ok(NO_ISSUES_MESSAGE.to_string());
    }

    let mut out = String::new();
    writeln!(out, "## 🤖 Consensus code review")?;
    writeln!(out)?;
    let commit = context
        .head_sha
        .map(|sha| format!(" at `{}`", short_sha(sha)))
        .unwrap_or_default();
    writeln!(
        out,
        "> {} independent reviewers examined this change{}. Only findings reported by at least {} of them are listed.",
        context.reviewers, commit, context.quorum
    )?;

    let mut current: Option<Category> = None;
    for group in sorted {
        if current != Some(group.category) {
            writeln!(out)?;
            writeln!(out, "### {}", group.category.title())?;
            writeln!(out)?;
            current = Some(group.category);
        }
        writeln!(out, "{}", render_line(group, context))?;
    }
    Ok(out)
}

fn render_line(group: &ConsensusGroup, context: &ReportContext<'_>) -> String {
    let badge = group
        .convention_rule
        .as_deref()
        .map(|rule| format!(" `[{rule}]`"))
        .unwrap_or_default();
    let location = code_span(&format!("{}:{}", group.key.file, group.key.line));
    let location = match context.links.and_then(|links| links.link(&group.key)) {
        Some(url) => format!("[{location}]({url})"),
        None => location,
    };
    let side = match group.key.side {
        Side::Added => "",
        Side::Removed => " (removed line)",
    };
    let issue = single_line(&group.issue);
    let issue = if issue.is_empty() {
        "(no description provided)".to_string()
    } else {
        issue
    };
    format!(
        "- {glyph}{badge} {location}{side}: {issue} ({votes}/{reviewers})",
        glyph = group.severity.glyph(),
        votes = group.vote_count,
        reviewers = context.reviewers,
    )
}

fn single_line(input: &str) -> String {
    input
        .split(|c: char| c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Inline code span whose fence is longer than any backtick run in `text`.
fn code_span(text: &str) -> String {
    let longest_run = text
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run + 1);
    if longest_run > 0 {
        format!("{fence} {text} {fence}")
    } else {
        format!("{fence}{text}{fence}")
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    reviewers: usize,
    quorum: usize,
    head_sha: Option<&'a str>,
    findings: &'a [ConsensusGroup],
}
