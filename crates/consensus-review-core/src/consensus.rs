//! Majority-vote aggregation of independent reviewer findings.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::finding::{Category, Finding, FindingKey, Severity};
use crate::panel::ReviewerOutcome;

/// Findings from several reviewers that share one [`FindingKey`].
///
/// The reported fields come from the first finding with this key in reviewer
/// launch order; sibling findings only contribute votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusGroup {
    pub key: FindingKey,
    pub vote_count: usize,
    pub issue: String,
    pub severity: Severity,
    pub category: Category,
    pub convention_rule: Option<String>,
}

struct Tally<'a> {
    representative: &'a Finding,
    votes: usize,
}

/// Merge per-reviewer finding lists and keep keys reported at least `quorum` times.
///
/// Lists must be given in reviewer launch order. Every occurrence counts as a
/// vote, including repeats of the same key within one list. The result is in
/// first-seen order, which callers must not rely on.
pub fn aggregate(finding_lists: &[Vec<Finding>], quorum: usize) -> Vec<ConsensusGroup> {
    let mut order: Vec<FindingKey> = Vec::new();
    let mut tallies: HashMap<FindingKey, Tally<'_>> = HashMap::new();

    for finding in finding_lists.iter().flatten() {
        let key = finding.key();
        match tallies.get_mut(&key) {
            Some(tally) => {
                tally.votes += 1;
                note_disagreement(tally.representative, finding);
            }
            None => {
                order.push(key.clone());
                tallies.insert(
                    key,
                    Tally {
                        representative: finding,
                        votes: 1,
                    },
                );
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| {
            let tally = tallies.remove(&key)?;
            if tally.votes < quorum {
                return None;
            }
            let rep = tally.representative;
            Some(ConsensusGroup {
                key,
                vote_count: tally.votes,
                issue: rep.issue.clone(),
                severity: rep.severity,
                category: rep.category,
                convention_rule: rep.convention_rule.clone(),
            })
        })
        .collect()
}

/// Aggregate tagged reviewer outcomes; failed reviewers contribute no findings.
pub fn aggregate_outcomes(outcomes: &[ReviewerOutcome], quorum: usize) -> Vec<ConsensusGroup> {
    let lists: Vec<Vec<Finding>> = outcomes
        .iter()
        .map(|outcome| outcome.findings().to_vec())
        .collect();
    aggregate(&lists, quorum)
}

// Disagreements are not reconciled: the first reviewer's opinion is reported.
fn note_disagreement(representative: &Finding, sibling: &Finding) {
    if representative.severity != sibling.severity || representative.category != sibling.category
    {
        debug!(
            file = %representative.file,
            line = %representative.line,
            kept_severity = ?representative.severity,
            other_severity = ?sibling.severity,
            kept_category = ?representative.category,
            other_category = ?sibling.category,
            "reviewers agree on location but disagree on classification"
        );
    }
}
