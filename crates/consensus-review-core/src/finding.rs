use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Sentinel used when a reviewer omits the file path.
pub const UNKNOWN_FILE: &str = "unknown";

/// Rule codes that mean "no convention rule applies".
const NOT_APPLICABLE_RULES: &[&str] = &["", "-", "n/a", "na", "none", "null", "not applicable"];

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```$").expect("valid fence regex")
});

/// Which numbering of a unified diff a line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Post-change (new file) numbering.
    Added,
    /// Pre-change (old file) numbering.
    Removed,
}

impl Side {
    /// Parse a side label, accepting the common diff aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "added" | "add" | "+" | "new" | "right" => Some(Self::Added),
            "removed" | "remove" | "deleted" | "-" | "old" | "left" => Some(Self::Removed),
            _ => None,
        }
    }

    /// Letter GitHub puts between the file hash and the line number in PR
    /// file anchors.
    pub fn anchor_letter(self) -> char {
        match self {
            Self::Added => 'R',
            Self::Removed => 'L',
        }
    }
}

/// Review category. Declaration order is report priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Security,
    Logic,
    Performance,
    Convention,
    /// Absent or unrecognised category; always sorted last.
    Unspecified,
}

impl Category {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "security" => Some(Self::Security),
            "logic" => Some(Self::Logic),
            "performance" | "perf" => Some(Self::Performance),
            "convention" | "style" => Some(Self::Convention),
            _ => None,
        }
    }

    /// Section heading used in rendered reports.
    pub fn title(self) -> &'static str {
        match self {
            Self::Security => "🔒 Security",
            Self::Logic => "🧠 Logic",
            Self::Performance => "⚡ Performance",
            Self::Convention => "📏 Convention",
            Self::Unspecified => "📝 Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "major" => Some(Self::Major),
            "minor" => Some(Self::Minor),
            _ => None,
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Self::Critical => "🚨",
            Self::Major => "⚠️",
            Self::Minor => "💡",
        }
    }
}

/// Line reference as reported by a reviewer.
///
/// Malformed values are kept rather than dropped so they still take part in
/// keying. The derived ordering puts numeric lines first (ascending), then raw
/// values, then missing ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Line {
    Number(u64),
    Raw(String),
    Missing,
}

impl Line {
    pub fn number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Raw(raw) => f.write_str(raw),
            Self::Missing => f.write_str("?"),
        }
    }
}

/// Identity of a finding across reviewers: `(file, line, side)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FindingKey {
    pub file: String,
    pub line: Line,
    pub side: Side,
}

/// One issue reported by one reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub file: String,
    pub line: Line,
    pub side: Side,
    pub category: Category,
    pub convention_rule: Option<String>,
    pub issue: String,
    pub severity: Severity,
}

impl Finding {
    pub fn key(&self) -> FindingKey {
        FindingKey {
            file: self.file.clone(),
            line: self.line.clone(),
            side: self.side,
        }
    }

    /// Decode one element of a `reviews` array, applying the documented field
    /// defaults. Returns `None` when the element is not a JSON object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            file: decode_file(object.get("file")),
            line: decode_line(object.get("line")),
            side: decode_side(object.get("side")),
            category: decode_category(object.get("category")),
            convention_rule: decode_rule(object.get("convention_rule")),
            issue: decode_issue(object.get("issue")),
            severity: decode_severity(object.get("severity")),
        })
    }
}

/// Reasons a reviewer payload could not be decoded at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("reviewer returned an empty payload")]
    Empty,
    #[error("reviewer payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("reviewer payload is not a JSON object")]
    NotAnObject,
    #[error("`reviews` must be an array")]
    ReviewsNotArray,
}

/// Decode a raw model response into findings.
///
/// Accepts an optional markdown code fence around the JSON and falls back to
/// relaxed JSON5 parsing before giving up.
pub fn decode_reviews(payload: &str) -> Result<Vec<Finding>, DecodeError> {
    let trimmed = strip_code_fence(payload.trim());
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(strict_err) => json5::from_str(trimmed).map_err(|relaxed_err| {
            debug!(%relaxed_err, "relaxed JSON parse also failed");
            DecodeError::InvalidJson(strict_err.to_string())
        })?,
    };
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let reviews = match object.get("reviews") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(DecodeError::ReviewsNotArray),
    };

    let mut findings = Vec::with_capacity(reviews.len());
    for (idx, item) in reviews.iter().enumerate() {
        match Finding::from_value(item) {
            Some(finding) => findings.push(finding),
            None => debug!(index = idx, "skipping non-object review entry"),
        }
    }
    Ok(findings)
}

fn strip_code_fence(input: &str) -> &str {
    CODE_FENCE
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(input)
}

fn non_blank_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn decode_file(value: Option<&Value>) -> String {
    non_blank_str(value).unwrap_or(UNKNOWN_FILE).to_string()
}

fn decode_line(value: Option<&Value>) -> Line {
    match value {
        None | Some(Value::Null) => Line::Missing,
        Some(Value::Number(n)) => {
            if let Some(line) = n.as_u64() {
                Line::Number(line)
            } else {
                match n.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                        Line::Number(f as u64)
                    }
                    _ => Line::Raw(n.to_string()),
                }
            }
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Line::Missing
            } else if let Ok(line) = trimmed.parse::<u64>() {
                Line::Number(line)
            } else {
                Line::Raw(trimmed.to_string())
            }
        }
        Some(other) => Line::Raw(other.to_string()),
    }
}

fn decode_side(value: Option<&Value>) -> Side {
    non_blank_str(value)
        .and_then(Side::parse)
        .unwrap_or(Side::Added)
}

fn decode_category(value: Option<&Value>) -> Category {
    non_blank_str(value)
        .and_then(Category::parse)
        .unwrap_or(Category::Unspecified)
}

fn decode_rule(value: Option<&Value>) -> Option<String> {
    let rule = non_blank_str(value)?;
    let lowered = rule.to_ascii_lowercase();
    if NOT_APPLICABLE_RULES.contains(&lowered.as_str()) {
        return None;
    }
    Some(rule.to_string())
}

fn decode_issue(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn decode_severity(value: Option<&Value>) -> Severity {
    non_blank_str(value)
        .and_then(Severity::parse)
        .unwrap_or(Severity::Minor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_complete_entry() {
        let findings = decode_reviews(
            r#"{"reviews":[{"file":"src/lib.rs","line":10,"side":"REMOVED","category":"security","convention_rule":"SEC-01","issue":"unchecked input","severity":"CRITICAL"}]}"#,
        )
        .unwrap();
        assert_eq!(
            findings,
            vec![Finding {
                file: "src/lib.rs".into(),
                line: Line::Number(10),
                side: Side::Removed,
                category: Category::Security,
                convention_rule: Some("SEC-01".into()),
                issue: "unchecked input".into(),
                severity: Severity::Critical,
            }]
        );
    }

    #[test]
    fn empty_object_applies_every_default() {
        let finding = Finding::from_value(&json!({})).unwrap();
        assert_eq!(finding.file, UNKNOWN_FILE);
        assert_eq!(finding.line, Line::Missing);
        assert_eq!(finding.side, Side::Added);
        assert_eq!(finding.category, Category::Unspecified);
        assert_eq!(finding.convention_rule, None);
        assert_eq!(finding.issue, "");
        assert_eq!(finding.severity, Severity::Minor);
    }

    #[test]
    fn line_values_are_coerced_or_kept_raw() {
        assert_eq!(decode_line(Some(&json!(7))), Line::Number(7));
        assert_eq!(decode_line(Some(&json!("12"))), Line::Number(12));
        assert_eq!(decode_line(Some(&json!(3.0))), Line::Number(3));
        assert_eq!(decode_line(Some(&json!("10-12"))), Line::Raw("10-12".into()));
        assert_eq!(decode_line(Some(&json!(-4))), Line::Raw("-4".into()));
        assert_eq!(decode_line(Some(&json!(true))), Line::Raw("true".into()));
        assert_eq!(decode_line(Some(&json!("  "))), Line::Missing);
        assert_eq!(decode_line(Some(&Value::Null)), Line::Missing);
    }

    #[test]
    fn non_string_file_falls_back_to_sentinel() {
        let finding = Finding::from_value(&json!({"file": 42, "line": 1})).unwrap();
        assert_eq!(finding.file, UNKNOWN_FILE);
    }

    #[test]
    fn side_aliases_and_unknown_values() {
        assert_eq!(decode_side(Some(&json!("left"))), Side::Removed);
        assert_eq!(decode_side(Some(&json!("+"))), Side::Added);
        assert_eq!(decode_side(Some(&json!("sideways"))), Side::Added);
    }

    #[test]
    fn anchor_letters_follow_diff_columns() {
        assert_eq!(Side::Added.anchor_letter(), 'R');
        assert_eq!(Side::Removed.anchor_letter(), 'L');
    }

    #[test]
    fn not_applicable_rules_become_none() {
        for raw in ["N/A", "not applicable", "None", "  ", "-"] {
            assert_eq!(decode_rule(Some(&json!(raw))), None, "rule {raw:?}");
        }
        assert_eq!(decode_rule(Some(&json!("NAME-3"))), Some("NAME-3".into()));
    }

    #[test]
    fn unknown_enums_take_defaults() {
        let finding = Finding::from_value(
            &json!({"category": "documentation", "severity": "blocker", "line": 2}),
        )
        .unwrap();
        assert_eq!(finding.category, Category::Unspecified);
        assert_eq!(finding.severity, Severity::Minor);
    }

    #[test]
    fn skips_non_object_entries() {
        let findings = decode_reviews(r#"{"reviews":["oops", 3, {"line": 5}]}"#).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Line::Number(5));
    }

    #[test]
    fn missing_or_null_reviews_mean_no_findings() {
        assert!(decode_reviews(r#"{"summary":"fine"}"#).unwrap().is_empty());
        assert!(decode_reviews(r#"{"reviews":null}"#).unwrap().is_empty());
    }

    #[test]
    fn strips_markdown_fence() {
        let payload = "```json\n{\"reviews\":[{\"line\":1}]}\n```";
        assert_eq!(decode_reviews(payload).unwrap().len(), 1);
    }

    #[test]
    fn accepts_relaxed_json() {
        let payload = "{reviews: [{line: 4, issue: 'trailing comma',},],}";
        let findings = decode_reviews(payload).unwrap();
        assert_eq!(findings[0].line, Line::Number(4));
        assert_eq!(findings[0].issue, "trailing comma");
    }

    #[test]
    fn rejects_unusable_payloads() {
        assert_eq!(decode_reviews("   "), Err(DecodeError::Empty));
        assert!(matches!(
            decode_reviews("I found no problems."),
            Err(DecodeError::InvalidJson(_))
        ));
        assert_eq!(decode_reviews("[1, 2]"), Err(DecodeError::NotAnObject));
        assert_eq!(
            decode_reviews(r#"{"reviews": "none"}"#),
            Err(DecodeError::ReviewsNotArray)
        );
    }

    #[test]
    fn line_ordering_puts_numbers_first() {
        let mut lines = vec![
            Line::Missing,
            Line::Raw("abc".into()),
            Line::Number(20),
            Line::Number(3),
        ];
        lines.sort();
        assert_eq!(
            lines,
            vec![
                Line::Number(3),
                Line::Number(20),
                Line::Raw("abc".into()),
                Line::Missing
            ]
        );
    }
}
