/// Rubric sent to every reviewer instance. It is identical across instances so
/// that sampling temperature is the only source of variation.
const RUBRIC: &str = "You are a senior software engineer with ten years of experience. \
Review the following code change (unified diff) strictly.

Review guidelines:
1. Look first for security vulnerabilities, logic errors and performance regressions, \
then for violations of the project's coding conventions.
2. Report only concrete problems that are visible in the diff. Do not praise, summarise or \
suggest optional refactorings.
3. `line` is the line number in the new file for added or context lines (side ADDED) and \
in the old file for removed lines (side REMOVED).
4. `convention_rule` is a short rule identifier for CONVENTION findings and \"N/A\" otherwise.
5. Respond with exactly one JSON object in the format below and nothing else: \
no markdown code fences, no prose before or after it. Use an empty `reviews` array when \
there is nothing to report.";

const RESPONSE_SCHEMA: &str = r#"{
  "reviews": [
    {
      "file": "path/to/file.ext",
      "line": 42,
      "side": "ADDED|REMOVED",
      "category": "SECURITY|LOGIC|PERFORMANCE|CONVENTION",
      "convention_rule": "RULE-ID|N/A",
      "issue": "what is wrong and why",
      "severity": "CRITICAL|MAJOR|MINOR"
    }
  ]
}"#;

/// Build the review prompt for a diff.
pub fn review_prompt(diff: &str) -> String {
    format!("{RUBRIC}\n\n{RESPONSE_SCHEMA}\n\n[Diff]\n{diff}\n")
}

/// Limit a diff to `max_chars` characters, marking the cut.
pub fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "…"
}
