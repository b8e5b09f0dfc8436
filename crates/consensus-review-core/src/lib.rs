pub mod config;
pub mod consensus;
pub mod finding;
pub mod github;
pub mod llm;
pub mod panel;
pub mod pipeline;
pub mod prompt;
pub mod report;

pub use config::{ConfigError, FileConfig, RunConfig};
pub use consensus::{aggregate, aggregate_outcomes, ConsensusGroup};
pub use finding::{
    decode_reviews, Category, DecodeError, Finding, FindingKey, Line, Severity, Side, UNKNOWN_FILE,
};
pub use github::{GitHubClient, GitHubSettings};
pub use llm::{build_client, LlmSettings, NoopReviewClient, ProviderKind, ReviewClient};
pub use panel::{run_panel, ReviewerOutcome};
pub use pipeline::{run, DiffSource, FileDiffSource, Publisher, RunOutcome};
pub use report::{render_report, LinkBuilder, OutputFormat, ReportContext, NO_ISSUES_MESSAGE};
