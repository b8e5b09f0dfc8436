//! Run configuration assembled once at startup and passed to every component.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::github::GitHubSettings;
use crate::llm::LlmSettings;

/// Sampling temperatures of the reference three-reviewer panel.
pub const DEFAULT_TEMPERATURES: [f32; 3] = [0.2, 0.7, 1.0];
/// Character budget for the diff embedded in each prompt.
pub const DEFAULT_MAX_DIFF_CHARS: usize = 120_000;

/// Errors raised while assembling configuration. All of them abort the run
/// before any network call is made.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable(s): {}", .0.join(", "))]
    MissingVars(Vec<String>),
    #[error("invalid value `{value}` for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
    #[error("at least one reviewer temperature must be configured")]
    NoReviewers,
    #[error("quorum must be between 1 and the number of reviewers ({reviewers}), got {quorum}")]
    QuorumOutOfRange { quorum: usize, reviewers: usize },
}

/// Optional settings read from a configuration file. Environment variables
/// take precedence over every field here; credentials are never read from it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
    pub temperatures: Option<Vec<f32>>,
    pub quorum: Option<usize>,
    pub max_diff_chars: Option<usize>,
    pub github_api_url: Option<String>,
    pub github_server_url: Option<String>,
}

/// Everything one review run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub github: GitHubSettings,
    pub llm: LlmSettings,
    /// One reviewer instance per temperature, in launch order.
    pub temperatures: Vec<f32>,
    pub quorum: usize,
    pub max_diff_chars: usize,
}

impl RunConfig {
    const TEMPERATURES_ENV: &'static str = "CONSENSUS_REVIEW_TEMPERATURES";
    const QUORUM_ENV: &'static str = "CONSENSUS_REVIEW_QUORUM";
    const MAX_DIFF_ENV: &'static str = "CONSENSUS_REVIEW_MAX_DIFF_CHARS";

    /// Build configuration from environment variables layered over a file.
    ///
    /// Missing required variables are reported together.
    pub fn from_sources(
        vars: &HashMap<String, String>,
        file: &FileConfig,
    ) -> Result<Self, ConfigError> {
        let github = GitHubSettings::from_map(vars, file);
        let llm = LlmSettings::from_map(vars, file);
        let (github, llm) = match (github, llm) {
            (Ok(github), Ok(llm)) => (github, llm),
            (Err(ConfigError::MissingVars(mut names)), Err(ConfigError::MissingVars(more))) => {
                names.extend(more);
                return Err(ConfigError::MissingVars(names));
            }
            (Err(err), _) | (_, Err(err)) => return Err(err),
        };

        let temperatures = match env_value(vars, Self::TEMPERATURES_ENV) {
            Some(raw) => parse_temperatures(Self::TEMPERATURES_ENV, &raw)?,
            None => file
                .temperatures
                .clone()
                .unwrap_or_else(|| DEFAULT_TEMPERATURES.to_vec()),
        };
        if temperatures.is_empty() {
            return Err(ConfigError::NoReviewers);
        }
        for (idx, temperature) in temperatures.iter().enumerate() {
            validate_temperature(Self::TEMPERATURES_ENV, *temperature)?;
            if temperatures[..idx].contains(temperature) {
                return Err(ConfigError::InvalidValue {
                    name: Self::TEMPERATURES_ENV.to_string(),
                    value: temperature.to_string(),
                    reason: "temperatures must be distinct".into(),
                });
            }
        }

        let quorum = match env_value(vars, Self::QUORUM_ENV) {
            Some(raw) => parse_number(Self::QUORUM_ENV, &raw)?,
            None => file.quorum.unwrap_or(temperatures.len() / 2 + 1),
        };
        if quorum == 0 || quorum > temperatures.len() {
            return Err(ConfigError::QuorumOutOfRange {
                quorum,
                reviewers: temperatures.len(),
            });
        }

        let max_diff_chars = match env_value(vars, Self::MAX_DIFF_ENV) {
            Some(raw) => parse_number(Self::MAX_DIFF_ENV, &raw)?,
            None => file.max_diff_chars.unwrap_or(DEFAULT_MAX_DIFF_CHARS),
        };

        Ok(Self {
            github,
            llm,
            temperatures,
            quorum,
            max_diff_chars,
        })
    }
}

/// Trimmed, non-blank value of an environment variable.
pub(crate) fn env_value(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn parse_number<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw.to_string(),
            reason: err.to_string(),
        })
}

fn parse_temperatures(name: &str, raw: &str) -> Result<Vec<f32>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_number::<f32>(name, part))
        .collect()
}

fn validate_temperature(name: &str, temperature: f32) -> Result<(), ConfigError> {
    if temperature.is_finite() && (0.0..=2.0).contains(&temperature) {
        return Ok(());
    }
    Err(ConfigError::InvalidValue {
        name: name.to_string(),
        value: temperature.to_string(),
        reason: "temperature must be within 0.0..=2.0".into(),
    })
}
