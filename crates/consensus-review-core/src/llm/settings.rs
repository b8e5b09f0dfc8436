use std::collections::HashMap;

use crate::config::{env_value, parse_number, ConfigError, FileConfig};

/// Supported reviewer backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    /// Offline reviewer that never reports anything.
    Noop,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Some(Self::Gemini),
            "openai" => Some(Self::OpenAi),
            "noop" | "none" => Some(Self::Noop),
            _ => None,
        }
    }

    /// Environment variable holding this provider's API credential.
    pub fn credential_env(self) -> Option<&'static str> {
        match self {
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Noop => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Noop => "noop",
        }
    }
}

/// Settings shared by every reviewer client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl LlmSettings {
    const PROVIDER_ENV: &'static str = "CONSENSUS_REVIEW_PROVIDER";
    const ENDPOINT_ENV: &'static str = "CONSENSUS_REVIEW_ENDPOINT";
    const MODEL_ENV: &'static str = "CONSENSUS_REVIEW_MODEL";
    const TIMEOUT_ENV: &'static str = "CONSENSUS_REVIEW_TIMEOUT_SECS";

    /// Resolve reviewer settings.
    ///
    /// * `CONSENSUS_REVIEW_PROVIDER`: `gemini` (default), `openai` or `noop`.
    /// * `GEMINI_API_KEY` / `OPENAI_API_KEY`: credential for the chosen provider.
    /// * `CONSENSUS_REVIEW_ENDPOINT`, `CONSENSUS_REVIEW_MODEL`,
    ///   `CONSENSUS_REVIEW_TIMEOUT_SECS`: optional overrides.
    pub fn from_map(
        vars: &HashMap<String, String>,
        file: &FileConfig,
    ) -> Result<Self, ConfigError> {
        let provider = match env_value(vars, Self::PROVIDER_ENV).or_else(|| file.provider.clone())
        {
            Some(raw) => ProviderKind::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                name: Self::PROVIDER_ENV.to_string(),
                value: raw.clone(),
                reason: "expected one of gemini, openai, noop".into(),
            })?,
            None => ProviderKind::Gemini,
        };

        let api_key = match provider.credential_env() {
            Some(name) => env_value(vars, name)
                .ok_or_else(|| ConfigError::MissingVars(vec![name.to_string()]))?,
            None => String::new(),
        };

        let timeout_secs = match env_value(vars, Self::TIMEOUT_ENV) {
            Some(raw) => Some(parse_number(Self::TIMEOUT_ENV, &raw)?),
            None => file.timeout_secs,
        };

        Ok(Self {
            provider,
            api_key,
            endpoint: env_value(vars, Self::ENDPOINT_ENV).or_else(|| file.endpoint.clone()),
            model: env_value(vars, Self::MODEL_ENV).or_else(|| file.model.clone()),
            timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_gemini_provider() {
        let settings =
            LlmSettings::from_map(&vars(&[("GEMINI_API_KEY", "secret")]), &FileConfig::default())
                .expect("should load settings");
        assert_eq!(settings.provider, ProviderKind::Gemini);
        assert_eq!(settings.api_key, "secret");
        assert!(settings.endpoint.is_none());
        assert!(settings.model.is_none());
        assert!(settings.timeout_secs.is_none());
    }

    #[test]
    fn errors_when_api_key_missing() {
        let err = LlmSettings::from_map(
            &vars(&[("CONSENSUS_REVIEW_PROVIDER", "openai")]),
            &FileConfig::default(),
        )
        .expect_err("missing API key should error");
        assert_eq!(err, ConfigError::MissingVars(vec!["OPENAI_API_KEY".into()]));
    }

    #[test]
    fn noop_provider_allows_missing_key() {
        let settings = LlmSettings::from_map(
            &vars(&[("CONSENSUS_REVIEW_PROVIDER", "noop")]),
            &FileConfig::default(),
        )
        .expect("noop should not require key");
        assert_eq!(settings.provider, ProviderKind::Noop);
        assert!(settings.api_key.is_empty());
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = LlmSettings::from_map(
            &vars(&[("CONSENSUS_REVIEW_PROVIDER", "parrot")]),
            &FileConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("CONSENSUS_REVIEW_PROVIDER"));
    }

    #[test]
    fn file_values_fill_gaps_and_env_wins() {
        let file = FileConfig {
            provider: Some("openai".into()),
            model: Some("file-model".into()),
            timeout_secs: Some(10),
            ..FileConfig::default()
        };
        let settings = LlmSettings::from_map(
            &vars(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("CONSENSUS_REVIEW_MODEL", "env-model"),
            ]),
            &file,
        )
        .unwrap();
        assert_eq!(settings.provider, ProviderKind::OpenAi);
        assert_eq!(settings.model.as_deref(), Some("env-model"));
        assert_eq!(settings.timeout_secs, Some(10));
    }

    #[test]
    fn parses_timeout() {
        let settings = LlmSettings::from_map(
            &vars(&[
                ("GEMINI_API_KEY", "secret"),
                ("CONSENSUS_REVIEW_TIMEOUT_SECS", "45"),
            ]),
            &FileConfig::default(),
        )
        .unwrap();
        assert_eq!(settings.timeout_secs, Some(45));
    }
}
