mod gemini;
mod openai;
mod settings;

use anyhow::Result;
use async_trait::async_trait;

use crate::finding::Finding;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use settings::{LlmSettings, ProviderKind};

/// A single reviewer: asks a model to review a diff at a given temperature.
///
/// Implementations return an error for any transport, status or decoding
/// failure; isolating those failures is the caller's job.
#[async_trait]
pub trait ReviewClient: Send + Sync {
    async fn review(&self, diff: &str, temperature: f32) -> Result<Vec<Finding>>;
}

/// Reviewer that never reports anything, used for dry runs without a model.
#[derive(Debug, Default, Clone)]
pub struct NoopReviewClient;

#[async_trait]
impl ReviewClient for NoopReviewClient {
    async fn review(&self, _diff: &str, _temperature: f32) -> Result<Vec<Finding>> {
        Ok(Vec::new())
    }
}

/// Construct the reviewer client selected by `settings.provider`.
pub fn build_client(settings: &LlmSettings) -> Result<Box<dyn ReviewClient>> {
    match settings.provider {
        ProviderKind::Gemini => Ok(Box::new(GeminiClient::new(settings)?)),
        ProviderKind::OpenAi => Ok(Box::new(OpenAiClient::new(settings)?)),
        ProviderKind::Noop => Ok(Box::new(NoopReviewClient)),
    }
}

const USER_AGENT: &str = concat!("consensus-review/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 120;
