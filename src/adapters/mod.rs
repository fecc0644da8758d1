pub mod claude;
pub mod custom;
pub mod gemini;

use crate::config::AiConfig;
use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ValidatedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

pub trait Adapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Program name used when the config does not override `ai.binary`.
    fn default_binary(&self) -> &'static str;

    fn validate(&self, prompt: &str) -> AppResult<()> {
        if prompt.trim().is_empty() {
            return Err(AppError::validation("prompt", "", "prompt cannot be empty"));
        }
        Ok(())
    }

    fn build_command(&self, prompt: &str, config: &AiConfig) -> AppResult<ValidatedCommand>;

    /// Strips provider chatter from stdout before JSON extraction.
    fn clean_output(&self, raw: &str) -> String {
        raw.trim().to_string()
    }
}

pub fn adapter_for(provider: Provider) -> Box<dyn Adapter> {
    match provider {
        Provider::Gemini => Box::new(gemini::GeminiAdapter),
        Provider::Claude => Box::new(claude::ClaudeAdapter),
        Provider::Custom => Box::new(custom::CustomAdapter),
    }
}

pub(crate) fn resolve_binary(adapter: &dyn Adapter, config: &AiConfig) -> String {
    config
        .binary
        .as_deref()
        .map(str::trim)
        .filter(|binary| !binary.is_empty())
        .unwrap_or(adapter.default_binary())
        .to_string()
}

pub(crate) fn timeout(config: &AiConfig) -> Duration {
    Duration::from_secs(config.timeout_secs)
}
