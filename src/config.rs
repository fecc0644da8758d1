use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "portfolio.db";
const MIN_AI_TIMEOUT_SECS: u64 = 5;
const MAX_AI_TIMEOUT_SECS: u64 = 1_800;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: Provider,
    /// Program to run instead of the provider's default binary name.
    pub binary: Option<String>,
    pub extra_args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            binary: None,
            extra_args: Vec::new(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub policy: Policy,
    pub ai: AiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            policy: Policy::default(),
            ai: AiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads a YAML config file. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_yaml(&raw)?
            }
            Some(path) => {
                tracing::info!(path = %path.display(), "config file not found; using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.policy.validate()?;
        if !(MIN_AI_TIMEOUT_SECS..=MAX_AI_TIMEOUT_SECS).contains(&self.ai.timeout_secs) {
            return Err(AppError::Config(format!(
                "ai.timeout_secs must be between {} and {}",
                MIN_AI_TIMEOUT_SECS, MAX_AI_TIMEOUT_SECS
            )));
        }
        if self.ai.provider == Provider::Custom && self.ai.binary.is_none() {
            return Err(AppError::Config(
                "ai.binary is required when ai.provider is custom".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
