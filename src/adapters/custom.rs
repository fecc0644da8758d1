use super::{resolve_binary, timeout, Adapter, ValidatedCommand};
use crate::config::AiConfig;
use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use std::collections::BTreeMap;

/// Any command that takes the prompt as its final argument and answers on stdout.
#[derive(Debug, Default)]
pub struct CustomAdapter;

impl Adapter for CustomAdapter {
    fn provider(&self) -> Provider {
        Provider::Custom
    }

    fn default_binary(&self) -> &'static str {
        ""
    }

    fn build_command(&self, prompt: &str, config: &AiConfig) -> AppResult<ValidatedCommand> {
        self.validate(prompt)?;
        let program = resolve_binary(self, config);
        if program.is_empty() {
            return Err(AppError::Config(
                "ai.binary is required when ai.provider is custom".to_string(),
            ));
        }
        let mut args = config.extra_args.clone();
        args.push(prompt.to_string());

        Ok(ValidatedCommand {
            program,
            args,
            env: BTreeMap::new(),
            timeout: timeout(config),
        })
    }
}
