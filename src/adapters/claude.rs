use super::{resolve_binary, timeout, Adapter, ValidatedCommand};
use crate::config::AiConfig;
use crate::errors::AppResult;
use crate::models::Provider;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct ClaudeAdapter;

impl Adapter for ClaudeAdapter {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn default_binary(&self) -> &'static str {
        "claude"
    }

    fn build_command(&self, prompt: &str, config: &AiConfig) -> AppResult<ValidatedCommand> {
        self.validate(prompt)?;
        let mut args = vec![
            "-p".to_string(),
            prompt.to_string(),
            "--output-format".to_string(),
            "text".to_string(),
        ];
        args.extend(config.extra_args.iter().cloned());

        let mut env = BTreeMap::new();
        env.insert("CLAUDE_NON_INTERACTIVE".to_string(), "1".to_string());

        Ok(ValidatedCommand {
            program: resolve_binary(self, config),
            args,
            env,
            timeout: timeout(config),
        })
    }
}
