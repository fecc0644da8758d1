use super::{resolve_binary, timeout, Adapter, ValidatedCommand};
use crate::config::AiConfig;
use crate::errors::AppResult;
use crate::models::Provider;
use std::collections::BTreeMap;

/// Status lines the gemini CLI prints on stdout ahead of the answer.
static BANNER_LINES: &[&str] = &[
    "YOLO mode is enabled",
    "Loaded cached credentials",
    "Hook registry initialized",
    "All tool calls will be automatically approved",
];

#[derive(Debug, Default)]
pub struct GeminiAdapter;

impl Adapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn default_binary(&self) -> &'static str {
        "gemini"
    }

    fn build_command(&self, prompt: &str, config: &AiConfig) -> AppResult<ValidatedCommand> {
        self.validate(prompt)?;
        let mut args = vec!["-y".to_string()];
        args.extend(config.extra_args.iter().cloned());
        args.push("-p".to_string());
        args.push(prompt.to_string());

        Ok(ValidatedCommand {
            program: resolve_binary(self, config),
            args,
            env: BTreeMap::new(),
            timeout: timeout(config),
        })
    }

    fn clean_output(&self, raw: &str) -> String {
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .filter(|line| !BANNER_LINES.iter().any(|banner| line.contains(banner)))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}
