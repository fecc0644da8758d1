use crate::adapters::{adapter_for, Adapter, ValidatedCommand};
use crate::config::AiConfig;
use crate::errors::{AppError, AppResult, InvocationFailure};
use crate::harness::cli_missing::detect_cli_missing;
use crate::models::Provider;
use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use wait_timeout::ChildExt;

const MAX_STDERR_CHARS: usize = 2_000;

/// Sends one prompt to an external model and returns its cleaned answer.
pub trait AiInvoker: Send + Sync {
    fn invoke(&self, prompt: &str) -> AppResult<String>;

    fn provider(&self) -> Option<Provider> {
        None
    }
}

pub struct CliInvoker {
    adapter: Box<dyn Adapter>,
    config: AiConfig,
}

impl CliInvoker {
    pub fn new(config: AiConfig) -> Self {
        Self {
            adapter: adapter_for(config.provider),
            config,
        }
    }
}

impl AiInvoker for CliInvoker {
    fn invoke(&self, prompt: &str) -> AppResult<String> {
        let command = self.adapter.build_command(prompt, &self.config)?;
        let provider = self.adapter.provider().as_str();
        let started = Instant::now();
        tracing::info!(
            provider,
            program = %command.program,
            timeout_secs = command.timeout.as_secs(),
            prompt_chars = prompt.len(),
            "invoking AI CLI"
        );

        let output = run_command(&command)?;
        if !output.status.success() {
            if let Some(reason) = detect_cli_missing(output.status.code(), &output.stderr) {
                return Err(AppError::invocation(
                    InvocationFailure::CliMissing,
                    format!("{} CLI not available: {}", provider, reason),
                ));
            }
            let code = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(AppError::invocation(
                InvocationFailure::NonzeroExit,
                format!("'{}' exited with {}: {}", command.program, code, truncate(output.stderr.trim())),
            ));
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| {
            AppError::invocation(InvocationFailure::MalformedOutput, "stdout is not valid UTF-8")
        })?;
        let cleaned = self.adapter.clean_output(&stdout);
        if cleaned.is_empty() {
            return Err(AppError::invocation(
                InvocationFailure::MalformedOutput,
                format!("'{}' produced no answer", command.program),
            ));
        }

        tracing::info!(
            provider,
            elapsed_ms = started.elapsed().as_millis() as u64,
            response_chars = cleaned.len(),
            "AI CLI answered"
        );
        Ok(cleaned)
    }

    fn provider(&self) -> Option<Provider> {
        Some(self.adapter.provider())
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Runs the command with both pipes drained on their own threads. On timeout
/// the child is killed and reaped; readers still blocked on inherited pipes
/// are left to finish on their own.
pub fn run_command(command: &ValidatedCommand) -> AppResult<CommandOutput> {
    let spawned = Command::new(&command.program)
        .args(&command.args)
        .envs(&command.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(AppError::invocation(
                InvocationFailure::CliMissing,
                format!("'{}' was not found on PATH", command.program),
            ));
        }
        Err(error) => {
            return Err(AppError::invocation(
                InvocationFailure::Spawn,
                format!("failed to start '{}': {}", command.program, error),
            ));
        }
    };

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let status = match child.wait_timeout(command.timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(program = %command.program, timeout_secs = command.timeout.as_secs(), "AI CLI timed out");
            return Err(AppError::invocation(
                InvocationFailure::Timeout,
                format!(
                    "'{}' did not answer within {}s",
                    command.program,
                    command.timeout.as_secs()
                ),
            ));
        }
        Err(error) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::invocation(
                InvocationFailure::Spawn,
                format!("failed waiting on '{}': {}", command.program, error),
            ));
        }
    };

    Ok(CommandOutput {
        status,
        stdout: join_reader(stdout_reader),
        stderr: String::from_utf8_lossy(&join_reader(stderr_reader)).into_owned(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    source.map(|mut source| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = source.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join_reader(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_STDERR_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_STDERR_CHARS).collect();
    truncated.push_str("...");
    truncated
}
