use serde::Serialize;
use thiserror::Error;

/// Why the external AI command did not produce usable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationFailure {
    CliMissing,
    Spawn,
    NonzeroExit,
    Timeout,
    MalformedOutput,
}

impl InvocationFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CliMissing => "CLI_MISSING",
            Self::Spawn => "SPAWN",
            Self::NonzeroExit => "NONZERO_EXIT",
            Self::Timeout => "TIMEOUT",
            Self::MalformedOutput => "MALFORMED_OUTPUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Storage,
    AiInvocation(InvocationFailure),
    AiSchema,
    NotFound,
    Config,
    Io,
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("VALIDATION_FAILED: {field}: {message} (received: {value})")]
    Validation {
        field: String,
        value: String,
        message: String,
    },
    #[error("STORAGE_FAILURE: {0}")]
    Storage(String),
    #[error("AI_INVOCATION_FAILED[{}]: {message}", .kind.as_str())]
    AiInvocation {
        kind: InvocationFailure,
        message: String,
    },
    #[error("AI_SCHEMA_FAILURE: {message}")]
    AiSchema { message: String, errors: Vec<String> },
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, value: impl ToString, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            value: value.to_string(),
            message: message.into(),
        }
    }

    pub fn invocation(kind: InvocationFailure, message: impl Into<String>) -> Self {
        Self::AiInvocation {
            kind,
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self::AiSchema {
            message: message.into(),
            errors,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Storage(_) => ErrorKind::Storage,
            Self::AiInvocation { kind, .. } => ErrorKind::AiInvocation(*kind),
            Self::AiSchema { .. } => ErrorKind::AiSchema,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// AI failures can be retried, or the caller can fall back to the manual prompt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::AiInvocation(_) | ErrorKind::AiSchema)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
