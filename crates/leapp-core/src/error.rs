use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type IpuResult<T> = std::result::Result<T, IpuError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CommandError {
    pub command: Vec<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        write!(
            f,
            "command '{}' failed: status={} stdout='{}' stderr='{}'",
            self.command.join(" "),
            status,
            self.stdout.trim(),
            self.stderr.trim()
        )
    }
}

#[derive(Debug, Error)]
pub enum MountError {
    #[error("mount path does not exist: {}", path.display())]
    MissingPath { path: PathBuf },
    #[error("failed to prepare mount directory {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to mount {}: {source}", target.display())]
    Command {
        target: PathBuf,
        #[source]
        source: CommandError,
    },
    #[error("failed to run mount tooling for {}: {source}", target.display())]
    Spawn {
        target: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is still mounted", target.display())]
    Busy { target: PathBuf },
}

#[derive(Debug, Error)]
pub enum IpuError {
    #[error("{message}")]
    StopActorExecution {
        message: String,
        hint: Option<String>,
        details: Option<String>,
    },
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dependency resolution failed: {diagnostic}")]
    Resolution { diagnostic: String },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IpuError {
    pub fn stop(message: impl Into<String>) -> Self {
        Self::StopActorExecution {
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn stop_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::StopActorExecution {
            message: message.into(),
            hint: Some(hint.into()),
            details: None,
        }
    }

    pub fn with_details(self, extra: impl Into<String>) -> Self {
        match self {
            Self::StopActorExecution { message, hint, .. } => Self::StopActorExecution {
                message,
                hint,
                details: Some(extra.into()),
            },
            other => other,
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::StopActorExecution { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::StopActorExecution { details, .. } => details.as_deref(),
            Self::Command(err) => Some(err.stderr.as_str()),
            _ => None,
        }
    }
}
