use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by the executor, the batcher and the reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad operator argument. Nothing was sent.
    Validation,
    /// Socket-level failure, or transient failures that outlived every retry.
    Connection,
    /// Password rejected. Never retried.
    Authentication,
    /// Response text matched no classification rule, or a read-back disagreed.
    Protocol,
    /// Server reported load or the response did not arrive in time.
    ServerBusyOrTimeout,
    /// Some chunks of a bulk operation stayed unresolved.
    PartialBatchFailure,
    /// Server refused the command as unknown or malformed.
    CommandRejected,
    /// Server refused the command because it touches too many blocks.
    LimitExceeded,
}

impl ErrorKind {
    /// Whether the executor may retry the same command after this failure.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Connection | ErrorKind::ServerBusyOrTimeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Connection => "connection",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Protocol => "protocol",
            ErrorKind::ServerBusyOrTimeout => "server_busy_or_timeout",
            ErrorKind::PartialBatchFailure => "partial_batch_failure",
            ErrorKind::CommandRejected => "command_rejected",
            ErrorKind::LimitExceeded => "limit_exceeded",
        }
    }

    /// Operator-facing hint printed next to failures of this kind.
    pub fn remediation(self) -> &'static str {
        match self {
            ErrorKind::Validation => "check the argument against the accepted values listed above",
            ErrorKind::Connection => {
                "confirm the RCON endpoint is reachable and enable-rcon=true in server.properties"
            }
            ErrorKind::Authentication => "verify rcon.password matches the server configuration",
            ErrorKind::Protocol => {
                "inspect the raw response and add a classifier rule for this server's wording"
            }
            ErrorKind::ServerBusyOrTimeout => {
                "reduce max_chunk_size or raise retry.timeout_ms if the server is under load"
            }
            ErrorKind::PartialBatchFailure => {
                "re-run the operation; only the unresolved ranges listed above need another pass"
            }
            ErrorKind::CommandRejected => {
                "check the server version supports this command syntax and that the target is loaded"
            }
            ErrorKind::LimitExceeded => "lower max_chunk_size below the server's per-command block limit",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a single command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl CommandError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for CommandError {}

/// Rejected operator argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown area '{0}' (expected one of: all, wellbores, rigs)")]
    UnknownArea(String),
    #[error(
        "unknown time '{0}' (expected day, noon, sunset, night, midnight, sunrise or ticks 0..24000)"
    )]
    UnknownTime(String),
}

impl From<ValidationError> for CommandError {
    fn from(error: ValidationError) -> Self {
        CommandError::new(ErrorKind::Validation, error.to_string())
    }
}
