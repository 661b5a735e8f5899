use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classify::{Outcome, ResponseClassifier, RuleError};
use crate::config::{OpsConfig, RetryPolicy};
use crate::error::{CommandError, ErrorKind};
use crate::transport::{Connection, ConnectionState, RconTransport, Transport};
use crate::verify::{self, Expectation};

/// Everything known about one command after the executor is done with it.
/// `success == false` always comes with an `error`.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub command: String,
    pub success: bool,
    pub response: String,
    pub error: Option<CommandError>,
    /// Classified outcome of the last response, when one arrived.
    pub outcome: Option<Outcome>,
    /// Block count reported by the server, when the response carries one.
    pub changed: Option<u64>,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
    pub attempt_count: u32,
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

impl CommandResult {
    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|error| error.kind)
    }

    fn failed(command: &str, response: String, error: CommandError, started: Instant, attempts: u32) -> Self {
        Self {
            command: command.to_string(),
            success: false,
            response,
            error: Some(error),
            outcome: None,
            changed: None,
            latency: started.elapsed(),
            attempt_count: attempts,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Overrides the policy timeout for each attempt.
    pub timeout: Option<Duration>,
    /// Read-back run after a successful command; a mismatch fails the result.
    pub verify: Option<Expectation>,
}

impl ExecOptions {
    pub fn verified(expectation: Expectation) -> Self {
        Self {
            timeout: None,
            verify: Some(expectation),
        }
    }
}

/// In-process tallies for one executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorCounters {
    pub commands: u64,
    pub attempts: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    commands: AtomicU64,
    attempts: AtomicU64,
    failures: AtomicU64,
}

/// Runs single commands with timeout, retry and classification. All traffic
/// goes through one mutex-guarded connection, so at most one command is in
/// flight and concurrent callers queue.
pub struct CommandExecutor<T: Transport = RconTransport> {
    connection: Mutex<Connection<T>>,
    policy: RetryPolicy,
    classifier: ResponseClassifier,
    counters: Counters,
}

impl CommandExecutor<RconTransport> {
    /// Executor for the RCON endpoint named in `config`. No socket is opened
    /// until the first command.
    pub fn from_config(config: &OpsConfig) -> Result<Self, RuleError> {
        let transport = RconTransport::new(
            config.connection.address(),
            config.connection.password.clone(),
        );
        let classifier = ResponseClassifier::with_overrides(&config.classifier.extra_rules)?;
        Ok(Self::new(transport, config.retry.clone(), classifier))
    }
}

impl<T: Transport> CommandExecutor<T> {
    pub fn new(transport: T, policy: RetryPolicy, classifier: ResponseClassifier) -> Self {
        Self {
            connection: Mutex::new(Connection::new(transport)),
            policy,
            classifier,
            counters: Counters::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &ResponseClassifier {
        &self.classifier
    }

    pub fn counters(&self) -> ExecutorCounters {
        ExecutorCounters {
            commands: self.counters.commands.load(Ordering::Relaxed),
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.lock().await.state().clone()
    }

    /// Runs `command` with the policy timeout and no read-back.
    pub async fn run(&self, command: &str) -> CommandResult {
        self.execute(command, ExecOptions::default()).await
    }

    pub async fn execute(&self, command: &str, options: ExecOptions) -> CommandResult {
        let timeout = options.timeout.unwrap_or_else(|| self.policy.timeout());
        let mut result = self.dispatch(command, timeout).await;
        if !result.success {
            return result;
        }
        let Some(expectation) = options.verify else {
            return result;
        };

        let check = verify::read_back(self, &expectation, timeout).await;
        result.latency += check.latency;
        if !check.matched {
            let detail = match &check.error {
                Some(error) => format!("read-back for {expectation} failed: {error}"),
                None => format!(
                    "read-back expected {expectation}, observed {:?}",
                    check.observed
                ),
            };
            warn!(command, %detail, "command.verify_failed");
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            result.success = false;
            result.error = Some(CommandError::new(
                check.error.map(|e| e.kind).unwrap_or(ErrorKind::Protocol),
                detail,
            ));
        }
        result
    }

    /// The retry loop. Transient failures back off and retry; fatal ones
    /// return at once.
    pub(crate) async fn dispatch(&self, command: &str, timeout: Duration) -> CommandResult {
        let started = Instant::now();
        self.counters.commands.fetch_add(1, Ordering::Relaxed);
        let mut connection = self.connection.lock().await;
        let max_attempts = self.policy.max_attempts();

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.counters.attempts.fetch_add(1, Ordering::Relaxed);

            let (error, response) = match connection.send(command, timeout).await {
                Ok(response) => {
                    let classification = self.classifier.classify(&response);
                    match classification.outcome {
                        Outcome::Failed(kind) => {
                            let detail = match kind {
                                ErrorKind::Protocol => {
                                    format!("unrecognised response {:?}", response)
                                }
                                _ => response.trim().to_string(),
                            };
                            (CommandError::new(kind, detail), response)
                        }
                        outcome => {
                            debug!(command, attempt, %outcome, "command.ok");
                            return CommandResult {
                                command: command.to_string(),
                                success: true,
                                response,
                                error: None,
                                outcome: Some(outcome),
                                changed: classification.count,
                                latency: started.elapsed(),
                                attempt_count: attempt,
                            };
                        }
                    }
                }
                Err(err) => (CommandError::new(err.kind(), err.to_string()), String::new()),
            };

            if !error.kind.is_transient() {
                warn!(command, attempt, kind = %error.kind, detail = %error.detail, "command.failed");
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                return CommandResult::failed(command, response, error, started, attempt);
            }

            if attempt >= max_attempts {
                warn!(command, attempts = attempt, last = %error, "command.retries_exhausted");
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                let exhausted = CommandError::new(
                    ErrorKind::Connection,
                    format!("gave up after {attempt} attempts; last error {error}"),
                );
                return CommandResult::failed(command, response, exhausted, started, attempt);
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                command,
                attempt,
                kind = %error.kind,
                delay_ms = delay.as_millis() as u64,
                "command.retry"
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn close(&self) {
        self.connection.lock().await.close().await;
    }
}
