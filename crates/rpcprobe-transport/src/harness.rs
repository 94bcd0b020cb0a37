//! One-shot request/response exchange
//!
//! Each exchange spawns a fresh child, waits for it to be ready, writes one
//! request line, reads until a JSON-RPC response line arrives, and always
//! tears the child down before returning.

use crate::command::CommandSpec;
use crate::config::{HarnessConfig, Readiness};
use crate::error::{HarnessError, Result, WaitPhase};
use crate::process::{ChildProcess, Frame};
use rpcprobe_protocol::{MessageKind, Request, RequestId, classify, response_id, validate_response};
use serde_json::Value;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// Lifecycle of a single exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// No child yet
    NotStarted,
    /// Child spawned, exchange in flight
    Running,
    /// A response was decoded
    Completed,
    /// The exchange ended with an error
    Failed,
}

impl ExchangeState {
    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Move to `next`, unless already terminal
    pub fn advance(self, next: ExchangeState) -> ExchangeState {
        if self.is_terminal() {
            return self;
        }
        debug!(from = ?self, to = ?next, "exchange state");
        next
    }
}

/// How teardown of the child went
#[derive(Debug)]
pub enum Termination {
    /// The child was never launched
    NotStarted,
    /// The child exited and was reaped
    Exited(ExitStatus),
    /// Teardown failed; the exchange outcome is unaffected
    Failed(HarnessError),
}

/// Everything observed during one exchange
#[derive(Debug)]
pub struct ExchangeReport {
    /// Decoded response or the failure that ended the exchange
    pub outcome: Result<Value>,
    /// Terminal state
    pub state: ExchangeState,
    /// Child's OS process id, if it was launched
    pub pid: Option<u32>,
    /// Teardown result
    pub termination: Termination,
    /// Trailing stderr lines from the child
    pub stderr: Vec<String>,
    /// Wall-clock time of the whole exchange
    pub elapsed: Duration,
}

impl ExchangeReport {
    /// Drop the diagnostics and keep the outcome
    pub fn into_result(self) -> Result<Value> {
        self.outcome
    }

    /// Whether the child is known to be gone
    pub fn child_terminated(&self) -> bool {
        matches!(
            self.termination,
            Termination::Exited(_) | Termination::NotStarted
        )
    }
}

/// Runs one request/response cycle per call against a fresh child process
#[derive(Debug, Clone, Default)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    /// Create a harness with the given configuration
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Harness configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Send `request` to a freshly spawned `command` and return the response
    pub async fn run_one_shot(&self, command: &CommandSpec, request: &Request) -> Result<Value> {
        self.exchange(command, request).await.into_result()
    }

    /// Like [`Harness::run_one_shot`], but keep the diagnostics
    pub async fn exchange(&self, command: &CommandSpec, request: &Request) -> ExchangeReport {
        let started = Instant::now();
        let mut state = ExchangeState::NotStarted;

        let failed_before_launch = |err: HarnessError| ExchangeReport {
            outcome: Err(err),
            state: ExchangeState::NotStarted.advance(ExchangeState::Failed),
            pid: None,
            termination: Termination::NotStarted,
            stderr: Vec::new(),
            elapsed: started.elapsed(),
        };

        let line = match request.to_line() {
            Ok(line) => line,
            Err(e) => return failed_before_launch(e.into()),
        };

        let mut child = match ChildProcess::spawn(command, self.config.stderr_tail_lines) {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command.display(), error = %e, "launch failed");
                return failed_before_launch(e);
            }
        };
        let pid = child.pid();
        info!(pid, command = %command.display(), method = request.method(), "child launched");
        state = state.advance(ExchangeState::Running);

        let outcome = self.drive(&mut child, request, &line).await;
        state = state.advance(if outcome.is_ok() {
            ExchangeState::Completed
        } else {
            ExchangeState::Failed
        });

        let termination = match child.terminate(self.config.termination_grace).await {
            Ok(status) => Termination::Exited(status),
            Err(e) => {
                warn!(pid, error = %e, "child termination failed");
                Termination::Failed(e)
            }
        };
        let stderr = child.stderr_tail().await;
        drop(child);

        if let Err(e) = &outcome {
            debug!(pid, kind = ?e.kind(), stderr_lines = stderr.len(), "exchange failed");
        }

        ExchangeReport {
            outcome,
            state,
            pid,
            termination,
            stderr,
            elapsed: started.elapsed(),
        }
    }

    async fn drive(
        &self,
        child: &mut ChildProcess,
        request: &Request,
        line: &str,
    ) -> Result<Value> {
        self.await_ready(child).await?;

        // One deadline covers delivering the request and reading the reply
        let deadline = Instant::now() + self.config.response_timeout;

        debug!(pid = child.pid(), request = line.trim_end(), "sending request");
        timeout_at(deadline, child.send_line(line))
            .await
            .map_err(|_| HarnessError::Timeout {
                phase: WaitPhase::Write,
                waited: self.config.response_timeout,
            })??;

        self.await_response(child, request.id(), deadline).await
    }

    async fn await_ready(&self, child: &mut ChildProcess) -> Result<()> {
        match &self.config.readiness {
            Readiness::Immediate => match child.try_status() {
                Some(status) => Err(HarnessError::ChildExited {
                    status: Some(status),
                    partial: Vec::new(),
                }),
                None => Ok(()),
            },
            Readiness::StderrMarker(marker) => {
                child
                    .wait_for_marker(marker, self.config.startup_timeout)
                    .await
            }
        }
    }

    async fn await_response(
        &self,
        child: &mut ChildProcess,
        expected: &RequestId,
        deadline: Instant,
    ) -> Result<Value> {
        let max = self.config.max_line_bytes;

        loop {
            let raw = match child.read_frame(deadline, max).await {
                Frame::Line(raw) => raw,
                Frame::TimedOut => {
                    return Err(HarnessError::Timeout {
                        phase: WaitPhase::Response,
                        waited: self.config.response_timeout,
                    });
                }
                Frame::TooLong(raw) => {
                    return Err(HarnessError::decode(
                        &raw,
                        format!("line exceeds {} bytes", max),
                    ));
                }
                Frame::Eof(partial) => {
                    return Err(HarnessError::ChildExited {
                        status: child.try_status(),
                        partial,
                    });
                }
            };

            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let message: Value = serde_json::from_slice(&raw)
                .map_err(|e| HarnessError::decode(&raw, e.to_string()))?;

            match classify(&message) {
                MessageKind::Notification => {
                    let method = message.get("method");
                    debug!(pid = child.pid(), ?method, "skipping notification");
                }
                MessageKind::Request => {
                    let method = message.get("method");
                    warn!(pid = child.pid(), ?method, "ignoring request from child");
                }
                MessageKind::Response | MessageKind::Invalid => {
                    return decode_response(message, &raw, expected);
                }
            }
        }
    }
}

fn decode_response(message: Value, raw: &[u8], expected: &RequestId) -> Result<Value> {
    validate_response(&message).map_err(|e| HarnessError::decode(raw, e.to_string()))?;

    // A null id is how servers answer requests they could not parse
    if let Some(id) = response_id(&message)
        && &id != expected
    {
        return Err(HarnessError::decode(
            raw,
            format!("response id {} does not match request id {}", id, expected),
        ));
    }

    Ok(message)
}

/// Run one exchange with [`HarnessConfig::default`]
pub async fn run_one_shot(command: &CommandSpec, request: &Request) -> Result<Value> {
    Harness::default().run_one_shot(command, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_state_transitions() {
        let state = ExchangeState::NotStarted.advance(ExchangeState::Running);
        assert_eq!(state, ExchangeState::Running);
        assert!(!state.is_terminal());

        let done = state.advance(ExchangeState::Completed);
        assert!(done.is_terminal());
        assert_eq!(done.advance(ExchangeState::Failed), ExchangeState::Completed);
        assert_eq!(
            ExchangeState::Failed.advance(ExchangeState::Running),
            ExchangeState::Failed
        );
    }

    #[test]
    fn test_decode_response_accepts_matching_and_null_ids() {
        let expected = RequestId::Number(1);
        let ok = json!({"jsonrpc": "2.0", "result": {"total": 11}, "id": 1});
        let parse_error = json!({
            "jsonrpc": "2.0",
            "error": {"code": -32700, "message": "Parse error"},
            "id": null
        });

        assert_eq!(decode_response(ok.clone(), b"", &expected).unwrap(), ok);
        assert!(decode_response(parse_error, b"", &expected).is_ok());
    }

    #[test]
    fn test_decode_response_rejects_foreign_id() {
        let raw = br#"{"jsonrpc":"2.0","result":{},"id":2}"#;
        let message: Value = serde_json::from_slice(raw).unwrap();

        let err = decode_response(message, raw, &RequestId::Number(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailure);
        assert_eq!(err.raw_output(), Some(&raw[..]));
    }

    #[test]
    fn test_decode_response_rejects_bad_envelope() {
        let err = decode_response(json!({"total": 11}), b"{\"total\":11}", &RequestId::Number(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailure);
    }

    #[tokio::test]
    async fn test_launch_failure_report() {
        let harness = Harness::default();
        let request = Request::new("ping", serde_json::Map::new());
        let report = harness
            .exchange(&CommandSpec::new("/nonexistent/rpcprobe-child"), &request)
            .await;

        assert_eq!(report.state, ExchangeState::Failed);
        assert!(report.pid.is_none());
        assert!(report.child_terminated());
        assert_eq!(
            report.into_result().unwrap_err().kind(),
            ErrorKind::LaunchFailure
        );
    }
}
