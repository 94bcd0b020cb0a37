//! Harness configuration

use std::time::Duration;
use tracing::warn;

/// How the harness decides the child is ready for its request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Readiness {
    /// No explicit signal; the stdin pipe buffers the request until the child
    /// reads it, and the response deadline bounds the whole exchange.
    #[default]
    Immediate,

    /// Wait for a stderr line containing this text (e.g. "running on stdio").
    StderrMarker(String),
}

/// Configuration for a one-shot exchange
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Upper bound on the readiness wait
    pub startup_timeout: Duration,

    /// Upper bound on waiting for the response line, measured from the write
    pub response_timeout: Duration,

    /// Time allowed between SIGTERM and SIGKILL during teardown
    pub termination_grace: Duration,

    /// Readiness policy
    pub readiness: Readiness,

    /// Longest stdout line accepted, newline included
    pub max_line_bytes: usize,

    /// Number of trailing stderr lines kept for diagnostics
    pub stderr_tail_lines: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(10),
            termination_grace: Duration::from_secs(2),
            readiness: Readiness::Immediate,
            max_line_bytes: 1024 * 1024,
            stderr_tail_lines: 64,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    ///
    /// This will look for:
    /// - `RPCPROBE_RESPONSE_TIMEOUT_MS` for the response deadline
    /// - `RPCPROBE_STARTUP_TIMEOUT_MS` for the readiness deadline
    /// - `RPCPROBE_TERMINATION_GRACE_MS` for the SIGTERM grace period
    /// - `RPCPROBE_READY_MARKER` for a stderr readiness marker
    /// - `RPCPROBE_MAX_LINE_BYTES` for the stdout line limit
    ///
    /// Unset variables keep their defaults; unparseable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, "RPCPROBE_RESPONSE_TIMEOUT_MS") {
            config.response_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "RPCPROBE_STARTUP_TIMEOUT_MS") {
            config.startup_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "RPCPROBE_TERMINATION_GRACE_MS") {
            config.termination_grace = Duration::from_millis(ms);
        }

        if let Some(marker) = lookup("RPCPROBE_READY_MARKER")
            && !marker.is_empty()
        {
            config.readiness = Readiness::StderrMarker(marker);
        }

        match parse_var::<usize>(&lookup, "RPCPROBE_MAX_LINE_BYTES") {
            Some(0) => warn!(
                key = "RPCPROBE_MAX_LINE_BYTES",
                "ignoring zero line limit"
            ),
            Some(bytes) => config.max_line_bytes = bytes,
            None => {}
        }

        config
    }

    /// Set the readiness deadline
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Set the response deadline
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the SIGTERM grace period
    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    /// Set the readiness policy
    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Wait for a stderr line containing `marker` before writing
    pub fn with_ready_marker(self, marker: impl Into<String>) -> Self {
        self.with_readiness(Readiness::StderrMarker(marker.into()))
    }

    /// Set the stdout line limit, at least one byte
    pub fn with_max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line_bytes = bytes.max(1);
        self
    }

    /// Set how many stderr lines are retained
    pub fn with_stderr_tail_lines(mut self, lines: usize) -> Self {
        self.stderr_tail_lines = lines;
        self
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
