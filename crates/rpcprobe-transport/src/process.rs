//! Child process ownership
//!
//! [`ChildProcess`] is the scoped handle for one spawned child: it owns the
//! three pipes, drains stderr in the background, and kills the child when
//! dropped if [`ChildProcess::terminate`] was never reached.

use crate::command::CommandSpec;
use crate::error::{HarnessError, Result, WaitPhase};
use std::collections::VecDeque;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, warn};

/// One newline-framed read from stdout
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A complete line, terminator stripped
    Line(Vec<u8>),
    /// EOF; carries any unterminated bytes read before it
    Eof(Vec<u8>),
    /// The line hit the byte limit before its terminator
    TooLong(Vec<u8>),
    /// The deadline passed first
    TimedOut,
}

/// Background reader for the child's stderr
struct StderrDrain {
    lines: mpsc::UnboundedReceiver<String>,
    tail: Arc<Mutex<VecDeque<String>>>,
    task: JoinHandle<()>,
}

impl StderrDrain {
    fn start(stderr: ChildStderr, pid: Option<u32>, keep: usize) -> Self {
        let (tx, lines) = mpsc::unbounded_channel();
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(keep)));
        let task_tail = Arc::clone(&tail);

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(trim_line_end(&buf)).into_owned();
                        debug!(target: "rpcprobe::child", pid, "{}", line);

                        {
                            let mut tail = task_tail.lock().await;
                            if keep > 0 {
                                if tail.len() == keep {
                                    tail.pop_front();
                                }
                                tail.push_back(line.clone());
                            }
                        }

                        // Receiver is gone once readiness is settled
                        let _ = tx.send(line);
                    }
                    Err(e) => {
                        debug!(pid, error = %e, "stderr drain stopped");
                        break;
                    }
                }
            }
        });

        Self { lines, tail, task }
    }
}

/// Exclusive handle to a running child process
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    program: String,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
    stderr: StderrDrain,
    terminated: bool,
}

impl ChildProcess {
    /// Spawn `spec` with all three streams piped
    ///
    /// `stderr_tail_lines` bounds how much stderr is kept for diagnostics.
    pub fn spawn(spec: &CommandSpec, stderr_tail_lines: usize) -> Result<Self> {
        let launch_failure = |source: std::io::Error| HarnessError::LaunchFailure {
            program: spec.program.clone(),
            source,
        };

        let mut child = spec.to_command().spawn().map_err(launch_failure)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_failure(std::io::Error::other("stdin was not piped")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_failure(std::io::Error::other("stdout was not piped")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| launch_failure(std::io::Error::other("stderr was not piped")))?;

        let pid = child.id();
        debug!(pid, command = %spec.display(), "spawned child process");

        Ok(Self {
            child,
            pid,
            program: spec.program.clone(),
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
            stderr: StderrDrain::start(stderr, pid, stderr_tail_lines),
            terminated: false,
        })
    }

    /// OS process id
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Program this child was started from
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Exit status if the child has already exited
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Whether the child is still running
    pub fn is_alive(&mut self) -> bool {
        self.try_status().is_none()
    }

    /// Wait for a stderr line containing `marker`, at most `limit`
    pub async fn wait_for_marker(&mut self, marker: &str, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;

        loop {
            match timeout_at(deadline, self.stderr.lines.recv()).await {
                Ok(Some(line)) if line.contains(marker) => {
                    debug!(pid = self.pid, marker, "child signalled readiness");
                    return Ok(());
                }
                Ok(Some(_)) => continue,
                // stderr closed: the marker can no longer arrive
                Ok(None) => break,
                Err(_) => {
                    return Err(HarnessError::Timeout {
                        phase: WaitPhase::Startup,
                        waited: limit,
                    });
                }
            }
        }

        match timeout_at(deadline, self.child.wait()).await {
            Ok(status) => Err(HarnessError::ChildExited {
                status: status.ok(),
                partial: Vec::new(),
            }),
            Err(_) => Err(HarnessError::Timeout {
                phase: WaitPhase::Startup,
                waited: limit,
            }),
        }
    }

    /// Write one line to stdin and flush it
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| HarnessError::WriteFailure {
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin already closed"),
        })?;

        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        write
            .await
            .map_err(|source| HarnessError::WriteFailure { source })
    }

    /// Read one newline-terminated line, giving up at `deadline`
    ///
    /// At most `max_bytes` are consumed, terminator included.
    pub(crate) async fn read_frame(&mut self, deadline: Instant, max_bytes: usize) -> Frame {
        let max_bytes = max_bytes.max(1);
        let mut buf = Vec::new();
        let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
        let stdout = &mut self.stdout;
        let read = async {
            let mut limited = stdout.take(limit);
            limited.read_until(b'\n', &mut buf).await
        };

        match timeout_at(deadline, read).await {
            Err(_) => Frame::TimedOut,
            Ok(Err(e)) => {
                debug!(pid = self.pid, error = %e, "stdout read failed");
                Frame::Eof(buf)
            }
            Ok(Ok(_)) if buf.last() == Some(&b'\n') => Frame::Line(trim_line_end(&buf).to_vec()),
            Ok(Ok(_)) if buf.len() >= max_bytes => Frame::TooLong(buf),
            Ok(Ok(_)) => Frame::Eof(buf),
        }
    }

    /// Captured stderr lines, oldest first
    pub async fn stderr_tail(&self) -> Vec<String> {
        self.stderr.tail.lock().await.iter().cloned().collect()
    }

    /// Stop the child and reap it
    ///
    /// Closes stdin, sends SIGTERM (Unix), waits up to `grace`, then kills.
    pub async fn terminate(&mut self, grace: Duration) -> Result<ExitStatus> {
        self.stdin.take();

        if let Some(status) = self.try_status() {
            self.finish();
            return Ok(status);
        }

        #[cfg(unix)]
        self.signal_term()?;

        let status = match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => return Err(self.termination_failure(source)),
            Err(_) => {
                warn!(pid = self.pid, ?grace, "child ignored SIGTERM, killing");
                self.child
                    .kill()
                    .await
                    .map_err(|source| self.termination_failure(source))?;
                self.child
                    .wait()
                    .await
                    .map_err(|source| self.termination_failure(source))?
            }
        };

        debug!(pid = self.pid, %status, "child terminated");
        self.finish();
        Ok(status)
    }

    #[cfg(unix)]
    fn signal_term(&self) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(raw) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return Ok(());
        };

        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(self.termination_failure(errno.into())),
        }
    }

    fn termination_failure(&self, source: std::io::Error) -> HarnessError {
        HarnessError::TerminationFailure {
            pid: self.pid,
            source,
        }
    }

    fn finish(&mut self) {
        self.terminated = true;
        self.stderr.task.abort();
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        self.stderr.task.abort();
        if !self.terminated {
            debug!(pid = self.pid, "killing child on drop");
            let _ = self.child.start_kill();
        }
    }
}

fn trim_line_end(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_line_end() {
        assert_eq!(trim_line_end(b"abc\n"), b"abc");
        assert_eq!(trim_line_end(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_end(b"abc"), b"abc");
        assert_eq!(trim_line_end(b"\n"), b"");
    }

    #[tokio::test]
    async fn test_spawn_missing_program_is_launch_failure() {
        let spec = CommandSpec::new("/nonexistent/rpcprobe-child");
        let err = ChildProcess::spawn(&spec, 8).err().expect("spawn must fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::LaunchFailure);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_frame_line_then_eof() {
        let spec = CommandSpec::new("sh").with_args(["-c", "printf 'one\\ntwo'"]);
        let mut child = ChildProcess::spawn(&spec, 8).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);

        assert_eq!(
            child.read_frame(deadline, 1024).await,
            Frame::Line(b"one".to_vec())
        );
        assert_eq!(
            child.read_frame(deadline, 1024).await,
            Frame::Eof(b"two".to_vec())
        );

        child.terminate(Duration::from_secs(1)).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_frame_enforces_limit() {
        let spec = CommandSpec::new("sh").with_args(["-c", "echo 0123456789abcdef; sleep 5"]);
        let mut child = ChildProcess::spawn(&spec, 8).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);

        assert_eq!(
            child.read_frame(deadline, 8).await,
            Frame::TooLong(b"01234567".to_vec())
        );

        child.terminate(Duration::from_secs(1)).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_frame_zero_limit_reads_one_byte() {
        let spec = CommandSpec::new("sh").with_args(["-c", "echo ok; exec sleep 5"]);
        let mut child = ChildProcess::spawn(&spec, 8).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);

        assert_eq!(
            child.read_frame(deadline, 0).await,
            Frame::TooLong(b"o".to_vec())
        );

        child.terminate(Duration::from_secs(1)).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_frame_times_out() {
        let spec = CommandSpec::new("sh").with_args(["-c", "exec sleep 5"]);
        let mut child = ChildProcess::spawn(&spec, 8).unwrap();
        let deadline = Instant::now() + Duration::from_millis(200);

        assert_eq!(child.read_frame(deadline, 1024).await, Frame::TimedOut);
        assert!(child.is_alive());

        child.terminate(Duration::from_secs(1)).await.unwrap();
        assert!(!child.is_alive());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_tail_is_bounded() {
        let spec = CommandSpec::new("sh").with_args([
            "-c",
            "for i in 1 2 3 4 5; do echo line$i >&2; done; echo ready >&2; exec sleep 5",
        ]);
        let mut child = ChildProcess::spawn(&spec, 3).unwrap();

        child
            .wait_for_marker("ready", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(child.stderr_tail().await, vec!["line4", "line5", "ready"]);

        child.terminate(Duration::from_secs(1)).await.unwrap();
    }
}
