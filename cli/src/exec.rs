//! Child-process execution with cancellation and live line streaming.
use std::io::{BufRead as _, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::error::ExecError;

/// How often a running child is polled for exit and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status was success.
    pub success: bool,
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
}

/// Which stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Receives child output lines as they are produced.
pub trait LineSink: Sync {
    /// Handle one line (without its trailing newline).
    fn line(&self, stream: Stream, line: &str);
}

/// Render `program args...` for logs and error messages.
#[must_use]
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Abstraction over process creation so tools can be tested without
/// spawning real package managers.
///
/// Every method takes the caller's [`CancellationToken`]; a fired token stops
/// the child and yields [`ExecError::Cancelled`] (or [`ExecError::TimedOut`]
/// when only the deadline elapsed).
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command. Fails if the command exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] if the program cannot be spawned, exits
    /// non-zero, or is cancelled.
    fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError>;

    /// Run a command in a specific directory. Fails if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    fn run_in(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError>;

    /// Run a command, returning the result even when it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] only if the program cannot be spawned or is
    /// cancelled.
    fn run_unchecked(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError>;

    /// Run a command in `dir`, delivering every output line to `sink` while
    /// the child is still running. Fails if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    fn run_streaming(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
        program: &str,
        args: &[&str],
        sink: &dyn LineSink,
    ) -> Result<ExecResult, ExecError>;

    /// Check if a program is available on PATH.
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn execute(
        cancel: &CancellationToken,
        mut cmd: Command,
        program: &str,
        sink: Option<&dyn LineSink>,
    ) -> Result<ExecResult, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled {
                program: program.to_string(),
            });
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        if sink.is_none() {
            cmd.stdin(Stdio::null());
        }
        let mut child = cmd.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ExecError::NotFound {
                    program: program.to_string(),
                }
            } else {
                ExecError::Io {
                    program: program.to_string(),
                    source,
                }
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        std::thread::scope(|scope| {
            let out = scope.spawn(move || stdout.map(|s| drain(s, Stream::Stdout, sink)));
            let err = scope.spawn(move || stderr.map(|s| drain(s, Stream::Stderr, sink)));
            let status = wait_cancellable(&mut child, cancel, program);
            let stdout = out.join().ok().flatten().unwrap_or_default();
            let stderr = err.join().ok().flatten().unwrap_or_default();
            let status = status?;
            Ok(ExecResult {
                stdout,
                stderr,
                success: status.success(),
                code: status.code(),
            })
        })
    }

    fn checked(result: ExecResult, label: String) -> Result<ExecResult, ExecError> {
        if result.success {
            Ok(result)
        } else {
            Err(ExecError::Failed {
                label,
                code: result.code,
                stderr: result.stderr,
            })
        }
    }
}

/// Read `reader` to the end, forwarding each line to `sink` and returning
/// everything that was read.
fn drain(reader: impl Read, stream: Stream, sink: Option<&dyn LineSink>) -> String {
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if let Some(sink) = sink {
                    sink.line(stream, line);
                }
                captured.push_str(line);
                captured.push('\n');
            }
        }
    }
    captured
}

/// Wait for `child`, killing it if `cancel` fires first.
fn wait_cancellable(
    child: &mut Child,
    cancel: &CancellationToken,
    program: &str,
) -> Result<ExitStatus, ExecError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if cancel.should_stop() => {
                child.kill().ok();
                child.wait().ok();
                let program = program.to_string();
                return Err(if cancel.is_cancelled() {
                    ExecError::Cancelled { program }
                } else {
                    ExecError::TimedOut { program }
                });
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(source) => {
                return Err(ExecError::Io {
                    program: program.to_string(),
                    source,
                });
            }
        }
    }
}

impl Executor for SystemExecutor {
    fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        let result = Self::execute(cancel, cmd, program, None)?;
        Self::checked(result, command_line(program, args))
    }

    fn run_in(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir);
        let result = Self::execute(cancel, cmd, program, None)?;
        Self::checked(
            result,
            format!("{} in {}", command_line(program, args), dir.display()),
        )
    }

    fn run_unchecked(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        Self::execute(cancel, cmd, program, None)
    }

    fn run_streaming(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
        program: &str,
        args: &[&str],
        sink: &dyn LineSink,
    ) -> Result<ExecResult, ExecError> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir).stdin(Stdio::inherit());
        let result = Self::execute(cancel, cmd, program, Some(sink))?;
        Self::checked(result, command_line(program, args))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Shared test doubles for code that shells out.
#[cfg(test)]
pub mod test_helpers {
    use super::{ExecResult, Executor, LineSink, Stream, command_line};
    use crate::cancel::CancellationToken;
    use crate::error::ExecError;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;

    /// A scripted mock executor.
    ///
    /// Responses are keyed by command-line prefix (`"brew list --cask"`); the
    /// longest matching prefix wins. Unmatched commands fail with stderr
    /// `"unexpected call"`. Every command line is recorded, so tests can
    /// assert on exactly what would have been spawned.
    #[derive(Debug, Default)]
    pub struct MockExecutor {
        rules: Vec<(String, ExecResult)>,
        which: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockExecutor {
        /// Create a mock with no scripted responses.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Respond to commands starting with `prefix` with success and `stdout`.
        #[must_use]
        pub fn on(mut self, prefix: &str, stdout: &str) -> Self {
            self.rules.push((
                prefix.to_string(),
                ExecResult {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    success: true,
                    code: Some(0),
                },
            ));
            self
        }

        /// Respond to commands starting with `prefix` with exit `code` and `stderr`.
        #[must_use]
        pub fn on_fail(mut self, prefix: &str, code: i32, stderr: &str) -> Self {
            self.rules.push((
                prefix.to_string(),
                ExecResult {
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                    success: false,
                    code: Some(code),
                },
            ));
            self
        }

        /// Report these programs as present on PATH.
        #[must_use]
        pub fn with_which(mut self, programs: &[&str]) -> Self {
            self.which.extend(programs.iter().map(ToString::to_string));
            self
        }

        /// Every command line executed so far, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map_or_else(|_| vec![], |g| g.clone())
        }

        /// Return the total number of executor calls made so far.
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.calls().len()
        }

        fn respond(
            &self,
            cancel: &CancellationToken,
            program: &str,
            args: &[&str],
        ) -> Result<ExecResult, ExecError> {
            if cancel.is_cancelled() {
                return Err(ExecError::Cancelled {
                    program: program.to_string(),
                });
            }
            let line = command_line(program, args);
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(line.clone());
            }
            Ok(self
                .rules
                .iter()
                .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len())
                .map_or_else(
                    || ExecResult {
                        stdout: String::new(),
                        stderr: "unexpected call".to_string(),
                        success: false,
                        code: Some(127),
                    },
                    |(_, result)| result.clone(),
                ))
        }

        fn checked(
            &self,
            cancel: &CancellationToken,
            program: &str,
            args: &[&str],
        ) -> Result<ExecResult, ExecError> {
            let result = self.respond(cancel, program, args)?;
            if result.success {
                Ok(result)
            } else {
                Err(ExecError::Failed {
                    label: command_line(program, args),
                    code: result.code,
                    stderr: result.stderr,
                })
            }
        }
    }

    impl Executor for MockExecutor {
        fn run(
            &self,
            cancel: &CancellationToken,
            program: &str,
            args: &[&str],
        ) -> Result<ExecResult, ExecError> {
            self.checked(cancel, program, args)
        }

        fn run_in(
            &self,
            cancel: &CancellationToken,
            _: &Path,
            program: &str,
            args: &[&str],
        ) -> Result<ExecResult, ExecError> {
            self.checked(cancel, program, args)
        }

        fn run_unchecked(
            &self,
            cancel: &CancellationToken,
            program: &str,
            args: &[&str],
        ) -> Result<ExecResult, ExecError> {
            self.respond(cancel, program, args)
        }

        fn run_streaming(
            &self,
            cancel: &CancellationToken,
            _: &Path,
            program: &str,
            args: &[&str],
            sink: &dyn LineSink,
        ) -> Result<ExecResult, ExecError> {
            let result = self.respond(cancel, program, args)?;
            for line in result.stdout.lines() {
                sink.line(Stream::Stdout, line);
            }
            for line in result.stderr.lines() {
                sink.line(Stream::Stderr, line);
            }
            if result.success {
                Ok(result)
            } else {
                Err(ExecError::Failed {
                    label: command_line(program, args),
                    code: result.code,
                    stderr: result.stderr,
                })
            }
        }

        fn which(&self, program: &str) -> bool {
            self.which.contains(program)
        }
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(Stream, String)>>);

    impl LineSink for Collect {
        fn line(&self, stream: Stream, line: &str) {
            self.0.lock().unwrap().push((stream, line.to_string()));
        }
    }

    #[test]
    fn run_echo() {
        let result = SystemExecutor
            .run(&CancellationToken::new(), "echo", &["hello"])
            .unwrap();
        assert!(result.success, "echo command should succeed");
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn run_failure_carries_stderr() {
        let err = SystemExecutor
            .run(
                &CancellationToken::new(),
                "sh",
                &["-c", "echo nope >&2; exit 3"],
            )
            .unwrap_err();
        match err {
            ExecError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn run_unchecked_failure() {
        let result = SystemExecutor
            .run_unchecked(&CancellationToken::new(), "false", &[])
            .unwrap();
        assert!(!result.success, "non-zero exit should set success=false");
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = SystemExecutor
            .run(
                &CancellationToken::new(),
                "this-program-does-not-exist-12345",
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, ExecError::NotFound { .. }));
    }

    #[test]
    fn which_finds_known_program() {
        assert!(SystemExecutor.which("sh"), "sh should be found on Unix");
        assert!(!SystemExecutor.which("this-program-does-not-exist-12345"));
    }

    #[test]
    fn run_in_uses_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = SystemExecutor
            .run_in(&CancellationToken::new(), dir.path(), "pwd", &[])
            .unwrap();
        let reported = dunce::canonicalize(result.stdout.trim()).unwrap();
        assert_eq!(reported, dunce::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn streaming_delivers_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Collect::default();
        SystemExecutor
            .run_streaming(
                &CancellationToken::new(),
                dir.path(),
                "sh",
                &["-c", "echo out; echo err >&2"],
                &sink,
            )
            .unwrap();
        let lines = sink.0.into_inner().unwrap();
        assert!(lines.contains(&(Stream::Stdout, "out".to_string())));
        assert!(lines.contains(&(Stream::Stderr, "err".to_string())));
    }

    #[test]
    fn cancellation_kills_running_child() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });
        let started = Instant::now();
        let err = SystemExecutor.run(&token, "sleep", &["10"]).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, ExecError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn deadline_times_out_child() {
        let token = CancellationToken::new().child_with_timeout(Duration::from_millis(100));
        let err = SystemExecutor.run(&token, "sleep", &["10"]).unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }));
    }

    #[test]
    fn cancelled_token_spawns_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let err = SystemExecutor.run(&token, "echo", &["x"]).unwrap_err();
        assert!(matches!(err, ExecError::Cancelled { .. }));
    }
}
