//! Per-task build execution.
//!
//! fingerprint → cache lookup → validated generator subprocess → diagnostics
//! parse → store/emit. Each task owns its subprocess and guarantees release
//! on every exit path; cancellation enforces a grace-period kill.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::cache::Fingerprint;
use crate::core::{CancelToken, Diagnostic};
use crate::pipeline::diagnostics;

/// How long a cancelled subprocess may keep running before it is killed.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Poll interval for subprocess exit and cancellation.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Terminal outcome of one generator invocation.
#[derive(Debug)]
pub enum InvokeOutcome {
    /// Exit 0. Artifact is the generator's stdout (opaque bytes).
    Success {
        artifact: Vec<u8>,
        diagnostics: Vec<Diagnostic>,
    },
    /// Non-zero exit with parseable output. Never retried.
    Failed { diagnostics: Vec<Diagnostic> },
    /// Killed by signal or I/O failure. Retried with backoff.
    Transient { reason: String },
    /// Cancellation observed while the subprocess ran.
    Cancelled,
}

/// A build task as tracked by the pipeline.
#[derive(Debug, Clone)]
pub struct BuildTask {
    pub component: String,
    pub input_hash: Fingerprint,
    pub submitted: Instant,
    pub attempt: u32,
}

/// Terminal status of a build task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Success,
    Failure,
    Cached,
}

/// Terminal record of a build task, queryable per component.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub component: String,
    pub status: ResultStatus,
    pub diagnostics: Vec<Diagnostic>,
    pub duration: Duration,
    /// None when the input could not even be read.
    pub input_hash: Option<Fingerprint>,
}

/// Invoke the generator for one component source file.
///
/// `argv` is the validated command plus the component's source path; it is
/// executed directly, never through a shell.
pub fn invoke_generator(
    argv: &[String],
    cwd: &Path,
    source_file: &str,
    cancel: &CancelToken,
) -> InvokeOutcome {
    let (head, args) = argv.split_first().expect("validated argv is non-empty");

    let mut command = Command::new(head);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return InvokeOutcome::Transient {
                reason: format!("failed to spawn `{head}`: {e}"),
            };
        }
    };

    // Drain pipes on their own threads so a chatty generator cannot fill a
    // pipe buffer and deadlock against our wait loop.
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let status = match wait_with_cancel(&mut child, cancel) {
        WaitResult::Exited(status) => status,
        WaitResult::Cancelled => {
            let _ = stdout.join();
            let _ = stderr.join();
            return InvokeOutcome::Cancelled;
        }
        WaitResult::WaitFailed(e) => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout.join();
            let _ = stderr.join();
            return InvokeOutcome::Transient {
                reason: format!("wait failed: {e}"),
            };
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if status.success() {
        let text = String::from_utf8_lossy(&stderr);
        let diags = diagnostics::parse_output(&text, source_file);
        // Warnings survive success; stdout is the artifact.
        return InvokeOutcome::Success {
            artifact: stdout,
            diagnostics: diags,
        };
    }

    if killed_by_signal(&status) {
        return InvokeOutcome::Transient {
            reason: format!("generator killed ({status})"),
        };
    }

    let mut combined = String::from_utf8_lossy(&stderr).into_owned();
    if combined.trim().is_empty() {
        combined = String::from_utf8_lossy(&stdout).into_owned();
    }
    let mut diags = diagnostics::parse_output(&combined, source_file);
    if diags.is_empty() {
        diags.push(Diagnostic::error(
            source_file,
            0,
            0,
            format!("generator exited with {status}"),
        ));
    }
    InvokeOutcome::Failed { diagnostics: diags }
}

enum WaitResult {
    Exited(std::process::ExitStatus),
    Cancelled,
    WaitFailed(std::io::Error),
}

/// Poll for exit, honoring cancellation with a grace period, then SIGKILL.
fn wait_with_cancel(child: &mut Child, cancel: &CancelToken) -> WaitResult {
    let mut grace_deadline: Option<Instant> = None;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if grace_deadline.is_some() {
                    return WaitResult::Cancelled;
                }
                return WaitResult::Exited(status);
            }
            Ok(None) => {}
            Err(e) => return WaitResult::WaitFailed(e),
        }

        if cancel.is_cancelled() {
            match grace_deadline {
                None => grace_deadline = Some(Instant::now() + GRACE_PERIOD),
                Some(deadline) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return WaitResult::Cancelled;
                }
                Some(_) => {}
            }
        }

        std::thread::sleep(WAIT_POLL);
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

#[cfg(unix)]
fn killed_by_signal(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_some()
}

#[cfg(not(unix))]
fn killed_by_signal(_status: &std::process::ExitStatus) -> bool {
    false
}

/// Exponential backoff for transient failures: 100ms, 200ms, 400ms...
/// capped at 2s. Sleeps in cancel-aware slices.
pub fn backoff(attempt: u32, cancel: &CancelToken) {
    let millis = 100u64.saturating_mul(1 << attempt.min(8));
    let total = Duration::from_millis(millis.min(2_000));
    let deadline = Instant::now() + total;
    while !cancel.is_cancelled() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        std::thread::sleep(WAIT_POLL.min(remaining));
    }
}

/// Resolve the generator's version identifier for fingerprinting.
///
/// Runs `<head> version` once when the executable resolves; otherwise falls
/// back to the resolved path (or the bare head) so fingerprints stay stable
/// per installation.
pub fn detect_generator_version(tokens: &[String]) -> String {
    let Some(head) = tokens.first() else {
        return "unknown".to_string();
    };

    let Some(path) = super::command::resolve_executable(head) else {
        return format!("unresolved:{head}");
    };

    let output = Command::new(&path)
        .arg("version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let version = String::from_utf8_lossy(&out.stdout);
            let version = version.trim();
            if version.is_empty() {
                fallback_version(&path)
            } else {
                version.to_string()
            }
        }
        _ => fallback_version(&path),
    }
}

/// Binary path + mtime stands in when `version` is unsupported.
fn fallback_version(path: &PathBuf) -> String {
    let mtime = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}@{}", path.display(), mtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_invoke_success_captures_stdout_as_artifact() {
        let out = invoke_generator(
            &argv(&["echo", "generated code"]),
            Path::new("."),
            "a.templ",
            &CancelToken::new(),
        );
        match out {
            InvokeOutcome::Success { artifact, .. } => {
                assert_eq!(String::from_utf8_lossy(&artifact).trim(), "generated code");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_invoke_nonzero_is_failed_with_diagnostics() {
        // `false` exits 1 with no output: a fallback diagnostic is created.
        let out = invoke_generator(
            &argv(&["false"]),
            Path::new("."),
            "a.templ",
            &CancelToken::new(),
        );
        match out {
            InvokeOutcome::Failed { diagnostics } => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].file, "a.templ");
                assert!(!diagnostics[0].message.is_empty());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_invoke_missing_binary_is_transient() {
        let out = invoke_generator(
            &argv(&["definitely-not-a-real-binary-1234"]),
            Path::new("."),
            "a.templ",
            &CancelToken::new(),
        );
        assert!(matches!(out, InvokeOutcome::Transient { .. }));
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let cancel = CancelToken::new();

        let t0 = Instant::now();
        backoff(0, &cancel);
        let first = t0.elapsed();
        assert!(first >= Duration::from_millis(90));
        assert!(first < Duration::from_millis(500));

        // Cancelled backoff returns promptly.
        cancel.cancel();
        let t1 = Instant::now();
        backoff(5, &cancel);
        assert!(t1.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_detect_version_unresolved_head() {
        let v = detect_generator_version(&argv(&["definitely-not-a-real-binary-1234"]));
        assert!(v.starts_with("unresolved:"));
    }
}
