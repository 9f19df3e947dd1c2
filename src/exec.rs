use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::errors::SweepError;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Everything a finished child left behind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Captured {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs one rendered command to completion.
pub trait Executor: Sync {
    fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<Captured, SweepError>;
}

/// Runs commands through `sh -c`, one child per call.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ShellExecutor {
    pub fn with_shell(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
        }
    }
}

impl Executor for ShellExecutor {
    fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<Captured, SweepError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a timeout can take down the whole pipeline.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| SweepError::Execution {
            command: command.to_string(),
            detail: e.to_string(),
        })?;
        debug!(pid = child.id(), command, "spawned");

        // Both pipes are drained concurrently so a chatty child cannot
        // block on a full buffer while we wait on it.
        let deadline = timeout.map(|t| Instant::now() + t);
        let (output_tx, output_rx) = crossbeam_channel::bounded(2);
        spawn_drain(child.stdout.take(), Pipe::Stdout, output_tx.clone());
        spawn_drain(child.stderr.take(), Pipe::Stderr, output_tx);

        let timed_out = || SweepError::Timeout {
            command: command.to_string(),
            timeout: timeout.unwrap_or_default(),
        };

        let status = match wait_with_deadline(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                terminate(&mut child);
                return Err(timed_out());
            }
            Err(e) => {
                terminate(&mut child);
                return Err(SweepError::Execution {
                    command: command.to_string(),
                    detail: e.to_string(),
                });
            }
        };

        // The shell is gone, but a backgrounded descendant may still hold the
        // pipes open. The same deadline bounds the wait for end-of-file.
        let Some((stdout, stderr)) = collect_output(&output_rx, deadline) else {
            debug!(pid = child.id(), "pipes still open after exit, killing group");
            kill_group(&child);
            return Err(timed_out());
        };

        Ok(Captured {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

fn spawn_drain<R: Read + Send + 'static>(
    pipe: Option<R>,
    which: Pipe,
    tx: Sender<(Pipe, String)>,
) {
    thread::spawn(move || {
        let _ = tx.send((which, drain(pipe)));
    });
}

/// Both streams, or `None` if `deadline` passed before they reached EOF.
fn collect_output(
    rx: &Receiver<(Pipe, String)>,
    deadline: Option<Instant>,
) -> Option<(String, String)> {
    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        let received = match deadline {
            Some(deadline) => match rx.recv_deadline(deadline) {
                Ok(received) => received,
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(received) => received,
                Err(_) => break,
            },
        };
        match received {
            (Pipe::Stdout, text) => stdout = Some(text),
            (Pipe::Stderr, text) => stderr = Some(text),
        }
    }
    Some((stdout.unwrap_or_default(), stderr.unwrap_or_default()))
}

fn drain<R: Read>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Wait for the child, giving up once `deadline` has passed (`Ok(None)`).
fn wait_with_deadline(
    child: &mut Child,
    deadline: Option<Instant>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Kill the child (and its process group on unix) and reap it.
fn terminate(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

/// SIGKILL every process left in the child's group.
fn kill_group(child: &Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = i32::try_from(child.id()) {
            // SAFETY: killpg only sends a signal; the group was created for this child.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = child;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_both_streams() {
        let captured = ShellExecutor::default()
            .execute("echo out; echo err >&2", None)
            .unwrap();
        assert_eq!(captured.exit_code, Some(0));
        assert_eq!(captured.stdout, "out\n");
        assert_eq!(captured.stderr, "err\n");
    }

    #[test]
    fn reports_nonzero_exit() {
        let captured = ShellExecutor::default().execute("exit 3", None).unwrap();
        assert_eq!(captured.exit_code, Some(3));
    }

    #[test]
    fn signal_death_has_no_exit_code() {
        let captured = ShellExecutor::default()
            .execute("kill -9 $$", None)
            .unwrap();
        assert_eq!(captured.exit_code, None);
    }

    #[test]
    fn large_output_does_not_deadlock() {
        let captured = ShellExecutor::default()
            .execute("i=0; while [ $i -lt 20000 ]; do echo 0123456789abcdef; echo x >&2; i=$((i+1)); done", None)
            .unwrap();
        assert_eq!(captured.stdout.lines().count(), 20000);
        assert_eq!(captured.stderr.lines().count(), 20000);
    }

    #[test]
    fn timeout_kills_the_child() {
        let start = Instant::now();
        let err = ShellExecutor::default()
            .execute("sleep 5", Some(Duration::from_millis(100)))
            .unwrap_err();
        assert!(matches!(err, SweepError::Timeout { .. }));
        assert!(err.is_execution_failure());
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn background_child_holding_pipes_hits_timeout() {
        let start = Instant::now();
        let err = ShellExecutor::default()
            .execute("sleep 4 & echo x >&2", Some(Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(err, SweepError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn background_child_that_closes_pipes_is_fine() {
        let captured = ShellExecutor::default()
            .execute(
                "sleep 4 >/dev/null 2>&1 & echo x >&2",
                Some(Duration::from_secs(2)),
            )
            .unwrap();
        assert_eq!(captured.exit_code, Some(0));
        assert_eq!(captured.stderr, "x\n");
    }

    #[test]
    fn missing_shell_is_execution_error() {
        let err = ShellExecutor::with_shell("/nonexistent/shell")
            .execute("true", None)
            .unwrap_err();
        assert!(matches!(err, SweepError::Execution { .. }));
    }
}
