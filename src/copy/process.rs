//! Supervision of the external copy process.
//!
//! Two reader threads drain stdout and stderr for the whole life of the child so it can
//! never block on a full pipe. The stdout reader also records the latest percentage the
//! tool prints. Output is split on both `\r` and `\n` because progress lines are usually
//! rewritten in place.

use std::collections::VecDeque;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::tool::CopyTool;
use crate::errors::{MoveError, Result};
use crate::platform;

/// Lines of output kept for error messages.
const TAIL_LINES: usize = 20;

/// Grace used when a supervisor is dropped with its child still running.
const DROP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct Shared {
    percent: Option<f64>,
    tail: VecDeque<String>,
}

impl Shared {
    fn push_line(&mut self, line: String) {
        if self.tail.len() == TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line);
    }
}

/// Owns the copy process. Dropping it before `wait` or `kill_tree` kills the process tree.
pub struct Supervised {
    child: Child,
    shared: Arc<Mutex<Shared>>,
    readers: Vec<JoinHandle<()>>,
    settled: bool,
}

/// Feed `stream` line by line into `on_line` until EOF.
fn pump(mut stream: impl Read, mut on_line: impl FnMut(String)) {
    let mut buf = [0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &b in &buf[..n] {
            if b == b'\n' || b == b'\r' {
                if !pending.is_empty() {
                    on_line(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
            } else {
                pending.push(b);
            }
        }
    }
    if !pending.is_empty() {
        on_line(String::from_utf8_lossy(&pending).into_owned());
    }
}

impl Supervised {
    /// Spawn `cmd` in its own process group with both output streams piped and drained.
    pub fn spawn(mut cmd: Command, tool: &CopyTool) -> Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        platform::isolate_process_group(&mut cmd);
        let mut child = cmd.spawn().map_err(|e| MoveError::CopyFailed {
            code: -1,
            message: format!("failed to start '{}': {}", tool.name(), crate::fs_ops::helpers::describe(&e)),
        })?;
        debug!(pid = child.id(), tool = %tool, "Copy process started");

        let shared = Arc::new(Mutex::new(Shared::default()));
        let mut readers = Vec::with_capacity(2);

        if let Some(out) = child.stdout.take() {
            let shared = Arc::clone(&shared);
            let tool = tool.clone();
            readers.push(thread::spawn(move || {
                pump(out, |line| {
                    trace!(target: "junction_move::copy::stdout", "{line}");
                    let pct = tool.parse_percent(&line);
                    if let Ok(mut s) = shared.lock() {
                        if let Some(p) = pct {
                            s.percent = Some(p);
                        } else if !line.trim().is_empty() {
                            s.push_line(line);
                        }
                    }
                })
            }));
        }
        if let Some(err) = child.stderr.take() {
            let shared = Arc::clone(&shared);
            readers.push(thread::spawn(move || {
                pump(err, |line| {
                    trace!(target: "junction_move::copy::stderr", "{line}");
                    if let Ok(mut s) = shared.lock()
                        && !line.trim().is_empty()
                    {
                        s.push_line(line);
                    }
                })
            }));
        }

        Ok(Self {
            child,
            shared,
            readers,
            settled: false,
        })
    }

    /// Latest percentage printed by the tool.
    pub fn reported_percent(&self) -> Option<f64> {
        self.shared.lock().ok().and_then(|s| s.percent)
    }

    /// Exit code once the process has finished (-1 when killed by a signal).
    pub fn try_exit_code(&mut self) -> Result<Option<i32>> {
        let status = self
            .child
            .try_wait()
            .map_err(|e| MoveError::Other(format!("poll copy process: {e}")))?;
        Ok(status.map(|s| s.code().unwrap_or(-1)))
    }

    /// Kill the process tree, wait up to `grace`, and join the readers.
    pub fn kill_tree(mut self, grace: Duration) {
        self.terminate(grace);
    }

    fn terminate(&mut self, grace: Duration) {
        self.settled = true;
        if let Err(e) = platform::kill_process_tree(&mut self.child, grace) {
            debug!(error = %e, "Process tree termination reported an error");
        }
        self.join_readers();
    }

    /// Block until exit; return the exit code and the collected output tail.
    pub fn wait(mut self) -> Result<(i32, String)> {
        let status = self
            .child
            .wait()
            .map_err(|e| MoveError::Other(format!("wait for copy process: {e}")))?;
        self.settled = true;
        self.join_readers();
        let tail = self
            .shared
            .lock()
            .map(|s| s.tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        Ok((status.code().unwrap_or(-1), tail))
    }

    fn join_readers(&mut self) {
        for h in self.readers.drain(..) {
            let _ = h.join();
        }
    }
}

impl Drop for Supervised {
    fn drop(&mut self) {
        if !self.settled {
            warn!(pid = self.child.id(), "Copy supervisor dropped early; terminating process tree");
            self.terminate(DROP_GRACE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_splits_on_cr_and_lf() {
        let data: &[u8] = b"a\r10%\r20%\nlast";
        let mut lines = Vec::new();
        pump(data, |l| lines.push(l));
        assert_eq!(lines, vec!["a", "10%", "20%", "last"]);
    }

    #[cfg(unix)]
    #[test]
    fn captures_percent_and_exit_code() {
        let tool = CopyTool::Command {
            program: "sh".into(),
            args: vec!["-c".into(), "printf 'x 42%%\\r'; echo oops >&2; exit 3".into()],
        };
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'x 42%%\\r'; echo oops >&2; exit 3");
        let sup = Supervised::spawn(cmd, &tool).unwrap();
        let (code, tail) = sup.wait().unwrap();
        assert_eq!(code, 3);
        assert!(tail.contains("oops"));
    }

    #[test]
    fn missing_program_is_copy_failure() {
        let tool = CopyTool::Command {
            program: "definitely-not-a-real-copy-tool".into(),
            args: vec![],
        };
        let cmd = Command::new("definitely-not-a-real-copy-tool");
        match Supervised::spawn(cmd, &tool) {
            Err(MoveError::CopyFailed { code, .. }) => assert_eq!(code, -1),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[cfg(unix)]
    #[test]
    fn dropping_a_running_supervisor_kills_the_child() {
        let tool = CopyTool::Command {
            program: "sh".into(),
            args: vec![],
        };
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 30 & sleep 30; wait");
        let mut sup = Supervised::spawn(cmd, &tool).unwrap();
        let pid = sup.child.id() as libc::pid_t;
        assert_eq!(sup.try_exit_code().unwrap(), None);

        let started = std::time::Instant::now();
        drop(sup);
        assert!(started.elapsed() < Duration::from_secs(10));
        // the leader has been reaped, so the pid no longer names a process
        assert_ne!(unsafe { libc::kill(pid, 0) }, 0);
    }
}
