use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Combined output is capped to this many bytes, keeping the tail.
pub const MAX_OUTPUT: usize = 10 * 1024;

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout and stderr joined, trimmed and tail-capped to 10KB.
    pub fn combined(&self) -> String {
        let output = if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        };
        tail_capped(output.trim(), MAX_OUTPUT).to_string()
    }
}

/// Last `max` bytes of `s`, moved forward to a char boundary.
pub fn tail_capped(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Run `cmd` with captured output, killing it after `timeout`.
///
/// Spawn failures (program missing, not executable) are returned as errors
/// so callers can tell "could not run" apart from "ran and failed".
pub fn run_with_timeout(
    mut cmd: Command,
    timeout: Option<Duration>,
) -> std::io::Result<CommandOutput> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let child_pid = child.id();

    // Drain pipes on their own threads so a chatty child can't block on a
    // full pipe buffer.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || read_all(stdout_handle));
    let stderr_thread = std::thread::spawn(move || read_all(stderr_handle));

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(child.wait());
            });
            match rx.recv_timeout(limit) {
                Ok(result) => result?,
                Err(_) => {
                    kill_process(child_pid);
                    return Ok(CommandOutput {
                        success: false,
                        timed_out: true,
                        stdout: String::new(),
                        stderr: format!("timed out after {}s", limit.as_secs()),
                    });
                }
            }
        }
    };

    Ok(CommandOutput {
        success: status.success(),
        timed_out: false,
        stdout: stdout_thread.join().unwrap_or_default(),
        stderr: stderr_thread.join().unwrap_or_default(),
    })
}

/// `sh -c <command>` in `cwd`.
pub fn run_shell(
    command: &str,
    cwd: &Path,
    timeout: Option<Duration>,
) -> std::io::Result<CommandOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(cwd);
    run_with_timeout(cmd, timeout)
}

fn read_all<R: Read>(handle: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut r) = handle {
        let _ = r.read_to_string(&mut buf);
    }
    buf
}

/// SIGKILL by PID. Best-effort.
fn kill_process(pid: u32) {
    let _ = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_both_streams() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = run_shell("echo out; echo err >&2; exit 3", dir.path(), None).unwrap();
        assert!(!out.success);
        assert!(!out.timed_out);
        assert_eq!(out.combined(), "out\n\nerr");
    }

    #[test]
    fn success_with_timeout() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = run_shell("echo ok", dir.path(), Some(Duration::from_secs(10))).unwrap();
        assert!(out.success);
        assert_eq!(out.combined(), "ok");
    }

    #[test]
    fn times_out() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = run_shell("sleep 5", dir.path(), Some(Duration::from_millis(200))).unwrap();
        assert!(out.timed_out);
        assert!(!out.success);
    }

    #[test]
    fn missing_program_is_an_error() {
        let cmd = Command::new("ccx-definitely-not-a-program");
        assert!(run_with_timeout(cmd, None).is_err());
    }

    #[test]
    fn tail_cap_keeps_end_on_char_boundary() {
        let s = format!("{}é", "a".repeat(20));
        assert_eq!(tail_capped(&s, 1), "");
        assert_eq!(tail_capped(&s, 3), "aé");
        assert_eq!(tail_capped("short", 100), "short");
    }
}
