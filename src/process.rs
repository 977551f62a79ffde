//! Subprocess plumbing shared by the compositor, keyboard and tool runners.

use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Environment overrides handed explicitly to every spawned child.
///
/// Values discovered at runtime (the Wayland display) travel in here instead
/// of being written into our own process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildEnv {
    vars: BTreeMap<String, String>,
}

impl ChildEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Layer `other` on top of `self`, `other` winning on conflicts
    pub fn merged(&self, other: &ChildEnv) -> ChildEnv {
        let mut vars = self.vars.clone();
        vars.extend(other.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        ChildEnv { vars }
    }

    pub fn apply(&self, cmd: &mut Command) {
        cmd.envs(&self.vars);
    }
}

/// Failure of a run-to-completion tool invocation
#[derive(Debug)]
pub enum RunError {
    /// The executable could not be started
    Spawn(io::Error),
    /// The tool ran but reported failure
    Status(ExitStatus),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Spawn(e) => write!(f, "failed to start: {}", e),
            RunError::Status(status) => write!(f, "exited with {}", status),
        }
    }
}

impl std::error::Error for RunError {}

/// Run a command to completion, treating a non-zero exit as an error.
pub fn run_checked(cmd: &mut Command) -> Result<(), RunError> {
    debug!("Running {:?}", cmd);
    let status = cmd.stdin(Stdio::null()).status().map_err(RunError::Spawn)?;
    if status.success() {
        Ok(())
    } else {
        Err(RunError::Status(status))
    }
}

/// Ask a child to exit with SIGTERM and reap it.
///
/// Falls back to SIGKILL when the child is still around after `grace`.
pub fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    let pid = child.id() as libc::pid_t;
    // SAFETY: plain kill(2) on a pid we spawned and have not yet reaped.
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        let err = io::Error::last_os_error();
        warn!("Failed to send SIGTERM to {}: {}", pid, err);
    }

    let start = Instant::now();
    while start.elapsed() < grace {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        thread::sleep(Duration::from_millis(20));
    }

    warn!("Process {} ignored SIGTERM for {:?}, killing", pid, grace);
    child.kill()?;
    child.wait()
}

/// Kill a child outright and reap it, ignoring errors.
pub fn kill_quietly(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_env_prefers_overlay() {
        let base = ChildEnv::new().with("A", "1").with("B", "2");
        let overlay = ChildEnv::new().with("B", "3");
        let env = base.merged(&overlay);
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), Some("3"));
    }

    #[test]
    fn applied_env_reaches_child() {
        let env = ChildEnv::new().with("OSK_TOOLS_PROBE", "yes");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("test \"$OSK_TOOLS_PROBE\" = yes");
        env.apply(&mut cmd);
        assert!(run_checked(&mut cmd).is_ok());
    }

    #[test]
    fn run_checked_reports_status() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 3");
        match run_checked(&mut cmd) {
            Err(RunError::Status(status)) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn run_checked_reports_missing_binary() {
        let mut cmd = Command::new("/nonexistent/osk-tools-binary");
        assert!(matches!(run_checked(&mut cmd), Err(RunError::Spawn(_))));
    }

    #[test]
    fn terminate_stops_sleeping_child() {
        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
        let status = terminate(&mut child, Duration::from_secs(2)).expect("terminate");
        assert!(!status.success());
    }

    #[test]
    fn terminate_escalates_when_sigterm_ignored() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; while true; do sleep 0.05; done")
            .spawn()
            .expect("spawn sh");
        // Let the shell install its trap
        thread::sleep(Duration::from_millis(200));
        let status = terminate(&mut child, Duration::from_millis(200)).expect("terminate");
        assert!(!status.success());
    }
}
