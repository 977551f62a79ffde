//! On-screen keyboard process management.
//!
//! One keyboard process is spawned per layout, forced to show exactly that
//! layout, and torn down again before the next one starts.

use crate::process::{self, ChildEnv};
use log::{debug, info, trace};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

/// Makes critical warnings in the keyboard fatal
pub const G_DEBUG: &str = "G_DEBUG";
/// Keeps the keyboard from touching the user's settings
pub const GSETTINGS_BACKEND: &str = "GSETTINGS_BACKEND";
/// Forces the keyboard to a single layout
pub const POS_TEST_LAYOUT: &str = "POS_TEST_LAYOUT";
/// Keyboard debug flags
pub const POS_DEBUG: &str = "POS_DEBUG";

/// How the driver decides the keyboard is up and rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Sleep a fixed delay, then require the process to be alive
    Settle(Duration),
    /// Run `command` until it succeeds, backing off exponentially, then
    /// give the keyboard `settle` to render
    Probe {
        command: Vec<String>,
        attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        settle: Duration,
    },
}

/// Keyboard spawn configuration
#[derive(Debug, Clone)]
pub struct KeyboardConfig {
    pub binary: PathBuf,
    pub replace: bool,
    pub readiness: Readiness,
    pub terminate_grace: Duration,
}

impl KeyboardConfig {
    /// Build the command rendering `layout`
    pub fn to_command(&self, layout: &str, env: &ChildEnv) -> Command {
        let mut cmd = Command::new(&self.binary);
        if self.replace {
            cmd.arg("--replace");
        }

        env.merged(&Self::layout_env(layout)).apply(&mut cmd);
        cmd
    }

    fn layout_env(layout: &str) -> ChildEnv {
        ChildEnv::new()
            .with(G_DEBUG, "fatal-criticals")
            .with(GSETTINGS_BACKEND, "memory")
            .with(POS_TEST_LAYOUT, layout)
            .with(POS_DEBUG, "force-show")
    }
}

/// Keyboard process errors
#[derive(Debug)]
pub enum KeyboardError {
    /// The keyboard binary could not be started
    Spawn { layout: String, source: io::Error },
    /// The keyboard exited before it was ready
    Exited { layout: String, status: ExitStatus },
    /// The readiness probe never succeeded
    NotReady { layout: String, attempts: u32 },
    /// Polling the process failed
    Io { layout: String, source: io::Error },
}

impl KeyboardError {
    pub fn layout(&self) -> &str {
        match self {
            KeyboardError::Spawn { layout, .. }
            | KeyboardError::Exited { layout, .. }
            | KeyboardError::NotReady { layout, .. }
            | KeyboardError::Io { layout, .. } => layout,
        }
    }
}

impl fmt::Display for KeyboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyboardError::Spawn { layout, source } => {
                write!(f, "Spawning OSK for {} failed: {}", layout, source)
            }
            KeyboardError::Exited { layout, status } => {
                write!(f, "OSK for {} exited early with {}", layout, status)
            }
            KeyboardError::NotReady { layout, attempts } => {
                write!(f, "OSK for {} not ready after {} probe attempts", layout, attempts)
            }
            KeyboardError::Io { layout, source } => {
                write!(f, "Failed to poll OSK for {}: {}", layout, source)
            }
        }
    }
}

impl std::error::Error for KeyboardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KeyboardError::Spawn { source, .. } | KeyboardError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, KeyboardError>;

/// Delays between readiness probes: `initial`, doubling, capped at `max`
pub fn backoff_delays(initial: Duration, max: Duration) -> impl Iterator<Item = Duration> {
    std::iter::successors(Some(initial.min(max)), move |delay| Some((*delay * 2).min(max)))
}

/// A keyboard process rendering one layout
pub struct KeyboardProcess {
    layout: String,
    child: Child,
    grace: Duration,
}

impl KeyboardProcess {
    pub fn spawn(config: &KeyboardConfig, layout: &str, env: &ChildEnv) -> Result<Self> {
        let mut cmd = config.to_command(layout, env);
        cmd.stdin(Stdio::null());
        debug!("Starting OSK: {:?}", cmd);

        let child = cmd.spawn().map_err(|source| KeyboardError::Spawn {
            layout: layout.to_string(),
            source,
        })?;

        Ok(Self {
            layout: layout.to_string(),
            child,
            grace: config.terminate_grace,
        })
    }

    pub fn layout(&self) -> &str {
        &self.layout
    }

    /// Fail if the process is no longer running
    pub fn ensure_alive(&mut self) -> Result<()> {
        match self.child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(KeyboardError::Exited {
                layout: self.layout.clone(),
                status,
            }),
            Err(source) => Err(KeyboardError::Io {
                layout: self.layout.clone(),
                source,
            }),
        }
    }

    /// Block until the keyboard is ready according to `readiness`
    pub fn wait_ready(&mut self, readiness: &Readiness) -> Result<()> {
        match readiness {
            Readiness::Settle(delay) => {
                debug!("Giving OSK for {} {:?} to settle", self.layout, delay);
                thread::sleep(*delay);
                self.ensure_alive()
            }
            Readiness::Probe {
                command,
                attempts,
                initial_backoff,
                max_backoff,
                settle,
            } => {
                let mut delays = backoff_delays(*initial_backoff, *max_backoff);
                for attempt in 1..=*attempts {
                    self.ensure_alive()?;
                    if Self::probe(command) {
                        // Owning the bus name precedes showing the surface
                        debug!(
                            "OSK for {} registered after {} probe(s), {:?} to render",
                            self.layout, attempt, settle
                        );
                        thread::sleep(*settle);
                        return self.ensure_alive();
                    }
                    if attempt == *attempts {
                        break;
                    }
                    if let Some(delay) = delays.next() {
                        trace!("OSK for {} not ready, retrying in {:?}", self.layout, delay);
                        thread::sleep(delay);
                    }
                }
                self.ensure_alive()?;
                Err(KeyboardError::NotReady {
                    layout: self.layout.clone(),
                    attempts: *attempts,
                })
            }
        }
    }

    fn probe(command: &[String]) -> bool {
        let Some((program, args)) = command.split_first() else {
            return true;
        };
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Stop the keyboard with SIGTERM
    pub fn terminate(mut self) -> io::Result<ExitStatus> {
        info!("Stopping OSK for {}", self.layout);
        process::terminate(&mut self.child, self.grace)
    }
}

impl Drop for KeyboardProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!("Dropping running OSK for {}", self.layout);
            let _ = process::terminate(&mut self.child, self.grace);
        }
    }
}
