// Display management module for the headless Wayland compositor
//
// This module starts the compositor, discovers the Wayland display it
// allocates and hands that display to later clients through an explicit
// child environment.

mod compositor;
mod detector;

pub use compositor::{BackgroundConfig, CompositorConfig, CompositorLauncher, ManagedCompositor};
pub use detector::DisplayDetector;

use std::fmt;
use std::time::Duration;

/// Environment variable carrying the discovered display to Wayland clients
pub const WAYLAND_DISPLAY: &str = "WAYLAND_DISPLAY";

/// Environment variable selecting the wlroots backend of the compositor
pub const WLR_BACKENDS: &str = "WLR_BACKENDS";

/// Display management errors
#[derive(Debug)]
pub enum DisplayError {
    /// The compositor executable could not be started
    SpawnFailed { command: String, reason: String },
    /// The compositor exited before announcing its display
    CompositorExited(Option<i32>),
    /// The compositor did not announce its display in time
    StartupTimeout(Duration),
    /// Reading compositor output failed
    Io(String),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::SpawnFailed { command, reason } => {
                write!(f, "Failed to run {}: {}", command, reason)
            }
            DisplayError::CompositorExited(Some(code)) => {
                write!(f, "Compositor exited with {} before announcing a display", code)
            }
            DisplayError::CompositorExited(None) => {
                write!(f, "Compositor was killed by a signal before announcing a display")
            }
            DisplayError::StartupTimeout(timeout) => {
                write!(f, "Timeout after {:?} waiting for the compositor to announce a display", timeout)
            }
            DisplayError::Io(msg) => write!(f, "Compositor I/O error: {}", msg),
        }
    }
}

impl std::error::Error for DisplayError {}

pub type Result<T> = std::result::Result<T, DisplayError>;
