// Display detection from compositor startup output

use super::{DisplayError, Result};
use log::{debug, trace};
use regex::Regex;
use std::process::Child;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

/// Line the compositor prints once its Wayland socket is up
const RUNNING_PATTERN: &str = r"^Running [a-zA-Z ]+ '(wayland-[0-9]+)'";

/// How often the compositor's exit status is polled while waiting for output
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn running_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(RUNNING_PATTERN).expect("display pattern is valid"))
}

/// Detector for the display announced by the compositor
pub struct DisplayDetector;

impl DisplayDetector {
    /// Extract the display name from a compositor output line
    pub fn match_line(line: &str) -> Option<String> {
        running_regex()
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Wait for the compositor to announce its display.
    ///
    /// `lines` is fed by a reader thread draining the compositor's stdout.
    /// Fails when the compositor exits first or `timeout` elapses.
    pub fn wait_for_display(
        lines: &Receiver<String>,
        process: &mut Child,
        timeout: Duration,
    ) -> Result<String> {
        debug!("Waiting for compositor to announce a display (timeout: {:?})", timeout);

        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(DisplayError::StartupTimeout(timeout));
            }

            match lines.recv_timeout(POLL_INTERVAL.min(timeout - elapsed)) {
                Ok(line) => {
                    trace!("compositor: {}", line);
                    if let Some(display) = Self::match_line(&line) {
                        debug!("Compositor announced display {}", display);
                        return Ok(display);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // stdout closed, the exit status shows up within the deadline
                    thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
                }
            }

            if let Some(status) = process.try_wait().map_err(|e| DisplayError::Io(e.to_string()))? {
                // Lines forwarded before the exit still count
                while let Ok(line) = lines.try_recv() {
                    trace!("compositor: {}", line);
                    if let Some(display) = Self::match_line(&line) {
                        debug!("Compositor announced display {} before exiting", display);
                        return Ok(display);
                    }
                }
                return Err(DisplayError::CompositorExited(status.code()));
            }
        }
    }
}
