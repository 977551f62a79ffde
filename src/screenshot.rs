//! Per-layout screenshots and the overview montage.

use crate::keyboard::{KeyboardConfig, KeyboardError, KeyboardProcess};
use crate::layouts::LayoutFile;
use crate::process::{run_checked, ChildEnv, RunError};
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

const OVERVIEW_NAME: &str = "overview.png";

/// External image tools
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub screenshot: String,
    pub montage: String,
}

#[derive(Debug)]
pub enum ScreenshotError {
    /// The keyboard failed to come up for a layout
    Keyboard(KeyboardError),
    /// The screenshot tool failed for a layout
    Capture { layout: String, source: RunError },
    /// Stopping the keyboard failed
    Terminate { layout: String, source: io::Error },
    /// Listing the output directory failed
    ListOutput { path: PathBuf, source: io::Error },
    /// The montage tool failed
    Montage(RunError),
}

impl fmt::Display for ScreenshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenshotError::Keyboard(e) => write!(f, "{}", e),
            ScreenshotError::Capture { layout, source } => {
                write!(f, "Screenshot for '{}' failed: {}", layout, source)
            }
            ScreenshotError::Terminate { layout, source } => {
                write!(f, "Stopping OSK for '{}' failed: {}", layout, source)
            }
            ScreenshotError::ListOutput { path, source } => {
                write!(f, "Failed to list screenshots in {}: {}", path.display(), source)
            }
            ScreenshotError::Montage(e) => write!(f, "Montage failed: {}", e),
        }
    }
}

impl std::error::Error for ScreenshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScreenshotError::Keyboard(e) => Some(e),
            ScreenshotError::Capture { source, .. } => Some(source),
            ScreenshotError::Terminate { source, .. } | ScreenshotError::ListOutput { source, .. } => Some(source),
            ScreenshotError::Montage(e) => Some(e),
        }
    }
}

impl From<KeyboardError> for ScreenshotError {
    fn from(e: KeyboardError) -> Self {
        ScreenshotError::Keyboard(e)
    }
}

pub type Result<T> = std::result::Result<T, ScreenshotError>;

/// Result of the per-layout loop
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Captured {
    pub screenshots: Vec<PathBuf>,
    /// The loop stopped early because `running` was cleared
    pub interrupted: bool,
}

/// Screenshots every layout in turn against the compositor in `env`
pub struct LayoutShooter<'a> {
    pub keyboard: &'a KeyboardConfig,
    pub tools: &'a ToolsConfig,
    pub env: &'a ChildEnv,
}

impl LayoutShooter<'_> {
    /// Capture `<out_dir>/<id>.png` for each layout.
    ///
    /// Stops at the first failure. `running` is checked before every layout.
    pub fn capture_all(&self, layouts: &[LayoutFile], out_dir: &Path, running: &AtomicBool) -> Result<Captured> {
        let mut captured = Captured::default();

        for layout in layouts {
            if !running.load(Ordering::Relaxed) {
                captured.interrupted = true;
                break;
            }

            let png = out_dir.join(format!("{}.png", layout.id));
            info!("Screenshotting layout '{}' at '{}'", layout.id, png.display());
            self.capture(&layout.id, &png)?;
            captured.screenshots.push(png);
        }

        Ok(captured)
    }

    /// Bring up the keyboard for one layout, screenshot it and stop it again
    pub fn capture(&self, layout: &str, png: &Path) -> Result<()> {
        let mut osk = KeyboardProcess::spawn(self.keyboard, layout, self.env)?;
        osk.wait_ready(&self.keyboard.readiness)?;

        let mut cmd = Command::new(&self.tools.screenshot);
        cmd.arg(png);
        self.env.apply(&mut cmd);
        run_checked(&mut cmd).map_err(|source| ScreenshotError::Capture {
            layout: layout.to_string(),
            source,
        })?;

        let status = osk.terminate().map_err(|source| ScreenshotError::Terminate {
            layout: layout.to_string(),
            source,
        })?;
        debug!("OSK for '{}' exited with {}", layout, status);
        Ok(())
    }
}

/// Where the overview of `out_dir` goes: next to the directory itself
pub fn overview_path(out_dir: &Path) -> PathBuf {
    out_dir.join("..").join(OVERVIEW_NAME)
}

/// PNG files in `out_dir`, sorted by name
fn list_pngs(out_dir: &Path) -> Result<Vec<PathBuf>> {
    let list_err = |source| ScreenshotError::ListOutput {
        path: out_dir.to_path_buf(),
        source,
    };

    let mut pngs = Vec::new();
    for entry in fs::read_dir(out_dir).map_err(list_err)? {
        let path = entry.map_err(list_err)?.path();
        if path.is_file() && path.extension() == Some(OsStr::new("png")) {
            pngs.push(path);
        }
    }
    pngs.sort();
    Ok(pngs)
}

/// Concatenate all screenshots in `out_dir` into one overview image.
///
/// Returns `None` when there is nothing to compose.
pub fn compose_overview(out_dir: &Path, tools: &ToolsConfig) -> Result<Option<PathBuf>> {
    let pngs = list_pngs(out_dir)?;
    if pngs.is_empty() {
        warn!("No screenshots in {}, skipping overview", out_dir.display());
        return Ok(None);
    }

    let overview = overview_path(out_dir);
    let mut cmd = Command::new(&tools.montage);
    cmd.arg("-mode").arg("concatenate").args(&pngs).arg(&overview);
    run_checked(&mut cmd).map_err(ScreenshotError::Montage)?;

    info!("Wrote overview of {} layouts to {}", pngs.len(), overview.display());
    Ok(Some(overview))
}
