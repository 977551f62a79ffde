//! Screenshot driver: compositor up, every layout captured, overview
//! composed, compositor down.

use crate::args::ScreenshotArgs;
use crate::config::Config;
use crate::display::{BackgroundConfig, CompositorConfig, CompositorLauncher, DisplayError};
use crate::keyboard::KeyboardConfig;
use crate::layouts::{self, LayoutError};
use crate::process::ChildEnv;
use crate::screenshot::{self, LayoutShooter, ScreenshotError, ToolsConfig};
use log::{info, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything one screenshot run needs
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub compositor: CompositorConfig,
    pub background: BackgroundConfig,
    pub keyboard: KeyboardConfig,
    pub tools: ToolsConfig,
    pub layouts_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl DriverOptions {
    pub fn new(args: &ScreenshotArgs, config: &Config) -> Self {
        Self {
            compositor: config.compositor(&args.phoc_ini),
            background: config.background(&args.background_image),
            keyboard: config.keyboard(&args.binary),
            tools: config.tools(),
            layouts_dir: args.layouts.clone(),
            output_dir: args.output_dir.clone(),
        }
    }
}

/// How a run that did not fail ended
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        screenshots: usize,
        overview: Option<PathBuf>,
    },
    Interrupted {
        screenshots: usize,
    },
}

#[derive(Debug)]
pub enum DriverError {
    Display(DisplayError),
    Layouts(LayoutError),
    Screenshot(ScreenshotError),
    OutputDir { path: PathBuf, source: io::Error },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Display(e) => write!(f, "{}", e),
            DriverError::Layouts(e) => write!(f, "{}", e),
            DriverError::Screenshot(e) => write!(f, "{}", e),
            DriverError::OutputDir { path, source } => {
                write!(f, "Failed to create {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Display(e) => Some(e),
            DriverError::Layouts(e) => Some(e),
            DriverError::Screenshot(e) => Some(e),
            DriverError::OutputDir { source, .. } => Some(source),
        }
    }
}

impl From<DisplayError> for DriverError {
    fn from(e: DisplayError) -> Self {
        DriverError::Display(e)
    }
}

impl From<LayoutError> for DriverError {
    fn from(e: LayoutError) -> Self {
        DriverError::Layouts(e)
    }
}

impl From<ScreenshotError> for DriverError {
    fn from(e: ScreenshotError) -> Self {
        DriverError::Screenshot(e)
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Run the whole screenshot sequence.
///
/// The compositor is torn down on every path out of here, including
/// errors and unwinding.
pub fn run(options: &DriverOptions, running: &AtomicBool) -> Result<RunOutcome> {
    let compositor = CompositorLauncher::launch(&options.compositor, &options.background)?;
    let result = capture_layouts(options, &compositor.env(), running);
    compositor.shutdown();
    result
}

fn capture_layouts(options: &DriverOptions, env: &ChildEnv, running: &AtomicBool) -> Result<RunOutcome> {
    let out_dir = &options.output_dir;
    fs::create_dir_all(out_dir).map_err(|source| DriverError::OutputDir {
        path: out_dir.clone(),
        source,
    })?;

    let layouts = layouts::discover(&options.layouts_dir)?;
    info!("Screenshotting {} layouts into {}", layouts.len(), out_dir.display());

    let shooter = LayoutShooter {
        keyboard: &options.keyboard,
        tools: &options.tools,
        env,
    };

    let captured = match shooter.capture_all(&layouts, out_dir, running) {
        Ok(captured) => captured,
        // Ctrl-C reaches the keyboard and tools too, so their failure is
        // the interrupt showing up
        Err(e) if !running.load(Ordering::Relaxed) => {
            warn!("Interrupted: {}", e);
            return Ok(RunOutcome::Interrupted {
                screenshots: count_pngs(&layouts, out_dir),
            });
        }
        Err(e) => return Err(e.into()),
    };

    if captured.interrupted {
        return Ok(RunOutcome::Interrupted {
            screenshots: captured.screenshots.len(),
        });
    }

    let overview = screenshot::compose_overview(out_dir, &options.tools)?;
    Ok(RunOutcome::Completed {
        screenshots: captured.screenshots.len(),
        overview,
    })
}

fn count_pngs(layouts: &[layouts::LayoutFile], out_dir: &std::path::Path) -> usize {
    layouts
        .iter()
        .filter(|layout| out_dir.join(format!("{}.png", layout.id)).exists())
        .count()
}
