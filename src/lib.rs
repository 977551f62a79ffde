//! osk-layout-tools - build and test tooling for on-screen keyboard layouts
//!
//! Writes the layout manifest the keyboard reads at startup and drives a
//! headless compositor to screenshot every layout.

pub mod args;
pub mod config;
pub mod display;
pub mod driver;
pub mod keyboard;
pub mod layouts;
pub mod logging;
pub mod process;
pub mod screenshot;

// Re-exports
pub use config::Config;
pub use driver::{DriverOptions, RunOutcome};
pub use layouts::{Manifest, ManifestEntry};
