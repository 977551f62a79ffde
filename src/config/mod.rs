//! Configuration management for the screenshot driver

use crate::display::{BackgroundConfig, CompositorConfig};
use crate::keyboard::{KeyboardConfig, Readiness};
use crate::screenshot::ToolsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compositor configuration
    pub compositor: CompositorSection,

    /// Background image setter
    pub background: BackgroundSection,

    /// Keyboard process configuration
    pub keyboard: KeyboardSection,

    /// External image tools
    pub tools: ToolsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorSection {
    /// Compositor executable
    pub command: String,

    /// wlroots backend forced through `WLR_BACKENDS`
    pub backend: String,

    /// Seconds to wait for the compositor to announce its display
    pub startup_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundSection {
    /// Background setter executable
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardSection {
    /// Pass `--replace` to the keyboard
    pub replace: bool,

    /// Settle delay used when no probe is configured
    pub settle_ms: u64,

    /// Readiness probe command; empty selects the settle delay
    pub probe: Vec<String>,

    /// Maximum number of probe runs
    pub probe_attempts: u32,

    /// First delay between probes, doubled after each failure
    pub probe_initial_backoff_ms: u64,

    /// Upper bound for the delay between probes
    pub probe_max_backoff_ms: u64,

    /// Render delay after a successful probe
    pub probe_settle_ms: u64,

    /// Time the keyboard gets to exit after SIGTERM before it is killed
    pub terminate_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// Screenshot tool, invoked as `<screenshot> <file.png>`
    pub screenshot: String,

    /// ImageMagick montage
    pub montage: String,
}

impl Default for CompositorSection {
    fn default() -> Self {
        Self {
            command: "phoc".to_string(),
            backend: "headless".to_string(),
            startup_timeout: 10,
        }
    }
}

impl Default for BackgroundSection {
    fn default() -> Self {
        Self {
            command: "swaybg".to_string(),
        }
    }
}

impl Default for KeyboardSection {
    fn default() -> Self {
        Self {
            replace: true,
            settle_ms: 2000,
            probe: default_probe(),
            probe_attempts: 10,
            probe_initial_backoff_ms: 100,
            probe_max_backoff_ms: 2000,
            probe_settle_ms: 500,
            terminate_grace_ms: 2000,
        }
    }
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            screenshot: "grim".to_string(),
            montage: "montage".to_string(),
        }
    }
}

/// The keyboard owns `sm.puri.OSK0` on the session bus once it is up
fn default_probe() -> Vec<String> {
    [
        "gdbus",
        "introspect",
        "--session",
        "--dest",
        "sm.puri.OSK0",
        "--object-path",
        "/sm/puri/OSK0",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Load configuration from TOML file, falling back to defaults when the
    /// file does not exist
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        for (what, command) in [
            ("compositor.command", &self.compositor.command),
            ("background.command", &self.background.command),
            ("tools.screenshot", &self.tools.screenshot),
            ("tools.montage", &self.tools.montage),
        ] {
            if command.trim().is_empty() {
                return Err(format!("{} must not be empty", what).into());
            }
        }

        if self.compositor.startup_timeout == 0 {
            return Err("Compositor startup timeout must be non-zero".into());
        }

        if self.keyboard.terminate_grace_ms == 0 {
            return Err("Keyboard terminate grace must be non-zero".into());
        }

        if self.keyboard.probe.is_empty() {
            if self.keyboard.settle_ms == 0 {
                return Err("Keyboard settle delay must be non-zero without a probe".into());
            }
        } else {
            if self.keyboard.probe_attempts == 0 {
                return Err("Keyboard probe attempts must be non-zero".into());
            }
            if self.keyboard.probe_initial_backoff_ms > self.keyboard.probe_max_backoff_ms {
                return Err("Keyboard probe initial backoff cannot exceed max backoff".into());
            }
        }

        Ok(())
    }

    pub fn compositor(&self, config_file: &Path) -> CompositorConfig {
        CompositorConfig {
            command: self.compositor.command.clone(),
            config_file: config_file.to_path_buf(),
            backend: self.compositor.backend.clone(),
            startup_timeout: Duration::from_secs(self.compositor.startup_timeout),
        }
    }

    pub fn background(&self, image: &Path) -> BackgroundConfig {
        BackgroundConfig {
            command: self.background.command.clone(),
            image: image.to_path_buf(),
        }
    }

    pub fn keyboard(&self, binary: &Path) -> KeyboardConfig {
        let kb = &self.keyboard;
        let readiness = if kb.probe.is_empty() {
            Readiness::Settle(Duration::from_millis(kb.settle_ms))
        } else {
            Readiness::Probe {
                command: kb.probe.clone(),
                attempts: kb.probe_attempts,
                initial_backoff: Duration::from_millis(kb.probe_initial_backoff_ms),
                max_backoff: Duration::from_millis(kb.probe_max_backoff_ms),
                settle: Duration::from_millis(kb.probe_settle_ms),
            }
        };

        KeyboardConfig {
            binary: PathBuf::from(binary),
            replace: kb.replace,
            readiness,
            terminate_grace: Duration::from_millis(kb.terminate_grace_ms),
        }
    }

    pub fn tools(&self) -> ToolsConfig {
        ToolsConfig {
            screenshot: self.tools.screenshot.clone(),
            montage: self.tools.montage.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.compositor.command, "phoc");
        assert_eq!(cfg.tools.screenshot, "grim");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(cfg.compositor.startup_timeout, 10);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.toml");
        std::fs::write(
            &path,
            r#"
[keyboard]
probe = []
settle_ms = 500

[tools]
screenshot = "/usr/local/bin/grim"
"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.tools.screenshot, "/usr/local/bin/grim");
        assert_eq!(cfg.tools.montage, "montage");
        assert_eq!(cfg.compositor.command, "phoc");
        assert_eq!(
            cfg.keyboard(Path::new("osk")).readiness,
            Readiness::Settle(Duration::from_millis(500))
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.toml");
        std::fs::write(&path, "[compositor\ncommand = ").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn default_readiness_probes_dbus() {
        let kb = Config::default().keyboard(Path::new("_build/src/phosh-osk-stub"));
        match kb.readiness {
            Readiness::Probe {
                command,
                attempts,
                settle,
                ..
            } => {
                assert_eq!(command[0], "gdbus");
                assert_eq!(settle, Duration::from_millis(500));
                assert!(command.contains(&"sm.puri.OSK0".to_string()));
                assert_eq!(attempts, 10);
            }
            other => panic!("unexpected readiness: {:?}", other),
        }
        assert_eq!(kb.binary, PathBuf::from("_build/src/phosh-osk-stub"));
    }

    #[test]
    fn validate_rejects_empty_command() {
        let mut cfg = Config::default();
        cfg.tools.montage = " ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_backoff() {
        let mut cfg = Config::default();
        cfg.keyboard.probe_initial_backoff_ms = 5000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut cfg = Config::default();
        cfg.compositor.startup_timeout = 0;
        assert!(cfg.validate().is_err());
    }
}
