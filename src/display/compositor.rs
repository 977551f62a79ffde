// Headless compositor process management

use super::detector::DisplayDetector;
use super::{DisplayError, Result, WAYLAND_DISPLAY, WLR_BACKENDS};
use crate::process::{self, ChildEnv};
use log::{debug, info, trace, warn};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Configuration for the compositor
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    pub command: String,
    pub config_file: PathBuf,
    pub backend: String,
    pub startup_timeout: Duration,
}

impl CompositorConfig {
    /// Convert configuration to Command
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);

        cmd.arg("-C")
            .arg(&self.config_file)
            .env(WLR_BACKENDS, &self.backend);

        cmd
    }
}

/// Configuration for the background image setter
#[derive(Debug, Clone)]
pub struct BackgroundConfig {
    pub command: String,
    pub image: PathBuf,
}

impl BackgroundConfig {
    pub fn to_command(&self, env: &ChildEnv) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-i").arg(&self.image);
        env.apply(&mut cmd);
        cmd
    }
}

/// Running compositor together with the display it announced
pub struct ManagedCompositor {
    display: String,
    process: Child,
    background: Option<Child>,
}

impl std::fmt::Debug for ManagedCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedCompositor")
            .field("display", &self.display)
            .field("process_id", &self.process.id())
            .field("background_id", &self.background.as_ref().map(Child::id))
            .finish()
    }
}

impl ManagedCompositor {
    /// Wayland display name, e.g. `wayland-1`
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Environment every Wayland client of this compositor needs
    pub fn env(&self) -> ChildEnv {
        ChildEnv::new().with(WAYLAND_DISPLAY, &self.display)
    }

    /// Start the background image setter. Its exit status is never awaited;
    /// it is only killed again on shutdown.
    pub fn spawn_background(&mut self, config: &BackgroundConfig) {
        let mut cmd = config.to_command(&self.env());
        cmd.stdin(Stdio::null());
        debug!("Starting background setter: {:?}", cmd);

        match cmd.spawn() {
            Ok(child) => self.background = Some(child),
            Err(e) => warn!("Failed to run {}: {}, continuing without background", config.command, e),
        }
    }

    /// Shutdown the compositor and its background setter
    pub fn shutdown(self) {
        info!("Shutting down compositor on {}", self.display);
    }

    fn stop(&mut self) {
        if let Some(mut background) = self.background.take() {
            process::kill_quietly(&mut background);
        }

        if let Err(e) = self.process.kill() {
            trace!("Compositor already gone: {}", e);
        }
        match self.process.wait() {
            Ok(status) => debug!("Compositor exited with status: {}", status),
            Err(e) => warn!("Error waiting for compositor: {}", e),
        }
    }
}

impl Drop for ManagedCompositor {
    fn drop(&mut self) {
        debug!("Dropping ManagedCompositor {}", self.display);
        self.stop();
    }
}

/// Starts the compositor and waits for its display
pub struct CompositorLauncher;

impl CompositorLauncher {
    /// Spawn the compositor, wait for the display announcement, then start
    /// the background setter against that display.
    pub fn launch(config: &CompositorConfig, background: &BackgroundConfig) -> Result<ManagedCompositor> {
        let mut cmd = config.to_command();
        cmd.stdin(Stdio::null()).stdout(Stdio::piped());

        debug!("Starting compositor with command: {:?}", cmd);

        let mut process = cmd.spawn().map_err(|e| DisplayError::SpawnFailed {
            command: config.command.clone(),
            reason: e.to_string(),
        })?;

        let lines = match process.stdout.take() {
            Some(stdout) => Self::drain_output(stdout)?,
            None => {
                process::kill_quietly(&mut process);
                return Err(DisplayError::Io("compositor stdout not captured".to_string()));
            }
        };

        let display = match DisplayDetector::wait_for_display(&lines, &mut process, config.startup_timeout) {
            Ok(display) => display,
            Err(e) => {
                process::kill_quietly(&mut process);
                return Err(e);
            }
        };
        info!("Found {}. Using Wayland display '{}'", config.command, display);

        let mut compositor = ManagedCompositor {
            display,
            process,
            background: None,
        };
        compositor.spawn_background(background);

        Ok(compositor)
    }

    /// Forward compositor output lines to a channel from a helper thread.
    ///
    /// The thread keeps reading after the receiver is gone so the compositor
    /// never blocks on a full pipe.
    fn drain_output(stdout: std::process::ChildStdout) -> Result<mpsc::Receiver<String>> {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("compositor-stdout".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf);
                            let line = line.trim_end_matches(&['\n', '\r'][..]).to_string();
                            // Receiver is dropped once the display is known
                            let _ = tx.send(line);
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            trace!("Compositor output closed: {}", e);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| DisplayError::Io(format!("Failed to spawn output reader: {}", e)))?;

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn write_script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn config(command: String, timeout: Duration) -> CompositorConfig {
        CompositorConfig {
            command,
            config_file: PathBuf::from("/dev/null"),
            backend: "headless".to_string(),
            startup_timeout: timeout,
        }
    }

    fn no_background() -> BackgroundConfig {
        BackgroundConfig {
            command: "true".to_string(),
            image: PathBuf::from("/dev/null"),
        }
    }

    #[test]
    fn command_forces_backend() {
        let cmd = config("phoc".to_string(), Duration::from_secs(1)).to_command();
        let backend = cmd.get_envs().find(|(k, _)| *k == WLR_BACKENDS).and_then(|(_, v)| v);
        assert_eq!(backend, Some(std::ffi::OsStr::new("headless")));
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["-C", "/dev/null"]);
    }

    #[test]
    fn launch_discovers_display() {
        let dir = tempfile::tempdir().unwrap();
        let compositor = write_script(
            dir.path(),
            "fake-phoc",
            "test \"$WLR_BACKENDS\" = headless || exit 4\n\
             echo 'Loading config'\n\
             echo \"Running compositor on wayland display 'wayland-7'\"\n\
             exec sleep 30",
        );

        let managed = CompositorLauncher::launch(&config(compositor, Duration::from_secs(5)), &no_background())
            .expect("launch");
        assert_eq!(managed.display(), "wayland-7");
        assert_eq!(managed.env().get(WAYLAND_DISPLAY), Some("wayland-7"));
        managed.shutdown();
    }

    #[test]
    fn launch_reports_early_exit() {
        let dir = tempfile::tempdir().unwrap();
        let compositor = write_script(dir.path(), "fake-phoc", "echo 'no backend'\nexit 2");

        let err = CompositorLauncher::launch(&config(compositor, Duration::from_secs(5)), &no_background())
            .unwrap_err();
        assert!(matches!(err, DisplayError::CompositorExited(Some(2))));
    }

    #[test]
    fn launch_reports_missing_binary() {
        let err = CompositorLauncher::launch(
            &config("/nonexistent/phoc".to_string(), Duration::from_secs(1)),
            &no_background(),
        )
        .unwrap_err();
        assert!(matches!(err, DisplayError::SpawnFailed { .. }));
    }

    #[test]
    fn launch_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let compositor = write_script(dir.path(), "fake-phoc", "exec sleep 30");

        let err = CompositorLauncher::launch(&config(compositor, Duration::from_millis(300)), &no_background())
            .unwrap_err();
        assert!(matches!(err, DisplayError::StartupTimeout(_)));
    }

    #[test]
    fn launch_survives_invalid_utf8_output() {
        let dir = tempfile::tempdir().unwrap();
        let compositor = write_script(
            dir.path(),
            "fake-phoc",
            "printf 'Loading \\377\\376 theme\\n'\n\
             echo \"Running headless backend 'wayland-3'\"\n\
             exec sleep 30",
        );

        let managed = CompositorLauncher::launch(&config(compositor, Duration::from_secs(5)), &no_background())
            .expect("launch");
        assert_eq!(managed.display(), "wayland-3");
        managed.shutdown();
    }

    #[test]
    fn output_keeps_draining_after_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let done = dir.path().join("done");
        let compositor = write_script(
            dir.path(),
            "fake-phoc",
            &format!(
                "echo \"Running headless backend 'wayland-5'\"\n\
                 printf 'bad \\377 line\\n'\n\
                 i=0\n\
                 while [ $i -lt 2000 ]; do\n\
                 echo 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx'\n\
                 i=$((i + 1))\n\
                 done\n\
                 touch {}\n\
                 exec sleep 30",
                done.display()
            ),
        );

        let managed = CompositorLauncher::launch(&config(compositor, Duration::from_secs(5)), &no_background())
            .expect("launch");
        for _ in 0..250 {
            if done.exists() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        managed.shutdown();
        assert!(done.exists(), "compositor blocked writing its output");
    }

    #[test]
    fn background_gets_display() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("bg-display");
        let compositor = write_script(
            dir.path(),
            "fake-phoc",
            "echo \"Running headless backend 'wayland-9'\"\nexec sleep 30",
        );
        let setter = write_script(
            dir.path(),
            "fake-swaybg",
            &format!("echo \"$WAYLAND_DISPLAY $1 $2\" > {}", marker.display()),
        );
        let background = BackgroundConfig {
            command: setter,
            image: PathBuf::from("bg.jpg"),
        };

        let managed = CompositorLauncher::launch(&config(compositor, Duration::from_secs(5)), &background)
            .expect("launch");
        for _ in 0..50 {
            if marker.exists() && !fs::read_to_string(&marker).unwrap().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        managed.shutdown();
        assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "wayland-9 -i bg.jpg");
    }
}
