use clap::Parser;
use std::path::PathBuf;

use crate::config;

#[derive(Parser, Debug)]
#[command(name = "screenshot-all-layouts")]
#[command(author = "Phosh Developers")]
#[command(version)]
#[command(about = "Screenshot OSK layouts", long_about = None)]
pub struct ScreenshotArgs {
    /// Compositor configuration file
    #[arg(short = 'p', long, default_value = "/usr/share/phosh/phoc.ini")]
    pub phoc_ini: PathBuf,

    /// Background image
    #[arg(
        short = 'i',
        long,
        default_value = "/usr/share/phosh/backgrounds/byzantium-abstract-720x1440.jpg"
    )]
    pub background_image: PathBuf,

    /// Directory for the per-layout screenshots
    #[arg(short, long, default_value = "_build/screenshots/360x720@1")]
    pub output_dir: PathBuf,

    /// On-screen keyboard binary
    #[arg(short, long, default_value = "_build/src/phosh-osk-stub")]
    pub binary: PathBuf,

    /// Directory with the layout descriptors
    #[arg(short, long, default_value = "src/layouts")]
    pub layouts: PathBuf,

    /// Tool configuration file
    #[arg(short, long, default_value = "/etc/osk-layout-tools.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl ScreenshotArgs {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }
}

#[derive(Parser, Debug)]
#[command(name = "write-layout-info")]
#[command(author = "Phosh Developers")]
#[command(version)]
#[command(about = "Write OSK layout info", long_about = None)]
pub struct LayoutInfoArgs {
    /// Directory with the layout descriptors
    #[arg(long, default_value = "src/layouts")]
    pub layouts: PathBuf,

    /// Advertise the varnam input method layout
    #[arg(long, overrides_with = "no_varnam")]
    pub varnam: bool,

    /// Don't advertise the varnam input method layout
    #[arg(long, overrides_with = "varnam")]
    pub no_varnam: bool,

    /// Manifest output path
    #[arg(long, default_value = "layouts.json")]
    pub out: PathBuf,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl LayoutInfoArgs {
    pub fn include_varnam(&self) -> bool {
        self.varnam && !self.no_varnam
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_defaults() {
        let args = ScreenshotArgs::try_parse_from(["screenshot-all-layouts"]).unwrap();
        assert_eq!(args.phoc_ini, PathBuf::from("/usr/share/phosh/phoc.ini"));
        assert_eq!(args.output_dir, PathBuf::from("_build/screenshots/360x720@1"));
        assert_eq!(args.binary, PathBuf::from("_build/src/phosh-osk-stub"));
        assert_eq!(args.layouts, PathBuf::from("src/layouts"));
        assert!(!args.verbose);
    }

    #[test]
    fn screenshot_short_flags() {
        let args = ScreenshotArgs::try_parse_from([
            "screenshot-all-layouts",
            "-p",
            "phoc.ini",
            "-i",
            "bg.png",
            "-o",
            "shots",
            "-b",
            "_build/run",
        ])
        .unwrap();
        assert_eq!(args.phoc_ini, PathBuf::from("phoc.ini"));
        assert_eq!(args.background_image, PathBuf::from("bg.png"));
        assert_eq!(args.output_dir, PathBuf::from("shots"));
        assert_eq!(args.binary, PathBuf::from("_build/run"));
    }

    #[test]
    fn varnam_defaults_off() {
        let args = LayoutInfoArgs::try_parse_from(["write-layout-info"]).unwrap();
        assert!(!args.include_varnam());
        assert_eq!(args.out, PathBuf::from("layouts.json"));
    }

    #[test]
    fn last_varnam_flag_wins() {
        let on = LayoutInfoArgs::try_parse_from(["write-layout-info", "--no-varnam", "--varnam"]).unwrap();
        assert!(on.include_varnam());

        let off = LayoutInfoArgs::try_parse_from(["write-layout-info", "--varnam", "--no-varnam"]).unwrap();
        assert!(!off.include_varnam());
    }
}
