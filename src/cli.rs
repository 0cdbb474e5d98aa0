use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::{AnimatorConfig, DefaultFrame};
use crate::entities::LoopMode;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Flipbook image animator (headless)
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Image URLs or paths, in frame order (appended to the config's images)
    #[arg(value_name = "IMAGE")]
    pub images: Vec<String>,

    /// Load animator settings from a JSON file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Delay between frames in milliseconds
    #[arg(short = 'd', long = "delay", value_name = "MS")]
    pub delay: Option<u64>,

    /// Loop mode: none, loop or sweep
    #[arg(short = 'm', long = "loop-mode", value_name = "MODE")]
    pub loop_mode: Option<LoopMode>,

    /// Frame shown first: index, "first" or "last"
    #[arg(long = "default-frame", value_name = "FRAME", allow_hyphen_values = true)]
    pub default_frame: Option<DefaultFrame>,

    /// Reload all images every MS milliseconds (0 disables)
    #[arg(long = "auto-refresh", value_name = "MS")]
    pub auto_refresh: Option<u64>,

    /// Start playing once created
    #[arg(short = 'a', long = "autoplay")]
    pub autoplay: bool,

    /// Run for SECS seconds, then exit (default: exit once loaded unless playing)
    #[arg(short = 't', long = "duration", value_name = "SECS")]
    pub duration: Option<f64>,

    /// Enable debug logging to file (default: flipbook.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Config file (if any) with command-line overrides applied
    pub fn animator_config(&self) -> Result<AnimatorConfig> {
        let mut config = match &self.config {
            Some(path) => AnimatorConfig::from_json_file(path)?,
            None => AnimatorConfig::default(),
        };

        config.images.extend(self.images.iter().cloned());
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        if let Some(mode) = self.loop_mode {
            config.loop_mode = mode;
        }
        if let Some(frame) = self.default_frame {
            config.default_frame = frame;
        }
        if let Some(ms) = self.auto_refresh {
            config.auto_refresh = Some(ms);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameAnchor;

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "flipbook",
            "a.jpg",
            "b.jpg",
            "--delay",
            "400",
            "--loop-mode",
            "sweep",
            "--default-frame",
            "last",
            "--auto-refresh",
            "30000",
            "-vv",
        ])
        .unwrap();

        assert_eq!(args.verbosity, 2);
        let config = args.animator_config().unwrap();
        assert_eq!(config.images, vec!["a.jpg", "b.jpg"]);
        assert_eq!(config.delay, 400);
        assert_eq!(config.loop_mode, LoopMode::Sweep);
        assert_eq!(config.default_frame, DefaultFrame::Anchor(FrameAnchor::Last));
        assert_eq!(config.auto_refresh, Some(30000));
    }

    #[test]
    fn test_negative_default_frame() {
        let args = Args::try_parse_from(["flipbook", "--default-frame", "-1", "a.jpg"]).unwrap();
        assert_eq!(args.default_frame, Some(DefaultFrame::Index(-1)));
    }

    #[test]
    fn test_invalid_loop_mode() {
        assert!(Args::try_parse_from(["flipbook", "--loop-mode", "bounce"]).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let args = Args::try_parse_from(["flipbook", "--config", "/nonexistent/flipbook.json"]).unwrap();
        assert!(args.animator_config().is_err());
    }
}
