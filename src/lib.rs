pub mod capture;
pub mod error;
pub mod pipeline;
pub mod publish;
pub mod session;
pub mod utils;

use arc_swap::ArcSwap;
use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

use crate::utils::FoundDevice;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub session: SessionConfig,
    pub assembly: AssemblyConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub device: FoundDevice,
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub jpeg_quality: u8,
}

/// Recording session policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between captures, >= 1
    pub interval_secs: u32,
    /// Sessions with fewer frames are discarded
    pub min_frames: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Output playback rate, independent of the capture interval
    pub target_fps: u32,
}

/// Publish endpoint settings; publishing is skipped when no endpoint is set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    pub endpoint: Option<String>,
    pub title: String,
    pub user_id: String,
    pub user_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                device: FoundDevice::new("/dev/video0".into(), PixelFormat::Mjpeg),
                width: 1280,
                height: 720,
                buffer_count: 4,
                jpeg_quality: 85,
            },
            session: SessionConfig {
                interval_secs: 1,
                min_frames: 4,
            },
            assembly: AssemblyConfig { target_fps: 30 },
            publish: PublishConfig {
                endpoint: None,
                title: "New Timelapse".into(),
                user_id: String::new(),
                user_name: String::new(),
            },
        }
    }
}

impl Config {
    /// Defaults, then an optional TOML file, then `WORMCAM__*`
    /// environment overrides.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(config::Environment::with_prefix("WORMCAM").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_hold_the_session_invariants() {
        let config = Config::default();
        assert!(config.session.interval_secs >= 1);
        assert_eq!(config.session.min_frames, 4);
        assert_eq!(config.assembly.target_fps, 30);
        assert!(config.publish.endpoint.is_none());
    }

    #[test]
    fn load_without_a_file_yields_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.capture.height, 720);
    }
}
