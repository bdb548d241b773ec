use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;
use crate::{Result, ScrollCapError};

/// Geometry of the demo/synthetic page the CLI drives. Real integrations read
/// these values from the environment instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
    pub document_height: u32,
    pub device_pixel_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Pause after each scroll so lazy content can finish rendering. The
    /// single most important correctness knob; never hardcoded.
    pub settle_delay_ms: u64,
    /// Upper bound on one viewport capture call.
    pub capture_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub jpeg_quality: f32,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub artifact_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollCapConfig {
    pub viewport: ViewportConfig,
    pub capture: CaptureConfig,
    pub output: OutputConfig,
    pub ops: OpsConfig,
}

impl ScrollCapConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            ScrollCapError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            ScrollCapError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ScrollCapError::Configuration(
                "viewport.width and viewport.height must be greater than zero".into(),
            ));
        }
        if self.viewport.device_pixel_ratio <= 0.0 {
            return Err(ScrollCapError::Configuration(
                "viewport.device_pixel_ratio must be greater than zero".into(),
            ));
        }
        if self.capture.capture_timeout_ms == 0 {
            return Err(ScrollCapError::Configuration(
                "capture.capture_timeout_ms must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.output.jpeg_quality) {
            return Err(ScrollCapError::Configuration(
                "output.jpeg_quality must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }
}
