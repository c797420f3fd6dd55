// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{CameraSelector, TorchMode};
use crate::backends::metadata::{CodeType, FrameRegion};
use crate::constants::detection;
use crate::errors::ScannerResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name under the user config dir
const CONFIG_DIR_NAME: &str = "camera-scanner";
const CONFIG_FILE_NAME: &str = "config.json";

/// Software detection tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Frames are downscaled so neither side exceeds this before decoding
    pub max_dimension: u32,
    /// Minimum milliseconds between decode passes
    pub interval_ms: u64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            max_dimension: detection::MAX_DIMENSION,
            interval_ms: detection::INTERVAL_MS,
        }
    }
}

/// Initial controller settings
///
/// Missing fields fall back to their defaults, so partial files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Camera used when scanning starts
    pub camera: CameraSelector,
    /// Torch mode applied when scanning starts
    pub torch_mode: TorchMode,
    /// Accepted code types; `None` accepts everything the pipeline supports
    pub accepted_types: Option<Vec<CodeType>>,
    /// Region of interest; codes centred outside it are not reported
    pub scan_region: FrameRegion,
    /// Mirror the preview horizontally when the front camera is active
    pub mirror_front_camera: bool,
    pub detection: DetectionSettings,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            camera: CameraSelector::default(),
            torch_mode: TorchMode::default(),
            accepted_types: None,
            scan_region: FrameRegion::FULL,
            mirror_front_camera: true, // Selfie view by default
            detection: DetectionSettings::default(),
        }
    }
}

impl ScannerConfig {
    /// `<config_dir>/camera-scanner/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn from_json_str(json: &str) -> ScannerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> ScannerResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        debug!(path = %path.display(), "Loaded scanner config");
        Ok(config)
    }

    /// Load from `path`, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> ScannerResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> ScannerResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Saved scanner config");
        Ok(())
    }
}
