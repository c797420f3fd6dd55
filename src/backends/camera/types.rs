// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture device providers

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Which physical camera the session input should be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSelector {
    /// World-facing camera (default)
    #[default]
    Back,
    /// User-facing camera
    Front,
}

impl CameraSelector {
    /// The camera on the other side of the device
    pub fn opposite(self) -> Self {
        match self {
            CameraSelector::Back => CameraSelector::Front,
            CameraSelector::Front => CameraSelector::Back,
        }
    }

    /// Whether a device mounted at `location` satisfies this selector
    pub fn matches(self, location: CameraLocation) -> bool {
        matches!(
            (self, location),
            (CameraSelector::Back, CameraLocation::Back)
                | (CameraSelector::Front, CameraLocation::Front)
        )
    }
}

impl std::fmt::Display for CameraSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraSelector::Back => write!(f, "back"),
            CameraSelector::Front => write!(f, "front"),
        }
    }
}

/// Torch (flashlight) mode of the active device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorchMode {
    /// Light is off
    #[default]
    Off,
    /// Light stays on
    On,
    /// Light is driven by the device's exposure logic
    Auto,
}

impl TorchMode {
    /// Mode after a user toggle: Off -> On, On -> Off, Auto -> On
    pub fn toggled(self) -> Self {
        match self {
            TorchMode::Off => TorchMode::On,
            TorchMode::On => TorchMode::Off,
            TorchMode::Auto => TorchMode::On,
        }
    }

    /// Whether the light may be emitting in this mode
    pub fn is_lit(self) -> bool {
        !matches!(self, TorchMode::Off)
    }
}

impl std::fmt::Display for TorchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TorchMode::Off => write!(f, "off"),
            TorchMode::On => write!(f, "on"),
            TorchMode::Auto => write!(f, "auto"),
        }
    }
}

/// Physical mounting of a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraLocation {
    Front,
    Back,
    /// USB webcams and anything else without a known orientation
    #[default]
    External,
}

impl CameraLocation {
    /// Guess the location from a device or card name
    ///
    /// Mobile sensors are usually named after their placement
    /// ("front", "user", "rear", "world"); laptop webcams face the user.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("rear") || lower.contains("back") || lower.contains("world") {
            CameraLocation::Back
        } else if lower.contains("front")
            || lower.contains("user")
            || lower.contains("integrated")
            || lower.contains("facetime")
        {
            CameraLocation::Front
        } else {
            CameraLocation::External
        }
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Stable identifier, unique per provider
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Path to the capture node (e.g. /dev/video0), or a provider-specific URI
    pub path: String,
    pub location: CameraLocation,
    /// Whether the device exposes a controllable light source
    pub has_torch: bool,
}

impl CameraDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: CameraLocation) -> Self {
        let id = id.into();
        Self {
            path: id.clone(),
            id,
            name: name.into(),
            location,
            has_torch: false,
        }
    }

    /// Builder-style torch flag
    pub fn with_torch(mut self, has_torch: bool) -> Self {
        self.has_torch = has_torch;
        self
    }

    /// Builder-style capture path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// Pixel format for camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// BGRA - 32-bit with alpha (B G R A byte order)
    BGRA,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    YUYV,
    /// NV12 - Semi-planar 4:2:0 (Y plane + interleaved UV plane)
    NV12,
}

impl PixelFormat {
    /// Bytes per pixel of the first plane
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::RGBA | Self::BGRA => 4,
            Self::YUYV => 2,
            Self::Gray8 | Self::NV12 => 1,
        }
    }

    /// Parse a V4L2 FourCC code
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"YUYV" => Some(Self::YUYV),
            b"NV12" => Some(Self::NV12),
            b"GREY" => Some(Self::Gray8),
            b"AB24" => Some(Self::RGBA),
            b"AR24" => Some(Self::BGRA),
            _ => None,
        }
    }
}

/// A single frame from the camera
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Pixel data; for NV12 the Y plane comes first
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Row stride of the first plane (bytes per row, may include padding)
    pub stride: u32,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Wrap tightly packed pixel data
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            format,
            stride: width * format.bytes_per_pixel() as u32,
            captured_at: Instant::now(),
        }
    }

    /// Extract the luma channel as a tightly packed `width * height` buffer
    ///
    /// Returns `None` when the data is shorter than the dimensions claim.
    pub fn to_luma(&self) -> Option<Vec<u8>> {
        let width = self.width as usize;
        let height = self.height as usize;
        let stride = self.stride as usize;
        let bpp = self.format.bytes_per_pixel();

        if width == 0 || height == 0 || stride < width * bpp {
            return None;
        }
        let needed = (height - 1) * stride + width * bpp;
        if self.data.len() < needed {
            return None;
        }

        let mut luma = Vec::with_capacity(width * height);
        for y in 0..height {
            let row = &self.data[y * stride..y * stride + width * bpp];
            match self.format {
                PixelFormat::Gray8 | PixelFormat::NV12 => luma.extend_from_slice(row),
                PixelFormat::YUYV => luma.extend(row.iter().step_by(2).copied()),
                PixelFormat::RGBA => luma.extend(
                    row.chunks_exact(4)
                        .map(|px| rgb_to_luma(px[0], px[1], px[2])),
                ),
                PixelFormat::BGRA => luma.extend(
                    row.chunks_exact(4)
                        .map(|px| rgb_to_luma(px[2], px[1], px[0])),
                ),
            }
        }
        Some(luma)
    }
}

/// BT.601 luma in fixed point
fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Frame sender type for device frame streams
pub type FrameSender = tokio::sync::broadcast::Sender<Arc<CameraFrame>>;

/// Frame receiver type for device frame streams
pub type FrameReceiver = tokio::sync::broadcast::Receiver<Arc<CameraFrame>>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Failed to initialize a device or pipeline
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Device is already bound to another input
    Busy(String),
    /// Requested code types or pixel format not supported
    FormatNotSupported(String),
    /// Session worker or pipeline stopped responding
    Crashed(String),
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::Busy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::Crashed(msg) => write!(f, "Backend crashed: {}", msg),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torch_toggle_cycle() {
        assert_eq!(TorchMode::Off.toggled(), TorchMode::On);
        assert_eq!(TorchMode::On.toggled(), TorchMode::Off);
        assert_eq!(TorchMode::Auto.toggled(), TorchMode::On);
    }

    #[test]
    fn test_selector_opposite_round_trip() {
        for selector in [CameraSelector::Back, CameraSelector::Front] {
            assert_ne!(selector.opposite(), selector);
            assert_eq!(selector.opposite().opposite(), selector);
        }
    }

    #[test]
    fn test_location_from_name() {
        assert_eq!(CameraLocation::from_name("Rear Camera"), CameraLocation::Back);
        assert_eq!(CameraLocation::from_name("Integrated_Webcam_HD"), CameraLocation::Front);
        assert_eq!(CameraLocation::from_name("HD Pro Webcam C920"), CameraLocation::External);
    }

    #[test]
    fn test_luma_from_rgba_with_stride() {
        // 2x2 RGBA frame with 2 bytes of padding per row
        let data: Vec<u8> = vec![
            255, 255, 255, 255, // White pixel
            0, 0, 0, 255, // Black pixel
            0, 0, // stride padding
            255, 0, 0, 255, // Red pixel
            0, 255, 0, 255, // Green pixel
            0, 0, // stride padding
        ];
        let frame = CameraFrame {
            width: 2,
            height: 2,
            data: Arc::from(data.as_slice()),
            format: PixelFormat::RGBA,
            stride: 10,
            captured_at: Instant::now(),
        };

        let luma = frame.to_luma().unwrap();
        assert_eq!(luma.len(), 4);
        assert!(luma[0] > 250);
        assert_eq!(luma[1], 0);
        assert!(luma[3] > luma[2]); // green is brighter than red
    }

    #[test]
    fn test_luma_from_yuyv_takes_y_samples() {
        let data: Vec<u8> = vec![10, 128, 20, 128, 30, 128, 40, 128];
        let frame = CameraFrame::new(4, 1, PixelFormat::YUYV, data);
        assert_eq!(frame.to_luma().unwrap(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_luma_rejects_short_buffer() {
        let frame = CameraFrame::new(4, 4, PixelFormat::Gray8, vec![0u8; 8]);
        assert!(frame.to_luma().is_none());
    }
}
