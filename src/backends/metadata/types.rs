// SPDX-License-Identifier: MPL-2.0

//! Detection result types
//!
//! Coordinates are normalized (0.0 to 1.0) relative to the frame dimensions,
//! so results can be mapped onto the preview regardless of capture size.

use serde::{Deserialize, Serialize};

/// Machine-readable code symbologies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    Qr,
    Aztec,
    DataMatrix,
    Pdf417,
    Code39,
    Code39Mod43,
    Code93,
    Code128,
    Ean8,
    Ean13,
    Upce,
    Itf14,
    Interleaved2of5,
}

impl CodeType {
    /// Every known symbology
    pub const ALL: [CodeType; 13] = [
        CodeType::Qr,
        CodeType::Aztec,
        CodeType::DataMatrix,
        CodeType::Pdf417,
        CodeType::Code39,
        CodeType::Code39Mod43,
        CodeType::Code93,
        CodeType::Code128,
        CodeType::Ean8,
        CodeType::Ean13,
        CodeType::Upce,
        CodeType::Itf14,
        CodeType::Interleaved2of5,
    ];

    /// Two-dimensional (matrix or stacked) symbologies
    pub fn is_two_dimensional(self) -> bool {
        matches!(
            self,
            CodeType::Qr | CodeType::Aztec | CodeType::DataMatrix | CodeType::Pdf417
        )
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CodeType::Qr => "QR Code",
            CodeType::Aztec => "Aztec",
            CodeType::DataMatrix => "Data Matrix",
            CodeType::Pdf417 => "PDF417",
            CodeType::Code39 => "Code 39",
            CodeType::Code39Mod43 => "Code 39 mod 43",
            CodeType::Code93 => "Code 93",
            CodeType::Code128 => "Code 128",
            CodeType::Ean8 => "EAN-8",
            CodeType::Ean13 => "EAN-13",
            CodeType::Upce => "UPC-E",
            CodeType::Itf14 => "ITF-14",
            CodeType::Interleaved2of5 => "Interleaved 2 of 5",
        }
    }
}

impl std::fmt::Display for CodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A rectangular region within a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRegion {
    /// Left edge (0.0 = left of frame, 1.0 = right of frame)
    pub x: f32,
    /// Top edge (0.0 = top of frame, 1.0 = bottom of frame)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl Default for FrameRegion {
    fn default() -> Self {
        Self::FULL
    }
}

impl FrameRegion {
    /// The whole frame
    pub const FULL: FrameRegion = FrameRegion {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a frame region from pixel coordinates
    pub fn from_pixels(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        Self {
            x: x as f32 / frame_width as f32,
            y: y as f32 / frame_height as f32,
            width: width as f32 / frame_width as f32,
            height: height as f32 / frame_height as f32,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether a normalized point lies inside the region (edges inclusive)
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// Mirror horizontally, for codes seen through a mirrored preview
    pub fn mirrored(&self) -> Self {
        Self {
            x: 1.0 - self.x - self.width,
            ..*self
        }
    }
}

/// A decoded code in a frame
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedCode {
    pub code_type: CodeType,
    /// Decoded payload; `None` when the symbol was located but not readable as text
    pub value: Option<String>,
    /// Axis-aligned bounds
    pub bounds: FrameRegion,
    /// Corner points in the order top-left, top-right, bottom-right, bottom-left
    pub corners: Vec<(f32, f32)>,
}

impl DetectedCode {
    pub fn new(code_type: CodeType, value: impl Into<String>, bounds: FrameRegion) -> Self {
        let FrameRegion {
            x,
            y,
            width,
            height,
        } = bounds;
        Self {
            code_type,
            value: Some(value.into()),
            bounds,
            corners: vec![(x, y), (x + width, y), (x + width, y + height), (x, y + height)],
        }
    }

    /// Replace the corner points
    pub fn with_corners(mut self, corners: Vec<(f32, f32)>) -> Self {
        self.corners = corners;
        self
    }
}
