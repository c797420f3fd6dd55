// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants

use std::time::Duration;

/// QR detection tuning
pub mod detection {
    /// Frames are downscaled so neither side exceeds this before decoding
    pub const MAX_DIMENSION: u32 = 640;

    /// Minimum time between two decode passes on the live feed (milliseconds)
    pub const INTERVAL_MS: u64 = 100;
}

/// V4L2 capture settings
pub mod capture {
    /// Requested capture width
    pub const WIDTH: u32 = 640;

    /// Requested capture height
    pub const HEIGHT: u32 = 480;

    /// Number of memory-mapped buffers in the capture stream
    pub const BUFFER_COUNT: u32 = 4;

    /// Frames buffered per device before slow subscribers start lagging
    pub const FRAME_CHANNEL_CAPACITY: usize = 4;

    /// Directory scanned for video device nodes
    pub const DEVICE_DIR: &str = "/dev";

    /// Prefix of V4L2 capture node names
    pub const DEVICE_PREFIX: &str = "video";
}

/// Session worker settings
pub mod session {
    /// Name of the background thread that owns the capture session
    pub const WORKER_THREAD_NAME: &str = "scanner-session";
}

/// Timing constants
pub mod timing {
    /// Log one line every N captured frames
    pub const FRAME_LOG_INTERVAL: u64 = 60;

    /// Back-off after a failed buffer dequeue (milliseconds)
    pub const CAPTURE_RETRY_MS: u64 = 10;
}

/// Default interval between decode passes
pub fn default_detection_interval() -> Duration {
    Duration::from_millis(detection::INTERVAL_MS)
}
