// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use camera_scanner::config::DetectionSettings;
use camera_scanner::constants::{capture, default_detection_interval, detection};
use std::time::Duration;

#[test]
fn test_detection_defaults_match_settings() {
    let settings = DetectionSettings::default();
    assert_eq!(settings.max_dimension, detection::MAX_DIMENSION);
    assert_eq!(settings.interval_ms, detection::INTERVAL_MS);
    assert_eq!(
        default_detection_interval(),
        Duration::from_millis(detection::INTERVAL_MS)
    );
}

#[test]
fn test_capture_request_fits_detection_size() {
    // Requested frames should not need downscaling before decode
    assert!(capture::WIDTH <= detection::MAX_DIMENSION);
    assert!(capture::HEIGHT <= detection::MAX_DIMENSION);
}

#[test]
fn test_channel_capacity_covers_buffers() {
    assert!(capture::FRAME_CHANNEL_CAPACITY >= 1);
    assert!(capture::BUFFER_COUNT >= 2, "Streaming needs at least two buffers");
}
