// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use camera_scanner::{CameraSelector, CodeType, FrameRegion, ScannerConfig, ScannerError, TorchMode};

#[test]
fn test_config_default() {
    let config = ScannerConfig::default();

    assert_eq!(config.camera, CameraSelector::Back);
    assert_eq!(config.torch_mode, TorchMode::Off);
    assert!(config.accepted_types.is_none());
    assert_eq!(config.scan_region, FrameRegion::FULL);
    assert!(config.mirror_front_camera, "Front camera should mirror by default");
}

#[test]
fn test_partial_json_keeps_defaults() {
    let config = ScannerConfig::from_json_str(r#"{ "camera": "front", "torch_mode": "on" }"#)
        .expect("partial config should parse");

    assert_eq!(config.camera, CameraSelector::Front);
    assert_eq!(config.torch_mode, TorchMode::On);
    assert!(config.mirror_front_camera);
    assert_eq!(config.detection, ScannerConfig::default().detection);
}

#[test]
fn test_accepted_types_parse() {
    let config =
        ScannerConfig::from_json_str(r#"{ "accepted_types": ["qr", "ean13"] }"#).unwrap();
    assert_eq!(
        config.accepted_types,
        Some(vec![CodeType::Qr, CodeType::Ean13])
    );
}

#[test]
fn test_invalid_json_is_config_error() {
    let result = ScannerConfig::from_json_str(r#"{ "camera": "sideways" }"#);
    assert!(matches!(result, Err(ScannerError::Config(_))));
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = ScannerConfig {
        camera: CameraSelector::Front,
        torch_mode: TorchMode::Auto,
        accepted_types: Some(vec![CodeType::Qr]),
        scan_region: FrameRegion::new(0.25, 0.25, 0.5, 0.5),
        mirror_front_camera: false,
        ..ScannerConfig::default()
    };
    config.save(&path).unwrap();

    let loaded = ScannerConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_or_default_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = ScannerConfig::load_or_default(&dir.path().join("missing.json")).unwrap();
    assert_eq!(config, ScannerConfig::default());
}

#[test]
fn test_load_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ScannerConfig::load(&dir.path().join("missing.json")).is_err());
}

#[test]
fn test_default_path_is_namespaced() {
    if let Some(path) = ScannerConfig::default_path() {
        assert!(path.ends_with("camera-scanner/config.json"));
    }
}
