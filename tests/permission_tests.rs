// SPDX-License-Identifier: MPL-2.0

//! Integration tests for camera access requests

mod common;

use camera_scanner::backends::camera::{CameraDevice, CameraLocation};
use camera_scanner::backends::permission::AuthorizationStatus;
use camera_scanner::{ScannerController, ScannerState};
use common::*;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[tokio::test]
async fn test_concurrent_requests_share_one_prompt() {
    let rig = Rig::phone();
    rig.authority.set_status(AuthorizationStatus::Undetermined);

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let platform = rig.platform.clone();
        tasks.push(tokio::spawn(async move {
            platform.request_permission().await
        }));
    }
    assert!(eventually(|| rig.authority.pending_requests() == 1).await);
    settle().await;
    assert_eq!(rig.authority.prompt_count(), 1);

    rig.authority.resolve(true);
    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert_eq!(rig.authority.prompt_count(), 1);
    assert_eq!(rig.platform.authorization_status(), AuthorizationStatus::Granted);
}

#[tokio::test]
async fn test_denied_request_answers_every_caller() {
    let rig = Rig::phone();
    rig.authority.set_status(AuthorizationStatus::Undetermined);
    let broker = rig.platform.permissions.clone();

    let first = tokio::spawn({
        let broker = broker.clone();
        async move { broker.request().await }
    });
    let second = tokio::spawn({
        let broker = broker.clone();
        async move { broker.request().await }
    });
    assert!(eventually(|| rig.authority.pending_requests() == 1).await);
    settle().await;

    rig.authority.resolve(false);
    assert!(!first.await.unwrap());
    assert!(!second.await.unwrap());
    assert!(rig.platform.scanning_is_prohibited());
}

#[tokio::test]
async fn test_new_request_after_resolution_prompts_again() {
    let rig = Rig::phone();
    rig.authority.set_status(AuthorizationStatus::Undetermined);

    let first = tokio::spawn({
        let platform = rig.platform.clone();
        async move { platform.request_permission().await }
    });
    assert!(eventually(|| rig.authority.pending_requests() == 1).await);
    rig.authority.resolve(true);
    assert!(first.await.unwrap());

    // The host reset the decision; the finished request must not be reused
    rig.authority.set_status(AuthorizationStatus::Undetermined);
    let second = tokio::spawn({
        let platform = rig.platform.clone();
        async move { platform.request_permission().await }
    });
    assert!(eventually(|| rig.authority.pending_requests() == 1).await);
    assert_eq!(rig.authority.prompt_count(), 2);
    rig.authority.resolve(false);
    assert!(!second.await.unwrap());
}

#[tokio::test]
async fn test_decided_status_resolves_without_prompt() {
    let rig = Rig::phone();
    assert!(rig.platform.request_permission().await);

    rig.authority.set_status(AuthorizationStatus::Restricted);
    assert!(!rig.platform.request_permission().await);
    assert!(rig.platform.scanning_is_prohibited());
    assert_eq!(rig.authority.prompt_count(), 0);
}

#[tokio::test]
async fn test_undetermined_is_not_prohibited() {
    let rig = Rig::phone();
    rig.authority.set_status(AuthorizationStatus::Undetermined);
    assert!(!rig.platform.scanning_is_prohibited());
}

#[tokio::test]
async fn test_no_camera_resolves_false_without_prompt() {
    let rig = Rig::empty(AuthorizationStatus::Undetermined);
    assert!(!rig.platform.request_permission().await);
    assert_eq!(rig.authority.prompt_count(), 0);
}

#[tokio::test]
async fn test_request_permission_with_callback() {
    let rig = Rig::phone();
    rig.authority.set_status(AuthorizationStatus::Undetermined);
    let (tx, rx) = oneshot::channel();

    rig.platform.request_permission_with(move |granted| {
        let _ = tx.send(granted);
    });
    assert!(eventually(|| rig.authority.pending_requests() == 1).await);
    rig.authority.resolve(true);

    assert!(rx.await.unwrap());
}

#[test]
fn test_request_permission_with_outside_runtime() {
    let rig = Rig::phone();
    let answer = Arc::new(Mutex::new(None));
    let sink = answer.clone();

    rig.platform
        .request_permission_with(move |granted| *sink.lock().unwrap() = Some(granted));

    assert_eq!(*answer.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn test_grant_then_start() {
    let rig = Rig::empty(AuthorizationStatus::Undetermined);
    rig.cameras
        .add_device(CameraDevice::new("usb", "USB Camera", CameraLocation::External));
    let mut scanner = ScannerController::new(rig.platform.clone(), &rig.surface);

    let request = tokio::spawn({
        let platform = rig.platform.clone();
        async move { platform.request_permission().await }
    });
    assert!(eventually(|| rig.authority.pending_requests() == 1).await);
    rig.authority.resolve(true);
    assert!(request.await.unwrap());

    scanner.start_scanning(|_| {}).await.unwrap();
    assert_eq!(scanner.state(), ScannerState::Scanning);
    assert_eq!(rig.cameras.bound_device().as_deref(), Some("usb"));
}
