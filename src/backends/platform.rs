// SPDX-License-Identifier: GPL-3.0-only

//! Platform collaborators bundle
//!
//! Groups the device provider, permission broker and pipeline factory a
//! controller is built from, and answers the capability queries that do not
//! need a controller.

use super::camera::{CameraDevice, CaptureDeviceProvider};
use super::metadata::MetadataPipelineFactory;
use super::permission::{AuthorizationStatus, PermissionAuthority, PermissionBroker};
use std::sync::Arc;
use tracing::{debug, warn};

/// Collaborators shared by every controller on a host
#[derive(Clone)]
pub struct Platform {
    pub devices: Arc<dyn CaptureDeviceProvider>,
    pub permissions: PermissionBroker,
    pub pipelines: Arc<dyn MetadataPipelineFactory>,
}

impl Platform {
    pub fn new(
        devices: Arc<dyn CaptureDeviceProvider>,
        authority: Arc<dyn PermissionAuthority>,
        pipelines: Arc<dyn MetadataPipelineFactory>,
    ) -> Self {
        Self {
            devices,
            permissions: PermissionBroker::new(authority),
            pipelines,
        }
    }

    /// V4L2 devices, device-node permissions and the QR pipeline with
    /// default detection settings
    #[cfg(target_os = "linux")]
    pub fn linux() -> Self {
        Self::linux_with(&crate::config::ScannerConfig::default())
    }

    /// Like [`linux`](Self::linux) with detection tuned from `config`
    #[cfg(target_os = "linux")]
    pub fn linux_with(config: &crate::config::ScannerConfig) -> Self {
        use super::camera::v4l2::V4l2DeviceProvider;
        use super::metadata::QrPipelineFactory;
        use super::permission::DevicePermissionAuthority;

        Self::new(
            Arc::new(V4l2DeviceProvider::new()),
            Arc::new(DevicePermissionAuthority::default()),
            Arc::new(QrPipelineFactory::from_settings(&config.detection)),
        )
    }

    pub fn cameras(&self) -> Vec<CameraDevice> {
        self.devices.enumerate_cameras()
    }

    /// Whether any usable capture device exists
    pub fn camera_is_present(&self) -> bool {
        !self.cameras().is_empty()
    }

    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.permissions.status()
    }

    /// Whether a start would certainly fail on authorization
    ///
    /// An undetermined status is not prohibited; the caller still has to
    /// request permission.
    pub fn scanning_is_prohibited(&self) -> bool {
        self.authorization_status().is_prohibited()
    }

    /// Request camera access
    ///
    /// Resolves `false` without prompting when no camera is present.
    pub async fn request_permission(&self) -> bool {
        if !self.camera_is_present() {
            debug!("No camera present, permission request resolves false");
            return false;
        }
        self.permissions.request().await
    }

    /// Callback form of [`request_permission`](Self::request_permission)
    ///
    /// Must be called within a tokio runtime; without one the callback runs
    /// immediately with `false`.
    pub fn request_permission_with<F>(&self, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Permission requested outside a tokio runtime");
            callback(false);
            return;
        };
        let platform = self.clone();
        runtime.spawn(async move {
            callback(platform.request_permission().await);
        });
    }
}
