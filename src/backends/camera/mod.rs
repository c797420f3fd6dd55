// SPDX-License-Identifier: MPL-2.0

//! Capture device abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │    Session worker        │  ← owns the bound DeviceInput
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │ CaptureDeviceProvider    │  ← enumerate, bind, release, torch
//! └────────────┬─────────────┘
//!              │
//!        ┌─────┴──────┐
//!        ▼            ▼
//!   ┌────────┐   ┌─────────┐
//!   │  V4L2  │   │ Virtual │
//!   └────────┘   └─────────┘
//! ```

pub mod types;
#[cfg(target_os = "linux")]
pub mod v4l2;
#[cfg(target_os = "linux")]
pub mod v4l2_controls;
pub mod virtual_camera;

pub use types::*;

/// Capture device provider trait
///
/// Providers are queried from any thread, but binding, releasing and torch
/// changes are only issued from the session worker, one at a time.
pub trait CaptureDeviceProvider: Send + Sync {
    /// Enumerate usable capture devices
    ///
    /// Must be cheap enough to call before any permission grant and free of
    /// side effects.
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    /// Bind a device as session input and start its frame stream
    ///
    /// # Returns
    /// * `Ok(DeviceInput)` - Device is bound, frames flow to its sender
    /// * `Err(BackendError::Busy)` - Device is already bound
    /// * `Err(BackendError)` - Device could not be opened
    fn bind_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput>;

    /// Release a previously bound input and stop its frame stream
    fn release_input(&self, input: DeviceInput);

    /// Apply a torch mode to a device
    ///
    /// Callers check [`CameraDevice::has_torch`] first; providers may return
    /// an error for devices without a light.
    fn set_torch_mode(&self, device: &CameraDevice, mode: TorchMode) -> BackendResult<()>;
}

/// A device bound as the input of the capture session
#[derive(Debug)]
pub struct DeviceInput {
    device: CameraDevice,
    frames: FrameSender,
}

impl DeviceInput {
    /// Create an input handle; `frames` is the stream the provider publishes to
    pub fn new(device: CameraDevice, frames: FrameSender) -> Self {
        Self { device, frames }
    }

    /// The bound device
    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    /// Subscribe to frames captured from this input
    pub fn subscribe(&self) -> FrameReceiver {
        self.frames.subscribe()
    }
}

/// Pick the device a selector resolves to
///
/// Preference order: a device mounted at the requested location, then an
/// external device, then (only when nothing is excluded) the first device.
/// `exclude` is the id of the currently bound device when switching, so a
/// switch never resolves back to the device it is leaving.
pub fn select_device<'a>(
    devices: &'a [CameraDevice],
    selector: CameraSelector,
    exclude: Option<&str>,
) -> Option<&'a CameraDevice> {
    let candidates = || {
        devices
            .iter()
            .filter(move |d| exclude.is_none_or(|id| d.id != id))
    };

    candidates()
        .find(|d| selector.matches(d.location))
        .or_else(|| candidates().find(|d| d.location == CameraLocation::External))
        .or_else(|| {
            if exclude.is_none() {
                devices.first()
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone() -> Vec<CameraDevice> {
        vec![
            CameraDevice::new("rear", "Rear", CameraLocation::Back).with_torch(true),
            CameraDevice::new("front", "Front", CameraLocation::Front),
        ]
    }

    #[test]
    fn test_select_matches_location() {
        let devices = phone();
        let back = select_device(&devices, CameraSelector::Back, None).unwrap();
        assert_eq!(back.id, "rear");
        let front = select_device(&devices, CameraSelector::Front, None).unwrap();
        assert_eq!(front.id, "front");
    }

    #[test]
    fn test_select_falls_back_to_first_device() {
        let devices = vec![CameraDevice::new("only", "Only", CameraLocation::Front)];
        let selected = select_device(&devices, CameraSelector::Back, None).unwrap();
        assert_eq!(selected.id, "only");
    }

    #[test]
    fn test_switch_never_resolves_to_excluded_device() {
        let devices = vec![CameraDevice::new("only", "Only", CameraLocation::Front)];
        assert!(select_device(&devices, CameraSelector::Back, Some("only")).is_none());
    }

    #[test]
    fn test_external_devices_alternate_on_switch() {
        let devices = vec![
            CameraDevice::new("usb0", "Webcam A", CameraLocation::External),
            CameraDevice::new("usb1", "Webcam B", CameraLocation::External),
        ];
        let first = select_device(&devices, CameraSelector::Back, None).unwrap();
        let second = select_device(&devices, CameraSelector::Front, Some(&first.id)).unwrap();
        let third = select_device(&devices, CameraSelector::Back, Some(&second.id)).unwrap();
        assert_eq!(first.id, "usb0");
        assert_eq!(second.id, "usb1");
        assert_eq!(third.id, "usb0");
    }

    #[test]
    fn test_empty_device_list() {
        assert!(select_device(&[], CameraSelector::Back, None).is_none());
    }
}
