// SPDX-License-Identifier: GPL-3.0-only

//! In-process virtual cameras
//!
//! Devices whose frames are pushed by the host instead of captured from
//! hardware. Useful for replaying recorded footage through the scanner and
//! for exercising the session logic without a camera attached.

use super::types::*;
use super::{CaptureDeviceProvider, DeviceInput};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::constants::capture::FRAME_CHANNEL_CAPACITY;

struct VirtualDevice {
    info: CameraDevice,
    frames: FrameSender,
    bound: bool,
    torch: TorchMode,
    fail_bind: bool,
}

#[derive(Default)]
struct ProviderState {
    devices: Vec<VirtualDevice>,
    total_binds: usize,
}

/// Provider backed by host-supplied frames
///
/// Cloning shares the same device set.
#[derive(Clone, Default)]
pub struct VirtualCameraProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl VirtualCameraProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a device; replaces any device with the same id
    pub fn add_device(&self, device: CameraDevice) {
        info!(id = %device.id, name = %device.name, location = ?device.location, "Adding virtual camera");
        let mut state = self.lock();
        state.devices.retain(|d| d.info.id != device.id);
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        state.devices.push(VirtualDevice {
            info: device,
            frames,
            bound: false,
            torch: TorchMode::Off,
            fail_bind: false,
        });
    }

    /// Unplug a device
    pub fn remove_device(&self, id: &str) {
        self.lock().devices.retain(|d| d.info.id != id);
    }

    /// Publish a frame on a device
    ///
    /// Returns the number of subscribers that will see it; frames pushed
    /// while the device is not bound are dropped.
    pub fn push_frame(&self, id: &str, frame: CameraFrame) -> usize {
        let state = self.lock();
        let Some(device) = state.devices.iter().find(|d| d.info.id == id) else {
            return 0;
        };
        if !device.bound {
            return 0;
        }
        device.frames.send(Arc::new(frame)).unwrap_or(0)
    }

    /// Make the next binds of a device fail until cleared
    pub fn set_bind_failure(&self, id: &str, fail: bool) {
        if let Some(device) = self.lock().devices.iter_mut().find(|d| d.info.id == id) {
            device.fail_bind = fail;
        }
    }

    /// Number of devices currently bound as session input
    pub fn bound_inputs(&self) -> usize {
        self.lock().devices.iter().filter(|d| d.bound).count()
    }

    /// Id of the bound device, if exactly one is bound
    pub fn bound_device(&self) -> Option<String> {
        let state = self.lock();
        let mut bound = state.devices.iter().filter(|d| d.bound);
        match (bound.next(), bound.next()) {
            (Some(device), None) => Some(device.info.id.clone()),
            _ => None,
        }
    }

    /// Total successful binds since creation
    pub fn total_binds(&self) -> usize {
        self.lock().total_binds
    }

    /// Torch mode last applied to a device
    pub fn torch_mode(&self, id: &str) -> Option<TorchMode> {
        self.lock()
            .devices
            .iter()
            .find(|d| d.info.id == id)
            .map(|d| d.torch)
    }
}

impl CaptureDeviceProvider for VirtualCameraProvider {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.lock().devices.iter().map(|d| d.info.clone()).collect()
    }

    fn bind_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        let mut state = self.lock();
        let entry = state
            .devices
            .iter_mut()
            .find(|d| d.info.id == device.id)
            .ok_or_else(|| BackendError::DeviceNotFound(device.id.clone()))?;

        if entry.fail_bind {
            return Err(BackendError::InitializationFailed(format!(
                "{} refused to open",
                device.id
            )));
        }
        if entry.bound {
            return Err(BackendError::Busy(device.id.clone()));
        }

        entry.bound = true;
        let input = DeviceInput::new(entry.info.clone(), entry.frames.clone());
        state.total_binds += 1;
        debug!(id = %device.id, "Virtual camera bound");
        Ok(input)
    }

    fn release_input(&self, input: DeviceInput) {
        let mut state = self.lock();
        if let Some(entry) = state
            .devices
            .iter_mut()
            .find(|d| d.info.id == input.device().id)
        {
            entry.bound = false;
            debug!(id = %entry.info.id, "Virtual camera released");
        }
    }

    fn set_torch_mode(&self, device: &CameraDevice, mode: TorchMode) -> BackendResult<()> {
        let mut state = self.lock();
        let entry = state
            .devices
            .iter_mut()
            .find(|d| d.info.id == device.id)
            .ok_or_else(|| BackendError::DeviceNotFound(device.id.clone()))?;
        if !entry.info.has_torch {
            return Err(BackendError::Other(format!("{} has no torch", device.id)));
        }
        entry.torch = mode;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> VirtualCameraProvider {
        let provider = VirtualCameraProvider::new();
        provider.add_device(CameraDevice::new("cam0", "Rear", CameraLocation::Back).with_torch(true));
        provider
    }

    #[test]
    fn test_double_bind_is_rejected() {
        let provider = provider();
        let device = provider.enumerate_cameras().remove(0);

        let input = provider.bind_input(&device).unwrap();
        assert!(matches!(
            provider.bind_input(&device),
            Err(BackendError::Busy(_))
        ));
        assert_eq!(provider.bound_inputs(), 1);

        provider.release_input(input);
        assert_eq!(provider.bound_inputs(), 0);
        assert_eq!(provider.total_binds(), 1);
    }

    #[test]
    fn test_frames_reach_subscribers_only_while_bound() {
        let provider = provider();
        let device = provider.enumerate_cameras().remove(0);
        let frame = CameraFrame::new(2, 2, PixelFormat::Gray8, vec![0u8; 4]);

        assert_eq!(provider.push_frame("cam0", frame.clone()), 0);

        let input = provider.bind_input(&device).unwrap();
        let mut rx = input.subscribe();
        assert_eq!(provider.push_frame("cam0", frame), 1);
        assert_eq!(rx.try_recv().unwrap().width, 2);
    }

    #[test]
    fn test_torch_requires_hardware() {
        let provider = provider();
        provider.add_device(CameraDevice::new("cam1", "Front", CameraLocation::Front));
        let devices = provider.enumerate_cameras();

        provider.set_torch_mode(&devices[0], TorchMode::On).unwrap();
        assert_eq!(provider.torch_mode("cam0"), Some(TorchMode::On));
        assert!(provider.set_torch_mode(&devices[1], TorchMode::On).is_err());
    }

    #[test]
    fn test_bind_failure_injection() {
        let provider = provider();
        let device = provider.enumerate_cameras().remove(0);
        provider.set_bind_failure("cam0", true);
        assert!(provider.bind_input(&device).is_err());
        provider.set_bind_failure("cam0", false);
        assert!(provider.bind_input(&device).is_ok());
    }
}
