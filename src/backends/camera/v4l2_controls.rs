// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 flash control interface
//!
//! Torch support on Linux goes through the flash control class: a device
//! with a usable `V4L2_CID_FLASH_LED_MODE` control can drive its LED as a
//! continuous light.

use super::types::{BackendError, BackendResult, TorchMode};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

// ===== V4L2 Flash Control Class =====
const V4L2_CTRL_CLASS_FLASH: u32 = 0x009c0000;
const V4L2_CID_FLASH_CLASS_BASE: u32 = V4L2_CTRL_CLASS_FLASH | 0x900;

/// LED mode: none, flash or torch
pub const V4L2_CID_FLASH_LED_MODE: u32 = V4L2_CID_FLASH_CLASS_BASE + 1;
/// Torch intensity in driver units
pub const V4L2_CID_FLASH_TORCH_INTENSITY: u32 = V4L2_CID_FLASH_CLASS_BASE + 8;

// ===== V4L2 Flash LED Mode Menu Values =====

/// LED off
pub const V4L2_FLASH_LED_MODE_NONE: i32 = 0;
/// LED fires on strobe
pub const V4L2_FLASH_LED_MODE_FLASH: i32 = 1;
/// LED stays lit
pub const V4L2_FLASH_LED_MODE_TORCH: i32 = 2;

// ===== V4L2 Control Flags =====
const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;
const V4L2_CTRL_FLAG_INACTIVE: u32 = 0x0010;

// ===== V4L2 ioctl Numbers =====
// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr

/// Get control value (v4l2_control: 8 bytes)
const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

/// Range and state of a control as reported by the driver
#[derive(Debug, Clone)]
pub struct ControlInfo {
    pub id: u32,
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub default_value: i32,
    pub flags: u32,
}

impl ControlInfo {
    pub fn is_disabled(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_DISABLED != 0
    }

    /// Value cannot be changed right now
    pub fn is_inactive(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_INACTIVE != 0
    }

    /// Whether `value` lies inside the advertised range
    pub fn accepts(&self, value: i32) -> bool {
        (self.minimum..=self.maximum).contains(&value)
    }
}

fn extract_name(bytes: &[u8; 32]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

fn open_node(device_path: &str) -> std::io::Result<File> {
    OpenOptions::new().read(true).write(true).open(device_path)
}

/// Query if a control exists and get its information
pub fn query_control(device_path: &str, control_id: u32) -> Option<ControlInfo> {
    let file = open_node(device_path).ok()?;

    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    // SAFETY: qctrl is a valid, properly sized v4l2_queryctrl for the duration of the call
    let result = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            VIDIOC_QUERYCTRL,
            &mut qctrl as *mut V4l2Queryctrl,
        )
    };
    if result < 0 {
        return None;
    }

    Some(ControlInfo {
        id: qctrl.id,
        name: extract_name(&qctrl.name),
        minimum: qctrl.minimum,
        maximum: qctrl.maximum,
        default_value: qctrl.default_value,
        flags: qctrl.flags,
    })
}

/// Get current value of a control
pub fn get_control(device_path: &str, control_id: u32) -> Option<i32> {
    let file = open_node(device_path).ok()?;
    let mut ctrl = V4l2Control {
        id: control_id,
        value: 0,
    };

    // SAFETY: ctrl is a valid v4l2_control for the duration of the call
    let result =
        unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_G_CTRL, &mut ctrl as *mut V4l2Control) };
    if result < 0 {
        debug!(device_path, control_id, "Failed to get V4L2 control");
        return None;
    }
    Some(ctrl.value)
}

/// Set value of a control
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> BackendResult<()> {
    let file = open_node(device_path)?;
    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    // SAFETY: ctrl is a valid v4l2_control for the duration of the call
    let result =
        unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_S_CTRL, &mut ctrl as *mut V4l2Control) };
    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(device_path, control_id, value, ?errno, "Failed to set V4L2 control");
        return Err(BackendError::IoError(format!(
            "control {:#010x} on {}: {}",
            control_id, device_path, errno
        )));
    }
    Ok(())
}

/// Check if a control is available on the device
pub fn has_control(device_path: &str, control_id: u32) -> bool {
    query_control(device_path, control_id).is_some_and(|info| !info.is_disabled())
}

/// Whether the device can drive its LED as a torch
pub fn has_torch(device_path: &str) -> bool {
    query_control(device_path, V4L2_CID_FLASH_LED_MODE)
        .is_some_and(|info| !info.is_disabled() && info.accepts(V4L2_FLASH_LED_MODE_TORCH))
}

/// LED mode value for a torch mode
///
/// V4L2 has no automatic torch, so `Auto` lights the LED continuously.
pub fn led_mode_for(mode: TorchMode) -> i32 {
    match mode {
        TorchMode::Off => V4L2_FLASH_LED_MODE_NONE,
        TorchMode::On | TorchMode::Auto => V4L2_FLASH_LED_MODE_TORCH,
    }
}

/// Switch the device LED to match `mode`
pub fn set_torch(device_path: &str, mode: TorchMode) -> BackendResult<()> {
    let value = led_mode_for(mode);
    set_control(device_path, V4L2_CID_FLASH_LED_MODE, value)?;

    if get_control(device_path, V4L2_CID_FLASH_LED_MODE).is_some_and(|actual| actual != value) {
        return Err(BackendError::Other(format!(
            "{} ignored torch mode {}",
            device_path, mode
        )));
    }
    debug!(device_path, %mode, "Torch mode applied");
    Ok(())
}
