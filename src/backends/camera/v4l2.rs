// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture device provider
//!
//! Enumerates `/dev/video*` capture nodes and streams frames from the bound
//! node on a dedicated capture thread using memory-mapped buffers.

use super::types::*;
use super::v4l2_controls;
use super::{CaptureDeviceProvider, DeviceInput};
use crate::constants::{capture, timing};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// A running capture thread for one bound device
struct CaptureHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(()) => debug!("Capture thread stopped"),
                Err(_) => warn!("Capture thread panicked"),
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Provider for V4L2 capture nodes
#[derive(Default)]
pub struct V4l2DeviceProvider {
    active: Mutex<HashMap<String, CaptureHandle>>,
}

impl V4l2DeviceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, CaptureHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Probe a node and describe it if it can capture video
fn probe_node(path: &str) -> Option<CameraDevice> {
    let dev = Device::with_path(path).ok()?;
    let caps = dev.query_caps().ok()?;
    if !caps
        .capabilities
        .contains(v4l::capability::Flags::VIDEO_CAPTURE)
    {
        return None;
    }
    // UVC metadata nodes report capture capability but expose no formats
    if dev.enum_formats().map(|f| f.is_empty()).unwrap_or(true) {
        return None;
    }

    let name = caps.card.trim().to_string();
    Some(
        CameraDevice::new(path, name.as_str(), CameraLocation::from_name(&name))
            .with_path(path)
            .with_torch(v4l2_controls::has_torch(path)),
    )
}

impl CaptureDeviceProvider for V4l2DeviceProvider {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        let mut nodes: Vec<String> = v4l::context::enum_devices()
            .iter()
            .map(|node| node.path().to_string_lossy().into_owned())
            .filter(|path| {
                path.strip_prefix(capture::DEVICE_DIR)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .is_some_and(|name| name.starts_with(capture::DEVICE_PREFIX))
            })
            .collect();
        nodes.sort();

        let devices: Vec<CameraDevice> = nodes.iter().filter_map(|path| probe_node(path)).collect();
        debug!(count = devices.len(), "Enumerated V4L2 cameras");
        devices
    }

    fn bind_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        let mut active = self.active();
        if active.contains_key(&device.id) {
            return Err(BackendError::Busy(device.id.clone()));
        }

        let (frames, _) = broadcast::channel(capture::FRAME_CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = {
            let path = device.path.clone();
            let frames = frames.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name(format!("capture-{}", device.id.trim_start_matches("/dev/")))
                .spawn(move || {
                    if let Err(e) = capture_loop(&path, frames, running, ready_tx) {
                        error!(device_path = %path, error = %e, "Capture loop failed");
                    }
                })?
        };

        let handle = CaptureHandle {
            running,
            thread: Some(thread),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                handle.stop();
                return Err(e);
            }
            Err(_) => {
                handle.stop();
                return Err(BackendError::Crashed(format!(
                    "capture thread for {} exited during setup",
                    device.id
                )));
            }
        }

        info!(id = %device.id, name = %device.name, "V4L2 input bound");
        active.insert(device.id.clone(), handle);
        Ok(DeviceInput::new(device.clone(), frames))
    }

    fn release_input(&self, input: DeviceInput) {
        let handle = self.active().remove(&input.device().id);
        if let Some(handle) = handle {
            handle.stop();
            info!(id = %input.device().id, "V4L2 input released");
        }
    }

    fn set_torch_mode(&self, device: &CameraDevice, mode: TorchMode) -> BackendResult<()> {
        if !device.has_torch {
            return Err(BackendError::Other(format!("{} has no torch", device.id)));
        }
        v4l2_controls::set_torch(&device.path, mode)
    }
}

/// Negotiated stream layout
#[derive(Debug, Clone, Copy)]
struct StreamLayout {
    width: u32,
    height: u32,
    stride: u32,
    encoding: Encoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Raw(PixelFormat),
    Mjpeg,
}

impl Encoding {
    fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"MJPG" | b"JPEG" => Some(Encoding::Mjpeg),
            other => PixelFormat::from_fourcc(other).map(Encoding::Raw),
        }
    }
}

/// Open the node, negotiate a format and push frames until stopped
///
/// Setup failures are reported through `ready` so `bind_input` can return
/// them synchronously.
fn capture_loop(
    device_path: &str,
    frames: FrameSender,
    running: Arc<AtomicBool>,
    ready: mpsc::Sender<BackendResult<()>>,
) -> BackendResult<()> {
    let setup = || -> BackendResult<(Device, StreamLayout)> {
        let dev = Device::with_path(device_path).map_err(|e| {
            BackendError::InitializationFailed(format!("open {}: {}", device_path, e))
        })?;

        let mut format = dev.format()?;
        format.width = capture::WIDTH;
        format.height = capture::HEIGHT;
        format.fourcc = v4l::FourCC::new(b"YUYV");
        let format = match dev.set_format(&format) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "Could not set format, using current device format");
                dev.format()?
            }
        };

        let encoding = Encoding::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            BackendError::FormatNotSupported(format!("{} on {}", format.fourcc, device_path))
        })?;
        info!(
            device_path,
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "Negotiated capture format"
        );

        Ok((
            dev,
            StreamLayout {
                width: format.width,
                height: format.height,
                stride: format.stride,
                encoding,
            },
        ))
    };

    let (dev, layout) = match setup() {
        Ok(v) => v,
        Err(e) => {
            let _ = ready.send(Err(e.clone()));
            return Err(e);
        }
    };

    let mut stream = match MmapStream::with_buffers(&dev, Type::VideoCapture, capture::BUFFER_COUNT)
    {
        Ok(stream) => stream,
        Err(e) => {
            let e = BackendError::InitializationFailed(format!("buffer stream: {}", e));
            let _ = ready.send(Err(e.clone()));
            return Err(e);
        }
    };
    let _ = ready.send(Ok(()));

    let mut frame_num: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let (buf, meta) = match stream.next() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to dequeue capture buffer");
                std::thread::sleep(Duration::from_millis(timing::CAPTURE_RETRY_MS));
                continue;
            }
        };

        let used = (meta.bytesused as usize).min(buf.len());
        let frame = match decode_buffer(&buf[..used], layout) {
            Some(frame) => frame,
            None => continue,
        };

        frame_num += 1;
        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                frame = frame_num,
                sequence = meta.sequence,
                size = used,
                "Frame captured"
            );
        }

        // No subscribers just means nobody is looking yet
        let _ = frames.send(Arc::new(frame));
    }

    info!(device_path, "Capture loop ended");
    Ok(())
}

fn decode_buffer(buf: &[u8], layout: StreamLayout) -> Option<CameraFrame> {
    match layout.encoding {
        Encoding::Raw(format) => Some(CameraFrame {
            width: layout.width,
            height: layout.height,
            data: Arc::from(buf),
            format,
            stride: layout.stride.max(layout.width * format.bytes_per_pixel() as u32),
            captured_at: Instant::now(),
        }),
        Encoding::Mjpeg => {
            match image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg) {
                Ok(img) => {
                    let rgba = img.to_rgba8();
                    let (width, height) = rgba.dimensions();
                    Some(CameraFrame::new(
                        width,
                        height,
                        PixelFormat::RGBA,
                        rgba.into_raw(),
                    ))
                }
                Err(e) => {
                    debug!(error = %e, "Dropping undecodable MJPEG frame");
                    None
                }
            }
        }
    }
}
