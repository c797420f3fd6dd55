// SPDX-License-Identifier: MPL-2.0

//! Shared fixtures for integration tests

#![allow(dead_code)]

use camera_scanner::backends::camera::virtual_camera::VirtualCameraProvider;
use camera_scanner::backends::camera::{
    BackendResult, CameraDevice, CameraFrame, CameraLocation, CaptureDeviceProvider, DeviceInput,
    PixelFormat, TorchMode,
};
use camera_scanner::backends::metadata::{
    CodeType, DetectedCode, FrameRegion, MetadataPipeline, SessionOutputs,
};
use camera_scanner::backends::permission::{AuthorizationStatus, ManualAuthority};
use camera_scanner::{Platform, PreviewLayer, RenderingSurface};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Record of one `configure` call
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigureCall {
    pub device: String,
    pub types: Vec<CodeType>,
}

#[derive(Default)]
struct StubState {
    supported: Vec<CodeType>,
    configured: Vec<CodeType>,
    calls: Vec<ConfigureCall>,
    outputs: Option<SessionOutputs>,
    starts: usize,
    stops: usize,
}

/// Pipeline whose detections are injected by the test
///
/// Every pipeline the factory creates shares this handle's state, so the
/// test can emit into whichever session is current.
#[derive(Clone)]
pub struct StubPipeline {
    state: Arc<Mutex<StubState>>,
}

impl StubPipeline {
    pub fn new(supported: &[CodeType]) -> Self {
        Self {
            state: Arc::new(Mutex::new(StubState {
                supported: supported.to_vec(),
                ..StubState::default()
            })),
        }
    }

    /// Emit a batch as the running pipeline would, restricted to the
    /// configured types; returns false if not running
    pub fn emit(&self, codes: Vec<DetectedCode>) -> bool {
        let state = self.state.lock().unwrap();
        let Some(outputs) = state.outputs.as_ref() else {
            return false;
        };
        let batch: Vec<DetectedCode> = codes
            .into_iter()
            .filter(|c| state.configured.contains(&c.code_type))
            .collect();
        outputs.detections.emit(batch)
    }

    /// Push a frame to the preview as the running pipeline would
    pub fn present(&self, frame: CameraFrame) -> bool {
        let state = self.state.lock().unwrap();
        state
            .outputs
            .as_ref()
            .is_some_and(|outputs| outputs.preview.push(Arc::new(frame)))
    }

    pub fn configure_calls(&self) -> Vec<ConfigureCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn configured_types(&self) -> Vec<CodeType> {
        self.state.lock().unwrap().configured.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().outputs.is_some()
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }
}

impl MetadataPipeline for StubPipeline {
    fn supported_types(&self) -> Vec<CodeType> {
        self.state.lock().unwrap().supported.clone()
    }

    fn configure(&mut self, input: &DeviceInput, types: &[CodeType]) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.configured = types.to_vec();
        state.calls.push(ConfigureCall {
            device: input.device().id.clone(),
            types: types.to_vec(),
        });
        Ok(())
    }

    fn start(&mut self, outputs: SessionOutputs) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.outputs = Some(outputs);
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.outputs.take().is_some() {
            state.stops += 1;
        }
    }

    fn is_running(&self) -> bool {
        self.state.lock().unwrap().outputs.is_some()
    }
}

/// Surface that counts attach and detach calls
#[derive(Default)]
pub struct StubSurface {
    attached: AtomicUsize,
    detached: AtomicUsize,
    layer: Mutex<Option<PreviewLayer>>,
}

impl StubSurface {
    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn detached(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn is_showing(&self) -> bool {
        self.layer.lock().unwrap().is_some()
    }
}

impl RenderingSurface for StubSurface {
    fn attach_preview(&self, layer: &PreviewLayer) {
        self.attached.fetch_add(1, Ordering::SeqCst);
        *self.layer.lock().unwrap() = Some(layer.clone());
    }

    fn detach_preview(&self, _layer: &PreviewLayer) {
        self.detached.fetch_add(1, Ordering::SeqCst);
        *self.layer.lock().unwrap() = None;
    }
}

/// Everything a controller test needs
pub struct Rig {
    pub cameras: VirtualCameraProvider,
    pub authority: Arc<ManualAuthority>,
    pub pipeline: StubPipeline,
    pub surface: Arc<StubSurface>,
    pub platform: Platform,
}

impl Rig {
    /// Rear camera with torch, front camera without, access granted,
    /// stub pipeline supporting QR and Code 128
    pub fn phone() -> Self {
        let rig = Self::empty(AuthorizationStatus::Granted);
        rig.cameras
            .add_device(CameraDevice::new("rear", "Rear Camera", CameraLocation::Back).with_torch(true));
        rig.cameras
            .add_device(CameraDevice::new("front", "Front Camera", CameraLocation::Front));
        rig
    }

    /// No cameras
    pub fn empty(status: AuthorizationStatus) -> Self {
        let cameras = VirtualCameraProvider::new();
        let authority = Arc::new(ManualAuthority::new(status));
        let pipeline = StubPipeline::new(&[CodeType::Qr, CodeType::Code128]);
        let factory = {
            let pipeline = pipeline.clone();
            move || -> Box<dyn MetadataPipeline> { Box::new(pipeline.clone()) }
        };
        let platform = Platform::new(
            Arc::new(cameras.clone()),
            authority.clone(),
            Arc::new(factory),
        );
        Self {
            cameras,
            authority,
            pipeline,
            surface: Arc::new(StubSurface::default()),
            platform,
        }
    }
}

/// Wraps the virtual cameras with a slow bind and records which thread
/// enumerates devices
pub struct InstrumentedCameras {
    inner: VirtualCameraProvider,
    bind_delay: Duration,
    enumerated_on: Mutex<Vec<String>>,
}

impl InstrumentedCameras {
    pub fn new(inner: VirtualCameraProvider, bind_delay: Duration) -> Self {
        Self {
            inner,
            bind_delay,
            enumerated_on: Mutex::new(Vec::new()),
        }
    }

    /// Thread names of every enumeration so far
    pub fn enumerated_on(&self) -> Vec<String> {
        self.enumerated_on.lock().unwrap().clone()
    }
}

impl CaptureDeviceProvider for InstrumentedCameras {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        let name = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();
        self.enumerated_on.lock().unwrap().push(name);
        self.inner.enumerate_cameras()
    }

    fn bind_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        std::thread::sleep(self.bind_delay);
        self.inner.bind_input(device)
    }

    fn release_input(&self, input: DeviceInput) {
        self.inner.release_input(input)
    }

    fn set_torch_mode(&self, device: &CameraDevice, mode: TorchMode) -> BackendResult<()> {
        self.inner.set_torch_mode(device, mode)
    }
}

impl Rig {
    /// Platform over the same cameras, authority and pipeline, with the
    /// device provider wrapped
    pub fn instrumented(&self, bind_delay: Duration) -> (Platform, Arc<InstrumentedCameras>) {
        let cameras = Arc::new(InstrumentedCameras::new(self.cameras.clone(), bind_delay));
        let platform = Platform::new(
            cameras.clone(),
            self.authority.clone(),
            self.platform.pipelines.clone(),
        );
        (platform, cameras)
    }
}

pub fn gray_frame(value: u8) -> CameraFrame {
    CameraFrame::new(4, 4, PixelFormat::Gray8, vec![value; 16])
}

pub fn qr(value: &str) -> DetectedCode {
    DetectedCode::new(CodeType::Qr, value, FrameRegion::new(0.4, 0.4, 0.2, 0.2))
}

pub fn code128(value: &str) -> DetectedCode {
    DetectedCode::new(CodeType::Code128, value, FrameRegion::new(0.4, 0.4, 0.2, 0.2))
}

/// Callback that records decoded values
pub fn recorder() -> (
    impl FnMut(Vec<DetectedCode>) + Send + 'static,
    Arc<Mutex<Vec<DetectedCode>>>,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (move |codes: Vec<DetectedCode>| sink.lock().unwrap().extend(codes), seen)
}

/// Poll `condition` until it holds or a second passes
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Give queued tasks a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
