// SPDX-License-Identifier: GPL-3.0-only

//! Scanner controller
//!
//! # Architecture
//!
//! ```text
//!  caller context                      session worker thread
//! ┌──────────────────────┐  commands  ┌───────────────────────────┐
//! │ ScannerController    │ ─────────▶ │ CaptureSession            │
//! │  state machine       │ ◀───────── │  DeviceInput + pipeline   │
//! │  surface attach      │   replies  └─────────────┬─────────────┘
//! │  freeze / unfreeze   │                          │ detections
//! └──────────┬───────────┘                          ▼
//!            │                            forwarding task ──▶ Dispatcher ──▶ callback
//!            ▼
//!       PreviewLayer ◀──────────── frames ──────────┘
//! ```
//!
//! The controller keeps the state machine and everything that touches the
//! rendering surface on the caller's context. Hardware work happens on the
//! worker, which the controller spawns on first start.

pub mod relay;
pub(crate) mod session;
pub mod state;

pub use relay::{Dispatcher, InlineDispatcher, Job, QueueDispatcher, ResultCallback, UiQueue, ui_queue};
pub use state::{ScannerEvent, ScannerState};

use crate::backends::Platform;
use crate::backends::camera::{
    BackendError, CameraDevice, CameraLocation, CameraSelector, TorchMode, select_device,
};
use crate::backends::metadata::{CodeType, DetectedCode, DetectionSink, FrameRegion, SessionOutputs};
use crate::backends::permission::AuthorizationStatus;
use crate::config::ScannerConfig;
use crate::errors::{ScannerError, ScannerResult};
use crate::preview::{PreviewLayer, RenderingSurface};
use relay::{ResultRelay, forward_detections};
use session::{SessionWorker, StartRequest};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-start resources that exist only while a session is live
struct ActiveSession {
    device: CameraDevice,
    types: Vec<CodeType>,
    /// Held so the surface outlives the session it displays
    surface: Arc<dyn RenderingSurface>,
    forwarder: JoinHandle<()>,
}

/// Drives a live capture session for code scanning
///
/// Construction never touches hardware. The session is built on
/// [`start_scanning`](Self::start_scanning) and torn down on
/// [`stop_scanning`](Self::stop_scanning) or when the controller is dropped.
pub struct ScannerController {
    platform: Platform,
    surface: Weak<dyn RenderingSurface>,
    accepted_types: Option<Arc<[CodeType]>>,
    scan_region: FrameRegion,
    mirror_front: bool,
    camera: CameraSelector,
    torch_mode: TorchMode,
    state: ScannerState,
    preview: PreviewLayer,
    relay: Arc<ResultRelay>,
    dispatcher: Arc<dyn Dispatcher>,
    worker: Option<SessionWorker>,
    active: Option<ActiveSession>,
}

impl ScannerController {
    /// Controller accepting every code type the pipeline supports
    pub fn new<S>(platform: Platform, surface: &Arc<S>) -> Self
    where
        S: RenderingSurface + 'static,
    {
        Self::with_config(platform, surface, &ScannerConfig::default())
    }

    /// Controller reporting only `types`
    pub fn with_accepted_types<S, I>(platform: Platform, surface: &Arc<S>, types: I) -> Self
    where
        S: RenderingSurface + 'static,
        I: IntoIterator<Item = CodeType>,
    {
        let config = ScannerConfig {
            accepted_types: Some(types.into_iter().collect()),
            ..ScannerConfig::default()
        };
        Self::with_config(platform, surface, &config)
    }

    /// Controller seeded from a [`ScannerConfig`]
    pub fn with_config<S>(platform: Platform, surface: &Arc<S>, config: &ScannerConfig) -> Self
    where
        S: RenderingSurface + 'static,
    {
        let surface: Weak<S> = Arc::downgrade(surface);
        let surface: Weak<dyn RenderingSurface> = surface;
        Self {
            platform,
            surface,
            accepted_types: config.accepted_types.as_deref().map(Arc::from),
            scan_region: config.scan_region,
            mirror_front: config.mirror_front_camera,
            camera: config.camera,
            torch_mode: config.torch_mode,
            state: ScannerState::Idle,
            preview: PreviewLayer::new(),
            relay: Arc::new(ResultRelay::default()),
            dispatcher: Arc::new(InlineDispatcher),
            worker: None,
            active: None,
        }
    }

    // ===== Capability queries =====

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Whether any usable capture device exists
    pub fn camera_is_present(&self) -> bool {
        self.platform.camera_is_present()
    }

    /// Whether authorization is denied or restricted
    pub fn scanning_is_prohibited(&self) -> bool {
        self.platform.scanning_is_prohibited()
    }

    /// Request camera access; resolves `false` on any failure
    pub async fn request_permission(&self) -> bool {
        self.platform.request_permission().await
    }

    // ===== Start / stop =====

    fn transition(&mut self, event: ScannerEvent) -> bool {
        match self.state.apply(event) {
            Some(next) => {
                debug!(from = %self.state, to = %next, ?event, "Scanner state change");
                self.state = next;
                true
            }
            None => {
                debug!(state = %self.state, ?event, "Ignoring transition");
                false
            }
        }
    }

    /// Start scanning and deliver detected codes to `callback`
    ///
    /// Fails with [`ScannerError::PermissionDenied`] before touching the
    /// worker when access is not granted, and with
    /// [`ScannerError::NoCameraAvailable`] when the worker finds no device.
    /// The controller stays Idle on every failure, including when the
    /// returned future is dropped early. Calling while a session is live
    /// does nothing.
    pub async fn start_scanning<F>(&mut self, callback: F) -> ScannerResult<()>
    where
        F: FnMut(Vec<DetectedCode>) + Send + 'static,
    {
        if self.state != ScannerState::Idle {
            debug!(state = %self.state, "Scanning already active");
            return Ok(());
        }
        if self.platform.authorization_status() != AuthorizationStatus::Granted {
            return Err(ScannerError::PermissionDenied);
        }
        let surface = self
            .surface
            .upgrade()
            .ok_or(ScannerError::SurfaceUnavailable)?;

        if self.worker.is_none() {
            self.worker = Some(SessionWorker::spawn(
                self.platform.devices.clone(),
                self.platform.pipelines.clone(),
            )?);
        }
        let Some(worker) = self.worker.as_ref() else {
            return Err(BackendError::Crashed("session worker missing".to_string()).into());
        };

        let (detections, receiver) =
            DetectionSink::channel(self.accepted_types.clone(), self.scan_region);
        self.preview.reset();
        self.preview.go_live();

        let request = StartRequest {
            selector: self.camera,
            torch: self.torch_mode,
            accepted: self.accepted_types.clone(),
            outputs: SessionOutputs {
                detections,
                preview: self.preview.feed(),
            },
        };
        // Device lookup and binding happen on the worker
        let guard = worker.start_guard(self.preview.clone());
        let started = worker.start(request).await?;
        guard.disarm();

        self.preview
            .set_mirrored(self.mirror_front && started.device.location == CameraLocation::Front);
        surface.attach_preview(&self.preview);
        self.relay.arm(Box::new(callback));
        let forwarder = tokio::spawn(forward_detections(
            receiver,
            self.relay.clone(),
            self.dispatcher.clone(),
            self.preview.clone(),
        ));

        info!(device = %started.device.id, camera = %self.camera, "Scanning started");
        self.active = Some(ActiveSession {
            device: started.device,
            types: started.types,
            surface,
            forwarder,
        });
        self.transition(ScannerEvent::Start);
        Ok(())
    }

    /// Detach the preview, clear the callback and release the camera
    ///
    /// Allowed from Scanning or Frozen; does nothing while Idle. The
    /// callback never runs after this returns.
    pub async fn stop_scanning(&mut self) {
        if !self.state.is_live() {
            return;
        }
        self.relay.disarm();
        self.detach();

        if let Some(worker) = self.worker.as_ref()
            && let Err(e) = worker.stop().await
        {
            warn!(error = %e, "Session worker failed to stop cleanly");
        }
        self.preview.reset();
        self.transition(ScannerEvent::Stop);
        info!("Scanning stopped");
    }

    /// Return to Idle after the worker dropped the session on its own
    fn abandon_session(&mut self) {
        self.relay.disarm();
        self.detach();
        self.preview.reset();
        self.transition(ScannerEvent::Stop);
    }

    fn detach(&mut self) {
        if let Some(active) = self.active.take() {
            active.surface.detach_preview(&self.preview);
            active.forwarder.abort();
        }
    }

    /// True only while Scanning; Frozen does not count
    pub fn is_scanning(&self) -> bool {
        self.state == ScannerState::Scanning
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    // ===== Camera =====

    pub fn camera(&self) -> CameraSelector {
        self.camera
    }

    /// Device bound to the live session
    pub fn active_device(&self) -> Option<&CameraDevice> {
        self.active.as_ref().map(|active| &active.device)
    }

    /// Code types the live session's pipeline was configured with
    pub fn configured_types(&self) -> Option<&[CodeType]> {
        self.active.as_ref().map(|active| active.types.as_slice())
    }

    async fn reconfigure(&mut self, selector: CameraSelector) -> ScannerResult<()> {
        let Some(worker) = self.worker.as_ref() else {
            return Err(ScannerError::DeviceReconfigurationFailed(
                "no capture session".to_string(),
            ));
        };
        let result = worker.switch_input(selector, self.torch_mode).await;
        let device = match result {
            Ok(device) => device,
            Err(e) => {
                if matches!(e, BackendError::Crashed(_)) {
                    warn!(error = %e, "Capture session lost, stopping");
                    self.abandon_session();
                }
                return Err(ScannerError::DeviceReconfigurationFailed(e.to_string()));
            }
        };

        self.preview
            .set_mirrored(self.mirror_front && device.location == CameraLocation::Front);
        if let Some(active) = self.active.as_mut() {
            active.device = device;
        }
        Ok(())
    }

    /// Switch to the opposite camera while Scanning
    ///
    /// Does nothing in any other state, including leaving the stored
    /// selector untouched. Failures are logged; see
    /// [`try_flip_camera`](Self::try_flip_camera).
    pub async fn flip_camera(&mut self) {
        if let Err(e) = self.try_flip_camera().await {
            warn!(error = %e, "Camera flip failed");
        }
    }

    /// Like [`flip_camera`](Self::flip_camera), reporting
    /// [`ScannerError::DeviceReconfigurationFailed`]
    ///
    /// On failure the session stays on the current device.
    pub async fn try_flip_camera(&mut self) -> ScannerResult<()> {
        if self.state != ScannerState::Scanning {
            debug!(state = %self.state, "Flip ignored");
            return Ok(());
        }
        let target = self.camera.opposite();
        self.reconfigure(target).await?;
        self.camera = target;
        info!(camera = %target, "Camera flipped");
        Ok(())
    }

    /// Store the camera selector, switching the live input if a session is
    /// running; otherwise it applies at the next start
    pub async fn set_camera(&mut self, selector: CameraSelector) {
        if selector == self.camera {
            return;
        }
        self.camera = selector;
        if self.state.is_live()
            && let Err(e) = self.reconfigure(selector).await
        {
            warn!(error = %e, camera = %selector, "Could not switch to requested camera");
        }
    }

    // ===== Torch =====

    pub fn torch_mode(&self) -> TorchMode {
        self.torch_mode
    }

    /// Whether the active device, or the one a start would select, has a torch
    pub fn has_torch(&self) -> bool {
        if let Some(active) = self.active.as_ref() {
            return active.device.has_torch;
        }
        let cameras = self.platform.cameras();
        select_device(&cameras, self.camera, None).is_some_and(|device| device.has_torch)
    }

    /// Store the torch mode, applying it to the live device if it has a torch
    pub async fn set_torch_mode(&mut self, mode: TorchMode) {
        self.torch_mode = mode;
        let has_torch = self
            .active
            .as_ref()
            .is_some_and(|active| active.device.has_torch);
        if !has_torch {
            return;
        }
        if let Some(worker) = self.worker.as_ref()
            && let Err(e) = worker.set_torch(mode).await
        {
            warn!(error = %e, %mode, "Failed to apply torch mode");
        }
    }

    /// Off to On, On to Off, Auto to On; silently ignored without a torch
    pub async fn toggle_torch(&mut self) {
        if let Err(e) = self.try_toggle_torch().await {
            debug!(error = %e, "Torch toggle ignored");
        }
    }

    /// Like [`toggle_torch`](Self::toggle_torch), reporting
    /// [`ScannerError::UnsupportedTorch`]
    pub async fn try_toggle_torch(&mut self) -> ScannerResult<()> {
        if !self.has_torch() {
            return Err(ScannerError::UnsupportedTorch);
        }
        let next = self.torch_mode.toggled();
        self.set_torch_mode(next).await;
        debug!(mode = %next, "Torch toggled");
        Ok(())
    }

    // ===== Freeze =====

    /// Hold the displayed frame and withhold results; capture keeps running
    pub fn freeze_capture(&mut self) {
        if self.state != ScannerState::Scanning {
            debug!(state = %self.state, "Freeze ignored");
            return;
        }
        self.preview.freeze();
        self.relay.pause();
        self.transition(ScannerEvent::Freeze);
    }

    /// Resume the live feed and result delivery
    pub fn unfreeze_capture(&mut self) {
        if self.state != ScannerState::Frozen {
            debug!(state = %self.state, "Unfreeze ignored");
            return;
        }
        self.preview.unfreeze();
        self.relay.resume();
        self.transition(ScannerEvent::Unfreeze);
    }

    // ===== Accessors =====

    /// Live-feed handle for embedding in the surface's layout
    pub fn preview_layer(&self) -> &PreviewLayer {
        &self.preview
    }

    /// Accepted code types, `None` meaning everything supported
    pub fn accepted_types(&self) -> Option<&[CodeType]> {
        self.accepted_types.as_deref()
    }

    pub fn scan_region(&self) -> FrameRegion {
        self.scan_region
    }

    /// Region of interest for the next start
    pub fn set_scan_region(&mut self, region: FrameRegion) {
        self.scan_region = region;
    }

    /// Where result callbacks run; takes effect at the next start
    pub fn set_dispatcher(&mut self, dispatcher: Arc<dyn Dispatcher>) {
        self.dispatcher = dispatcher;
    }
}

impl Drop for ScannerController {
    fn drop(&mut self) {
        if self.state.is_live() {
            info!("Scanner dropped while active, stopping");
        }
        self.relay.disarm();
        self.detach();
        self.preview.reset();
        // Dropping the worker tears down the session and joins the thread
        self.worker.take();
    }
}
