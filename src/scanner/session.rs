// SPDX-License-Identifier: GPL-3.0-only

//! Capture session and the worker thread that owns it
//!
//! Every session mutation (build, input switch, torch, teardown) runs on one
//! background thread, one command at a time. Binding a device can block for
//! a long time on real hardware, so the caller only awaits the reply.

use crate::backends::camera::{
    BackendError, BackendResult, CameraDevice, CameraSelector, CaptureDeviceProvider, DeviceInput,
    TorchMode, select_device,
};
use crate::backends::metadata::{
    CodeType, MetadataPipeline, MetadataPipelineFactory, SessionOutputs, resolve_types,
};
use crate::constants::session::WORKER_THREAD_NAME;
use crate::preview::PreviewLayer;
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Everything needed to build a session
pub(crate) struct StartRequest {
    pub selector: CameraSelector,
    pub torch: TorchMode,
    pub accepted: Option<Arc<[CodeType]>>,
    pub outputs: SessionOutputs,
}

/// Description of a freshly built session
#[derive(Debug, Clone)]
pub(crate) struct SessionStarted {
    pub device: CameraDevice,
    pub types: Vec<CodeType>,
}

enum SessionCommand {
    Start {
        request: StartRequest,
        reply: oneshot::Sender<BackendResult<SessionStarted>>,
    },
    SwitchInput {
        selector: CameraSelector,
        torch: TorchMode,
        reply: oneshot::Sender<BackendResult<CameraDevice>>,
    },
    SetTorch {
        mode: TorchMode,
        reply: oneshot::Sender<BackendResult<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the session worker thread
///
/// Dropping the handle closes the command channel; the worker tears down
/// any live session and exits, and the drop waits for it.
pub(crate) struct SessionWorker {
    commands: Option<mpsc::Sender<SessionCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl SessionWorker {
    /// Spawn the worker inside the current tokio runtime
    pub fn spawn(
        devices: Arc<dyn CaptureDeviceProvider>,
        pipelines: Arc<dyn MetadataPipelineFactory>,
    ) -> BackendResult<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BackendError::NotAvailable(format!("no tokio runtime: {}", e)))?;
        let (tx, rx) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                // Pipelines spawn their tasks on the caller's runtime
                let _guard = runtime.enter();
                run_worker(rx, devices, pipelines);
            })?;

        debug!("Session worker spawned");
        Ok(Self {
            commands: Some(tx),
            thread: Some(thread),
        })
    }

    fn send(&self, command: SessionCommand) -> BackendResult<()> {
        self.commands
            .as_ref()
            .ok_or_else(|| BackendError::Crashed("session worker closed".to_string()))?
            .send(command)
            .map_err(|_| BackendError::Crashed("session worker exited".to_string()))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> BackendResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        rx.await
            .map_err(|_| BackendError::Crashed("session worker dropped the reply".to_string()))
    }

    /// Build and start a session, replacing any previous one
    pub async fn start(&self, request: StartRequest) -> BackendResult<SessionStarted> {
        self.request(|reply| SessionCommand::Start { request, reply })
            .await?
    }

    /// Move the session to the device `selector` resolves to
    pub async fn switch_input(
        &self,
        selector: CameraSelector,
        torch: TorchMode,
    ) -> BackendResult<CameraDevice> {
        self.request(|reply| SessionCommand::SwitchInput {
            selector,
            torch,
            reply,
        })
        .await?
    }

    pub async fn set_torch(&self, mode: TorchMode) -> BackendResult<()> {
        self.request(|reply| SessionCommand::SetTorch { mode, reply })
            .await?
    }

    /// Tear the session down; resolves once the input is released
    pub async fn stop(&self) -> BackendResult<()> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    /// Guard that tears down whatever a start built unless disarmed
    pub fn start_guard(&self, preview: PreviewLayer) -> StartGuard {
        StartGuard {
            commands: self.commands.clone(),
            preview,
        }
    }
}

/// Undoes a start whose future was dropped before it finished
///
/// Commands run in order, so a Stop sent here lands after the pending Start
/// and releases the input it bound.
pub(crate) struct StartGuard {
    commands: Option<mpsc::Sender<SessionCommand>>,
    preview: PreviewLayer,
}

impl StartGuard {
    /// The start completed; keep the session
    pub fn disarm(mut self) {
        self.commands = None;
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        let Some(commands) = self.commands.take() else {
            return;
        };
        self.preview.reset();
        let (reply, _) = oneshot::channel();
        if commands.send(SessionCommand::Stop { reply }).is_ok() {
            debug!("Start abandoned, session stop queued");
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        drop(self.commands.take());
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Session worker panicked");
        }
    }
}

fn run_worker(
    commands: mpsc::Receiver<SessionCommand>,
    devices: Arc<dyn CaptureDeviceProvider>,
    pipelines: Arc<dyn MetadataPipelineFactory>,
) {
    let mut session: Option<CaptureSession> = None;

    while let Ok(command) = commands.recv() {
        match command {
            SessionCommand::Start { request, reply } => {
                // At most one bound input: the old session goes first
                drop(session.take());
                let result = CaptureSession::build(devices.clone(), pipelines.as_ref(), request)
                    .map(|(built, started)| {
                        session = Some(built);
                        started
                    });
                if let Err(e) = &result {
                    warn!(error = %e, "Failed to build capture session");
                }
                if reply.send(result).is_err() {
                    debug!("Start abandoned by caller, tearing down");
                    session = None;
                }
            }
            SessionCommand::SwitchInput {
                selector,
                torch,
                reply,
            } => {
                let result = match session.as_mut() {
                    Some(session) => session.switch_input(selector, torch),
                    None => Err(BackendError::NotAvailable("no capture session".to_string())),
                };
                // Neither the target nor the previous device could be bound
                if session.as_ref().is_some_and(|s| s.input.is_none()) {
                    warn!("Session lost its input, tearing down");
                    session = None;
                }
                let _ = reply.send(result);
            }
            SessionCommand::SetTorch { mode, reply } => {
                let result = match session.as_mut() {
                    Some(session) => session.set_torch(mode),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Stop { reply } => {
                drop(session.take());
                let _ = reply.send(());
            }
        }
    }

    drop(session);
    debug!("Session worker exiting");
}

/// The bound input plus the pipeline configured on it
struct CaptureSession {
    devices: Arc<dyn CaptureDeviceProvider>,
    pipeline: Box<dyn MetadataPipeline>,
    input: Option<DeviceInput>,
    types: Vec<CodeType>,
    torch: TorchMode,
}

impl CaptureSession {
    fn build(
        devices: Arc<dyn CaptureDeviceProvider>,
        pipelines: &dyn MetadataPipelineFactory,
        request: StartRequest,
    ) -> BackendResult<(Self, SessionStarted)> {
        let cameras = devices.enumerate_cameras();
        let device = select_device(&cameras, request.selector, None)
            .cloned()
            .ok_or_else(|| BackendError::DeviceNotFound("no capture device".to_string()))?;

        let input = devices.bind_input(&device)?;
        let mut pipeline = pipelines.create();
        let types = resolve_types(request.accepted.as_deref(), &pipeline.supported_types());
        if types.is_empty() {
            warn!("None of the accepted code types is supported; preview only");
        }
        if let Err(e) = pipeline.configure(&input, &types) {
            devices.release_input(input);
            return Err(e);
        }

        let mut session = Self {
            devices,
            pipeline,
            input: Some(input),
            types,
            torch: request.torch,
        };
        if let Err(e) = session.apply_torch() {
            warn!(error = %e, "Failed to apply torch mode");
        }
        // Dropping the half-built session releases the input
        session.pipeline.start(request.outputs)?;

        info!(
            device = %device.id,
            name = %device.name,
            selector = %request.selector,
            types = ?session.types,
            "Capture session started"
        );
        let started = SessionStarted {
            device,
            types: session.types.clone(),
        };
        Ok((session, started))
    }

    fn device(&self) -> Option<&CameraDevice> {
        self.input.as_ref().map(DeviceInput::device)
    }

    fn apply_torch(&self) -> BackendResult<()> {
        match self.device() {
            Some(device) if device.has_torch => self.devices.set_torch_mode(device, self.torch),
            _ => Ok(()),
        }
    }

    fn set_torch(&mut self, mode: TorchMode) -> BackendResult<()> {
        self.torch = mode;
        self.apply_torch()
    }

    fn release_current(&mut self) {
        if let Some(input) = self.input.take() {
            let device = input.device();
            if device.has_torch
                && self.torch.is_lit()
                && let Err(e) = self.devices.set_torch_mode(device, TorchMode::Off)
            {
                debug!(error = %e, "Could not switch torch off before release");
            }
            self.devices.release_input(input);
        }
    }

    /// Bind `device` and point the running pipeline at it
    fn attach(&mut self, device: &CameraDevice) -> BackendResult<()> {
        let input = self.devices.bind_input(device)?;
        if let Err(e) = self.pipeline.configure(&input, &self.types) {
            self.devices.release_input(input);
            return Err(e);
        }
        self.input = Some(input);
        if let Err(e) = self.apply_torch() {
            warn!(error = %e, "Failed to apply torch mode");
        }
        Ok(())
    }

    /// Swap the input to another device, keeping the pipeline running with
    /// the same code types
    ///
    /// On failure the previous device is bound again.
    fn switch_input(
        &mut self,
        selector: CameraSelector,
        torch: TorchMode,
    ) -> BackendResult<CameraDevice> {
        let current = self
            .device()
            .cloned()
            .ok_or_else(|| BackendError::NotAvailable("session has no input".to_string()))?;
        let cameras = self.devices.enumerate_cameras();
        let target = select_device(&cameras, selector, Some(&current.id))
            .cloned()
            .ok_or_else(|| {
                BackendError::DeviceNotFound(format!(
                    "no {} camera other than {}",
                    selector, current.id
                ))
            })?;

        info!(from = %current.id, to = %target.id, %selector, "Switching session input");
        self.release_current();
        self.torch = torch;

        match self.attach(&target) {
            Ok(()) => Ok(target),
            Err(e) => {
                warn!(error = %e, device = %target.id, "Switch failed, restoring previous input");
                if let Err(restore) = self.attach(&current) {
                    error!(error = %restore, device = %current.id, "Could not restore previous input");
                    return Err(BackendError::Crashed(format!(
                        "switch to {} failed ({}) and {} could not be restored ({})",
                        target.id, e, current.id, restore
                    )));
                }
                Err(e)
            }
        }
    }

    fn teardown(&mut self) {
        self.pipeline.stop();
        self.release_current();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.input.is_some() {
            info!("Tearing down capture session");
        }
        self.teardown();
    }
}
