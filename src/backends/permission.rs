// SPDX-License-Identifier: GPL-3.0-only

//! Camera access authorization
//!
//! A [`PermissionAuthority`] reports and requests camera access using
//! callbacks, the way platform consent APIs do. [`PermissionBroker`] turns
//! that into a single awaitable request: concurrent callers share one
//! in-flight request, so the user sees one prompt and every caller gets the
//! same answer.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Camera authorization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationStatus {
    /// The user has not been asked yet
    #[default]
    Undetermined,
    Granted,
    Denied,
    /// Access is blocked by policy and cannot be requested
    Restricted,
}

impl AuthorizationStatus {
    /// Starting a scan would certainly fail
    pub fn is_prohibited(self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted
        )
    }
}

/// Callback receiving the outcome of an access request
pub type AccessCallback = Box<dyn FnOnce(bool) + Send>;

/// Source of camera authorization decisions
pub trait PermissionAuthority: Send + Sync {
    fn current_status(&self) -> AuthorizationStatus;

    /// Ask for access; `callback` runs exactly once, possibly immediately
    fn request_access(&self, callback: AccessCallback);
}

type PendingRequest = Shared<BoxFuture<'static, bool>>;

/// Single-flight front end for a [`PermissionAuthority`]
#[derive(Clone)]
pub struct PermissionBroker {
    authority: Arc<dyn PermissionAuthority>,
    pending: Arc<Mutex<Option<PendingRequest>>>,
}

impl PermissionBroker {
    pub fn new(authority: Arc<dyn PermissionAuthority>) -> Self {
        Self {
            authority,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> AuthorizationStatus {
        self.authority.current_status()
    }

    /// Resolve access, prompting only if the status is undetermined
    ///
    /// Never fails: a request the authority drops resolves to `false`.
    pub async fn request(&self) -> bool {
        match self.status() {
            AuthorizationStatus::Granted => return true,
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => return false,
            AuthorizationStatus::Undetermined => {}
        }

        let request = {
            let mut pending = self.pending();
            match pending.as_ref() {
                Some(request) => {
                    debug!("Joining in-flight permission request");
                    request.clone()
                }
                None => {
                    info!("Requesting camera access");
                    let (tx, rx) = oneshot::channel();
                    self.authority.request_access(Box::new(move |granted| {
                        let _ = tx.send(granted);
                    }));
                    let request = async move { rx.await.unwrap_or(false) }.boxed().shared();
                    *pending = Some(request.clone());
                    request
                }
            }
        };

        let granted = request.clone().await;

        let mut pending = self.pending();
        if pending
            .as_ref()
            .is_some_and(|current| Shared::ptr_eq(current, &request))
        {
            *pending = None;
        }
        debug!(granted, "Permission request resolved");
        granted
    }
}

/// Authority for Linux device nodes
///
/// Access is granted when the process can read and write at least one
/// `/dev/video*` node. There is no consent prompt, so a request resolves
/// from the current node permissions.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone)]
pub struct DevicePermissionAuthority {
    device_dir: std::path::PathBuf,
}

#[cfg(target_os = "linux")]
impl Default for DevicePermissionAuthority {
    fn default() -> Self {
        Self::new(crate::constants::capture::DEVICE_DIR)
    }
}

#[cfg(target_os = "linux")]
impl DevicePermissionAuthority {
    pub fn new(device_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }

    fn video_nodes(&self) -> Vec<std::path::PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.device_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(crate::constants::capture::DEVICE_PREFIX)
            })
            .map(|entry| entry.path())
            .collect()
    }

    fn is_accessible(path: &std::path::Path) -> bool {
        use std::os::unix::ffi::OsStrExt;
        let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
            return false;
        };
        // SAFETY: c_path is a valid NUL-terminated string
        unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
    }
}

#[cfg(target_os = "linux")]
impl PermissionAuthority for DevicePermissionAuthority {
    fn current_status(&self) -> AuthorizationStatus {
        let nodes = self.video_nodes();
        if nodes.is_empty() {
            AuthorizationStatus::Undetermined
        } else if nodes.iter().any(|node| Self::is_accessible(node)) {
            AuthorizationStatus::Granted
        } else {
            AuthorizationStatus::Denied
        }
    }

    fn request_access(&self, callback: AccessCallback) {
        callback(self.current_status() == AuthorizationStatus::Granted);
    }
}

#[derive(Default)]
struct ManualState {
    status: AuthorizationStatus,
    waiters: Vec<AccessCallback>,
}

/// Authority driven by the host application
///
/// For hosts that run their own consent UI: requests made while undetermined
/// wait until [`resolve`](Self::resolve) is called.
#[derive(Default)]
pub struct ManualAuthority {
    state: Mutex<ManualState>,
    prompts: AtomicUsize,
}

impl ManualAuthority {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self {
            state: Mutex::new(ManualState {
                status,
                waiters: Vec::new(),
            }),
            prompts: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: AuthorizationStatus) {
        self.state().status = status;
    }

    /// Record the user's decision and answer every waiting request
    pub fn resolve(&self, granted: bool) {
        let waiters = {
            let mut state = self.state();
            state.status = if granted {
                AuthorizationStatus::Granted
            } else {
                AuthorizationStatus::Denied
            };
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            waiter(granted);
        }
    }

    /// Number of prompts that would have been shown
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn pending_requests(&self) -> usize {
        self.state().waiters.len()
    }
}

impl PermissionAuthority for ManualAuthority {
    fn current_status(&self) -> AuthorizationStatus {
        self.state().status
    }

    fn request_access(&self, callback: AccessCallback) {
        let mut state = self.state();
        match state.status {
            AuthorizationStatus::Undetermined => {
                self.prompts.fetch_add(1, Ordering::SeqCst);
                state.waiters.push(callback);
            }
            status => {
                drop(state);
                callback(status == AuthorizationStatus::Granted);
            }
        }
    }
}
