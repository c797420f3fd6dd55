// SPDX-License-Identifier: MPL-2.0

//! Live-feed output for rendering surfaces
//!
//! The [`PreviewLayer`] is the handle a host embeds in its layout. The
//! capture pipeline pushes frames into it through a [`PreviewFeed`]; the
//! surface reads the current frame or subscribes to changes. Freezing keeps
//! the last displayed frame as a still and stops forwarding, while capture
//! continues underneath.

use crate::backends::camera::CameraFrame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// A host-owned visual element the live feed is attached to
///
/// The controller only keeps a weak reference; the host decides the
/// surface's lifetime. Both calls happen on the thread that calls
/// `start_scanning`/`stop_scanning`, which is expected to own the surface.
pub trait RenderingSurface: Send + Sync {
    /// Start displaying `layer`
    fn attach_preview(&self, layer: &PreviewLayer);

    /// Stop displaying `layer`
    fn detach_preview(&self, layer: &PreviewLayer);
}

#[derive(Debug, Default)]
struct LayerState {
    forwarding: bool,
    frozen: bool,
    still: Option<Arc<CameraFrame>>,
}

struct LayerInner {
    frames: watch::Sender<Option<Arc<CameraFrame>>>,
    state: Mutex<LayerState>,
    mirrored: AtomicBool,
    frames_presented: AtomicU64,
}

impl LayerInner {
    fn state(&self) -> MutexGuard<'_, LayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Readable handle to the live camera feed
///
/// Cloning yields another handle to the same layer.
#[derive(Clone)]
pub struct PreviewLayer {
    inner: Arc<LayerInner>,
}

impl Default for PreviewLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PreviewLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("PreviewLayer")
            .field("forwarding", &state.forwarding)
            .field("frozen", &state.frozen)
            .field("mirrored", &self.is_mirrored())
            .field("frames_presented", &self.frames_presented())
            .finish()
    }
}

impl PreviewLayer {
    pub fn new() -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            inner: Arc::new(LayerInner {
                frames,
                state: Mutex::new(LayerState::default()),
                mirrored: AtomicBool::new(false),
                frames_presented: AtomicU64::new(0),
            }),
        }
    }

    /// Watch the displayed frame; the receiver wakes on every presented frame
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CameraFrame>>> {
        self.inner.frames.subscribe()
    }

    /// Frame the surface should show right now: the still while frozen,
    /// otherwise the latest forwarded frame
    pub fn current_frame(&self) -> Option<Arc<CameraFrame>> {
        let state = self.inner.state();
        if state.frozen {
            return state.still.clone();
        }
        self.inner.frames.borrow().clone()
    }

    /// Frame retained by the last freeze
    pub fn still_frame(&self) -> Option<Arc<CameraFrame>> {
        self.inner.state().still.clone()
    }

    /// Whether live frames currently reach the surface
    pub fn is_forwarding(&self) -> bool {
        self.inner.state().forwarding
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.state().frozen
    }

    /// Whether the surface should flip the feed horizontally
    pub fn is_mirrored(&self) -> bool {
        self.inner.mirrored.load(Ordering::Relaxed)
    }

    /// Number of live frames forwarded since creation
    pub fn frames_presented(&self) -> u64 {
        self.inner.frames_presented.load(Ordering::Relaxed)
    }

    /// Writer handle for the capture pipeline
    pub(crate) fn feed(&self) -> PreviewFeed {
        PreviewFeed {
            inner: self.inner.clone(),
        }
    }

    /// Begin forwarding live frames
    pub(crate) fn go_live(&self) {
        let mut state = self.inner.state();
        state.forwarding = true;
        state.frozen = false;
        state.still = None;
    }

    /// Retain the displayed frame and stop forwarding
    ///
    /// Returns false if the layer was not live.
    pub(crate) fn freeze(&self) -> bool {
        let mut state = self.inner.state();
        if !state.forwarding {
            return false;
        }
        state.still = self.inner.frames.borrow().clone();
        state.forwarding = false;
        state.frozen = true;
        debug!(has_still = state.still.is_some(), "Preview frozen");
        true
    }

    /// Drop the still and resume forwarding
    pub(crate) fn unfreeze(&self) -> bool {
        let mut state = self.inner.state();
        if !state.frozen {
            return false;
        }
        state.frozen = false;
        state.forwarding = true;
        state.still = None;
        debug!("Preview live again");
        true
    }

    /// Stop forwarding and clear all frames
    pub(crate) fn reset(&self) {
        let mut state = self.inner.state();
        *state = LayerState::default();
        self.inner.frames.send_replace(None);
    }

    pub(crate) fn set_mirrored(&self, mirrored: bool) {
        self.inner.mirrored.store(mirrored, Ordering::Relaxed);
    }
}

/// Write side of a [`PreviewLayer`]
#[derive(Clone)]
pub struct PreviewFeed {
    inner: Arc<LayerInner>,
}

impl PreviewFeed {
    /// Present a live frame; returns false if the layer is not forwarding
    pub fn push(&self, frame: Arc<CameraFrame>) -> bool {
        // Held across the send so a concurrent freeze sees a settled frame
        let state = self.inner.state();
        if !state.forwarding {
            return false;
        }
        self.inner.frames.send_replace(Some(frame));
        self.inner.frames_presented.fetch_add(1, Ordering::Relaxed);
        true
    }
}
