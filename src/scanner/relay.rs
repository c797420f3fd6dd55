// SPDX-License-Identifier: GPL-3.0-only

//! Delivery of detection batches to the caller's callback
//!
//! Batches leave the pipeline on a tokio task and are handed to a
//! [`Dispatcher`], which decides where the callback runs. The
//! [`ResultRelay`] gate is checked when the callback is about to run, so a
//! batch queued before a stop or freeze is dropped rather than delivered.

use crate::backends::metadata::{DetectedCode, DetectionReceiver};
use crate::preview::PreviewLayer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

/// Caller-supplied sink for detected codes
pub type ResultCallback = Box<dyn FnMut(Vec<DetectedCode>) + Send>;

/// Unit of work handed to a [`Dispatcher`]
pub type Job = Box<dyn FnOnce() + Send>;

/// Runs result callbacks on the context the caller expects
///
/// Implementations must run jobs in the order they were dispatched.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs callbacks directly on the delivery task
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Queues callbacks for a host event loop
///
/// Pair it with the [`UiQueue`] from [`ui_queue`] and drain that queue on
/// the thread that owns the UI.
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            trace!("UI queue closed, dropping result job");
        }
    }
}

/// Receiving side of a [`QueueDispatcher`]
pub struct UiQueue {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl UiQueue {
    /// Run every job queued so far; returns how many ran
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Run jobs as they arrive until every dispatcher is dropped
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }
}

/// Create a connected dispatcher and queue
pub fn ui_queue() -> (QueueDispatcher, UiQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueDispatcher { tx }, UiQueue { rx })
}

#[derive(Default)]
struct RelaySlot {
    callback: Option<ResultCallback>,
    generation: u64,
}

/// Gate between detection batches and the registered callback
#[derive(Default)]
pub(crate) struct ResultRelay {
    slot: Mutex<RelaySlot>,
    live: AtomicBool,
    generation: AtomicU64,
}

impl ResultRelay {
    fn slot(&self) -> MutexGuard<'_, RelaySlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a callback and open the gate; returns the new generation
    pub fn arm(&self, callback: ResultCallback) -> u64 {
        let mut slot = self.slot();
        slot.generation += 1;
        slot.callback = Some(callback);
        self.generation.store(slot.generation, Ordering::SeqCst);
        self.live.store(true, Ordering::SeqCst);
        slot.generation
    }

    /// Close the gate and drop the callback
    ///
    /// Waits for a callback that is currently running, so none runs after
    /// this returns.
    pub fn disarm(&self) {
        self.live.store(false, Ordering::SeqCst);
        let callback = self.slot().callback.take();
        drop(callback);
    }

    pub fn pause(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        let armed = self.slot().callback.is_some();
        self.live.store(armed, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Hand a batch to the callback armed as `generation`
    pub fn deliver(&self, generation: u64, batch: Vec<DetectedCode>) -> bool {
        let mut slot = self.slot();
        if !self.is_live() || slot.generation != generation {
            trace!(generation, "Dropping batch for inactive callback");
            return false;
        }
        match slot.callback.as_mut() {
            Some(callback) => {
                callback(batch);
                true
            }
            None => false,
        }
    }
}

/// Forward batches from the pipeline to the dispatcher in arrival order
///
/// Bounds are mirrored when the preview is, so they match what is shown.
pub(crate) async fn forward_detections(
    mut detections: DetectionReceiver,
    relay: Arc<ResultRelay>,
    dispatcher: Arc<dyn Dispatcher>,
    preview: PreviewLayer,
) {
    while let Some(batch) = detections.recv().await {
        if !relay.is_live() {
            trace!(count = batch.len(), "Relay closed, dropping batch");
            continue;
        }

        let batch = if preview.is_mirrored() {
            batch
                .into_iter()
                .map(|mut code| {
                    code.bounds = code.bounds.mirrored();
                    code.corners = code.corners.iter().map(|&(x, y)| (1.0 - x, y)).collect();
                    code
                })
                .collect()
        } else {
            batch
        };

        let generation = relay.generation();
        let relay = relay.clone();
        dispatcher.dispatch(Box::new(move || {
            relay.deliver(generation, batch);
        }));
    }
}
