// SPDX-License-Identifier: MPL-2.0

//! Metadata detection pipelines
//!
//! A pipeline analyses frames from the bound input and reports decoded codes.
//! The session configures it with an input and the accepted code types, then
//! starts it with the outputs it should feed:
//!
//! ```text
//! DeviceInput ──frames──▶ MetadataPipeline ──codes──▶ DetectionSink ──▶ ResultRelay
//!                               │
//!                               └──frames──▶ PreviewFeed ──▶ PreviewLayer
//! ```
//!
//! Reconfiguring a running pipeline with a new input must keep it running
//! with the same code types.

pub mod qr;
pub mod types;

pub use qr::{QrDetector, QrMetadataPipeline, QrPipelineFactory};
pub use types::*;

use crate::backends::camera::{BackendResult, DeviceInput};
use crate::preview::PreviewFeed;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// A detection pipeline driven by the capture session
pub trait MetadataPipeline: Send {
    /// Code types this pipeline can report
    fn supported_types(&self) -> Vec<CodeType>;

    /// Bind the pipeline to an input and restrict it to `types`
    ///
    /// Called before [`start`](Self::start), and again on a running pipeline
    /// when the session switches input.
    fn configure(&mut self, input: &DeviceInput, types: &[CodeType]) -> BackendResult<()>;

    /// Start analysing frames
    fn start(&mut self, outputs: SessionOutputs) -> BackendResult<()>;

    /// Stop analysing frames; no detections are emitted afterwards
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Creates one pipeline per capture session
pub trait MetadataPipelineFactory: Send + Sync {
    fn create(&self) -> Box<dyn MetadataPipeline>;
}

impl<F> MetadataPipelineFactory for F
where
    F: Fn() -> Box<dyn MetadataPipeline> + Send + Sync,
{
    fn create(&self) -> Box<dyn MetadataPipeline> {
        self()
    }
}

/// Everything a running pipeline writes to
#[derive(Clone)]
pub struct SessionOutputs {
    pub detections: DetectionSink,
    pub preview: PreviewFeed,
}

/// Receiving end of a [`DetectionSink`]
pub type DetectionReceiver = mpsc::UnboundedReceiver<Vec<DetectedCode>>;

/// Ordered channel of detection batches
///
/// Drops codes whose type was not accepted or whose centre lies outside the
/// scan region; batches left empty are not sent.
#[derive(Clone)]
pub struct DetectionSink {
    tx: mpsc::UnboundedSender<Vec<DetectedCode>>,
    accepted: Option<Arc<[CodeType]>>,
    region: FrameRegion,
}

impl DetectionSink {
    pub fn channel(
        accepted: Option<Arc<[CodeType]>>,
        region: FrameRegion,
    ) -> (Self, DetectionReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                accepted,
                region,
            },
            rx,
        )
    }

    pub fn accepts(&self, code: &DetectedCode) -> bool {
        let type_ok = self
            .accepted
            .as_ref()
            .is_none_or(|types| types.contains(&code.code_type));
        let (cx, cy) = code.bounds.center();
        type_ok && self.region.contains(cx, cy)
    }

    /// Send a batch; returns false once the receiver is gone
    pub fn emit(&self, codes: Vec<DetectedCode>) -> bool {
        let batch: Vec<DetectedCode> = codes.into_iter().filter(|c| self.accepts(c)).collect();
        if batch.is_empty() {
            return !self.tx.is_closed();
        }
        trace!(count = batch.len(), "Emitting detection batch");
        self.tx.send(batch).is_ok()
    }
}

/// Types a session should configure: the accepted set narrowed to what the
/// pipeline supports, or everything supported when nothing was specified
pub fn resolve_types(accepted: Option<&[CodeType]>, supported: &[CodeType]) -> Vec<CodeType> {
    match accepted {
        Some(accepted) => supported
            .iter()
            .copied()
            .filter(|t| accepted.contains(t))
            .collect(),
        None => supported.to_vec(),
    }
}
