// SPDX-License-Identifier: GPL-3.0-only

//! QR code detection pipeline
//!
//! Frames are reduced to luma, downscaled and handed to `rqrr`. Every frame
//! is forwarded to the preview; decoding is throttled and runs on the
//! blocking pool so it never holds up the preview.

use super::{CodeType, DetectedCode, FrameRegion, MetadataPipeline, MetadataPipelineFactory};
use super::SessionOutputs;
use crate::backends::camera::{BackendError, BackendResult, CameraFrame, DeviceInput, FrameReceiver};
use crate::config::DetectionSettings;
use crate::constants::detection;
use image::GrayImage;
use image::imageops::{self, FilterType};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// QR code detector
///
/// Optimized for real-time processing with frame downscaling.
#[derive(Debug, Clone)]
pub struct QrDetector {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl Default for QrDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDetector {
    pub fn new() -> Self {
        Self {
            max_dimension: detection::MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    /// Detect QR codes in a camera frame on the blocking pool
    pub async fn detect(&self, frame: Arc<CameraFrame>) -> Vec<DetectedCode> {
        let max_dim = self.max_dimension;
        tokio::task::spawn_blocking(move || detect_sync(&frame, max_dim))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "QR detection task panicked");
                Vec::new()
            })
    }
}

/// Synchronous QR detection (runs in blocking task)
pub fn detect_sync(frame: &CameraFrame, max_dimension: u32) -> Vec<DetectedCode> {
    let start = Instant::now();
    let (width, height) = (frame.width, frame.height);

    let Some(luma) = frame.to_luma() else {
        debug!(width, height, format = ?frame.format, "Frame too short for its dimensions");
        return Vec::new();
    };
    let Some(gray) = GrayImage::from_raw(width, height, luma) else {
        return Vec::new();
    };

    let (gray, scale) = downscale(gray, max_dimension);
    let (proc_width, proc_height) = gray.dimensions();
    trace!(proc_width, proc_height, scale, "Prepared luma image");

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        proc_width as usize,
        proc_height as usize,
        |x, y| gray.get_pixel(x as u32, y as u32).0[0],
    );
    let grids = prepared.detect_grids();

    let mut codes = Vec::with_capacity(grids.len());
    for grid in grids {
        let content = match grid.decode() {
            Ok((_, content)) => content,
            Err(e) => {
                debug!(error = %e, "Failed to decode QR code");
                continue;
            }
        };

        // rqrr reports the outer corners: top-left, top-right, bottom-right, bottom-left
        let corners: Vec<(f32, f32)> = grid
            .bounds
            .iter()
            .map(|p| {
                (
                    (p.x as f32 * scale / width as f32).clamp(0.0, 1.0),
                    (p.y as f32 * scale / height as f32).clamp(0.0, 1.0),
                )
            })
            .collect();
        let bounds = bounding_region(&corners);

        debug!(
            content = %content,
            x = bounds.x,
            y = bounds.y,
            width = bounds.width,
            height = bounds.height,
            "Detected QR code"
        );
        codes.push(DetectedCode::new(CodeType::Qr, content, bounds).with_corners(corners));
    }

    if !codes.is_empty() {
        debug!(
            count = codes.len(),
            total_ms = start.elapsed().as_millis(),
            "QR detection found codes"
        );
    }
    codes
}

/// Downscale so neither side exceeds `max_dimension`; returns the factor to
/// map processed coordinates back to the source frame
fn downscale(gray: GrayImage, max_dimension: u32) -> (GrayImage, f32) {
    let (width, height) = gray.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return (gray, 1.0);
    }
    let scale = (width as f32 / max_dimension as f32).max(height as f32 / max_dimension as f32);
    let new_width = ((width as f32 / scale) as u32).max(1);
    let new_height = ((height as f32 / scale) as u32).max(1);
    let resized = imageops::resize(&gray, new_width, new_height, FilterType::Triangle);
    (resized, width as f32 / new_width as f32)
}

fn bounding_region(corners: &[(f32, f32)]) -> FrameRegion {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (1.0f32, 1.0f32, 0.0f32, 0.0f32);
    for &(x, y) in corners {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    if min_x > max_x || min_y > max_y {
        return FrameRegion::new(0.0, 0.0, 0.0, 0.0);
    }
    FrameRegion::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

struct RunningTask {
    stop: oneshot::Sender<()>,
    switch: mpsc::UnboundedSender<FrameReceiver>,
    handle: JoinHandle<()>,
}

/// Software QR pipeline over a bound input's frame stream
pub struct QrMetadataPipeline {
    detector: QrDetector,
    interval: Duration,
    input: Option<FrameReceiver>,
    detect_qr: bool,
    running: Option<RunningTask>,
}

impl QrMetadataPipeline {
    pub fn new(detector: QrDetector, interval: Duration) -> Self {
        Self {
            detector,
            interval,
            input: None,
            detect_qr: true,
            running: None,
        }
    }
}

impl MetadataPipeline for QrMetadataPipeline {
    fn supported_types(&self) -> Vec<CodeType> {
        vec![CodeType::Qr]
    }

    fn configure(&mut self, input: &DeviceInput, types: &[CodeType]) -> BackendResult<()> {
        let detect_qr = types.contains(&CodeType::Qr);
        // Subscribing here means no frame published after this call is missed
        let frames = input.subscribe();

        match &self.running {
            Some(task) => {
                if detect_qr != self.detect_qr {
                    return Err(BackendError::FormatNotSupported(
                        "code types cannot change while running".to_string(),
                    ));
                }
                task.switch
                    .send(frames)
                    .map_err(|_| BackendError::Crashed("QR pipeline task exited".to_string()))?;
                debug!(device = %input.device().id, "QR pipeline switched input");
            }
            None => {
                self.detect_qr = detect_qr;
                self.input = Some(frames);
                debug!(device = %input.device().id, detect_qr, "QR pipeline configured");
            }
        }
        Ok(())
    }

    fn start(&mut self, outputs: SessionOutputs) -> BackendResult<()> {
        if self.running.is_some() {
            return Ok(());
        }
        let frames = self
            .input
            .take()
            .ok_or_else(|| BackendError::InitializationFailed("pipeline has no input".to_string()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BackendError::NotAvailable(format!("no tokio runtime: {}", e)))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let (switch_tx, switch_rx) = mpsc::unbounded_channel();
        let handle = runtime.spawn(run_pipeline(
            self.detector.clone(),
            self.interval,
            self.detect_qr,
            frames,
            outputs,
            stop_rx,
            switch_rx,
        ));

        info!(detect_qr = self.detect_qr, interval_ms = self.interval.as_millis(), "QR pipeline started");
        self.running = Some(RunningTask {
            stop: stop_tx,
            switch: switch_tx,
            handle,
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.running.take() {
            let _ = task.stop.send(());
            task.handle.abort();
            info!("QR pipeline stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }
}

impl Drop for QrMetadataPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn join_detection(task: &mut Option<JoinHandle<Vec<DetectedCode>>>) -> Vec<DetectedCode> {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    let codes = handle.await.unwrap_or_else(|e| {
        warn!(error = %e, "QR detection task failed");
        Vec::new()
    });
    *task = None;
    codes
}

async fn run_pipeline(
    detector: QrDetector,
    interval: Duration,
    detect_qr: bool,
    mut frames: FrameReceiver,
    outputs: SessionOutputs,
    mut stop: oneshot::Receiver<()>,
    mut switch: mpsc::UnboundedReceiver<FrameReceiver>,
) {
    let mut closed = false;
    let mut last_detection: Option<Instant> = None;
    let mut in_flight: Option<JoinHandle<Vec<DetectedCode>>> = None;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            Some(next) = switch.recv() => {
                frames = next;
                closed = false;
            }
            frame = frames.recv(), if !closed => match frame {
                Ok(frame) => {
                    outputs.preview.push(frame.clone());
                    let due = last_detection.is_none_or(|t| t.elapsed() >= interval);
                    if detect_qr && due && in_flight.is_none() {
                        last_detection = Some(Instant::now());
                        let detector = detector.clone();
                        in_flight = Some(tokio::spawn(async move { detector.detect(frame).await }));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    trace!(skipped, "QR pipeline lagging behind capture");
                }
                Err(RecvError::Closed) => {
                    debug!("Input frame stream closed");
                    closed = true;
                }
            },
            codes = join_detection(&mut in_flight) => {
                if !codes.is_empty() && !outputs.detections.emit(codes) {
                    debug!("Detection receiver gone, stopping QR pipeline");
                    break;
                }
            }
        }
    }

    if let Some(task) = in_flight {
        task.abort();
    }
}

/// Builds [`QrMetadataPipeline`]s with shared settings
#[derive(Debug, Clone)]
pub struct QrPipelineFactory {
    max_dimension: u32,
    interval: Duration,
}

impl Default for QrPipelineFactory {
    fn default() -> Self {
        Self::from_settings(&DetectionSettings::default())
    }
}

impl QrPipelineFactory {
    pub fn new(max_dimension: u32, interval: Duration) -> Self {
        Self {
            max_dimension,
            interval,
        }
    }

    pub fn from_settings(settings: &DetectionSettings) -> Self {
        Self::new(
            settings.max_dimension,
            Duration::from_millis(settings.interval_ms),
        )
    }
}

impl MetadataPipelineFactory for QrPipelineFactory {
    fn create(&self) -> Box<dyn MetadataPipeline> {
        Box::new(QrMetadataPipeline::new(
            QrDetector::with_max_dimension(self.max_dimension),
            self.interval,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{CameraDevice, CameraLocation, PixelFormat};
    use crate::backends::metadata::DetectionSink;
    use crate::preview::PreviewLayer;
    use tokio::sync::broadcast;

    fn blank(width: u32, height: u32) -> CameraFrame {
        CameraFrame::new(width, height, PixelFormat::Gray8, vec![255u8; (width * height) as usize])
    }

    #[test]
    fn test_blank_frame_has_no_codes() {
        assert!(detect_sync(&blank(64, 48), 640).is_empty());
    }

    #[test]
    fn test_short_frame_is_skipped() {
        let frame = CameraFrame::new(64, 48, PixelFormat::Gray8, vec![0u8; 10]);
        assert!(detect_sync(&frame, 640).is_empty());
    }

    #[test]
    fn test_downscale_keeps_aspect() {
        let (img, scale) = downscale(GrayImage::new(1280, 720), 640);
        assert_eq!(img.dimensions(), (640, 360));
        assert!((scale - 2.0).abs() < 1e-6);

        let (img, scale) = downscale(GrayImage::new(320, 240), 640);
        assert_eq!(img.dimensions(), (320, 240));
        assert_eq!(scale, 1.0);
    }

    #[test]
    fn test_bounding_region() {
        let region = bounding_region(&[(0.2, 0.3), (0.6, 0.25), (0.65, 0.7), (0.15, 0.75)]);
        assert!((region.x - 0.15).abs() < 1e-6);
        assert!((region.y - 0.25).abs() < 1e-6);
        assert!((region.width - 0.5).abs() < 1e-6);
        assert!((region.height - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_pipeline_feeds_preview_until_frozen() {
        let (frames, _) = broadcast::channel(4);
        let input = DeviceInput::new(
            CameraDevice::new("virtual:0", "Virtual", CameraLocation::Back),
            frames.clone(),
        );
        let layer = PreviewLayer::new();
        layer.go_live();
        let (detections, _rx) = DetectionSink::channel(None, FrameRegion::FULL);

        let mut pipeline = QrPipelineFactory::default().create();
        pipeline.configure(&input, &[CodeType::Qr]).unwrap();
        pipeline
            .start(SessionOutputs {
                detections,
                preview: layer.feed(),
            })
            .unwrap();
        assert!(pipeline.is_running());

        let mut changes = layer.subscribe();
        frames.send(Arc::new(blank(8, 8))).unwrap();
        changes.changed().await.unwrap();
        assert_eq!(layer.frames_presented(), 1);

        assert!(layer.freeze());
        frames.send(Arc::new(blank(8, 8))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(layer.frames_presented(), 1);

        pipeline.stop();
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn test_start_without_input_fails() {
        let mut pipeline = QrPipelineFactory::default().create();
        let layer = PreviewLayer::new();
        let (detections, _rx) = DetectionSink::channel(None, FrameRegion::FULL);
        let result = pipeline.start(SessionOutputs {
            detections,
            preview: layer.feed(),
        });
        assert!(result.is_err());
    }
}
