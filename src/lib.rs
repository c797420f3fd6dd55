// SPDX-License-Identifier: MPL-2.0

//! Camera Scanner - live capture sessions for barcode and QR code scanning
//!
//! This library drives a camera capture session, feeds the live picture to a
//! host-owned rendering surface and reports decoded codes to a callback.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`scanner`]: The [`ScannerController`] state machine and session worker
//! - [`backends`]: Capture devices, detection pipelines and permissions
//! - [`preview`]: Live-feed handle and the rendering surface trait
//! - [`config`]: Initial controller settings
//! - [`logging`]: Tracing subscriber setup
//!
//! # Example
//!
//! ```ignore
//! let platform = Platform::linux();
//! let mut scanner = ScannerController::with_accepted_types(platform, &surface, [CodeType::Qr]);
//! if scanner.request_permission().await {
//!     scanner.start_scanning(|codes| println!("{codes:?}")).await?;
//! }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod preview;
pub mod scanner;

// Re-export commonly used types
pub use backends::Platform;
pub use backends::camera::{CameraDevice, CameraLocation, CameraSelector, TorchMode};
pub use backends::metadata::{CodeType, DetectedCode, FrameRegion};
pub use backends::permission::AuthorizationStatus;
pub use config::ScannerConfig;
pub use errors::{ScannerError, ScannerResult};
pub use preview::{PreviewLayer, RenderingSurface};
pub use scanner::{ScannerController, ScannerState};
