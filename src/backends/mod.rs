// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for the scanner's collaborators
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             ScannerController               │
//! └────────────────────┬────────────────────────┘
//!                      │ Platform
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌─────────────┐ ┌──────────┐ ┌──────────┐  │
//! │  │   Camera    │ │ Metadata │ │Permission│  │
//! │  │ V4L2/Virtual│ │   (QR)   │ │          │  │
//! │  └─────────────┘ └──────────┘ └──────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Device enumeration, input binding, torch control
//! - [`metadata`]: Code detection pipelines and result types
//! - [`permission`]: Camera authorization
//! - [`platform`]: Bundle of the above plus capability queries

pub mod camera;
pub mod metadata;
pub mod permission;
pub mod platform;

pub use platform::Platform;
