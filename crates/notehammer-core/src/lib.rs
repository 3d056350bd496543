//! # notehammer-core
//!
//! Device automation engine for exporting Kindle annotations from an Android
//! device.
//!
//! The reading app has no API, so every step is inferred from the on-screen
//! UI tree: the engine injects taps, swipes and key presses over a control
//! channel, polls UI dumps, and locates elements by text, label and resource
//! id with layered fallbacks.
//!
//! ## Modules
//!
//! - [`driver`] - [`CommandExecutor`](driver::CommandExecutor) trait, the only I/O boundary
//! - [`adb`] - `adb`-backed executor and device discovery
//! - [`action`] - The primitive command vocabulary
//! - [`element`] / [`locator`] - UI dump parsing and element lookup
//! - [`device`] - Interaction primitives with settle delays and polling waits
//! - [`strategy`] - Named, prioritized target strategies
//! - [`recovery`] - Bounded back navigation to a known screen
//! - [`navigator`] - Reaching a named collection
//! - [`enumerator`] - Paginated, deduplicated item discovery
//! - [`workflow`] - The per-item export state machine
//! - [`coordinator`] - Whole-run orchestration
//! - [`stats`] - Run statistics and reports
//! - [`config`] - Run configuration and the settings file
//!
//! ## External Dependencies
//!
//! - **adb** from the Android platform tools, with USB debugging enabled on the device
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use notehammer_core::adb::{resolve_serial, AdbExecutor};
//! use notehammer_core::config::HammerConfig;
//! use notehammer_core::coordinator::RunCoordinator;
//! use notehammer_core::device::Device;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HammerConfig::load().run_config("To Export");
//! let serial = resolve_serial(None).await?;
//! let device = Device::for_run(Arc::new(AdbExecutor::new(serial)), &config);
//!
//! let mut coordinator = RunCoordinator::new(device, config);
//! let stats = coordinator.run(&CancellationToken::new()).await?;
//! println!("{}", stats.summary());
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod adb;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod driver;
pub mod element;
pub mod enumerator;
pub mod locator;
pub mod navigator;
pub mod recovery;
pub mod stats;
pub mod strategy;
pub mod workflow;
