//! Command executor trait for the device control channel.
//!
//! This module defines [`CommandExecutor`], the single I/O boundary of the
//! engine. An executor takes the tokens of one primitive command (see
//! [`DeviceAction::tokens`](crate::action::DeviceAction::tokens)) and returns
//! whatever the channel printed. Anything that exposes the same primitive set
//! can stand in for the adb-backed [`AdbExecutor`](crate::adb::AdbExecutor),
//! which is how the integration tests drive the engine against a simulated
//! device.
//!
//! Executors never retry. A second tap is not a no-op, so repeating a command
//! is left to callers that know what the repetition costs.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the device control channel.
///
/// Every variant is fatal to the current run.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The control-channel binary could not be started.
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A command ran but exited non-zero.
    #[error("Command `{command}` failed (exit {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The channel is up but no usable device is attached.
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    /// Several devices are attached and none was selected.
    #[error("Multiple devices attached ({}); pass a device serial", .0.join(", "))]
    AmbiguousDevice(Vec<String>),
}

/// The primitive command channel to a device.
///
/// Implementors deliver one command and return its raw standard output.
/// Calls are issued strictly one at a time by the engine; implementations do
/// not need to serialize concurrent callers.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run one command and return its output.
    ///
    /// # Errors
    ///
    /// [`TransportError`] when the channel is unreachable or the command is
    /// rejected.
    async fn execute(&self, tokens: &[String]) -> Result<String, TransportError>;

    /// Short description of the target, used in log fields.
    fn target(&self) -> String {
        "device".to_string()
    }
}
