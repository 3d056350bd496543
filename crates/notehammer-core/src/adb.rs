//! Interface to the Android Debug Bridge (`adb`).
//!
//! [`AdbExecutor`] is the production [`CommandExecutor`]: every call spawns
//! one `adb -s <serial> ...` process and returns its standard output.
//!
//! # Requirements
//!
//! `adb` from the Android platform tools must be on `PATH`, and the device
//! must have USB debugging enabled and authorized.
//!
//! # Example
//!
//! ```no_run
//! use notehammer_core::adb::{list_devices, resolve_serial, AdbExecutor};
//!
//! # async fn demo() -> Result<(), notehammer_core::driver::TransportError> {
//! for device in list_devices().await? {
//!     println!("{} ({})", device.serial, device.state);
//! }
//! let serial = resolve_serial(None).await?;
//! let executor = AdbExecutor::new(serial);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::driver::{CommandExecutor, TransportError};

const ADB: &str = "adb";

/// A device as listed by `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdbDevice {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub state: String,
    /// The `model:` field, when adb reports one.
    pub model: Option<String>,
}

impl AdbDevice {
    /// True when the device accepts commands.
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

/// Runs primitive commands on one device through `adb`.
#[derive(Debug, Clone)]
pub struct AdbExecutor {
    serial: Option<String>,
}

impl AdbExecutor {
    /// An executor bound to `serial`.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: Some(serial.into()),
        }
    }

    /// An executor that lets adb pick the only attached device.
    pub fn any_device() -> Self {
        Self { serial: None }
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    fn args(&self, tokens: &[String]) -> Vec<String> {
        let mut args = Vec::with_capacity(tokens.len() + 2);
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args.extend(tokens.iter().cloned());
        args
    }
}

#[async_trait]
impl CommandExecutor for AdbExecutor {
    async fn execute(&self, tokens: &[String]) -> Result<String, TransportError> {
        run_adb(&self.args(tokens)).await
    }

    fn target(&self) -> String {
        self.serial.clone().unwrap_or_else(|| "default".to_string())
    }
}

async fn run_adb(args: &[String]) -> Result<String, TransportError> {
    let output = Command::new(ADB)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| TransportError::Spawn {
            program: ADB.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let command = format!("{} {}", ADB, args.join(" "));
        if stderr.contains("no devices") || stderr.contains("not found") || stderr.contains("offline") {
            return Err(TransportError::Unreachable(stderr));
        }
        return Err(TransportError::CommandFailed {
            command,
            code: output.status.code(),
            stderr,
        });
    }
    debug!(bytes = stdout.len(), "adb command complete");
    Ok(stdout)
}

/// Lists attached devices via `adb devices -l`.
pub async fn list_devices() -> Result<Vec<AdbDevice>, TransportError> {
    let output = run_adb(&["devices".to_string(), "-l".to_string()]).await?;
    Ok(parse_devices(&output))
}

/// Picks the device serial to use for a run.
///
/// A requested serial must be attached and ready. Without one, exactly one
/// ready device must be attached.
///
/// # Errors
///
/// - [`TransportError::Unreachable`] if no (matching) device is ready
/// - [`TransportError::AmbiguousDevice`] if several are ready and none was requested
pub async fn resolve_serial(requested: Option<&str>) -> Result<String, TransportError> {
    let devices = list_devices().await?;
    select_serial(&devices, requested)
}

fn select_serial(devices: &[AdbDevice], requested: Option<&str>) -> Result<String, TransportError> {
    let ready: Vec<&AdbDevice> = devices.iter().filter(|d| d.is_ready()).collect();
    match requested {
        Some(serial) => ready
            .iter()
            .find(|d| d.serial == serial)
            .map(|d| d.serial.clone())
            .ok_or_else(|| TransportError::Unreachable(format!("device '{}' is not attached or not authorized", serial))),
        None => match ready.as_slice() {
            [] => Err(TransportError::Unreachable("no devices attached".to_string())),
            [only] => Ok(only.serial.clone()),
            many => Err(TransportError::AmbiguousDevice(many.iter().map(|d| d.serial.clone()).collect())),
        },
    }
}

/// Parses the output of `adb devices [-l]`.
pub fn parse_devices(output: &str) -> Vec<AdbDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?.to_string();
            let state = fields.next()?.to_string();
            let model = fields
                .find_map(|f| f.strip_prefix("model:"))
                .map(str::to_string);
            Some(AdbDevice { serial, state, model })
        })
        .collect()
}
