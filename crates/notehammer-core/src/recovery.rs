//! Return-to-known-state via bounded back navigation.
//!
//! Used by home recovery, by the return step of the export workflow and by
//! every workflow failure path.

use tracing::debug;

use crate::device::{Device, DeviceError};
use crate::locator::UiSnapshot;

/// How a [`return_to`] call ended.
#[derive(Debug, Clone)]
pub struct Recovery {
    /// True when the predicate held on the last snapshot.
    pub reached: bool,
    /// Number of back presses issued.
    pub presses: u32,
    /// The screen as last seen.
    pub last: UiSnapshot,
}

impl Recovery {
    /// Visible text at the end, for diagnostics.
    pub fn visible(&self) -> Vec<String> {
        self.last.text_inventory()
    }
}

/// Presses back until `predicate` holds on a fresh snapshot, at most
/// `max_presses` times.
///
/// The screen is checked before the first press, so a call made while
/// already in the target state presses nothing.
pub async fn return_to<F>(device: &Device, max_presses: u32, predicate: F) -> Result<Recovery, DeviceError>
where
    F: Fn(&UiSnapshot) -> bool,
{
    let mut presses = 0;
    loop {
        let snapshot = device.snapshot().await?;
        if predicate(&snapshot) {
            debug!(presses, "known state reached");
            return Ok(Recovery {
                reached: true,
                presses,
                last: snapshot,
            });
        }
        if presses >= max_presses {
            debug!(presses, "known state not reached");
            return Ok(Recovery {
                reached: false,
                presses,
                last: snapshot,
            });
        }
        device.press_back().await?;
        presses += 1;
    }
}

