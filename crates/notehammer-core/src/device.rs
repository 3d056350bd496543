//! Interaction primitives.
//!
//! [`Device`] wraps a [`CommandExecutor`] with the operations the rest of the
//! engine is written against: snapshot, tap, swipe, type, key press and the
//! polling waits. Each input action issues exactly one command and then
//! sleeps for its settle delay. None of them check whether the target was
//! actually on screen; callers look before they tap.
//!
//! All calls are awaited one at a time, so commands reach the device in
//! program order.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info_span, warn, Instrument};

use crate::action::{DeviceAction, Key};
use crate::config::{RunConfig, Timing};
use crate::driver::{CommandExecutor, TransportError};
use crate::element::Point;
use crate::locator::{find_any_text, find_by_text, SnapshotError, UiSnapshot};

/// Errors raised by device interactions.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Handle to one device, shared by every engine component.
#[derive(Clone)]
pub struct Device {
    executor: Arc<dyn CommandExecutor>,
    timing: Timing,
    snapshot_attempts: u32,
}

impl Device {
    pub fn new(executor: Arc<dyn CommandExecutor>, timing: Timing) -> Self {
        Self {
            executor,
            timing,
            snapshot_attempts: 3,
        }
    }

    /// A device using the timing and snapshot limit of `config`.
    pub fn for_run(executor: Arc<dyn CommandExecutor>, config: &RunConfig) -> Self {
        Self::new(executor, config.timing.clone()).with_snapshot_attempts(config.limits.snapshot_attempts)
    }

    /// Sets how many dumps [`snapshot`](Self::snapshot) tries before giving up
    /// on a screen that keeps answering without a hierarchy.
    pub fn with_snapshot_attempts(mut self, attempts: u32) -> Self {
        self.snapshot_attempts = attempts.max(1);
        self
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn target(&self) -> String {
        self.executor.target()
    }

    /// Sends one action and returns the raw output.
    pub async fn perform(&self, action: DeviceAction) -> Result<String, TransportError> {
        let span = info_span!("device_action", action = action.name());
        async {
            let start = Instant::now();
            let result = self.executor.execute(&action.tokens()).await;
            debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                success = result.is_ok(),
                "action complete"
            );
            result
        }
        .instrument(span)
        .await
    }

    /// Captures the current UI tree in one round trip.
    ///
    /// A dump that comes back without a hierarchy (the screen was mid
    /// transition) is retried a bounded number of times.
    pub async fn snapshot(&self) -> Result<UiSnapshot, DeviceError> {
        let mut attempt = 1;
        loop {
            let raw = self.perform(DeviceAction::ScreenSnapshot).await?;
            match UiSnapshot::parse(&raw) {
                Ok(snapshot) => {
                    debug!(elements = snapshot.len(), "snapshot captured");
                    return Ok(snapshot);
                }
                Err(SnapshotError::MissingHierarchy(detail)) if attempt < self.snapshot_attempts => {
                    warn!(attempt, detail = %detail, "empty UI dump, retrying");
                    attempt += 1;
                    sleep(self.timing.poll_interval()).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn tap(&self, point: Point) -> Result<(), TransportError> {
        self.tap_with_settle(point, self.timing.settle()).await
    }

    pub async fn tap_with_settle(&self, point: Point, settle: Duration) -> Result<(), TransportError> {
        self.perform(DeviceAction::Tap(point)).await?;
        sleep(settle).await;
        Ok(())
    }

    pub async fn swipe(&self, from: Point, to: Point) -> Result<(), TransportError> {
        self.swipe_with(from, to, self.timing.swipe_duration_ms, self.timing.settle())
            .await
    }

    pub async fn swipe_with(
        &self,
        from: Point,
        to: Point,
        duration_ms: u32,
        settle: Duration,
    ) -> Result<(), TransportError> {
        self.perform(DeviceAction::Swipe { from, to, duration_ms }).await?;
        sleep(settle).await;
        Ok(())
    }

    pub async fn type_text(&self, text: &str) -> Result<(), TransportError> {
        self.perform(DeviceAction::TextInput(text.to_string())).await?;
        sleep(self.timing.text_settle()).await;
        Ok(())
    }

    pub async fn press_key(&self, key: Key) -> Result<(), TransportError> {
        self.perform(DeviceAction::KeyEvent(key)).await?;
        sleep(self.timing.key_settle()).await;
        Ok(())
    }

    pub async fn press_back(&self) -> Result<(), TransportError> {
        self.press_key(Key::Back).await
    }

    /// Starts `component` (`package/activity`) and waits for it to come up.
    pub async fn launch(&self, component: &str) -> Result<(), TransportError> {
        self.perform(DeviceAction::LaunchApp {
            component: component.to_string(),
        })
        .await?;
        sleep(self.timing.launch_delay()).await;
        Ok(())
    }

    /// Polls until `text` is visible (case-sensitive substring of a text or
    /// label) or `timeout` elapses. Always takes at least one snapshot.
    pub async fn wait_for_text(&self, text: &str, timeout: Duration) -> Result<bool, DeviceError> {
        self.wait_until(timeout, |snapshot| !find_by_text(snapshot, text, true).is_empty())
            .await
    }

    /// Like [`wait_for_text`](Self::wait_for_text) for any of `candidates`.
    pub async fn wait_for_any(&self, candidates: &[String], timeout: Duration) -> Result<bool, DeviceError> {
        self.wait_until(timeout, |snapshot| !find_any_text(snapshot, candidates, true).is_empty())
            .await
    }

    /// Polls snapshots until `predicate` holds or `timeout` elapses.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> Result<bool, DeviceError>
    where
        F: Fn(&UiSnapshot) -> bool,
    {
        let start = Instant::now();
        loop {
            let snapshot = self.snapshot().await?;
            if predicate(&snapshot) {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "wait satisfied");
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "wait timed out");
                return Ok(false);
            }
            sleep(self.timing.poll_interval()).await;
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("target", &self.executor.target())
            .field("timing", &self.timing)
            .finish()
    }
}
