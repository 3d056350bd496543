//! Orchestrates one export run.
//!
//! [`RunCoordinator::run`] launches the app (optional), navigates to the
//! collection, enumerates its items and exports them one by one. It owns the
//! run's [`ExportStats`] and logs the summary on every exit path, including
//! cancellation.

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::RunConfig;
use crate::device::{Device, DeviceError};
use crate::driver::TransportError;
use crate::enumerator::{Enumerator, Item};
use crate::navigator::{NavigationError, Navigator};
use crate::stats::{ExportStats, RunStatus};
use crate::workflow::{Confirmation, ExportWorkflow, ItemOutcome};

/// Reasons a run ends early. The partial statistics stay available through
/// [`RunCoordinator::stats`].
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Navigation failed: {0}")]
    Navigation(NavigationError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Run interrupted")]
    Interrupted,
}

impl RunError {
    /// The report status for a run that ended with this error.
    pub fn status(&self) -> RunStatus {
        match self {
            RunError::Navigation(_) => RunStatus::NavigationFailed,
            RunError::Device(_) => RunStatus::DeviceFailed,
            RunError::Interrupted => RunStatus::Interrupted,
        }
    }
}

impl From<NavigationError> for RunError {
    fn from(err: NavigationError) -> Self {
        match err {
            NavigationError::Device(e) => RunError::Device(e),
            other => RunError::Navigation(other),
        }
    }
}

impl From<TransportError> for RunError {
    fn from(err: TransportError) -> Self {
        RunError::Device(DeviceError::Transport(err))
    }
}

/// Runs navigation, enumeration and the export workflow for one collection.
pub struct RunCoordinator {
    device: Device,
    config: RunConfig,
    stats: ExportStats,
}

impl RunCoordinator {
    pub fn new(device: Device, config: RunConfig) -> Self {
        Self {
            device,
            config,
            stats: ExportStats::new(),
        }
    }

    pub fn stats(&self) -> &ExportStats {
        &self.stats
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the export until done, failed or cancelled.
    ///
    /// Cancellation stops the current wait or command and returns
    /// [`RunError::Interrupted`] after the partial summary is logged. The
    /// device is left wherever it was.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<ExportStats, RunError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RunError::Interrupted),
            result = self.run_inner() => result,
        };

        match &result {
            Ok(()) => info!("run complete\n{}", self.stats.summary()),
            Err(RunError::Interrupted) => warn!("run interrupted\n{}", self.stats.summary()),
            Err(e) => error!(error = %e, "run aborted\n{}", self.stats.summary()),
        }
        result.map(|()| self.stats.clone())
    }

    async fn run_inner(&mut self) -> Result<(), RunError> {
        let Self { device, config, stats } = self;
        let (device, config) = (&*device, &*config);

        if let Some(component) = &config.launch_component {
            info!(component = %component, "launching app");
            device.launch(component).await?;
        }

        let navigator = Navigator::new(device, config);
        navigator.reach_collection().await?;

        let items = Enumerator::new(device, config).enumerate().await?;
        if items.is_empty() {
            info!(collection = %config.collection_name, "collection is empty, nothing to export");
            return Ok(());
        }
        info!(count = items.len(), "items to export");

        let workflow = ExportWorkflow::new(device, config);
        let total = items.len();
        for (index, item) in items.iter().enumerate() {
            let span = info_span!("export_item", title = %item.title, index = index + 1, total);
            let lost = process_item(&workflow, device, config, stats, item)
                .instrument(span)
                .await?;

            let more = index + 1 < total;
            if lost && more {
                warn!("position lost, navigating back to the collection");
                navigator.reach_collection().await?;
            }
            if more {
                sleep(config.timing.item_pause()).await;
            }
        }
        Ok(())
    }
}

/// Exports one item and records its outcome. Returns whether the collection
/// view was lost along the way.
async fn process_item(
    workflow: &ExportWorkflow<'_>,
    device: &Device,
    config: &RunConfig,
    stats: &mut ExportStats,
    item: &Item,
) -> Result<bool, RunError> {
    info!("exporting");
    match workflow.run_with_retry(item).await {
        Ok(ItemOutcome::Exported {
            confirmation,
            lost_position,
            ..
        }) => {
            stats.record_success(&item.title, confirmation == Confirmation::Observed);
            Ok(lost_position)
        }
        Ok(ItemOutcome::Failed {
            attempts,
            failure,
            lost_position,
        }) => {
            warn!(attempts, stage = %failure.stage, reason = %failure.reason, "item failed");
            stats.record_failure(&item.title);
            Ok(lost_position)
        }
        Err(DeviceError::Transport(e)) => {
            stats.record_failure(&item.title);
            Err(e.into())
        }
        Err(DeviceError::Snapshot(e)) => {
            error!(error = %e, "unexpected error, recovering");
            stats.record_failure(&item.title);
            match ExportWorkflow::new(device, config).unwind().await {
                Ok(returned) => Ok(!returned),
                Err(DeviceError::Transport(e)) => Err(e.into()),
                Err(DeviceError::Snapshot(_)) => Ok(true),
            }
        }
    }
}
