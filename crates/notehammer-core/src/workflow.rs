//! The per-item export state machine.
//!
//! One export walks these stages strictly in order:
//!
//! ```text
//! Closed -> ItemOpen -> AnnotationsView -> ExportMenuOpen -> FormatChosen
//!        -> DestinationChosen -> UploadConfirmed -> ReturnedToCollection
//! ```
//!
//! Each transition has its own bounded detection and fallback logic. A
//! transition that runs out of options fails with a [`StepFailure`]; the
//! workflow then unwinds with back presses toward the collection view.
//! [`ExportWorkflow::run_with_retry`] re-runs the whole workflow from
//! `Closed` up to the configured number of attempts.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::device::{Device, DeviceError};
use crate::enumerator::Item;
use crate::locator::{find_any_text, UiSnapshot};
use crate::navigator::{is_collection_view, is_reader, NavigationError, Navigator};
use crate::recovery::return_to;
use crate::strategy::{Locate, StrategyChain};

/// States of the export state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExportStage {
    Closed,
    ItemOpen,
    AnnotationsView,
    ExportMenuOpen,
    FormatChosen,
    DestinationChosen,
    UploadConfirmed,
    ReturnedToCollection,
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportStage::Closed => "Closed",
            ExportStage::ItemOpen => "ItemOpen",
            ExportStage::AnnotationsView => "AnnotationsView",
            ExportStage::ExportMenuOpen => "ExportMenuOpen",
            ExportStage::FormatChosen => "FormatChosen",
            ExportStage::DestinationChosen => "DestinationChosen",
            ExportStage::UploadConfirmed => "UploadConfirmed",
            ExportStage::ReturnedToCollection => "ReturnedToCollection",
        };
        f.write_str(name)
    }
}

/// A stage could not be reached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} not reached: {reason}")]
pub struct StepFailure {
    /// The stage the workflow was trying to enter.
    pub stage: ExportStage,
    pub reason: String,
    /// Text visible when the step gave up.
    pub visible: Vec<String>,
}

impl StepFailure {
    fn new(stage: ExportStage, reason: impl Into<String>, snapshot: Option<&UiSnapshot>) -> Self {
        Self {
            stage,
            reason: reason.into(),
            visible: snapshot.map(UiSnapshot::text_inventory).unwrap_or_default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Step(#[from] StepFailure),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// How the upload was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confirmation {
    /// A confirm button was found and tapped.
    Observed,
    /// No confirm button appeared; the upload was assumed to have gone through.
    Assumed,
}

/// Result of one item after all attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Exported {
        attempts: u32,
        confirmation: Confirmation,
        /// The collection view was not found again after the upload.
        lost_position: bool,
    },
    Failed {
        attempts: u32,
        failure: StepFailure,
        /// Unwinding did not get back to the collection view.
        lost_position: bool,
    },
}

impl ItemOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            ItemOutcome::Exported { attempts, .. } | ItemOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn lost_position(&self) -> bool {
        match self {
            ItemOutcome::Exported { lost_position, .. } | ItemOutcome::Failed { lost_position, .. } => {
                *lost_position
            }
        }
    }
}

/// What a single successful pass produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Export {
    pub confirmation: Confirmation,
    pub returned: bool,
}

/// Exports one item's annotations.
pub struct ExportWorkflow<'a> {
    device: &'a Device,
    config: &'a RunConfig,
}

impl<'a> ExportWorkflow<'a> {
    pub fn new(device: &'a Device, config: &'a RunConfig) -> Self {
        Self { device, config }
    }

    /// Runs the workflow up to the configured number of attempts.
    ///
    /// Every attempt starts again from `Closed`. When unwinding cannot find
    /// the collection view and attempts remain, the collection is reached
    /// again through the full navigation before the next attempt. Retrying
    /// stops only when that navigation fails too.
    ///
    /// # Errors
    ///
    /// Device errors are returned as-is; step failures never are.
    pub async fn run_with_retry(&self, item: &Item) -> Result<ItemOutcome, DeviceError> {
        let max = self.config.attempts_per_item();
        let mut attempt = 1;
        loop {
            match self.export_once(item).await {
                Ok(export) => {
                    info!(attempts = attempt, confirmation = ?export.confirmation, "item exported");
                    return Ok(ItemOutcome::Exported {
                        attempts: attempt,
                        confirmation: export.confirmation,
                        lost_position: !export.returned,
                    });
                }
                Err(WorkflowError::Device(e)) => return Err(e),
                Err(WorkflowError::Step(failure)) => {
                    warn!(attempt, max, stage = %failure.stage, reason = %failure.reason, "export step failed");
                    let returned = self.unwind().await?;
                    if attempt >= max {
                        return Ok(ItemOutcome::Failed {
                            attempts: attempt,
                            failure,
                            lost_position: !returned,
                        });
                    }
                    if !returned && !self.renavigate().await? {
                        return Ok(ItemOutcome::Failed {
                            attempts: attempt,
                            failure,
                            lost_position: true,
                        });
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Reaches the collection again from wherever unwinding stopped.
    async fn renavigate(&self) -> Result<bool, DeviceError> {
        info!("re-navigating to the collection before retrying");
        match Navigator::new(self.device, self.config).reach_collection().await {
            Ok(()) => Ok(true),
            Err(NavigationError::Device(e)) => Err(e),
            Err(e) => {
                warn!(error = %e, "collection not reachable, giving up on the item");
                Ok(false)
            }
        }
    }

    /// One pass through every stage, starting from the collection view.
    pub async fn export_once(&self, item: &Item) -> Result<Export, WorkflowError> {
        self.open_item(item).await?;
        self.reached(ExportStage::ItemOpen);
        self.open_annotations().await?;
        self.reached(ExportStage::AnnotationsView);
        self.open_export_menu().await?;
        self.reached(ExportStage::ExportMenuOpen);
        self.choose_format().await?;
        self.reached(ExportStage::FormatChosen);
        self.choose_destination().await?;
        self.reached(ExportStage::DestinationChosen);
        let confirmation = self.confirm_upload().await?;
        self.reached(ExportStage::UploadConfirmed);
        let returned = self.return_to_collection().await?;
        if returned {
            self.reached(ExportStage::ReturnedToCollection);
        }
        Ok(Export { confirmation, returned })
    }

    fn reached(&self, stage: ExportStage) {
        debug!(stage = %stage, "stage reached");
    }

    /// Backs out toward the collection view. Returns whether it was reached.
    pub async fn unwind(&self) -> Result<bool, DeviceError> {
        let ui = &self.config.ui;
        let name = self.config.collection_name.as_str();
        let recovery = return_to(self.device, self.config.limits.unwind_back_presses, |s| {
            is_collection_view(s, ui, name)
        })
        .await?;
        if !recovery.reached {
            warn!(presses = recovery.presses, visible = ?recovery.visible(), "could not unwind to the collection");
        }
        Ok(recovery.reached)
    }

    async fn open_item(&self, item: &Item) -> Result<(), WorkflowError> {
        let ui = &self.config.ui;
        let snapshot = self.device.snapshot().await?;
        let chain = StrategyChain::new()
            .then(Locate::ExactText(vec![item.title.clone()]))
            .then(Locate::ContainsText(vec![item.title.clone()]))
            .then(Locate::FixedPoint(item.location));
        let Some(target) = chain.resolve(&snapshot) else {
            return Err(StepFailure::new(ExportStage::ItemOpen, "item not on screen", Some(&snapshot)).into());
        };
        debug!(strategy = target.strategy, point = %target.point, "opening item");
        self.device.tap(target.point).await.map_err(DeviceError::from)?;

        let opened = self
            .device
            .wait_until(self.config.timing.wait_timeout(), |s| {
                is_reader(s, ui) || !find_any_text(s, &ui.annotation_labels, false).is_empty()
            })
            .await?;
        if !opened {
            return Err(StepFailure::new(ExportStage::ItemOpen, "reading view did not appear", None).into());
        }
        Ok(())
    }

    async fn open_annotations(&self) -> Result<(), WorkflowError> {
        let ui = &self.config.ui;
        let chain = StrategyChain::new()
            .then(Locate::ExactText(ui.annotation_labels.clone()))
            .then(Locate::ContainsText(ui.annotation_labels.clone()))
            .then(Locate::ToolbarPosition {
                from_right: ui.toolbar_position_from_right,
                max_bottom: ui.toolbar_bottom,
            });

        let mut snapshot = self.device.snapshot().await?;
        let mut target = chain.resolve(&snapshot);
        if target.is_none() {
            // The reader hides its toolbar until the page is tapped.
            let center = snapshot.screen().center();
            debug!(point = %center, "revealing reader toolbar");
            self.device.tap(center).await.map_err(DeviceError::from)?;
            snapshot = self.device.snapshot().await?;
            target = chain.resolve(&snapshot);
        }
        let Some(target) = target else {
            return Err(
                StepFailure::new(ExportStage::AnnotationsView, "no annotations affordance", Some(&snapshot)).into(),
            );
        };
        debug!(strategy = target.strategy, point = %target.point, "opening annotations");
        self.device.tap(target.point).await.map_err(DeviceError::from)?;

        if !self
            .device
            .wait_for_any(&ui.annotations_view_labels, self.config.timing.wait_timeout())
            .await?
        {
            return Err(StepFailure::new(ExportStage::AnnotationsView, "annotations view did not open", None).into());
        }
        Ok(())
    }

    /// True once either the format prompt or the share sheet is up.
    fn export_started(&self, snapshot: &UiSnapshot) -> bool {
        let ui = &self.config.ui;
        !find_any_text(snapshot, &ui.format_prompt_labels, true).is_empty()
            || !find_any_text(snapshot, &ui.share_sheet_labels, false).is_empty()
            || !find_any_text(snapshot, std::slice::from_ref(&ui.destination), false).is_empty()
    }

    async fn open_export_menu(&self) -> Result<(), WorkflowError> {
        let ui = &self.config.ui;
        let mut chain = StrategyChain::new()
            .then(Locate::ExactText(ui.export_labels.clone()))
            .then(Locate::ContainsText(ui.export_labels.clone()));
        for point in &ui.export_icon_points {
            chain = chain.then(Locate::FixedPoint(*point));
        }

        let snapshot = self.device.snapshot().await?;
        for target in chain.resolve_all(&snapshot) {
            debug!(strategy = target.strategy, point = %target.point, "trying export action");
            self.device.tap(target.point).await.map_err(DeviceError::from)?;
            if self
                .device
                .wait_until(self.config.timing.wait_timeout(), |s| self.export_started(s))
                .await?
            {
                return Ok(());
            }
        }
        Err(StepFailure::new(ExportStage::ExportMenuOpen, "no export action opened a share flow", Some(&snapshot)).into())
    }

    async fn choose_format(&self) -> Result<(), WorkflowError> {
        let ui = &self.config.ui;
        let snapshot = self.device.snapshot().await?;
        if find_any_text(&snapshot, &ui.format_prompt_labels, true).is_empty() {
            debug!("no format prompt");
            return Ok(());
        }

        let Some(none) = Locate::ExactText(ui.no_format_labels.clone()).locate(&snapshot) else {
            return Err(StepFailure::new(ExportStage::FormatChosen, "no 'no formatting' option", Some(&snapshot)).into());
        };
        self.device.tap(none.point).await.map_err(DeviceError::from)?;

        let snapshot = self.device.snapshot().await?;
        if let Some(confirm) = Locate::Rightmost(ui.format_confirm_labels.clone()).locate(&snapshot) {
            debug!(point = %confirm.point, "confirming format");
            self.device.tap(confirm.point).await.map_err(DeviceError::from)?;
        }
        Ok(())
    }

    async fn choose_destination(&self) -> Result<(), WorkflowError> {
        let ui = &self.config.ui;
        let chain = StrategyChain::new()
            .then(Locate::ExactText(vec![ui.destination.clone()]))
            .then(Locate::ContainsText(vec![ui.destination.clone()]));
        let max = self.config.limits.share_sheet_scrolls;
        let mut scrolls = 0;
        loop {
            let snapshot = self.device.snapshot().await?;
            if let Some(target) = chain.resolve(&snapshot) {
                debug!(destination = %ui.destination, point = %target.point, scrolls, "destination found");
                self.device.tap(target.point).await.map_err(DeviceError::from)?;
                return Ok(());
            }
            if scrolls >= max {
                return Err(StepFailure::new(
                    ExportStage::DestinationChosen,
                    format!("'{}' not in share sheet after {} scrolls", ui.destination, scrolls),
                    Some(&snapshot),
                )
                .into());
            }
            self.device
                .swipe(ui.share_sheet_scroll.from, ui.share_sheet_scroll.to)
                .await
                .map_err(DeviceError::from)?;
            scrolls += 1;
        }
    }

    async fn confirm_upload(&self) -> Result<Confirmation, WorkflowError> {
        let ui = &self.config.ui;
        let confirm = Locate::Rightmost(ui.confirm_labels.clone());
        let delay = self.config.export_delay;

        // The button can show up right after the wait gives up, so the
        // follow-up snapshot decides.
        self.device.wait_until(delay, |s| confirm.locate(s).is_some()).await?;
        let snapshot = self.device.snapshot().await?;
        match confirm.locate(&snapshot) {
            Some(target) => {
                debug!(point = %target.point, "confirming upload");
                self.device.tap(target.point).await.map_err(DeviceError::from)?;
                sleep(delay).await;
                Ok(Confirmation::Observed)
            }
            _ if ui.assume_upload_confirmed => {
                warn!("no confirm button, assuming the upload went through");
                sleep(delay).await;
                Ok(Confirmation::Assumed)
            }
            _ => Err(StepFailure::new(ExportStage::UploadConfirmed, "no confirm button", Some(&snapshot)).into()),
        }
    }

    /// Presses back until the collection view shows again.
    ///
    /// The upload has already happened at this point, so not finding the
    /// collection is reported rather than failing the item.
    async fn return_to_collection(&self) -> Result<bool, WorkflowError> {
        let ui = &self.config.ui;
        let name = self.config.collection_name.as_str();
        let recovery = return_to(self.device, self.config.limits.return_back_presses, |s| {
            is_collection_view(s, ui, name)
        })
        .await?;
        if !recovery.reached {
            warn!(presses = recovery.presses, "collection view not found after export");
        }
        Ok(recovery.reached)
    }
}
