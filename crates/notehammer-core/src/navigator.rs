//! Reaching a named collection from an arbitrary starting screen.
//!
//! [`Navigator::reach_collection`] runs five steps in order:
//!
//! 1. home recovery (bounded back presses)
//! 2. library tab (label match, then one fixed-coordinate tap)
//! 3. sort/filter overlay dismissal
//! 4. the optional "Collections" affordance
//! 5. collection resolution and tap (bounded scrolls)
//!
//! Any step that runs out of attempts fails with
//! [`NavigationError::Unreachable`] carrying the text that was visible at the
//! time.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{RunConfig, UiProfile};
use crate::device::{Device, DeviceError};
use crate::locator::{find_any_text, UiSnapshot};
use crate::recovery::return_to;
use crate::strategy::{clickable_containing, Locate, StrategyChain};

/// The collection view (or a screen required to reach it) could not be reached.
#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("{step}: {reason} (visible: {})", .visible.join(" | "))]
    Unreachable {
        step: &'static str,
        reason: String,
        visible: Vec<String>,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl NavigationError {
    fn unreachable(step: &'static str, reason: impl Into<String>, snapshot: &UiSnapshot) -> Self {
        NavigationError::Unreachable {
            step,
            reason: reason.into(),
            visible: snapshot.text_inventory(),
        }
    }

    /// Text visible when navigation gave up. Empty for device errors.
    pub fn visible(&self) -> &[String] {
        match self {
            NavigationError::Unreachable { visible, .. } => visible,
            NavigationError::Device(_) => &[],
        }
    }
}

/// True when the screen shows the app's main shell (home or library).
pub fn is_home(snapshot: &UiSnapshot, ui: &UiProfile) -> bool {
    snapshot.has_resource_id(&ui.home_ids) || !find_any_text(snapshot, &ui.home_labels, false).is_empty()
}

/// True when the screen is a book's reading view.
pub fn is_reader(snapshot: &UiSnapshot, ui: &UiProfile) -> bool {
    snapshot.has_resource_id(&ui.reader_ids)
}

/// True when the screen is the opened collection `name`.
///
/// The collection view shows the name as a plain heading. The list of all
/// collections shows it inside a clickable row, which does not count.
pub fn is_collection_view(snapshot: &UiSnapshot, ui: &UiProfile, name: &str) -> bool {
    if name.is_empty() || is_reader(snapshot, ui) {
        return false;
    }
    let heading = snapshot
        .elements()
        .any(|e| !e.clickable && e.display_text().trim().eq_ignore_ascii_case(name));
    heading && clickable_containing(snapshot, name, true).is_none()
}

/// Drives the app to the configured collection.
pub struct Navigator<'a> {
    device: &'a Device,
    config: &'a RunConfig,
}

impl<'a> Navigator<'a> {
    pub fn new(device: &'a Device, config: &'a RunConfig) -> Self {
        Self { device, config }
    }

    /// Runs every navigation step and leaves the collection open.
    pub async fn reach_collection(&self) -> Result<(), NavigationError> {
        let name = self.config.collection_name.trim();
        info!(collection = name, "navigating to collection");
        if name.is_empty() {
            return Err(NavigationError::Unreachable {
                step: "collection",
                reason: "no collection name given".to_string(),
                visible: Vec::new(),
            });
        }

        self.recover_home().await?;
        self.open_library().await?;
        self.dismiss_overlays().await?;
        self.open_collections().await?;
        self.open_collection(name).await?;
        info!(collection = name, "collection open");
        Ok(())
    }

    /// Presses back until a home indicator shows up.
    ///
    /// When none shows up but no reading view is visible either, the current
    /// screen is assumed to be home.
    pub async fn recover_home(&self) -> Result<(), NavigationError> {
        let ui = &self.config.ui;
        let recovery = return_to(self.device, self.config.limits.home_attempts, |s| is_home(s, ui)).await?;
        if recovery.reached {
            debug!(presses = recovery.presses, "home screen reached");
            return Ok(());
        }
        if is_reader(&recovery.last, ui) {
            return Err(NavigationError::unreachable(
                "home",
                format!("still in a reading view after {} back presses", recovery.presses),
                &recovery.last,
            ));
        }
        warn!(presses = recovery.presses, "no home indicator found, assuming home");
        Ok(())
    }

    /// Taps the library tab, by label or by its fixed coordinates.
    ///
    /// The fixed-coordinate tap is made once and not repeated.
    pub async fn open_library(&self) -> Result<(), NavigationError> {
        let ui = &self.config.ui;
        let chain = StrategyChain::new()
            .then(Locate::ExactText(ui.library_labels.clone()))
            .then(Locate::FixedPoint(ui.library_tab_point));
        let snapshot = self.device.snapshot().await?;
        let Some(target) = chain.resolve(&snapshot) else {
            return Err(NavigationError::unreachable("library", "no library tab", &snapshot));
        };
        if target.element.is_none() {
            warn!(point = %target.point, "library tab label not found, using fixed coordinates");
        } else {
            debug!(strategy = target.strategy, point = %target.point, "library tab found");
        }
        self.device.tap(target.point).await.map_err(DeviceError::from)?;
        Ok(())
    }

    /// Closes a sort/filter overlay if one is open.
    pub async fn dismiss_overlays(&self) -> Result<(), NavigationError> {
        let labels = &self.config.ui.overlay_labels;
        let max = self.config.limits.overlay_dismiss_attempts;
        let mut attempt = 0;
        loop {
            let snapshot = self.device.snapshot().await?;
            if find_any_text(&snapshot, labels, false).is_empty() {
                if attempt > 0 {
                    debug!(attempts = attempt, "overlay dismissed");
                }
                return Ok(());
            }
            if attempt >= max {
                return Err(NavigationError::unreachable(
                    "overlay",
                    format!("sort/filter overlay still open after {} dismiss attempts", attempt),
                    &snapshot,
                ));
            }
            debug!(attempt, "dismissing sort/filter overlay");
            self.device.press_back().await.map_err(DeviceError::from)?;
            attempt += 1;
        }
    }

    /// Taps a "Collections" affordance if the library shows one.
    pub async fn open_collections(&self) -> Result<(), NavigationError> {
        let snapshot = self.device.snapshot().await?;
        let chain = StrategyChain::new().then(Locate::ExactText(self.config.ui.collections_labels.clone()));
        if let Some(target) = chain.resolve(&snapshot) {
            debug!(point = %target.point, "opening collections");
            self.device.tap(target.point).await.map_err(DeviceError::from)?;
        }
        Ok(())
    }

    /// Finds the clickable row for `name`, scrolling if needed, and taps it.
    pub async fn open_collection(&self, name: &str) -> Result<(), NavigationError> {
        let scroll = self.config.ui.list_scroll;
        let max = self.config.limits.collection_scrolls;
        let row = Locate::ClickableContaining {
            needle: name.to_string(),
            ignore_case: true,
        };
        let mut scrolls = 0;
        loop {
            let snapshot = self.device.snapshot().await?;
            if let Some(row) = row.locate(&snapshot) {
                debug!(strategy = row.strategy, point = %row.point, scrolls, "collection found");
                self.device.tap(row.point).await.map_err(DeviceError::from)?;
                return Ok(());
            }
            if scrolls >= max {
                return Err(NavigationError::unreachable(
                    "collection",
                    format!("collection '{}' not found after {} scrolls", name, scrolls),
                    &snapshot,
                ));
            }
            self.device.swipe(scroll.from, scroll.to).await.map_err(DeviceError::from)?;
            scrolls += 1;
        }
    }
}
