//! Run configuration and the persistent settings file.
//!
//! Every component receives its delays, retry bounds and UI label tables from
//! a [`RunConfig`] passed in explicitly; nothing reads ambient state.
//!
//! [`HammerConfig`] is the on-disk form kept in `~/.notehammer/config.json`.
//! It lets a user adapt label candidates and fallback coordinates to their
//! device and app language without rebuilding.
//!
//! # Example
//!
//! ```no_run
//! use notehammer_core::config::HammerConfig;
//!
//! // Load (returns defaults if the file doesn't exist)
//! let config = HammerConfig::load();
//! let run = config.run_config("To Export");
//! assert_eq!(run.collection_name, "To Export");
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::element::Point;

const CONFIG_FILENAME: &str = "config.json";

/// Returns `~/.notehammer`, creating it if needed.
///
/// Falls back to the current directory when no home directory is known.
pub fn notehammer_dir() -> PathBuf {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".notehammer");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Delays and polling parameters, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Pause after a tap or swipe.
    pub settle_ms: u64,
    /// Pause after a key press.
    pub key_settle_ms: u64,
    /// Pause after typing text.
    pub text_settle_ms: u64,
    /// Interval between snapshots while waiting for something to appear.
    pub poll_interval_ms: u64,
    /// Default timeout for waits.
    pub wait_timeout_ms: u64,
    /// Pause between two items of a batch.
    pub item_pause_ms: u64,
    /// Duration of scroll gestures.
    pub swipe_duration_ms: u32,
    /// Wait after launching the app.
    pub launch_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_ms: 1000,
            key_settle_ms: 1000,
            text_settle_ms: 500,
            poll_interval_ms: 1000,
            wait_timeout_ms: 10_000,
            item_pause_ms: 2000,
            swipe_duration_ms: 300,
            launch_delay_ms: 3000,
        }
    }
}

impl Timing {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn key_settle(&self) -> Duration {
        Duration::from_millis(self.key_settle_ms)
    }

    pub fn text_settle(&self) -> Duration {
        Duration::from_millis(self.text_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn item_pause(&self) -> Duration {
        Duration::from_millis(self.item_pause_ms)
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }
}

/// Upper bounds for every loop that polls or retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Back presses while looking for the home screen.
    pub home_attempts: u32,
    /// Attempts to dismiss a sort/filter overlay.
    pub overlay_dismiss_attempts: u32,
    /// Scrolls while searching the collection list.
    pub collection_scrolls: u32,
    /// Iteration ceiling for item enumeration.
    pub enumeration_iterations: u32,
    /// Horizontal scrolls inside the share sheet.
    pub share_sheet_scrolls: u32,
    /// Back presses when unwinding a failed item.
    pub unwind_back_presses: u32,
    /// Back presses when returning to the collection after an export.
    pub return_back_presses: u32,
    /// Snapshot attempts when the dump comes back without a hierarchy.
    pub snapshot_attempts: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            home_attempts: 10,
            overlay_dismiss_attempts: 3,
            collection_scrolls: 5,
            enumeration_iterations: 50,
            share_sheet_scrolls: 3,
            unwind_back_presses: 5,
            return_back_presses: 5,
            snapshot_attempts: 3,
        }
    }
}

/// A swipe gesture between two fixed points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gesture {
    pub from: Point,
    pub to: Point,
}

/// Label candidates, resource ids and fallback coordinates for the target app.
///
/// Labels are tried in order. Coordinates refer to a 1080x2400 reference
/// screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiProfile {
    pub home_labels: Vec<String>,
    pub home_ids: Vec<String>,
    pub reader_ids: Vec<String>,
    pub library_labels: Vec<String>,
    pub library_tab_point: Point,
    pub overlay_labels: Vec<String>,
    pub collections_labels: Vec<String>,

    /// Resource ids of clickable item containers (covers, list rows).
    pub item_ids: Vec<String>,
    /// Resource ids of item title text views.
    pub item_title_ids: Vec<String>,
    /// Strings that are app chrome, never item titles.
    pub chrome_labels: Vec<String>,
    /// Shortest text accepted as a title by the last-resort item strategy.
    pub min_title_chars: usize,
    /// Height of the header above the item list.
    pub list_top: i32,
    /// Height of the footer (bottom navigation) below the item list.
    pub list_bottom_margin: i32,
    /// How far a bare title's bounds are grown upward to reach its cover.
    pub title_expand_px: i32,
    /// Scroll gesture used to page the item list.
    pub list_scroll: Gesture,

    pub annotation_labels: Vec<String>,
    /// Toolbar band height used by the positional annotations fallback.
    pub toolbar_bottom: i32,
    /// Which clickable, counted from the right, the positional fallback picks.
    pub toolbar_position_from_right: usize,
    pub annotations_view_labels: Vec<String>,

    pub export_labels: Vec<String>,
    pub export_icon_points: Vec<Point>,
    pub format_prompt_labels: Vec<String>,
    pub no_format_labels: Vec<String>,
    pub format_confirm_labels: Vec<String>,
    pub share_sheet_labels: Vec<String>,
    /// Cloud storage target picked in the share sheet.
    pub destination: String,
    pub share_sheet_scroll: Gesture,
    pub confirm_labels: Vec<String>,
    /// Count an upload as done when no confirm button shows up.
    pub assume_upload_confirmed: bool,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for UiProfile {
    fn default() -> Self {
        Self {
            home_labels: strings(&["Home", "主页", "Accueil", "Startseite"]),
            home_ids: strings(&["bottom_navigation", "home_root"]),
            reader_ids: strings(&["reader_toolbar_button", "reading_view", "mini_shopping_button"]),
            library_labels: strings(&["Library", "书库", "Bibliothèque", "Bibliothek"]),
            library_tab_point: Point::new(324, 2290),
            overlay_labels: strings(&["Sort by", "Sort & Filter", "Filter by", "Trier par"]),
            collections_labels: strings(&["Collections", "收藏夹", "Sammlungen"]),

            item_ids: strings(&["lib_book_row", "library_item", "badgeable_cover"]),
            item_title_ids: strings(&["lib_book_row_title", "library_item_title", "book_title"]),
            chrome_labels: strings(&[
                "Library", "Home", "Collections", "Sort & Filter", "Filter", "Sort by",
                "Downloaded", "All", "Search", "More", "Notebook", "Back",
            ]),
            min_title_chars: 6,
            list_top: 250,
            list_bottom_margin: 250,
            title_expand_px: 150,
            list_scroll: Gesture {
                from: Point::new(540, 1800),
                to: Point::new(540, 700),
            },

            annotation_labels: strings(&["Notebook", "Notes & Highlights", "Annotations"]),
            toolbar_bottom: 300,
            toolbar_position_from_right: 3,
            annotations_view_labels: strings(&["My Notebook", "Export Notebook", "Highlights"]),

            export_labels: strings(&["Export Notebook", "Export notebook", "Export", "Share Notebook", "Share"]),
            export_icon_points: vec![Point::new(980, 160), Point::new(860, 160)],
            format_prompt_labels: strings(&["Citation style", "Citation Style", "Export as"]),
            no_format_labels: strings(&["None", "Aucun", "Keine", "无"]),
            format_confirm_labels: strings(&["Export", "OK"]),
            share_sheet_labels: strings(&["Share", "Share via", "Share with"]),
            destination: "OneDrive".to_string(),
            share_sheet_scroll: Gesture {
                from: Point::new(900, 1900),
                to: Point::new(200, 1900),
            },
            confirm_labels: strings(&["Upload", "Save", "Done", "OK", "Confirm"]),
            assume_upload_confirmed: true,
        }
    }
}

/// Wait after handing an export to the cloud app, unless configured.
pub const DEFAULT_EXPORT_DELAY: Duration = Duration::from_secs(3);

/// Longest accepted export delay.
pub const MAX_EXPORT_DELAY: Duration = Duration::from_secs(3600);

/// Converts a delay given in seconds.
///
/// Negative, non-finite and values above [`MAX_EXPORT_DELAY`] are rejected.
pub fn delay_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|delay| *delay <= MAX_EXPORT_DELAY)
}

/// Everything one export run needs. Immutable for the run's duration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// adb serial; required only when several devices are attached.
    pub device_serial: Option<String>,
    /// The collection to export. Searched case-insensitively.
    pub collection_name: String,
    /// Wait after handing an export to the cloud app.
    pub export_delay: Duration,
    /// Stop enumerating after this many items.
    pub max_items: Option<usize>,
    /// Attempts per item, counting the first one.
    pub retry_attempts: u32,
    /// `package/activity` to launch before navigating, if any.
    pub launch_component: Option<String>,
    pub timing: Timing,
    pub limits: Limits,
    pub ui: UiProfile,
}

impl RunConfig {
    /// A configuration with default timing, limits and UI profile.
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            device_serial: None,
            collection_name: collection_name.into(),
            export_delay: DEFAULT_EXPORT_DELAY,
            max_items: None,
            retry_attempts: 3,
            launch_component: None,
            timing: Timing::default(),
            limits: Limits::default(),
            ui: UiProfile::default(),
        }
    }

    /// The number of times an item's workflow runs before it is given up.
    ///
    /// A configured value of zero still runs each item once.
    pub fn attempts_per_item(&self) -> u32 {
        self.retry_attempts.max(1)
    }
}

/// Persistent notehammer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HammerConfig {
    /// Android package of the reading app.
    pub package: String,
    /// Launcher activity, relative to `package`.
    pub launch_activity: String,
    pub retry_attempts: u32,
    pub export_delay_secs: f64,
    pub timing: Timing,
    pub limits: Limits,
    pub ui: UiProfile,
}

impl Default for HammerConfig {
    fn default() -> Self {
        Self {
            package: "com.amazon.kindle".to_string(),
            launch_activity: ".routing.LauncherActivity".to_string(),
            retry_attempts: 3,
            export_delay_secs: 3.0,
            timing: Timing::default(),
            limits: Limits::default(),
            ui: UiProfile::default(),
        }
    }
}

impl HammerConfig {
    /// Path of the config file in `~/.notehammer/`.
    pub fn path() -> PathBuf {
        notehammer_dir().join(CONFIG_FILENAME)
    }

    /// Load config from `~/.notehammer/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from an explicit path, with the same fallback as [`load`](Self::load).
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to `~/.notehammer/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// `package/activity` for `am start -n`.
    pub fn launch_component(&self) -> String {
        format!("{}/{}", self.package, self.launch_activity)
    }

    /// The configured export delay, or the default when the file holds a
    /// value [`delay_from_secs`] rejects.
    pub fn export_delay(&self) -> Duration {
        delay_from_secs(self.export_delay_secs).unwrap_or_else(|| {
            tracing::warn!(value = self.export_delay_secs, "invalid export delay, using the default");
            DEFAULT_EXPORT_DELAY
        })
    }

    /// Builds a run configuration for `collection_name` from these settings.
    pub fn run_config(&self, collection_name: impl Into<String>) -> RunConfig {
        RunConfig {
            device_serial: None,
            collection_name: collection_name.into(),
            export_delay: self.export_delay(),
            max_items: None,
            retry_attempts: self.retry_attempts,
            launch_component: Some(self.launch_component()),
            timing: self.timing.clone(),
            limits: self.limits.clone(),
            ui: self.ui.clone(),
        }
    }
}
