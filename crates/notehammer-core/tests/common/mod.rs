//! Shared test helpers for notehammer-core integration tests.
//!
//! [`FakeKindle`] is a [`CommandExecutor`] that simulates the reading app:
//! it keeps a current screen, renders it as a `uiautomator` dump on every
//! snapshot, and moves between screens when a tap lands on one of the
//! rendered targets or a back key is pressed. Every command it receives is
//! recorded so tests can assert on what the engine sent.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use notehammer_core::action::{DeviceAction, Key};
use notehammer_core::config::RunConfig;
use notehammer_core::device::Device;
use notehammer_core::driver::{CommandExecutor, TransportError};
use notehammer_core::element::{Bounds, Point};

// ---------------------------------------------------------------------------
// Simulated app
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Home,
    Library,
    CollectionsList,
    Collection { name: String, offset: usize },
    Reader { book: String, toolbar: bool },
    Annotations { book: String },
    FormatPrompt { book: String },
    ShareSheet { book: String, scroll: usize },
    Upload { book: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Hit {
    Home,
    Library,
    Collections,
    Collection(String),
    Book(String),
    RevealToolbar,
    Back,
    Notebook,
    ExportNotebook,
    NoFormat,
    ConfirmFormat,
    CancelDialog,
    Destination,
    ConfirmUpload,
    Nothing,
}

/// Knobs for the simulated app.
#[derive(Debug, Clone)]
pub struct FakeOptions {
    /// Collections in list order, each with its book titles.
    pub collections: Vec<(String, Vec<String>)>,
    pub start: Screen,
    /// Whether the library tab shows its "Library" text.
    pub library_label: bool,
    /// A sort/filter overlay is open when the library is first shown.
    pub overlay_open: bool,
    /// Back presses never close the overlay.
    pub sticky_overlay: bool,
    /// Books whose annotations view never opens.
    pub failing_books: HashSet<String>,
    /// Taps on the notebook button that are ignored before it starts working.
    pub ignored_notebook_taps: usize,
    pub format_prompt: bool,
    pub confirm_button: bool,
    /// Share-sheet swipes needed before the destination shows up.
    pub destination_after_scrolls: usize,
    /// The notebook toolbar button has no label.
    pub icon_only_notebook: bool,
    /// Books visible per collection page.
    pub page_size: usize,
    /// Commands accepted before the channel starts failing.
    pub fail_after_commands: Option<usize>,
    /// Snapshots of the upload dialog taken before its Upload button shows.
    pub confirm_after_snapshots: usize,
    /// The export button on the annotations view is an unlabelled icon.
    pub icon_only_export: bool,
    /// The first snapshot of this book's annotations view is a truncated dump.
    pub malformed_dump_for: Option<String>,
    /// Cancelled once this many uploads have gone through.
    pub cancel_after_uploads: Option<(usize, CancellationToken)>,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            collections: vec![("To Export".to_string(), vec!["Book A".to_string(), "Book B".to_string()])],
            start: Screen::Home,
            library_label: true,
            overlay_open: false,
            sticky_overlay: false,
            failing_books: HashSet::new(),
            ignored_notebook_taps: 0,
            format_prompt: true,
            confirm_button: true,
            destination_after_scrolls: 0,
            icon_only_notebook: false,
            page_size: 3,
            fail_after_commands: None,
            confirm_after_snapshots: 0,
            icon_only_export: false,
            malformed_dump_for: None,
            cancel_after_uploads: None,
        }
    }
}

impl FakeOptions {
    pub fn with_books(name: &str, books: &[&str]) -> Self {
        Self {
            collections: vec![(name.to_string(), books.iter().map(|b| b.to_string()).collect())],
            ..Self::default()
        }
    }

    pub fn failing(mut self, book: &str) -> Self {
        self.failing_books.insert(book.to_string());
        self
    }
}

struct State {
    opts: FakeOptions,
    screen: Screen,
    overlay: bool,
    last_collection: Option<(String, usize)>,
    actions: Vec<DeviceAction>,
    opens: HashMap<String, usize>,
    uploads: Vec<String>,
    library_taps: usize,
    launches: usize,
    upload_snapshots: usize,
}

pub struct FakeKindle {
    state: Mutex<State>,
}

impl FakeKindle {
    pub fn new(opts: FakeOptions) -> Arc<Self> {
        let screen = opts.start.clone();
        Arc::new(Self {
            state: Mutex::new(State {
                overlay: false,
                screen,
                opts,
                last_collection: None,
                actions: Vec::new(),
                opens: HashMap::new(),
                uploads: Vec::new(),
                library_taps: 0,
                launches: 0,
                upload_snapshots: 0,
            }),
        })
    }

    pub fn actions(&self) -> Vec<DeviceAction> {
        self.state.lock().unwrap().actions.clone()
    }

    /// Every swipe, as (from, to).
    pub fn swipes(&self) -> Vec<(Point, Point)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                DeviceAction::Swipe { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    pub fn taps(&self) -> Vec<Point> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                DeviceAction::Tap(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn back_presses(&self) -> usize {
        self.actions()
            .iter()
            .filter(|a| matches!(a, DeviceAction::KeyEvent(Key::Back)))
            .count()
    }

    /// How many times `book` was opened from the collection.
    pub fn opens(&self, book: &str) -> usize {
        self.state.lock().unwrap().opens.get(book).copied().unwrap_or(0)
    }

    pub fn uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn library_taps(&self) -> usize {
        self.state.lock().unwrap().library_taps
    }

    pub fn launches(&self) -> usize {
        self.state.lock().unwrap().launches
    }

    pub fn screen(&self) -> Screen {
        self.state.lock().unwrap().screen.clone()
    }
}

#[async_trait]
impl CommandExecutor for FakeKindle {
    async fn execute(&self, tokens: &[String]) -> Result<String, TransportError> {
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = state.opts.fail_after_commands {
            if state.actions.len() >= limit {
                return Err(TransportError::Unreachable("device disconnected".to_string()));
            }
        }
        let Some(action) = DeviceAction::from_tokens(tokens) else {
            return Err(TransportError::CommandFailed {
                command: tokens.join(" "),
                code: Some(1),
                stderr: "unknown command".to_string(),
            });
        };
        state.actions.push(action.clone());
        Ok(state.apply(action))
    }

    fn target(&self) -> String {
        "fake-kindle".to_string()
    }
}

impl State {
    fn apply(&mut self, action: DeviceAction) -> String {
        match action {
            DeviceAction::ScreenSnapshot => return self.snapshot(),
            DeviceAction::Tap(point) => {
                let page = self.render();
                let hit = page
                    .hits
                    .iter()
                    .rev()
                    .find(|(b, _)| b.left <= point.x && point.x < b.right && b.top <= point.y && point.y < b.bottom)
                    .map(|(_, h)| h.clone())
                    .unwrap_or(Hit::Nothing);
                self.on_hit(hit);
            }
            DeviceAction::Swipe { from, to, .. } => self.on_swipe(from, to),
            DeviceAction::KeyEvent(Key::Back) => self.on_back(),
            DeviceAction::KeyEvent(Key::Home) => self.screen = Screen::Home,
            DeviceAction::LaunchApp { .. } => self.launches += 1,
            _ => {}
        }
        String::new()
    }

    fn snapshot(&mut self) -> String {
        match &self.screen {
            Screen::Upload { .. } => self.upload_snapshots += 1,
            Screen::Annotations { book } if self.opts.malformed_dump_for.as_ref() == Some(book) => {
                self.opts.malformed_dump_for = None;
                return r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0"><node text="My Notebook"></hierarchy>"#
                    .to_string();
            }
            _ => {}
        }
        self.render().xml
    }

    fn record_upload(&mut self, book: String) {
        self.uploads.push(book);
        if let Some((count, token)) = &self.opts.cancel_after_uploads {
            if self.uploads.len() >= *count {
                token.cancel();
            }
        }
    }

    fn books(&self, name: &str) -> Vec<String> {
        self.opts
            .collections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.clone())
            .unwrap_or_default()
    }

    fn collection_screen(&self) -> Screen {
        let (name, offset) = self.last_collection.clone().unwrap_or_default();
        Screen::Collection { name, offset }
    }

    fn on_hit(&mut self, hit: Hit) {
        match hit {
            Hit::Home => self.screen = Screen::Home,
            Hit::Library => {
                self.library_taps += 1;
                self.overlay = self.opts.overlay_open;
                self.screen = Screen::Library;
            }
            Hit::Collections => self.screen = Screen::CollectionsList,
            Hit::Collection(name) => {
                self.last_collection = Some((name.clone(), 0));
                self.screen = Screen::Collection { name, offset: 0 };
            }
            Hit::Book(book) => {
                *self.opens.entry(book.clone()).or_insert(0) += 1;
                self.screen = Screen::Reader { book, toolbar: false };
            }
            Hit::RevealToolbar => {
                if let Screen::Reader { toolbar, .. } = &mut self.screen {
                    *toolbar = !*toolbar;
                }
            }
            Hit::Back => self.on_back(),
            Hit::Notebook if self.opts.ignored_notebook_taps > 0 => self.opts.ignored_notebook_taps -= 1,
            Hit::Notebook => {
                if let Screen::Reader { book, .. } = &self.screen {
                    if !self.opts.failing_books.contains(book) {
                        self.screen = Screen::Annotations { book: book.clone() };
                    }
                }
            }
            Hit::ExportNotebook => {
                if let Screen::Annotations { book } = &self.screen {
                    let book = book.clone();
                    self.screen = if self.opts.format_prompt {
                        Screen::FormatPrompt { book }
                    } else {
                        Screen::ShareSheet { book, scroll: 0 }
                    };
                }
            }
            Hit::NoFormat | Hit::Nothing => {}
            Hit::ConfirmFormat => {
                if let Screen::FormatPrompt { book } = &self.screen {
                    self.screen = Screen::ShareSheet {
                        book: book.clone(),
                        scroll: 0,
                    };
                }
            }
            Hit::CancelDialog => self.on_back(),
            Hit::Destination => {
                if let Screen::ShareSheet { book, .. } = &self.screen {
                    let book = book.clone();
                    if self.opts.confirm_button {
                        self.upload_snapshots = 0;
                        self.screen = Screen::Upload { book };
                    } else {
                        self.record_upload(book.clone());
                        self.screen = Screen::Annotations { book };
                    }
                }
            }
            Hit::ConfirmUpload => {
                if let Screen::Upload { book } = &self.screen {
                    let book = book.clone();
                    self.record_upload(book.clone());
                    self.screen = Screen::Annotations { book };
                }
            }
        }
    }

    fn on_swipe(&mut self, from: Point, to: Point) {
        let vertical = (from.y - to.y).abs() > (from.x - to.x).abs();
        let page_size = self.opts.page_size;
        match &mut self.screen {
            Screen::Collection { name, offset } if vertical && from.y > to.y => {
                let len = self
                    .opts
                    .collections
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, b)| b.len())
                    .unwrap_or(0);
                *offset = (*offset + page_size).min(len.saturating_sub(page_size));
                self.last_collection = Some((name.clone(), *offset));
            }
            Screen::ShareSheet { scroll, .. } if !vertical => *scroll += 1,
            _ => {}
        }
    }

    fn on_back(&mut self) {
        self.screen = match &self.screen {
            Screen::Home => Screen::Home,
            Screen::Library if self.overlay => {
                if !self.opts.sticky_overlay {
                    self.overlay = false;
                }
                Screen::Library
            }
            Screen::Library => Screen::Home,
            Screen::CollectionsList => Screen::Library,
            Screen::Collection { .. } => Screen::CollectionsList,
            Screen::Reader { .. } => self.collection_screen(),
            Screen::Annotations { book } => Screen::Reader {
                book: book.clone(),
                toolbar: false,
            },
            Screen::FormatPrompt { book } => Screen::Annotations { book: book.clone() },
            Screen::ShareSheet { book, .. } => Screen::Annotations { book: book.clone() },
            Screen::Upload { book } => Screen::ShareSheet {
                book: book.clone(),
                scroll: 0,
            },
        };
    }

    fn render(&self) -> Page {
        let mut page = Page::new();
        match &self.screen {
            Screen::Home => {
                page.node("Continue reading", "", "", false, Bounds::new(40, 100, 600, 180), None);
                self.bottom_nav(&mut page);
            }
            Screen::Library => {
                let heading = if self.opts.library_label { "Library" } else { "Your Books" };
                page.node(heading, "", "library_title", false, Bounds::new(40, 100, 600, 180), None);
                page.node("Collections", "", "", true, Bounds::new(40, 300, 400, 380), Some(Hit::Collections));
                self.bottom_nav(&mut page);
                if self.overlay {
                    page.node("Sort by", "", "", false, Bounds::new(40, 1500, 600, 1580), None);
                    page.node("Recent", "", "", true, Bounds::new(40, 1600, 600, 1680), Some(Hit::Nothing));
                    page.node("Title", "", "", true, Bounds::new(40, 1700, 600, 1780), Some(Hit::Nothing));
                }
            }
            Screen::CollectionsList => {
                page.node("Collections", "", "", false, Bounds::new(40, 100, 600, 180), None);
                for (i, (name, books)) in self.opts.collections.iter().enumerate() {
                    let top = 300 + i as i32 * 160;
                    let desc = format!("{}, {} items", name, books.len());
                    page.open(
                        "",
                        &desc,
                        "collection_row",
                        true,
                        Bounds::new(0, top, 1080, top + 140),
                        Some(Hit::Collection(name.clone())),
                    );
                    page.node(name, "", "collection_name", false, Bounds::new(40, top + 20, 600, top + 80), None);
                    page.close();
                }
                self.bottom_nav(&mut page);
            }
            Screen::Collection { name, offset } => {
                page.node(name, "", "collection_title", false, Bounds::new(40, 100, 600, 180), None);
                let books = self.books(name);
                let visible = books.iter().skip(*offset).take(self.opts.page_size);
                for (slot, title) in visible.enumerate() {
                    let top = 300 + slot as i32 * 600;
                    page.open(
                        "",
                        title,
                        "lib_book_row",
                        true,
                        Bounds::new(0, top, 1080, top + 580),
                        Some(Hit::Book(title.clone())),
                    );
                    page.node(title, "", "lib_book_row_title", false, Bounds::new(40, top + 480, 1040, top + 560), None);
                    page.close();
                }
                self.bottom_nav(&mut page);
            }
            Screen::Reader { toolbar, .. } => {
                page.node("", "", "reading_view", false, Bounds::new(0, 0, 1080, 2400), Some(Hit::RevealToolbar));
                if *toolbar {
                    let notebook = if self.opts.icon_only_notebook { "" } else { "Notebook" };
                    page.node("", "Back", "reader_toolbar_back", true, Bounds::new(0, 60, 120, 180), Some(Hit::Back));
                    page.node("", "Go To", "", true, Bounds::new(600, 60, 700, 180), Some(Hit::Nothing));
                    page.node("", notebook, "", true, Bounds::new(720, 60, 820, 180), Some(Hit::Notebook));
                    page.node("", "Aa", "", true, Bounds::new(840, 60, 940, 180), Some(Hit::Nothing));
                    page.node("", "Search", "", true, Bounds::new(960, 60, 1060, 180), Some(Hit::Nothing));
                }
            }
            Screen::Annotations { .. } => {
                page.node("My Notebook", "", "", false, Bounds::new(40, 60, 600, 180), None);
                if self.opts.icon_only_export {
                    page.node("", "", "", true, Bounds::new(820, 60, 940, 180), Some(Hit::ExportNotebook));
                } else {
                    page.node(
                        "Export Notebook",
                        "",
                        "",
                        true,
                        Bounds::new(700, 60, 1060, 180),
                        Some(Hit::ExportNotebook),
                    );
                }
                page.node(
                    "Yellow highlight | Location 12",
                    "",
                    "",
                    false,
                    Bounds::new(40, 400, 1040, 480),
                    None,
                );
            }
            Screen::FormatPrompt { .. } => {
                page.node("Citation style", "", "", false, Bounds::new(100, 700, 900, 780), None);
                page.node("None", "", "", true, Bounds::new(100, 800, 500, 900), Some(Hit::NoFormat));
                page.node("APA", "", "", true, Bounds::new(100, 950, 500, 1050), Some(Hit::Nothing));
                page.node("Cancel", "", "", true, Bounds::new(100, 1300, 400, 1400), Some(Hit::CancelDialog));
                page.node("Export", "", "", true, Bounds::new(600, 1300, 1000, 1400), Some(Hit::ConfirmFormat));
            }
            Screen::ShareSheet { scroll, .. } => {
                page.node("Share", "", "", false, Bounds::new(40, 1500, 400, 1580), None);
                let apps: &[&str] = if *scroll >= self.opts.destination_after_scrolls {
                    &["Keep", "OneDrive", "Slack"]
                } else {
                    &["Gmail", "Drive", "Messages"]
                };
                for (i, app) in apps.iter().enumerate() {
                    let left = 40 + i as i32 * 340;
                    let hit = if *app == "OneDrive" { Hit::Destination } else { Hit::Nothing };
                    page.node(app, "", "", true, Bounds::new(left, 1800, left + 300, 1950), Some(hit));
                }
            }
            Screen::Upload { .. } => {
                page.node("Cancel", "", "", true, Bounds::new(40, 100, 300, 200), Some(Hit::CancelDialog));
                if self.upload_snapshots > self.opts.confirm_after_snapshots {
                    page.node("Upload", "", "", true, Bounds::new(800, 100, 1040, 200), Some(Hit::ConfirmUpload));
                }
                page.node("Upload to OneDrive", "", "", false, Bounds::new(40, 300, 1040, 380), None);
            }
        }
        page.finish()
    }

    fn bottom_nav(&self, page: &mut Page) {
        let library = if self.opts.library_label { "Library" } else { "" };
        page.open("", "", "bottom_navigation", false, Bounds::new(0, 2200, 1080, 2400), None);
        page.node("Home", "", "", true, Bounds::new(0, 2200, 216, 2400), Some(Hit::Home));
        page.node(library, "", "", true, Bounds::new(216, 2200, 432, 2400), Some(Hit::Library));
        page.node("More", "", "", true, Bounds::new(864, 2200, 1080, 2400), Some(Hit::Nothing));
        page.close();
    }
}

struct Page {
    xml: String,
    hits: Vec<(Bounds, Hit)>,
}

impl Page {
    fn new() -> Self {
        let mut xml = String::from("<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation=\"0\">");
        xml.push_str(
            r#"<node index="0" text="" resource-id="" class="android.widget.FrameLayout" package="com.amazon.kindle" content-desc="" clickable="false" bounds="[0,0][1080,2400]">"#,
        );
        Self { xml, hits: Vec::new() }
    }

    fn attrs(text: &str, desc: &str, id: &str, clickable: bool, b: Bounds) -> String {
        let id = if id.is_empty() {
            String::new()
        } else {
            format!("com.amazon.kindle:id/{}", id)
        };
        format!(
            r#"index="0" text="{}" resource-id="{}" class="android.widget.TextView" package="com.amazon.kindle" content-desc="{}" clickable="{}" bounds="[{},{}][{},{}]""#,
            escape(text),
            id,
            escape(desc),
            clickable,
            b.left,
            b.top,
            b.right,
            b.bottom
        )
    }

    fn node(&mut self, text: &str, desc: &str, id: &str, clickable: bool, b: Bounds, hit: Option<Hit>) {
        self.xml.push_str(&format!("<node {} />", Self::attrs(text, desc, id, clickable, b)));
        if let Some(hit) = hit {
            self.hits.push((b, hit));
        }
    }

    fn open(&mut self, text: &str, desc: &str, id: &str, clickable: bool, b: Bounds, hit: Option<Hit>) {
        self.xml.push_str(&format!("<node {}>", Self::attrs(text, desc, id, clickable, b)));
        if let Some(hit) = hit {
            self.hits.push((b, hit));
        }
    }

    fn close(&mut self) {
        self.xml.push_str("</node>");
    }

    fn finish(mut self) -> Self {
        self.xml.push_str("</node></hierarchy>\nUI hierchary dumped to: /dev/tty\n");
        self
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// Engine helpers
// ---------------------------------------------------------------------------

/// A run configuration for `collection` with default tables and no app launch.
pub fn run_config(collection: &str) -> RunConfig {
    RunConfig::new(collection)
}

/// A device talking to `fake`.
pub fn device(fake: &Arc<FakeKindle>, config: &RunConfig) -> Device {
    Device::for_run(fake.clone(), config)
}
