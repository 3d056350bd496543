//! The primitive command vocabulary of the control channel.
//!
//! The engine only ever asks a device for these things:
//!
//! - **Input**: [`DeviceAction::Tap`], [`DeviceAction::Swipe`], [`DeviceAction::KeyEvent`], [`DeviceAction::TextInput`]
//! - **Query**: [`DeviceAction::ScreenSnapshot`]
//! - **App lifecycle**: [`DeviceAction::LaunchApp`]
//!
//! Each action renders to the argument tokens of one `adb` invocation. The
//! mapping is reversible with [`DeviceAction::from_tokens`] so that a
//! substitute executor can interpret what it is sent.
//!
//! # Example
//!
//! ```
//! use notehammer_core::action::{DeviceAction, Key};
//!
//! let action = DeviceAction::KeyEvent(Key::Back);
//! assert_eq!(action.tokens(), vec!["shell", "input", "keyevent", "KEYCODE_BACK"]);
//! assert_eq!(DeviceAction::from_tokens(&action.tokens()), Some(action));
//! ```

use crate::element::Point;

/// Where `uiautomator` writes its dump when asked for stdout output.
pub const SNAPSHOT_TARGET: &str = "/dev/tty";

/// Hardware and navigation keys the engine presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Back,
    Home,
    Enter,
    Menu,
}

impl Key {
    /// The Android key code name passed to `input keyevent`.
    pub fn code(&self) -> &'static str {
        match self {
            Key::Back => "KEYCODE_BACK",
            Key::Home => "KEYCODE_HOME",
            Key::Enter => "KEYCODE_ENTER",
            Key::Menu => "KEYCODE_MENU",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "KEYCODE_BACK" | "4" => Some(Key::Back),
            "KEYCODE_HOME" | "3" => Some(Key::Home),
            "KEYCODE_ENTER" | "66" => Some(Key::Enter),
            "KEYCODE_MENU" | "82" => Some(Key::Menu),
            _ => None,
        }
    }
}

/// One primitive command sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    /// Tap at screen coordinates.
    Tap(Point),

    /// Swipe from one point to another over `duration_ms`.
    Swipe {
        from: Point,
        to: Point,
        duration_ms: u32,
    },

    /// Press a key.
    KeyEvent(Key),

    /// Type text into the focused field.
    TextInput(String),

    /// Dump the current UI hierarchy to standard output.
    ScreenSnapshot,

    /// Start an activity, given as `package/activity`.
    LaunchApp {
        component: String,
    },
}

impl DeviceAction {
    /// Returns a short, static name for this action, used in tracing spans.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceAction::Tap(_) => "tap",
            DeviceAction::Swipe { .. } => "swipe",
            DeviceAction::KeyEvent(_) => "key_event",
            DeviceAction::TextInput(_) => "text_input",
            DeviceAction::ScreenSnapshot => "screen_snapshot",
            DeviceAction::LaunchApp { .. } => "launch_app",
        }
    }

    /// Renders the action as `adb` argument tokens (without the `adb -s` prefix).
    pub fn tokens(&self) -> Vec<String> {
        match self {
            DeviceAction::Tap(p) => vec![
                "shell".into(),
                "input".into(),
                "tap".into(),
                p.x.to_string(),
                p.y.to_string(),
            ],
            DeviceAction::Swipe { from, to, duration_ms } => vec![
                "shell".into(),
                "input".into(),
                "swipe".into(),
                from.x.to_string(),
                from.y.to_string(),
                to.x.to_string(),
                to.y.to_string(),
                duration_ms.to_string(),
            ],
            DeviceAction::KeyEvent(key) => vec![
                "shell".into(),
                "input".into(),
                "keyevent".into(),
                key.code().into(),
            ],
            DeviceAction::TextInput(text) => vec![
                "shell".into(),
                "input".into(),
                "text".into(),
                escape_input_text(text),
            ],
            DeviceAction::ScreenSnapshot => vec![
                "exec-out".into(),
                "uiautomator".into(),
                "dump".into(),
                SNAPSHOT_TARGET.into(),
            ],
            DeviceAction::LaunchApp { component } => vec![
                "shell".into(),
                "am".into(),
                "start".into(),
                "-n".into(),
                component.clone(),
            ],
        }
    }

    /// Interprets tokens produced by [`tokens`](Self::tokens).
    ///
    /// Returns `None` for anything outside the vocabulary.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Option<Self> {
        let t: Vec<&str> = tokens.iter().map(|s| s.as_ref()).collect();
        let int = |s: &str| s.parse::<i32>().ok();
        match t.as_slice() {
            ["shell", "input", "tap", x, y] => Some(DeviceAction::Tap(Point::new(int(*x)?, int(*y)?))),
            ["shell", "input", "swipe", x1, y1, x2, y2, ms] => Some(DeviceAction::Swipe {
                from: Point::new(int(*x1)?, int(*y1)?),
                to: Point::new(int(*x2)?, int(*y2)?),
                duration_ms: ms.parse().ok()?,
            }),
            ["shell", "input", "keyevent", code] => Key::from_code(*code).map(DeviceAction::KeyEvent),
            ["shell", "input", "text", text] => Some(DeviceAction::TextInput(unescape_input_text(*text))),
            ["exec-out", "uiautomator", "dump", _] => Some(DeviceAction::ScreenSnapshot),
            ["shell", "am", "start", "-n", component] => Some(DeviceAction::LaunchApp {
                component: (*component).to_string(),
            }),
            _ => None,
        }
    }
}

/// Escapes text for `input text`: spaces become `%s` and shell
/// metacharacters are backslash-escaped.
pub fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => out.push_str("%s"),
            '\'' | '"' | '\\' | '(' | ')' | '&' | '<' | '>' | ';' | '|' | '*' | '$' | '`' | '!' | '?' | '#' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn unescape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '%' if chars.peek() == Some(&'s') => {
                chars.next();
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}
