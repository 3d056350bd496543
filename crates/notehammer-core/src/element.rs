//! Screen element types derived from a UI snapshot.
//!
//! These are the values every other component reasons about. They are
//! recomputed from each snapshot and never mutated, so two elements compare
//! equal when their content is equal.

use serde::{Deserialize, Serialize};

/// A point in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A screen rectangle as reported by the UI dump (`[left,top][right,bottom]`).
///
/// Coordinates are in device pixels with the origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Parses the `[x1,y1][x2,y2]` form used by `uiautomator dump`.
    ///
    /// Returns `None` for anything that does not have exactly four integers.
    pub fn parse(raw: &str) -> Option<Self> {
        let numbers: Vec<i32> = raw
            .split(|c: char| c == '[' || c == ']' || c == ',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .ok()?;
        match numbers.as_slice() {
            [left, top, right, bottom] => Some(Self::new(*left, *top, *right, *bottom)),
            _ => None,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point::new((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    /// True when the rectangle has no area (invisible or collapsed nodes).
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Grows the rectangle upward by `amount` pixels, clamped at the top edge.
    pub fn expand_up(&self, amount: i32) -> Bounds {
        Bounds::new(self.left, (self.top - amount).max(0), self.right, self.bottom)
    }
}

/// One element of the on-screen UI tree.
///
/// `label` is the accessibility description (`content-desc`), which many
/// icon-only buttons use instead of visible text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenElement {
    /// Center x-coordinate of the element's bounds.
    pub x: i32,
    /// Center y-coordinate of the element's bounds.
    pub y: i32,
    pub text: String,
    pub label: String,
    pub resource_id: String,
    pub class_name: String,
    pub clickable: bool,
    pub bounds: Bounds,
}

impl ScreenElement {
    pub fn new(bounds: Bounds) -> Self {
        let center = bounds.center();
        Self {
            x: center.x,
            y: center.y,
            text: String::new(),
            label: String::new(),
            resource_id: String::new(),
            class_name: String::new(),
            clickable: false,
            bounds,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// The visible text, falling back to the accessibility label.
    pub fn display_text(&self) -> &str {
        if self.text.is_empty() {
            &self.label
        } else {
            &self.text
        }
    }
}
