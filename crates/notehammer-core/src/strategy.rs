//! Named, prioritized strategies for finding a tap target.
//!
//! Every workflow and navigation step that has fallbacks describes them as a
//! [`StrategyChain`]: a list of [`Locate`] strategies tried in order against
//! one snapshot. Text matches come first, positional heuristics and fixed
//! coordinates last. Each strategy is a plain value and can be exercised on
//! its own against a synthetic snapshot.

use std::fmt;

use crate::element::{Point, ScreenElement};
use crate::locator::{find_any_text, UiSnapshot};

/// One way of finding a tap target on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locate {
    /// First element whose text or label equals one of the candidates.
    ExactText(Vec<String>),
    /// First element whose text or label contains one of the candidates
    /// (case-sensitive).
    ContainsText(Vec<String>),
    /// Topmost clickable element whose text or label contains `needle`.
    ClickableContaining { needle: String, ignore_case: bool },
    /// The `from_right`-th clickable element (1-based, counted from the right)
    /// whose bounds sit entirely above `max_bottom`.
    ToolbarPosition { from_right: usize, max_bottom: i32 },
    /// Of the elements exactly matching any candidate, the rightmost one.
    Rightmost(Vec<String>),
    /// A fixed coordinate. Always resolves.
    FixedPoint(Point),
}

/// A resolved tap target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub point: Point,
    pub strategy: &'static str,
    /// The matched element, absent for [`Locate::FixedPoint`].
    pub element: Option<ScreenElement>,
}

impl Locate {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Locate::ExactText(_) => "exact_text",
            Locate::ContainsText(_) => "contains_text",
            Locate::ClickableContaining { .. } => "clickable_containing",
            Locate::ToolbarPosition { .. } => "toolbar_position",
            Locate::Rightmost(_) => "rightmost",
            Locate::FixedPoint(_) => "fixed_point",
        }
    }

    /// Resolves this strategy against `snapshot`.
    ///
    /// Elements with empty bounds are never returned.
    pub fn locate(&self, snapshot: &UiSnapshot) -> Option<Located> {
        let element = match self {
            Locate::FixedPoint(point) => {
                return Some(Located {
                    point: *point,
                    strategy: self.name(),
                    element: None,
                })
            }
            Locate::ExactText(candidates) => first_visible(find_any_text(snapshot, candidates, false)),
            Locate::ContainsText(candidates) => first_visible(find_any_text(snapshot, candidates, true)),
            Locate::ClickableContaining { needle, ignore_case } => {
                clickable_containing(snapshot, needle, *ignore_case)
            }
            Locate::ToolbarPosition { from_right, max_bottom } => {
                toolbar_position(snapshot, *from_right, *max_bottom)
            }
            Locate::Rightmost(candidates) => find_any_text(snapshot, candidates, false)
                .into_iter()
                .filter(|e| !e.bounds.is_empty())
                .max_by_key(|e| e.x),
        }?;
        Some(Located {
            point: element.center(),
            strategy: self.name(),
            element: Some(element),
        })
    }
}

impl fmt::Display for Locate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locate::FixedPoint(p) => write!(f, "{} {}", self.name(), p),
            Locate::ToolbarPosition { from_right, .. } => write!(f, "{} #{} from right", self.name(), from_right),
            Locate::ClickableContaining { needle, .. } => write!(f, "{} '{}'", self.name(), needle),
            Locate::ExactText(c) | Locate::ContainsText(c) | Locate::Rightmost(c) => {
                write!(f, "{} {:?}", self.name(), c)
            }
        }
    }
}

fn first_visible(elements: Vec<ScreenElement>) -> Option<ScreenElement> {
    elements.into_iter().find(|e| !e.bounds.is_empty())
}

/// Clickable elements whose text or label contains `needle`. With
/// `ignore_case`, case-sensitive hits win over case-insensitive ones; ties
/// go to the topmost element.
pub fn clickable_containing(snapshot: &UiSnapshot, needle: &str, ignore_case: bool) -> Option<ScreenElement> {
    if needle.is_empty() {
        return None;
    }
    let lowered = needle.to_lowercase();
    let candidates: Vec<&ScreenElement> = snapshot
        .elements()
        .filter(|e| e.clickable && !e.bounds.is_empty())
        .filter(|e| {
            if ignore_case {
                e.text.to_lowercase().contains(&lowered) || e.label.to_lowercase().contains(&lowered)
            } else {
                e.text.contains(needle) || e.label.contains(needle)
            }
        })
        .collect();

    let exact_case: Vec<&ScreenElement> = candidates
        .iter()
        .copied()
        .filter(|e| e.text.contains(needle) || e.label.contains(needle))
        .collect();
    let pool = if exact_case.is_empty() { candidates } else { exact_case };
    pool.into_iter().min_by_key(|e| (e.y, e.x)).cloned()
}

fn toolbar_position(snapshot: &UiSnapshot, from_right: usize, max_bottom: i32) -> Option<ScreenElement> {
    if from_right == 0 {
        return None;
    }
    let mut toolbar: Vec<&ScreenElement> = snapshot
        .elements()
        .filter(|e| e.clickable && !e.bounds.is_empty() && e.bounds.bottom <= max_bottom)
        .collect();
    toolbar.sort_by_key(|e| std::cmp::Reverse(e.x));
    toolbar.get(from_right - 1).map(|e| (*e).clone())
}

/// An ordered list of strategies for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyChain {
    steps: Vec<Locate>,
}

impl StrategyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a strategy. Empty candidate lists are skipped.
    pub fn then(mut self, step: Locate) -> Self {
        let empty = match &step {
            Locate::ExactText(c) | Locate::ContainsText(c) | Locate::Rightmost(c) => {
                c.is_empty()
            }
            _ => false,
        };
        if !empty {
            self.steps.push(step);
        }
        self
    }

    pub fn steps(&self) -> &[Locate] {
        &self.steps
    }

    /// The first strategy that resolves, in priority order.
    pub fn resolve(&self, snapshot: &UiSnapshot) -> Option<Located> {
        self.steps.iter().find_map(|s| s.locate(snapshot))
    }

    /// Every resolving strategy's target, in priority order, with repeated
    /// points dropped. Used by steps that probe targets one by one and verify
    /// after each tap.
    pub fn resolve_all(&self, snapshot: &UiSnapshot) -> Vec<Located> {
        let mut out: Vec<Located> = Vec::new();
        for located in self.steps.iter().filter_map(|s| s.locate(snapshot)) {
            if !out.iter().any(|l| l.point == located.point) {
                out.push(located);
            }
        }
        out
    }
}
