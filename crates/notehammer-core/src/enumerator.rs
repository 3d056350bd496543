//! Discovering every item of the open collection.
//!
//! The collection view is an unbounded scrolling list. The enumerator takes a
//! snapshot, pulls item candidates out of it, keeps the ones whose title it
//! has not seen, scrolls once and repeats. It stops when a page adds nothing
//! new, when the item cap is reached, or at the iteration ceiling.
//!
//! Items are keyed by their exact display title, so two items with the same
//! title collapse into one.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{RunConfig, UiProfile};
use crate::device::{Device, DeviceError};
use crate::element::Point;
use crate::locator::{resource_id_matches, UiSnapshot};

/// One exportable item of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Item {
    pub title: String,
    /// Where the item was last seen. Used only when it cannot be found by
    /// title again.
    pub location: Point,
}

impl Item {
    pub fn new(title: impl Into<String>, location: Point) -> Self {
        Self {
            title: title.into(),
            location,
        }
    }
}

/// Which extraction layer produced a page's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionLayer {
    /// Clickable item containers carrying an accessibility label.
    LabelledButtons,
    /// Title text views, tapped through their clickable parent.
    TitleText,
    /// Any long text inside the list area, bounds grown up to the cover.
    ExpandedText,
}

/// Extracts item candidates from one snapshot.
///
/// Layers are tried in order and the first that yields anything wins, so a
/// page never mixes titles from two layers. `exclude` is dropped from the
/// last layer (the collection heading).
pub fn extract_items(snapshot: &UiSnapshot, ui: &UiProfile, exclude: &str) -> (Vec<Item>, Option<ExtractionLayer>) {
    let labelled = labelled_buttons(snapshot, ui);
    if !labelled.is_empty() {
        return (labelled, Some(ExtractionLayer::LabelledButtons));
    }
    let titles = title_text(snapshot, ui);
    if !titles.is_empty() {
        return (titles, Some(ExtractionLayer::TitleText));
    }
    let expanded = expanded_text(snapshot, ui, exclude);
    if !expanded.is_empty() {
        return (expanded, Some(ExtractionLayer::ExpandedText));
    }
    (Vec::new(), None)
}

fn matches_any(resource_id: &str, ids: &[String]) -> bool {
    ids.iter().any(|id| resource_id_matches(resource_id, id))
}

fn labelled_buttons(snapshot: &UiSnapshot, ui: &UiProfile) -> Vec<Item> {
    snapshot
        .elements()
        .filter(|e| e.clickable && !e.bounds.is_empty() && matches_any(&e.resource_id, &ui.item_ids))
        .filter(|e| !e.label.trim().is_empty())
        .map(|e| Item::new(e.label.trim(), e.center()))
        .collect()
}

fn title_text(snapshot: &UiSnapshot, ui: &UiProfile) -> Vec<Item> {
    snapshot
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, n)| !n.element.bounds.is_empty() && matches_any(&n.element.resource_id, &ui.item_title_ids))
        .filter(|(_, n)| !n.element.text.trim().is_empty())
        .map(|(index, n)| {
            let location = snapshot
                .clickable_ancestor(index)
                .map(|parent| parent.center())
                .unwrap_or_else(|| n.element.center());
            Item::new(n.element.text.trim(), location)
        })
        .collect()
}

fn expanded_text(snapshot: &UiSnapshot, ui: &UiProfile, exclude: &str) -> Vec<Item> {
    let screen = snapshot.screen();
    let list_bottom = screen.bottom - ui.list_bottom_margin;
    snapshot
        .elements()
        .filter(|e| !e.bounds.is_empty() && e.bounds.top >= ui.list_top && e.bounds.bottom <= list_bottom)
        .filter_map(|e| {
            let title = e.text.trim();
            if title.chars().count() < ui.min_title_chars
                || title.eq_ignore_ascii_case(exclude)
                || ui.chrome_labels.iter().any(|c| c == title)
            {
                return None;
            }
            Some(Item::new(title, e.bounds.expand_up(ui.title_expand_px).center()))
        })
        .collect()
}

/// Paginates the open collection.
pub struct Enumerator<'a> {
    device: &'a Device,
    config: &'a RunConfig,
}

impl<'a> Enumerator<'a> {
    pub fn new(device: &'a Device, config: &'a RunConfig) -> Self {
        Self { device, config }
    }

    /// Returns every distinct item, in discovery order.
    ///
    /// An empty collection yields an empty list. No scroll is issued once the
    /// item cap is reached or after a page with nothing new.
    pub async fn enumerate(&self) -> Result<Vec<Item>, DeviceError> {
        let cap = self.config.max_items;
        let ceiling = self.config.limits.enumeration_iterations.max(1);
        let scroll = self.config.ui.list_scroll;
        let mut items: Vec<Item> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        if cap == Some(0) {
            return Ok(items);
        }

        for iteration in 1..=ceiling {
            let snapshot = self.device.snapshot().await?;
            let (candidates, layer) = extract_items(&snapshot, &self.config.ui, &self.config.collection_name);
            let mut added = 0;
            for item in candidates {
                if seen.insert(item.title.clone()) {
                    debug!(title = %item.title, location = %item.location, "item found");
                    items.push(item);
                    added += 1;
                    if cap.is_some_and(|max| items.len() >= max) {
                        info!(count = items.len(), "item cap reached");
                        return Ok(items);
                    }
                }
            }
            debug!(iteration, added, layer = ?layer, total = items.len(), "page scanned");
            if added == 0 {
                info!(count = items.len(), pages = iteration, "end of collection");
                return Ok(items);
            }
            if iteration < ceiling {
                self.device.swipe(scroll.from, scroll.to).await?;
            }
        }

        warn!(count = items.len(), ceiling, "enumeration stopped at iteration ceiling");
        Ok(items)
    }
}
