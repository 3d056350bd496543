//! Element listing for `note-hammer inspect`.

use notehammer_core::element::ScreenElement;
use notehammer_core::locator::UiSnapshot;

/// Elements worth showing: anything with text, a label or a resource id,
/// optionally narrowed to clickable ones and to a case-insensitive search
/// over text and label.
pub fn select_elements<'a>(snapshot: &'a UiSnapshot, find: Option<&str>, clickable_only: bool) -> Vec<&'a ScreenElement> {
    let needle = find.map(str::to_lowercase);
    snapshot
        .elements()
        .filter(|e| !e.text.is_empty() || !e.label.is_empty() || !e.resource_id.is_empty())
        .filter(|e| !clickable_only || e.clickable)
        .filter(|e| match &needle {
            Some(n) => e.text.to_lowercase().contains(n) || e.label.to_lowercase().contains(n),
            None => true,
        })
        .collect()
}
