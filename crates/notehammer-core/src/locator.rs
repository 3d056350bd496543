//! UI snapshot parsing and element lookup.
//!
//! A [`UiSnapshot`] is the structured form of one `uiautomator dump`: every
//! `<node>` of the hierarchy becomes a [`UiNode`] holding its typed
//! [`ScreenElement`] record, its full attribute map, and a link to its parent.
//!
//! Lookups never fail. A query that matches nothing returns an empty `Vec`,
//! because an element being absent is the ordinary outcome of polling a screen
//! that is still changing.
//!
//! # Example
//!
//! ```
//! use notehammer_core::locator::{find_by_text, UiSnapshot};
//!
//! let xml = r#"<hierarchy rotation="0">
//!   <node text="Library" resource-id="" class="android.widget.TextView"
//!         content-desc="" clickable="true" bounds="[0,2200][270,2400]" />
//! </hierarchy>"#;
//! let snapshot = UiSnapshot::parse(xml).unwrap();
//! let hits = find_by_text(&snapshot, "Library", false);
//! assert_eq!(hits.len(), 1);
//! assert_eq!((hits[0].x, hits[0].y), (135, 2300));
//! ```

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::element::{Bounds, ScreenElement};

/// Errors raised while turning a dump into a snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The dump is not well-formed XML.
    #[error("Malformed UI dump: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The channel answered without a `<hierarchy>` document, which happens
    /// while the screen is mid-transition.
    #[error("UI dump contained no hierarchy: {0}")]
    MissingHierarchy(String),
}

/// One node of the UI tree.
#[derive(Debug, Clone)]
pub struct UiNode {
    pub element: ScreenElement,
    pub attributes: BTreeMap<String, String>,
    pub parent: Option<usize>,
    pub depth: usize,
}

/// A point-in-time capture of the visible UI.
///
/// Immutable once parsed. Nodes are stored in document order.
#[derive(Debug, Clone)]
pub struct UiSnapshot {
    nodes: Vec<UiNode>,
    screen: Bounds,
    raw: String,
}

impl UiSnapshot {
    /// Parses the raw output of a UI dump.
    ///
    /// Text before the `<hierarchy>` element and after its closing tag (the
    /// dump tool prints a status line there) is ignored.
    pub fn parse(raw: &str) -> Result<Self, SnapshotError> {
        let start = raw
            .find("<hierarchy")
            .ok_or_else(|| SnapshotError::MissingHierarchy(first_line(raw)))?;
        let end = raw
            .rfind("</hierarchy>")
            .map(|i| i + "</hierarchy>".len())
            .unwrap_or(raw.len());
        let document = &raw[start..end.max(start)];

        let mut reader = Reader::from_str(document);
        reader.config_mut().trim_text(true);

        let mut nodes: Vec<UiNode> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(tag) => {
                    if tag.name().as_ref() == b"node" {
                        let index = push_node(&mut nodes, &tag, stack.last().copied(), stack.len())?;
                        stack.push(index);
                    }
                }
                Event::Empty(tag) => {
                    if tag.name().as_ref() == b"node" {
                        push_node(&mut nodes, &tag, stack.last().copied(), stack.len())?;
                    }
                }
                Event::End(tag) => {
                    if tag.name().as_ref() == b"node" {
                        stack.pop();
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let screen = nodes
            .iter()
            .map(|n| n.element.bounds)
            .filter(|b| !b.is_empty())
            .fold(None, |acc: Option<Bounds>, b| {
                Some(match acc {
                    None => b,
                    Some(a) => Bounds::new(
                        a.left.min(b.left),
                        a.top.min(b.top),
                        a.right.max(b.right),
                        a.bottom.max(b.bottom),
                    ),
                })
            })
            .unwrap_or_default();

        Ok(Self {
            nodes,
            screen,
            raw: document.to_string(),
        })
    }

    /// All nodes in document order.
    pub fn nodes(&self) -> &[UiNode] {
        &self.nodes
    }

    /// All elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &ScreenElement> {
        self.nodes.iter().map(|n| &n.element)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The area covered by the hierarchy, i.e. the screen size.
    pub fn screen(&self) -> Bounds {
        self.screen
    }

    /// The XML document the snapshot was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The closest ancestor of node `index` that is clickable.
    pub fn clickable_ancestor(&self, index: usize) -> Option<&ScreenElement> {
        let mut current = self.nodes.get(index)?.parent;
        while let Some(i) = current {
            let node = &self.nodes[i];
            if node.element.clickable {
                return Some(&node.element);
            }
            current = node.parent;
        }
        None
    }

    /// Every non-empty visible string on screen, deduplicated, in document order.
    ///
    /// Attached to navigation errors so a failure can be diagnosed from logs.
    pub fn text_inventory(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.elements()
            .map(|e| e.display_text().trim())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// True when any node's resource id ends with one of `ids`.
    ///
    /// Ids may be given with or without the `package:id/` prefix.
    pub fn has_resource_id(&self, ids: &[String]) -> bool {
        !find_by_attribute(self, "resource-id", |v| ids.iter().any(|id| resource_id_matches(v, id))).is_empty()
    }
}

/// Matches a full resource id (`com.app:id/name`) against `wanted`, which may
/// be either the full id or the bare `name`.
pub fn resource_id_matches(full: &str, wanted: &str) -> bool {
    if wanted.is_empty() {
        return false;
    }
    full == wanted || full.rsplit('/').next() == Some(wanted)
}

/// Finds elements whose text or accessibility label matches `text`.
///
/// Strict mode requires equality; fuzzy mode is a case-sensitive substring
/// match.
pub fn find_by_text(snapshot: &UiSnapshot, text: &str, fuzzy: bool) -> Vec<ScreenElement> {
    if text.is_empty() {
        return Vec::new();
    }
    let matches = |value: &str| {
        if fuzzy {
            value.contains(text)
        } else {
            value == text
        }
    };
    snapshot
        .elements()
        .filter(|e| matches(&e.text) || matches(&e.label))
        .cloned()
        .collect()
}

/// Finds elements matching any of `candidates`, in candidate order.
///
/// Elements matched by an earlier candidate come first; an element is listed
/// once even if several candidates match it.
pub fn find_any_text(snapshot: &UiSnapshot, candidates: &[String], fuzzy: bool) -> Vec<ScreenElement> {
    let mut found: Vec<ScreenElement> = Vec::new();
    for candidate in candidates {
        for element in find_by_text(snapshot, candidate, fuzzy) {
            if !found.contains(&element) {
                found.push(element);
            }
        }
    }
    found
}

/// Finds elements whose attribute `key` satisfies `predicate`.
///
/// `key` is the raw dump attribute name, e.g. `resource-id`, `content-desc`
/// or `clickable`. Nodes without the attribute never match.
pub fn find_by_attribute<F>(snapshot: &UiSnapshot, key: &str, predicate: F) -> Vec<ScreenElement>
where
    F: Fn(&str) -> bool,
{
    snapshot
        .nodes()
        .iter()
        .filter(|n| n.attributes.get(key).is_some_and(|v| predicate(v.as_str())))
        .map(|n| n.element.clone())
        .collect()
}

fn push_node(
    nodes: &mut Vec<UiNode>,
    tag: &BytesStart<'_>,
    parent: Option<usize>,
    depth: usize,
) -> Result<usize, SnapshotError> {
    let mut attributes = BTreeMap::new();
    for attr in tag.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.insert(key, value);
    }

    let bounds = attributes
        .get("bounds")
        .and_then(|b| Bounds::parse(b))
        .unwrap_or_default();
    let attr = |key: &str| attributes.get(key).cloned().unwrap_or_default();

    let mut element = ScreenElement::new(bounds);
    element.text = attr("text");
    element.label = attr("content-desc");
    element.resource_id = attr("resource-id");
    element.class_name = attr("class");
    element.clickable = attributes.get("clickable").is_some_and(|v| v == "true");

    nodes.push(UiNode {
        element,
        attributes,
        parent,
        depth,
    });
    Ok(nodes.len() - 1)
}

fn first_line(raw: &str) -> String {
    raw.lines().next().unwrap_or_default().trim().chars().take(120).collect()
}
