//! A single exported notebook.
//!
//! The reading app exports a notebook as an HTML file with a flat list of
//! `div`s: `bookTitle`, `authors` and `citation` at the top, then
//! `sectionHeading` divs each followed by the `noteHeading`/`noteText` pairs
//! of that section.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::NotesError;

/// Tag every note carries.
pub const DEFAULT_TAG: &str = "NoteHammer";

/// Timestamp format used in the `Created` line and in backup folder names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Notes grouped under one section heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub notes: Vec<String>,
}

/// One book's highlights and notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub title: String,
    pub authors: String,
    pub citation: String,
    pub tags: BTreeSet<String>,
    /// Sections in document order.
    pub sections: Vec<Section>,
}

impl Note {
    /// Reads and parses an exported notebook file.
    pub fn from_file(path: &Path) -> Result<Self, NotesError> {
        let html = std::fs::read_to_string(path).map_err(|e| NotesError::io(path, e))?;
        Self::parse_html(&html)
    }

    /// Parses exported notebook HTML.
    ///
    /// Missing title, authors or citation become empty strings. A note that
    /// appears before any section heading is filed under an empty heading.
    /// Repeated notes within a section are kept once.
    pub fn parse_html(html: &str) -> Result<Self, NotesError> {
        let document = Html::parse_document(html);

        let title_raw = first_text(&document, "div.bookTitle")?;
        let authors_raw = first_text(&document, "div.authors")?;
        let citation_raw = first_text(&document, "div.citation")?;

        let mut sections: Vec<Section> = Vec::new();
        let mut current: Option<usize> = None;
        for element in document.select(&selector("div.sectionHeading, div.noteText")?) {
            let text = strip_newlines(&element_text(element)).to_string();
            if has_class(element, "sectionHeading") {
                // A heading repeated later in the file continues its section.
                current = Some(section_index(&mut sections, text));
                continue;
            }
            let index = match current {
                Some(index) => index,
                None => {
                    let index = section_index(&mut sections, String::new());
                    current = Some(index);
                    index
                }
            };
            let notes = &mut sections[index].notes;
            if !notes.contains(&text) {
                notes.push(text);
            }
        }

        Ok(Self {
            tags: extract_tags(&authors_raw, &title_raw),
            title: strip_newlines(&title_raw).to_string(),
            authors: strip_newlines(&authors_raw).to_string(),
            citation: strip_newlines(&citation_raw).to_string(),
            sections,
        })
    }

    /// Renders the note as markdown, stamped with `created`.
    pub fn to_markdown(&self, created: DateTime<Local>) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "#### {}", self.authors);
        text.push('\n');
        let _ = writeln!(text, "{}", self.citation);
        text.push('\n');
        for tag in &self.tags {
            let _ = writeln!(text, "#{}", tag);
        }
        let _ = writeln!(text, "\n\n- Created: {}", created.format(TIMESTAMP_FORMAT));
        text.push_str("\n---\n\n");

        for section in &self.sections {
            if !section.heading.is_empty() {
                let _ = writeln!(text, "### {}", section.heading);
                text.push('\n');
            }
            for note in &section.notes {
                let _ = writeln!(text, "- {}", note);
            }
        }
        text
    }
}

static BRACKETED_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+ \[(.*)\]\s*$").expect("tag pattern compiles"));

/// Builds the tag set for a note.
///
/// Always contains [`DEFAULT_TAG`]. A comma-separated list in brackets at
/// the end of the title (`Deep Work [focus, habits]`) adds one tag per entry,
/// and the authors collapse into a single tag (`Cal Newport` -> `CalNewport`).
pub fn extract_tags(authors: &str, title: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    tags.insert(DEFAULT_TAG.to_string());

    if let Some(list) = BRACKETED_TAGS.captures(title).and_then(|c| c.get(1)) {
        tags.extend(
            list.as_str()
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(capitalize),
        );
    }

    let author_tag: String = authors
        .replace('\n', "")
        .trim()
        .split(['.', ',', '!', ' '])
        .filter(|part| !part.trim().is_empty())
        .map(capitalize)
        .collect();
    if !author_tag.is_empty() {
        tags.insert(author_tag);
    }

    tags
}

/// Upper-cases the first character and lower-cases the rest.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn section_index(sections: &mut Vec<Section>, heading: String) -> usize {
    if let Some(index) = sections.iter().position(|s| s.heading == heading) {
        return index;
    }
    sections.push(Section {
        heading,
        notes: Vec::new(),
    });
    sections.len() - 1
}

/// Removes one leading and one trailing newline.
fn strip_newlines(text: &str) -> &str {
    let text = text.strip_prefix('\n').unwrap_or(text);
    text.strip_suffix('\n').unwrap_or(text)
}

fn selector(css: &str) -> Result<Selector, NotesError> {
    Selector::parse(css).map_err(|e| NotesError::Selector(format!("{css}: {e}")))
}

fn first_text(document: &Html, css: &str) -> Result<String, NotesError> {
    Ok(document
        .select(&selector(css)?)
        .next()
        .map(element_text)
        .unwrap_or_default())
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}
