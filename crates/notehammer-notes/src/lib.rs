//! Converts exported Kindle notebooks (HTML) into markdown notes.
//!
//! The device automation in `notehammer-core` uploads one notebook file per
//! book. This crate turns those files into markdown documents with tags
//! derived from the title and authors, ready for a notes vault.
//!
//! # Modules
//!
//! - [`note`] - Parsing a notebook and rendering it as markdown
//! - [`files`] - Finding notebook files, writing markdown, backups
//! - [`error`] - Error type
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use notehammer_notes::files::extract_kindle_notes;
//!
//! let result = extract_kindle_notes(Path::new("Kindle"), Path::new("export"))?;
//! println!("{} notes written", result.written.len());
//! # Ok::<(), notehammer_notes::NotesError>(())
//! ```

pub mod error;
pub mod files;
pub mod note;

pub use error::NotesError;
pub use note::Note;
