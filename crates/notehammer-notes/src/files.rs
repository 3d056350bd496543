//! Batch operations over exported notebook files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use regex::Regex;
use tracing::{debug, info};

use crate::error::NotesError;
use crate::note::{Note, TIMESTAMP_FORMAT};

/// What [`extract_kindle_notes`] did.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub notes: usize,
    pub written: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// Converts every notebook under `input` into a markdown file in `output`.
pub fn extract_kindle_notes(input: &Path, output: &Path) -> Result<Extraction, NotesError> {
    let start = Instant::now();
    info!(input = %input.display(), output = %output.display(), "extracting notes");

    let notes = extract_notes(input)?;
    let written = write_notes(&notes, output, Local::now())?;

    let elapsed = start.elapsed();
    info!(count = notes.len(), elapsed_ms = elapsed.as_millis() as u64, "notes extracted");
    Ok(Extraction {
        notes: notes.len(),
        written,
        elapsed,
    })
}

/// Lists the notebook files at `input`: the file itself when it is an
/// `.html` file, or every `.html` file below it when it is a directory.
pub fn find_notebooks(input: &Path) -> Result<Vec<PathBuf>, NotesError> {
    if input.is_file() {
        if is_html(input) {
            return Ok(vec![input.to_path_buf()]);
        }
        return Err(NotesError::InvalidInput(input.to_path_buf()));
    }
    if !input.is_dir() {
        return Err(NotesError::InvalidInput(input.to_path_buf()));
    }

    let root = input
        .to_str()
        .ok_or_else(|| NotesError::InvalidInput(input.to_path_buf()))?;
    let pattern = format!("{}/**/*.html", glob::Pattern::escape(root));
    let mut files: Vec<PathBuf> = glob::glob(&pattern)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Parses every notebook at `input`, in path order.
pub fn extract_notes(input: &Path) -> Result<Vec<Note>, NotesError> {
    let files = find_notebooks(input)?;
    debug!(files = files.len(), "parsing notebooks");
    files.iter().map(|path| Note::from_file(path)).collect()
}

/// Writes one markdown file per note into `output`, creating it if needed.
///
/// Returns the paths written. Notes whose titles clean up to the same file
/// name overwrite each other.
pub fn write_notes(notes: &[Note], output: &Path, created: DateTime<Local>) -> Result<Vec<PathBuf>, NotesError> {
    fs::create_dir_all(output).map_err(|e| NotesError::io(output, e))?;
    let mut written = Vec::with_capacity(notes.len());
    for note in notes {
        let path = output.join(note_file_name(&note.title));
        fs::write(&path, note.to_markdown(created)).map_err(|e| NotesError::io(&path, e))?;
        debug!(path = %path.display(), "note written");
        written.push(path);
    }
    Ok(written)
}

static INVALID_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|]"#).expect("file name pattern compiles"));

/// File name for a note: the title without its trailing `[tags]` and without
/// characters that are not allowed in file names.
pub fn note_file_name(title: &str) -> String {
    let untagged = match title.rfind('[') {
        Some(index) => &title[..index],
        None => title,
    };
    let cleaned = INVALID_FILE_CHARS.replace_all(untagged.trim(), "");
    let stem = match cleaned.trim() {
        "" => "Untitled",
        stem => stem,
    };
    format!("{stem}.md")
}

/// Copies `input` into a new `backup_<timestamp>` folder under `backup_root`.
pub fn backup(input: &Path, backup_root: &Path, now: DateTime<Local>) -> Result<PathBuf, NotesError> {
    let target = backup_root.join(format!("backup_{}", now.format(TIMESTAMP_FORMAT)));
    fs::create_dir_all(&target).map_err(|e| NotesError::io(&target, e))?;

    if input.is_file() {
        let name = input
            .file_name()
            .ok_or_else(|| NotesError::InvalidInput(input.to_path_buf()))?;
        let dest = target.join(name);
        fs::copy(input, &dest).map_err(|e| NotesError::io(&dest, e))?;
    } else if input.is_dir() {
        copy_dir(input, &target)?;
    } else {
        return Err(NotesError::InvalidInput(input.to_path_buf()));
    }

    info!(from = %input.display(), to = %target.display(), "notes backed up");
    Ok(target)
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), NotesError> {
    let entries = fs::read_dir(from).map_err(|e| NotesError::io(from, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| NotesError::io(from, e))?;
        let source = entry.path();
        let dest = to.join(entry.file_name());
        if source.is_dir() {
            fs::create_dir_all(&dest).map_err(|e| NotesError::io(&dest, e))?;
            copy_dir(&source, &dest)?;
        } else {
            fs::copy(&source, &dest).map_err(|e| NotesError::io(&dest, e))?;
        }
    }
    Ok(())
}

fn is_html(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("html")
}
