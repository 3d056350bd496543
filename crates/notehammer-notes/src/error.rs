use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotesError {
    #[error("not an .html file or a directory: {}", .0.display())]
    InvalidInput(PathBuf),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("invalid selector: {0}")]
    Selector(String),
}

impl NotesError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NotesError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<glob::GlobError> for NotesError {
    fn from(err: glob::GlobError) -> Self {
        let path = err.path().to_path_buf();
        NotesError::io(path, err.into_error())
    }
}
