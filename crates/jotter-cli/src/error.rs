use std::io;

use thiserror::Error;

/// Failures surfaced to the terminal as `Error: ...`
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] jotter_core::Error),
    #[error("Remote setup failed: {0}")]
    Remote(#[from] jotter_core::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("JSON output failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Nothing to save: the note has no title or content")]
    EmptyContent,
    #[error("Refusing to save an edit that leaves the note blank")]
    EmptyEditedContent,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,

    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("'{0}' is not a note ID (expected a positive number)")]
    InvalidNoteId(String),
    #[error("No note with ID {0}")]
    NoteNotFound(String),

    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Not signed in. Run `jotter auth login` or pass --user.")]
    NotSignedIn,
}
