//! Data models for Jotter

mod note;
mod remote_note;

pub use note::{Note, NoteId};
pub use remote_note::{RemoteNote, RemoteNoteWrite};
