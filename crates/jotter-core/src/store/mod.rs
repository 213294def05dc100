//! Local note store with live queries

mod live;
mod local;

pub use live::{LiveNote, LiveQuery, NoteQuery};
pub use local::LocalStore;
