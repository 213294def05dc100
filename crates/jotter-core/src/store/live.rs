//! Live query handles.
//!
//! A live query is a subscription, not a snapshot: it carries the current
//! result set and is re-emitted in full whenever a local mutation changes
//! that result set. Subscribers to the same [`NoteQuery`] share one refresh
//! task; the task is cancelled when the last handle is dropped.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::error::{Error, Result};
use crate::models::{Note, NoteId};

/// Logical query key for live subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NoteQuery {
    /// Every note
    All,
    /// Notes owned by one user
    ByUser(String),
    /// Notes whose title or content contains the term
    Search(String),
    /// A single note
    ById(NoteId),
}

impl fmt::Display for NoteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::ByUser(user_id) => write!(f, "user:{user_id}"),
            Self::Search(term) => write!(f, "search:{term}"),
            Self::ById(id) => write!(f, "id:{id}"),
        }
    }
}

/// Shared upstream for one query key
pub(crate) struct LiveChannel {
    rx: watch::Receiver<Vec<Note>>,
    task: AbortHandle,
}

impl LiveChannel {
    pub(crate) const fn new(rx: watch::Receiver<Vec<Note>>, task: AbortHandle) -> Self {
        Self { rx, task }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Live ordered sequence of notes
#[derive(Clone)]
pub struct LiveQuery {
    query: NoteQuery,
    rx: watch::Receiver<Vec<Note>>,
    _channel: Arc<LiveChannel>,
}

impl LiveQuery {
    pub(crate) fn attach(query: NoteQuery, channel: Arc<LiveChannel>) -> Self {
        let mut rx = channel.rx.clone();
        rx.borrow_and_update();
        Self {
            query,
            rx,
            _channel: channel,
        }
    }

    /// The query this subscription evaluates
    pub const fn query(&self) -> &NoteQuery {
        &self.query
    }

    /// Latest emitted result set
    pub fn current(&self) -> Vec<Note> {
        self.rx.borrow().clone()
    }

    /// Wait for the next emission and return it
    pub async fn changed(&mut self) -> Result<Vec<Note>> {
        self.rx
            .changed()
            .await
            .map_err(|_| Error::Database(format!("live query {} closed", self.query)))?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

impl fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveQuery")
            .field("query", &self.query)
            .field("len", &self.rx.borrow().len())
            .finish()
    }
}

/// Live single note, `None` while the note does not exist
#[derive(Clone, Debug)]
pub struct LiveNote(LiveQuery);

impl LiveNote {
    pub(crate) const fn new(inner: LiveQuery) -> Self {
        Self(inner)
    }

    pub fn current(&self) -> Option<Note> {
        self.0.current().into_iter().next()
    }

    pub async fn changed(&mut self) -> Result<Option<Note>> {
        Ok(self.0.changed().await?.into_iter().next())
    }
}
