//! Search-driven live note feed.
//!
//! The bus turns a stream of search-box edits into exactly one live
//! subscription on the local store. Edits are debounced; a settled edit
//! switches the upstream query by opening the new subscription first and
//! dropping the old one only after its first result set is published, so
//! observers never see a gap. With no observers left the upstream is
//! released after a grace period and reopened on demand.

use std::future::pending;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};

use crate::auth::AuthProvider;
use crate::error::{Error, Result};
use crate::models::Note;
use crate::store::{LiveQuery, LocalStore, NoteQuery};

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
const DEFAULT_IDLE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Quiet period before a search edit takes effect
    pub debounce: Duration,
    /// How long the upstream stays open without observers
    pub idle_grace: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            idle_grace: DEFAULT_IDLE_GRACE,
        }
    }
}

/// Map a settled search text to the store query it selects.
pub fn resolve_query(search: &str, current_user_id: Option<&str>) -> NoteQuery {
    let term = search.trim();
    if !term.is_empty() {
        return NoteQuery::Search(term.to_string());
    }
    match current_user_id.map(str::trim) {
        Some(user_id) if !user_id.is_empty() => NoteQuery::ByUser(user_id.to_string()),
        _ => NoteQuery::All,
    }
}

enum Command {
    Search(String),
    RefreshIdentity,
}

struct Shared {
    feed: watch::Sender<Vec<Note>>,
    observers: watch::Sender<usize>,
    active: watch::Sender<Option<NoteQuery>>,
    switches: AtomicU64,
}

/// Debounced, switchable live note feed
pub struct QueryBus {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    task: AbortHandle,
}

impl QueryBus {
    /// Start the bus; must be called inside a Tokio runtime.
    pub fn new(store: LocalStore, auth: Arc<dyn AuthProvider>, options: QueryOptions) -> Self {
        let (feed, _) = watch::channel(Vec::new());
        let (observers, observer_rx) = watch::channel(0);
        let (active, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            feed,
            observers,
            active,
            switches: AtomicU64::new(0),
        });
        let (commands, command_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            store,
            auth,
            options,
            shared: Arc::clone(&shared),
            settled: String::new(),
            pending: None,
            upstream: None,
            idle_at: None,
        };
        let task = tokio::spawn(driver.run(command_rx, observer_rx)).abort_handle();

        Self {
            shared,
            commands,
            task,
        }
    }

    /// Push a search edit; only the last edit of a burst takes effect.
    pub fn set_search(&self, text: impl Into<String>) {
        self.send(Command::Search(text.into()));
    }

    /// Re-resolve the current search after the signed-in user changed.
    pub fn refresh_identity(&self) {
        self.send(Command::RefreshIdentity);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Query bus stopped; dropping command");
        }
    }

    /// Subscribe to the feed; the first observer opens the upstream.
    pub fn observe(&self) -> FeedObserver {
        FeedObserver::attach(Arc::clone(&self.shared))
    }

    /// Query of the open upstream subscription
    pub fn active_query(&self) -> Option<NoteQuery> {
        self.shared.active.borrow().clone()
    }

    pub fn watch_active(&self) -> watch::Receiver<Option<NoteQuery>> {
        self.shared.active.subscribe()
    }

    /// Number of upstream subscriptions opened so far
    pub fn switch_count(&self) -> u64 {
        self.shared.switches.load(Ordering::SeqCst)
    }

    pub fn observer_count(&self) -> usize {
        *self.shared.observers.borrow()
    }
}

impl Drop for QueryBus {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read side of the feed
pub struct FeedObserver {
    shared: Arc<Shared>,
    rx: watch::Receiver<Vec<Note>>,
}

impl FeedObserver {
    fn attach(shared: Arc<Shared>) -> Self {
        shared.observers.send_modify(|count| *count += 1);
        let rx = shared.feed.subscribe();
        Self { shared, rx }
    }

    /// Latest published result set
    pub fn current(&self) -> Vec<Note> {
        self.rx.borrow().clone()
    }

    /// Wait for the next published result set
    pub async fn changed(&mut self) -> Result<Vec<Note>> {
        self.rx
            .changed()
            .await
            .map_err(|_| Error::Database("query feed closed".to_string()))?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

impl Clone for FeedObserver {
    fn clone(&self) -> Self {
        Self::attach(Arc::clone(&self.shared))
    }
}

impl Drop for FeedObserver {
    fn drop(&mut self) {
        self.shared
            .observers
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

struct Driver {
    store: LocalStore,
    auth: Arc<dyn AuthProvider>,
    options: QueryOptions,
    shared: Arc<Shared>,
    /// Last search text that survived the debounce
    settled: String,
    /// Latest unsettled edit and when it takes effect
    pending: Option<(String, Instant)>,
    upstream: Option<LiveQuery>,
    idle_at: Option<Instant>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut observers: watch::Receiver<usize>,
    ) {
        loop {
            let debounce_at = self.pending.as_ref().map(|(_, at)| *at);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Search(text)) => {
                        self.pending = Some((text, Instant::now() + self.options.debounce));
                    }
                    Some(Command::RefreshIdentity) => {
                        if self.upstream.is_some() || self.observer_count() > 0 {
                            self.apply_settled().await;
                        }
                    }
                    None => break,
                },
                () = sleep_until_opt(debounce_at) => {
                    if let Some((text, _)) = self.pending.take() {
                        self.settled = text;
                        self.apply_settled().await;
                    }
                }
                emission = next_emission(&mut self.upstream) => match emission {
                    Ok(notes) => {
                        self.shared.feed.send_replace(notes);
                    }
                    Err(error) => {
                        tracing::warn!("Live feed upstream closed: {error}");
                        self.release();
                    }
                },
                changed = observers.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let count = *observers.borrow_and_update();
                    self.on_observers(count).await;
                }
                () = sleep_until_opt(self.idle_at) => {
                    self.idle_at = None;
                    if self.observer_count() == 0 {
                        self.release();
                    }
                }
            }
        }
    }

    fn observer_count(&self) -> usize {
        *self.shared.observers.borrow()
    }

    async fn on_observers(&mut self, count: usize) {
        if count == 0 {
            if self.upstream.is_some() && self.idle_at.is_none() {
                self.idle_at = Some(Instant::now() + self.options.idle_grace);
            }
            return;
        }

        self.idle_at = None;
        if self.upstream.is_none() {
            self.apply_settled().await;
        }
    }

    /// Switch to the query for the settled search if it changed.
    async fn apply_settled(&mut self) {
        let user_id = self.auth.current_user_id();
        let query = resolve_query(&self.settled, user_id.as_deref());
        let unchanged = self.upstream.as_ref().map(LiveQuery::query) == Some(&query);
        if unchanged {
            return;
        }

        let next = match self.store.subscribe(query.clone()).await {
            Ok(next) => next,
            Err(error) => {
                tracing::warn!("Failed to open live query {query}: {error}");
                return;
            }
        };
        self.shared.feed.send_replace(next.current());
        // Old upstream is dropped only after the new result set is visible
        self.upstream = Some(next);
        self.shared.switches.fetch_add(1, Ordering::SeqCst);
        self.shared.active.send_replace(Some(query.clone()));
        tracing::debug!("Query feed switched to {query}");

        if self.observer_count() == 0 && self.idle_at.is_none() {
            self.idle_at = Some(Instant::now() + self.options.idle_grace);
        }
    }

    fn release(&mut self) {
        if self.upstream.take().is_some() {
            self.shared.active.send_replace(None);
            tracing::debug!("Query feed upstream released");
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn next_emission(upstream: &mut Option<LiveQuery>) -> Result<Vec<Note>> {
    match upstream {
        Some(live) => live.changed().await,
        None => pending().await,
    }
}
