//! Best-effort remote mirroring.
//!
//! Each note id gets its own FIFO lane, drained by a worker task that exists
//! only while the lane has work. Operations on one id therefore reach the
//! remote in request order, while different ids mirror concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};

use super::options::SyncOptions;
use crate::error::RemoteResult;
use crate::models::{Note, NoteId};
use crate::remote::RemoteStore;
use crate::state::SyncState;
use crate::util::now_millis;

/// Snapshot of mirroring progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Queued or in-flight mirror operations
    pub pending: usize,
    pub completed: u64,
    pub failed: u64,
    pub last_error: Option<String>,
    /// Completion time of the last successful mirror operation (Unix ms)
    pub last_synced_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub(crate) enum MirrorOp {
    Upsert(Note),
    Delete(NoteId),
}

impl MirrorOp {
    const fn label(&self) -> &'static str {
        match self {
            Self::Upsert(_) => "upsert",
            Self::Delete(_) => "delete",
        }
    }
}

pub(crate) struct Mirror {
    remote: Option<Arc<dyn RemoteStore>>,
    options: SyncOptions,
    lanes: Mutex<HashMap<NoteId, mpsc::UnboundedSender<MirrorOp>>>,
    status: watch::Sender<SyncStatus>,
}

impl Mirror {
    pub(crate) fn new(remote: Option<Arc<dyn RemoteStore>>, options: SyncOptions) -> Self {
        let state = if remote.is_some() {
            SyncState::Synced
        } else {
            SyncState::Offline
        };
        let (status, _) = watch::channel(SyncStatus {
            state,
            ..SyncStatus::default()
        });
        Self {
            remote,
            options,
            lanes: Mutex::new(HashMap::new()),
            status,
        }
    }

    pub(crate) fn remote(&self) -> Option<&Arc<dyn RemoteStore>> {
        self.remote.as_ref()
    }

    pub(crate) const fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub(crate) fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Note ids with queued or in-flight mirror operations
    pub(crate) fn pending_notes(&self) -> Vec<NoteId> {
        let lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<_> = lanes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Queue `op` behind earlier operations for the same note.
    ///
    /// Never blocks and never fails; without a remote this is a no-op.
    pub(crate) fn enqueue(self: &Arc<Self>, id: NoteId, op: MirrorOp) {
        if self.remote.is_none() {
            return;
        }

        self.status.send_modify(|status| {
            status.pending += 1;
            status.state = SyncState::Syncing;
        });

        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let op = match lanes.get(&id) {
            Some(lane) => match lane.send(op) {
                Ok(()) => return,
                // Worker is gone; open a fresh lane
                Err(mpsc::error::SendError(op)) => op,
            },
            None => op,
        };

        let (lane, queue) = mpsc::unbounded_channel();
        // `queue` is alive, so the send cannot fail
        let _ = lane.send(op);
        lanes.insert(id, lane);
        drop(lanes);

        tokio::spawn(Arc::clone(self).drain(id, queue));
    }

    async fn drain(self: Arc<Self>, id: NoteId, mut queue: mpsc::UnboundedReceiver<MirrorOp>) {
        let mut next = queue.try_recv().ok();
        while let Some(op) = next.take() {
            let label = op.label();
            let result = self.apply(id, op).await;

            // Retiring the lane and settling the count share one critical
            // section, so `flush` never returns while the lane is listed.
            let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
            next = queue.try_recv().ok();
            if next.is_none() {
                lanes.remove(&id);
            }
            self.record(id, label, result);
        }
    }

    async fn apply(&self, id: NoteId, op: MirrorOp) -> RemoteResult<()> {
        let Some(remote) = &self.remote else {
            return Ok(());
        };

        let op = &op;
        self.options
            .run(op.label(), || async move {
                match op {
                    MirrorOp::Upsert(note) => remote.upsert(note).await,
                    MirrorOp::Delete(id) => remote.delete(*id).await,
                }
            })
            .await
            .inspect_err(|error| tracing::warn!("Remote {} for note {id} failed: {error}", op.label()))
    }

    fn record(&self, id: NoteId, label: &str, result: RemoteResult<()>) {
        self.status.send_modify(|status| {
            status.pending = status.pending.saturating_sub(1);
            let failed = match result {
                Ok(()) => {
                    tracing::debug!("Mirrored {label} for note {id}");
                    status.completed += 1;
                    status.last_synced_at = Some(now_millis());
                    false
                }
                Err(error) => {
                    status.failed += 1;
                    status.last_error = Some(error.to_string());
                    true
                }
            };
            status.state = if status.pending > 0 {
                SyncState::Syncing
            } else if failed {
                SyncState::Error
            } else {
                SyncState::Synced
            };
        });
    }

    /// Wait until nothing is queued or in flight.
    pub(crate) async fn flush(&self) {
        let mut status = self.status.subscribe();
        // The sender lives as long as `self`, so this only ends on success
        let _ = status.wait_for(|status| status.pending == 0).await;
    }
}
