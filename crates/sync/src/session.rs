//! One deployment synchronization session, start to finish.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::remote::RemoteConnection;
use crate::types::{PendingSet, SyncEvent, SyncOptions, SyncOutcome};
use crate::{finalize, negotiate, scheduler};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Drives index → negotiate → upload → finalize over one connection.
///
/// A session is single-use: [`run`](Self::run) executes the pipeline once
/// and every error is fatal to it. Progress is observable through the
/// event channel returned by [`take_events`](Self::take_events).
pub struct SyncSession {
    conn: Arc<dyn RemoteConnection>,
    options: SyncOptions,
    events_tx: mpsc::Sender<SyncEvent>,
    events_rx: Option<mpsc::Receiver<SyncEvent>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl SyncSession {
    pub fn new(conn: Arc<dyn RemoteConnection>, options: SyncOptions) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            conn,
            options,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Takes the event stream. Call before [`run`](Self::run); once taken
    /// it cannot be taken again.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.events_rx.take()
    }

    /// Token that cancels the session from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the full pipeline against the tree rooted at `root`.
    pub async fn run(&mut self, root: &Path) -> Result<SyncOutcome, SyncError> {
        // Nobody will ever read an untaken receiver; drop it so event
        // sends fail fast instead of filling the channel.
        drop(self.events_rx.take());

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // Index on the blocking pool; hashing a large tree is disk-bound.
        let index_root = root.to_path_buf();
        let index_options = self.options.index.clone();
        let manifest = tokio::task::spawn_blocking(move || {
            stratus_indexer::index_tree(&index_root, &index_options)
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e)))??;

        let _ = self
            .events_tx
            .send(SyncEvent::Indexed {
                files: manifest.len(),
                total_bytes: manifest.total_size(),
            })
            .await;
        debug!(files = manifest.len(), bytes = manifest.total_size(), "indexed");

        let pending = if manifest.is_empty() {
            // Nothing to propose; negotiation is skipped entirely.
            PendingSet::default()
        } else if self.options.force_sync {
            // Upload everything without asking what the remote holds.
            PendingSet::full(&manifest)
        } else {
            let pending = self
                .bounded("negotiation", negotiate::negotiate(self.conn.as_ref(), &manifest))
                .await?;
            let unique = manifest.unique_entries().len();
            let _ = self
                .events_tx
                .send(SyncEvent::Negotiated {
                    missing: pending.len(),
                    reused: unique - pending.len(),
                    pending_bytes: pending.total_bytes(),
                })
                .await;
            pending
        };

        let cached = pending.is_empty() && !manifest.is_empty();
        let synced_bytes = if pending.is_empty() {
            if cached {
                info!("remote already holds all content");
                let _ = self.events_tx.send(SyncEvent::Cached).await;
            }
            0
        } else {
            let tasks = scheduler::build_tasks(&manifest, &pending);
            scheduler::upload_pending(
                self.conn.clone(),
                root,
                tasks,
                &self.options,
                self.events_tx.clone(),
                &self.cancel,
            )
            .await?
        };

        let deployment = self
            .bounded(
                "finalization",
                finalize::finalize(self.conn.as_ref(), &manifest, self.options.force_new),
            )
            .await?;
        let _ = self
            .events_tx
            .send(SyncEvent::Finalized {
                deployment: deployment.clone(),
            })
            .await;

        Ok(SyncOutcome {
            deployment,
            synced_bytes,
            cached,
        })
    }

    /// Releases the connection. Safe to call from any exit path; only the
    /// first call closes.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cancel.cancel();
            self.conn.close().await;
        }
    }

    /// Runs one request/response exchange, bounded by cancellation and
    /// [`SyncOptions::request_timeout`].
    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(self.options.request_timeout, fut) => {
                result.unwrap_or_else(|_| {
                    Err(SyncError::Timeout {
                        operation: operation.into(),
                    })
                })
            }
        }
    }
}
