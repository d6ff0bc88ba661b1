//! Upload scheduling: drives every pending fingerprint to `Acked`.
//!
//! Tasks run concurrently over the single multiplexed connection;
//! per-chunk acknowledgements are correlated by the connection layer, so
//! chunk frames from different files interleave freely on the wire.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use stratus_indexer::Manifest;
use stratus_protocol::messages::{ChunkAckResponse, ChunkUploadHeader};
use stratus_transfer::ChunkReader;

use crate::error::SyncError;
use crate::remote::RemoteConnection;
use crate::types::{PendingSet, SyncEvent, SyncOptions, TaskState, TransferTask};

/// Shared task registry; the scheduler is the only writer.
pub(crate) type TaskRegistry = Arc<Mutex<Vec<TransferTask>>>;

/// One task per pending fingerprint, in pending-set order.
pub(crate) fn build_tasks(manifest: &Manifest, pending: &PendingSet) -> TaskRegistry {
    let tasks = pending
        .checksums()
        .iter()
        .filter_map(|checksum| manifest.entry_for_checksum(checksum))
        .map(|entry| TransferTask {
            checksum: entry.checksum.clone(),
            relative_path: entry.relative_path.clone(),
            total_bytes: entry.size,
            bytes_sent: 0,
            state: TaskState::Queued,
        })
        .collect();
    Arc::new(Mutex::new(tasks))
}

/// Uploads every task in the registry and blocks until all are `Acked`.
///
/// All-or-nothing: the first failure cancels every outstanding task and
/// the error propagates before finalization can run. The whole phase is
/// bounded by `options.sync_timeout`.
pub(crate) async fn upload_pending(
    conn: Arc<dyn RemoteConnection>,
    root: &std::path::Path,
    tasks: TaskRegistry,
    options: &SyncOptions,
    events: mpsc::Sender<SyncEvent>,
    cancel: &CancellationToken,
) -> Result<i64, SyncError> {
    let total_bytes: i64 = {
        let tasks = tasks.lock().map_err(poisoned)?;
        tasks.iter().map(|t| t.total_bytes).sum()
    };

    // Single aggregate guarded by one lock: holding it across the event
    // send keeps observed progress values non-decreasing.
    let transferred = Arc::new(tokio::sync::Mutex::new(0i64));
    let child = cancel.child_token();
    let mut set: JoinSet<Result<(), SyncError>> = JoinSet::new();

    let count = tasks.lock().map_err(poisoned)?.len();
    for idx in 0..count {
        let (checksum, relative_path) = {
            let tasks = tasks.lock().map_err(poisoned)?;
            (tasks[idx].checksum.clone(), tasks[idx].relative_path.clone())
        };
        set.spawn(upload_task(UploadTaskCtx {
            conn: conn.clone(),
            file_path: root.join(&relative_path),
            checksum,
            relative_path,
            idx,
            chunk_size: options.chunk_size,
            tasks: tasks.clone(),
            transferred: transferred.clone(),
            total_bytes,
            events: events.clone(),
            cancel: child.clone(),
        }));
    }

    let drain = async {
        let mut first_err: Option<SyncError> = None;
        while let Some(joined) = set.join_next().await {
            let result = match joined {
                Ok(r) => r,
                Err(e) => Err(SyncError::Transfer {
                    path: "<task>".into(),
                    reason: e.to_string(),
                }),
            };
            if let Err(e) = result {
                child.cancel();
                // Keep the root cause, not the cancellations it triggered.
                let replace = match (&first_err, &e) {
                    (None, _) => true,
                    (Some(SyncError::Cancelled), e) if !matches!(e, SyncError::Cancelled) => true,
                    _ => false,
                };
                if replace {
                    first_err = Some(e);
                }
            }
        }
        first_err
    };

    match tokio::time::timeout(options.sync_timeout, drain).await {
        Ok(None) => {
            let synced = *transferred.lock().await;
            debug!(synced_bytes = synced, tasks = count, "upload phase quiescent");
            Ok(synced)
        }
        Ok(Some(e)) => {
            fail_unacked(&tasks);
            Err(e)
        }
        Err(_) => {
            warn!(timeout = ?options.sync_timeout, "upload phase timed out");
            child.cancel();
            fail_unacked(&tasks);
            Err(SyncError::Timeout {
                operation: "upload".into(),
            })
        }
    }
}

struct UploadTaskCtx {
    conn: Arc<dyn RemoteConnection>,
    file_path: PathBuf,
    checksum: String,
    relative_path: String,
    idx: usize,
    chunk_size: usize,
    tasks: TaskRegistry,
    transferred: Arc<tokio::sync::Mutex<i64>>,
    total_bytes: i64,
    events: mpsc::Sender<SyncEvent>,
    cancel: CancellationToken,
}

/// Streams one file's chunks and waits for each acknowledgement.
async fn upload_task(ctx: UploadTaskCtx) -> Result<(), SyncError> {
    let result = run_upload_task(&ctx).await;
    match &result {
        Ok(()) => set_state(&ctx.tasks, ctx.idx, TaskState::Acked),
        Err(_) => set_state(&ctx.tasks, ctx.idx, TaskState::Failed),
    }
    result
}

async fn run_upload_task(ctx: &UploadTaskCtx) -> Result<(), SyncError> {
    set_state(&ctx.tasks, ctx.idx, TaskState::InFlight);
    let _ = ctx
        .events
        .send(SyncEvent::TaskStarted {
            path: ctx.relative_path.clone(),
            total_bytes: task_size(&ctx.tasks, ctx.idx),
        })
        .await;

    let path = ctx.file_path.clone();
    let chunk_size = ctx.chunk_size;
    let mut reader = tokio::task::spawn_blocking(move || ChunkReader::new(&path, chunk_size))
        .await
        .map_err(|e| transfer_err(&ctx.relative_path, e))??;

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let (r, chunk) = tokio::task::spawn_blocking(move || {
            let chunk = reader.next_chunk()?;
            Ok::<_, stratus_transfer::TransferError>((reader, chunk))
        })
        .await
        .map_err(|e| transfer_err(&ctx.relative_path, e))??;
        reader = r;

        let Some(chunk) = chunk else {
            break;
        };

        let header = ChunkUploadHeader {
            checksum: ctx.checksum.clone(),
            path: ctx.relative_path.clone(),
            offset: chunk.offset,
            chunk_checksum: chunk.checksum.clone(),
        };
        let header = serde_json::to_value(&header)?;

        let resp = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SyncError::Cancelled),
            resp = ctx.conn.send_binary(header, chunk.data) => resp,
        };
        let resp = resp.map_err(|e| {
            if e.is_contextual() {
                e
            } else {
                transfer_err(&ctx.relative_path, e)
            }
        })?;

        let ack: ChunkAckResponse = resp
            .parse_payload()
            .map_err(|e| transfer_err(&ctx.relative_path, e))?
            .ok_or_else(|| transfer_err(&ctx.relative_path, "empty chunk ack"))?;
        if ack.checksum != ctx.checksum || ack.received < chunk.offset + chunk.size as i64 {
            return Err(transfer_err(&ctx.relative_path, "acknowledgement mismatch"));
        }

        let sent = chunk.size as i64;
        {
            let mut tasks = ctx.tasks.lock().map_err(poisoned)?;
            tasks[ctx.idx].bytes_sent += sent;
        }
        {
            let mut done = ctx.transferred.lock().await;
            *done += sent;
            let _ = ctx
                .events
                .send(SyncEvent::Progress {
                    transferred_bytes: *done,
                    total_bytes: ctx.total_bytes,
                })
                .await;
        }
    }

    let _ = ctx
        .events
        .send(SyncEvent::TaskAcked {
            path: ctx.relative_path.clone(),
        })
        .await;
    Ok(())
}

fn transfer_err(path: &str, reason: impl ToString) -> SyncError {
    SyncError::Transfer {
        path: path.into(),
        reason: reason.to_string(),
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> SyncError {
    SyncError::Connection("task registry poisoned".into())
}

fn task_size(tasks: &TaskRegistry, idx: usize) -> i64 {
    tasks.lock().map(|t| t[idx].total_bytes).unwrap_or(0)
}

fn set_state(tasks: &TaskRegistry, idx: usize, state: TaskState) {
    if let Ok(mut tasks) = tasks.lock() {
        tasks[idx].state = state;
    }
}

fn fail_unacked(tasks: &TaskRegistry) {
    if let Ok(mut tasks) = tasks.lock() {
        for task in tasks.iter_mut() {
            if task.state != TaskState::Acked {
                task.state = TaskState::Failed;
            }
        }
    }
}
