use std::collections::HashSet;
use std::time::Duration;

use stratus_indexer::{IndexOptions, Manifest};
use stratus_protocol::types::Deployment;

/// Options controlling one synchronization session.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Always create a new deployment even if an identical one exists.
    pub force_new: bool,
    /// Skip negotiation and upload every file regardless of remote state.
    pub force_sync: bool,
    /// Chunk size for file uploads; 0 selects the transfer default.
    pub chunk_size: usize,
    /// Upper bound on the whole upload phase.
    pub sync_timeout: Duration,
    /// Upper bound on each negotiation/finalization round-trip.
    pub request_timeout: Duration,
    /// Tree walk options for the indexer.
    pub index: IndexOptions,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            force_new: false,
            force_sync: false,
            chunk_size: 0,
            sync_timeout: Duration::from_secs(600),
            request_timeout: Duration::from_secs(30),
            index: IndexOptions::default(),
        }
    }
}

/// Lifecycle of one pending-content upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    InFlight,
    Acked,
    Failed,
}

/// One unit of upload work: a single distinct fingerprint.
#[derive(Debug, Clone)]
pub struct TransferTask {
    /// Whole-file content fingerprint.
    pub checksum: String,
    /// Path of the first manifest entry carrying this fingerprint.
    pub relative_path: String,
    pub total_bytes: i64,
    pub bytes_sent: i64,
    pub state: TaskState,
}

/// The fingerprints the remote does not hold, in manifest path order.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    checksums: Vec<String>,
    total_bytes: i64,
}

impl PendingSet {
    /// Builds the pending set from the fingerprints in `missing`,
    /// deduplicated and ordered by first manifest occurrence.
    pub fn from_missing(manifest: &Manifest, missing: &HashSet<&str>) -> Self {
        let mut checksums = Vec::new();
        let mut total_bytes = 0;
        for entry in manifest.unique_entries() {
            if missing.contains(entry.checksum.as_str()) {
                checksums.push(entry.checksum.clone());
                total_bytes += entry.size;
            }
        }
        Self {
            checksums,
            total_bytes,
        }
    }

    /// Every distinct fingerprint in the manifest.
    pub fn full(manifest: &Manifest) -> Self {
        let mut checksums = Vec::new();
        let mut total_bytes = 0;
        for entry in manifest.unique_entries() {
            checksums.push(entry.checksum.clone());
            total_bytes += entry.size;
        }
        Self {
            checksums,
            total_bytes,
        }
    }

    pub fn checksums(&self) -> &[String] {
        &self.checksums
    }

    /// Bytes that will actually cross the wire.
    pub fn total_bytes(&self) -> i64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.checksums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }
}

/// Observable progress of a synchronization session.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Indexing finished.
    Indexed { files: usize, total_bytes: i64 },
    /// Negotiation finished; `pending_bytes` will cross the wire.
    Negotiated {
        missing: usize,
        reused: usize,
        pending_bytes: i64,
    },
    /// The remote already holds every fingerprint; nothing to upload.
    Cached,
    /// One upload task moved to `InFlight`.
    TaskStarted { path: String, total_bytes: i64 },
    /// Aggregate progress after one acked chunk. Monotonically
    /// non-decreasing; `total_bytes` is known up front.
    Progress {
        transferred_bytes: i64,
        total_bytes: i64,
    },
    /// One upload task fully acknowledged.
    TaskAcked { path: String },
    /// The deployment exists.
    Finalized { deployment: Deployment },
}

/// Result of a completed session.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub deployment: Deployment,
    /// Bytes uploaded this session (0 on the cached path).
    pub synced_bytes: i64,
    /// True when the remote held all content and no upload ran.
    pub cached: bool,
}
