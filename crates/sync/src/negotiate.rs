//! Diff negotiation: asks the remote which fingerprints it lacks.

use std::collections::HashSet;

use tracing::debug;

use stratus_indexer::Manifest;
use stratus_protocol::constants::MessageType;
use stratus_protocol::messages::{ManifestSyncRequest, ManifestSyncResponse};

use crate::error::SyncError;
use crate::remote::RemoteConnection;
use crate::types::PendingSet;

/// Sends the full manifest (paths, sizes, fingerprints — no contents) and
/// returns the [`PendingSet`] of fingerprints the remote does not hold.
///
/// Any failure here is fatal to the session; there is no fallback to
/// uploading everything.
pub(crate) async fn negotiate(
    conn: &dyn RemoteConnection,
    manifest: &Manifest,
) -> Result<PendingSet, SyncError> {
    let request = ManifestSyncRequest {
        files: manifest.entries().to_vec(),
        total_size: manifest.total_size(),
    };
    let payload = serde_json::to_value(&request)?;

    let resp = conn
        .send_request(MessageType::ManifestSync, Some(payload))
        .await
        .map_err(contextualize)?;

    if resp.msg_type != MessageType::ManifestSyncResponse {
        return Err(SyncError::Negotiation(format!(
            "unexpected response type {:?}",
            resp.msg_type
        )));
    }

    let parsed: ManifestSyncResponse = resp
        .parse_payload()
        .map_err(|e| SyncError::Negotiation(format!("malformed response: {e}")))?
        .ok_or_else(|| SyncError::Negotiation("empty response payload".into()))?;

    // The pending set must be a subset of what we proposed.
    let known: HashSet<&str> = manifest
        .entries()
        .iter()
        .map(|e| e.checksum.as_str())
        .collect();
    for checksum in &parsed.missing {
        if !known.contains(checksum.as_str()) {
            return Err(SyncError::Negotiation(format!(
                "remote requested unknown fingerprint {checksum}"
            )));
        }
    }

    let missing: HashSet<&str> = parsed.missing.iter().map(String::as_str).collect();
    let pending = PendingSet::from_missing(manifest, &missing);

    debug!(
        missing = pending.len(),
        pending_bytes = pending.total_bytes(),
        manifest_files = manifest.len(),
        "negotiated pending set"
    );

    Ok(pending)
}

fn contextualize(e: SyncError) -> SyncError {
    if e.is_contextual() {
        e
    } else {
        SyncError::Negotiation(e.to_string())
    }
}
