//! Deployment finalization: turns synced content into a live deployment.

use tracing::info;

use stratus_indexer::Manifest;
use stratus_protocol::constants::MessageType;
use stratus_protocol::messages::{DeployCreateRequest, DeployCreateResponse};
use stratus_protocol::types::Deployment;

use crate::error::SyncError;
use crate::remote::RemoteConnection;

/// Requests deployment creation referencing the manifest.
///
/// Must only be called once every pending upload is acknowledged (or on
/// the cached/empty paths, immediately). Rejection is fatal; the session
/// never retries.
pub(crate) async fn finalize(
    conn: &dyn RemoteConnection,
    manifest: &Manifest,
    force_new: bool,
) -> Result<Deployment, SyncError> {
    let request = DeployCreateRequest {
        files: manifest.entries().to_vec(),
        total_size: manifest.total_size(),
        force_new,
    };
    let payload = serde_json::to_value(&request)?;

    let resp = conn
        .send_request(MessageType::DeployCreate, Some(payload))
        .await
        .map_err(contextualize)?;

    if resp.msg_type != MessageType::DeployCreateResponse {
        return Err(SyncError::Finalization(format!(
            "unexpected response type {:?}",
            resp.msg_type
        )));
    }

    let parsed: DeployCreateResponse = resp
        .parse_payload()
        .map_err(|e| SyncError::Finalization(format!("malformed response: {e}")))?
        .ok_or_else(|| SyncError::Finalization("empty response payload".into()))?;

    info!(
        uid = %parsed.deployment.uid,
        host = %parsed.deployment.host,
        "deployment created"
    );

    Ok(parsed.deployment)
}

fn contextualize(e: SyncError) -> SyncError {
    if e.is_contextual() {
        e
    } else {
        SyncError::Finalization(e.to_string())
    }
}
