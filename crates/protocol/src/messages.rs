use serde::{Deserialize, Serialize};

use crate::types::Deployment;

// ---------------------------------------------------------------------------
// Session establishment
// ---------------------------------------------------------------------------

/// First message on a new session connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub token: String,
    pub client_name: String,
    pub version: String,
}

/// Server acknowledgement of a valid token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOkResponse {
    pub session_id: String,
}

// ---------------------------------------------------------------------------
// Manifest negotiation
// ---------------------------------------------------------------------------

/// One local file proposed for deployment.
///
/// `checksum` is the hex SHA-256 digest of the file contents; two files
/// with identical contents carry the same checksum and collapse to a
/// single upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub relative_path: String,
    pub size: i64,
    pub checksum: String,
}

/// Sends the full manifest (paths + sizes + fingerprints, no contents).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSyncRequest {
    pub files: Vec<FileEntry>,
    pub total_size: i64,
}

/// The subset of fingerprints the server does not already hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSyncResponse {
    pub missing: Vec<String>,
}

// ---------------------------------------------------------------------------
// Chunk upload
// ---------------------------------------------------------------------------

/// JSON header preceding the data in a binary chunk frame.
///
/// The connection layer injects the correlation `id` when framing, so it
/// is absent here. `checksum` names the whole-file fingerprint the chunk
/// belongs to; `chunk_checksum` covers just this chunk's bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadHeader {
    pub checksum: String,
    pub path: String,
    pub offset: i64,
    pub chunk_checksum: String,
}

/// Server acknowledgement of one binary chunk frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAckResponse {
    pub checksum: String,
    pub offset: i64,
    pub received: i64,
}

// ---------------------------------------------------------------------------
// Deployment finalization
// ---------------------------------------------------------------------------

/// Requests deployment creation once all content is on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployCreateRequest {
    pub files: Vec<FileEntry>,
    pub total_size: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_new: bool,
}

/// The created deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployCreateResponse {
    pub deployment: Deployment,
}

// ---------------------------------------------------------------------------
// Log streaming
// ---------------------------------------------------------------------------

/// One build/runtime log line, pushed by the server in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLinePayload {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub text: String,
}

/// Sent by the server when the build finished and the stream is over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEndPayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}
