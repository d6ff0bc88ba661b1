use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often the client sends WebSocket pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Time to wait for any incoming traffic before declaring the connection dead.
///
/// Acts as a read deadline: if *nothing* arrives within this window (no
/// pong, no response, no push event), the connection is considered dead.
/// Set high enough to tolerate slow server-side chunk processing during
/// large uploads.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Maximum message size in bytes (50 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 50 * 1024 * 1024;

/// Timeout for text request/response exchanges.
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for binary request/response exchanges (chunk uploads).
///
/// Chunk uploads may take significantly longer than text requests due to
/// disk I/O and network conditions on the server side.
pub const WS_BINARY_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// WebSocket message type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Session establishment
    #[serde(rename = "auth")]
    Auth,
    #[serde(rename = "auth_ok")]
    AuthOk,

    // Keepalive
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,

    // Deployment synchronization
    #[serde(rename = "manifest_sync")]
    ManifestSync,
    #[serde(rename = "manifest_sync_response")]
    ManifestSyncResponse,
    #[serde(rename = "chunk_ack")]
    ChunkAck,
    #[serde(rename = "deploy_create")]
    DeployCreate,
    #[serde(rename = "deploy_create_response")]
    DeployCreateResponse,

    // Log streaming
    #[serde(rename = "log_line")]
    LogLine,
    #[serde(rename = "log_end")]
    LogEnd,

    #[serde(rename = "error")]
    Error,
}
