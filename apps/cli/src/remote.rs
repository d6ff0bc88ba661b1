use stratus_connection::{Connection, ConnectionError};
use stratus_protocol::constants::MessageType;
use stratus_protocol::envelope::Message;
use stratus_sync::{RemoteConnection, RemoteFuture, SyncError};

/// Adapts the live WebSocket connection to the sync engine's transport
/// seam.
pub struct SessionRemote {
    conn: Connection,
}

impl SessionRemote {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// The underlying connection, for lifecycle hooks.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RemoteConnection for SessionRemote {
    fn send_request(
        &self,
        msg_type: MessageType,
        payload: Option<serde_json::Value>,
    ) -> RemoteFuture<'_, Result<Message, SyncError>> {
        Box::pin(async move {
            self.conn
                .send_request(msg_type, payload.as_ref())
                .await
                .map_err(map_err)
        })
    }

    fn send_binary(
        &self,
        header: serde_json::Value,
        data: Vec<u8>,
    ) -> RemoteFuture<'_, Result<Message, SyncError>> {
        Box::pin(async move {
            self.conn
                .send_binary(&header, &data)
                .await
                .map_err(map_err)
        })
    }

    fn close(&self) -> RemoteFuture<'_, ()> {
        Box::pin(async move { self.conn.close().await })
    }
}

fn map_err(e: ConnectionError) -> SyncError {
    match e {
        ConnectionError::Timeout => SyncError::Timeout {
            operation: "request".into(),
        },
        other => SyncError::Connection(other.to_string()),
    }
}
