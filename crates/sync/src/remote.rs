use std::future::Future;
use std::pin::Pin;

use stratus_protocol::constants::MessageType;
use stratus_protocol::envelope::Message;

use crate::error::SyncError;

/// Boxed future returned by [`RemoteConnection`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transport seam for the synchronization engine.
///
/// The sync crate never opens sockets itself; the caller supplies an
/// implementation backed by a real connection (or a mock in tests). All
/// requests share one multiplexed connection, so implementations must
/// support concurrent in-flight calls.
pub trait RemoteConnection: Send + Sync {
    /// Sends a text request and waits for the correlated response.
    fn send_request(
        &self,
        msg_type: MessageType,
        payload: Option<serde_json::Value>,
    ) -> RemoteFuture<'_, Result<Message, SyncError>>;

    /// Sends a binary frame (JSON header + data) and waits for the
    /// correlated acknowledgement.
    fn send_binary(
        &self,
        header: serde_json::Value,
        data: Vec<u8>,
    ) -> RemoteFuture<'_, Result<Message, SyncError>>;

    /// Releases the underlying connection.
    fn close(&self) -> RemoteFuture<'_, ()>;
}
