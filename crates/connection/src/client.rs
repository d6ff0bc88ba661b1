//! WebSocket client for the deployment session.
//!
//! Implements request-response with UUID correlation, ping/pong
//! keepalive, and a token auth handshake at connect time.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;

use stratus_protocol::constants::{
    MessageType, WS_BINARY_REQUEST_TIMEOUT, WS_MAX_MESSAGE_SIZE, WS_REQUEST_TIMEOUT,
};
use stratus_protocol::envelope::Message;
use stratus_protocol::messages::{AuthOkResponse, AuthRequest};

/// Errors from the session connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("server error {code}: {message}")]
    Remote { code: i32, message: String },
}

/// Callback type for disconnect notification.
pub(crate) type DisconnectCallback = Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>;

/// A session connection to the deployment platform.
///
/// Opened by [`Connection::connect`], which performs the auth handshake
/// before returning; an unauthenticated connection is never handed out.
pub struct Connection {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>,
    on_disconnect: DisconnectCallback,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: tokio_util::sync::CancellationToken,
}

impl Connection {
    /// Connects to the platform and authenticates with the bearer token.
    ///
    /// Fails with [`ConnectionError::AuthRejected`] (or `Remote`) if the
    /// server refuses the token; the socket is torn down on every failure
    /// path via the cancellation token.
    pub async fn connect(
        url: &str,
        auth: &AuthRequest,
    ) -> Result<(Self, AuthOkResponse), ConnectionError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let pending: Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let on_disconnect: DisconnectCallback = Arc::new(Mutex::new(None));
        let cancel = tokio_util::sync::CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let pending = pending.clone();
            let on_disconnect = on_disconnect.clone();
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read,
                pending,
                on_disconnect,
                write_tx,
                cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(write_tx, cancel))
        };

        let conn = Self {
            write_tx,
            pending,
            on_disconnect,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        };

        let ok = conn.authenticate(auth).await?;
        Ok((conn, ok))
    }

    async fn authenticate(&self, auth: &AuthRequest) -> Result<AuthOkResponse, ConnectionError> {
        let resp = self.send_request(MessageType::Auth, Some(auth)).await?;

        if resp.msg_type != MessageType::AuthOk {
            return Err(ConnectionError::AuthRejected(format!(
                "unexpected response type {:?}",
                resp.msg_type
            )));
        }

        resp.parse_payload::<AuthOkResponse>()?
            .ok_or_else(|| ConnectionError::AuthRejected("empty auth response".into()))
    }

    /// Sends a request and waits for the correlated response.
    pub async fn send_request<T: serde::Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Message, ConnectionError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, msg_type, payload)?;
        let json = serde_json::to_string(&msg)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| ConnectionError::Closed)?;

        let result = tokio::time::timeout(WS_REQUEST_TIMEOUT, rx).await;

        // Clean up pending entry on any exit path.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(resp)) => {
                if let Some(err) = &resp.error {
                    return Err(ConnectionError::Remote {
                        code: err.code,
                        message: err.message.clone(),
                    });
                }
                Ok(resp)
            }
            Ok(Err(_)) => Err(ConnectionError::Closed),
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    /// Sends binary data with a JSON header and waits for the text response.
    ///
    /// Wire format: `[4 bytes big-endian header length][JSON header][data]`.
    /// A UUID is injected into the header for request-response correlation,
    /// which is what lets many chunk uploads share the socket at once.
    pub async fn send_binary(
        &self,
        header: &serde_json::Value,
        data: &[u8],
    ) -> Result<Message, ConnectionError> {
        let id = uuid::Uuid::new_v4().to_string();

        // Inject the request ID into the header.
        let mut header = header.clone();
        if let Some(obj) = header.as_object_mut() {
            obj.insert("id".into(), serde_json::Value::String(id.clone()));
        }

        let header_bytes = serde_json::to_vec(&header)?;
        let header_len = header_bytes.len();

        let mut frame = Vec::with_capacity(4 + header_len + data.len());
        frame.extend_from_slice(&(header_len as u32).to_be_bytes());
        frame.extend_from_slice(&header_bytes);
        frame.extend_from_slice(data);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        self.write_tx
            .send(tungstenite::Message::Binary(frame.into()))
            .await
            .map_err(|_| ConnectionError::Closed)?;

        // Binary transfers use a longer timeout to handle slow disk I/O
        // and network conditions during large chunk uploads.
        let result = tokio::time::timeout(WS_BINARY_REQUEST_TIMEOUT, rx).await;
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(resp)) => {
                if let Some(err) = &resp.error {
                    return Err(ConnectionError::Remote {
                        code: err.code,
                        message: err.message.clone(),
                    });
                }
                Ok(resp)
            }
            Ok(Err(_)) => Err(ConnectionError::Closed),
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    /// Sets the callback for disconnection.
    pub async fn set_disconnect_callback(&self, cb: Box<dyn Fn() + Send + Sync>) {
        *self.on_disconnect.lock().await = Some(cb);
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        self.cancel.cancel();
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}
