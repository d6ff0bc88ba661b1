use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use stratus_protocol::constants::MessageType;
use stratus_protocol::envelope::Message;
use stratus_protocol::messages::{AuthRequest, LogEndPayload, LogLinePayload};

/// Errors opening or reading the log stream.
///
/// A failed or broken log stream never implies a failed deployment; the
/// deployment finalized before tailing began.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("stream closed")]
    Closed,
}

/// Lifecycle of one log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Dial and auth handshake, spanning [`LogStream::connect`].
    Connecting,
    Streaming,
    /// The server ended the stream (`log_end` or close frame), or
    /// [`LogStream::close`] was called. Terminal.
    Closed,
    /// The transport failed mid-stream. Terminal; no reconnect.
    Errored,
}

const LINE_CHANNEL_CAPACITY: usize = 1024;

/// A tail of one deployment's build log.
///
/// Lines arrive strictly in server order through [`next_line`]
/// (`None` once the stream reaches a terminal state and the buffer is
/// drained).
///
/// [`next_line`]: Self::next_line
#[derive(Debug)]
pub struct LogStream {
    lines_rx: mpsc::Receiver<LogLinePayload>,
    state: Arc<Mutex<StreamState>>,
    cancel: CancellationToken,
    read_handle: tokio::task::JoinHandle<()>,
}

impl LogStream {
    /// Opens the log socket for `host` and authenticates.
    ///
    /// The returned stream is already [`Streaming`](StreamState::Streaming);
    /// handshake failures surface here, before any line is delivered.
    pub async fn connect(base_url: &str, host: &str, token: &str) -> Result<Self, StreamError> {
        let state = Arc::new(Mutex::new(StreamState::Connecting));

        let url = format!("{}/logs/{}", base_url.trim_end_matches('/'), host);
        debug!(%url, "opening log stream");
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Same handshake as the session connection: auth before anything
        // else, one request/response pair on a quiet socket.
        let auth = AuthRequest {
            token: token.into(),
            client_name: String::new(),
            version: env!("CARGO_PKG_VERSION").into(),
        };
        let msg = Message::new(uuid::Uuid::new_v4().to_string(), MessageType::Auth, Some(&auth))?;
        write
            .send(tungstenite::Message::Text(serde_json::to_string(&msg)?.into()))
            .await?;

        loop {
            match read.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    let resp: Message = serde_json::from_str(&text)?;
                    if resp.msg_type == MessageType::AuthOk {
                        break;
                    }
                    let reason = resp
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| format!("unexpected response {:?}", resp.msg_type));
                    return Err(StreamError::AuthRejected(reason));
                }
                Some(Ok(_)) => continue, // control frames during handshake
                Some(Err(e)) => return Err(e.into()),
                None => return Err(StreamError::Closed),
            }
        }

        set_state_if_live(&state, StreamState::Streaming);
        let (lines_tx, lines_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let read_handle = {
            let state = state.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let exit = read_loop(&mut read, &mut write, &lines_tx, &cancel).await;
                set_state_if_live(&state, exit);
                let _ = write.send(tungstenite::Message::Close(None)).await;
            })
        };

        Ok(Self {
            lines_rx,
            state,
            cancel,
            read_handle,
        })
    }

    /// Next log line in arrival order; `None` once the stream is over and
    /// the buffer is drained.
    pub async fn next_line(&mut self) -> Option<LogLinePayload> {
        self.lines_rx.recv().await
    }

    pub fn state(&self) -> StreamState {
        match self.state.lock() {
            Ok(s) => *s,
            Err(_) => StreamState::Errored,
        }
    }

    /// Stops tailing. Idempotent; the state is `Closed` afterwards unless
    /// the stream had already errored.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        set_state_if_live(&self.state, StreamState::Closed);
        self.lines_rx.close();
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.read_handle.abort();
    }
}

/// Moves to a terminal state; terminal states never transition again.
fn set_state_if_live(state: &Arc<Mutex<StreamState>>, next: StreamState) {
    if let Ok(mut state) = state.lock() {
        if !matches!(*state, StreamState::Closed | StreamState::Errored) {
            *state = next;
        }
    }
}

/// Pumps frames until the stream ends; returns the terminal state.
async fn read_loop<R, W>(
    read: &mut R,
    write: &mut W,
    lines_tx: &mpsc::Sender<LogLinePayload>,
    cancel: &CancellationToken,
) -> StreamState
where
    R: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
    W: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return StreamState::Closed,

            msg = read.next() => match msg {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    let msg: Message = match serde_json::from_str(&text) {
                        Ok(m) => m,
                        Err(e) => {
                            warn!("malformed log frame: {e}");
                            continue;
                        }
                    };
                    match msg.msg_type {
                        MessageType::LogLine => {
                            let Ok(Some(line)) = msg.parse_payload::<LogLinePayload>() else {
                                warn!("log_line frame without payload");
                                continue;
                            };
                            // Preserves order: one channel, one producer.
                            if lines_tx.send(line).await.is_err() {
                                return StreamState::Closed;
                            }
                        }
                        MessageType::LogEnd => {
                            let reason = msg
                                .parse_payload::<LogEndPayload>()
                                .ok()
                                .flatten()
                                .map(|p| p.reason)
                                .unwrap_or_default();
                            debug!(%reason, "log stream ended by server");
                            return StreamState::Closed;
                        }
                        other => trace!(?other, "ignoring log frame"),
                    }
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    let _ = write.send(tungstenite::Message::Pong(data)).await;
                }
                Some(Ok(tungstenite::Message::Close(_))) => {
                    debug!("log stream closed by server");
                    return StreamState::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("log stream transport error: {e}");
                    return StreamState::Errored;
                }
                None => {
                    warn!("log stream ended without close frame");
                    return StreamState::Errored;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn send_msg<S>(ws: &mut S, msg: &Message)
    where
        S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
    {
        let json = serde_json::to_string(msg).unwrap();
        ws.send(tungstenite::Message::Text(json.into())).await.unwrap();
    }

    /// Accepts one connection and performs the server side of the auth
    /// handshake, then hands the socket to `script`.
    async fn serve_once<F, Fut>(script: F) -> String
    where
        F: FnOnce(
                tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
            ) -> Fut
            + Send
            + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // Auth handshake.
            let frame = ws.next().await.unwrap().unwrap();
            let auth: Message = match frame {
                tungstenite::Message::Text(t) => serde_json::from_str(&t).unwrap(),
                other => panic!("expected auth frame, got {other:?}"),
            };
            assert_eq!(auth.msg_type, MessageType::Auth);
            let ok = auth
                .reply(MessageType::AuthOk, Some(&serde_json::json!({"sessionId": "s1"})))
                .unwrap();
            send_msg(&mut ws, &ok).await;

            script(ws).await;
        });
        format!("ws://{addr}")
    }

    fn log_line(i: i64) -> Message {
        let payload = LogLinePayload {
            timestamp: 1_700_000_000_000 + i,
            text: format!("build step {i}"),
        };
        Message::new(format!("l{i}"), MessageType::LogLine, Some(&payload)).unwrap()
    }

    #[tokio::test]
    async fn lines_arrive_in_server_order() {
        let base = serve_once(|mut ws| async move {
            for i in 0..100 {
                send_msg(&mut ws, &log_line(i)).await;
            }
            let end = Message::new::<LogEndPayload>("end", MessageType::LogEnd, None).unwrap();
            send_msg(&mut ws, &end).await;
        })
        .await;

        let mut stream = LogStream::connect(&base, "quiet-meadow-4821", "tok").await.unwrap();
        assert_eq!(stream.state(), StreamState::Streaming);

        let mut seen = Vec::new();
        while let Some(line) = stream.next_line().await {
            seen.push(line.text);
        }

        assert_eq!(seen.len(), 100);
        for (i, text) in seen.iter().enumerate() {
            assert_eq!(text, &format!("build step {i}"));
        }

        // Server ended the stream; terminal, not errored.
        for _ in 0..50 {
            if stream.state() == StreamState::Closed {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[tokio::test]
    async fn abrupt_disconnect_is_errored_and_final() {
        let base = serve_once(|mut ws| async move {
            send_msg(&mut ws, &log_line(0)).await;
            // Drop the socket without a close frame.
            let inner = ws.get_mut();
            use tokio::io::AsyncWriteExt;
            let _ = inner.shutdown().await;
        })
        .await;

        let mut stream = LogStream::connect(&base, "h", "tok").await.unwrap();

        let first = stream.next_line().await.unwrap();
        assert_eq!(first.text, "build step 0");
        // Channel closes once the read task exits.
        assert!(stream.next_line().await.is_none());

        for _ in 0..50 {
            if stream.state() == StreamState::Errored {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(stream.state(), StreamState::Errored);

        // Errored is terminal: closing afterwards does not mask it.
        stream.close().await;
        assert_eq!(stream.state(), StreamState::Errored);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let base = serve_once(|mut ws| async move {
            // Keep the socket open until the client goes away.
            while ws.next().await.is_some() {}
        })
        .await;

        let mut stream = LogStream::connect(&base, "h", "tok").await.unwrap();
        stream.close().await;
        assert_eq!(stream.state(), StreamState::Closed);
        stream.close().await;
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(stream.next_line().await.is_none());
    }

    #[test]
    fn state_machine_stops_at_terminal_states() {
        let state = Arc::new(Mutex::new(StreamState::Connecting));
        set_state_if_live(&state, StreamState::Streaming);
        assert_eq!(*state.lock().unwrap(), StreamState::Streaming);

        set_state_if_live(&state, StreamState::Errored);
        assert_eq!(*state.lock().unwrap(), StreamState::Errored);

        // Terminal: a later close must not mask the error.
        set_state_if_live(&state, StreamState::Closed);
        assert_eq!(*state.lock().unwrap(), StreamState::Errored);
    }

    #[tokio::test]
    async fn auth_rejection_fails_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let frame = ws.next().await.unwrap().unwrap();
            let auth: Message = match frame {
                tungstenite::Message::Text(t) => serde_json::from_str(&t).unwrap(),
                other => panic!("expected auth frame, got {other:?}"),
            };
            send_msg(&mut ws, &auth.reply_error(401, "bad token")).await;
        });

        let err = LogStream::connect(&format!("ws://{addr}"), "h", "bad")
            .await
            .unwrap_err();
        match err {
            StreamError::AuthRejected(reason) => assert_eq!(reason, "bad token"),
            other => panic!("expected auth rejection, got {other:?}"),
        }
    }
}
