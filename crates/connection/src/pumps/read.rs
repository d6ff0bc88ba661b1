//! WebSocket read pump — dispatches incoming messages.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use stratus_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use stratus_protocol::envelope::Message;

use crate::client::DisconnectCallback;

/// Reads messages from the WebSocket and routes responses to pending
/// requests.
///
/// Uses a read deadline to detect dead connections: if *nothing* arrives
/// within [`WS_PONG_WAIT`], the connection is considered dead and the
/// loop exits.
pub(crate) async fn read_pump<S>(
    mut read: S,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>,
    on_disconnect: DisconnectCallback,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let read_deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(read_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut read_deadline => {
                warn!("read deadline expired — connection dead, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        // ANY incoming message resets the deadline.
                        read_deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_message(&text, &pending).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            _ => {} // Binary — the server never pushes binary frames.
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    if let Some(cb) = on_disconnect.lock().await.as_ref() {
        cb();
    }
}

/// Routes a text message to its pending request.
async fn handle_text_message(
    text: &str,
    pending: &Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>,
) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return;
    }

    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };

    trace!(msg_type = ?msg.msg_type, id = %msg.id, "received message");

    let mut map = pending.lock().await;
    match map.remove(&msg.id) {
        Some(tx) => {
            let _ = tx.send(msg);
        }
        None => {
            warn!(msg_type = ?msg.msg_type, id = %msg.id, "uncorrelated message — dropping");
        }
    }
}
