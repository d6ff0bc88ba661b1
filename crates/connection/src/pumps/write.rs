//! WebSocket write pump — single writer for the shared socket.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Forwards queued outbound frames to the socket.
///
/// All senders funnel through one mpsc channel, so frames from concurrent
/// requests never interleave mid-write.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut outbound: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = outbound.recv() => match msg {
                Some(m) => m,
                None => break,
            },
        };
        if let Err(e) = write.send(msg).await {
            error!("WebSocket write error: {e}");
            break;
        }
    }

    // Best effort; the socket may already be gone.
    let _ = write.send(tungstenite::Message::Close(None)).await;
}
