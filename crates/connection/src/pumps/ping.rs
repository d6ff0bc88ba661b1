//! WebSocket ping pump — periodic keepalive.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use stratus_protocol::constants::WS_PING_PERIOD;

/// Queues a ping every [`WS_PING_PERIOD`] until cancelled.
///
/// Liveness checking is the read side's job: this pump only generates
/// traffic so the read deadline has something to observe on an otherwise
/// quiet connection.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(WS_PING_PERIOD);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if write_tx
                    .send(tungstenite::Message::Ping(Vec::new().into()))
                    .await
                    .is_err()
                {
                    break; // writer gone, nothing left to keep alive
                }
            }
        }
    }
}
