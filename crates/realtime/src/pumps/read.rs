//! WebSocket read pump: forwards inbound frames and detects dead peers.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::transport::{CloseReason, TransportEvent};

/// Reads frames from the WebSocket and forwards text frames as
/// [`TransportEvent::Frame`].
///
/// Any incoming message (not just Pong) resets the `silence_timeout`
/// deadline. When the loop ends for any reason other than cancellation, a
/// single [`TransportEvent::Closed`] is sent and the connection's token is
/// cancelled so the sibling pumps stop too.
pub(crate) async fn read_pump<S>(
    mut read: S,
    generation: u64,
    silence_timeout: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(silence_timeout);
    tokio::pin!(deadline);

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            () = &mut deadline => {
                warn!(generation, "heartbeat timeout, connection dead");
                break CloseReason::HeartbeatTimeout;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + silence_timeout);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                trace!(generation, len = text.len(), "received frame");
                                let frame = TransportEvent::Frame {
                                    generation,
                                    text: text.as_str().to_owned(),
                                };
                                if events.send(frame).is_err() {
                                    debug!(generation, "manager gone, stopping read pump");
                                    cancel.cancel();
                                    return;
                                }
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(generation, ?frame, "received close frame");
                                break match frame {
                                    Some(f) => CloseReason::Remote {
                                        code: u16::from(f.code),
                                        reason: f.reason.as_str().to_owned(),
                                    },
                                    None => CloseReason::Remote {
                                        code: 1005,
                                        reason: String::new(),
                                    },
                                };
                            }
                            _ => {} // Binary: not part of the protocol
                        }
                    }
                    Some(Err(e)) => {
                        warn!(generation, "WebSocket read error: {e}");
                        break CloseReason::ReadError(e.to_string());
                    }
                    None => {
                        debug!(generation, "WebSocket stream ended");
                        break CloseReason::StreamEnded;
                    }
                }
            }
        }
    };

    let _ = events.send(TransportEvent::Closed { generation, reason });
    cancel.cancel();
}
