//! WebSocket connection handling
//!
//! Each accepted socket becomes one peer. The socket is split: a writer task
//! drains the peer's outbound channel onto the wire, while this task reads
//! frames in arrival order and dispatches them. A bad frame is logged and
//! skipped; only a closed or broken connection ends the read loop. When
//! either half finishes, the peer goes through the disconnect path. If the
//! peer was already evicted that call does nothing.

use crate::error::{ClientRequestError, SignalingError};
use crate::state::ServerState;
use futures_util::{SinkExt, StreamExt};
use rendezvous_protocol::{ClientMessage, PeerId, RelayKind};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{Instrument, debug, error, info_span, warn};

/// Run a connection from WebSocket handshake to teardown
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: ServerState,
) -> Result<(), SignalingError> {
    let socket = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let peer_id = state.connect(tx)?;
    let span = info_span!("peer", peer = %peer_id, %addr);

    let writer = async move {
        while let Some(message) = rx.recv().await {
            let closing = message.is_close();
            if let Err(e) = ws_sender.send(message).await {
                debug!("write failed: {e}");
                return;
            }
            if closing {
                break;
            }
        }
        let _ = ws_sender.close().await;
    };
    let mut writer = tokio::spawn(writer.instrument(span.clone()));

    let reader = async {
        while let Some(frame) = ws_receiver.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) if ends_connection(&e) => {
                    debug!("connection lost: {e}");
                    break;
                }
                Err(e) => {
                    warn!("transport error: {e}");
                    continue;
                }
            };

            let handled =
                panic::catch_unwind(AssertUnwindSafe(|| handle_frame(&state, peer_id, frame)));
            match handled {
                Ok(Ok(())) => {}
                Ok(Err(ClientRequestError::Close)) => break,
                Ok(Err(e)) => warn!("ignoring message: {e}"),
                Err(_) => error!("panic while handling message"),
            }
        }
    };

    tokio::select! {
        _ = reader.instrument(span.clone()) => {}
        _ = &mut writer => {}
    }
    span.in_scope(|| state.disconnect(peer_id));
    Ok(())
}

/// Whether a read error leaves the socket unusable. Anything else (bad
/// UTF-8, oversized or malformed frames) is a per-frame problem.
fn ends_connection(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Io(_)
    )
}

/// Handle one inbound frame
pub fn handle_frame(
    state: &ServerState,
    peer_id: PeerId,
    frame: Message,
) -> Result<(), ClientRequestError> {
    match frame {
        Message::Text(text) => {
            let message: ClientMessage = text.as_str().parse()?;
            dispatch(state, peer_id, message)
        }
        Message::Pong(_) => {
            state.mark_alive(peer_id);
            Ok(())
        }
        // tungstenite answers pings on its own
        Message::Ping(_) | Message::Frame(_) => Ok(()),
        Message::Binary(_) => Err(ClientRequestError::Binary),
        Message::Close(_) => Err(ClientRequestError::Close),
    }
}

/// Route a decoded request to the room directory or the signal router
pub fn dispatch(
    state: &ServerState,
    peer_id: PeerId,
    message: ClientMessage,
) -> Result<(), ClientRequestError> {
    let result = match message {
        ClientMessage::JoinRoom { payload } => state.join_room(peer_id, payload).map(|_| ()),
        ClientMessage::Signal { target, payload } => {
            state.relay(peer_id, &target, payload, RelayKind::Signal)
        }
        ClientMessage::Data { target, payload } => {
            state.relay(peer_id, &target, payload, RelayKind::Data)
        }
        ClientMessage::Unknown => return Err(ClientRequestError::UnsupportedType),
    };
    if let Err(e) = result {
        debug!("request not completed: {e}");
    }
    Ok(())
}
