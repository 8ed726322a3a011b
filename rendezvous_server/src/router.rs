//! Opaque payload relay between identified peers
//!
//! Routing only looks at the registry. Room membership plays no part: any
//! peer may address any identity it has learned.

use crate::error::SignalingError;
use crate::registry::PeerRegistry;
use rendezvous_protocol::{PeerId, RelayKind, ServerMessage};
use serde_json::Value;
use tracing::debug;

/// Forward `payload` to `target`, tagged with `sender`. An unknown target
/// earns the sender a single 404 and nothing else happens.
pub fn route(
    peers: &PeerRegistry,
    sender: PeerId,
    target: &str,
    payload: Value,
    kind: RelayKind,
) -> Result<(), SignalingError> {
    let receiver = target
        .parse::<PeerId>()
        .ok()
        .and_then(|id| peers.get(&id));

    match receiver {
        Some(receiver) => {
            debug!(%sender, receiver = %receiver.id, %kind, "relaying");
            receiver.send(&ServerMessage::relay(kind, sender, payload))
        }
        None => {
            debug!(%sender, requested = target, %kind, "relay target not found");
            peers.send(
                &sender,
                &ServerMessage::error(404, format!("Peer {target} not found")),
            )?;
            Err(SignalingError::UnknownPeer)
        }
    }
}
