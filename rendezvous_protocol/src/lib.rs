//! Wire protocol for the rendezvous signaling relay
//!
//! Every frame is a single UTF-8 JSON object tagged by its `type` field.
//!
//! ## Client → server
//! - `{"type": "join-room", "payload": {"project": "..", "instance": "..", "room": ".."}}`
//! - `{"type": "signal", "target": "<peer id>", "payload": ...}`
//! - `{"type": "data", "target": "<peer id>", "payload": ...}`
//!
//! ## Server → client
//! - `{"type": "welcome", "id": "<uuid>"}`
//! - `{"type": "room-created", "role": "host", "room": "..", "message": ".."}`
//! - `{"type": "room-joined", "role": "client", "room": "..", "hostId": "<uuid>"}`
//! - `{"type": "peer-joined", "peerId": "<uuid>"}` / `{"type": "peer-left", "peerId": "<uuid>"}`
//! - `{"type": "host-disconnected", "message": ".."}`
//! - `{"type": "signal" | "data", "sender": "<uuid>", "payload": ...}`
//! - `{"type": "error", "code": 400 | 404, "message": ".."}`
//!
//! Payloads are relayed verbatim and never inspected.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors decoding wire data
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not valid JSON or does not match any message shape
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    /// String is not a peer id
    #[error("Invalid peer id: {0}")]
    PeerId(#[from] uuid::Error),
}

/// Opaque identity assigned to a connection by the relay
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// A fresh random id. Uniqueness among live peers is the registry's job.
    pub fn random() -> Self {
        Uuid::new_v4().into()
    }
}

impl From<Uuid> for PeerId {
    fn from(uuid: Uuid) -> Self {
        PeerId(uuid)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PeerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Uuid::parse_str(s)?.into())
    }
}

/// Role announced to a peer when it enters a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Client,
}

/// Which relay channel a payload travels on. Both behave identically;
/// the distinction is preserved end to end for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayKind {
    Signal,
    Data,
}

impl fmt::Display for RelayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayKind::Signal => f.write_str("signal"),
            RelayKind::Data => f.write_str("data"),
        }
    }
}

/// Body of a `join-room` request.
///
/// All fields are optional on the wire so that a missing field is reported
/// back to the peer as a validation error instead of a parse failure.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinRoomPayload {
    pub project: Option<String>,
    pub instance: Option<String>,
    pub room: Option<String>,
}

/// Requests a peer may send to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom {
        #[serde(default)]
        payload: Option<JoinRoomPayload>,
    },
    Signal {
        target: String,
        #[serde(default)]
        payload: Value,
    },
    Data {
        target: String,
        #[serde(default)]
        payload: Value,
    },
    /// Any `type` the relay does not understand
    #[serde(other)]
    Unknown,
}

/// Events the relay sends to a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Welcome {
        id: PeerId,
    },
    RoomCreated {
        role: Role,
        room: String,
        message: String,
    },
    RoomJoined {
        role: Role,
        room: String,
        host_id: PeerId,
    },
    PeerJoined {
        peer_id: PeerId,
    },
    PeerLeft {
        peer_id: PeerId,
    },
    HostDisconnected {
        message: String,
    },
    Signal {
        sender: PeerId,
        payload: Value,
    },
    Data {
        sender: PeerId,
        payload: Value,
    },
    Error {
        code: u16,
        message: String,
    },
}

impl ServerMessage {
    /// A relayed payload tagged with its sender, on the channel it arrived on
    pub fn relay(kind: RelayKind, sender: PeerId, payload: Value) -> Self {
        match kind {
            RelayKind::Signal => ServerMessage::Signal { sender, payload },
            RelayKind::Data => ServerMessage::Data { sender, payload },
        }
    }

    /// An `error` event with an HTTP-style status code
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }
}

macro_rules! json_codec {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }

        impl FromStr for $ty {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(serde_json::from_str(s)?)
            }
        }
    };
}

json_codec!(ClientMessage);
json_codec!(ServerMessage);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_room_with_missing_fields_still_parses() {
        let msg: ClientMessage = r#"{"type":"join-room","payload":{"project":"game"}}"#
            .parse()
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                payload: Some(JoinRoomPayload {
                    project: Some("game".into()),
                    instance: None,
                    room: None,
                })
            }
        );

        let msg: ClientMessage = r#"{"type":"join-room"}"#.parse().unwrap();
        assert_eq!(msg, ClientMessage::JoinRoom { payload: None });
    }

    #[test]
    fn unknown_type_is_not_a_parse_error() {
        let msg: ClientMessage = r#"{"type":"dance","steps":3}"#.parse().unwrap();
        assert_eq!(msg, ClientMessage::Unknown);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!("not json".parse::<ClientMessage>().is_err());
        assert!(r#"{"target":"x"}"#.parse::<ClientMessage>().is_err());
        assert!(r#"{"type":"signal","payload":{}}"#.parse::<ClientMessage>().is_err());
    }

    #[test]
    fn signal_target_is_opaque_text() {
        let msg: ClientMessage =
            r#"{"type":"signal","target":"nonexistent","payload":{"type":"offer"}}"#
                .parse()
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Signal {
                target: "nonexistent".into(),
                payload: json!({"type": "offer"}),
            }
        );
    }

    #[test]
    fn server_fields_are_camel_case() {
        let host = PeerId(Uuid::nil());
        let msg = ServerMessage::RoomJoined {
            role: Role::Client,
            room: "boss".into(),
            host_id: host,
        };
        let value: Value = serde_json::from_str(&msg.to_string()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "room-joined",
                "role": "client",
                "room": "boss",
                "hostId": "00000000-0000-0000-0000-000000000000",
            })
        );

        let value: Value =
            serde_json::from_str(&ServerMessage::PeerLeft { peer_id: host }.to_string()).unwrap();
        assert_eq!(value["type"], "peer-left");
        assert_eq!(value["peerId"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn relay_keeps_channel_and_payload() {
        let sender = PeerId::random();
        let payload = json!({"candidate": "a=1", "nested": [1, 2, 3]});
        let msg = ServerMessage::relay(RelayKind::Data, sender, payload.clone());
        assert_eq!(msg, ServerMessage::Data { sender, payload });
    }

    #[test]
    fn peer_id_parses_only_uuids() {
        let id = PeerId::random();
        assert_eq!(id.to_string().parse::<PeerId>().unwrap(), id);
        assert!("nonexistent".parse::<PeerId>().is_err());
    }
}
