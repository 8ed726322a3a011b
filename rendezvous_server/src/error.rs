//! Error types for the rendezvous server

use rendezvous_protocol::{PeerId, ProtocolError};
use thiserror::Error;

/// Errors raised by the relay itself
#[derive(Error, Debug)]
pub enum SignalingError {
    /// Identity already held by a live peer
    #[error("Peer {0} is already registered")]
    DuplicatePeer(PeerId),

    /// Unknown peer
    #[error("Unknown peer")]
    UnknownPeer,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Socket or listener error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Problems with a single inbound frame. None of these are reported back to
/// the peer; they are logged and the connection stays open.
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// Connection was closed
    #[error("Connection closed")]
    Close,

    /// Frame could not be decoded
    #[error("Malformed message: {0}")]
    Malformed(#[from] ProtocolError),

    /// Well-formed frame with a `type` the relay does not handle
    #[error("Unsupported message type")]
    UnsupportedType,

    /// Binary frames are not part of the protocol
    #[error("Binary frames are not supported")]
    Binary,
}
