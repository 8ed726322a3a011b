//! WebSocket rendezvous relay for WebRTC signaling
//!
//! Peers connect, receive an identity, and meet in tenant-scoped rooms. The
//! first peer into a room becomes its host; everyone after is a member and is
//! told the host's identity so it can start a peer-to-peer handshake. The
//! relay forwards the handshake (`signal`) and any other application
//! payloads (`data`) between identities without looking inside them.
//!
//! # Protocol
//!
//! One JSON object per text frame; see [`rendezvous_protocol`] for the full
//! message set. A typical exchange:
//!
//! ```text
//! A -> {"type":"join-room","payload":{"project":"game","room":"boss"}}
//! A <- {"type":"room-created","role":"host","room":"boss","message":"..."}
//! B -> {"type":"join-room","payload":{"project":"game","room":"boss"}}
//! B <- {"type":"room-joined","role":"client","room":"boss","hostId":"<A>"}
//! A <- {"type":"peer-joined","peerId":"<B>"}
//! B -> {"type":"signal","target":"<A>","payload":{"type":"offer"}}
//! A <- {"type":"signal","sender":"<B>","payload":{"type":"offer"}}
//! ```
//!
//! When a host disconnects its room is closed and every member receives
//! `host-disconnected`. Peers that stop answering WebSocket pings are evicted
//! after at most two ping intervals.
//!
//! # Example
//!
//! ```bash
//! PORT=9000 rendezvous-server
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handler;
pub mod liveness;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod state;

pub use config::RelayConfig;
pub use error::SignalingError;
pub use room::{JoinOutcome, RoomKey};
pub use server::{RelayServer, ShutdownHandle, run};
pub use state::ServerState;
