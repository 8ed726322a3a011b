//! Peer registry: the source of truth for who is reachable right now

use crate::error::SignalingError;
use crate::room::RoomKey;
use rendezvous_protocol::{PeerId, ServerMessage};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;

/// Outbound half of a peer's connection. The writer task owns the receiver.
pub type PeerSender = UnboundedSender<Message>;

/// Which room a peer belongs to, and in what capacity
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Membership {
    #[default]
    Unaffiliated,
    Host(RoomKey),
    Member(RoomKey),
}

/// One connected participant
#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    sender: PeerSender,
    /// Cleared when a probe goes out, set again when the pong comes back
    pub alive: bool,
    pub membership: Membership,
}

impl Peer {
    /// A freshly connected peer: alive and in no room
    pub fn new(id: PeerId, sender: PeerSender) -> Self {
        Self {
            id,
            sender,
            alive: true,
            membership: Membership::Unaffiliated,
        }
    }

    /// Queue a message on this peer's connection
    pub fn send(&self, message: &ServerMessage) -> Result<(), SignalingError> {
        let text = serde_json::to_string(message)?;
        self.sender
            .send(Message::text(text))
            .map_err(|_| SignalingError::UnknownPeer)
    }

    /// Queue a liveness probe; false if the connection is already gone
    pub fn ping(&self) -> bool {
        self.sender.send(Message::Ping(Default::default())).is_ok()
    }

    /// Ask the writer task to send a close frame and stop
    pub fn close(&self) {
        let _ = self.sender.send(Message::Close(None));
    }
}

/// Live peers by id
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An id not held by any registered peer
    pub fn fresh_id(&self) -> PeerId {
        loop {
            let peer_id = PeerId::random();
            if !self.peers.contains_key(&peer_id) {
                return peer_id;
            }
        }
    }

    /// Register a peer; an id already in use is rejected
    pub fn insert(&mut self, peer: Peer) -> Result<(), SignalingError> {
        match self.peers.entry(peer.id) {
            Entry::Occupied(_) => Err(SignalingError::DuplicatePeer(peer.id)),
            Entry::Vacant(entry) => {
                entry.insert(peer);
                Ok(())
            }
        }
    }

    /// Look up a live peer
    pub fn get(&self, peer_id: &PeerId) -> Option<&Peer> {
        self.peers.get(peer_id)
    }

    pub fn get_mut(&mut self, peer_id: &PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(peer_id)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Removing an absent id is a no-op and returns `None`
    pub fn remove(&mut self, peer_id: &PeerId) -> Option<Peer> {
        self.peers.remove(peer_id)
    }

    /// Every live peer, in no particular order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.peers.values_mut()
    }

    /// Number of live peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Queue a message for a registered peer
    pub fn send(&self, peer_id: &PeerId, message: &ServerMessage) -> Result<(), SignalingError> {
        self.get(peer_id)
            .ok_or(SignalingError::UnknownPeer)?
            .send(message)
    }
}
