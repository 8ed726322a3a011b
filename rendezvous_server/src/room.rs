//! Room directory and host election
//!
//! A room key is created the moment its first `join-room` arrives; that
//! peer becomes host and every later joiner becomes a member. The room lives
//! exactly as long as its host. When the host goes, every member is told and
//! the entry is dropped in one step, so the same key can later start over as
//! a brand new room.
//!
//! All operations here take the peer registry by reference and run under the
//! caller's lock; the directory never sends to a peer that is not registered.

use crate::config::DEFAULT_INSTANCE;
use crate::error::SignalingError;
use crate::registry::{Membership, PeerRegistry};
use rendezvous_protocol::{JoinRoomPayload, PeerId, Role, ServerMessage};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

const ROOM_CREATED_MESSAGE: &str = "Room created. Waiting for peers to join.";
const HOST_DISCONNECTED_MESSAGE: &str = "The host has left the room.";

/// Tenant-scoped room name. Two keys are equal only if all three parts are.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    pub project: String,
    pub instance: String,
    pub room: String,
}

impl RoomKey {
    pub fn new(
        project: impl Into<String>,
        instance: impl Into<String>,
        room: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            instance: instance.into(),
            room: room.into(),
        }
    }

    /// Validate a join request. Empty strings count as missing.
    pub fn from_payload(payload: Option<JoinRoomPayload>) -> Option<Self> {
        let JoinRoomPayload {
            project,
            instance,
            room,
        } = payload?;
        let present = |field: Option<String>| field.filter(|value| !value.is_empty());

        Some(Self {
            project: present(project)?,
            instance: present(instance).unwrap_or_else(|| DEFAULT_INSTANCE.to_string()),
            room: present(room)?,
        })
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.instance, self.room)
    }
}

/// A hosted room. `host` is never in `members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub host: PeerId,
    pub members: HashSet<PeerId>,
}

/// Result of a `join-room` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The key was free; the peer is now its host
    Created(RoomKey),
    /// The key was hosted; the peer is now a member
    Joined { key: RoomKey, host: PeerId },
    /// Nothing changed; the peer was sent a 400
    Rejected(&'static str),
}

#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<RoomKey, Room>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RoomKey) -> Option<&Room> {
        self.rooms.get(key)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Create-or-join. The caller holds the lock for the whole call, so the
    /// vacancy check and the insert cannot interleave with another join.
    pub fn join(
        &mut self,
        peers: &mut PeerRegistry,
        peer_id: PeerId,
        payload: Option<JoinRoomPayload>,
    ) -> Result<JoinOutcome, SignalingError> {
        let peer = peers.get_mut(&peer_id).ok_or(SignalingError::UnknownPeer)?;

        let key = if peer.membership != Membership::Unaffiliated {
            Err("Already in a room")
        } else {
            RoomKey::from_payload(payload).ok_or("Missing required fields: project and room")
        };
        let key = match key {
            Ok(key) => key,
            Err(reason) => {
                peer.send(&ServerMessage::error(400, reason))?;
                return Ok(JoinOutcome::Rejected(reason));
            }
        };

        match self.rooms.entry(key.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(Room {
                    host: peer_id,
                    members: HashSet::new(),
                });
                peer.membership = Membership::Host(key.clone());
                info!(room = %key, host = %peer_id, "room created");
                peer.send(&ServerMessage::RoomCreated {
                    role: Role::Host,
                    room: key.room.clone(),
                    message: ROOM_CREATED_MESSAGE.to_string(),
                })?;
                Ok(JoinOutcome::Created(key))
            }
            Entry::Occupied(mut entry) => {
                let room = entry.get_mut();
                room.members.insert(peer_id);
                let host = room.host;
                peer.membership = Membership::Member(key.clone());
                info!(room = %key, peer = %peer_id, %host, "peer joined room");
                peer.send(&ServerMessage::RoomJoined {
                    role: Role::Client,
                    room: key.room.clone(),
                    host_id: host,
                })?;

                if let Err(e) = peers.send(&host, &ServerMessage::PeerJoined { peer_id }) {
                    warn!(room = %key, %host, "could not notify host of new peer: {e}");
                }
                Ok(JoinOutcome::Joined { key, host })
            }
        }
    }

    /// Apply a departure. Only the disconnect path calls this, after the
    /// peer has already been taken out of the registry.
    pub fn leave(&mut self, peers: &mut PeerRegistry, peer_id: PeerId, membership: Membership) {
        match membership {
            Membership::Unaffiliated => {}
            Membership::Host(key) => {
                let Entry::Occupied(entry) = self.rooms.entry(key) else {
                    return;
                };
                if entry.get().host != peer_id {
                    warn!(room = %entry.key(), peer = %peer_id, "departing host does not own room");
                    return;
                }
                let (key, room) = entry.remove_entry();

                let message = ServerMessage::HostDisconnected {
                    message: HOST_DISCONNECTED_MESSAGE.to_string(),
                };
                for member_id in &room.members {
                    let Some(member) = peers.get_mut(member_id) else {
                        continue;
                    };
                    member.membership = Membership::Unaffiliated;
                    if let Err(e) = member.send(&message) {
                        debug!(room = %key, peer = %member_id, "host-disconnected not delivered: {e}");
                    }
                }
                info!(room = %key, host = %peer_id, members = room.members.len(), "room closed");
            }
            Membership::Member(key) => {
                let Some(room) = self.rooms.get_mut(&key) else {
                    return;
                };
                if !room.members.remove(&peer_id) {
                    return;
                }
                info!(room = %key, peer = %peer_id, "peer left room");
                if let Err(e) = peers.send(&room.host, &ServerMessage::PeerLeft { peer_id }) {
                    debug!(room = %key, host = %room.host, "peer-left not delivered: {e}");
                }
            }
        }
    }
}
