//! Shared server state
//!
//! `ServerState` is the context every connection handler and the liveness
//! monitor share. The peer registry and the room directory sit behind one
//! mutex, so identity assignment, the create-or-join decision and the
//! disconnect cascade each happen as a single step. The lock is never held
//! across an `.await`; sends only enqueue onto unbounded channels.

use crate::config::RelayConfig;
use crate::error::SignalingError;
use crate::liveness;
use crate::registry::{Membership, Peer, PeerRegistry, PeerSender};
use crate::room::{JoinOutcome, RoomDirectory, RoomKey};
use crate::router;
use rendezvous_protocol::{JoinRoomPayload, PeerId, RelayKind, ServerMessage};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct InnerState {
    peers: PeerRegistry,
    rooms: RoomDirectory,
}

impl InnerState {
    /// The one disconnect path. Returns false if the peer was already gone.
    fn remove_peer(&mut self, peer_id: PeerId) -> bool {
        let Some(peer) = self.peers.remove(&peer_id) else {
            return false;
        };
        self.rooms.leave(&mut self.peers, peer_id, peer.membership);
        true
    }
}

/// Handle to the relay's shared state; cheap to clone
#[derive(Debug, Clone)]
pub struct ServerState {
    inner: Arc<Mutex<InnerState>>,
    config: Arc<RelayConfig>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl ServerState {
    /// Empty registry and directory for a relay with this config
    pub fn new(config: RelayConfig) -> Self {
        Self {
            inner: Arc::default(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    // A handler that panicked mid-update must not wedge every other peer
    fn lock(&self) -> MutexGuard<'_, InnerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection and greet it with its identity
    pub fn connect(&self, sender: PeerSender) -> Result<PeerId, SignalingError> {
        let mut state = self.lock();
        let peer_id = state.peers.fresh_id();
        state.peers.insert(Peer::new(peer_id, sender))?;

        if let Err(e) = state.peers.send(&peer_id, &ServerMessage::Welcome { id: peer_id }) {
            warn!(peer = %peer_id, "welcome not delivered: {e}");
        }
        info!(peer = %peer_id, peers = state.peers.len(), "peer connected");
        Ok(peer_id)
    }

    /// Create or join the room named in `payload`. Replies go to the peers
    /// involved; the outcome is returned for logging and tests.
    pub fn join_room(
        &self,
        peer_id: PeerId,
        payload: Option<JoinRoomPayload>,
    ) -> Result<JoinOutcome, SignalingError> {
        let mut state = self.lock();
        let InnerState { peers, rooms } = &mut *state;
        rooms.join(peers, peer_id, payload)
    }

    /// Relay a `signal` or `data` payload from `sender` to `target`
    pub fn relay(
        &self,
        sender: PeerId,
        target: &str,
        payload: Value,
        kind: RelayKind,
    ) -> Result<(), SignalingError> {
        let state = self.lock();
        if !state.peers.contains(&sender) {
            return Err(SignalingError::UnknownPeer);
        }
        router::route(&state.peers, sender, target, payload, kind)
    }

    /// Record a pong
    pub fn mark_alive(&self, peer_id: PeerId) {
        if let Some(peer) = self.lock().peers.get_mut(&peer_id) {
            peer.alive = true;
        }
    }

    /// Tear down a peer: drop it from the registry and apply its room
    /// departure. Safe to call any number of times; only the first acts.
    pub fn disconnect(&self, peer_id: PeerId) -> bool {
        let mut state = self.lock();
        let removed = state.remove_peer(peer_id);
        if removed {
            info!(peer = %peer_id, peers = state.peers.len(), "peer disconnected");
        }
        removed
    }

    /// One liveness tick: evict peers that missed the last probe, probe the
    /// rest. Returns the evicted ids.
    pub fn sweep(&self) -> Vec<PeerId> {
        let mut state = self.lock();
        let stale = liveness::probe(&mut state.peers);
        for peer_id in &stale {
            if let Some(peer) = state.peers.get(peer_id) {
                peer.close();
            }
            warn!(peer = %peer_id, "no answer to liveness probe, evicting");
            state.remove_peer(*peer_id);
        }
        stale
    }

    /// Number of live peers
    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    /// Number of open rooms
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    /// A live peer's room and role
    pub fn membership(&self, peer_id: PeerId) -> Option<Membership> {
        self.lock()
            .peers
            .get(&peer_id)
            .map(|peer| peer.membership.clone())
    }

    /// Host and sorted member list of a room, if it exists
    pub fn room_snapshot(&self, key: &RoomKey) -> Option<(PeerId, Vec<PeerId>)> {
        let state = self.lock();
        let room = state.rooms.get(key)?;
        let mut members: Vec<PeerId> = room.members.iter().copied().collect();
        members.sort();
        Some((room.host, members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_INSTANCE;
    use crate::registry::tests::drain;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
    use tokio_tungstenite::tungstenite::Message;

    fn connect(state: &ServerState) -> (PeerId, UnboundedReceiver<Message>) {
        let (tx, mut rx) = unbounded_channel();
        let id = state.connect(tx).unwrap();
        assert_eq!(drain(&mut rx), vec![ServerMessage::Welcome { id }]);
        (id, rx)
    }

    fn join(state: &ServerState, peer_id: PeerId, room: &str) -> JoinOutcome {
        let payload = JoinRoomPayload {
            project: Some("game".into()),
            instance: None,
            room: Some(room.into()),
        };
        state.join_room(peer_id, Some(payload)).unwrap()
    }

    fn boss_room() -> RoomKey {
        RoomKey::new("game", DEFAULT_INSTANCE, "boss")
    }

    #[test]
    fn disconnect_is_idempotent() {
        let state = ServerState::default();
        let (host, _rx_host) = connect(&state);
        let (member, mut rx_member) = connect(&state);
        join(&state, host, "boss");
        join(&state, member, "boss");
        drain(&mut rx_member);

        assert!(state.disconnect(host));
        assert!(!state.disconnect(host));

        assert_eq!(state.room_count(), 0);
        assert_eq!(state.peer_count(), 1);
        assert_eq!(drain(&mut rx_member).len(), 1);
        assert_eq!(state.membership(member), Some(Membership::Unaffiliated));
    }

    #[test]
    fn member_can_rejoin_after_host_left() {
        let state = ServerState::default();
        let (host, _rx_host) = connect(&state);
        let (member, _rx_member) = connect(&state);
        join(&state, host, "boss");
        join(&state, member, "boss");

        state.disconnect(host);

        assert_eq!(join(&state, member, "boss"), JoinOutcome::Created(boss_room()));
        assert_eq!(state.room_snapshot(&boss_room()), Some((member, vec![])));
    }

    #[test]
    fn concurrent_first_joins_elect_one_host() {
        let state = ServerState::default();
        let peers: Vec<_> = (0..16).map(|_| connect(&state)).collect();

        let outcomes: Vec<JoinOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = peers
                .iter()
                .map(|(id, _)| {
                    let state = state.clone();
                    let id = *id;
                    scope.spawn(move || join(&state, id, "boss"))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        let hosts: Vec<_> = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, JoinOutcome::Created(_)))
            .collect();
        assert_eq!(hosts.len(), 1);

        let (host, members) = state.room_snapshot(&boss_room()).unwrap();
        assert_eq!(members.len(), 15);
        assert!(!members.contains(&host));
        for outcome in &outcomes {
            if let JoinOutcome::Joined { host: reported, .. } = outcome {
                assert_eq!(*reported, host);
            }
        }
    }

    #[test]
    fn relay_from_departed_sender_is_dropped() {
        let state = ServerState::default();
        let (a, mut rx_a) = connect(&state);
        let (b, _rx_b) = connect(&state);
        state.disconnect(b);

        let result = state.relay(b, &a.to_string(), Value::Null, RelayKind::Signal);
        assert!(matches!(result, Err(SignalingError::UnknownPeer)));
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn sweep_evicts_silent_host_and_closes_room() {
        let state = ServerState::default();
        let (host, mut rx_host) = connect(&state);
        let (member, mut rx_member) = connect(&state);
        join(&state, host, "boss");
        join(&state, member, "boss");
        drain(&mut rx_member);

        assert!(state.sweep().is_empty());
        state.mark_alive(member);
        assert_eq!(state.sweep(), vec![host]);

        assert_eq!(state.room_count(), 0);
        assert_eq!(state.peer_count(), 1);
        assert!(!state.disconnect(host));
        assert!(matches!(
            drain(&mut rx_member).as_slice(),
            [ServerMessage::HostDisconnected { .. }]
        ));

        let mut saw_close = false;
        while let Ok(message) = rx_host.try_recv() {
            saw_close |= message.is_close();
        }
        assert!(saw_close);
    }
}
