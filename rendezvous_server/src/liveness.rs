//! Liveness monitor
//!
//! Every tick, a peer that still owes a pong from the previous tick is
//! evicted; everyone else is marked pending and sent a fresh ping. A peer
//! whose connection has silently died is therefore gone within two ticks.

use crate::registry::PeerRegistry;
use crate::state::ServerState;
use rendezvous_protocol::PeerId;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// One probe round. Returns the peers that missed the previous probe; the
/// caller is responsible for evicting them.
pub fn probe(peers: &mut PeerRegistry) -> Vec<PeerId> {
    let mut stale = Vec::new();
    for peer in peers.iter_mut() {
        if !peer.alive {
            stale.push(peer.id);
            continue;
        }
        peer.alive = false;
        if !peer.ping() {
            debug!(peer = %peer.id, "ping not queued, connection is closing");
        }
    }
    stale
}

/// Probe all peers every `ping_interval` until shutdown is signalled
pub async fn run(state: ServerState, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(state.config().ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = state.sweep();
                if !evicted.is_empty() {
                    info!(count = evicted.len(), "evicted unresponsive peers");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("liveness monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::connect;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn silent_peer_is_reported_on_the_second_round() {
        let mut peers = PeerRegistry::new();
        let (id, mut rx) = connect(&mut peers);

        assert!(probe(&mut peers).is_empty());
        assert!(matches!(rx.try_recv(), Ok(Message::Ping(_))));
        assert!(!peers.get(&id).unwrap().alive);

        assert_eq!(probe(&mut peers), vec![id]);
    }

    #[test]
    fn answering_peer_survives() {
        let mut peers = PeerRegistry::new();
        let (id, _rx) = connect(&mut peers);

        for _ in 0..3 {
            assert!(probe(&mut peers).is_empty());
            peers.get_mut(&id).unwrap().alive = true;
        }
        assert!(peers.contains(&id));
    }
}
