//! Runtime configuration

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// How often every peer is probed. A peer that misses one probe is evicted
/// on the following tick.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Instance label used when a `join-room` request omits one
pub const DEFAULT_INSTANCE: &str = "default";

/// Listener and liveness settings for a relay
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "rendezvous-server",
    version,
    about = "WebSocket rendezvous relay for WebRTC signaling"
)]
pub struct RelayConfig {
    /// Address to listen on
    #[arg(long, env = "RENDEZVOUS_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Liveness probe interval; fixed at [`PING_INTERVAL`] outside tests
    #[arg(skip = PING_INTERVAL)]
    pub ping_interval: Duration,
}

impl RelayConfig {
    /// Socket address to bind
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Loopback on a free port, for embedding and tests
    pub fn local() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Self::default()
        }
    }

    /// Override the probe interval
    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            ping_interval: PING_INTERVAL,
        }
    }
}
