use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use log::{debug, warn};

use super::offline::OfflinePacket;
use super::protocol::RAKNET_PROTOCOL_VERSION;

/// Process-lifetime identity advertised to clients during the offline exchange.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    guid: u64,
    started: Instant,
    name: String,
}

impl ServerIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_guid(rand::random(), name)
    }

    pub fn with_guid(guid: u64, name: impl Into<String>) -> Self {
        Self {
            guid,
            started: Instant::now(),
            name: name.into(),
        }
    }

    pub fn guid(&self) -> u64 {
        self.guid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn status(&self) -> String {
        format!("MCCPP;Demo;{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeOutcome {
    Reply(Bytes),
    /// Open-connection step 2 succeeded; the caller creates the session.
    Open {
        reply: Bytes,
        client_id: i64,
        mtu: u16,
    },
    Ignore,
}

/// Answers one offline datagram. `connected` tells whether `addr` already owns a session.
pub fn handle_unconnected(
    data: &[u8],
    addr: SocketAddr,
    identity: &ServerIdentity,
    connected: bool,
    mtu: u16,
) -> HandshakeOutcome {
    let packet = match OfflinePacket::decode(data) {
        Ok(packet) => packet,
        Err(e) => {
            debug!("Dropping offline datagram from {}: {}", addr, e);
            return HandshakeOutcome::Ignore;
        }
    };

    match packet {
        OfflinePacket::UnconnectedPing { time } => {
            let uptime_ms = identity.uptime_ms();
            debug!("Ping from {} (time {}, uptime {} ms)", addr, time, uptime_ms);
            let pong = OfflinePacket::UnconnectedPong {
                time,
                server_guid: identity.guid(),
                status: identity.status(),
                uptime_ms,
            };
            HandshakeOutcome::Reply(pong.encode())
        }
        OfflinePacket::OpenConnectionRequest1 { .. } | OfflinePacket::OpenConnectionRequest2 { .. }
            if connected =>
        {
            debug!("Ignoring open-connection request from connected {}", addr);
            HandshakeOutcome::Ignore
        }
        OfflinePacket::OpenConnectionRequest1 {
            protocol,
            mtu: requested,
        } => {
            debug!(
                "OpenConnectionRequest1 from {} (protocol {}, requested mtu {})",
                addr, protocol, requested
            );
            if protocol != RAKNET_PROTOCOL_VERSION {
                debug!(
                    "{} speaks RakNet protocol {}, expected {}",
                    addr, protocol, RAKNET_PROTOCOL_VERSION
                );
            }
            let reply = OfflinePacket::OpenConnectionReply1 {
                server_guid: identity.guid(),
                mtu,
            };
            HandshakeOutcome::Reply(reply.encode())
        }
        OfflinePacket::OpenConnectionRequest2 {
            mtu: requested,
            client_id,
            ..
        } => {
            debug!(
                "OpenConnectionRequest2 from {} (client id {}, requested mtu {})",
                addr, client_id, requested
            );
            let reply = OfflinePacket::OpenConnectionReply2 {
                server_guid: identity.guid(),
                client_addr: addr,
                mtu,
            };
            HandshakeOutcome::Open {
                reply: reply.encode(),
                client_id,
                mtu,
            }
        }
        other => {
            warn!("Unhandled offline packet 0x{:02x} from {}", other.id(), addr);
            HandshakeOutcome::Ignore
        }
    }
}

/// Reply sent instead of `OpenConnectionReply2` when the session table is full.
pub fn no_free_connections(identity: &ServerIdentity) -> Bytes {
    OfflinePacket::NoFreeIncomingConnections {
        server_guid: identity.guid(),
    }
    .encode()
}
