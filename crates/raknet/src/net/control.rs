use std::net::SocketAddr;

use bytes::Bytes;

use crate::codec::{unspecified_address, Reader, Writer};

use super::protocol::{PacketError, PacketId};

const INTERNAL_ADDRESS_COUNT: usize = 10;

/// Connected-mode RakNet messages the session answers on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlPacket {
    ConnectedPing {
        time: u64,
    },
    ConnectedPong {
        ping_time: u64,
        pong_time: u64,
    },
    ConnectionRequest {
        client_guid: u64,
        time: u64,
    },
    ConnectionRequestAccepted {
        client_addr: SocketAddr,
        request_time: u64,
        accepted_time: u64,
    },
    NewIncomingConnection,
    Disconnect,
}

impl ControlPacket {
    pub fn id(&self) -> PacketId {
        match self {
            ControlPacket::ConnectedPing { .. } => PacketId::ConnectedPing,
            ControlPacket::ConnectedPong { .. } => PacketId::ConnectedPong,
            ControlPacket::ConnectionRequest { .. } => PacketId::ConnectionRequest,
            ControlPacket::ConnectionRequestAccepted { .. } => PacketId::ConnectionRequestAccepted,
            ControlPacket::NewIncomingConnection => PacketId::NewIncomingConnection,
            ControlPacket::Disconnect => PacketId::Disconnect,
        }
    }

    /// Decodes a payload whose id byte was already classified as transport control.
    pub fn decode(payload: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(payload);
        let id = PacketId::try_from(r.read_u8()?)?;

        let packet = match id {
            PacketId::ConnectedPing => ControlPacket::ConnectedPing {
                time: r.read_u64()?,
            },
            PacketId::ConnectedPong => ControlPacket::ConnectedPong {
                ping_time: r.read_u64()?,
                pong_time: r.read_u64()?,
            },
            PacketId::ConnectionRequest => {
                let client_guid = r.read_u64()?;
                let time = r.read_u64()?;
                ControlPacket::ConnectionRequest { client_guid, time }
            }
            PacketId::ConnectionRequestAccepted => {
                let client_addr = r.read_address()?;
                let _system_index = r.read_u16()?;
                for _ in 0..INTERNAL_ADDRESS_COUNT {
                    r.read_address()?;
                }
                ControlPacket::ConnectionRequestAccepted {
                    client_addr,
                    request_time: r.read_u64()?,
                    accepted_time: r.read_u64()?,
                }
            }
            // Carries the client's view of our addresses; nothing here is acted on.
            PacketId::NewIncomingConnection => ControlPacket::NewIncomingConnection,
            PacketId::Disconnect => ControlPacket::Disconnect,
            other => return Err(PacketError::UnknownPacketType(other.into())),
        };

        Ok(packet)
    }

    pub fn encode(&self) -> Bytes {
        let mut w = Writer::with_capacity(32);
        w.put_u8(self.id().into());

        match self {
            ControlPacket::ConnectedPing { time } => w.put_u64(*time),
            ControlPacket::ConnectedPong {
                ping_time,
                pong_time,
            } => {
                w.put_u64(*ping_time);
                w.put_u64(*pong_time);
            }
            ControlPacket::ConnectionRequest { client_guid, time } => {
                w.put_u64(*client_guid);
                w.put_u64(*time);
                w.put_bool(false);
            }
            ControlPacket::ConnectionRequestAccepted {
                client_addr,
                request_time,
                accepted_time,
            } => {
                w.put_address(client_addr);
                w.put_u16(0);
                let internal = unspecified_address();
                for _ in 0..INTERNAL_ADDRESS_COUNT {
                    w.put_address(&internal);
                }
                w.put_u64(*request_time);
                w.put_u64(*accepted_time);
            }
            ControlPacket::NewIncomingConnection | ControlPacket::Disconnect => {}
        }

        w.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepted_layout() {
        let accepted = ControlPacket::ConnectionRequestAccepted {
            client_addr: "127.0.0.1:50000".parse().unwrap(),
            request_time: 10,
            accepted_time: 20,
        };
        let bytes = accepted.encode();

        // id + address + system index + 10 addresses + two timestamps
        assert_eq!(bytes.len(), 1 + 7 + 2 + 10 * 7 + 16);
        assert_eq!(ControlPacket::decode(&bytes).unwrap(), accepted);
    }

    #[test]
    fn test_ping_and_disconnect() {
        let ping = ControlPacket::ConnectedPing { time: 99 };
        assert_eq!(ControlPacket::decode(&ping.encode()).unwrap(), ping);
        assert_eq!(ControlPacket::Disconnect.encode().as_ref(), &[0x15u8]);
    }

    #[test]
    fn test_connection_request_ignores_trailing_security_flag() {
        let request = ControlPacket::ConnectionRequest {
            client_guid: 7,
            time: 1234,
        };
        let bytes = request.encode();
        assert_eq!(bytes.len(), 18);
        assert_eq!(ControlPacket::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn test_game_ids_are_rejected() {
        assert!(matches!(
            ControlPacket::decode(&[0x82]),
            Err(PacketError::UnknownPacketType(0x82))
        ));
    }
}
