use std::net::SocketAddr;

use bytes::Bytes;

use crate::codec::{Reader, Writer};

use super::protocol::{PacketError, UDP_HEADER_OVERHEAD};

pub const UNCONNECTED_PING: u8 = 0x01;
pub const UNCONNECTED_PING_OPEN_CONNECTIONS: u8 = 0x02;
pub const OPEN_CONNECTION_REQUEST_1: u8 = 0x05;
pub const OPEN_CONNECTION_REPLY_1: u8 = 0x06;
pub const OPEN_CONNECTION_REQUEST_2: u8 = 0x07;
pub const OPEN_CONNECTION_REPLY_2: u8 = 0x08;
pub const NO_FREE_INCOMING_CONNECTIONS: u8 = 0x14;
pub const UNCONNECTED_PONG: u8 = 0x1C;

/// Connected datagrams always carry the high bit in their flags byte; offline ids never do.
#[inline]
pub fn is_offline_id(first_byte: u8) -> bool {
    first_byte & 0x80 == 0
}

/// Messages exchanged before a session exists.
#[derive(Debug, Clone, PartialEq)]
pub enum OfflinePacket {
    UnconnectedPing {
        time: u64,
    },
    /// Uptime trails the status string, so clients that stop after the string still parse it.
    UnconnectedPong {
        time: u64,
        server_guid: u64,
        status: String,
        uptime_ms: u64,
    },
    OpenConnectionRequest1 {
        protocol: u8,
        mtu: u16,
    },
    OpenConnectionReply1 {
        server_guid: u64,
        mtu: u16,
    },
    OpenConnectionRequest2 {
        server_addr: SocketAddr,
        mtu: u16,
        client_id: i64,
    },
    OpenConnectionReply2 {
        server_guid: u64,
        client_addr: SocketAddr,
        mtu: u16,
    },
    NoFreeIncomingConnections {
        server_guid: u64,
    },
}

impl OfflinePacket {
    pub fn id(&self) -> u8 {
        match self {
            OfflinePacket::UnconnectedPing { .. } => UNCONNECTED_PING,
            OfflinePacket::UnconnectedPong { .. } => UNCONNECTED_PONG,
            OfflinePacket::OpenConnectionRequest1 { .. } => OPEN_CONNECTION_REQUEST_1,
            OfflinePacket::OpenConnectionReply1 { .. } => OPEN_CONNECTION_REPLY_1,
            OfflinePacket::OpenConnectionRequest2 { .. } => OPEN_CONNECTION_REQUEST_2,
            OfflinePacket::OpenConnectionReply2 { .. } => OPEN_CONNECTION_REPLY_2,
            OfflinePacket::NoFreeIncomingConnections { .. } => NO_FREE_INCOMING_CONNECTIONS,
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        let id = r.read_u8()?;

        let packet = match id {
            UNCONNECTED_PING | UNCONNECTED_PING_OPEN_CONNECTIONS => {
                let time = r.read_u64()?;
                r.read_magic()?;
                OfflinePacket::UnconnectedPing { time }
            }
            UNCONNECTED_PONG => {
                let time = r.read_u64()?;
                let server_guid = r.read_u64()?;
                r.read_magic()?;
                let status = r.read_string()?;
                let uptime_ms = if r.is_empty() { 0 } else { r.read_u64()? };
                OfflinePacket::UnconnectedPong {
                    time,
                    server_guid,
                    status,
                    uptime_ms,
                }
            }
            OPEN_CONNECTION_REQUEST_1 => {
                r.read_magic()?;
                let protocol = r.read_u8()?;
                // The rest is zero padding sized to probe the path MTU.
                let mtu = (data.len() + UDP_HEADER_OVERHEAD).min(u16::MAX as usize) as u16;
                r.read_rest();
                OfflinePacket::OpenConnectionRequest1 { protocol, mtu }
            }
            OPEN_CONNECTION_REPLY_1 => {
                r.read_magic()?;
                let server_guid = r.read_u64()?;
                let _security = r.read_bool()?;
                let mtu = r.read_u16()?;
                OfflinePacket::OpenConnectionReply1 { server_guid, mtu }
            }
            OPEN_CONNECTION_REQUEST_2 => {
                r.read_magic()?;
                let server_addr = r.read_address()?;
                let mtu = r.read_u16()?;
                let client_id = r.read_i64()?;
                OfflinePacket::OpenConnectionRequest2 {
                    server_addr,
                    mtu,
                    client_id,
                }
            }
            OPEN_CONNECTION_REPLY_2 => {
                r.read_magic()?;
                let server_guid = r.read_u64()?;
                let client_addr = r.read_address()?;
                let mtu = r.read_u16()?;
                let _security = r.read_bool()?;
                OfflinePacket::OpenConnectionReply2 {
                    server_guid,
                    client_addr,
                    mtu,
                }
            }
            NO_FREE_INCOMING_CONNECTIONS => {
                r.read_magic()?;
                let server_guid = r.read_u64()?;
                OfflinePacket::NoFreeIncomingConnections { server_guid }
            }
            other => return Err(PacketError::UnknownOfflineId(other)),
        };

        Ok(packet)
    }

    pub fn encode(&self) -> Bytes {
        let mut w = Writer::with_capacity(64);
        w.put_u8(self.id());

        match self {
            OfflinePacket::UnconnectedPing { time } => {
                w.put_u64(*time);
                w.put_magic();
            }
            OfflinePacket::UnconnectedPong {
                time,
                server_guid,
                status,
                uptime_ms,
            } => {
                w.put_u64(*time);
                w.put_u64(*server_guid);
                w.put_magic();
                w.put_string(status);
                w.put_u64(*uptime_ms);
            }
            OfflinePacket::OpenConnectionRequest1 { protocol, mtu } => {
                w.put_magic();
                w.put_u8(*protocol);
                let padded = (*mtu as usize).saturating_sub(UDP_HEADER_OVERHEAD);
                w.put_zeroes(padded.saturating_sub(w.len()));
            }
            OfflinePacket::OpenConnectionReply1 { server_guid, mtu } => {
                w.put_magic();
                w.put_u64(*server_guid);
                w.put_bool(false);
                w.put_u16(*mtu);
            }
            OfflinePacket::OpenConnectionRequest2 {
                server_addr,
                mtu,
                client_id,
            } => {
                w.put_magic();
                w.put_address(server_addr);
                w.put_u16(*mtu);
                w.put_i64(*client_id);
            }
            OfflinePacket::OpenConnectionReply2 {
                server_guid,
                client_addr,
                mtu,
            } => {
                w.put_magic();
                w.put_u64(*server_guid);
                w.put_address(client_addr);
                w.put_u16(*mtu);
                w.put_bool(false);
            }
            OfflinePacket::NoFreeIncomingConnections { server_guid } => {
                w.put_magic();
                w.put_u64(*server_guid);
            }
        }

        w.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;

    #[test]
    fn test_request1_mtu_from_padding() {
        let packet = OfflinePacket::OpenConnectionRequest1 {
            protocol: 5,
            mtu: 1492,
        };
        let bytes = packet.encode();
        assert_eq!(bytes.len(), 1492 - UDP_HEADER_OVERHEAD);
        assert_eq!(OfflinePacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_pong_layout() {
        let pong = OfflinePacket::UnconnectedPong {
            time: 1000,
            server_guid: 0x1122334455667788,
            status: "MCCPP;Demo;test".into(),
            uptime_ms: 4242,
        };
        let bytes = pong.encode();

        assert_eq!(bytes[0], UNCONNECTED_PONG);
        assert_eq!(&bytes[1..9], &1000u64.to_be_bytes());
        assert_eq!(&bytes[9..17], &0x1122334455667788u64.to_be_bytes());
        assert_eq!(&bytes[bytes.len() - 8..], &4242u64.to_be_bytes());
        assert_eq!(OfflinePacket::decode(&bytes).unwrap(), pong);

        // a pong without the trailing uptime still decodes
        let short = &bytes[..bytes.len() - 8];
        assert!(matches!(
            OfflinePacket::decode(short).unwrap(),
            OfflinePacket::UnconnectedPong { uptime_ms: 0, .. }
        ));
    }

    #[test]
    fn test_request2_and_reply2() {
        let request = OfflinePacket::OpenConnectionRequest2 {
            server_addr: "10.0.0.1:19132".parse().unwrap(),
            mtu: 1492,
            client_id: -77,
        };
        assert_eq!(OfflinePacket::decode(&request.encode()).unwrap(), request);

        let reply = OfflinePacket::OpenConnectionReply2 {
            server_guid: 42,
            client_addr: "10.0.0.2:50000".parse().unwrap(),
            mtu: 1492,
        };
        assert_eq!(OfflinePacket::decode(&reply.encode()).unwrap(), reply);
    }

    #[test]
    fn test_open_connections_ping_is_a_ping() {
        let mut bytes = OfflinePacket::UnconnectedPing { time: 5 }.encode().to_vec();
        bytes[0] = UNCONNECTED_PING_OPEN_CONNECTIONS;
        assert_eq!(
            OfflinePacket::decode(&bytes).unwrap(),
            OfflinePacket::UnconnectedPing { time: 5 }
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            OfflinePacket::decode(&[0x42]),
            Err(PacketError::UnknownOfflineId(0x42))
        ));
        assert!(matches!(
            OfflinePacket::decode(&[UNCONNECTED_PING, 0, 0]),
            Err(PacketError::Codec(CodecError::TruncatedInput { .. }))
        ));

        let mut bad_magic = OfflinePacket::UnconnectedPing { time: 1 }.encode().to_vec();
        bad_magic[10] ^= 0xff;
        assert!(matches!(
            OfflinePacket::decode(&bad_magic),
            Err(PacketError::Codec(CodecError::BadMagic))
        ));
    }

    #[test]
    fn test_offline_id_detection() {
        assert!(is_offline_id(UNCONNECTED_PING));
        assert!(is_offline_id(OPEN_CONNECTION_REQUEST_2));
        assert!(!is_offline_id(0x84));
        assert!(!is_offline_id(0xC0));
    }
}
