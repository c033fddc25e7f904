mod connection;
mod control;
mod endpoint;
mod frame;
mod handler;
mod handshake;
mod offline;
mod protocol;
mod server;
mod session;
mod split;
mod stats;
mod tracking;

pub use connection::{DEFAULT_TIMEOUT_SECS, SessionTable};
pub use control::ControlPacket;
pub use endpoint::NetworkEndpoint;
pub use frame::{AckRecord, Datagram, DatagramFlags, Frame, OrderInfo, Reliability, SplitInfo};
pub use handler::{CloseReason, ConnectionHandler};
pub use handshake::{HandshakeOutcome, ServerIdentity, handle_unconnected};
pub use offline::{OfflinePacket, is_offline_id};
pub use protocol::{
    DEFAULT_MTU, DEFAULT_PORT, MAX_MTU, MIN_MTU, PacketError, PacketId, RAKNET_PROTOCOL_VERSION,
    UDP_HEADER_OVERHEAD,
};
pub use server::{TransportError, TransportServer};
pub use session::{Session, SessionState};
pub use stats::NetworkStats;
