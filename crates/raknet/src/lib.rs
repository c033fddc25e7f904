pub mod codec;
pub mod config;
pub mod net;

pub use codec::{CodecError, Reader, Writer};
pub use config::{ConfigError, TransportConfig};
pub use net::{
    CloseReason, ConnectionHandler, DEFAULT_MTU, DEFAULT_PORT, PacketError, PacketId, Session,
    SessionState, SessionTable, TransportError, TransportServer,
};
