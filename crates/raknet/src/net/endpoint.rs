use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use bytes::Bytes;

use super::protocol::MAX_MTU;
use super::stats::NetworkStats;

/// The server's UDP socket. Receives block for at most the configured poll interval.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    stats: NetworkStats,
    recv_buffer: [u8; MAX_MTU as usize],
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A, poll_interval: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(poll_interval.max(Duration::from_millis(1))))?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            stats: NetworkStats::default(),
            recv_buffer: [0u8; MAX_MTU as usize],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut NetworkStats {
        &mut self.stats
    }

    pub fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let bytes = self.socket.send_to(data, addr)?;
        self.stats.record_sent(bytes);
        Ok(bytes)
    }

    /// Waits for one datagram. `Ok(None)` when the poll interval passed without one.
    pub fn receive(&mut self) -> io::Result<Option<(Bytes, SocketAddr)>> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((size, addr)) => {
                self.stats.record_received(size);
                Ok(Some((Bytes::copy_from_slice(&self.recv_buffer[..size]), addr)))
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let mut a = NetworkEndpoint::bind("127.0.0.1:0", Duration::from_millis(200)).unwrap();
        let mut b = NetworkEndpoint::bind("127.0.0.1:0", Duration::from_millis(200)).unwrap();

        a.send_to(&[1, 2, 3], b.local_addr()).unwrap();
        let (data, from) = b.receive().unwrap().unwrap();

        assert_eq!(data.as_ref(), &[1u8, 2, 3]);
        assert_eq!(from, a.local_addr());
        assert_eq!(a.stats().bytes_sent, 3);
        assert_eq!(b.stats().packets_received, 1);
    }

    #[test]
    fn test_receive_times_out_quietly() {
        let mut endpoint = NetworkEndpoint::bind("127.0.0.1:0", Duration::from_millis(5)).unwrap();
        assert!(endpoint.receive().unwrap().is_none());
    }
}
