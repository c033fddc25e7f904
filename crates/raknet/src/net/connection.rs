use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use super::handler::CloseReason;
use super::session::Session;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Live sessions keyed by remote endpoint.
#[derive(Debug)]
pub struct SessionTable {
    sessions: HashMap<SocketAddr, Session>,
    max_sessions: usize,
    timeout: Duration,
}

impl SessionTable {
    pub fn new(max_sessions: usize) -> Self {
        Self::with_timeout(max_sessions, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(max_sessions: usize, timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
            timeout,
        }
    }

    /// Creates the session for `addr`. Returns `None` when the table is full or `addr`
    /// already has one.
    pub fn open(&mut self, addr: SocketAddr, client_id: i64, mtu: u16) -> Option<&mut Session> {
        if self.is_full() {
            return None;
        }

        match self.sessions.entry(addr) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => Some(entry.insert(Session::new(addr, client_id, mtu))),
        }
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.sessions.contains_key(addr)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Session> {
        self.sessions.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Session> {
        self.sessions.get_mut(addr)
    }

    pub(crate) fn remove(&mut self, addr: &SocketAddr) -> Option<Session> {
        self.sessions.remove(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Moves every connected session that has been silent past the timeout to closing.
    pub(crate) fn mark_timed_out(&mut self) -> Vec<SocketAddr> {
        let timeout = self.timeout;
        let mut timed_out = Vec::new();

        for session in self.sessions.values_mut() {
            if session.is_connected() && session.is_timed_out(timeout) {
                session.close(CloseReason::TimedOut);
                timed_out.push(session.addr());
            }
        }

        timed_out
    }

    pub(crate) fn closing_addrs(&self) -> Vec<SocketAddr> {
        self.sessions
            .values()
            .filter(|s| !s.is_connected())
            .map(Session::addr)
            .collect()
    }

    pub fn broadcast(&mut self, payload: &Bytes) {
        for session in self.sessions.values_mut().filter(|s| s.is_connected()) {
            session.send(payload.clone());
        }
    }

    pub fn broadcast_except(&mut self, except: SocketAddr, payload: &Bytes) {
        for session in self
            .sessions
            .values_mut()
            .filter(|s| s.is_connected() && s.addr() != except)
        {
            session.send(payload.clone());
        }
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_connected()).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::DEFAULT_MTU;
    use crate::net::session::SessionState;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_open_respects_capacity_and_uniqueness() {
        let mut table = SessionTable::new(2);

        assert!(table.open(addr(1), 1, DEFAULT_MTU).is_some());
        assert!(table.open(addr(1), 9, DEFAULT_MTU).is_none());
        assert_eq!(table.get(&addr(1)).unwrap().client_id(), 1);

        assert!(table.open(addr(2), 2, DEFAULT_MTU).is_some());
        assert!(table.is_full());
        assert!(table.open(addr(3), 3, DEFAULT_MTU).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_mark_timed_out_once() {
        let mut table = SessionTable::with_timeout(4, Duration::from_millis(1));
        table.open(addr(1), 1, DEFAULT_MTU);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(table.mark_timed_out(), vec![addr(1)]);
        assert!(table.mark_timed_out().is_empty());

        let session = table.get(&addr(1)).unwrap();
        assert_eq!(session.state(), SessionState::Closing);
        assert_eq!(session.close_reason(), Some(CloseReason::TimedOut));
        assert_eq!(table.closing_addrs(), vec![addr(1)]);
    }

    #[test]
    fn test_broadcast_skips_closing_and_excluded() {
        let mut table = SessionTable::new(4);
        table.open(addr(1), 1, DEFAULT_MTU);
        table.open(addr(2), 2, DEFAULT_MTU);
        table.open(addr(3), 3, DEFAULT_MTU);
        if let Some(session) = table.get_mut(&addr(3)) {
            session.disconnect();
        }

        table.broadcast_except(addr(1), &Bytes::from_static(&[0x85]));
        assert_eq!(table.get(&addr(1)).unwrap().pending_count(), 0);
        assert_eq!(table.get(&addr(2)).unwrap().pending_count(), 1);
        // only the queued disconnect notice
        assert_eq!(table.get(&addr(3)).unwrap().pending_count(), 1);

        table.broadcast(&Bytes::from_static(&[0x85]));
        assert_eq!(table.get(&addr(1)).unwrap().pending_count(), 1);
        assert_eq!(table.connected_count(), 2);
    }
}
