use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::{ConfigError, TransportConfig};

use super::connection::SessionTable;
use super::endpoint::NetworkEndpoint;
use super::handler::ConnectionHandler;
use super::handshake::{self, HandshakeOutcome, ServerIdentity};
use super::offline::is_offline_id;
use super::protocol::PacketError;
use super::stats::NetworkStats;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

/// Owns the socket and the session table and drives the handler.
pub struct TransportServer<H: ConnectionHandler> {
    endpoint: NetworkEndpoint,
    sessions: SessionTable,
    identity: ServerIdentity,
    handler: H,
    config: TransportConfig,
    running: Arc<AtomicBool>,
    last_tick_time: Instant,
    accumulator: Duration,
}

impl<H: ConnectionHandler> TransportServer<H> {
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, TransportError> {
        config.validate()?;

        let endpoint = NetworkEndpoint::bind(addr, config.tick_interval)?;
        let identity = ServerIdentity::new(config.server_name.clone());
        info!(
            "Listening on {} as {} (guid {:016x})",
            endpoint.local_addr(),
            identity.name(),
            identity.guid()
        );

        Ok(Self {
            endpoint,
            sessions: SessionTable::with_timeout(config.max_sessions, config.session_timeout),
            identity,
            handler,
            config,
            running: Arc::new(AtomicBool::new(true)),
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionTable {
        &mut self.sessions
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
        }
        self.close_all();
        info!("Transport stopped");
    }

    /// One loop iteration: wait for a datagram (bounded by the tick interval), then tick if due.
    pub fn tick_once(&mut self) {
        self.poll_once();

        let now = Instant::now();
        self.accumulator += now - self.last_tick_time;
        self.last_tick_time = now;

        let tick = self.config.tick_interval;
        if self.accumulator >= tick {
            self.accumulator = (self.accumulator - tick).min(tick);
            self.tick();
        }
    }

    /// Receives and dispatches at most one datagram. Returns whether one arrived.
    pub fn poll_once(&mut self) -> bool {
        match self.endpoint.receive() {
            Ok(Some((data, addr))) => {
                self.handle_datagram(&data, addr);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Receive failed: {}", e);
                false
            }
        }
    }

    pub fn handle_datagram(&mut self, data: &[u8], addr: SocketAddr) {
        let Some(&first) = data.first() else {
            return;
        };

        if is_offline_id(first) {
            self.handle_offline(data, addr);
            return;
        }

        let Some(session) = self.sessions.get_mut(&addr) else {
            debug!("{}", PacketError::SessionNotFound(addr));
            return;
        };

        match session.handle_datagram(data, &self.identity) {
            Ok(inbound) => {
                if let Some(ack) = inbound.ack {
                    send_raw(&mut self.endpoint, &ack, addr);
                }
                for payload in inbound.payloads {
                    self.handler.on_data(session, &payload);
                }
            }
            Err(e) => {
                warn!("Dropping datagram from {}: {}", addr, e);
                self.endpoint.stats_mut().record_dropped();
            }
        }
    }

    fn handle_offline(&mut self, data: &[u8], addr: SocketAddr) {
        let connected = self.sessions.contains(&addr);
        let open_sessions = self.sessions.len();

        match handshake::handle_unconnected(data, addr, &self.identity, connected, self.config.mtu) {
            HandshakeOutcome::Reply(reply) => send_raw(&mut self.endpoint, &reply, addr),
            HandshakeOutcome::Open {
                reply,
                client_id,
                mtu,
            } => match self.sessions.open(addr, client_id, mtu) {
                Some(session) => {
                    send_raw(&mut self.endpoint, &reply, addr);
                    info!("Session opened for {} (client id {})", addr, client_id);
                    self.handler.on_open(session);
                }
                None => {
                    warn!("Refusing {}: {} sessions open", addr, open_sessions);
                    let reply = handshake::no_free_connections(&self.identity);
                    send_raw(&mut self.endpoint, &reply, addr);
                }
            },
            HandshakeOutcome::Ignore => {}
        }
    }

    /// Flushes every session, runs the handler's tick, then sweeps closed sessions.
    pub fn tick(&mut self) {
        for session in self.sessions.iter_mut() {
            let addr = session.addr();
            for datagram in session.flush() {
                send_raw(&mut self.endpoint, &datagram, addr);
            }
        }

        self.handler.on_tick(&mut self.sessions);

        self.sweep();
    }

    fn sweep(&mut self) {
        for addr in self.sessions.mark_timed_out() {
            info!("Session {} timed out", addr);
        }

        for addr in self.sessions.closing_addrs() {
            let Some(session) = self.sessions.get_mut(&addr) else {
                continue;
            };

            for datagram in session.flush() {
                send_raw(&mut self.endpoint, &datagram, addr);
            }
            let reason = session.mark_closed();
            info!("Session {} closed: {}", addr, reason);
            self.handler.on_close(session, reason);

            self.sessions.remove(&addr);
        }
    }

    /// Disconnects every session and fires their close events.
    pub fn close_all(&mut self) {
        for session in self.sessions.iter_mut() {
            session.disconnect();
        }
        self.sweep();
    }
}

fn send_raw(endpoint: &mut NetworkEndpoint, data: &[u8], addr: SocketAddr) {
    if let Err(e) = endpoint.send_to(data, addr) {
        warn!("Failed to send {} bytes to {}: {}", data.len(), addr, e);
    }
}
