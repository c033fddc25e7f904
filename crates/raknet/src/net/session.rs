use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, info, warn};

use super::control::ControlPacket;
use super::frame::{AckRecord, Datagram, Frame, SPLIT_HEADER_SIZE, SplitInfo};
use super::handler::CloseReason;
use super::handshake::ServerIdentity;
use super::protocol::{
    DATAGRAM_HEADER_SIZE, MAX_SPLIT_COUNT, PacketError, PacketId, UDP_HEADER_OVERHEAD, u24_next,
};
use super::split::SplitAssembler;
use super::tracking::{DEFAULT_RECOVERY_CAPACITY, RELIABLE_WINDOW, ReceiveTracker, RecoveryQueue};

/// Header size of a reliable ordered frame without split info.
const RELIABLE_ORDERED_HEADER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Closing,
    Closed,
}

/// What one inbound datagram produced: the ACK to send right away and the payloads for the handler.
#[derive(Debug, Default)]
pub(crate) struct Inbound {
    pub ack: Option<Bytes>,
    pub payloads: Vec<Bytes>,
}

/// Reliability state for one connected remote endpoint.
#[derive(Debug)]
pub struct Session {
    addr: SocketAddr,
    client_id: i64,
    client_guid: Option<u64>,
    mtu: u16,
    state: SessionState,
    close_reason: Option<CloseReason>,
    opened_at: Instant,
    last_activity: Instant,
    send_sequence: u32,
    message_index: u32,
    order_index: u32,
    split_id: u16,
    outbound: VecDeque<Bytes>,
    resend: VecDeque<Frame>,
    receive_tracker: ReceiveTracker,
    reliable_tracker: ReceiveTracker,
    recovery: RecoveryQueue,
    splits: SplitAssembler,
}

impl Session {
    pub fn new(addr: SocketAddr, client_id: i64, mtu: u16) -> Self {
        let now = Instant::now();
        Self {
            addr,
            client_id,
            client_guid: None,
            mtu,
            state: SessionState::Connected,
            close_reason: None,
            opened_at: now,
            last_activity: now,
            send_sequence: 0,
            message_index: 0,
            order_index: 0,
            split_id: 0,
            outbound: VecDeque::new(),
            resend: VecDeque::new(),
            receive_tracker: ReceiveTracker::new(),
            reliable_tracker: ReceiveTracker::with_window(RELIABLE_WINDOW),
            recovery: RecoveryQueue::new(DEFAULT_RECOVERY_CAPACITY),
            splits: SplitAssembler::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    /// GUID announced by the client in its connection request, once received.
    pub fn client_guid(&self) -> Option<u64> {
        self.client_guid
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn connected_for(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub fn rtt_ms(&self) -> f32 {
        self.recovery.srtt()
    }

    pub fn unacked_count(&self) -> usize {
        self.recovery.unacked_count()
    }

    pub fn pending_count(&self) -> usize {
        self.outbound.len() + self.resend.len()
    }

    /// Queues a logical packet (id byte first) for the next flush.
    pub fn send(&mut self, payload: impl Into<Bytes>) {
        let payload = payload.into();
        if !self.is_connected() {
            debug!("Dropping send to {} in state {:?}", self.addr, self.state);
            return;
        }
        if payload.is_empty() {
            return;
        }
        self.outbound.push_back(payload);
    }

    /// Tells the remote we are leaving and closes the session at the next sweep.
    pub fn disconnect(&mut self) {
        if !self.is_connected() {
            return;
        }
        self.outbound.push_back(ControlPacket::Disconnect.encode());
        self.close(CloseReason::Disconnected);
    }

    pub(crate) fn close(&mut self, reason: CloseReason) {
        if self.state == SessionState::Connected {
            self.state = SessionState::Closing;
            self.close_reason = Some(reason);
        }
    }

    pub(crate) fn mark_closed(&mut self) -> CloseReason {
        self.state = SessionState::Closed;
        *self.close_reason.get_or_insert(CloseReason::Disconnected)
    }

    pub(crate) fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    /// Processes one connected datagram. Decode failures leave the session untouched apart
    /// from its activity timestamp.
    pub(crate) fn handle_datagram(
        &mut self,
        data: &[u8],
        identity: &ServerIdentity,
    ) -> Result<Inbound, PacketError> {
        self.last_activity = Instant::now();

        match Datagram::decode(data)? {
            Datagram::Ack(records) => {
                let released = self
                    .recovery
                    .process_ack(&records);
                debug!("{} acknowledged {} datagrams", self.addr, released);
                Ok(Inbound::default())
            }
            Datagram::Nak(records) => {
                let frames = self
                    .recovery
                    .process_nak(&records);
                debug!("{} requested {} frames again", self.addr, frames.len());
                self.resend.extend(frames);
                Ok(Inbound::default())
            }
            Datagram::Data { sequence, frames } => {
                let ack = Some(Datagram::Ack(vec![AckRecord::single(sequence)]).encode());

                if !self.receive_tracker.record_received(sequence) {
                    debug!("Duplicate datagram {} from {}", sequence, self.addr);
                    return Ok(Inbound {
                        ack,
                        payloads: Vec::new(),
                    });
                }

                let mut payloads = Vec::new();
                for frame in frames {
                    if !self.is_connected() {
                        break;
                    }
                    if self.is_resent_reliable(&frame) {
                        debug!(
                            "Duplicate reliable frame {:?} from {}",
                            frame.message_index, self.addr
                        );
                        continue;
                    }
                    match self.splits.insert(frame) {
                        Ok(Some(frame)) => {
                            self.handle_payload(frame.payload, identity, &mut payloads)
                        }
                        Ok(None) => {}
                        Err(e) => debug!("Dropping split frame from {}: {}", self.addr, e),
                    }
                }

                Ok(Inbound { ack, payloads })
            }
        }
    }

    fn is_resent_reliable(&mut self, frame: &Frame) -> bool {
        match frame.message_index {
            Some(index) if frame.reliability.is_reliable() => {
                !self.reliable_tracker.record_received(index)
            }
            _ => false,
        }
    }

    fn handle_payload(&mut self, payload: Bytes, identity: &ServerIdentity, out: &mut Vec<Bytes>) {
        let Some(&first) = payload.first() else {
            return;
        };

        let id = match PacketId::try_from(first) {
            Ok(id) => id,
            Err(e) => {
                debug!("Skipping frame from {}: {}", self.addr, e);
                return;
            }
        };

        if !id.is_transport_control() {
            out.push(payload);
            return;
        }

        let control = match ControlPacket::decode(&payload) {
            Ok(control) => control,
            Err(e) => {
                warn!("Malformed {:?} from {}: {}", id, self.addr, e);
                return;
            }
        };

        match control {
            ControlPacket::ConnectedPing { time } => {
                let pong = ControlPacket::ConnectedPong {
                    ping_time: time,
                    pong_time: identity.uptime_ms(),
                };
                self.outbound.push_back(pong.encode());
            }
            ControlPacket::ConnectedPong { ping_time, .. } => {
                debug!("Pong from {} for ping at {}", self.addr, ping_time);
            }
            ControlPacket::ConnectionRequest { client_guid, time } => {
                self.client_guid = Some(client_guid);
                let accepted = ControlPacket::ConnectionRequestAccepted {
                    client_addr: self.addr,
                    request_time: time,
                    accepted_time: identity.uptime_ms(),
                };
                self.outbound.push_back(accepted.encode());
            }
            ControlPacket::ConnectionRequestAccepted { .. } => {
                debug!("Unexpected ConnectionRequestAccepted from {}", self.addr);
            }
            ControlPacket::NewIncomingConnection => {
                info!("{} finished connecting", self.addr);
            }
            ControlPacket::Disconnect => {
                info!("{} disconnected", self.addr);
                self.close(CloseReason::Disconnected);
            }
        }
    }

    /// Frames everything queued since the last flush into datagrams ready for the socket.
    pub fn flush(&mut self) -> Vec<Bytes> {
        if self.outbound.is_empty() && self.resend.is_empty() {
            return Vec::new();
        }

        let budget = self.datagram_budget();
        let mut frames: Vec<Frame> = self.resend.drain(..).collect();
        while let Some(payload) = self.outbound.pop_front() {
            self.frame_payload(payload, budget, &mut frames);
        }

        let mut datagrams = Vec::new();
        let mut batch: Vec<Frame> = Vec::new();
        let mut batch_len = 0;

        for frame in frames {
            let len = frame.encoded_len();
            if !batch.is_empty() && batch_len + len > budget {
                datagrams.push(self.seal(std::mem::take(&mut batch)));
                batch_len = 0;
            }
            batch_len += len;
            batch.push(frame);
        }
        if !batch.is_empty() {
            datagrams.push(self.seal(batch));
        }

        datagrams
    }

    fn datagram_budget(&self) -> usize {
        (self.mtu as usize).saturating_sub(UDP_HEADER_OVERHEAD + DATAGRAM_HEADER_SIZE)
    }

    fn frame_payload(&mut self, payload: Bytes, budget: usize, out: &mut Vec<Frame>) {
        let order_index = self.order_index;

        if payload.len() + RELIABLE_ORDERED_HEADER <= budget {
            out.push(Frame::reliable_ordered(self.next_message_index(), order_index, payload));
            self.order_index = u24_next(self.order_index);
            return;
        }

        let chunk = budget.saturating_sub(RELIABLE_ORDERED_HEADER + SPLIT_HEADER_SIZE);
        if chunk == 0 {
            warn!("MTU {} too small to send to {}", self.mtu, self.addr);
            return;
        }
        let count = payload.len().div_ceil(chunk);
        if count > MAX_SPLIT_COUNT as usize {
            warn!(
                "Dropping {} byte packet to {}: needs {} fragments",
                payload.len(),
                self.addr,
                count
            );
            return;
        }

        let id = self.split_id;
        self.split_id = self.split_id.wrapping_add(1);
        self.order_index = u24_next(self.order_index);

        for index in 0..count {
            let start = index * chunk;
            let end = (start + chunk).min(payload.len());
            let mut frame =
                Frame::reliable_ordered(self.next_message_index(), order_index, payload.slice(start..end));
            frame.split = Some(SplitInfo {
                count: count as u32,
                id,
                index: index as u32,
            });
            out.push(frame);
        }
    }

    fn next_message_index(&mut self) -> u32 {
        let index = self.message_index;
        self.message_index = u24_next(self.message_index);
        index
    }

    fn seal(&mut self, frames: Vec<Frame>) -> Bytes {
        let sequence = self.send_sequence;
        self.send_sequence = u24_next(self.send_sequence);

        let datagram = Datagram::Data {
            sequence,
            frames: frames.clone(),
        };
        let bytes = datagram.encode();

        if let Some(evicted) = self.recovery.track(sequence, frames) {
            debug!(
                "Recovery queue for {} full, forgetting datagram {}",
                self.addr, evicted.sequence
            );
        }

        bytes
    }
}
