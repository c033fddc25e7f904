use std::collections::VecDeque;
use std::time::Instant;

use super::frame::{AckRecord, Frame};

const RECENT_WINDOW: usize = 128;
pub const RELIABLE_WINDOW: usize = 512;
pub const DEFAULT_RECOVERY_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct SentDatagram {
    pub sequence: u32,
    pub send_time: Instant,
    pub frames: Vec<Frame>,
}

/// Datagrams sent but not yet acknowledged, with RTT estimation from ACK timing.
#[derive(Debug)]
pub struct RecoveryQueue {
    pending: VecDeque<SentDatagram>,
    capacity: usize,
    srtt: f32,
    rtt_var: f32,
}

impl RecoveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            srtt: 100.0,
            rtt_var: 50.0,
        }
    }

    /// Returns the datagram evicted to make room, if any.
    pub fn track(&mut self, sequence: u32, frames: Vec<Frame>) -> Option<SentDatagram> {
        let evicted = if self.pending.len() >= self.capacity {
            self.pending.pop_front()
        } else {
            None
        };

        self.pending.push_back(SentDatagram {
            sequence,
            send_time: Instant::now(),
            frames,
        });

        evicted
    }

    /// Releases acknowledged datagrams and returns how many were released.
    pub fn process_ack(&mut self, records: &[AckRecord]) -> usize {
        let now = Instant::now();
        let acked = self.take_covered(records);

        for sent in &acked {
            let rtt = now.duration_since(sent.send_time).as_secs_f32() * 1000.0;
            self.update_rtt(rtt);
        }

        acked.len()
    }

    /// Removes negatively acknowledged datagrams and hands back their frames for resending.
    pub fn process_nak(&mut self, records: &[AckRecord]) -> Vec<Frame> {
        self.take_covered(records)
            .into_iter()
            .flat_map(|sent| sent.frames)
            .collect()
    }

    // Cost is queue length times record count, independent of range width.
    fn take_covered(&mut self, records: &[AckRecord]) -> Vec<SentDatagram> {
        if records.is_empty() || self.pending.is_empty() {
            return Vec::new();
        }

        let (covered, kept): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|sent| records.iter().any(|r| r.contains(sent.sequence)));
        self.pending = VecDeque::from(kept);

        covered
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.len()
    }
}

/// Remembers recently seen inbound sequence numbers to filter duplicates. Used both for
/// datagram sequences and for reliable message indices.
#[derive(Debug)]
pub struct ReceiveTracker {
    last_received: Option<u32>,
    recent_sequences: VecDeque<u32>,
    max_recent: usize,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self::with_window(RECENT_WINDOW)
    }

    pub fn with_window(max_recent: usize) -> Self {
        Self {
            last_received: None,
            recent_sequences: VecDeque::with_capacity(max_recent),
            max_recent,
        }
    }

    /// Returns false for a sequence already seen inside the window.
    pub fn record_received(&mut self, sequence: u32) -> bool {
        if self.recent_sequences.contains(&sequence) {
            return false;
        }

        if self.recent_sequences.len() >= self.max_recent {
            self.recent_sequences.pop_front();
        }
        self.recent_sequences.push_back(sequence);
        self.last_received = Some(sequence);

        true
    }

    pub fn last_received(&self) -> Option<u32> {
        self.last_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{MAX_ACK_RANGE, MAX_ACK_RECORDS};
    use bytes::Bytes;
    use std::time::Duration;

    fn frame(index: u32) -> Frame {
        Frame::reliable_ordered(index, index, Bytes::from_static(&[0x85]))
    }

    #[test]
    fn test_duplicate_detection() {
        let mut tracker = ReceiveTracker::new();

        assert!(tracker.record_received(1));
        assert!(!tracker.record_received(1));
        assert!(tracker.record_received(2));
        assert_eq!(tracker.last_received(), Some(2));
    }

    #[test]
    fn test_out_of_order_is_accepted() {
        let mut tracker = ReceiveTracker::new();

        assert!(tracker.record_received(3));
        assert!(tracker.record_received(1));
        assert!(tracker.record_received(2));
        assert_eq!(tracker.last_received(), Some(2));
    }

    #[test]
    fn test_window_forgets_old_sequences() {
        let mut tracker = ReceiveTracker::new();

        for sequence in 0..=RECENT_WINDOW as u32 {
            assert!(tracker.record_received(sequence));
        }
        assert!(tracker.record_received(0));
    }

    #[test]
    fn test_recovery_ack_rtt() {
        let mut queue = RecoveryQueue::new(32);

        queue.track(1, vec![frame(0)]);
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(queue.process_ack(&[AckRecord { start: 1, end: 2 }]), 1);
        assert_eq!(queue.unacked_count(), 0);
        assert!(queue.srtt() > 0.0);
    }

    #[test]
    fn test_recovery_nak_returns_frames() {
        let mut queue = RecoveryQueue::new(32);

        queue.track(0, vec![frame(0), frame(1)]);
        queue.track(1, vec![frame(2)]);

        let frames = queue.process_nak(&[AckRecord::single(0)]);
        assert_eq!(frames, vec![frame(0), frame(1)]);
        assert_eq!(queue.unacked_count(), 1);
        assert!(queue.process_nak(&[AckRecord::single(0)]).is_empty());
    }

    #[test]
    fn test_wide_ack_ranges_release_only_tracked() {
        let mut queue = RecoveryQueue::new(DEFAULT_RECOVERY_CAPACITY);
        for sequence in 0..DEFAULT_RECOVERY_CAPACITY as u32 {
            queue.track(sequence, vec![frame(sequence)]);
        }

        let far: Vec<AckRecord> = (0..MAX_ACK_RECORDS as u32)
            .map(|i| AckRecord {
                start: 100_000 + i * (MAX_ACK_RANGE + 1),
                end: 100_000 + i * (MAX_ACK_RANGE + 1) + MAX_ACK_RANGE,
            })
            .collect();
        let started = Instant::now();
        assert_eq!(queue.process_ack(&far), 0);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(queue.unacked_count(), DEFAULT_RECOVERY_CAPACITY);

        let released = queue.process_ack(&[
            AckRecord { start: 10, end: 19 },
            AckRecord { start: 500, end: 500 + MAX_ACK_RANGE },
        ]);
        assert_eq!(released, 10 + 12);
        assert_eq!(queue.unacked_count(), DEFAULT_RECOVERY_CAPACITY - 22);

        let frames = queue.process_nak(&[AckRecord { start: 0, end: MAX_ACK_RANGE }]);
        assert_eq!(frames.len(), DEFAULT_RECOVERY_CAPACITY - 22);
        assert_eq!(queue.unacked_count(), 0);
    }

    #[test]
    fn test_recovery_capacity_evicts_oldest() {
        let mut queue = RecoveryQueue::new(2);

        assert!(queue.track(0, vec![frame(0)]).is_none());
        assert!(queue.track(1, vec![frame(1)]).is_none());
        let evicted = queue.track(2, vec![frame(2)]).unwrap();

        assert_eq!(evicted.sequence, 0);
        assert_eq!(queue.unacked_count(), 2);
    }
}
