use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::Frame;
use super::protocol::{PacketError, MAX_PENDING_SPLITS, MAX_SPLIT_COUNT};

/// Partial packets older than this are abandoned.
pub const DEFAULT_SPLIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct SplitBuffer {
    parts: Vec<Option<Bytes>>,
    received: usize,
    started: Instant,
    order: u64,
}

/// Reassembles frames that were fragmented across datagrams.
#[derive(Debug)]
pub struct SplitAssembler {
    pending: HashMap<u16, SplitBuffer>,
    timeout: Duration,
    next_order: u64,
}

impl Default for SplitAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl SplitAssembler {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SPLIT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            timeout,
            next_order: 0,
        }
    }

    /// Stores one fragment. Returns the rebuilt frame once every fragment has arrived.
    pub fn insert(&mut self, frame: Frame) -> Result<Option<Frame>, PacketError> {
        let Some(split) = frame.split else {
            return Ok(Some(frame));
        };

        if split.count == 0 || split.count > MAX_SPLIT_COUNT {
            return Err(PacketError::MalformedFrame("split count out of range"));
        }
        if split.index >= split.count {
            return Err(PacketError::MalformedFrame("split index out of range"));
        }
        self.expire(Instant::now());
        if !self.pending.contains_key(&split.id) && self.pending.len() >= MAX_PENDING_SPLITS {
            self.evict_oldest();
        }

        let order = self.next_order;
        let buffer = self.pending.entry(split.id).or_insert_with(|| SplitBuffer {
            parts: vec![None; split.count as usize],
            received: 0,
            started: Instant::now(),
            order,
        });
        if buffer.order == order {
            self.next_order += 1;
        }

        if buffer.parts.len() != split.count as usize {
            return Err(PacketError::MalformedFrame("split count changed mid-packet"));
        }

        let slot = &mut buffer.parts[split.index as usize];
        if slot.is_none() {
            *slot = Some(frame.payload.clone());
            buffer.received += 1;
        }

        if buffer.received < buffer.parts.len() {
            return Ok(None);
        }

        let Some(buffer) = self.pending.remove(&split.id) else {
            return Ok(None);
        };

        let total = buffer.parts.iter().flatten().map(Bytes::len).sum();
        let mut payload = BytesMut::with_capacity(total);
        for part in buffer.parts.into_iter().flatten() {
            payload.put(part);
        }

        Ok(Some(Frame {
            split: None,
            payload: payload.freeze(),
            ..frame
        }))
    }

    /// Drops partial packets that have waited longer than the timeout.
    pub fn expire(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let before = self.pending.len();
        self.pending
            .retain(|_, buffer| now.duration_since(buffer.started) < timeout);
        before - self.pending.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(_, buffer)| buffer.order)
            .map(|(&id, _)| id);
        if let Some(id) = oldest {
            self.pending.remove(&id);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::frame::SplitInfo;

    fn fragment(id: u16, index: u32, count: u32, payload: &'static [u8]) -> Frame {
        let mut frame = Frame::reliable_ordered(index, 0, Bytes::from_static(payload));
        frame.split = Some(SplitInfo { count, id, index });
        frame
    }

    #[test]
    fn test_reassembles_out_of_order() {
        let mut assembler = SplitAssembler::new();

        assert!(assembler.insert(fragment(1, 2, 3, b"ef")).unwrap().is_none());
        assert!(assembler.insert(fragment(1, 0, 3, b"ab")).unwrap().is_none());
        assert!(assembler.insert(fragment(1, 0, 3, b"ab")).unwrap().is_none());

        let frame = assembler.insert(fragment(1, 1, 3, b"cd")).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"abcdef");
        assert!(frame.split.is_none());
        assert_eq!(assembler.pending_count(), 0);
    }

    #[test]
    fn test_unsplit_frame_passes_through() {
        let mut assembler = SplitAssembler::new();
        let frame = Frame::reliable_ordered(0, 0, Bytes::from_static(&[0x85]));
        assert_eq!(assembler.insert(frame.clone()).unwrap(), Some(frame));
    }

    #[test]
    fn test_rejects_bad_fragments() {
        let mut assembler = SplitAssembler::new();

        assert!(assembler.insert(fragment(1, 0, 0, b"a")).is_err());
        assert!(assembler.insert(fragment(1, 3, 3, b"a")).is_err());
        assert!(assembler
            .insert(fragment(1, 0, MAX_SPLIT_COUNT + 1, b"a"))
            .is_err());

        assert!(assembler.insert(fragment(2, 0, 2, b"a")).unwrap().is_none());
        assert!(assembler.insert(fragment(2, 1, 3, b"b")).is_err());
    }

    #[test]
    fn test_full_table_evicts_oldest_partial() {
        let mut assembler = SplitAssembler::new();

        for id in 0..MAX_PENDING_SPLITS as u16 {
            assert!(assembler.insert(fragment(id, 0, 2, b"a")).unwrap().is_none());
        }

        assert!(assembler.insert(fragment(500, 0, 2, b"x")).unwrap().is_none());
        let frame = assembler.insert(fragment(500, 1, 2, b"y")).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"xy");
        assert_eq!(assembler.pending_count(), MAX_PENDING_SPLITS - 1);

        // id 0 was the oldest, so its second half starts a fresh buffer
        assert!(assembler.insert(fragment(0, 1, 2, b"b")).unwrap().is_none());
        let frame = assembler.insert(fragment(1, 1, 2, b"b")).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"ab");
    }

    #[test]
    fn test_stale_partial_is_not_reused() {
        let mut assembler = SplitAssembler::with_timeout(Duration::from_millis(1));

        assert!(assembler.insert(fragment(7, 0, 2, b"old")).unwrap().is_none());
        std::thread::sleep(Duration::from_millis(5));

        assert!(assembler.insert(fragment(7, 1, 2, b"new")).unwrap().is_none());
        assert_eq!(assembler.pending_count(), 1);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(assembler.expire(Instant::now()), 1);
        assert_eq!(assembler.pending_count(), 0);
    }
}
