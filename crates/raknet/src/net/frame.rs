use bitflags::bitflags;
use bytes::Bytes;

use crate::codec::{Reader, Writer};

use super::protocol::{PacketError, MAX_ACK_RANGE, MAX_ACK_RECORDS};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DatagramFlags: u8 {
        const VALID = 0x80;
        const ACK = 0x40;
        const NAK = 0x20;
        const PACKET_PAIR = 0x10;
        const CONTINUOUS_SEND = 0x08;
        const NEEDS_B_AND_AS = 0x04;
    }
}

const SPLIT_FLAG: u8 = 0x10;
pub const SPLIT_HEADER_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    Unreliable,
    UnreliableSequenced,
    Reliable,
    ReliableOrdered,
    ReliableSequenced,
    UnreliableWithAckReceipt,
    ReliableWithAckReceipt,
    ReliableOrderedWithAckReceipt,
}

impl Reliability {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Reliability::Unreliable,
            1 => Reliability::UnreliableSequenced,
            2 => Reliability::Reliable,
            3 => Reliability::ReliableOrdered,
            4 => Reliability::ReliableSequenced,
            5 => Reliability::UnreliableWithAckReceipt,
            6 => Reliability::ReliableWithAckReceipt,
            _ => Reliability::ReliableOrderedWithAckReceipt,
        }
    }

    fn bits(self) -> u8 {
        self as u8
    }

    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Reliability::Reliable
                | Reliability::ReliableOrdered
                | Reliability::ReliableSequenced
                | Reliability::ReliableWithAckReceipt
                | Reliability::ReliableOrderedWithAckReceipt
        )
    }

    pub fn is_sequenced(self) -> bool {
        matches!(
            self,
            Reliability::UnreliableSequenced | Reliability::ReliableSequenced
        )
    }

    pub fn is_ordered(self) -> bool {
        self.is_sequenced()
            || matches!(
                self,
                Reliability::ReliableOrdered | Reliability::ReliableOrderedWithAckReceipt
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitInfo {
    pub count: u32,
    pub id: u16,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderInfo {
    pub index: u32,
    pub channel: u8,
}

/// One encapsulated packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub reliability: Reliability,
    pub message_index: Option<u32>,
    pub sequence_index: Option<u32>,
    pub order: Option<OrderInfo>,
    pub split: Option<SplitInfo>,
    pub payload: Bytes,
}

impl Frame {
    pub fn reliable_ordered(message_index: u32, order_index: u32, payload: Bytes) -> Self {
        Self {
            reliability: Reliability::ReliableOrdered,
            message_index: Some(message_index),
            sequence_index: None,
            order: Some(OrderInfo {
                index: order_index,
                channel: 0,
            }),
            split: None,
            payload,
        }
    }

    pub fn header_len(&self) -> usize {
        let mut len = 3;
        if self.reliability.is_reliable() {
            len += 3;
        }
        if self.reliability.is_sequenced() {
            len += 3;
        }
        if self.reliability.is_ordered() {
            len += 4;
        }
        if self.split.is_some() {
            len += SPLIT_HEADER_SIZE;
        }
        len
    }

    pub fn encoded_len(&self) -> usize {
        self.header_len() + self.payload.len()
    }

    pub fn encode(&self, w: &mut Writer) {
        let mut flags = self.reliability.bits() << 5;
        if self.split.is_some() {
            flags |= SPLIT_FLAG;
        }
        w.put_u8(flags);
        w.put_u16((self.payload.len() * 8) as u16);

        if self.reliability.is_reliable() {
            w.put_u24(self.message_index.unwrap_or_default());
        }
        if self.reliability.is_sequenced() {
            w.put_u24(self.sequence_index.unwrap_or_default());
        }
        if self.reliability.is_ordered() {
            let order = self.order.unwrap_or(OrderInfo {
                index: 0,
                channel: 0,
            });
            w.put_u24(order.index);
            w.put_u8(order.channel);
        }
        if let Some(split) = self.split {
            w.put_u32(split.count);
            w.put_u16(split.id);
            w.put_u32(split.index);
        }

        w.put_bytes(&self.payload);
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        let flags = r.read_u8()?;
        let reliability = Reliability::from_bits(flags >> 5);
        let bit_len = r.read_u16()? as usize;
        let byte_len = bit_len.div_ceil(8);
        if byte_len == 0 {
            return Err(PacketError::MalformedFrame("empty frame payload"));
        }

        let message_index = if reliability.is_reliable() {
            Some(r.read_u24()?)
        } else {
            None
        };
        let sequence_index = if reliability.is_sequenced() {
            Some(r.read_u24()?)
        } else {
            None
        };
        let order = if reliability.is_ordered() {
            Some(OrderInfo {
                index: r.read_u24()?,
                channel: r.read_u8()?,
            })
        } else {
            None
        };
        let split = if flags & SPLIT_FLAG != 0 {
            Some(SplitInfo {
                count: r.read_u32()?,
                id: r.read_u16()?,
                index: r.read_u32()?,
            })
        } else {
            None
        };

        let payload = Bytes::copy_from_slice(r.read_bytes(byte_len)?);

        Ok(Self {
            reliability,
            message_index,
            sequence_index,
            order,
            split,
            payload,
        })
    }
}

/// Inclusive range of datagram sequence numbers inside an ACK or NAK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRecord {
    pub start: u32,
    pub end: u32,
}

impl AckRecord {
    pub fn single(sequence: u32) -> Self {
        Self {
            start: sequence,
            end: sequence,
        }
    }

    pub fn sequences(&self) -> std::ops::RangeInclusive<u32> {
        self.start..=self.end
    }

    pub fn contains(&self, sequence: u32) -> bool {
        self.start <= sequence && sequence <= self.end
    }

    /// Collapses sequence numbers into the fewest contiguous records.
    pub fn from_sequences(sequences: &[u32]) -> Vec<Self> {
        let mut sorted = sequences.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut records: Vec<AckRecord> = Vec::new();
        for sequence in sorted {
            match records.last_mut() {
                Some(last) if last.end + 1 == sequence => last.end = sequence,
                _ => records.push(AckRecord::single(sequence)),
            }
        }
        records
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    Data { sequence: u32, frames: Vec<Frame> },
    Ack(Vec<AckRecord>),
    Nak(Vec<AckRecord>),
}

impl Datagram {
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(data);
        let flags = DatagramFlags::from_bits_retain(r.read_u8()?);

        if !flags.contains(DatagramFlags::VALID) {
            return Err(PacketError::MalformedFrame("datagram without valid flag"));
        }

        if flags.contains(DatagramFlags::ACK) {
            return Ok(Datagram::Ack(decode_records(&mut r)?));
        }
        if flags.contains(DatagramFlags::NAK) {
            return Ok(Datagram::Nak(decode_records(&mut r)?));
        }

        let sequence = r.read_u24()?;
        let mut frames = Vec::new();
        while !r.is_empty() {
            frames.push(Frame::decode(&mut r)?);
        }

        Ok(Datagram::Data { sequence, frames })
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Datagram::Data { sequence, frames } => {
                let size = 4 + frames.iter().map(Frame::encoded_len).sum::<usize>();
                let mut w = Writer::with_capacity(size);
                w.put_u8((DatagramFlags::VALID | DatagramFlags::NEEDS_B_AND_AS).bits());
                w.put_u24(*sequence);
                for frame in frames {
                    frame.encode(&mut w);
                }
                w.freeze()
            }
            Datagram::Ack(records) => {
                encode_records(DatagramFlags::VALID | DatagramFlags::ACK, records)
            }
            Datagram::Nak(records) => {
                encode_records(DatagramFlags::VALID | DatagramFlags::NAK, records)
            }
        }
    }
}

fn decode_records(r: &mut Reader<'_>) -> Result<Vec<AckRecord>, PacketError> {
    let count = r.read_u16()?;
    if count as usize > MAX_ACK_RECORDS {
        return Err(PacketError::MalformedFrame("too many acknowledgement records"));
    }
    let mut records = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let single = r.read_bool()?;
        let start = r.read_u24()?;
        let end = if single { start } else { r.read_u24()? };

        if end < start || end - start > MAX_ACK_RANGE {
            return Err(PacketError::MalformedFrame("invalid acknowledgement range"));
        }
        records.push(AckRecord { start, end });
    }

    Ok(records)
}

fn encode_records(flags: DatagramFlags, records: &[AckRecord]) -> Bytes {
    let mut w = Writer::with_capacity(3 + records.len() * 7);
    w.put_u8(flags.bits());
    w.put_u16(records.len() as u16);
    for record in records {
        if record.start == record.end {
            w.put_bool(true);
            w.put_u24(record.start);
        } else {
            w.put_bool(false);
            w.put_u24(record.start);
            w.put_u24(record.end);
        }
    }
    w.freeze()
}
