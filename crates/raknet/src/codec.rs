//! Primitive wire types.
//!
//! Integers and floats are big-endian. Triads (`u24`) are little-endian, which is how
//! RakNet writes datagram sequence numbers and reliability indices. Strings carry a
//! big-endian `u16` byte count followed by raw UTF-8 with no terminator.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use bytes::{BufMut, Bytes, BytesMut};
use glam::Vec3;

/// Marker carried by every offline (pre-session) message.
pub const MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56,
    0x78,
];

pub const U24_MAX: u32 = 0x00ff_ffff;

const IPV4_ADDRESS_LEN: usize = 7;
const AF_INET6: u16 = 23;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },
    #[error("string is not valid utf-8")]
    MalformedString,
    #[error("unsupported address version {0}")]
    UnsupportedAddress(u8),
    #[error("offline magic mismatch")]
    BadMagic,
}

#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(CodecError::TruncatedInput { needed, remaining });
        }
        let slice = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    /// Little-endian triad.
    pub fn read_u24(&mut self) -> Result<u32, CodecError> {
        let [b0, b1, b2] = self.take_array::<3>()?;
        Ok(u32::from_le_bytes([b0, b1, b2, 0]))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u16()? as usize;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| CodecError::MalformedString)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.take(len)
    }

    /// Everything left after the cursor.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn read_magic(&mut self) -> Result<(), CodecError> {
        if self.take(MAGIC.len())? != MAGIC {
            return Err(CodecError::BadMagic);
        }
        Ok(())
    }

    pub fn read_address(&mut self) -> Result<SocketAddr, CodecError> {
        match self.read_u8()? {
            4 => {
                let [a, b, c, d] = self.take_array::<4>()?;
                let ip = Ipv4Addr::new(!a, !b, !c, !d);
                let port = self.read_u16()?;
                Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
            }
            6 => {
                // sockaddr_in6 layout: family is host order, the rest network order.
                let _family = u16::from_le_bytes(self.take_array()?);
                let port = self.read_u16()?;
                let flowinfo = self.read_u32()?;
                let ip = Ipv6Addr::from(self.take_array::<16>()?);
                let scope_id = self.read_u32()?;
                Ok(SocketAddr::V6(SocketAddrV6::new(ip, port, flowinfo, scope_id)))
            }
            other => Err(CodecError::UnsupportedAddress(other)),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    /// Little-endian triad; bits above 24 are discarded.
    pub fn put_u24(&mut self, value: u32) {
        self.buf.put_uint_le(u64::from(value & U24_MAX), 3);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    pub fn put_vec3(&mut self, value: Vec3) {
        self.put_f32(value.x);
        self.put_f32(value.y);
        self.put_f32(value.z);
    }

    /// Strings longer than `u16::MAX` bytes are cut at that length.
    pub fn put_string(&mut self, value: &str) {
        let raw = value.as_bytes();
        let len = raw.len().min(u16::MAX as usize);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&raw[..len]);
    }

    pub fn put_bytes(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    pub fn put_zeroes(&mut self, count: usize) {
        self.buf.put_bytes(0, count);
    }

    pub fn put_magic(&mut self) {
        self.buf.put_slice(&MAGIC);
    }

    pub fn put_address(&mut self, addr: &SocketAddr) {
        match addr {
            SocketAddr::V4(v4) => {
                self.buf.reserve(IPV4_ADDRESS_LEN);
                self.put_u8(4);
                for octet in v4.ip().octets() {
                    self.put_u8(!octet);
                }
                self.put_u16(v4.port());
            }
            SocketAddr::V6(v6) => {
                self.put_u8(6);
                self.buf.put_u16_le(AF_INET6);
                self.put_u16(v6.port());
                self.put_u32(v6.flowinfo());
                self.put_bytes(&v6.ip().octets());
                self.put_u32(v6.scope_id());
            }
        }
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Placeholder address used where RakNet expects a list of internal addresses.
pub fn unspecified_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_boundaries() {
        let mut w = Writer::new();
        w.put_u8(u8::MAX);
        w.put_i8(i8::MIN);
        w.put_u16(0);
        w.put_i16(i16::MIN);
        w.put_u24(U24_MAX);
        w.put_u32(u32::MAX);
        w.put_i32(i32::MIN);
        w.put_u64(u64::MAX);
        w.put_i64(i64::MIN);
        w.put_f32(-0.5);

        let bytes = w.freeze();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), u8::MAX);
        assert_eq!(r.read_i8().unwrap(), i8::MIN);
        assert_eq!(r.read_u16().unwrap(), 0);
        assert_eq!(r.read_i16().unwrap(), i16::MIN);
        assert_eq!(r.read_u24().unwrap(), U24_MAX);
        assert_eq!(r.read_u32().unwrap(), u32::MAX);
        assert_eq!(r.read_i32().unwrap(), i32::MIN);
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
        assert_eq!(r.read_i64().unwrap(), i64::MIN);
        assert_eq!(r.read_f32().unwrap(), -0.5);
        assert!(r.is_empty());
    }

    #[test]
    fn test_endianness() {
        let mut w = Writer::new();
        w.put_u16(0x0102);
        w.put_u24(0x030405);
        w.put_u32(0x06070809);
        assert_eq!(
            w.into_vec(),
            vec![0x01, 0x02, 0x05, 0x04, 0x03, 0x06, 0x07, 0x08, 0x09]
        );
    }

    #[test]
    fn test_u24_discards_high_bits() {
        let mut w = Writer::new();
        w.put_u24(0x0100_0001);
        let bytes = w.freeze();
        assert_eq!(Reader::new(&bytes).read_u24().unwrap(), 1);
    }

    #[test]
    fn test_strings() {
        let long = "x".repeat(1400);
        let mut w = Writer::new();
        w.put_string("");
        w.put_string("steve");
        w.put_string(&long);

        let bytes = w.freeze();
        assert_eq!(&bytes[..2], &[0u8, 0u8]);

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_string().unwrap(), "");
        assert_eq!(r.read_string().unwrap(), "steve");
        assert_eq!(r.read_string().unwrap(), long);
    }

    #[test]
    fn test_invalid_utf8_string() {
        let data = [0x00, 0x02, 0xc3, 0x28];
        let mut r = Reader::new(&data);
        assert_eq!(r.read_string(), Err(CodecError::MalformedString));
    }

    #[test]
    fn test_vec3_and_addresses() {
        let v4: SocketAddr = "192.168.1.20:19132".parse().unwrap();
        let v6: SocketAddr = "[::1]:19133".parse().unwrap();

        let mut w = Writer::new();
        w.put_vec3(Vec3::new(1.5, -64.0, 0.0));
        w.put_address(&v4);
        w.put_address(&v6);

        let bytes = w.freeze();
        assert_eq!(&bytes[12..17], &[4u8, !192u8, !168u8, !1u8, !20u8]);

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_vec3().unwrap(), Vec3::new(1.5, -64.0, 0.0));
        assert_eq!(r.read_address().unwrap(), v4);
        assert_eq!(r.read_address().unwrap(), v6);
    }

    #[test]
    fn test_truncated_input() {
        let data = [0x00, 0x05, b'a', b'b'];
        let mut r = Reader::new(&data);
        assert_eq!(
            r.read_string(),
            Err(CodecError::TruncatedInput {
                needed: 5,
                remaining: 2
            })
        );

        let mut r = Reader::new(&[0x01, 0x02]);
        assert!(matches!(
            r.read_u24(),
            Err(CodecError::TruncatedInput { needed: 3, .. })
        ));
    }

    #[test]
    fn test_magic() {
        let mut w = Writer::new();
        w.put_magic();
        let bytes = w.freeze();
        assert!(Reader::new(&bytes).read_magic().is_ok());

        let mut bad = bytes.to_vec();
        bad[3] = 0x01;
        assert_eq!(Reader::new(&bad).read_magic(), Err(CodecError::BadMagic));
    }

    #[test]
    fn test_unsupported_address_version() {
        let mut r = Reader::new(&[5, 0, 0, 0, 0, 0, 0]);
        assert_eq!(r.read_address(), Err(CodecError::UnsupportedAddress(5)));
    }
}
