//! Message framing and primitive push/pop
//!
//! Every message on the wire is `[type: u8][length: u32 BE][payload]`, where
//! the length counts itself but not the type byte. Integers are big-endian;
//! strings and blobs are prefixed with a `u32` byte length.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::message::{ClientMessage, Headers};
use crate::error::{DriverError, DriverResult};

/// Size of the `[type][length]` frame header.
pub const FRAME_HEADER_SIZE: usize = 5;

/// Outbound message builder.
///
/// Accumulates a whole request batch (for example one `Execute` followed by
/// a `Sync`) so it can be handed to the transport in a single write.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
    msg_start: Option<usize>,
}

impl Writer {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            msg_start: None,
        }
    }

    /// Start a message; the length slot is filled by [`Writer::end_message`].
    pub fn begin_message(&mut self, mtype: ClientMessage) {
        self.buf.put_u8(mtype as u8);
        self.msg_start = Some(self.buf.len());
        self.buf.put_u32(0);
    }

    pub fn end_message(&mut self) {
        if let Some(start) = self.msg_start.take() {
            self.fill_length(start);
        }
    }

    /// Append a `Sync` message terminating the batch.
    pub fn push_sync(&mut self) {
        self.begin_message(ClientMessage::Sync);
        self.end_message();
    }

    /// Reserve a `u32` length slot, returning its position.
    pub fn begin_length(&mut self) -> usize {
        let pos = self.buf.len();
        self.buf.put_u32(0);
        pos
    }

    /// Fill a slot reserved by [`Writer::begin_length`] with the number of
    /// bytes written after it.
    pub fn end_length(&mut self, pos: usize) {
        let len = (self.buf.len() - pos - 4) as u32;
        self.buf[pos..pos + 4].copy_from_slice(&len.to_be_bytes());
    }

    fn fill_length(&mut self, start: usize) {
        let len = (self.buf.len() - start) as u32;
        self.buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
    }

    pub fn push_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn push_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn push_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn push_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn push_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn push_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn push_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn push_f32(&mut self, v: f32) {
        self.buf.put_f32(v);
    }

    pub fn push_f64(&mut self, v: f64) {
        self.buf.put_f64(v);
    }

    /// Raw bytes with no length prefix.
    pub fn push_raw(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    /// Length-prefixed bytes.
    pub fn push_bytes(&mut self, v: &[u8]) {
        self.buf.put_u32(v.len() as u32);
        self.buf.put_slice(v);
    }

    /// Length-prefixed UTF-8 string.
    pub fn push_string(&mut self, v: &str) {
        self.push_bytes(v.as_bytes());
    }

    pub fn push_uuid(&mut self, id: &Uuid) {
        self.buf.put_slice(id.as_bytes());
    }

    pub fn push_headers(&mut self, headers: &Headers) {
        self.buf.put_u16(headers.len() as u16);
        for (key, value) in headers {
            self.buf.put_u16(*key);
            self.push_bytes(value);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Bounded cursor over an inbound payload.
///
/// Every pop checks the remaining length first, so a truncated payload is a
/// [`DriverError::Framing`] error instead of a panic.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The unread bytes.
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    fn need(&self, n: usize) -> DriverResult<()> {
        if self.buf.len() < n {
            return Err(DriverError::Framing(format!(
                "need {} bytes, only {} remaining",
                n,
                self.buf.len()
            )));
        }
        Ok(())
    }

    pub fn pop_u8(&mut self) -> DriverResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn pop_u16(&mut self) -> DriverResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn pop_u32(&mut self) -> DriverResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn pop_u64(&mut self) -> DriverResult<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn pop_i16(&mut self) -> DriverResult<i16> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn pop_i32(&mut self) -> DriverResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn pop_i64(&mut self) -> DriverResult<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn pop_f32(&mut self) -> DriverResult<f32> {
        self.need(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn pop_f64(&mut self) -> DriverResult<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    /// Take exactly `n` raw bytes.
    pub fn pop_raw(&mut self, n: usize) -> DriverResult<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Split off a sub-reader bounded to exactly `n` bytes; this reader
    /// advances past all of them regardless of how many the sub-reader uses.
    pub fn pop_slice(&mut self, n: usize) -> DriverResult<Reader<'a>> {
        Ok(Reader::new(self.pop_raw(n)?))
    }

    /// Length-prefixed bytes.
    pub fn pop_bytes(&mut self) -> DriverResult<&'a [u8]> {
        let n = self.pop_u32()? as usize;
        self.pop_raw(n)
    }

    /// Length-prefixed UTF-8 string.
    pub fn pop_string(&mut self) -> DriverResult<String> {
        let raw = self.pop_bytes()?;
        std::str::from_utf8(raw)
            .map(|s| s.to_string())
            .map_err(|e| DriverError::Framing(format!("invalid utf-8 string: {}", e)))
    }

    pub fn pop_uuid(&mut self) -> DriverResult<Uuid> {
        let raw = self.pop_raw(16)?;
        Uuid::from_slice(raw).map_err(|e| DriverError::Framing(e.to_string()))
    }

    pub fn discard(&mut self, n: usize) -> DriverResult<()> {
        self.pop_raw(n).map(|_| ())
    }

    pub fn pop_headers(&mut self) -> DriverResult<Headers> {
        let count = self.pop_u16()?;
        let mut headers = Headers::new();
        for _ in 0..count {
            let key = self.pop_u16()?;
            let value = self.pop_bytes()?;
            headers.insert(key, Bytes::copy_from_slice(value));
        }
        Ok(headers)
    }

    pub fn skip_headers(&mut self) -> DriverResult<()> {
        let count = self.pop_u16()?;
        for _ in 0..count {
            self.pop_u16()?;
            self.pop_bytes()?;
        }
        Ok(())
    }
}

/// One complete inbound message.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub mtype: u8,
    /// Payload after the length field.
    pub payload: Bytes,
}

impl RawMessage {
    pub fn reader(&self) -> Reader<'_> {
        Reader::new(&self.payload)
    }
}

/// Size of the first complete frame in `buf`, `Ok(None)` if more bytes are
/// needed, or an error if the declared length is malformed.
pub fn frame_len(buf: &[u8], max_message_size: usize) -> DriverResult<Option<usize>> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    let declared = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    if declared < 4 {
        return Err(DriverError::Framing(format!(
            "invalid message length {} for message type 0x{:02x}",
            declared, buf[0]
        )));
    }
    if declared > max_message_size {
        return Err(DriverError::Framing(format!(
            "message of {} bytes exceeds the {} byte limit",
            declared, max_message_size
        )));
    }
    let total = declared + 1;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some(total))
}

/// Pop one complete message off the front of `buf`.
///
/// Fails with a framing error when fewer bytes than the declared length are
/// available; the caller is expected to read more and try again.
pub fn pop_message(buf: &mut BytesMut, max_message_size: usize) -> DriverResult<RawMessage> {
    match frame_len(buf, max_message_size)? {
        Some(total) => {
            let frame = buf.split_to(total).freeze();
            Ok(RawMessage {
                mtype: frame[0],
                payload: frame.slice(FRAME_HEADER_SIZE..),
            })
        }
        None => Err(DriverError::Framing(format!(
            "incomplete message: {} bytes available",
            buf.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_length_includes_itself() {
        let mut w = Writer::new();
        w.begin_message(ClientMessage::Prepare);
        w.push_u16(0);
        w.push_string("select 1");
        w.end_message();

        let bytes = w.as_slice();
        assert_eq!(bytes[0], b'P');
        let len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        assert_eq!(len, bytes.len() - 1);
        assert_eq!(len, 4 + 2 + 4 + 8);
    }

    #[test]
    fn test_sync_batch() {
        let mut w = Writer::new();
        w.begin_message(ClientMessage::Execute);
        w.push_u16(0);
        w.end_message();
        w.push_sync();

        assert_eq!(&w.as_slice()[7..], &[b'S', 0, 0, 0, 4]);
    }

    #[test]
    fn test_primitive_round_trip() {
        let id = Uuid::from_u128(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10);
        let mut w = Writer::new();
        w.push_u8(7);
        w.push_u16(0xBEEF);
        w.push_u32(0xDEAD_BEEF);
        w.push_u64(u64::MAX - 1);
        w.push_i16(-2);
        w.push_string("héllo");
        w.push_bytes(&[1, 2, 3]);
        w.push_uuid(&id);

        let mut r = Reader::new(w.as_slice());
        assert_eq!(r.pop_u8().unwrap(), 7);
        assert_eq!(r.pop_u16().unwrap(), 0xBEEF);
        assert_eq!(r.pop_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.pop_u64().unwrap(), u64::MAX - 1);
        assert_eq!(r.pop_i16().unwrap(), -2);
        assert_eq!(r.pop_string().unwrap(), "héllo");
        assert_eq!(r.pop_bytes().unwrap(), &[1, 2, 3]);
        assert_eq!(r.pop_uuid().unwrap(), id);
        assert!(r.is_empty());
    }

    #[test]
    fn test_short_read_is_framing_error() {
        let mut r = Reader::new(&[0, 0, 0, 9, 1, 2]);
        let err = r.pop_bytes().unwrap_err();
        assert!(matches!(err, DriverError::Framing(_)));
    }

    #[test]
    fn test_pop_slice_advances_full_length() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut r = Reader::new(&data);
        let mut sub = r.pop_slice(4).unwrap();
        assert_eq!(sub.pop_u8().unwrap(), 1);
        assert_eq!(r.pop_u8().unwrap(), 5);
        assert!(sub.pop_raw(4).is_err());
    }

    #[test]
    fn test_headers_round_trip() {
        let mut headers = Headers::new();
        headers.insert(0xFF01, Bytes::from_static(b"100"));
        headers.insert(0x0002, Bytes::from_static(b""));

        let mut w = Writer::new();
        w.push_headers(&headers);
        let mut r = Reader::new(w.as_slice());
        assert_eq!(r.pop_headers().unwrap(), headers);
    }

    #[test]
    fn test_pop_message_incomplete() {
        let mut buf = BytesMut::from(&[b'Z', 0, 0, 0, 7, 0, 0][..]);
        assert!(matches!(
            pop_message(&mut buf, 1024),
            Err(DriverError::Framing(_))
        ));
        assert_eq!(frame_len(&buf, 1024).unwrap(), None);

        buf.extend_from_slice(&[b'I', b'C']);
        let msg = pop_message(&mut buf, 1024).unwrap();
        assert_eq!(msg.mtype, b'Z');
        assert_eq!(&msg.payload[..], &[0, 0, b'I']);
        assert_eq!(&buf[..], &[b'C']);
    }

    #[test]
    fn test_pop_message_rejects_bad_lengths() {
        let mut buf = BytesMut::from(&[b'D', 0, 0, 0, 2][..]);
        assert!(pop_message(&mut buf, 1024).is_err());

        let mut buf = BytesMut::from(&[b'D', 0, 1, 0, 0][..]);
        assert!(frame_len(&buf, 1024).is_err());
        assert!(pop_message(&mut buf, 1024).is_err());
    }
}
