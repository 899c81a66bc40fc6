//! Length-prefixed framing over a raw byte stream.
//!
//! ```text
//! frame = [length: u32 BE] [payload: length bytes]
//! ```
//!
//! A partial frame stays buffered until the remaining bytes arrive; a
//! single read may yield several complete frames. A zero-length
//! payload is a valid (empty) frame. A length header beyond the
//! configured maximum is a protocol violation that fails the
//! connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::PushError;

/// Default ceiling on a single frame's payload.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Tokio codec turning a byte stream into discrete payload buffers.
#[derive(Debug, Clone)]
pub struct LengthPrefixedFramer {
    max_frame_size: usize,
}

impl LengthPrefixedFramer {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// The configured payload ceiling.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for LengthPrefixedFramer {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for LengthPrefixedFramer {
    type Item = Bytes;
    type Error = PushError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let length = u32::from_be_bytes(prefix) as usize;

        if length > self.max_frame_size {
            return Err(PushError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        if src.len() < LENGTH_PREFIX_SIZE + length {
            // Reserve what the rest of the frame needs and wait.
            src.reserve(LENGTH_PREFIX_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<Bytes> for LengthPrefixedFramer {
    type Error = PushError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(PushError::FrameTooLarge {
                size: item.len(),
                max: self.max_frame_size,
            });
        }

        dst.reserve(LENGTH_PREFIX_SIZE + item.len());
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_frame(payload: &[u8]) -> BytesMut {
        let mut framer = LengthPrefixedFramer::default();
        let mut buf = BytesMut::new();
        framer
            .encode(Bytes::copy_from_slice(payload), &mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn roundtrip_single_frame() {
        let mut buf = encode_frame(b"hello");
        let mut framer = LengthPrefixedFramer::default();
        let frame = framer.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
        assert!(buf.is_empty());
        assert!(framer.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn empty_frame_is_valid() {
        let mut buf = encode_frame(b"");
        let mut framer = LengthPrefixedFramer::default();
        let frame = framer.decode(&mut buf).unwrap().unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn partial_frame_emits_nothing() {
        let full = encode_frame(b"split across reads");
        let mut framer = LengthPrefixedFramer::default();
        let mut buf = BytesMut::new();

        // Feed one byte at a time; exactly one frame must appear, and
        // only once every byte has arrived.
        let mut frames = Vec::new();
        for (i, byte) in full.iter().enumerate() {
            buf.put_u8(*byte);
            if let Some(frame) = framer.decode(&mut buf).unwrap() {
                assert_eq!(i, full.len() - 1);
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"split across reads");
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut buf = encode_frame(b"first");
        buf.extend_from_slice(&encode_frame(b"second"));
        buf.extend_from_slice(&encode_frame(b""));

        let mut framer = LengthPrefixedFramer::default();
        assert_eq!(&framer.decode(&mut buf).unwrap().unwrap()[..], b"first");
        assert_eq!(&framer.decode(&mut buf).unwrap().unwrap()[..], b"second");
        assert!(framer.decode(&mut buf).unwrap().unwrap().is_empty());
        assert!(framer.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversized_length_fails() {
        let mut framer = LengthPrefixedFramer::new(1024);
        let mut buf = BytesMut::new();
        buf.put_u32(2048);
        assert!(matches!(
            framer.decode(&mut buf),
            Err(PushError::FrameTooLarge { size: 2048, max: 1024 })
        ));
    }

    #[test]
    fn oversized_payload_refused_on_encode() {
        let mut framer = LengthPrefixedFramer::new(8);
        let mut buf = BytesMut::new();
        let result = framer.encode(Bytes::from(vec![0u8; 9]), &mut buf);
        assert!(matches!(result, Err(PushError::FrameTooLarge { .. })));
    }
}
