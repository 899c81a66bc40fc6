//! Wire codecs: length-prefixed framing plus typed message decode.

pub mod framing;

pub use framing::{LENGTH_PREFIX_SIZE, LengthPrefixedFramer, MAX_FRAME_SIZE};

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::PushError;
use crate::message::Message;

/// Composes the framer with [`Message`] encode/decode so a `Framed`
/// transport yields typed messages directly.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    framer: LengthPrefixedFramer,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            framer: LengthPrefixedFramer::new(max_frame_size),
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = PushError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.framer.decode(src)? {
            Some(frame) => Ok(Some(Message::decode(&frame)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = PushError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = Bytes::from(item.encode()?);
        self.framer.encode(payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::User;

    #[test]
    fn typed_roundtrip() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        let original = Message::User(User::new("Bedroom"));
        codec.encode(original.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn garbage_discriminator_fails() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        // Hand-build a frame with an unknown discriminator.
        let mut framer = LengthPrefixedFramer::default();
        framer
            .encode(Bytes::from(0xBEEF_u32.to_be_bytes().to_vec()), &mut buf)
            .unwrap();

        assert!(matches!(
            codec.decode(&mut buf),
            Err(PushError::UnknownMessageType(0xBEEF))
        ));
    }
}
