use prost::{bytes::BufMut, DecodeError, EncodeError, Message};
use thiserror::Error;

use super::{proto, BytesBus, MessageBus};
use crate::messages::{ConversionError, PeerMessage};

/// Frames carry their length as a big-endian `u16`, which limits the size of
/// a message.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("message of {0} bytes does not fit into a frame")]
    TooLarge(usize),
    #[error("frame needs {expected} bytes, only {got} available")]
    Truncated { expected: usize, got: usize },
    #[error("could not encode message: {0}")]
    Encode(#[from] EncodeError),
    #[error("could not decode message: {0}")]
    Decode(#[from] DecodeError),
    #[error("invalid message: {0}")]
    Conversion(#[from] ConversionError),
}

#[derive(Debug)]
pub struct ProtoBufEncodingLayer<B: BytesBus> {
    pub bus: B,
}

impl<B: BytesBus> ProtoBufEncodingLayer<B> {
    pub fn new(bus: B) -> Self {
        ProtoBufEncodingLayer { bus }
    }

    /// Encode `msg` with a 2-byte length prefix instead of the varint
    /// `encode_length_delimited` would write.
    pub fn encode<T: Message>(msg: &T) -> Result<Vec<u8>, WireError> {
        let len = msg.encoded_len();
        if len > MAX_FRAME_LEN {
            return Err(WireError::TooLarge(len));
        }

        let mut buf = Vec::with_capacity(2 + len);
        buf.put_slice(&(len as u16).to_be_bytes());
        msg.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode the first frame in `buf`, returning the message and whatever
    /// follows the frame.
    pub fn decode(buf: &[u8]) -> Result<(PeerMessage, &[u8]), WireError> {
        if buf.len() < 2 {
            return Err(WireError::Truncated {
                expected: 2,
                got: buf.len(),
            });
        }
        let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        let frame = buf.get(2..2 + len).ok_or(WireError::Truncated {
            expected: 2 + len,
            got: buf.len(),
        })?;

        let envelope = proto::Envelope::decode(frame)?;
        Ok((envelope.try_into()?, &buf[2 + len..]))
    }
}

impl<B: BytesBus> MessageBus for ProtoBufEncodingLayer<B> {
    fn send_to_peer(&self, msg: PeerMessage) -> Result<(), WireError> {
        let envelope: proto::Envelope = msg.into();
        let buf = Self::encode(&envelope)?;
        self.bus.send_to_peer(&buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;

    use super::*;
    use crate::{
        abiencode::types::{Address, Hash, Signature},
        channel::{State, StateSignature},
    };

    #[derive(Debug, Default)]
    struct RecordingBus(RefCell<Vec<Vec<u8>>>);

    impl BytesBus for RecordingBus {
        fn send_to_peer(&self, msg: &[u8]) {
            self.0.borrow_mut().push(msg.to_vec());
        }
    }

    type Layer = ProtoBufEncodingLayer<RecordingBus>;

    fn proposal() -> PeerMessage {
        PeerMessage::Proposal(State::new(
            Address([1; 20]),
            2.into(),
            Address([3; 20]),
            30.into(),
            70.into(),
        ))
    }

    #[test]
    fn frame_has_length_prefix() {
        let layer = Layer::new(RecordingBus::default());
        layer.send_to_peer(proposal()).unwrap();

        let frames = layer.bus.0.borrow();
        assert_eq!(frames.len(), 1);
        let len = u16::from_be_bytes([frames[0][0], frames[0][1]]) as usize;
        assert_eq!(len + 2, frames[0].len());
    }

    #[test]
    fn messages_survive_the_wire() {
        let layer = Layer::new(RecordingBus::default());
        let msgs = [
            proposal(),
            PeerMessage::Signature(StateSignature {
                hash: Hash([7; 32]),
                sig: Signature([8; 65]),
            }),
            PeerMessage::Rejected {
                hash: Hash([9; 32]),
                reason: "balance too low".into(),
            },
        ];
        for m in msgs.iter().cloned() {
            layer.send_to_peer(m).unwrap();
        }

        // all frames back to back, as a stream would deliver them
        let stream: Vec<u8> = layer.bus.0.borrow().concat();
        let mut rest = stream.as_slice();
        for expected in msgs {
            let (msg, r) = Layer::decode(rest).unwrap();
            assert_eq!(msg, expected);
            rest = r;
        }
        assert!(rest.is_empty());
    }

    #[test]
    fn truncated_frame() {
        let envelope: proto::Envelope = proposal().into();
        let buf = Layer::encode(&envelope).unwrap();

        assert!(matches!(
            Layer::decode(&buf[..buf.len() - 1]),
            Err(WireError::Truncated { .. })
        ));
        assert!(matches!(
            Layer::decode(&buf[..1]),
            Err(WireError::Truncated { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn oversized_message_is_refused() {
        let envelope: proto::Envelope = PeerMessage::Rejected {
            hash: Hash::default(),
            reason: "x".repeat(MAX_FRAME_LEN),
        }
        .into();

        assert!(matches!(
            Layer::encode(&envelope),
            Err(WireError::TooLarge(_))
        ));
    }
}
