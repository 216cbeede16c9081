mod encoding;
pub mod proto;

use core::fmt::Debug;

pub use encoding::{ProtoBufEncodingLayer, WireError, MAX_FRAME_LEN};

use crate::messages::PeerMessage;

/// Carries encoded frames to the other participant.
pub trait BytesBus: Debug {
    fn send_to_peer(&self, msg: &[u8]);
}

/// Carries [PeerMessage]s to the other participant.
pub trait MessageBus: Debug {
    fn send_to_peer(&self, msg: PeerMessage) -> Result<(), WireError>;
}
