mod agreement;
mod receipt;
mod state;

use core::fmt::{self, Display};

use crate::abiencode::{
    self,
    types::{Address, Hash},
};

pub use agreement::*;
pub use receipt::Receipt;
pub use state::{State, STATE_TYPE};

/// Index of a participant in the channel: `0` for `participant0`, `1` for
/// `participant1`.
pub type PartIdx = usize;

pub const PARTICIPANTS: usize = 2;

/// Identifies the channel record of an ordered participant pair.
///
/// Computed as `keccak256(abi.encodePacked(participant0, participant1))`. The
/// order matters: `(alice, bob)` and `(bob, alice)` are two independent
/// channels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub Hash);

impl ChannelId {
    pub fn new(participant0: Address, participant1: Address) -> Self {
        ChannelId(abiencode::keccak256_packed(&[
            &participant0.0,
            &participant1.0,
        ]))
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_depends_on_order() {
        let alice = Address([0xaa; 20]);
        let bob = Address([0xbb; 20]);

        assert_eq!(ChannelId::new(alice, bob), ChannelId::new(alice, bob));
        assert_ne!(ChannelId::new(alice, bob), ChannelId::new(bob, alice));
    }

    #[test]
    fn channel_id_is_packed_keccak() {
        let alice = Address([0xaa; 20]);
        let bob = Address([0xbb; 20]);

        let mut packed = [0u8; 40];
        packed[..20].copy_from_slice(&alice.0);
        packed[20..].copy_from_slice(&bob.0);

        assert_eq!(
            ChannelId::new(alice, bob).0,
            abiencode::keccak256_packed(&[&packed])
        );
    }
}
