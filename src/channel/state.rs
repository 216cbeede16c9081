//! The candidate state two participants sign, and its canonical encoding.

use serde::Serialize;

use super::{ChannelId, PartIdx, PARTICIPANTS};
use crate::abiencode::{
    self,
    types::{Address, Hash, U256},
};

/// Solidity type string of [State]. Its Keccak-256 hash is written in front of
/// every encoded state, so a state digest can never collide with the digest
/// of some other ABI-encoded payload of the same shape.
pub const STATE_TYPE: &str = "BalancesState(address participant0,uint256 nonce,address participant1,uint256 balance0,uint256 balance1)";

/// A balance split between two participants, versioned by `nonce`.
///
/// The field order is the order of the on-ledger tuple. Fields are private:
/// a different split or nonce is a different state, created with [State::new]
/// or [State::next].
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct State {
    participant0: Address,
    nonce: U256,
    participant1: Address,
    balance0: U256,
    balance1: U256,
}

fn state_type_hash() -> Hash {
    abiencode::keccak256_packed(&[STATE_TYPE.as_bytes()])
}

impl State {
    pub fn new(
        participant0: Address,
        nonce: U256,
        participant1: Address,
        balance0: U256,
        balance1: U256,
    ) -> Self {
        State {
            participant0,
            nonce,
            participant1,
            balance0,
            balance1,
        }
    }

    /// Create the state that replaces this one: same participants, nonce
    /// incremented by one, new balances.
    ///
    /// Returns `None` if the nonce would overflow.
    pub fn next(&self, balance0: U256, balance1: U256) -> Option<Self> {
        Some(State {
            nonce: self.nonce.checked_add(U256::one())?,
            balance0,
            balance1,
            ..*self
        })
    }

    pub fn participant0(&self) -> Address {
        self.participant0
    }

    pub fn participant1(&self) -> Address {
        self.participant1
    }

    pub fn participants(&self) -> [Address; PARTICIPANTS] {
        [self.participant0, self.participant1]
    }

    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    pub fn balance0(&self) -> U256 {
        self.balance0
    }

    pub fn balance1(&self) -> U256 {
        self.balance1
    }

    pub fn balances(&self) -> [U256; PARTICIPANTS] {
        [self.balance0, self.balance1]
    }

    pub fn channel_id(&self) -> ChannelId {
        ChannelId::new(self.participant0, self.participant1)
    }

    /// Position of `who` in this state, if it participates. For a state whose
    /// participants are the same address, the first position wins.
    pub fn part_idx(&self, who: Address) -> Option<PartIdx> {
        self.participants().iter().position(|&p| p == who)
    }

    /// Whether the state is between `a` and `b`, in either order.
    pub fn is_between(&self, a: Address, b: Address) -> bool {
        (self.participant0 == a && self.participant1 == b)
            || (self.participant0 == b && self.participant1 == a)
    }

    /// `abi.encode(STATE_TYPEHASH, participant0, nonce, participant1, balance0, balance1)`
    pub fn encode(&self) -> Result<Vec<u8>, abiencode::Error> {
        abiencode::to_bytes(&(state_type_hash(), self))
    }

    /// Keccak-256 of [State::encode], the digest both participants sign.
    pub fn hash(&self) -> Result<Hash, abiencode::Error> {
        abiencode::to_hash(&(state_type_hash(), self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address([0xaa; 20])
    }

    fn bob() -> Address {
        Address([0xbb; 20])
    }

    fn state(nonce: u64, b0: u64, b1: u64) -> State {
        State::new(alice(), nonce.into(), bob(), b0.into(), b1.into())
    }

    #[test]
    fn encoding_layout() {
        let bytes = state(1, 30, 70).encode().unwrap();
        assert_eq!(bytes.len(), 6 * 32);

        assert_eq!(&bytes[..32], &state_type_hash().0);
        assert_eq!(&bytes[32 + 12..64], &alice().0);
        assert_eq!(bytes[95], 1);
        assert_eq!(&bytes[96 + 12..128], &bob().0);
        assert_eq!(bytes[159], 30);
        assert_eq!(bytes[191], 70);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(state(1, 30, 70).hash().unwrap(), state(1, 30, 70).hash().unwrap());
    }

    #[test]
    fn every_field_changes_the_hash() {
        let base = state(1, 30, 70).hash().unwrap();

        let variants = [
            state(2, 30, 70),
            state(1, 31, 70),
            state(1, 30, 71),
            // same amounts, swapped between the participants
            state(1, 70, 30),
            State::new(bob(), 1.into(), alice(), 30.into(), 70.into()),
            State::new(alice(), 1.into(), Address([0xcc; 20]), 30.into(), 70.into()),
        ];
        for v in variants {
            assert_ne!(v.hash().unwrap(), base, "{:?}", v);
        }
    }

    #[test]
    fn next_increments_nonce_and_keeps_participants() {
        let s = state(4, 30, 70);
        let n = s.next(29.into(), 71.into()).unwrap();

        assert_eq!(n.nonce(), U256::from(5u64));
        assert_eq!(n.participants(), s.participants());
        assert_eq!(n.balances(), [U256::from(29u64), U256::from(71u64)]);
        // the original is untouched
        assert_eq!(s.balance0(), U256::from(30u64));
    }

    #[test]
    fn next_fails_on_nonce_overflow() {
        let s = State::new(alice(), U256::max_value(), bob(), 0.into(), 0.into());
        assert_eq!(s.next(1.into(), 1.into()), None);
    }

    #[test]
    fn is_between_ignores_order() {
        let s = state(1, 1, 1);
        assert!(s.is_between(alice(), bob()));
        assert!(s.is_between(bob(), alice()));
        assert!(!s.is_between(alice(), Address([0xcc; 20])));
    }
}
