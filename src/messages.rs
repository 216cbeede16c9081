//! Messages between the two participants while they agree on a state, and
//! their conversion to and from the wire types.

use thiserror::Error;

use crate::{
    abiencode::types::{Address, Hash, Signature, U256},
    channel::{State, StateSignature},
    wire::proto::{self, envelope},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("expected a message, got none")]
    ExpectedSome,
    #[error("field has the wrong length")]
    ByteLengthMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// Please sign this state.
    Proposal(State),
    /// Signature over a proposed state.
    Signature(StateSignature),
    /// The state with this hash will not be signed.
    Rejected { hash: Hash, reason: String },
}

fn fixed<const N: usize>(bytes: Vec<u8>) -> Result<[u8; N], ConversionError> {
    bytes
        .try_into()
        .or(Err(ConversionError::ByteLengthMismatch))
}

fn amount(bytes: &[u8]) -> Result<U256, ConversionError> {
    // from_big_endian panics on more than 32 bytes
    if bytes.len() > 32 {
        return Err(ConversionError::ByteLengthMismatch);
    }
    Ok(U256::from_big_endian(bytes))
}

fn amount_bytes(value: U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf.to_vec()
}

impl From<State> for proto::BalancesState {
    fn from(s: State) -> Self {
        proto::BalancesState {
            participant0: s.participant0().0.to_vec(),
            nonce: amount_bytes(s.nonce()),
            participant1: s.participant1().0.to_vec(),
            balance0: amount_bytes(s.balance0()),
            balance1: amount_bytes(s.balance1()),
        }
    }
}

impl TryFrom<proto::BalancesState> for State {
    type Error = ConversionError;

    fn try_from(value: proto::BalancesState) -> Result<Self, Self::Error> {
        Ok(State::new(
            Address(fixed(value.participant0)?),
            amount(&value.nonce)?,
            Address(fixed(value.participant1)?),
            amount(&value.balance0)?,
            amount(&value.balance1)?,
        ))
    }
}

impl From<PeerMessage> for proto::Envelope {
    fn from(msg: PeerMessage) -> Self {
        let msg = match msg {
            PeerMessage::Proposal(state) => envelope::Msg::StateProposal(proto::StateProposalMsg {
                state: Some(state.into()),
            }),
            PeerMessage::Signature(s) => envelope::Msg::StateSignature(proto::StateSignatureMsg {
                hash: s.hash.0.to_vec(),
                sig: s.sig.0.to_vec(),
            }),
            PeerMessage::Rejected { hash, reason } => {
                envelope::Msg::StateRejected(proto::StateRejectedMsg {
                    hash: hash.0.to_vec(),
                    reason,
                })
            }
        };
        proto::Envelope { msg: Some(msg) }
    }
}

impl TryFrom<proto::Envelope> for PeerMessage {
    type Error = ConversionError;

    fn try_from(value: proto::Envelope) -> Result<Self, Self::Error> {
        Ok(match value.msg.ok_or(ConversionError::ExpectedSome)? {
            envelope::Msg::StateProposal(m) => {
                PeerMessage::Proposal(m.state.ok_or(ConversionError::ExpectedSome)?.try_into()?)
            }
            envelope::Msg::StateSignature(m) => PeerMessage::Signature(StateSignature {
                hash: Hash(fixed(m.hash)?),
                sig: Signature(fixed(m.sig)?),
            }),
            envelope::Msg::StateRejected(m) => PeerMessage::Rejected {
                hash: Hash(fixed(m.hash)?),
                reason: m.reason,
            },
        })
    }
}
