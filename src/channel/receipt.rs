use super::{State, PARTICIPANTS};
use crate::abiencode::types::{Hash, Signature};

/// A dual-signed [State] as kept in the local receipt log.
///
/// Receipts are only created from a completed
/// [StateAgreement](super::StateAgreement) or loaded back from storage, so the
/// signatures have been checked at least once. The only thing that changes
/// afterwards is the `committed` flag, and only from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    state: State,
    hash: Hash,
    signatures: [Signature; PARTICIPANTS],
    committed: bool,
}

impl Receipt {
    pub(crate) fn from_parts(
        state: State,
        hash: Hash,
        signatures: [Signature; PARTICIPANTS],
        committed: bool,
    ) -> Self {
        Receipt {
            state,
            hash,
            signatures,
            committed,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn sig0(&self) -> Signature {
        self.signatures[0]
    }

    pub fn sig1(&self) -> Signature {
        self.signatures[1]
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub(crate) fn mark_committed(&mut self) {
        self.committed = true;
    }
}
