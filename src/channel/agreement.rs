use thiserror::Error;

use super::{PartIdx, Receipt, State, PARTICIPANTS};
use crate::{
    abiencode::{
        self,
        types::{Address, Hash, Signature},
    },
    sig,
};

/// A participant's signature over a state, as sent to the other participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSignature {
    pub hash: Hash,
    pub sig: Signature,
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error("could not encode state: {0}")]
    AbiEncode(#[from] abiencode::Error),
    #[error("could not sign state: {0}")]
    Signing(#[from] sig::Error),
    #[error("{0} does not participate in this state")]
    NotParticipant(Address),
    #[error("participant {0} already signed")]
    AlreadySigned(PartIdx),
}

#[derive(Debug, Error)]
pub enum AddSignatureError {
    #[error("could not encode state: {0}")]
    AbiEncode(#[from] abiencode::Error),
    #[error("could not recover signer: {0}")]
    RecoveryFailed(#[from] sig::Error),
    #[error("signature is for {got}, expected {expected}")]
    HashMismatch { expected: Hash, got: Hash },
    #[error("signature by {0}, who does not participate in this state")]
    InvalidSignature(Address),
    #[error("participant {0} already signed")]
    AlreadySigned(PartIdx),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing signature of participant {0}")]
    MissingSignature(PartIdx),
}

/// Collects the signatures of both participants on one [State].
///
/// Every participant computes the state hash on their own and only accepts
/// signatures over that hash from the address at the matching position, so a
/// signature can never end up in the wrong slot. Once both are present,
/// [StateAgreement::build] turns the agreement into a [Receipt].
#[derive(Debug, Clone)]
pub struct StateAgreement {
    state: State,
    hash: Hash,
    signatures: [Option<Signature>; PARTICIPANTS],
}

impl StateAgreement {
    pub fn new(state: State) -> Result<Self, abiencode::Error> {
        Ok(StateAgreement {
            hash: state.hash()?,
            state,
            signatures: [None; PARTICIPANTS],
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Sign with our own key, returning the message for the other participant.
    pub fn sign(&mut self, signer: &sig::Signer) -> Result<StateSignature, SignError> {
        let idx = self
            .state
            .part_idx(signer.address())
            .ok_or_else(|| SignError::NotParticipant(signer.address()))?;
        if self.signatures[idx].is_some() {
            return Err(SignError::AlreadySigned(idx));
        }

        let sig = signer.sign_eth(self.hash)?;
        self.signatures[idx] = Some(sig);
        Ok(StateSignature {
            hash: self.hash,
            sig,
        })
    }

    // This also accepts our own signature, which is how a receipt can be
    // rebuilt from signatures that were stored elsewhere.
    pub fn add_signature(&mut self, msg: StateSignature) -> Result<PartIdx, AddSignatureError> {
        if msg.hash != self.hash {
            return Err(AddSignatureError::HashMismatch {
                expected: self.hash,
                got: msg.hash,
            });
        }

        let signer = sig::recover_signer(self.hash, msg.sig)?;
        let idx = self
            .state
            .part_idx(signer)
            .ok_or(AddSignatureError::InvalidSignature(signer))?;

        match self.signatures[idx] {
            Some(_) => Err(AddSignatureError::AlreadySigned(idx)),
            None => {
                self.signatures[idx] = Some(msg.sig);
                Ok(idx)
            }
        }
    }

    pub fn build(self) -> Result<Receipt, BuildError> {
        let mut signatures = [Signature::default(); PARTICIPANTS];
        for (idx, s) in self.signatures.iter().enumerate() {
            signatures[idx] = s.ok_or(BuildError::MissingSignature(idx))?;
        }
        Ok(Receipt::from_parts(self.state, self.hash, signatures, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::U256;
    use rand::{rngs::StdRng, SeedableRng};

    fn signers() -> (sig::Signer, sig::Signer) {
        let mut rng = StdRng::seed_from_u64(7);
        (sig::Signer::new(&mut rng), sig::Signer::new(&mut rng))
    }

    fn state(alice: &sig::Signer, bob: &sig::Signer) -> State {
        State::new(
            alice.address(),
            U256::one(),
            bob.address(),
            U256::from(30u64),
            U256::from(70u64),
        )
    }

    #[test]
    fn both_sign_and_build() {
        let (alice, bob) = signers();
        let mut ours = StateAgreement::new(state(&alice, &bob)).unwrap();
        let mut theirs = StateAgreement::new(state(&alice, &bob)).unwrap();

        let from_alice = ours.sign(&alice).unwrap();
        let from_bob = theirs.sign(&bob).unwrap();

        assert_eq!(ours.add_signature(from_bob).unwrap(), 1);
        assert_eq!(theirs.add_signature(from_alice).unwrap(), 0);

        let r0 = ours.build().unwrap();
        let r1 = theirs.build().unwrap();
        assert_eq!(r0, r1);
        assert_eq!(r0.sig0(), from_alice.sig);
        assert_eq!(r0.sig1(), from_bob.sig);
        assert!(!r0.is_committed());
    }

    #[test]
    fn build_without_counterparty_fails() {
        let (alice, bob) = signers();
        let mut agreement = StateAgreement::new(state(&alice, &bob)).unwrap();
        agreement.sign(&alice).unwrap();

        assert!(matches!(
            agreement.build(),
            Err(BuildError::MissingSignature(1))
        ));
    }

    #[test]
    fn outsider_cannot_sign() {
        let (alice, bob) = signers();
        let carol = sig::Signer::new(&mut StdRng::seed_from_u64(8));
        let mut agreement = StateAgreement::new(state(&alice, &bob)).unwrap();

        assert!(matches!(
            agreement.sign(&carol),
            Err(SignError::NotParticipant(a)) if a == carol.address()
        ));
    }

    #[test]
    fn outsider_signature_is_rejected() {
        let (alice, bob) = signers();
        let carol = sig::Signer::new(&mut StdRng::seed_from_u64(8));
        let mut agreement = StateAgreement::new(state(&alice, &bob)).unwrap();

        let forged = StateSignature {
            hash: agreement.hash(),
            sig: carol.sign_eth(agreement.hash()).unwrap(),
        };
        assert!(matches!(
            agreement.add_signature(forged),
            Err(AddSignatureError::InvalidSignature(a)) if a == carol.address()
        ));
    }

    #[test]
    fn signature_over_other_state_is_rejected() {
        let (alice, bob) = signers();
        let mut agreement = StateAgreement::new(state(&alice, &bob)).unwrap();

        let other = state(&alice, &bob).next(U256::from(29u64), U256::from(71u64)).unwrap();
        let mut other = StateAgreement::new(other).unwrap();
        let msg = other.sign(&bob).unwrap();

        assert!(matches!(
            agreement.add_signature(msg),
            Err(AddSignatureError::HashMismatch { .. })
        ));
    }

    #[test]
    fn double_sign_is_rejected() {
        let (alice, bob) = signers();
        let mut agreement = StateAgreement::new(state(&alice, &bob)).unwrap();
        let msg = agreement.sign(&alice).unwrap();

        assert!(matches!(
            agreement.sign(&alice),
            Err(SignError::AlreadySigned(0))
        ));
        assert!(matches!(
            agreement.add_signature(msg),
            Err(AddSignatureError::AlreadySigned(0))
        ));
    }
}
