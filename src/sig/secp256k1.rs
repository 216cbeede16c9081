//! Signer using the secp256k1 crate (bindings to bitcoin-core/libsecp256k1).

use crate::abiencode::types::{Address, Hash, Signature};
use secp256k1::{
    self,
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey, ThirtyTwoByteHash,
};
use sha3::{Digest, Keccak256};

use super::{hash_to_eth_signed_msg_hash, V_OFFSET};

pub use secp256k1::Error;

impl ThirtyTwoByteHash for Hash {
    fn into_32(self) -> [u8; 32] {
        self.0
    }
}

impl From<PublicKey> for Address {
    fn from(pk: PublicKey) -> Self {
        // Throw away the first byte, which is not part of the public key. It is
        // added by serialize_uncompressed due to the encoding used.
        let hash: [u8; 32] = Keccak256::digest(&pk.serialize_uncompressed()[1..]).into();

        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&hash[32 - 20..]);
        addr
    }
}

#[derive(Debug)]
pub struct Signer {
    secp: Secp256k1<All>,
    key: SecretKey,
    addr: Address,
}

impl Signer {
    /// Generates a fresh key.
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let secp = Secp256k1::new();
        let key = SecretKey::new(rng);
        let addr = PublicKey::from_secret_key(&secp, &key).into();
        Self { secp, key, addr }
    }

    /// Loads a key from its 32-byte big-endian scalar.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let secp = Secp256k1::new();
        let key = SecretKey::from_slice(bytes)?;
        let addr = PublicKey::from_secret_key(&secp, &key).into();
        Ok(Self { secp, key, addr })
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Sign a hash using a Ethereum 65-byte recoverable signature.
    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);

        // We have to use sign_ecdsa_recoverable because the ledger must be
        // able to recover the address. This gives us the additional information
        // needed for v.
        let sig = self
            .secp
            .sign_ecdsa_recoverable(&Message::from(hash), &self.key);
        let (v, rs) = sig.serialize_compact();

        // libsecp256k1 produces canonical (low-s) signatures, which is what the
        // ledger accepts. Fail early if that ever changes.
        debug_assert!(rs[32] & 0x80 == 0);

        let v: u8 = V_OFFSET + v.to_i32() as u8;
        Ok(Signature::new(&rs, v))
    }
}

/// Recover the address that produced `eth_sig` over `msg`.
///
/// `msg` is the hash given to [Signer::sign_eth()], without the
/// `Ethereum Signed Message` prefix.
pub fn recover_signer(msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
    let secp = Secp256k1::verification_only();
    let hash = hash_to_eth_signed_msg_hash(msg);

    let rs = &eth_sig.0[..64];
    let v = eth_sig
        .v()
        .checked_sub(V_OFFSET)
        .ok_or(Error::InvalidRecoveryId)?;

    let recid = RecoveryId::from_i32(v.into())?;
    let sig = RecoverableSignature::from_compact(rs, recid)?;

    let pk = secp.recover_ecdsa(&Message::from(hash), &sig)?;
    Ok(pk.into())
}
