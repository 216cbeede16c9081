//! Handles the creation and verification of (Ethereum) Signatures.
//!
//! Two backends are available behind feature flags: `k256` (pure Rust,
//! default) and `secp256k1` (bindings to libsecp256k1). Both produce identical
//! 65-byte `r || s || v` signatures. If both are enabled, `secp256k1` is the
//! one exported from this module.

use crate::abiencode::types::Hash;
use sha3::{Digest, Keccak256};

#[cfg(not(any(feature = "k256", feature = "secp256k1")))]
compile_error!("enable at least one signature backend: `k256` or `secp256k1`");

#[cfg(feature = "k256")]
mod k256;
#[cfg(all(feature = "k256", not(feature = "secp256k1")))]
pub use self::k256::{recover_signer, Error, Signer};

#[cfg(feature = "secp256k1")]
mod secp256k1;
#[cfg(feature = "secp256k1")]
pub use self::secp256k1::{recover_signer, Error, Signer};


/// Offset added to the recovery id to form `v`, so `v` is 27 or 28 as in
/// Ethereum's pre-EIP-155 signatures.
const V_OFFSET: u8 = 27;

/// Add the `\x19Ethereum Signed Message\n<length>` prefix to hash.
///
/// This is the format `personal_sign`/`eth_sign` wallets produce and what the
/// ledger expects.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding => We can't use the serializer
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}
