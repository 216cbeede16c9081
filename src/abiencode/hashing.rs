use super::{to_writer, types::Hash, Error, Writer};

use serde::Serialize;
use sha3::{digest::Output, Digest, Keccak256};

pub struct Keccak256Writer {
    hasher: Keccak256,
}

impl Default for Keccak256Writer {
    fn default() -> Self {
        Self {
            hasher: Keccak256::new(),
        }
    }
}

impl Writer for Keccak256Writer {
    fn write(&mut self, slot: &[u8]) {
        self.hasher.update(slot);
    }
}

impl Keccak256Writer {
    pub fn finalize(self) -> Output<Keccak256> {
        self.hasher.finalize()
    }
}

/// Collects the encoded slots instead of hashing them.
#[derive(Default)]
pub struct VecWriter(pub Vec<u8>);

impl Writer for VecWriter {
    fn write(&mut self, slot: &[u8]) {
        self.0.extend_from_slice(slot);
    }
}

pub fn to_hash<T>(value: &T) -> Result<Hash, Error>
where
    T: Serialize + ?Sized,
{
    let mut writer = Keccak256Writer::default();
    to_writer(value, &mut writer)?;
    Ok(Hash(writer.finalize().into()))
}

pub fn to_bytes<T>(value: &T) -> Result<Vec<u8>, Error>
where
    T: Serialize + ?Sized,
{
    let mut writer = VecWriter::default();
    to_writer(value, &mut writer)?;
    Ok(writer.0)
}

/// Keccak-256 over the concatenation of `parts`, like Solidity's
/// `keccak256(abi.encodePacked(...))`.
///
/// Packed encoding => We can't use the serializer.
pub fn keccak256_packed(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash(hasher.finalize().into())
}
