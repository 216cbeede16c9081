//! Two-party balance channels: states both participants sign off the ledger,
//! and the ledger rules that make the latest of them binding.

mod abiencode {
    mod error;
    mod hashing;
    mod ser;

    pub mod types;

    pub use error::Error;
    pub use hashing::{keccak256_packed, to_bytes, to_hash};
    pub use ser::{to_writer, Writer};

    #[cfg(test)]
    mod tests;
}
pub mod sig;

pub mod channel;
pub mod client;
pub mod error;
pub mod ledger;
pub mod messages;
pub mod selector;
pub mod store;
pub mod submitter;
pub mod wire;

pub use abiencode::types::{Address, Hash, Signature, U256};
pub use abiencode::Error as EncodeError;
pub use channel::{ChannelId, Receipt, State, StateAgreement};
pub use client::{LedgerClient, LocalLedgerClient};
pub use error::ErrorKind;
pub use ledger::ChannelLedger;
pub use store::{JsonReceiptStore, MemoryReceiptStore, ReceiptStore};
pub use submitter::{ChannelSubmitter, SubmitterConfig};
