//! The local, append-only log of dual-signed states.

mod json;
mod memory;

use thiserror::Error;

use crate::{channel::Receipt, error::ErrorKind};

pub(crate) use json::write_atomic;
pub use json::JsonReceiptStore;
pub use memory::MemoryReceiptStore;

/// Position of a receipt in its store. Stable, since receipts are never
/// removed.
pub type ReceiptIndex = usize;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("receipt {index} is corrupted: {reason}")]
    Corrupted { index: ReceiptIndex, reason: String },
    #[error("ledger snapshot is corrupted: {0}")]
    CorruptedLedger(String),
    #[error("no receipt at index {0}")]
    NoSuchReceipt(ReceiptIndex),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Storage
    }
}

/// Storage for [Receipt]s.
///
/// Receipts can only be appended. Afterwards the only change allowed is
/// flipping one to committed.
pub trait ReceiptStore {
    fn append(&mut self, receipt: Receipt) -> Result<ReceiptIndex, StoreError>;

    fn all(&self) -> &[Receipt];

    fn get(&self, index: ReceiptIndex) -> Option<&Receipt> {
        self.all().get(index)
    }

    /// Idempotent: marking a committed receipt again succeeds.
    fn mark_committed(&mut self, index: ReceiptIndex) -> Result<(), StoreError>;
}
