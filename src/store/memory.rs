use super::{ReceiptIndex, ReceiptStore, StoreError};
use crate::channel::Receipt;

/// Keeps the log in memory only. Lost when dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryReceiptStore {
    receipts: Vec<Receipt>,
}

impl MemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReceiptStore for MemoryReceiptStore {
    fn append(&mut self, receipt: Receipt) -> Result<ReceiptIndex, StoreError> {
        self.receipts.push(receipt);
        Ok(self.receipts.len() - 1)
    }

    fn all(&self) -> &[Receipt] {
        &self.receipts
    }

    fn mark_committed(&mut self, index: ReceiptIndex) -> Result<(), StoreError> {
        self.receipts
            .get_mut(index)
            .ok_or(StoreError::NoSuchReceipt(index))?
            .mark_committed();
        Ok(())
    }
}
