//! Picks the receipt to commit for a pair of participants.

use thiserror::Error;

use crate::{
    abiencode::types::Address, channel::Receipt, error::ErrorKind, store::ReceiptIndex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("no receipts found for this pair")]
    NoReceiptsFound,
    #[error("latest receipt (index {0}) is already committed")]
    AlreadyCommitted(ReceiptIndex),
}

impl SelectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SelectError::NoReceiptsFound => ErrorKind::Validation,
            SelectError::AlreadyCommitted(_) => ErrorKind::Ordering,
        }
    }
}

/// The receipt with the highest nonce among those between `a` and `b`, in
/// either participant order. On equal nonces the one appended first wins.
///
/// The returned index points into `receipts`, not into the filtered pair.
pub fn select_latest(
    receipts: &[Receipt],
    a: Address,
    b: Address,
) -> Result<(ReceiptIndex, &Receipt), SelectError> {
    let mut best: Option<(ReceiptIndex, &Receipt)> = None;
    for (idx, r) in receipts.iter().enumerate() {
        if !r.state().is_between(a, b) {
            continue;
        }
        match best {
            Some((_, cur)) if cur.state().nonce() >= r.state().nonce() => {}
            _ => best = Some((idx, r)),
        }
    }

    let (idx, receipt) = best.ok_or(SelectError::NoReceiptsFound)?;
    if receipt.is_committed() {
        return Err(SelectError::AlreadyCommitted(idx));
    }
    Ok((idx, receipt))
}
