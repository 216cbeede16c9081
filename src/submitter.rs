//! Takes receipts from the local log to the ledger.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    abiencode::types::{Address, U256},
    client::{LedgerCall, LedgerClient, TransportError, TxError},
    error::ErrorKind,
    ledger::ChannelUpdated,
    selector::{self, SelectError},
    store::{ReceiptIndex, ReceiptStore, StoreError},
};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no receipt at index {0}")]
    NoSuchReceipt(ReceiptIndex),
    #[error("receipt {0} is already committed")]
    AlreadyCommitted(ReceiptIndex),
    #[error("receipt nonce {receipt} is not above the ledger nonce {ledger}")]
    StaleNonce { receipt: U256, ledger: U256 },
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TransportError> for SubmitError {
    fn from(e: TransportError) -> Self {
        SubmitError::Tx(e.into())
    }
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::NoSuchReceipt(_) => ErrorKind::Validation,
            SubmitError::AlreadyCommitted(_) | SubmitError::StaleNonce { .. } => {
                ErrorKind::Ordering
            }
            SubmitError::Select(e) => e.kind(),
            SubmitError::Tx(e) => e.kind(),
            SubmitError::Store(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SubmitterConfig {
    /// Depth at which a transaction counts as final.
    pub confirmations: u64,
    /// How long to wait for that depth.
    pub timeout: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        SubmitterConfig {
            confirmations: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Submits receipts of a [ReceiptStore] through a [LedgerClient].
///
/// A receipt is marked committed only after its transaction reached the
/// configured confirmation depth. If anything fails on the way it stays
/// uncommitted and can be submitted again.
#[derive(Debug)]
pub struct ChannelSubmitter<C, S> {
    client: C,
    store: S,
    config: SubmitterConfig,
}

impl<C: LedgerClient, S: ReceiptStore> ChannelSubmitter<C, S> {
    pub fn new(client: C, store: S, config: SubmitterConfig) -> Self {
        ChannelSubmitter {
            client,
            store,
            config,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    pub async fn submit(
        &mut self,
        index: ReceiptIndex,
        sender: Address,
    ) -> Result<Vec<ChannelUpdated>, SubmitError> {
        let receipt = self
            .store
            .get(index)
            .ok_or(SubmitError::NoSuchReceipt(index))?;
        if receipt.is_committed() {
            return Err(SubmitError::AlreadyCommitted(index));
        }
        let state = *receipt.state();
        let (sig0, sig1) = (receipt.sig0(), receipt.sig1());

        // The record of the pair in the order the receipt has it, the one the
        // ledger is going to update.
        let record = self.client.channel(state.channel_id())?;
        if state.nonce() <= record.nonce {
            return Err(SubmitError::StaleNonce {
                receipt: state.nonce(),
                ledger: record.nonce,
            });
        }

        info!(index, nonce = %state.nonce(), %sender, "submitting receipt");
        let pending = self
            .client
            .send(LedgerCall::UpdateChannelState { state, sig0, sig1 }, sender)?;
        let events = match pending
            .confirmation(self.config.confirmations, self.config.timeout)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(index, error = %e, "receipt not committed");
                return Err(e.into());
            }
        };

        self.store.mark_committed(index)?;
        info!(index, "receipt committed");
        Ok(events)
    }

    /// Submit the latest receipt between `a` and `b`.
    pub async fn commit_latest(
        &mut self,
        a: Address,
        b: Address,
        sender: Address,
    ) -> Result<(ReceiptIndex, Vec<ChannelUpdated>), SubmitError> {
        let (index, _) = selector::select_latest(self.store.all(), a, b)?;
        let events = self.submit(index, sender).await?;
        Ok((index, events))
    }

    /// Unlock everything in the channel of `(participant0, participant1)`.
    pub async fn reset(
        &self,
        participant0: Address,
        participant1: Address,
        sender: Address,
    ) -> Result<Vec<ChannelUpdated>, SubmitError> {
        info!(%participant0, %participant1, %sender, "resetting channel");
        let pending = self.client.send(
            LedgerCall::ResetChannelState {
                participant0,
                participant1,
            },
            sender,
        )?;
        Ok(pending
            .confirmation(self.config.confirmations, self.config.timeout)
            .await?)
    }

    /// Deposit `amount` for `who`, unless it already has some free balance.
    /// Returns whether a deposit was made.
    pub async fn mint_if_necessary(&self, who: Address, amount: U256) -> Result<bool, SubmitError> {
        if !self.client.balance_of(who)?.is_zero() {
            return Ok(false);
        }

        info!(%who, %amount, "minting");
        let pending = self.client.send(LedgerCall::Deposit { who, amount }, who)?;
        pending
            .confirmation(self.config.confirmations, self.config.timeout)
            .await?;
        Ok(true)
    }
}
