//! Access to the ledger: read calls, and transactions whose progress is
//! reported as a stream of [TxEvent]s.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    abiencode::{
        self,
        types::{Address, Hash, Signature, U256},
    },
    channel::{ChannelId, State},
    error::ErrorKind,
    ledger::{ChannelLedger, ChannelRecord, ChannelUpdated, LedgerError},
    store::StoreError,
};

/// How many confirmations [LocalLedgerClient] reports before it closes the
/// event stream.
pub const MAX_REPORTED_DEPTH: u64 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("event stream closed before the transaction was confirmed")]
    StreamClosed,
    #[error("no confirmation of depth {depth} within {timeout:?}")]
    Timeout { depth: u64, timeout: Duration },
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transport
    }
}

/// Outcome of a transaction that did not get confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// The ledger refused the call. Holds its reason string unchanged.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl TxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TxError::Rejected(reason) => ErrorKind::from_revert_reason(reason),
            TxError::Transport(e) => e.kind(),
        }
    }
}

/// A state-changing ledger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    Deposit {
        who: Address,
        amount: U256,
    },
    UpdateChannelState {
        state: State,
        sig0: Signature,
        sig1: Signature,
    },
    ResetChannelState {
        participant0: Address,
        participant1: Address,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    /// The transaction was included in a block.
    Receipt {
        tx_hash: Hash,
        events: Vec<ChannelUpdated>,
    },
    /// `depth` blocks, including the one carrying the transaction, exist.
    Confirmation { depth: u64 },
    /// The transaction was reverted with `reason`. Nothing follows.
    Error { reason: String },
}

/// Handle on a sent transaction.
#[derive(Debug)]
pub struct PendingTx {
    tx_hash: Hash,
    events: mpsc::UnboundedReceiver<TxEvent>,
}

impl PendingTx {
    pub fn new(tx_hash: Hash, events: mpsc::UnboundedReceiver<TxEvent>) -> Self {
        PendingTx { tx_hash, events }
    }

    pub fn tx_hash(&self) -> Hash {
        self.tx_hash
    }

    /// `None` once the sender closed the stream.
    pub async fn next_event(&mut self) -> Option<TxEvent> {
        self.events.recv().await
    }

    /// Wait until the transaction is `depth` blocks deep and return the
    /// events it emitted.
    pub async fn confirmation(
        mut self,
        depth: u64,
        timeout: Duration,
    ) -> Result<Vec<ChannelUpdated>, TxError> {
        let tx_hash = self.tx_hash;
        let wait = async move {
            let mut emitted = Vec::new();
            while let Some(event) = self.events.recv().await {
                match event {
                    TxEvent::Receipt { events, .. } => {
                        debug!(%tx_hash, "transaction included");
                        emitted = events;
                    }
                    TxEvent::Confirmation { depth: d } if d >= depth => {
                        debug!(%tx_hash, depth = d, "transaction confirmed");
                        return Ok(emitted);
                    }
                    TxEvent::Confirmation { depth: d } => {
                        debug!(%tx_hash, depth = d, "confirmation");
                    }
                    TxEvent::Error { reason } => return Err(TxError::Rejected(reason)),
                }
            }
            Err(TransportError::StreamClosed.into())
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| TransportError::Timeout { depth, timeout })?
    }
}

/// What the channel protocol needs from a ledger.
pub trait LedgerClient {
    fn balance_of(&self, who: Address) -> Result<U256, TransportError>;

    fn channel(&self, id: ChannelId) -> Result<ChannelRecord, TransportError>;

    /// The ledger's own hash of `state`.
    fn hash_state(&self, state: &State) -> Result<Hash, TxError>;

    fn send(&self, call: LedgerCall, from: Address) -> Result<PendingTx, TransportError>;
}

/// A [LedgerClient] for a [ChannelLedger] living in this process.
///
/// Calls are executed right away, but reported like a chain would: the
/// receipt after one block time, followed by one confirmation per block.
/// Clones share the same ledger.
#[derive(Debug, Clone)]
pub struct LocalLedgerClient {
    ledger: Arc<Mutex<ChannelLedger>>,
    snapshot: Option<PathBuf>,
    block_time: Duration,
    tx_count: Arc<AtomicU64>,
}

impl LocalLedgerClient {
    /// A client for a ledger that lives only in memory.
    pub fn new(ledger: ChannelLedger, block_time: Duration) -> Self {
        LocalLedgerClient {
            ledger: Arc::new(Mutex::new(ledger)),
            snapshot: None,
            block_time,
            tx_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A client for the ledger saved at `path`, created if missing. Every
    /// successful call is saved there before it takes effect.
    pub fn open(path: impl AsRef<Path>, block_time: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let ledger = ChannelLedger::open(path)?;
        Ok(LocalLedgerClient {
            snapshot: Some(path.to_path_buf()),
            ..Self::new(ledger, block_time)
        })
    }

    /// Read access to the ledger, e.g. for its event log.
    pub fn with_ledger<R>(
        &self,
        f: impl FnOnce(&ChannelLedger) -> R,
    ) -> Result<R, TransportError> {
        Ok(f(&*self.lock()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChannelLedger>, TransportError> {
        self.ledger
            .lock()
            .map_err(|_| TransportError::Unavailable("ledger lock poisoned".into()))
    }
}

fn execute(
    ledger: &mut ChannelLedger,
    call: &LedgerCall,
    from: Address,
) -> Result<Vec<ChannelUpdated>, LedgerError> {
    match call {
        LedgerCall::Deposit { who, amount } => {
            ledger.deposit(*who, *amount)?;
            Ok(Vec::new())
        }
        LedgerCall::UpdateChannelState { state, sig0, sig1 } => {
            Ok(vec![ledger.update_channel_state(state, *sig0, *sig1, from)?])
        }
        LedgerCall::ResetChannelState {
            participant0,
            participant1,
        } => Ok(vec![ledger.reset_channel_state(
            *participant0,
            *participant1,
            from,
        )?]),
    }
}

impl LedgerClient for LocalLedgerClient {
    fn balance_of(&self, who: Address) -> Result<U256, TransportError> {
        Ok(self.lock()?.balance_of(who))
    }

    fn channel(&self, id: ChannelId) -> Result<ChannelRecord, TransportError> {
        Ok(self.lock()?.channel(id))
    }

    fn hash_state(&self, state: &State) -> Result<Hash, TxError> {
        self.lock()?
            .hash_state(state)
            .map_err(|e| TxError::Rejected(e.to_string()))
    }

    fn send(&self, call: LedgerCall, from: Address) -> Result<PendingTx, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let count = self.tx_count.fetch_add(1, Ordering::Relaxed);
        let tx_hash = abiencode::keccak256_packed(&[&count.to_be_bytes(), &from.0]);

        let result = {
            let mut ledger = self.lock()?;
            match &self.snapshot {
                None => execute(&mut ledger, &call, from),
                Some(path) => {
                    let mut next = ledger.clone();
                    let result = execute(&mut next, &call, from);
                    if result.is_ok() {
                        next.save(path).map_err(|e| {
                            TransportError::Unavailable(format!("saving ledger failed: {}", e))
                        })?;
                        *ledger = next;
                    }
                    result
                }
            }
        };
        match &result {
            Ok(_) => debug!(%tx_hash, %from, ?call, "transaction executed"),
            Err(e) => warn!(%tx_hash, %from, reason = %e, "transaction reverted"),
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let block_time = self.block_time;
        runtime.spawn(async move {
            tokio::time::sleep(block_time).await;
            let events = match result {
                Ok(events) => events,
                Err(e) => {
                    let _ = tx.send(TxEvent::Error {
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            if tx.send(TxEvent::Receipt { tx_hash, events }).is_err() {
                return;
            }
            for depth in 1..=MAX_REPORTED_DEPTH {
                if tx.send(TxEvent::Confirmation { depth }).is_err() {
                    // nobody listens anymore
                    return;
                }
                tokio::time::sleep(block_time).await;
            }
        });

        Ok(PendingTx::new(tx_hash, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: Duration = Duration::from_millis(1);
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn client() -> LocalLedgerClient {
        LocalLedgerClient::new(ChannelLedger::new(), BLOCK)
    }

    #[tokio::test]
    async fn deposit_is_confirmed() {
        let client = client();
        let who = Address([1; 20]);

        let pending = client
            .send(
                LedgerCall::Deposit {
                    who,
                    amount: U256::from(10u64),
                },
                who,
            )
            .unwrap();
        let events = pending.confirmation(2, TIMEOUT).await.unwrap();

        assert!(events.is_empty());
        assert_eq!(client.balance_of(who).unwrap(), U256::from(10u64));
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let client = client();
        let who = Address([1; 20]);
        let mut pending = client
            .send(
                LedgerCall::Deposit {
                    who,
                    amount: U256::one(),
                },
                who,
            )
            .unwrap();

        assert!(matches!(
            pending.next_event().await,
            Some(TxEvent::Receipt { tx_hash, .. }) if tx_hash == pending.tx_hash()
        ));
        assert_eq!(
            pending.next_event().await,
            Some(TxEvent::Confirmation { depth: 1 })
        );
        assert_eq!(
            pending.next_event().await,
            Some(TxEvent::Confirmation { depth: 2 })
        );
    }

    #[tokio::test]
    async fn rejection_reason_is_verbatim() {
        let client = client();
        let who = Address([1; 20]);

        let pending = client
            .send(
                LedgerCall::Deposit {
                    who,
                    amount: U256::zero(),
                },
                who,
            )
            .unwrap();
        let err = pending.confirmation(2, TIMEOUT).await.unwrap_err();

        assert_eq!(err, TxError::Rejected("amount must be positive".into()));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn reset_of_empty_channel_is_rejected() {
        let client = client();
        let (a, b) = (Address([1; 20]), Address([2; 20]));

        let pending = client
            .send(
                LedgerCall::ResetChannelState {
                    participant0: a,
                    participant1: b,
                },
                a,
            )
            .unwrap();

        assert_eq!(
            pending.confirmation(2, TIMEOUT).await.unwrap_err().kind(),
            ErrorKind::EmptyChannel
        );
    }

    #[tokio::test]
    async fn closed_stream_is_a_transport_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(TxEvent::Confirmation { depth: 1 }).unwrap();
        drop(tx);

        let err = PendingTx::new(Hash::default(), rx)
            .confirmation(2, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err, TxError::Transport(TransportError::StreamClosed));
        assert!(err.kind().is_retryable());
    }

    #[tokio::test]
    async fn missing_confirmation_times_out() {
        let (_tx, rx) = mpsc::unbounded_channel();

        let err = PendingTx::new(Hash::default(), rx)
            .confirmation(2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TxError::Transport(TransportError::Timeout { depth: 2, .. })
        ));
    }

    #[test]
    fn send_needs_a_runtime() {
        let client = client();
        let who = Address([1; 20]);
        let err = client
            .send(
                LedgerCall::Deposit {
                    who,
                    amount: U256::one(),
                },
                who,
            )
            .unwrap_err();

        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    fn deposit(who: Address, amount: u64) -> LedgerCall {
        LedgerCall::Deposit {
            who,
            amount: U256::from(amount),
        }
    }

    #[tokio::test]
    async fn opened_ledger_survives_the_client() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let who = Address([1; 20]);

        let client = LocalLedgerClient::open(&path, BLOCK).unwrap();
        let pending = client.send(deposit(who, 10), who).unwrap();
        pending.confirmation(2, TIMEOUT).await.unwrap();
        drop(client);

        let client = LocalLedgerClient::open(&path, BLOCK).unwrap();
        assert_eq!(client.balance_of(who).unwrap(), U256::from(10u64));
    }

    #[tokio::test]
    async fn unsaved_call_does_not_take_effect() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger").join("ledger.json");
        std::fs::create_dir(path.parent().unwrap()).unwrap();
        let who = Address([1; 20]);

        let client = LocalLedgerClient::open(&path, BLOCK).unwrap();
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();

        let err = client.send(deposit(who, 10), who).unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)), "{}", err);
        assert!(err.kind().is_retryable());
        assert!(client.balance_of(who).unwrap().is_zero());
    }
}
