//! The authoritative record: free balances, channel escrow and the rules for
//! changing them.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    abiencode::{
        self,
        types::{Address, Hash, Signature, U256},
    },
    channel::{ChannelId, PartIdx, State, PARTICIPANTS},
    error::ErrorKind,
    sig,
};

mod snapshot;

/// Why the ledger rejected a call. The `Display` output is the reason string
/// clients see, so it must not change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("amount must be positive")]
    ZeroAmount,
    #[error("sender does not participate in this channel")]
    UnknownSender,
    #[error("invalid sig{0}")]
    InvalidSignature(PartIdx),
    #[error("hash was already committed")]
    ReplayedHash,
    #[error("nonce must increment")]
    NonceNotIncreasing,
    #[error("invalid balances")]
    InvalidBalances,
    #[error("insufficient free balance")]
    InsufficientFreeBalance,
    #[error("lock some funds into the channel first")]
    EmptyChannel,
    #[error("state not encodable: {0}")]
    Encoding(#[from] abiencode::Error),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ZeroAmount | LedgerError::Encoding(_) => ErrorKind::Validation,
            LedgerError::UnknownSender | LedgerError::InvalidSignature(_) => {
                ErrorKind::Authorization
            }
            LedgerError::ReplayedHash => ErrorKind::Replay,
            LedgerError::NonceNotIncreasing => ErrorKind::Ordering,
            LedgerError::InvalidBalances => ErrorKind::Conservation,
            LedgerError::InsufficientFreeBalance => ErrorKind::InsufficientFunds,
            LedgerError::EmptyChannel => ErrorKind::EmptyChannel,
        }
    }
}

/// Escrowed balances and the last committed nonce of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelRecord {
    pub balance0: U256,
    pub balance1: U256,
    pub nonce: U256,
}

impl ChannelRecord {
    pub fn balances(&self) -> [U256; PARTICIPANTS] {
        [self.balance0, self.balance1]
    }

    pub fn is_empty(&self) -> bool {
        self.balance0.is_zero() && self.balance1.is_zero()
    }
}

/// Emitted on every successful update or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelUpdated {
    pub channel_id: ChannelId,
    pub participant0: Address,
    pub participant1: Address,
    pub balance0: U256,
    pub balance1: U256,
    pub nonce: U256,
}

/// Every state hash the ledger ever accepted, over all channels.
///
/// Entries are never removed, so the set grows with each commit.
#[derive(Debug, Default, Clone)]
pub struct SpentHashes(BTreeSet<Hash>);

impl SpentHashes {
    pub fn contains(&self, hash: &Hash) -> bool {
        self.0.contains(hash)
    }

    /// Returns `false` if `hash` was already present.
    pub fn insert_if_absent(&mut self, hash: Hash) -> bool {
        self.0.insert(hash)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ChannelLedger {
    balances: BTreeMap<Address, U256>,
    channels: BTreeMap<ChannelId, ChannelRecord>,
    spent: SpentHashes,
    events: Vec<ChannelUpdated>,
}

impl ChannelLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, who: Address) -> U256 {
        self.balances.get(&who).copied().unwrap_or_default()
    }

    /// The record of a channel. Channels nobody touched yet read as zero.
    pub fn channel(&self, id: ChannelId) -> ChannelRecord {
        self.channels.get(&id).copied().unwrap_or_default()
    }

    pub fn hash_state(&self, state: &State) -> Result<Hash, LedgerError> {
        Ok(state.hash()?)
    }

    pub fn is_spent(&self, hash: &Hash) -> bool {
        self.spent.contains(hash)
    }

    pub fn events(&self) -> &[ChannelUpdated] {
        &self.events
    }

    pub fn deposit(&mut self, who: Address, amount: U256) -> Result<U256, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let balance = self
            .balance_of(who)
            .checked_add(amount)
            .ok_or(LedgerError::InvalidBalances)?;
        self.balances.insert(who, balance);

        debug!(%who, %amount, %balance, "deposit");
        Ok(balance)
    }

    /// Make `state` the record of its channel. An empty channel is funded from
    /// the participants' free balances, a funded one is only redistributed.
    ///
    /// Either every check passes and the ledger changes, or nothing changes.
    pub fn update_channel_state(
        &mut self,
        state: &State,
        sig0: Signature,
        sig1: Signature,
        sender: Address,
    ) -> Result<ChannelUpdated, LedgerError> {
        let participants = state.participants();
        if !participants.contains(&sender) {
            return Err(LedgerError::UnknownSender);
        }

        let hash = state.hash()?;
        for (idx, sig) in [sig0, sig1].into_iter().enumerate() {
            match sig::recover_signer(hash, sig) {
                Ok(signer) if signer == participants[idx] => {}
                _ => return Err(LedgerError::InvalidSignature(idx)),
            }
        }

        if self.spent.contains(&hash) {
            return Err(LedgerError::ReplayedHash);
        }

        let id = state.channel_id();
        let record = self.channel(id);
        if state.nonce() <= record.nonce {
            return Err(LedgerError::NonceNotIncreasing);
        }

        let deposits = required_deposits(record.balances(), state.balances())?;

        // Both participants may be the same account, so sum up per account
        // before comparing against the free balance.
        let mut debits: BTreeMap<Address, U256> = BTreeMap::new();
        for (who, amount) in participants.into_iter().zip(deposits) {
            let debit = debits.entry(who).or_default();
            *debit = debit
                .checked_add(amount)
                .ok_or(LedgerError::InvalidBalances)?;
        }
        for (who, amount) in &debits {
            if self.balance_of(*who) < *amount {
                return Err(LedgerError::InsufficientFreeBalance);
            }
        }

        // Nothing can fail from here on.
        for (who, amount) in debits {
            if !amount.is_zero() {
                let free = self.balance_of(who) - amount;
                self.balances.insert(who, free);
            }
        }
        let record = ChannelRecord {
            balance0: state.balance0(),
            balance1: state.balance1(),
            nonce: state.nonce(),
        };
        self.channels.insert(id, record);
        self.spent.insert_if_absent(hash);

        info!(
            channel = %id,
            nonce = %record.nonce,
            balance0 = %record.balance0,
            balance1 = %record.balance1,
            deposit0 = %deposits[0],
            deposit1 = %deposits[1],
            "channel state updated"
        );
        Ok(self.emit(id, participants, record))
    }

    /// Return everything locked in the channel of `(participant0,
    /// participant1)` to the participants' free balances. The nonce stays, so
    /// states signed before the reset can not be committed afterwards.
    pub fn reset_channel_state(
        &mut self,
        participant0: Address,
        participant1: Address,
        sender: Address,
    ) -> Result<ChannelUpdated, LedgerError> {
        let participants = [participant0, participant1];
        if !participants.contains(&sender) {
            return Err(LedgerError::UnknownSender);
        }

        let id = ChannelId::new(participant0, participant1);
        let record = self.channel(id);
        if record.is_empty() {
            return Err(LedgerError::EmptyChannel);
        }

        let mut refunded = self.balances.clone();
        for (who, amount) in participants.into_iter().zip(record.balances()) {
            let free = refunded.get(&who).copied().unwrap_or_default();
            let free = free
                .checked_add(amount)
                .ok_or(LedgerError::InvalidBalances)?;
            refunded.insert(who, free);
        }

        self.balances = refunded;
        let record = ChannelRecord {
            nonce: record.nonce,
            ..Default::default()
        };
        self.channels.insert(id, record);

        info!(channel = %id, nonce = %record.nonce, "channel reset");
        Ok(self.emit(id, participants, record))
    }

    fn emit(
        &mut self,
        channel_id: ChannelId,
        participants: [Address; PARTICIPANTS],
        record: ChannelRecord,
    ) -> ChannelUpdated {
        let event = ChannelUpdated {
            channel_id,
            participant0: participants[0],
            participant1: participants[1],
            balance0: record.balance0,
            balance1: record.balance1,
            nonce: record.nonce,
        };
        self.events.push(event);
        event
    }
}

/// How much each participant has to add to the escrow to go from `old` to
/// `new`.
///
/// An empty channel is funded with the full new balances. A funded channel
/// only redistributes: the escrow total must stay the same and nobody pays.
pub fn required_deposits(
    old: [U256; PARTICIPANTS],
    new: [U256; PARTICIPANTS],
) -> Result<[U256; PARTICIPANTS], LedgerError> {
    let total =
        |b: [U256; PARTICIPANTS]| b[0].checked_add(b[1]).ok_or(LedgerError::InvalidBalances);

    let new_total = total(new)?;
    if old.iter().all(U256::is_zero) {
        return Ok(new);
    }
    if new_total != total(old)? {
        return Err(LedgerError::InvalidBalances);
    }
    Ok([U256::zero(); PARTICIPANTS])
}
