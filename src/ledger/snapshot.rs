//! JSON snapshot of a [ChannelLedger], so a local ledger outlives the process.

use std::{collections::BTreeMap, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ChannelLedger, ChannelRecord};
use crate::{
    abiencode::types::{Address, Hash, U256},
    channel::ChannelId,
    store::{write_atomic, StoreError},
};

/// Amounts are decimal, addresses and hashes `0x`-prefixed hex.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    balances: BTreeMap<String, String>,
    channels: BTreeMap<String, StoredChannel>,
    spent: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredChannel {
    balance0: String,
    balance1: String,
    nonce: String,
}

impl From<&ChannelLedger> for Snapshot {
    fn from(ledger: &ChannelLedger) -> Self {
        Snapshot {
            balances: ledger
                .balances
                .iter()
                .map(|(who, amount)| (who.to_string(), amount.to_string()))
                .collect(),
            channels: ledger
                .channels
                .iter()
                .map(|(id, r)| {
                    let stored = StoredChannel {
                        balance0: r.balance0.to_string(),
                        balance1: r.balance1.to_string(),
                        nonce: r.nonce.to_string(),
                    };
                    (id.to_string(), stored)
                })
                .collect(),
            spent: ledger.spent.0.iter().map(Hash::to_string).collect(),
        }
    }
}

fn parse_hex<T>(what: &str, s: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = hex::FromHexError>,
{
    s.parse()
        .map_err(|e| StoreError::CorruptedLedger(format!("{} {:?}: {}", what, s, e)))
}

fn parse_amount(s: &str) -> Result<U256, StoreError> {
    U256::from_dec_str(s)
        .map_err(|e| StoreError::CorruptedLedger(format!("amount {:?}: {:?}", s, e)))
}

impl TryFrom<Snapshot> for ChannelLedger {
    type Error = StoreError;

    fn try_from(snapshot: Snapshot) -> Result<Self, Self::Error> {
        let mut ledger = ChannelLedger::new();
        for (who, amount) in &snapshot.balances {
            let who: Address = parse_hex("address", who)?;
            ledger.balances.insert(who, parse_amount(amount)?);
        }
        for (id, c) in &snapshot.channels {
            let record = ChannelRecord {
                balance0: parse_amount(&c.balance0)?,
                balance1: parse_amount(&c.balance1)?,
                nonce: parse_amount(&c.nonce)?,
            };
            ledger.channels.insert(ChannelId(parse_hex("channel id", id)?), record);
        }
        for hash in &snapshot.spent {
            ledger.spent.insert_if_absent(parse_hex("hash", hash)?);
        }
        Ok(ledger)
    }
}

impl ChannelLedger {
    /// Load the ledger saved at `path`, or start an empty one there.
    ///
    /// The event log is not saved, it only covers calls since loading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "creating empty ledger");
            let ledger = ChannelLedger::new();
            ledger.save(path)?;
            return Ok(ledger);
        }

        let snapshot: Snapshot = serde_json::from_slice(&fs::read(path)?)?;
        let ledger = ChannelLedger::try_from(snapshot)?;
        debug!(
            path = %path.display(),
            accounts = ledger.balances.len(),
            channels = ledger.channels.len(),
            "loaded ledger"
        );
        Ok(ledger)
    }

    /// Replace the snapshot at `path` with the current state.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        write_atomic(path.as_ref(), &Snapshot::from(self))
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use tempfile::TempDir;

    use super::*;
    use crate::{channel::State, ledger::LedgerError, sig::Signer};

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    #[test]
    fn open_creates_empty_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = ChannelLedger::open(&path).unwrap();

        assert!(path.exists());
        assert!(ledger.balances.is_empty());
        let data: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            data,
            serde_json::json!({"balances": {}, "channels": {}, "spent": []})
        );
    }

    #[test]
    fn reopened_ledger_keeps_funds_channels_and_spent_hashes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let mut rng = StdRng::seed_from_u64(77);
        let (alice, bob) = (Signer::new(&mut rng), Signer::new(&mut rng));
        let (a, b) = (alice.address(), bob.address());

        let mut ledger = ChannelLedger::open(&path).unwrap();
        ledger.deposit(a, u(100)).unwrap();
        ledger.deposit(b, u(100)).unwrap();
        let state = State::new(a, u(1), b, u(30), u(70));
        let hash = state.hash().unwrap();
        let (sig0, sig1) = (alice.sign_eth(hash).unwrap(), bob.sign_eth(hash).unwrap());
        ledger.update_channel_state(&state, sig0, sig1, a).unwrap();
        ledger.save(&path).unwrap();

        let mut reopened = ChannelLedger::open(&path).unwrap();
        assert_eq!(reopened.balance_of(a), u(70));
        assert_eq!(reopened.balance_of(b), u(30));
        let id = ChannelId::new(a, b);
        assert_eq!(reopened.channel(id), ledger.channel(id));
        assert!(reopened.is_spent(&hash));
        assert!(reopened.events().is_empty());

        reopened.reset_channel_state(a, b, b).unwrap();
        assert_eq!(
            reopened.update_channel_state(&state, sig0, sig1, a),
            Err(LedgerError::ReplayedHash)
        );
    }

    #[test]
    fn corrupted_snapshot_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(
            &path,
            r#"{"balances": {"0x12": "1"}, "channels": {}, "spent": []}"#,
        )
        .unwrap();

        let err = ChannelLedger::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::CorruptedLedger(_)), "{}", err);

        fs::write(&path, b"[]").unwrap();
        assert!(matches!(
            ChannelLedger::open(&path),
            Err(StoreError::Json(_))
        ));
    }
}
