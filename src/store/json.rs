use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ReceiptIndex, ReceiptStore, StoreError};
use crate::{
    abiencode::types::{Address, Hash, Signature, U256},
    channel::{Receipt, State},
};

/// On-disk form of a [Receipt]: hex for addresses and bytes, decimal for
/// amounts.
#[derive(Debug, Serialize, Deserialize)]
struct StoredReceipt {
    /// `[participant0, nonce, participant1, balance0, balance1]`
    state: (String, String, String, String, String),
    hash: String,
    sig0: String,
    sig1: String,
    committed: bool,
}

impl From<&Receipt> for StoredReceipt {
    fn from(r: &Receipt) -> Self {
        let s = r.state();
        StoredReceipt {
            state: (
                s.participant0().to_string(),
                s.nonce().to_string(),
                s.participant1().to_string(),
                s.balance0().to_string(),
                s.balance1().to_string(),
            ),
            hash: r.hash().to_string(),
            sig0: r.sig0().to_string(),
            sig1: r.sig1().to_string(),
            committed: r.is_committed(),
        }
    }
}

impl StoredReceipt {
    fn into_receipt(self, index: ReceiptIndex) -> Result<Receipt, StoreError> {
        let corrupted = |reason: String| StoreError::Corrupted { index, reason };
        let address = |s: &str| {
            s.parse::<Address>()
                .map_err(|e| corrupted(format!("address {:?}: {}", s, e)))
        };
        let amount = |s: &str| {
            U256::from_dec_str(s).map_err(|e| corrupted(format!("amount {:?}: {:?}", s, e)))
        };
        let signature = |s: &str| {
            s.parse::<Signature>()
                .map_err(|e| corrupted(format!("signature {:?}: {}", s, e)))
        };

        let (p0, nonce, p1, b0, b1) = &self.state;
        let state = State::new(
            address(p0)?,
            amount(nonce)?,
            address(p1)?,
            amount(b0)?,
            amount(b1)?,
        );
        let hash: Hash = self
            .hash
            .parse()
            .map_err(|e| corrupted(format!("hash {:?}: {}", self.hash, e)))?;

        let computed = state
            .hash()
            .map_err(|e| corrupted(format!("state not encodable: {}", e)))?;
        if computed != hash {
            return Err(corrupted(format!(
                "stored hash {} does not match state hash {}",
                hash, computed
            )));
        }

        Ok(Receipt::from_parts(
            state,
            hash,
            [signature(&self.sig0)?, signature(&self.sig1)?],
            self.committed,
        ))
    }
}

/// Keeps the receipt log in a JSON file.
///
/// The whole file is read on open and rewritten on every change, first to a
/// temporary file next to it which then replaces the original. A reader never
/// sees a half-written log.
#[derive(Debug)]
pub struct JsonReceiptStore {
    path: PathBuf,
    receipts: Vec<Receipt>,
}

impl JsonReceiptStore {
    /// Load the log at `path`, creating an empty one if there is none.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            info!(path = %path.display(), "creating empty receipt log");
            write_log(&path, &[])?;
            return Ok(JsonReceiptStore {
                path,
                receipts: Vec::new(),
            });
        }

        let data = fs::read(&path)?;
        let stored: Vec<StoredReceipt> = serde_json::from_slice(&data)?;
        let receipts = stored
            .into_iter()
            .enumerate()
            .map(|(index, r)| r.into_receipt(index))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(path = %path.display(), count = receipts.len(), "loaded receipt log");
        Ok(JsonReceiptStore { path, receipts })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `receipts` as the new log and only then adopt them, so memory
    /// and file never disagree.
    fn replace(&mut self, receipts: Vec<Receipt>) -> Result<(), StoreError> {
        write_log(&self.path, &receipts)?;
        self.receipts = receipts;
        Ok(())
    }
}

fn write_log(path: &Path, receipts: &[Receipt]) -> Result<(), StoreError> {
    let stored: Vec<StoredReceipt> = receipts.iter().map(StoredReceipt::from).collect();
    write_atomic(path, &stored)
}

/// Replace the file at `path` with `value` as JSON, through a temporary file
/// that is synced and then renamed over it.
pub(crate) fn write_atomic<T>(path: &Path, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let data = serde_json::to_vec_pretty(value)?;

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

impl ReceiptStore for JsonReceiptStore {
    fn append(&mut self, receipt: Receipt) -> Result<ReceiptIndex, StoreError> {
        let mut receipts = self.receipts.clone();
        receipts.push(receipt);
        self.replace(receipts)?;

        let index = self.receipts.len() - 1;
        debug!(index, "receipt appended");
        Ok(index)
    }

    fn all(&self) -> &[Receipt] {
        &self.receipts
    }

    fn mark_committed(&mut self, index: ReceiptIndex) -> Result<(), StoreError> {
        let receipt = self
            .receipts
            .get(index)
            .ok_or(StoreError::NoSuchReceipt(index))?;
        if receipt.is_committed() {
            return Ok(());
        }

        let mut receipts = self.receipts.clone();
        receipts[index].mark_committed();
        self.replace(receipts)?;

        debug!(index, "receipt marked committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::{receipt, signers};
    use tempfile::TempDir;

    #[test]
    fn open_creates_empty_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("receipts.json");

        let store = JsonReceiptStore::open(&path).unwrap();

        assert!(store.all().is_empty());
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("receipts.json");
        let s = signers(2);
        let first = receipt(&s[0], &s[1], 1, 30, 70);
        let second = receipt(&s[0], &s[1], 2, 29, 71);

        {
            let mut store = JsonReceiptStore::open(&path).unwrap();
            store.append(first.clone()).unwrap();
            store.append(second.clone()).unwrap();
            store.mark_committed(0).unwrap();
        }

        let store = JsonReceiptStore::open(&path).unwrap();
        assert_eq!(store.all().len(), 2);
        assert!(store.all()[0].is_committed());
        assert_eq!(store.all()[0].state(), first.state());
        assert_eq!(store.all()[1], second);
        assert!(!dir.path().join("receipts.tmp").exists());
    }

    #[test]
    fn record_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("receipts.json");
        let s = signers(2);
        let r = receipt(&s[0], &s[1], 1, 30, 70);

        let mut store = JsonReceiptStore::open(&path).unwrap();
        store.append(r.clone()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let record = &json[0];
        assert_eq!(record["state"][0], s[0].address().to_string());
        assert_eq!(record["state"][1], "1");
        assert_eq!(record["state"][2], s[1].address().to_string());
        assert_eq!(record["state"][3], "30");
        assert_eq!(record["state"][4], "70");
        assert_eq!(record["hash"], r.hash().to_string());
        assert_eq!(record["sig0"], r.sig0().to_string());
        assert_eq!(record["committed"], false);
    }

    #[test]
    fn tampered_record_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("receipts.json");
        let s = signers(2);

        let mut store = JsonReceiptStore::open(&path).unwrap();
        store.append(receipt(&s[0], &s[1], 1, 30, 70)).unwrap();
        drop(store);

        let content = fs::read_to_string(&path).unwrap();
        let tampered = content.replacen("\"70\"", "\"700\"", 1);
        assert_ne!(content, tampered);
        fs::write(&path, tampered).unwrap();

        let err = JsonReceiptStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { index: 0, .. }), "{}", err);
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("receipts.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonReceiptStore::open(&path),
            Err(StoreError::Json(_))
        ));
    }
}
