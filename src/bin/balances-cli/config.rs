use std::{fs, path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use balances_channel::{sig::Signer, SubmitterConfig, U256};
use clap::Parser;
use tracing::info;

/// What `mint` deposits for an account without free balance: 1e18.
pub const DEFAULT_INITIAL_FUNDS: &str = "1000000000000000000";

#[derive(Parser, Debug)]
#[command(name = "balances-cli")]
#[command(about = "Sign, store and commit balance states between two participants")]
#[command(long_about = None)]
pub struct Args {
    /// Receipt log, created if missing
    #[arg(short, long, default_value = "receipts.json")]
    pub receipts: PathBuf,

    /// Local ledger state, created if missing
    #[arg(short, long, default_value = "ledger.json")]
    pub ledger: PathBuf,

    /// JSON file holding the two secret keys: ["0x<alice>", "0x<bob>"].
    /// Fresh keys are generated when omitted.
    #[arg(short, long)]
    pub keys: Option<PathBuf>,

    /// Confirmation depth a transaction needs before it counts
    #[arg(long, default_value_t = 2)]
    pub confirmations: u64,

    /// Seconds to wait for that depth
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Milliseconds between two blocks of the local ledger
    #[arg(long, default_value_t = 1000)]
    pub block_time: u64,

    /// Amount minted for a participant without free balance
    #[arg(long, default_value = DEFAULT_INITIAL_FUNDS, value_parser = parse_amount)]
    pub initial_funds: U256,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            confirmations: self.confirmations,
            timeout: Duration::from_secs(self.timeout),
        }
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time)
    }
}

pub fn parse_amount(s: &str) -> Result<U256, String> {
    U256::from_dec_str(s).map_err(|e| format!("not a decimal amount: {:?}", e))
}

fn parse_secret(s: &str) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(s), &mut key)
        .with_context(|| "secret key must be 32 bytes of hex")?;
    Ok(key)
}

/// The signers of both participants, from the keys file or freshly generated.
pub fn load_signers(keys: Option<&PathBuf>) -> Result<[Signer; 2]> {
    let Some(path) = keys else {
        info!("no keys file given, generating fresh keys");
        let mut rng = rand::thread_rng();
        return Ok([Signer::new(&mut rng), Signer::new(&mut rng)]);
    };

    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let secrets: Vec<String> = serde_json::from_slice(&data)
        .with_context(|| format!("{} is not a JSON list of keys", path.display()))?;
    if secrets.len() != 2 {
        bail!("expected 2 keys in {}, found {}", path.display(), secrets.len());
    }

    let signer = |s: &str| -> Result<Signer> {
        Signer::from_secret_bytes(&parse_secret(s)?)
            .map_err(|e| anyhow!("invalid secret key: {}", e))
    };
    Ok([signer(&secrets[0])?, signer(&secrets[1])?])
}
