//! Interactive client for one balance channel between two local accounts.
//!
//! Both keys live in this process, but the second participant only ever
//! signs what reaches it over the wire encoding, after checking it itself.

use std::io::Write;

use anyhow::{Context, Result};
use balances_channel::{ChannelSubmitter, JsonReceiptStore, LocalLedgerClient, ReceiptStore};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{Line, Session};
use config::Args;

const HELP: &str = "commands: sign <balance0> <balance1> [nonce] | commit | reset | balances | receipts | exit";

fn prompt() -> Result<()> {
    print!("\n> ");
    std::io::stdout().flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let [alice, bob] = config::load_signers(args.keys.as_ref())?;
    info!(alice = %alice.address(), bob = %bob.address(), "participants");

    let store = JsonReceiptStore::open(&args.receipts)
        .with_context(|| format!("opening receipt log {}", args.receipts.display()))?;
    let client = LocalLedgerClient::open(&args.ledger, args.block_time())
        .with_context(|| format!("opening ledger {}", args.ledger.display()))?;
    commands::check_log_against_ledger(store.all(), &client).with_context(|| {
        let (log, ledger) = (args.receipts.display(), args.ledger.display());
        format!("{} does not fit {}", log, ledger)
    })?;
    let submitter = ChannelSubmitter::new(client, store, args.submitter_config());

    for who in [alice.address(), bob.address()] {
        if submitter
            .mint_if_necessary(who, args.initial_funds)
            .await
            .with_context(|| format!("minting for {}", who))?
        {
            info!(%who, amount = %args.initial_funds, "minted");
        }
    }

    let mut session = Session::new(submitter, alice, bob);
    println!("{}", HELP);
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            prompt()?;
            continue;
        }

        match Line::try_parse_from(line.split_whitespace()) {
            Ok(Line { command }) => match session.run(command).await {
                Ok(true) => {}
                Ok(false) => break,
                // nothing is fatal here, the user can try again
                Err(e) => error!("{:#}", e),
            },
            Err(e) => println!("{}\n{}", e, HELP),
        }
        prompt()?;
    }

    println!("Bye!");
    Ok(())
}
