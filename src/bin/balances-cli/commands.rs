use core::cell::RefCell;

use anyhow::{anyhow, bail, Context, Result};
use balances_channel::{
    client::LedgerClient,
    messages::PeerMessage,
    selector,
    sig::Signer,
    wire::{BytesBus, MessageBus, ProtoBufEncodingLayer},
    Address, ChannelId, ChannelSubmitter, LocalLedgerClient, Receipt, ReceiptStore, State,
    StateAgreement, U256,
};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use crate::config::parse_amount;

/// One line typed at the prompt.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true)]
pub struct Line {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Sign a new state with both keys and store it
    Sign {
        /// New balance of alice
        #[arg(value_parser = parse_amount)]
        balance0: U256,
        /// New balance of bob
        #[arg(value_parser = parse_amount)]
        balance1: U256,
        /// Defaults to one above the highest nonce known for the pair
        #[arg(value_parser = parse_amount)]
        nonce: Option<U256>,
    },
    /// Commit the latest signed state to the ledger
    Commit,
    /// Unlock all funds of the channel
    Reset,
    /// Show free balances and the channel record
    Balances,
    /// List stored receipts
    Receipts,
    Exit,
}

/// Collects frames sent over it until they are taken.
#[derive(Debug, Default)]
pub struct LoopbackBus(RefCell<Vec<u8>>);

impl LoopbackBus {
    fn take(&self) -> Vec<u8> {
        self.0.take()
    }
}

impl BytesBus for LoopbackBus {
    fn send_to_peer(&self, msg: &[u8]) {
        self.0.borrow_mut().extend_from_slice(msg);
    }
}

type Wire = ProtoBufEncodingLayer<LoopbackBus>;

/// The other participant. It only ever sees encoded frames and checks
/// every proposal on its own before signing.
#[derive(Debug)]
pub struct CounterParty {
    signer: Signer,
    peer: Address,
    wire: Wire,
}

impl CounterParty {
    pub fn new(signer: Signer, peer: Address) -> Self {
        CounterParty {
            signer,
            peer,
            wire: Wire::new(LoopbackBus::default()),
        }
    }

    /// Answer all frames in `incoming`, returning the encoded replies.
    pub fn handle(&self, incoming: &[u8]) -> Result<Vec<u8>> {
        let mut rest = incoming;
        while !rest.is_empty() {
            let (msg, r) = Wire::decode(rest)?;
            rest = r;

            let reply = match msg {
                PeerMessage::Proposal(state) => self.answer(state)?,
                other => {
                    warn!(?other, "unexpected message");
                    continue;
                }
            };
            self.wire.send_to_peer(reply)?;
        }
        Ok(self.wire.bus.take())
    }

    fn answer(&self, state: State) -> Result<PeerMessage> {
        let mut agreement = StateAgreement::new(state)?;
        if !state.is_between(self.peer, self.signer.address()) {
            return Ok(PeerMessage::Rejected {
                hash: agreement.hash(),
                reason: "not a state of our channel".into(),
            });
        }
        Ok(PeerMessage::Signature(agreement.sign(&self.signer)?))
    }
}

/// Fails if a receipt is marked committed but the ledger never accepted it,
/// which happens when the log is opened against another or a new ledger.
pub fn check_log_against_ledger(receipts: &[Receipt], client: &LocalLedgerClient) -> Result<()> {
    let unknown = client.with_ledger(|ledger| {
        receipts
            .iter()
            .position(|r| r.is_committed() && !ledger.is_spent(&r.hash()))
    })?;
    if let Some(index) = unknown {
        bail!("receipt #{} is committed, but the ledger never accepted it", index);
    }
    Ok(())
}

pub struct Session<C, S> {
    submitter: ChannelSubmitter<C, S>,
    signer: Signer,
    counter_party: CounterParty,
    wire: Wire,
}

impl<C: LedgerClient, S: ReceiptStore> Session<C, S> {
    pub fn new(submitter: ChannelSubmitter<C, S>, alice: Signer, bob: Signer) -> Self {
        let counter_party = CounterParty::new(bob, alice.address());
        Session {
            submitter,
            signer: alice,
            counter_party,
            wire: Wire::new(LoopbackBus::default()),
        }
    }

    pub fn submitter(&self) -> &ChannelSubmitter<C, S> {
        &self.submitter
    }

    fn alice(&self) -> Address {
        self.signer.address()
    }

    fn bob(&self) -> Address {
        self.counter_party.signer.address()
    }

    /// Returns `false` once the user asked to leave.
    pub async fn run(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Sign {
                balance0,
                balance1,
                nonce,
            } => self.sign(balance0, balance1, nonce)?,
            Command::Commit => self.commit().await?,
            Command::Reset => self.reset().await?,
            Command::Balances => self.balances()?,
            Command::Receipts => self.receipts(),
            Command::Exit => return Ok(false),
        }
        Ok(true)
    }

    fn next_nonce(&self) -> Result<U256> {
        let (alice, bob) = (self.alice(), self.bob());
        let ledger = self
            .submitter
            .client()
            .channel(ChannelId::new(alice, bob))?
            .nonce;
        let stored = self
            .submitter
            .store()
            .all()
            .iter()
            .filter(|r| r.state().is_between(alice, bob))
            .map(|r| r.state().nonce())
            .max()
            .unwrap_or_default();
        ledger
            .max(stored)
            .checked_add(U256::one())
            .ok_or_else(|| anyhow!("nonce exhausted"))
    }

    pub fn sign(&mut self, balance0: U256, balance1: U256, nonce: Option<U256>) -> Result<()> {
        let nonce = match nonce {
            Some(n) => n,
            None => self.next_nonce()?,
        };
        let state = State::new(self.alice(), nonce, self.bob(), balance0, balance1);

        let mut agreement = StateAgreement::new(state)?;
        let ledger_hash = self.submitter.client().hash_state(&state)?;
        if ledger_hash != agreement.hash() {
            bail!("ledger hashes the state to {}, we got {}", ledger_hash, agreement.hash());
        }
        agreement.sign(&self.signer)?;

        self.wire.send_to_peer(PeerMessage::Proposal(state))?;
        let reply = self.counter_party.handle(&self.wire.bus.take())?;
        let (msg, _) = Wire::decode(&reply).context("no answer from the other participant")?;
        match msg {
            PeerMessage::Signature(s) => {
                agreement.add_signature(s)?;
            }
            PeerMessage::Rejected { reason, .. } => bail!("state rejected: {}", reason),
            PeerMessage::Proposal(_) => bail!("unexpected proposal"),
        }

        let receipt = agreement.build()?;
        let hash = receipt.hash();
        let index = self.submitter.store_mut().append(receipt)?;
        debug!(index, %hash, "stored receipt");
        println!("> signed state #{} (nonce {}): {}", index, nonce, hash);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let (alice, bob) = (self.alice(), self.bob());
        let (index, _) = selector::select_latest(self.submitter.store().all(), alice, bob)?;
        println!("> updating channel state with receipt #{}...", index);
        self.submitter.submit(index, alice).await?;
        println!("> confirmed");
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        let (alice, bob) = (self.alice(), self.bob());
        println!("> resetting channel and unlocking funds...");
        self.submitter.reset(alice, bob, alice).await?;
        println!("> confirmed");
        Ok(())
    }

    fn balances(&self) -> Result<()> {
        let client = self.submitter.client();
        let (alice, bob) = (self.alice(), self.bob());
        let record = client.channel(ChannelId::new(alice, bob))?;

        println!("alice {}: {}", alice, client.balance_of(alice)?);
        println!("bob   {}: {}", bob, client.balance_of(bob)?);
        println!(
            "channel: {} / {} (nonce {})",
            record.balance0, record.balance1, record.nonce
        );
        Ok(())
    }

    fn receipts(&self) {
        let receipts = self.submitter.store().all();
        if receipts.is_empty() {
            println!("> no receipts found");
        }
        for (i, r) in receipts.iter().enumerate() {
            let s = r.state();
            println!(
                "#{} nonce {}: {} / {}{}",
                i,
                s.nonce(),
                s.balance0(),
                s.balance1(),
                if r.is_committed() { " (committed)" } else { "" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use balances_channel::{
        ChannelLedger, LocalLedgerClient, MemoryReceiptStore, SubmitterConfig,
    };
    use rand::{rngs::StdRng, SeedableRng};

    fn parse(line: &str) -> Command {
        Line::try_parse_from(line.split_whitespace()).unwrap().command
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse("sign 29 71"),
            Command::Sign {
                balance0: U256::from(29u64),
                balance1: U256::from(71u64),
                nonce: None
            }
        );
        assert_eq!(parse("commit"), Command::Commit);
        assert!(Line::try_parse_from(["sign", "x", "1"]).is_err());
    }

    async fn session() -> Session<LocalLedgerClient, MemoryReceiptStore> {
        let mut rng = StdRng::seed_from_u64(5);
        let (alice, bob) = (Signer::new(&mut rng), Signer::new(&mut rng));
        let client = LocalLedgerClient::new(ChannelLedger::new(), Duration::from_millis(1));
        let submitter = ChannelSubmitter::new(
            client,
            MemoryReceiptStore::new(),
            SubmitterConfig {
                confirmations: 2,
                timeout: Duration::from_secs(5),
            },
        );
        for who in [alice.address(), bob.address()] {
            submitter
                .mint_if_necessary(who, U256::from(100u64))
                .await
                .unwrap();
        }
        Session::new(submitter, alice, bob)
    }

    #[tokio::test]
    async fn sign_commit_reset() {
        let mut s = session().await;
        let (alice, bob) = (s.alice(), s.bob());

        assert!(s.run(parse("sign 30 70")).await.unwrap());
        assert!(s.run(parse("sign 29 71")).await.unwrap());
        let nonces: Vec<U256> = s
            .submitter()
            .store()
            .all()
            .iter()
            .map(|r| r.state().nonce())
            .collect();
        assert_eq!(nonces, [U256::from(1u64), U256::from(2u64)]);

        s.run(Command::Commit).await.unwrap();
        let client = s.submitter().client();
        assert_eq!(client.balance_of(alice).unwrap(), U256::from(71u64));
        assert_eq!(client.balance_of(bob).unwrap(), U256::from(29u64));

        s.run(Command::Reset).await.unwrap();
        let client = s.submitter().client();
        assert_eq!(client.balance_of(alice).unwrap(), U256::from(100u64));

        assert!(!s.run(Command::Exit).await.unwrap());
    }

    #[tokio::test]
    async fn committed_log_needs_its_ledger() {
        let mut s = session().await;
        s.run(parse("sign 30 70")).await.unwrap();
        s.run(Command::Commit).await.unwrap();

        let receipts = s.submitter().store().all();
        check_log_against_ledger(receipts, s.submitter().client()).unwrap();

        let fresh = LocalLedgerClient::new(ChannelLedger::new(), Duration::from_millis(1));
        let err = check_log_against_ledger(receipts, &fresh).unwrap_err();
        assert!(err.to_string().contains("#0"), "{}", err);
    }

    #[test]
    fn counter_party_rejects_foreign_state() {
        let mut rng = StdRng::seed_from_u64(6);
        let bob = Signer::new(&mut rng);
        let alice = Address([1; 20]);
        let party = CounterParty::new(bob, alice);

        let wire = Wire::new(LoopbackBus::default());
        let foreign = State::new(alice, U256::one(), Address([2; 20]), U256::one(), U256::one());
        wire.send_to_peer(PeerMessage::Proposal(foreign)).unwrap();

        let reply = party.handle(&wire.bus.take()).unwrap();
        let (msg, _) = Wire::decode(&reply).unwrap();
        assert!(matches!(msg, PeerMessage::Rejected { .. }));
    }
}
