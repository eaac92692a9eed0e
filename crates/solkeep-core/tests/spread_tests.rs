//! Spread and balance flows against an in-memory ledger.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::tempdir;

use solkeep_core::crypto::KdfParams;
use solkeep_core::distribution::{distribute, round_to_decimals};
use solkeep_core::ledger::{spread, DepositAddress, LedgerClient, TokenBalance, WalletBalance};
use solkeep_core::{Keypair, Keystore, KeystoreConfig, KeystoreError, Result, Session, WalletSpec};

#[derive(Default)]
struct MockLedger {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    failing: Vec<String>,
    missing_accounts: Vec<String>,
    sent: Mutex<Vec<(String, Option<String>, f64)>>,
    balances: HashMap<String, WalletBalance>,
}

impl MockLedger {
    fn failing(recipients: &[&str]) -> Self {
        Self {
            failing: recipients.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_wallet_balances(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, WalletBalance>> {
        Ok(addresses
            .iter()
            .filter_map(|a| self.balances.get(a).map(|b| (a.clone(), b.clone())))
            .collect())
    }

    async fn transfer(
        &self,
        signer: &Keypair,
        to: &str,
        mint: Option<&str>,
        amount: f64,
    ) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.iter().any(|f| f == to) {
            return Err(KeystoreError::Network(format!("{to} rejected the transfer")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), mint.map(str::to_string), amount));
        Ok(format!("sig-{}-{to}", signer.address()))
    }

    async fn get_deposit_address(&self, owner: &str, mint: &str) -> Result<DepositAddress> {
        if self.missing_accounts.iter().any(|m| m == owner) {
            return Err(KeystoreError::Network(format!("no token account lookup for {owner}")));
        }
        Ok(DepositAddress {
            address: format!("{owner}-{mint}"),
            exists: false,
            required_rent: 2_039_280,
        })
    }
}

fn recipients(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("recipient{i}")).collect()
}

#[tokio::test]
async fn batches_never_exceed_the_window() {
    let ledger = MockLedger::default();
    let signer = Keypair::generate();
    let to = recipients(25);
    let amounts = vec![1.0; 25];

    let outcomes = spread(&ledger, &signer, &to, &amounts, None, 10).await.unwrap();

    assert_eq!(outcomes.len(), 25);
    assert!(outcomes.iter().all(|o| o.is_success()));
    assert_eq!(ledger.peak.load(Ordering::SeqCst), 10);
    assert_eq!(ledger.sent.lock().unwrap().len(), 25);
    let order: Vec<&str> = outcomes.iter().map(|o| o.recipient.as_str()).collect();
    assert_eq!(order, to.iter().map(String::as_str).collect::<Vec<_>>());
}

#[tokio::test]
async fn failures_are_reported_per_transfer() {
    let ledger = MockLedger::failing(&["recipient1", "recipient3"]);
    let signer = Keypair::generate();
    let to = recipients(4);
    let amounts = [0.5, 1.5, 2.5, 3.5];

    let outcomes = spread(&ledger, &signer, &to, &amounts, None, 2).await.unwrap();

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.recipient.as_str())
        .collect();
    assert_eq!(failed, vec!["recipient1", "recipient3"]);
    assert!(matches!(outcomes[1].result, Err(KeystoreError::Network(_))));
    assert_eq!(outcomes[2].amount, 2.5);
    assert_eq!(ledger.sent.lock().unwrap().len(), 2);
    assert_eq!(ledger.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn token_spread_resolves_deposit_accounts() {
    let ledger = MockLedger {
        missing_accounts: vec!["recipient0".into()],
        ..MockLedger::default()
    };
    let signer = Keypair::generate();
    let to = recipients(2);

    let outcomes = spread(&ledger, &signer, &to, &[1.0, 2.0], Some("mintA"), 10)
        .await
        .unwrap();

    assert!(!outcomes[0].is_success());
    assert!(outcomes[0].deposit.is_none());
    let deposit = outcomes[1].deposit.as_ref().unwrap();
    assert_eq!(deposit.address, "recipient1-mintA");
    assert!(!deposit.exists);
    let sent = ledger.sent.lock().unwrap();
    assert_eq!(sent.as_slice(), &[("recipient1".to_string(), Some("mintA".to_string()), 2.0)]);
}

#[tokio::test]
async fn spread_rejects_bad_input() {
    let ledger = MockLedger::default();
    let signer = Keypair::generate();
    let to = recipients(2);
    for (amounts, batch) in [(vec![1.0], 10), (vec![1.0, 0.0], 10), (vec![1.0, 1.0], 0)] {
        let err = spread(&ledger, &signer, &to, &amounts, None, batch)
            .await
            .unwrap_err();
        assert!(matches!(err, KeystoreError::Validation(_)), "{err}");
    }
    let err = spread(&ledger, &signer, &[], &[], None, 10).await.unwrap_err();
    assert!(matches!(err, KeystoreError::Validation(_)));
    assert_eq!(ledger.peak.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn distributed_amounts_flow_from_an_unlocked_wallet() {
    let dir = tempdir().unwrap();
    let mut config = KeystoreConfig::with_home(dir.path());
    config.kdf = KdfParams::new(8, 1, 1);
    let keystore = Keystore::open(config).unwrap();
    let (record, _) = keystore
        .generate("password123", WalletSpec::named("source"))
        .unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let raw = distribute(&mut rng, 12, 30.0, 0.4).unwrap();
    let amounts = round_to_decimals(&raw, 4, 30.0).unwrap();
    let total: f64 = amounts.iter().sum();
    assert!(total <= 30.0 + 1e-9);

    let ledger = MockLedger::default();
    let session = Session::new();
    let to = recipients(12);
    let outcomes = {
        let guard = keystore.unlock(&session, "source", "password123").unwrap();
        let signer = keystore.keypair(&session, guard.address()).unwrap();
        assert_eq!(signer.address(), record.public_key);
        spread(
            &ledger,
            &signer,
            &to,
            &amounts,
            None,
            keystore.config().spread_batch_size,
        )
        .await
        .unwrap()
    };
    assert!(session.is_empty());
    assert_eq!(outcomes.len(), 12);
    assert!(ledger.peak.load(Ordering::SeqCst) <= 10);
}

#[tokio::test]
async fn balances_default_to_zero_for_unreported_wallets() {
    let dir = tempdir().unwrap();
    let mut config = KeystoreConfig::with_home(dir.path());
    config.kdf = KdfParams::new(8, 1, 1);
    let keystore = Keystore::open(config).unwrap();
    let funded_tags = vec!["funded".to_string()];
    let (funded, _) = keystore
        .generate(
            "password123",
            WalletSpec {
                name: None,
                tags: &funded_tags,
            },
        )
        .unwrap();
    keystore
        .generate("password123", WalletSpec::anonymous())
        .unwrap();

    let mut ledger = MockLedger::default();
    ledger.balances.insert(
        funded.public_key.clone(),
        WalletBalance {
            sol_balance: 1.25,
            tokens: vec![TokenBalance {
                mint: "mintA".into(),
                amount: 40.0,
                decimals: 6,
            }],
        },
    );

    let all = keystore.balances::<&str>(&ledger, &[]).await.unwrap();
    assert_eq!(all.len(), 2);
    let zero = all
        .iter()
        .find(|(record, _)| record.public_key != funded.public_key)
        .map(|(_, balance)| balance)
        .unwrap();
    assert_eq!(*zero, WalletBalance::default());

    let tagged = keystore.balances(&ledger, &["funded"]).await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].1.sol_balance, 1.25);
    assert_eq!(tagged[0].1.tokens[0].mint, "mintA");
}
