//! Ledger RPC collaborator and the batched spread transfer flow.
//!
//! The RPC client itself lives outside this crate; the keystore only needs
//! balances, transfers and associated token account lookups.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::{KeystoreError, Result};
use crate::keypair::Keypair;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub mint: String,
    pub amount: f64,
    pub decimals: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub sol_balance: f64,
    pub tokens: Vec<TokenBalance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositAddress {
    pub address: String,
    pub exists: bool,
    /// Lamports needed to open the account when it does not exist yet.
    pub required_rent: u64,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_wallet_balances(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, WalletBalance>>;

    /// `mint = None` moves native SOL. Returns the transaction signature.
    async fn transfer(
        &self,
        signer: &Keypair,
        to: &str,
        mint: Option<&str>,
        amount: f64,
    ) -> Result<String>;

    async fn get_deposit_address(&self, owner: &str, mint: &str) -> Result<DepositAddress>;
}

#[derive(Debug)]
pub struct TransferOutcome {
    pub recipient: String,
    pub amount: f64,
    /// Token account the transfer landed in, for SPL transfers.
    pub deposit: Option<DepositAddress>,
    pub result: Result<String>,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Send `amounts[i]` to `recipients[i]`, at most `batch_size` transfers in
/// flight at once. Batches run one after another; failures are reported per
/// transfer and never roll back the others.
pub async fn spread(
    ledger: &dyn LedgerClient,
    signer: &Keypair,
    recipients: &[String],
    amounts: &[f64],
    mint: Option<&str>,
    batch_size: usize,
) -> Result<Vec<TransferOutcome>> {
    if recipients.is_empty() {
        return Err(KeystoreError::Validation("no recipients given".into()));
    }
    if recipients.len() != amounts.len() {
        return Err(KeystoreError::Validation(format!(
            "{} recipients but {} amounts",
            recipients.len(),
            amounts.len()
        )));
    }
    if batch_size == 0 {
        return Err(KeystoreError::Validation("batch size must be at least 1".into()));
    }
    if let Some(bad) = amounts.iter().find(|a| !a.is_finite() || **a <= 0.0) {
        return Err(KeystoreError::Validation(format!(
            "transfer amounts must be positive, got {bad}"
        )));
    }

    let transfers: Vec<(&String, f64)> = recipients.iter().zip(amounts.iter().copied()).collect();
    let mut outcomes = Vec::with_capacity(transfers.len());
    for (batch_no, batch) in transfers.chunks(batch_size).enumerate() {
        info!(batch = batch_no, size = batch.len(), "sending spread batch");
        let results = join_all(
            batch
                .iter()
                .map(|(to, amount)| send_one(ledger, signer, to, *amount, mint)),
        )
        .await;
        outcomes.extend(results);
    }
    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        warn!(failed, total = outcomes.len(), "spread finished with failures");
    }
    Ok(outcomes)
}

async fn send_one(
    ledger: &dyn LedgerClient,
    signer: &Keypair,
    to: &str,
    amount: f64,
    mint: Option<&str>,
) -> TransferOutcome {
    let deposit = match mint {
        Some(mint) => match ledger.get_deposit_address(to, mint).await {
            Ok(deposit) => Some(deposit),
            Err(e) => {
                return TransferOutcome {
                    recipient: to.to_string(),
                    amount,
                    deposit: None,
                    result: Err(e),
                }
            }
        },
        None => None,
    };
    let result = ledger.transfer(signer, to, mint, amount).await;
    if let Err(e) = &result {
        warn!(recipient = to, amount, "transfer failed: {e}");
    }
    TransferOutcome {
        recipient: to.to_string(),
        amount,
        deposit,
        result,
    }
}
