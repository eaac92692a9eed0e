//! Encrypted Solana wallet key store.
//!
//! Wallet records live one per file under `<home>/accounts/`, with the secret
//! key sealed under a per-wallet password. Names and tags index the records
//! for lookup; every mutation runs under a store-wide lock.

pub mod config;
pub mod crypto;
pub mod distribution;
pub mod error;
mod fsutil;
pub mod index;
pub mod integrity;
pub mod keypair;
pub mod keystore;
pub mod ledger;
pub mod lock;
pub mod migration;
pub mod names;
pub mod paths;
pub mod record;
pub mod session;
pub mod store;

pub use config::KeystoreConfig;
pub use error::{KeystoreError, Result};
pub use keypair::Keypair;
pub use keystore::{Keystore, WalletSpec};
pub use record::WalletRecord;
pub use session::{Session, UnlockGuard};
