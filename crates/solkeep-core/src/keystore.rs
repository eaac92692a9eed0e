use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::KeystoreConfig;
use crate::crypto::{
    decode_envelope, encode_envelope, generate_salt, Cipher, KeyMaterial, XChaChaCipher,
};
use crate::error::{KeystoreError, Result};
use crate::index;
use crate::integrity::Inconsistency;
use crate::keypair::{Keypair, KEYPAIR_LEN};
use crate::ledger::{LedgerClient, WalletBalance};
use crate::lock::StoreLock;
use crate::migration;
use crate::names::{self, NameMap};
use crate::record::{WalletRecord, CURRENT_RECORD_VERSION};
use crate::session::{Session, UnlockGuard};
use crate::store::{is_valid_address, RecordStore};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Entry point for every wallet operation. Each public method holds the
/// store lock for its whole duration.
pub struct Keystore {
    config: KeystoreConfig,
    store: RecordStore,
    cipher: Box<dyn Cipher>,
}

#[derive(Debug, Clone)]
pub struct WalletSpec<'a> {
    pub name: Option<&'a str>,
    pub tags: &'a [String],
}

impl<'a> WalletSpec<'a> {
    pub fn anonymous() -> Self {
        Self {
            name: None,
            tags: &[],
        }
    }

    pub fn named(name: &'a str) -> Self {
        Self {
            name: Some(name),
            tags: &[],
        }
    }
}

impl Keystore {
    pub fn open(config: KeystoreConfig) -> Result<Self> {
        let cipher = XChaChaCipher::new(config.kdf);
        Self::with_cipher(config, cipher)
    }

    pub fn with_cipher(config: KeystoreConfig, cipher: impl Cipher + 'static) -> Result<Self> {
        let layout = config.layout();
        let store = RecordStore::new(layout.clone());
        store.init()?;
        match StoreLock::try_acquire(layout.lock_path())? {
            Some(_lock) => store.recover(),
            None => debug!("store busy, leaving staging files to their writer"),
        }
        Ok(Self {
            config,
            store,
            cipher: Box::new(cipher),
        })
    }

    pub fn config(&self) -> &KeystoreConfig {
        &self.config
    }

    fn lock(&self) -> Result<StoreLock> {
        StoreLock::acquire(self.config.layout().lock_path())
    }

    /// Name map with migration applied and persisted.
    fn load_names(&self) -> Result<NameMap> {
        let path = self.config.layout().name_map_path();
        let mut names = NameMap::load(&path)?;
        if migration::migrate_name_map(&mut names)? {
            warn!(path = %path.display(), "migrated name map");
            names.save(&path)?;
        }
        Ok(names)
    }

    fn save_names(&self, names: &NameMap) -> Result<()> {
        names.save(&self.config.layout().name_map_path())
    }

    pub fn generate(&self, password: &str, spec: WalletSpec<'_>) -> Result<(WalletRecord, Keypair)> {
        let keypair = Keypair::generate();
        let record = self.insert(&keypair, password, spec)?;
        Ok((record, keypair))
    }

    pub fn import(&self, keypair: &Keypair, password: &str, spec: WalletSpec<'_>) -> Result<WalletRecord> {
        self.insert(keypair, password, spec)
    }

    fn insert(&self, keypair: &Keypair, password: &str, spec: WalletSpec<'_>) -> Result<WalletRecord> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(KeystoreError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let name = names::validate_format(spec.name)?;
        let tags = names::normalize_tags(spec.tags);
        let address = keypair.address();

        let _lock = self.lock()?;
        let mut name_map = self.load_names()?;
        if self.store.exists(&address) {
            return Err(KeystoreError::Duplicate(format!("wallet {address} already exists")));
        }
        let records = self.store.list_all()?;
        if let Some(name) = &name {
            ensure_name_free(&name_map, &records, name, &address)?;
        }
        let index = index::allocate(&records)?;

        let salt = generate_salt();
        let secret = keypair.to_base58();
        let envelope = self
            .cipher
            .encrypt(secret.as_bytes(), &KeyMaterial::new(password, &salt))?;
        let record = WalletRecord {
            public_key: address.clone(),
            name: name.clone(),
            tags,
            salt: hex::encode(salt),
            index: Some(index),
            encrypted_private_key: encode_envelope(&envelope),
            version: Some(CURRENT_RECORD_VERSION),
        };
        self.store.create(&record)?;
        if name.is_some() {
            name_map.assign(&address, name.as_deref());
            self.save_names(&name_map)?;
        }
        info!(address = %address, index, name = ?record.name, "wallet created");
        Ok(record)
    }

    pub fn list<S: AsRef<str>>(&self, tags: &[S]) -> Result<Vec<WalletRecord>> {
        let _lock = self.lock()?;
        self.store.list(&names::normalize_tags(tags))
    }

    pub fn resolve(&self, name_or_address: &str) -> Result<String> {
        let _lock = self.lock()?;
        self.resolve_locked(name_or_address)
    }

    /// Name lookup first, then the input as a literal address.
    fn resolve_locked(&self, name_or_address: &str) -> Result<String> {
        let name_map = self.load_names()?;
        if let Some(address) = name_map.lookup(name_or_address) {
            if !self.store.exists(address) {
                return Err(KeystoreError::Corrupt(format!(
                    "name {:?} points at missing wallet {address}",
                    names::normalize(name_or_address)
                )));
            }
            return Ok(address.to_string());
        }
        let candidate = name_or_address.trim();
        if is_valid_address(candidate) && self.store.exists(candidate) {
            return Ok(candidate.to_string());
        }
        let records = self.store.load_raw_all()?;
        if let Some(holder) = unmapped_holder(&name_map, &records, candidate) {
            return Err(unmapped_error(candidate, holder));
        }
        Err(KeystoreError::NotFound(format!("no wallet named or addressed {candidate:?}")))
    }

    pub fn get(&self, name_or_address: &str) -> Result<WalletRecord> {
        let _lock = self.lock()?;
        let address = self.resolve_locked(name_or_address)?;
        self.store.get(&address)
    }

    /// Set or clear (`None`) a wallet's name.
    pub fn rename(&self, wallet: &str, new_name: Option<&str>) -> Result<WalletRecord> {
        let new_name = names::validate_format(new_name)?;
        let _lock = self.lock()?;
        let address = self.resolve_locked(wallet)?;
        let mut name_map = self.load_names()?;
        if let Some(name) = &new_name {
            let records = self.store.list_all()?;
            ensure_name_free(&name_map, &records, name, &address)?;
        }
        let mut record = self.store.get(&address)?;
        let previous = record.name.take();
        record.name = new_name;
        self.store.save(&record)?;
        name_map.assign(&address, record.name.as_deref());
        self.save_names(&name_map)?;
        info!(address = %address, from = ?previous, to = ?record.name, "wallet renamed");
        Ok(record)
    }

    pub fn add_tags<S: AsRef<str>>(&self, wallet: &str, tags: &[S]) -> Result<WalletRecord> {
        let _lock = self.lock()?;
        let address = self.resolve_locked(wallet)?;
        let mut record = self.store.get(&address)?;
        if names::add_tags(&mut record, tags)? {
            self.store.save(&record)?;
            info!(address = %address, tags = ?record.tags, "wallet tagged");
        }
        Ok(record)
    }

    pub fn remove_tags<S: AsRef<str>>(&self, wallet: &str, tags: &[S]) -> Result<WalletRecord> {
        let _lock = self.lock()?;
        let address = self.resolve_locked(wallet)?;
        let mut record = self.store.get(&address)?;
        if names::remove_tags(&mut record, tags)? {
            self.store.save(&record)?;
            info!(address = %address, tags = ?record.tags, "wallet untagged");
        }
        Ok(record)
    }

    /// Reassign indices `0..n` in address order and rebuild the name map from
    /// record names.
    pub fn reindex(&self) -> Result<Vec<WalletRecord>> {
        let _lock = self.lock()?;
        let records = index::reindex(self.store.list_all()?);
        let name_map = NameMap::rebuild(&records)?;
        for record in &records {
            self.store.save(record)?;
        }
        self.save_names(&name_map)?;
        info!(count = records.len(), "wallets reindexed");
        Ok(records)
    }

    pub fn check(&self) -> Result<Vec<Inconsistency>> {
        let _lock = self.lock()?;
        let records = self.store.list_all()?;
        let name_map = self.load_names()?;
        Ok(name_map.verify(&records))
    }

    /// Verify `password` against the wallet and cache it in `session` until
    /// the guard drops.
    pub fn unlock<'s>(
        &self,
        session: &'s Session,
        wallet: &str,
        password: &str,
    ) -> Result<UnlockGuard<'s>> {
        let _lock = self.lock()?;
        let address = self.resolve_locked(wallet)?;
        let record = self.store.get(&address)?;
        self.decrypt_record(&record, password)?;
        debug!(address = %address, "wallet unlocked");
        Ok(session.unlock(&address, password))
    }

    /// Decrypt the keypair of a wallet previously unlocked in `session`.
    pub fn keypair(&self, session: &Session, address: &str) -> Result<Keypair> {
        let password = session.get(address).ok_or_else(|| {
            KeystoreError::Authentication(format!("wallet {address} is not unlocked"))
        })?;
        let _lock = self.lock()?;
        let record = self.store.get(address)?;
        self.decrypt_record(&record, &password)
    }

    fn decrypt_record(&self, record: &WalletRecord, password: &str) -> Result<Keypair> {
        let salt = record.salt_bytes()?;
        let envelope = decode_envelope(&record.encrypted_private_key)?;
        let plaintext = self
            .cipher
            .decrypt(&envelope, &KeyMaterial::new(password, &salt))?;
        let secret = Zeroizing::new(
            std::str::from_utf8(&plaintext)
                .ok()
                .and_then(|text| bs58::decode(text).into_vec().ok())
                .ok_or_else(|| KeystoreError::Authentication("decrypted secret is not base58".into()))?,
        );
        if secret.len() != KEYPAIR_LEN {
            return Err(KeystoreError::Authentication(format!(
                "decrypted secret is {} bytes, expected {KEYPAIR_LEN}",
                secret.len()
            )));
        }
        let keypair = Keypair::from_bytes(&secret)
            .map_err(|e| KeystoreError::Authentication(e.to_string()))?;
        if keypair.address() != record.public_key {
            return Err(KeystoreError::Authentication(format!(
                "decrypted key does not belong to {}",
                record.public_key
            )));
        }
        Ok(keypair)
    }

    /// Listed wallets joined with their ledger balances. Wallets the ledger
    /// does not report get a zero balance.
    pub async fn balances<S: AsRef<str>>(
        &self,
        ledger: &dyn LedgerClient,
        tags: &[S],
    ) -> Result<Vec<(WalletRecord, WalletBalance)>> {
        let records = self.list(tags)?;
        let addresses: Vec<String> = records.iter().map(|r| r.public_key.clone()).collect();
        let mut balances = ledger.get_wallet_balances(&addresses).await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let balance = balances.remove(&record.public_key).unwrap_or_default();
                (record, balance)
            })
            .collect())
    }
}

/// `Duplicate` if the map gives `name` to another wallet, `Corrupt` if another
/// record carries it without a map entry.
fn ensure_name_free(
    name_map: &NameMap,
    records: &[WalletRecord],
    name: &str,
    address: &str,
) -> Result<()> {
    name_map.ensure_available(name, address)?;
    match unmapped_holder(name_map, records, name) {
        Some(holder) if holder.public_key != address => Err(unmapped_error(name, holder)),
        _ => Ok(()),
    }
}

/// Record whose name normalizes to `name` but that the map does not point at.
fn unmapped_holder<'r>(
    name_map: &NameMap,
    records: &'r [WalletRecord],
    name: &str,
) -> Option<&'r WalletRecord> {
    let wanted = names::normalize(name);
    if wanted.is_empty() {
        return None;
    }
    records.iter().find(|record| {
        record.name.as_deref().map(names::normalize).as_deref() == Some(wanted.as_str())
            && name_map.lookup(&wanted) != Some(record.public_key.as_str())
    })
}

fn unmapped_error(name: &str, holder: &WalletRecord) -> KeystoreError {
    KeystoreError::Corrupt(format!(
        "wallet {} is named {:?} but the name map has no entry for it; run reindex",
        holder.public_key,
        names::normalize(name)
    ))
}

/// Tags given on the command line as `a,b,c`.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
