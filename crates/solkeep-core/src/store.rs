//! One JSON file per wallet under `accounts/`, keyed by address.
//!
//! Reads apply migration transparently and persist upgraded records before
//! returning them. Listing fails loudly: one unreadable record aborts the whole
//! listing with an error naming the file.

use std::collections::BTreeSet;
use std::fs;
use tracing::{debug, warn};

use crate::error::{KeystoreError, Result};
use crate::fsutil::{cleanup_staging, ensure_private_dir, write_json_atomic};
use crate::migration;
use crate::paths::StoreLayout;
use crate::record::WalletRecord;

#[derive(Debug, Clone)]
pub struct RecordStore {
    layout: StoreLayout,
}

/// Base58 alphabet only, so an address can never escape `accounts/`.
pub fn is_valid_address(address: &str) -> bool {
    !address.is_empty()
        && address.len() <= 64
        && bs58::decode(address).into_vec().is_ok()
}

fn check_address(address: &str) -> Result<()> {
    if is_valid_address(address) {
        Ok(())
    } else {
        Err(KeystoreError::Validation(format!(
            "{address:?} is not a base58 address"
        )))
    }
}

impl RecordStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Idempotent lazy initialisation of the directory tree.
    pub fn init(&self) -> Result<()> {
        ensure_private_dir(self.layout.root())?;
        ensure_private_dir(&self.layout.accounts_dir())?;
        ensure_private_dir(&self.layout.backups_dir())?;
        Ok(())
    }

    /// Drop staging files left by an interrupted write. The caller must hold
    /// the store lock, otherwise a live write loses its staging file.
    pub fn recover(&self) {
        cleanup_staging(&self.layout.accounts_dir());
        cleanup_staging(self.layout.root());
    }

    pub fn exists(&self, address: &str) -> bool {
        is_valid_address(address) && self.layout.record_path(address).is_file()
    }

    pub fn create(&self, record: &WalletRecord) -> Result<()> {
        check_address(&record.public_key)?;
        self.init()?;
        if self.exists(&record.public_key) {
            return Err(KeystoreError::Duplicate(format!(
                "wallet {} already exists",
                record.public_key
            )));
        }
        self.save(record)
    }

    pub fn save(&self, record: &WalletRecord) -> Result<()> {
        check_address(&record.public_key)?;
        write_json_atomic(&self.layout.record_path(&record.public_key), record)
    }

    /// Read without migration.
    pub fn load_raw(&self, address: &str) -> Result<WalletRecord> {
        check_address(address)?;
        let path = self.layout.record_path(address);
        if !path.is_file() {
            return Err(KeystoreError::NotFound(format!("wallet {address}")));
        }
        let bytes = fs::read(&path).map_err(|e| KeystoreError::io(&path, e))?;
        let record: WalletRecord = serde_json::from_slice(&bytes).map_err(|e| {
            KeystoreError::Corrupt(format!("{}: {e}", path.display()))
        })?;
        if record.public_key != address {
            return Err(KeystoreError::Corrupt(format!(
                "{} holds publicKey {}",
                path.display(),
                record.public_key
            )));
        }
        Ok(record)
    }

    /// Every record, without migration, in address order.
    pub fn load_raw_all(&self) -> Result<Vec<WalletRecord>> {
        self.init()?;
        let dir = self.layout.accounts_dir();
        let mut addresses = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| KeystoreError::io(&dir, e))? {
            let entry = entry.map_err(|e| KeystoreError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                return Err(KeystoreError::Corrupt(format!(
                    "unreadable record file name {}",
                    path.display()
                )));
            };
            addresses.push(stem.to_string());
        }
        addresses.sort();
        addresses.iter().map(|a| self.load_raw(a)).collect()
    }

    pub fn get(&self, address: &str) -> Result<WalletRecord> {
        let mut record = self.load_raw(address)?;
        if migration::needs_migration(&record) {
            let others = if record.index.is_none() {
                self.load_raw_all()?
            } else {
                Vec::new()
            };
            if migration::migrate_record(&mut record, &others) {
                warn!(address, version = ?record.version, index = ?record.index, "migrated wallet record");
                self.save(&record)?;
            }
        }
        debug!(address, "loaded wallet record");
        Ok(record)
    }

    /// Every record whose tags include all of `tags`, ordered by index.
    pub fn list(&self, tags: &BTreeSet<String>) -> Result<Vec<WalletRecord>> {
        let mut records = self.load_raw_all()?;
        for position in migration::migrate_all(&mut records) {
            let record = &records[position];
            warn!(address = %record.public_key, version = ?record.version, index = ?record.index, "migrated wallet record");
            self.save(record)?;
        }
        records.retain(|r| r.has_all_tags(tags));
        records.sort_by(|a, b| {
            a.index
                .cmp(&b.index)
                .then_with(|| a.public_key.cmp(&b.public_key))
        });
        Ok(records)
    }

    pub fn list_all(&self) -> Result<Vec<WalletRecord>> {
        self.list(&BTreeSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::normalize_tags;
    use crate::record::{CURRENT_RECORD_VERSION, LEGACY_RECORD_VERSION};
    use tempfile::tempdir;

    fn record(address: &str, index: u64, tags: &[&str]) -> WalletRecord {
        WalletRecord {
            public_key: address.into(),
            name: None,
            tags: normalize_tags(tags),
            salt: "00".into(),
            index: Some(index),
            encrypted_private_key: "AAAA".into(),
            version: Some(CURRENT_RECORD_VERSION),
        }
    }

    fn store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(StoreLayout::new(dir.path()));
        (dir, store)
    }

    #[test]
    fn create_get_and_duplicate() {
        let (_dir, store) = store();
        let r = record("Addr1", 0, &[]);
        store.create(&r).unwrap();
        assert_eq!(store.get("Addr1").unwrap(), r);
        assert!(matches!(
            store.create(&r),
            Err(KeystoreError::Duplicate(_))
        ));
        assert!(matches!(
            store.get("Addr2"),
            Err(KeystoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_initialises_layout_on_empty_store() {
        let (dir, store) = store();
        assert!(store.list_all().unwrap().is_empty());
        assert!(dir.path().join("accounts").is_dir());
        assert!(dir.path().join("backups").is_dir());
    }

    #[test]
    fn list_filters_with_and_semantics() {
        let (_dir, store) = store();
        store.create(&record("A1", 0, &["a"])).unwrap();
        store.create(&record("A2", 1, &["a", "b"])).unwrap();
        store.create(&record("A3", 2, &["b"])).unwrap();
        let hits = store.list(&normalize_tags(["a", "b"])).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].public_key, "A2");
        assert_eq!(store.list(&normalize_tags(["b"])).unwrap().len(), 2);
    }

    #[test]
    fn legacy_record_is_migrated_and_persisted_on_get() {
        let (dir, store) = store();
        store.create(&record("A1", 3, &[])).unwrap();
        fs::write(
            dir.path().join("accounts/A2.json"),
            r#"{"publicKey":"A2","salt":"00","encryptedPrivateKey":"AAAA"}"#,
        )
        .unwrap();
        let migrated = store.get("A2").unwrap();
        assert_eq!(migrated.index, Some(4));
        assert_eq!(migrated.version, Some(LEGACY_RECORD_VERSION));
        assert_eq!(store.load_raw("A2").unwrap(), migrated);
    }

    #[test]
    fn corrupt_record_fails_the_listing() {
        let (dir, store) = store();
        store.create(&record("A1", 0, &[])).unwrap();
        fs::write(dir.path().join("accounts/A2.json"), b"{ not json").unwrap();
        assert!(matches!(
            store.list_all(),
            Err(KeystoreError::Corrupt(_))
        ));
    }

    #[test]
    fn record_under_wrong_file_name_is_corrupt() {
        let (dir, store) = store();
        store.init().unwrap();
        fs::write(
            dir.path().join("accounts/A9.json"),
            serde_json::to_vec(&record("A1", 0, &[])).unwrap(),
        )
        .unwrap();
        assert!(matches!(store.get("A9"), Err(KeystoreError::Corrupt(_))));
    }

    #[test]
    fn init_leaves_staging_files_to_recover() {
        let (dir, store) = store();
        store.init().unwrap();
        let staging = dir.path().join("accounts/0000-inflight.staging");
        fs::write(&staging, b"partial").unwrap();
        store.init().unwrap();
        assert!(staging.exists());
        store.recover();
        assert!(!staging.exists());
    }

    #[test]
    fn path_like_addresses_are_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get("../wallets"),
            Err(KeystoreError::Validation(_))
        ));
        assert!(!store.exists("../wallets"));
    }
}
