//! Forward-only upgrades applied to records and the name map as they are read.
//!
//! Version history:
//!  - none: legacy records, may lack `index`, names/tags possibly not normalized
//!  - 1: versioned, index backfilled
//!  - 2: written by current code or rewritten by reindex

use std::collections::BTreeMap;

use crate::error::{KeystoreError, Result};
use crate::index::next_index;
use crate::names::{normalize, normalize_tags, NameMap, NAME_MAP_VERSION};
use crate::record::{WalletRecord, CURRENT_RECORD_VERSION, LEGACY_RECORD_VERSION};

fn is_newer(record: &WalletRecord) -> bool {
    record.version.map_or(false, |v| v > CURRENT_RECORD_VERSION)
}

pub fn needs_migration(record: &WalletRecord) -> bool {
    if is_newer(record) {
        return false;
    }
    record.version.is_none()
        || record.index.is_none()
        || normalize_tags(&record.tags) != record.tags
        || record
            .name
            .as_deref()
            .map_or(false, |name| normalize(name) != name)
}

/// Upgrade a single record. `others` must hold the rest of the store when the
/// index needs backfilling. Returns whether anything changed.
pub fn migrate_record(record: &mut WalletRecord, others: &[WalletRecord]) -> bool {
    upgrade(record, || next_index(others))
}

/// Upgrade a full listing in place and return the positions that changed.
/// Missing indices are handed out above the current maximum, in slice order.
pub fn migrate_all(records: &mut [WalletRecord]) -> Vec<usize> {
    let mut next = next_index(records);
    let mut changed = Vec::new();
    for (position, record) in records.iter_mut().enumerate() {
        let upgraded = upgrade(record, || {
            let index = next;
            next += 1;
            index
        });
        if upgraded {
            changed.push(position);
        }
    }
    changed
}

fn upgrade(record: &mut WalletRecord, backfill: impl FnOnce() -> u64) -> bool {
    if !needs_migration(record) {
        return false;
    }
    if record.version.is_none() {
        record.version = Some(LEGACY_RECORD_VERSION);
    }
    if record.index.is_none() {
        record.index = Some(backfill());
    }
    record.tags = normalize_tags(&record.tags);
    record.name = record
        .name
        .as_deref()
        .map(normalize)
        .filter(|name| !name.is_empty());
    true
}

/// Normalize keys of an unversioned name map. Returns whether it changed.
pub fn migrate_name_map(map: &mut NameMap) -> Result<bool> {
    if map.version >= NAME_MAP_VERSION {
        return Ok(false);
    }
    let mut normalized: BTreeMap<String, String> = BTreeMap::new();
    for (name, address) in &map.wallets {
        let key = normalize(name);
        match normalized.get(&key) {
            Some(existing) if existing != address => {
                return Err(KeystoreError::Corrupt(format!(
                    "names {name:?} and another entry collide as {key:?}"
                )));
            }
            _ => {
                normalized.insert(key, address.clone());
            }
        }
    }
    map.wallets = normalized;
    map.version = NAME_MAP_VERSION;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn legacy(address: &str, index: Option<u64>) -> WalletRecord {
        WalletRecord {
            public_key: address.into(),
            name: None,
            tags: BTreeSet::new(),
            salt: "00".into(),
            index,
            encrypted_private_key: String::new(),
            version: None,
        }
    }

    #[test]
    fn assigns_version_and_backfills_index() {
        let others = vec![legacy("a", Some(4))];
        let mut record = legacy("b", None);
        assert!(migrate_record(&mut record, &others));
        assert_eq!(record.version, Some(LEGACY_RECORD_VERSION));
        assert_eq!(record.index, Some(5));
        assert!(!needs_migration(&record));
    }

    #[test]
    fn migration_is_idempotent() {
        let mut record = legacy("a", Some(0));
        record.name = Some(" Vault ".into());
        record.tags = ["Hot".to_string()].into_iter().collect();
        assert!(migrate_record(&mut record, &[]));
        let once = record.clone();
        assert!(!migrate_record(&mut record, &[]));
        assert_eq!(record, once);
        assert_eq!(record.name.as_deref(), Some("vault"));
        assert!(record.tags.contains("hot"));
    }

    #[test]
    fn newer_records_are_left_alone() {
        let mut record = legacy("a", None);
        record.version = Some(CURRENT_RECORD_VERSION + 1);
        assert!(!migrate_record(&mut record, &[]));
        assert_eq!(record.index, None);
    }

    #[test]
    fn current_records_keep_their_version() {
        let mut record = legacy("a", Some(1));
        record.version = Some(CURRENT_RECORD_VERSION);
        assert!(!migrate_record(&mut record, &[]));
        assert_eq!(record.version, Some(CURRENT_RECORD_VERSION));
    }

    #[test]
    fn migrate_all_hands_out_distinct_indices() {
        let mut records = vec![legacy("a", None), legacy("b", Some(2)), legacy("c", None)];
        let changed = migrate_all(&mut records);
        assert_eq!(changed, vec![0, 1, 2]);
        let indices: Vec<_> = records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![Some(3), Some(2), Some(4)]);
    }

    #[test]
    fn name_map_keys_normalized_once() {
        let mut map = NameMap {
            version: 0,
            wallets: [("Vault ".to_string(), "addr1".to_string())]
                .into_iter()
                .collect(),
        };
        assert!(migrate_name_map(&mut map).unwrap());
        assert_eq!(map.lookup("vault"), Some("addr1"));
        assert_eq!(map.version, NAME_MAP_VERSION);
        assert!(!migrate_name_map(&mut map).unwrap());
    }

    #[test]
    fn colliding_legacy_names_are_corrupt() {
        let mut map = NameMap {
            version: 0,
            wallets: [
                ("Vault".to_string(), "addr1".to_string()),
                ("vault".to_string(), "addr2".to_string()),
            ]
            .into_iter()
            .collect(),
        };
        assert!(matches!(
            migrate_name_map(&mut map),
            Err(KeystoreError::Corrupt(_))
        ));
    }
}
