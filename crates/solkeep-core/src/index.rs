//! Sequential wallet indices.
//!
//! Indices are unique but may have gaps until `reindex` runs. The store has no
//! cross-file transaction, so callers hold the store lock between
//! `next_index`/`validate_index` and the write that uses the result.

use std::collections::BTreeMap;

use crate::error::{KeystoreError, Result};
use crate::record::{WalletRecord, CURRENT_RECORD_VERSION};

/// `max + 1`, or 0 for an empty store. Records without an index are ignored.
pub fn next_index(records: &[WalletRecord]) -> u64 {
    records
        .iter()
        .filter_map(|r| r.index)
        .max()
        .map_or(0, |max| max + 1)
}

pub fn validate_index(records: &[WalletRecord], index: u64) -> Result<()> {
    match records.iter().find(|r| r.index == Some(index)) {
        Some(holder) => Err(KeystoreError::Duplicate(format!(
            "index {index} already held by {}",
            holder.public_key
        ))),
        None => Ok(()),
    }
}

pub fn allocate(records: &[WalletRecord]) -> Result<u64> {
    let index = next_index(records);
    validate_index(records, index)?;
    Ok(index)
}

/// Sort by address and hand out `0..n`. Address order stands in for creation
/// order, which the store does not record.
pub fn reindex(mut records: Vec<WalletRecord>) -> Vec<WalletRecord> {
    records.sort_by(|a, b| a.public_key.cmp(&b.public_key));
    for (position, record) in records.iter_mut().enumerate() {
        record.index = Some(position as u64);
        record.version = Some(
            record
                .version
                .map_or(CURRENT_RECORD_VERSION, |v| v.max(CURRENT_RECORD_VERSION)),
        );
    }
    records
}

/// Indices held by more than one record.
pub fn duplicates(records: &[WalletRecord]) -> BTreeMap<u64, Vec<String>> {
    let mut holders: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for record in records {
        if let Some(index) = record.index {
            holders
                .entry(index)
                .or_default()
                .push(record.public_key.clone());
        }
    }
    holders.retain(|_, addresses| addresses.len() > 1);
    holders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LEGACY_RECORD_VERSION;

    fn record(address: &str, index: Option<u64>) -> WalletRecord {
        WalletRecord {
            public_key: address.into(),
            name: None,
            tags: Default::default(),
            salt: "00".into(),
            index,
            encrypted_private_key: String::new(),
            version: Some(LEGACY_RECORD_VERSION),
        }
    }

    #[test]
    fn empty_store_starts_at_zero() {
        assert_eq!(next_index(&[]), 0);
    }

    #[test]
    fn next_index_follows_max_not_count() {
        let records = vec![record("a", Some(0)), record("b", Some(7)), record("c", None)];
        assert_eq!(next_index(&records), 8);
        assert_eq!(allocate(&records).unwrap(), 8);
    }

    #[test]
    fn validate_rejects_taken_index() {
        let records = vec![record("a", Some(2))];
        assert!(matches!(
            validate_index(&records, 2),
            Err(KeystoreError::Duplicate(_))
        ));
        assert!(validate_index(&records, 3).is_ok());
    }

    #[test]
    fn reindex_orders_by_address_and_is_idempotent() {
        let records = vec![
            record("c", Some(4)),
            record("a", Some(4)),
            record("b", None),
        ];
        let once = reindex(records);
        let assigned: Vec<_> = once
            .iter()
            .map(|r| (r.public_key.as_str(), r.index))
            .collect();
        assert_eq!(assigned, vec![("a", Some(0)), ("b", Some(1)), ("c", Some(2))]);
        assert!(once
            .iter()
            .all(|r| r.version == Some(CURRENT_RECORD_VERSION)));

        let twice = reindex(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicates_reports_shared_indices() {
        let records = vec![record("a", Some(1)), record("b", Some(1)), record("c", Some(2))];
        let dups = duplicates(&records);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[&1], vec!["a".to_string(), "b".to_string()]);
    }
}
