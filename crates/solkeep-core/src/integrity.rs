//! Cross-record consistency checks between records, indices and the name map.

use std::collections::BTreeMap;
use std::fmt;

use crate::index;
use crate::names::{normalize, validate_format, NameMap};
use crate::record::WalletRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// Map entry points at a wallet that does not exist.
    DanglingName { name: String, address: String },
    /// Map entry points at a wallet whose record carries another name.
    MismatchedName {
        name: String,
        address: String,
        record_name: Option<String>,
    },
    /// Named record with no map entry pointing back at it.
    UnmappedName { name: String, address: String },
    DuplicateName { name: String, addresses: Vec<String> },
    InvalidName { name: String, address: String },
    DuplicateIndex { index: u64, addresses: Vec<String> },
    MissingIndex { address: String },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingName { name, address } => {
                write!(f, "name {name:?} points at missing wallet {address}")
            }
            Self::MismatchedName {
                name,
                address,
                record_name,
            } => write!(
                f,
                "name {name:?} points at {address}, whose record is named {record_name:?}"
            ),
            Self::UnmappedName { name, address } => {
                write!(f, "wallet {address} is named {name:?} but the name map has no entry")
            }
            Self::DuplicateName { name, addresses } => {
                write!(f, "name {name:?} is carried by {}", addresses.join(", "))
            }
            Self::InvalidName { name, address } => {
                write!(f, "wallet {address} has invalid name {name:?}")
            }
            Self::DuplicateIndex { index, addresses } => {
                write!(f, "index {index} is held by {}", addresses.join(", "))
            }
            Self::MissingIndex { address } => write!(f, "wallet {address} has no index"),
        }
    }
}

pub fn check(records: &[WalletRecord], names: &NameMap) -> Vec<Inconsistency> {
    let mut issues = Vec::new();
    let by_address: BTreeMap<&str, &WalletRecord> =
        records.iter().map(|r| (r.public_key.as_str(), r)).collect();

    for (name, address) in &names.wallets {
        match by_address.get(address.as_str()) {
            None => issues.push(Inconsistency::DanglingName {
                name: name.clone(),
                address: address.clone(),
            }),
            Some(record) => {
                let record_name = record.name.as_deref().map(normalize);
                if record_name.as_deref() != Some(name.as_str()) {
                    issues.push(Inconsistency::MismatchedName {
                        name: name.clone(),
                        address: address.clone(),
                        record_name,
                    });
                }
            }
        }
    }

    let mut carriers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for record in records {
        if record.index.is_none() {
            issues.push(Inconsistency::MissingIndex {
                address: record.public_key.clone(),
            });
        }
        let Some(raw) = record.name.as_deref() else {
            continue;
        };
        let name = normalize(raw);
        if validate_format(Some(raw)).is_err() {
            issues.push(Inconsistency::InvalidName {
                name: raw.to_string(),
                address: record.public_key.clone(),
            });
        }
        if names.wallets.get(&name) != Some(&record.public_key) {
            issues.push(Inconsistency::UnmappedName {
                name: name.clone(),
                address: record.public_key.clone(),
            });
        }
        carriers
            .entry(name)
            .or_default()
            .push(record.public_key.clone());
    }
    issues.extend(
        carriers
            .into_iter()
            .filter(|(_, addresses)| addresses.len() > 1)
            .map(|(name, addresses)| Inconsistency::DuplicateName { name, addresses }),
    );
    issues.extend(
        index::duplicates(records)
            .into_iter()
            .map(|(index, addresses)| Inconsistency::DuplicateIndex { index, addresses }),
    );
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(address: &str, name: Option<&str>, index: u64) -> WalletRecord {
        WalletRecord {
            public_key: address.into(),
            name: name.map(str::to_string),
            tags: BTreeSet::new(),
            salt: "00".into(),
            index: Some(index),
            encrypted_private_key: String::new(),
            version: Some(2),
        }
    }

    #[test]
    fn consistent_store_has_no_issues() {
        let records = vec![record("a", Some("alpha"), 0), record("b", None, 1)];
        let names = NameMap::rebuild(&records).unwrap();
        assert!(check(&records, &names).is_empty());
    }

    #[test]
    fn reports_each_kind_of_drift() {
        let records = vec![
            record("a", Some("alpha"), 0),
            record("b", Some("beta"), 0),
        ];
        let mut names = NameMap::default();
        names.assign("a", Some("alpha"));
        names.assign("ghost", Some("gamma"));
        let issues = check(&records, &names);
        assert!(issues.contains(&Inconsistency::DanglingName {
            name: "gamma".into(),
            address: "ghost".into()
        }));
        assert!(issues.contains(&Inconsistency::UnmappedName {
            name: "beta".into(),
            address: "b".into()
        }));
        assert!(issues.contains(&Inconsistency::DuplicateIndex {
            index: 0,
            addresses: vec!["a".into(), "b".into()]
        }));
        assert_eq!(issues.len(), 3);
    }
}
