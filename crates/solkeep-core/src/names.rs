//! Wallet names and tags.
//!
//! Names are compared in normalized form (trimmed, lower-cased). The
//! store-wide `wallets.json` maps each normalized name to exactly one address
//! and is updated under the store lock together with the record's `name`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::error::{KeystoreError, Result};
use crate::fsutil::write_json_atomic;
use crate::integrity::{self, Inconsistency};
use crate::record::WalletRecord;

pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 32;
pub const NAME_MAP_VERSION: u32 = 1;
pub const TAG_WILDCARD: &str = "*";

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*[a-zA-Z0-9]$").expect("static name pattern is valid")
});

pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Returns the normalized name, or `None` for an anonymous wallet.
pub fn validate_format(name: Option<&str>) -> Result<Option<String>> {
    let normalized = match name.map(normalize) {
        Some(n) if !n.is_empty() => n,
        _ => return Ok(None),
    };
    let len = normalized.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(KeystoreError::Validation(format!(
            "name must be {NAME_MIN_LEN}-{NAME_MAX_LEN} characters, got {len}"
        )));
    }
    if !NAME_PATTERN.is_match(&normalized) {
        return Err(KeystoreError::Validation(format!(
            "name {normalized:?} must start and end with a letter or digit and contain only letters, digits, '-' or '_'"
        )));
    }
    Ok(Some(normalized))
}

pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| normalize(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Union the given tags into the record. Returns whether anything changed.
pub fn add_tags<S: AsRef<str>>(record: &mut WalletRecord, tags: &[S]) -> Result<bool> {
    let wanted = normalize_tags(tags);
    if wanted.is_empty() {
        return Err(KeystoreError::Validation("no tags given".into()));
    }
    let before = record.tags.len();
    record.tags.extend(wanted);
    Ok(record.tags.len() != before)
}

/// Remove the given tags, or all of them when `*` is among the inputs.
pub fn remove_tags<S: AsRef<str>>(record: &mut WalletRecord, tags: &[S]) -> Result<bool> {
    if tags.iter().any(|t| t.as_ref().trim() == TAG_WILDCARD) {
        let changed = !record.tags.is_empty();
        record.tags.clear();
        return Ok(changed);
    }
    let unwanted = normalize_tags(tags);
    if unwanted.is_empty() {
        return Err(KeystoreError::Validation("no tags given".into()));
    }
    let before = record.tags.len();
    record.tags.retain(|t| !unwanted.contains(t));
    Ok(record.tags.len() != before)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMap {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub wallets: BTreeMap<String, String>,
}

impl Default for NameMap {
    fn default() -> Self {
        Self {
            version: NAME_MAP_VERSION,
            wallets: BTreeMap::new(),
        }
    }
}

impl NameMap {
    /// Raw read; a missing file is an empty map.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path).map_err(|e| KeystoreError::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.wallets.get(&normalize(name)).map(String::as_str)
    }

    pub fn name_of(&self, address: &str) -> Option<&str> {
        self.wallets
            .iter()
            .find(|(_, a)| a.as_str() == address)
            .map(|(n, _)| n.as_str())
    }

    /// `Duplicate` if `name` already belongs to a different address.
    pub fn ensure_available(&self, name: &str, address: &str) -> Result<()> {
        let normalized = normalize(name);
        match self.wallets.get(&normalized) {
            Some(owner) if owner != address => Err(KeystoreError::Duplicate(format!(
                "name {normalized:?} is already used by {owner}"
            ))),
            _ => Ok(()),
        }
    }

    /// Point `address` at `name` (or at nothing), dropping its previous entry.
    pub fn assign(&mut self, address: &str, name: Option<&str>) {
        self.wallets.retain(|_, a| a.as_str() != address);
        if let Some(name) = name {
            self.wallets.insert(normalize(name), address.to_string());
        }
    }

    /// Build the map from record names alone.
    pub fn rebuild(records: &[WalletRecord]) -> Result<Self> {
        let mut map = Self::default();
        for record in records {
            let Some(name) = record.name.as_deref().map(normalize) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            if let Some(owner) = map.wallets.get(&name) {
                return Err(KeystoreError::Duplicate(format!(
                    "name {name:?} is carried by both {owner} and {}",
                    record.public_key
                )));
            }
            map.wallets.insert(name, record.public_key.clone());
        }
        Ok(map)
    }

    /// Every disagreement between this map and the records.
    pub fn verify(&self, records: &[WalletRecord]) -> Vec<Inconsistency> {
        integrity::check(records, self)
    }
}
