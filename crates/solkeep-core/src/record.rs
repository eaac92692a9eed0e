use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{KeystoreError, Result};

/// Records written before versioning carry no `version` field.
pub const LEGACY_RECORD_VERSION: u32 = 1;
pub const CURRENT_RECORD_VERSION: u32 = 2;

/// One wallet, persisted as `accounts/<publicKey>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    pub salt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    pub encrypted_private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl WalletRecord {
    pub fn address(&self) -> &str {
        &self.public_key
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.salt).map_err(|e| {
            KeystoreError::Corrupt(format!("salt of {} is not hex: {e}", self.public_key))
        })
    }

    /// AND semantics: every requested tag must be present.
    pub fn has_all_tags(&self, wanted: &BTreeSet<String>) -> bool {
        wanted.iter().all(|tag| self.tags.contains(tag))
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.public_key)
    }
}
