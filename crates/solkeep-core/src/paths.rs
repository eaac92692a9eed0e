use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::error::{KeystoreError, Result};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "solkeep";
pub const APP_NAME: &str = "solkeep";

pub const HOME_ENV: &str = "SOLKEEP_HOME";

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| KeystoreError::NotFound("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

/// Fixed on-disk layout under the store root.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn accounts_dir(&self) -> PathBuf {
        self.root.join("accounts")
    }

    pub fn record_path(&self, address: &str) -> PathBuf {
        self.accounts_dir().join(format!("{address}.json"))
    }

    pub fn name_map_path(&self) -> PathBuf {
        self.root.join("wallets.json")
    }

    /// Created alongside the store; nothing reads or writes it yet.
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_disk_format() {
        let layout = StoreLayout::new("/tmp/solkeep");
        assert_eq!(
            layout.record_path("Abc"),
            PathBuf::from("/tmp/solkeep/accounts/Abc.json")
        );
        assert_eq!(
            layout.name_map_path(),
            PathBuf::from("/tmp/solkeep/wallets.json")
        );
        assert_eq!(layout.backups_dir(), PathBuf::from("/tmp/solkeep/backups"));
    }
}
