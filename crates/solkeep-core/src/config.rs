use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::crypto::KdfParams;
use crate::error::{KeystoreError, Result};
use crate::paths::{data_dir, StoreLayout};

pub const DEFAULT_SPREAD_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct KeystoreConfig {
    pub home: PathBuf,
    pub kdf: KdfParams,
    pub spread_batch_size: usize,
}

/// Optional `<home>/config.json`. Every field may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub kdf: Option<KdfParams>,
    #[serde(default)]
    pub spread_batch_size: Option<usize>,
}

impl KeystoreConfig {
    pub fn with_home(home: impl AsRef<Path>) -> Self {
        Self {
            home: home.as_ref().to_path_buf(),
            kdf: KdfParams::default(),
            spread_batch_size: DEFAULT_SPREAD_BATCH_SIZE,
        }
    }

    /// Resolve the home directory (explicit override, then `SOLKEEP_HOME`,
    /// then the platform data dir) and apply `config.json` if present.
    pub fn load(home_override: Option<PathBuf>) -> Result<Self> {
        let home = match home_override {
            Some(home) => home,
            None => data_dir()?,
        };
        let mut config = Self::with_home(&home);
        if let Some(file) = load_config_file(&StoreLayout::new(&home).config_path())? {
            config.apply(file)?;
        }
        Ok(config)
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.home)
    }

    fn apply(&mut self, file: ConfigFile) -> Result<()> {
        if let Some(kdf) = file.kdf {
            self.kdf = kdf;
        }
        if let Some(batch) = file.spread_batch_size {
            if batch == 0 {
                return Err(KeystoreError::Validation(
                    "spreadBatchSize must be at least 1".into(),
                ));
            }
            self.spread_batch_size = batch;
        }
        Ok(())
    }
}

fn load_config_file(path: &Path) -> Result<Option<ConfigFile>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "loading config file");
    let bytes = fs::read(path).map_err(|e| KeystoreError::io(path, e))?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}
