use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

use crate::error::{KeystoreError, Result};

const STAGING_SUFFIX: &str = ".staging";

pub fn ensure_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| KeystoreError::io(path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
            warn!("cannot restrict permissions on {}: {}", path.display(), e);
        }
    }
    Ok(())
}

/// Pretty JSON written to a staging file in the same directory, synced, then
/// renamed over `dest`.
pub fn write_json_atomic<T: Serialize>(dest: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(dest, &bytes)
}

pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| KeystoreError::Validation(format!("{} has no parent", dest.display())))?;
    fs::create_dir_all(parent).map_err(|e| KeystoreError::io(parent, e))?;
    let staging_path = parent.join(format!("{}{STAGING_SUFFIX}", Uuid::new_v4()));
    {
        let mut file = create_private_file(&staging_path)?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| KeystoreError::io(&staging_path, e))?;
    }
    if let Err(e) = fs::rename(&staging_path, dest) {
        let _ = fs::remove_file(&staging_path);
        return Err(KeystoreError::io(dest, e));
    }
    fsync_dir(parent)
}

/// Remove leftover staging files from an interrupted write.
pub fn cleanup_staging(dir: &Path) {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().ends_with(STAGING_SUFFIX) {
                warn!(path = %entry.path().display(), "removing orphaned staging file");
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

fn create_private_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create_new(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|e| KeystoreError::io(path, e))
}

fn fsync_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| KeystoreError::io(path, e))?;
        dir.sync_all().map_err(|e| KeystoreError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
