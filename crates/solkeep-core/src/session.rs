//! Per-invocation password cache.
//!
//! A `Session` is created by the command that needs signing and passed to every
//! operation that decrypts. Passwords are zeroized when cleared or when the
//! session is dropped. `unlock` returns a guard that clears the entry on drop,
//! so success and error paths both forget the password.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use zeroize::Zeroizing;

#[derive(Default)]
pub struct Session {
    passwords: RwLock<HashMap<String, Zeroizing<String>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: &str, password: &str) {
        self.passwords
            .write()
            .insert(address.to_string(), Zeroizing::new(password.to_string()));
    }

    pub fn get(&self, address: &str) -> Option<Zeroizing<String>> {
        self.passwords.read().get(address).cloned()
    }

    /// Returns whether an entry was removed.
    pub fn clear(&self, address: &str) -> bool {
        self.passwords.write().remove(address).is_some()
    }

    pub fn clear_all(&self) {
        self.passwords.write().clear();
    }

    pub fn is_unlocked(&self, address: &str) -> bool {
        self.passwords.read().contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.passwords.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache `password` for `address` until the returned guard drops.
    pub fn unlock(&self, address: &str, password: &str) -> UnlockGuard<'_> {
        self.set(address, password);
        UnlockGuard {
            session: self,
            address: address.to_string(),
        }
    }

    pub fn with_unlocked<T, E, F>(&self, address: &str, password: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Session) -> Result<T, E>,
    {
        let _guard = self.unlock(address, password);
        f(self)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.passwords.read();
        let mut unlocked: Vec<&str> = guard.keys().map(String::as_str).collect();
        unlocked.sort_unstable();
        f.debug_struct("Session")
            .field("unlocked", &unlocked)
            .finish()
    }
}

#[must_use = "the password is forgotten as soon as the guard drops"]
pub struct UnlockGuard<'a> {
    session: &'a Session,
    address: String,
}

impl UnlockGuard<'_> {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for UnlockGuard<'_> {
    fn drop(&mut self) {
        self.session.clear(&self.address);
    }
}

impl fmt::Debug for UnlockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockGuard")
            .field("address", &self.address)
            .finish()
    }
}
