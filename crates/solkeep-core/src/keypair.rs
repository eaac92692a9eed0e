use ed25519_dalek::{Signature, Signer, SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{KeystoreError, Result};

/// Solana secret keys are `seed ∥ public key`.
pub const KEYPAIR_LEN: usize = 64;

pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Accepts a 64-byte keypair or a bare 32-byte seed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            KEYPAIR_LEN => {
                let mut buf = Zeroizing::new([0u8; KEYPAIR_LEN]);
                buf.copy_from_slice(bytes);
                let signing = SigningKey::from_keypair_bytes(&buf).map_err(|_| {
                    KeystoreError::Validation("public half does not match secret key".into())
                })?;
                Ok(Self { signing })
            }
            SECRET_KEY_LENGTH => {
                let mut seed = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
                seed.copy_from_slice(bytes);
                Ok(Self {
                    signing: SigningKey::from_bytes(&seed),
                })
            }
            n => Err(KeystoreError::Validation(format!(
                "secret key must be {KEYPAIR_LEN} or {SECRET_KEY_LENGTH} bytes, got {n}"
            ))),
        }
    }

    pub fn from_base58(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            bs58::decode(encoded.trim())
                .into_vec()
                .map_err(|e| KeystoreError::Validation(format!("secret key is not base58: {e}")))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Solana CLI keypair files hold a JSON array of 64 byte values.
    pub fn from_json_bytes(json: &[u8]) -> Result<Self> {
        let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(serde_json::from_slice(json)?);
        if bytes.len() != KEYPAIR_LEN {
            return Err(KeystoreError::Validation(format!(
                "keypair file must hold {KEYPAIR_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Self::from_bytes(&bytes)
    }

    pub fn address(&self) -> String {
        bs58::encode(self.signing.verifying_key().to_bytes()).into_string()
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; KEYPAIR_LEN]> {
        Zeroizing::new(self.signing.to_keypair_bytes())
    }

    pub fn to_base58(&self) -> Zeroizing<String> {
        Zeroizing::new(bs58::encode(self.to_bytes().as_slice()).into_string())
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
