//! Cipher adapter for wallet secrets.
//!
//! Key material is the pair `password ∥ salt`. The default cipher stretches it
//! with Argon2id and seals with XChaCha20-Poly1305, so a wrong password is
//! rejected by the authentication tag instead of producing garbage.
//!
//! Envelope wire format (base64-encoded into `encryptedPrivateKey`):
//!
//! ```text
//! offset  size  field
//!   0       1   envelope version
//!   1       4   argon2 memory cost, KiB (u32 LE)
//!   5       4   argon2 time cost (u32 LE)
//!   9       4   argon2 parallelism (u32 LE)
//!  13      24   nonce
//!  37     var   ciphertext + 16-byte tag
//! ```

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{KeystoreError, Result};

pub const ENVELOPE_VERSION: u8 = 1;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 24;
pub const DERIVED_KEY_LEN: usize = 32;
const HEADER_LEN: usize = 1 + 12 + NONCE_LEN;
const TAG_LEN: usize = 16;

pub const KDF_MEMORY_COST: u32 = 64 * 1024; // 64 MiB
pub const KDF_TIME_COST: u32 = 3;
pub const KDF_PARALLELISM: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: KDF_MEMORY_COST,
            iterations: KDF_TIME_COST,
            parallelism: KDF_PARALLELISM,
        }
    }
}

impl KdfParams {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(DERIVED_KEY_LEN),
        )
        .map_err(|e| KeystoreError::Crypto(format!("argon2 params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// `password ∥ salt`, kept as a pair so the KDF sees the salt separately.
pub struct KeyMaterial<'a> {
    pub password: &'a str,
    pub salt: &'a [u8],
}

impl<'a> KeyMaterial<'a> {
    pub fn new(password: &'a str, salt: &'a [u8]) -> Self {
        Self { password, salt }
    }
}

pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], key: &KeyMaterial<'_>) -> Result<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8], key: &KeyMaterial<'_>) -> Result<Zeroizing<Vec<u8>>>;
}

#[derive(Debug, Clone, Default)]
pub struct XChaChaCipher {
    params: KdfParams,
}

impl XChaChaCipher {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }
}

impl Cipher for XChaChaCipher {
    fn encrypt(&self, plaintext: &[u8], key: &KeyMaterial<'_>) -> Result<Vec<u8>> {
        let header = EnvelopeHeader {
            version: ENVELOPE_VERSION,
            kdf: self.params,
            nonce: generate_nonce(),
        };
        let derived = derive_key(key.password, key.salt, &header.kdf)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&derived[..]));
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&header.nonce), plaintext)
            .map_err(|e| KeystoreError::Crypto(format!("encrypt: {e}")))?;

        let mut out = header.to_bytes();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8], key: &KeyMaterial<'_>) -> Result<Zeroizing<Vec<u8>>> {
        if data.len() < HEADER_LEN + TAG_LEN {
            return Err(KeystoreError::Corrupt("cipher envelope truncated".into()));
        }
        let (header_bytes, ciphertext) = data.split_at(HEADER_LEN);
        let header = EnvelopeHeader::from_bytes(header_bytes)?;
        let derived = derive_key(key.password, key.salt, &header.kdf)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&derived[..]));
        let plaintext = cipher
            .decrypt(XNonce::from_slice(&header.nonce), ciphertext)
            .map_err(|_| KeystoreError::Authentication("wrong password".into()))?;
        Ok(Zeroizing::new(plaintext))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EnvelopeHeader {
    version: u8,
    kdf: KdfParams,
    nonce: [u8; NONCE_LEN],
}

impl EnvelopeHeader {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.push(self.version);
        buf.extend_from_slice(&self.kdf.memory_kib.to_le_bytes());
        buf.extend_from_slice(&self.kdf.iterations.to_le_bytes());
        buf.extend_from_slice(&self.kdf.parallelism.to_le_bytes());
        buf.extend_from_slice(&self.nonce);
        buf
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != HEADER_LEN {
            return Err(KeystoreError::Corrupt("invalid envelope header size".into()));
        }
        if buf[0] != ENVELOPE_VERSION {
            return Err(KeystoreError::Corrupt(format!(
                "unsupported envelope version {}",
                buf[0]
            )));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buf[13..HEADER_LEN]);
        Ok(Self {
            version: buf[0],
            kdf: KdfParams {
                memory_kib: read_u32(&buf[1..5]),
                iterations: read_u32(&buf[5..9]),
                parallelism: read_u32(&buf[9..13]),
            },
            nonce,
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    u32::from_le_bytes(word)
}

pub fn derive_key(
    password: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>> {
    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    params
        .argon2()?
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| KeystoreError::Crypto(format!("argon2 derive: {e}")))?;
    Ok(key)
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn encode_envelope(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn decode_envelope(encoded: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| KeystoreError::Corrupt(format!("decode encryptedPrivateKey: {e}")))
}
