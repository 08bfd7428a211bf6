//! Sealing of the stored bearer credential
//!
//! Tokens are sealed with AES-256-GCM. The record format version and a fixed
//! purpose label are bound in as associated data, so a record only opens as
//! the kind of record it was written as. Keys come either from a passphrase
//! or from this machine's identity, both stretched with Argon2id.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use threatfeed_core::{Error, Result};

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Current on-disk record version
pub const SEAL_VERSION: u8 = 1;
const PURPOSE: &[u8] = b"threatfeed/bearer-token";

const MACHINE_SALT: &[u8] = b"threatfeed/machine-key/v1";
const PASSPHRASE_SALT: &[u8] = b"threatfeed/passphrase-key/v1";

/// A sealed bearer token as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedToken {
    pub version: u8,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl SealedToken {
    fn aad(version: u8) -> Vec<u8> {
        let mut aad = PURPOSE.to_vec();
        aad.push(version);
        aad
    }
}

/// Seals and opens bearer tokens under one key
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn from_key(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Key stretched from a user-supplied passphrase
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(Error::EncryptionError("passphrase is empty".into()));
        }
        Ok(Self::from_key(&stretch(passphrase.as_bytes(), PASSPHRASE_SALT)?))
    }

    /// Key bound to this machine; records do not open anywhere else
    pub fn machine_bound() -> Result<Self> {
        Ok(Self::from_key(&machine_key()?))
    }

    pub fn seal(&self, token: &str) -> Result<SealedToken> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let aad = SealedToken::aad(SEAL_VERSION);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: token.as_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|_| Error::EncryptionError("sealing the token failed".into()))?;

        Ok(SealedToken {
            version: SEAL_VERSION,
            nonce,
            ciphertext,
        })
    }

    /// Fails on a wrong key, a tampered record, or an unknown version
    pub fn open(&self, sealed: &SealedToken) -> Result<String> {
        if sealed.version != SEAL_VERSION {
            return Err(Error::EncryptionError(format!(
                "unsupported credential record version {}",
                sealed.version
            )));
        }

        let aad = SealedToken::aad(sealed.version);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&sealed.nonce),
                Payload {
                    msg: &sealed.ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                Error::EncryptionError("credential record does not open with this key".into())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::EncryptionError("sealed token is not UTF-8".into()))
    }
}

/// Argon2id with the library's recommended cost, fixed to a 32-byte output
fn stretch(secret: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(
        Params::DEFAULT_M_COST,
        Params::DEFAULT_T_COST,
        Params::DEFAULT_P_COST,
        Some(KEY_LEN),
    )
    .map_err(|e| Error::EncryptionError(format!("argon2 params: {}", e)))?;

    let mut key = [0u8; KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(secret, salt, &mut key)
        .map_err(|e| Error::EncryptionError(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

/// Machine id and host name; either may be missing on odd platforms
pub fn machine_identity() -> String {
    let id = machine_uid::get().unwrap_or_default();
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default();
    format!("{}@{}", id, host)
}

pub fn machine_key() -> Result<[u8; KEY_LEN]> {
    stretch(machine_identity().as_bytes(), MACHINE_SALT)
}
