//! Keystore layout v4.
//!
//! ```text
//! {
//!   "crypto": {
//!     "kdf":      { "function": "pbkdf2", "params": { "dklen", "c", "prf", "salt" }, "message": "" },
//!     "checksum": { "function": "sha256", "params": {}, "message": <hex> },
//!     "cipher":   { "function": "aes-128-ctr", "params": { "iv" }, "message": <hex> }
//!   },
//!   "description", "pubkey", "path", "uuid", "version": 4
//! }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::decode_hex;
use crate::crypto::{CHECKSUM_LEN, DK_LEN, IV_LEN, KdfParams};
use crate::error::KeystoreError;
use crate::keystore::KeystoreRecord;

pub const VERSION_V4: u32 = 4;

pub const KDF_FUNCTION: &str = "pbkdf2";
pub const KDF_PRF: &str = "hmac-sha256";
pub const CHECKSUM_FUNCTION: &str = "sha256";
pub const CIPHER_FUNCTION: &str = "aes-128-ctr";

#[derive(Serialize, Deserialize)]
struct Document {
    crypto: Crypto,
    #[serde(default)]
    description: String,
    pubkey: String,
    path: String,
    #[serde(default)]
    uuid: String,
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct Crypto {
    kdf: Module<Pbkdf2Params>,
    checksum: Module<EmptyParams>,
    cipher: Module<CipherParams>,
}

#[derive(Serialize, Deserialize)]
struct Module<P> {
    function: String,
    params: P,
    #[serde(default)]
    message: String,
}

#[derive(Serialize, Deserialize)]
struct Pbkdf2Params {
    dklen: u32,
    c: u32,
    prf: String,
    salt: String,
}

#[derive(Serialize, Deserialize, Default)]
struct EmptyParams {}

#[derive(Serialize, Deserialize)]
struct CipherParams {
    iv: String,
}

fn unsupported(what: &str, got: &str) -> KeystoreError {
    KeystoreError::Unsupported(format!("{what} '{got}'"))
}

/// Parses a v4 keystore document.
///
/// # Errors
///
/// Returns an error on missing fields, bad hex, wrong lengths, or algorithms
/// other than pbkdf2 / aes-128-ctr / sha256.
pub fn parse(data: &str) -> Result<KeystoreRecord, KeystoreError> {
    let doc: Document =
        serde_json::from_str(data).map_err(|e| KeystoreError::Malformed(e.to_string()))?;

    if doc.version != VERSION_V4 {
        return Err(KeystoreError::Unsupported(format!("version {}", doc.version)));
    }

    let kdf = &doc.crypto.kdf;
    if kdf.function != KDF_FUNCTION {
        return Err(unsupported("kdf function", &kdf.function));
    }
    if kdf.params.prf != KDF_PRF {
        return Err(unsupported("kdf prf", &kdf.params.prf));
    }
    if kdf.params.dklen as usize != DK_LEN {
        return Err(KeystoreError::Malformed(format!(
            "dklen must be {DK_LEN}, got {}",
            kdf.params.dklen
        )));
    }
    let kdf_params =
        KdfParams::new(kdf.params.c).map_err(|e| KeystoreError::Malformed(e.to_string()))?;
    let salt = decode_hex("kdf salt", &kdf.params.salt)?;
    if salt.is_empty() {
        return Err(KeystoreError::Malformed("kdf salt is empty".into()));
    }

    let checksum = &doc.crypto.checksum;
    if checksum.function != CHECKSUM_FUNCTION {
        return Err(unsupported("checksum function", &checksum.function));
    }
    let checksum: [u8; CHECKSUM_LEN] = decode_hex("checksum", &checksum.message)?
        .try_into()
        .map_err(|_| KeystoreError::Malformed("checksum must be 32 bytes".into()))?;

    let cipher = &doc.crypto.cipher;
    if cipher.function != CIPHER_FUNCTION {
        return Err(unsupported("cipher function", &cipher.function));
    }
    let iv: [u8; IV_LEN] = decode_hex("cipher iv", &cipher.params.iv)?
        .try_into()
        .map_err(|_| KeystoreError::Malformed("cipher iv must be 16 bytes".into()))?;
    let ciphertext = decode_hex("cipher message", &cipher.message)?;

    let public_key = decode_hex("pubkey", &doc.pubkey)?;

    Ok(KeystoreRecord::from_parts(
        kdf_params,
        salt,
        iv,
        checksum,
        ciphertext,
        public_key,
        doc.path,
        doc.uuid,
        doc.description,
    ))
}

/// Serializes a record to a pretty-printed v4 document.
///
/// # Errors
///
/// Returns an error if the record is not v4.
pub fn serialize(record: &KeystoreRecord) -> Result<String> {
    if record.version() != VERSION_V4 {
        bail!("wrong version for v4 serializer");
    }

    let doc = Document {
        crypto: Crypto {
            kdf: Module {
                function: KDF_FUNCTION.into(),
                params: Pbkdf2Params {
                    dklen: DK_LEN as u32,
                    c: record.kdf().iterations(),
                    prf: KDF_PRF.into(),
                    salt: hex::encode(record.salt()),
                },
                message: String::new(),
            },
            checksum: Module {
                function: CHECKSUM_FUNCTION.into(),
                params: EmptyParams::default(),
                message: hex::encode(record.checksum()),
            },
            cipher: Module {
                function: CIPHER_FUNCTION.into(),
                params: CipherParams {
                    iv: hex::encode(record.iv()),
                },
                message: hex::encode(record.ciphertext()),
            },
        },
        description: record.description().to_owned(),
        pubkey: hex::encode(record.public_key()),
        path: record.path().to_owned(),
        uuid: record.uuid().to_owned(),
        version: VERSION_V4,
    };

    serde_json::to_string_pretty(&doc).context("failed to serialize keystore")
}
