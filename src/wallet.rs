//! Version 3 wallet files (scrypt + AES-128-CTR + Keccak MAC) for
//! secp256k1 account keys.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{self, CHECKSUM_LEN, CIPHER_KEY_LEN, DK_LEN, IV_LEN, SALT_LEN, ScryptParams};
use crate::error::{Error, KeystoreError};
use crate::format::decode_hex;
use crate::secp::{self, EthKeyPair};

pub const VERSION: u32 = 3;
const CIPHER: &str = "aes-128-ctr";
const KDF: &str = "scrypt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletFile {
    pub address: String,
    pub id: String,
    pub version: u32,
    pub crypto: WalletCrypto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCrypto {
    pub cipher: String,
    pub ciphertext: String,
    pub cipherparams: CipherParams,
    pub kdf: String,
    pub kdfparams: ScryptKdfParams,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    pub iv: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptKdfParams {
    pub dklen: usize,
    pub n: u64,
    pub p: u32,
    pub r: u32,
    pub salt: String,
}

impl WalletFile {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize wallet file")
    }

    pub fn from_json(data: &str) -> Result<Self, KeystoreError> {
        serde_json::from_str(data).map_err(|e| KeystoreError::Malformed(e.to_string()))
    }
}

fn mac(derived: &[u8; DK_LEN], ciphertext: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut input = Zeroizing::new(Vec::with_capacity(DK_LEN - CIPHER_KEY_LEN + ciphertext.len()));
    input.extend_from_slice(&derived[CIPHER_KEY_LEN..]);
    input.extend_from_slice(ciphertext);
    secp::keccak256(&input)
}

/// Encrypts `pair` under `password` with a fresh salt and IV.
pub fn encrypt(pair: &EthKeyPair, password: &str, params: ScryptParams) -> Result<WalletFile, Error> {
    let salt = crypto::generate_salt()?;
    let iv = crypto::generate_iv()?;
    encrypt_with(pair, password, params, salt, iv)
}

/// Encrypts with caller-provided salt and IV. The password bytes go into
/// scrypt unchanged.
pub fn encrypt_with(
    pair: &EthKeyPair,
    password: &str,
    params: ScryptParams,
    salt: [u8; SALT_LEN],
    iv: [u8; IV_LEN],
) -> Result<WalletFile, Error> {
    let derived = crypto::derive_scrypt_key(password, &salt, params)?;

    let mut ciphertext = pair.secret_key().to_vec();
    crypto::apply_keystream(&derived, &iv, &mut ciphertext);
    let mac = mac(&derived, &ciphertext);

    Ok(WalletFile {
        address: pair.address_hex(),
        id: Uuid::new_v4().to_string(),
        version: VERSION,
        crypto: WalletCrypto {
            cipher: CIPHER.into(),
            ciphertext: hex::encode(&ciphertext),
            cipherparams: CipherParams {
                iv: hex::encode(iv),
            },
            kdf: KDF.into(),
            kdfparams: ScryptKdfParams {
                dklen: DK_LEN,
                n: params.n(),
                p: params.p(),
                r: params.r(),
                salt: hex::encode(salt),
            },
            mac: hex::encode(mac),
        },
    })
}

/// Recovers the account key. The MAC is checked before decrypting.
pub fn decrypt(wallet: &WalletFile, password: &str) -> Result<EthKeyPair, KeystoreError> {
    if wallet.version != VERSION {
        return Err(KeystoreError::Unsupported(format!("version {}", wallet.version)));
    }
    let c = &wallet.crypto;
    if c.cipher != CIPHER {
        return Err(KeystoreError::Unsupported(format!("cipher {}", c.cipher)));
    }
    if c.kdf != KDF {
        return Err(KeystoreError::Unsupported(format!("kdf {}", c.kdf)));
    }
    if c.kdfparams.dklen != DK_LEN {
        return Err(KeystoreError::Malformed(format!("dklen {}", c.kdfparams.dklen)));
    }

    let params = ScryptParams::from_n(c.kdfparams.n, c.kdfparams.r, c.kdfparams.p)
        .map_err(|e| KeystoreError::Malformed(e.to_string()))?;
    let salt = decode_hex("salt", &c.kdfparams.salt)?;
    let iv: [u8; IV_LEN] = decode_hex("iv", &c.cipherparams.iv)?
        .try_into()
        .map_err(|_| KeystoreError::Malformed("iv must be 16 bytes".into()))?;
    let ciphertext = decode_hex("ciphertext", &c.ciphertext)?;
    let expected = decode_hex("mac", &c.mac)?;

    let derived = crypto::derive_scrypt_key(password, &salt, params)
        .map_err(|e| KeystoreError::Malformed(e.to_string()))?;

    if !bool::from(mac(&derived, &ciphertext)[..].ct_eq(&expected[..])) {
        return Err(KeystoreError::IncorrectPassword);
    }

    let mut secret = Zeroizing::new(ciphertext);
    crypto::apply_keystream(&derived, &iv, &mut secret);
    EthKeyPair::from_secret_bytes(&secret).map_err(|e| KeystoreError::Malformed(e.to_string()))
}
