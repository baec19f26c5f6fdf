//! Password-encrypted keystore records.

use anyhow::Result;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{self, CHECKSUM_LEN, IV_LEN, KdfParams, SALT_LEN};
use crate::error::{Error, KeystoreError};
use crate::format;

/// One encrypted secret plus everything needed to decrypt it.
#[derive(Debug, Clone)]
pub struct KeystoreRecord {
    version: u32,
    kdf: KdfParams,
    salt: Vec<u8>,
    iv: [u8; IV_LEN],
    checksum: [u8; CHECKSUM_LEN],
    ciphertext: Vec<u8>,
    public_key: Vec<u8>,
    path: String,
    uuid: String,
    description: String,
}

impl KeystoreRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        kdf: KdfParams,
        salt: Vec<u8>,
        iv: [u8; IV_LEN],
        checksum: [u8; CHECKSUM_LEN],
        ciphertext: Vec<u8>,
        public_key: Vec<u8>,
        path: String,
        uuid: String,
        description: String,
    ) -> Self {
        Self {
            version: format::CURRENT_VERSION,
            kdf,
            salt,
            iv,
            checksum,
            ciphertext,
            public_key,
            path,
            uuid,
            description,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn checksum(&self) -> &[u8; CHECKSUM_LEN] {
        &self.checksum
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String> {
        format::serialize(self)
    }

    pub fn from_json(data: &str) -> Result<Self, KeystoreError> {
        format::parse(data)
    }
}

/// Rejects a password that is empty once control characters are stripped.
pub fn check_password(password: &str) -> Result<(), Error> {
    if crypto::normalize_password(password).is_empty() {
        return Err(Error::Configuration(
            "keystore password is empty after normalization".into(),
        ));
    }
    Ok(())
}

/// Encrypts `secret` under `password` with a fresh random salt and IV.
pub fn encrypt(
    secret: &[u8],
    public_key: &[u8],
    password: &str,
    kdf: KdfParams,
) -> Result<KeystoreRecord, Error> {
    let salt = crypto::generate_salt()?;
    let iv = crypto::generate_iv()?;
    encrypt_with(secret, public_key, password, kdf, salt, iv)
}

/// Encrypts with caller-provided salt and IV.
///
/// Steps, in order: PBKDF2 the password into a 32-byte key, AES-128-CTR the
/// secret under its first half, checksum its second half with the ciphertext.
pub fn encrypt_with(
    secret: &[u8],
    public_key: &[u8],
    password: &str,
    kdf: KdfParams,
    salt: [u8; SALT_LEN],
    iv: [u8; IV_LEN],
) -> Result<KeystoreRecord, Error> {
    check_password(password)?;
    let derived = crypto::derive_key(password, &salt, kdf)?;

    let mut ciphertext = secret.to_vec();
    crypto::apply_keystream(&derived, &iv, &mut ciphertext);
    let checksum = crypto::checksum(&derived, &ciphertext);

    Ok(KeystoreRecord::from_parts(
        kdf,
        salt.to_vec(),
        iv,
        checksum,
        ciphertext,
        public_key.to_vec(),
        String::new(),
        Uuid::new_v4().to_string(),
        String::new(),
    ))
}

/// Recovers the secret from `record`.
///
/// The checksum is verified before anything is decrypted, so a wrong
/// password yields [`KeystoreError::IncorrectPassword`] and no bytes.
pub fn decrypt(
    record: &KeystoreRecord,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    let derived = crypto::derive_key(password, record.salt(), *record.kdf())
        .map_err(|e| KeystoreError::Malformed(e.to_string()))?;

    let expected = crypto::checksum(&derived, record.ciphertext());
    if !bool::from(expected[..].ct_eq(&record.checksum()[..])) {
        return Err(KeystoreError::IncorrectPassword);
    }

    let mut secret = Zeroizing::new(record.ciphertext().to_vec());
    crypto::apply_keystream(&derived, record.iv(), &mut secret);
    Ok(secret)
}
