//! BLS key batch generation.

use std::collections::HashSet;
use std::fmt;

use blst::min_pk::SecretKey;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::secure_random;
use crate::error::Error;

/// Length of a compressed BLS12-381 public key.
pub const PUBLIC_KEY_LEN: usize = 48;
/// Length of a BLS12-381 secret scalar.
pub const SECRET_KEY_LEN: usize = 32;
/// Input keying material drawn per key.
pub const IKM_LEN: usize = 32;
/// Hex characters kept when abbreviating a public key for file names.
pub const ABBREVIATION_LEN: usize = 7;

// A healthy entropy source never repeats; this only stops a broken one
// from spinning forever.
const MAX_DUPLICATE_DRAWS: usize = 16;

/// A BLS keypair. The secret scalar is wiped when the pair is dropped.
pub struct KeyPair {
    public_key: [u8; PUBLIC_KEY_LEN],
    secret_key: Zeroizing<[u8; SECRET_KEY_LEN]>,
}

impl KeyPair {
    /// Derives a keypair from input keying material (IETF BLS `KeyGen`).
    pub fn from_ikm(ikm: &[u8; IKM_LEN]) -> Result<Self, Error> {
        let sk = SecretKey::key_gen(ikm, &[])
            .map_err(|e| Error::KeyGeneration(format!("{e:?}")))?;
        Ok(Self::from_secret(&sk))
    }

    /// Rebuilds a keypair from a serialized secret scalar.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, Error> {
        let sk = SecretKey::from_bytes(secret)
            .map_err(|e| Error::KeyGeneration(format!("invalid secret key: {e:?}")))?;
        Ok(Self::from_secret(&sk))
    }

    fn from_secret(sk: &SecretKey) -> Self {
        Self {
            public_key: sk.sk_to_pk().compress(),
            secret_key: Zeroizing::new(sk.to_bytes()),
        }
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key
    }

    pub fn secret_key(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.secret_key
    }

    /// Unprefixed lowercase hex of the compressed public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// Unprefixed lowercase hex of the secret scalar.
    pub fn secret_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.secret_key[..]))
    }

    /// Short public key prefix used to name output files.
    pub fn abbreviated(&self) -> String {
        abbreviate(&self.public_key_hex())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

pub fn abbreviate(public_key_hex: &str) -> String {
    public_key_hex.chars().take(ABBREVIATION_LEN).collect()
}

/// Generates `count` keypairs with distinct public keys from the OS RNG.
pub fn generate(count: usize) -> Result<Vec<KeyPair>, Error> {
    generate_with(count, || {
        let mut ikm = Zeroizing::new([0u8; IKM_LEN]);
        secure_random(&mut ikm[..])?;
        Ok(ikm)
    })
}

/// Generates `count` keypairs from the given IKM source.
///
/// A draw whose public key was already produced is discarded and replaced,
/// so the batch always has exactly `count` distinct keys.
///
/// # Errors
///
/// Fails if the source errors or keeps repeating itself.
pub fn generate_with<F>(count: usize, mut next_ikm: F) -> Result<Vec<KeyPair>, Error>
where
    F: FnMut() -> Result<Zeroizing<[u8; IKM_LEN]>, Error>,
{
    let mut seen = HashSet::with_capacity(count);
    let mut keys = Vec::with_capacity(count);
    let mut duplicates = 0;

    while keys.len() < count {
        let ikm = next_ikm()?;
        let pair = KeyPair::from_ikm(&ikm)?;

        if seen.insert(*pair.public_key()) {
            keys.push(pair);
            continue;
        }

        duplicates += 1;
        warn!(
            public_key = %pair.abbreviated(),
            "duplicate key drawn, generating a replacement"
        );
        if duplicates > MAX_DUPLICATE_DRAWS {
            return Err(Error::KeyGeneration(format!(
                "entropy source repeated {duplicates} times"
            )));
        }
    }

    debug!(count = keys.len(), "generated key batch");
    Ok(keys)
}
