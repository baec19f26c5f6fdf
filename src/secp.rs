//! secp256k1 account keys for Ethereum transaction signers.

use std::collections::HashSet;
use std::fmt;

use k256::SecretKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::secure_random;
use crate::error::Error;

pub const ADDRESS_LEN: usize = 20;
pub const SECRET_KEY_LEN: usize = 32;

const MAX_DUPLICATE_DRAWS: usize = 16;
// out-of-range scalars are roughly 2^-128 likely per draw
const MAX_INVALID_DRAWS: usize = 16;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// An account key. The secret scalar is wiped when the pair is dropped.
pub struct EthKeyPair {
    address: [u8; ADDRESS_LEN],
    secret_key: Zeroizing<[u8; SECRET_KEY_LEN]>,
}

impl EthKeyPair {
    /// Rejects zero and scalars not below the curve order.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, Error> {
        let sk = SecretKey::from_slice(secret)
            .map_err(|_| Error::KeyGeneration("invalid secp256k1 secret key".into()))?;

        // uncompressed SEC1 point without its 0x04 tag
        let point = sk.public_key().to_encoded_point(false);
        let digest = keccak256(&point.as_bytes()[1..]);

        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(&digest[32 - ADDRESS_LEN..]);

        let mut secret_key = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        secret_key.copy_from_slice(&sk.to_bytes());

        Ok(Self {
            address,
            secret_key,
        })
    }

    pub fn address(&self) -> &[u8; ADDRESS_LEN] {
        &self.address
    }

    pub fn secret_key(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.secret_key
    }

    /// Unprefixed lowercase hex of the account address.
    pub fn address_hex(&self) -> String {
        hex::encode(self.address)
    }
}

impl fmt::Debug for EthKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthKeyPair")
            .field("address", &self.address_hex())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Generates `count` account keys with distinct addresses from the OS RNG.
pub fn generate(count: usize) -> Result<Vec<EthKeyPair>, Error> {
    generate_with(count, || {
        let mut secret = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        secure_random(&mut secret[..])?;
        Ok(secret)
    })
}

/// Generates `count` account keys from the given scalar source.
///
/// Out-of-range draws and repeated addresses are discarded and redrawn.
pub fn generate_with<F>(count: usize, mut next_secret: F) -> Result<Vec<EthKeyPair>, Error>
where
    F: FnMut() -> Result<Zeroizing<[u8; SECRET_KEY_LEN]>, Error>,
{
    let mut seen = HashSet::with_capacity(count);
    let mut keys = Vec::with_capacity(count);
    let mut duplicates = 0;
    let mut invalid = 0;

    while keys.len() < count {
        let secret = next_secret()?;
        let pair = match EthKeyPair::from_secret_bytes(&secret[..]) {
            Ok(pair) => pair,
            Err(e) => {
                invalid += 1;
                if invalid > MAX_INVALID_DRAWS {
                    return Err(e);
                }
                continue;
            }
        };

        if seen.insert(*pair.address()) {
            keys.push(pair);
            continue;
        }

        duplicates += 1;
        warn!(address = %pair.address_hex(), "duplicate key drawn, generating a replacement");
        if duplicates > MAX_DUPLICATE_DRAWS {
            return Err(Error::KeyGeneration(format!(
                "entropy source repeated {duplicates} times"
            )));
        }
    }

    debug!(count = keys.len(), "generated secp256k1 key batch");
    Ok(keys)
}
