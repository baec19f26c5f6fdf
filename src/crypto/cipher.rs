use super::{CHECKSUM_LEN, CIPHER_KEY_LEN, DK_LEN, IV_LEN, SALT_LEN};
use crate::error::Error;
use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use getrandom::fill;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Fill buffer with cryptographically secure random bytes
pub fn secure_random(buf: &mut [u8]) -> Result<(), Error> {
    fill(buf).map_err(|_| Error::Entropy)
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN], Error> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Generate IV
pub fn generate_iv() -> Result<[u8; IV_LEN], Error> {
    let mut iv = [0u8; IV_LEN];
    secure_random(&mut iv)?;
    Ok(iv)
}

/// XOR `data` in place with the AES-128-CTR keystream keyed by the first
/// half of the derived key. Encryption and decryption are the same call.
pub fn apply_keystream(derived_key: &[u8; DK_LEN], iv: &[u8; IV_LEN], data: &mut [u8]) {
    let mut key = Zeroizing::new([0u8; CIPHER_KEY_LEN]);
    key.copy_from_slice(&derived_key[..CIPHER_KEY_LEN]);
    let mut cipher = Aes128Ctr::new((&*key).into(), iv.into());
    cipher.apply_keystream(data);
}

/// SHA-256 over the second half of the derived key followed by the ciphertext.
pub fn checksum(derived_key: &[u8; DK_LEN], ciphertext: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(&derived_key[CIPHER_KEY_LEN..]);
    hasher.update(ciphertext);
    hasher.finalize().into()
}
