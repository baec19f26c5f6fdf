//! Cryptographic primitives for the keystore codec.
//!
//! Provides password key derivation, the stream cipher and the checksum
//! used to verify a password without decrypting.

pub mod cipher;
pub mod kdf;

pub use cipher::{apply_keystream, checksum, generate_iv, generate_salt, secure_random};
pub use kdf::{
    DEFAULT_ITERATIONS, DEFAULT_SCRYPT_LOG_N, KdfParams, ScryptParams, derive_key,
    derive_scrypt_key, normalize_password,
};

/// Length of the PBKDF2 salt (32 bytes).
pub const SALT_LEN: usize = 32;
/// Length of the AES-128-CTR initialization vector (16 bytes).
pub const IV_LEN: usize = 16;
/// Length of the derived key (32 bytes).
pub const DK_LEN: usize = 32;
/// Length of the AES-128 key taken from the front of the derived key.
pub const CIPHER_KEY_LEN: usize = 16;
/// Length of the checksum (SHA-256 digest) and of the V3 MAC (Keccak-256).
pub const CHECKSUM_LEN: usize = 32;
