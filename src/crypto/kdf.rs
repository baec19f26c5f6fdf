use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

use super::DK_LEN;
use crate::error::Error;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn new(iterations: u32) -> Result<Self, Error> {
        let params = Self { iterations };
        params.validate()?;
        Ok(params)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn dklen(&self) -> usize {
        DK_LEN
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.iterations < 1 {
            return Err(Error::Configuration(
                "pbkdf2 iteration count must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// EIP-2335 password processing: NFKD, then drop C0, DEL and C1 control
/// characters.
pub fn normalize_password(password: &str) -> Zeroizing<String> {
    Zeroizing::new(
        password
            .nfkd()
            .filter(|c| !matches!(*c as u32, 0x00..=0x1f | 0x7f..=0x9f))
            .collect(),
    )
}

/// Derive the 32-byte keystore key with PBKDF2-HMAC-SHA256.
pub fn derive_key(
    password: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<Zeroizing<[u8; DK_LEN]>, Error> {
    kdf.validate()?;

    let password = normalize_password(password);
    let mut key = Zeroizing::new([0u8; DK_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, kdf.iterations, &mut key[..]);

    Ok(key)
}

/// Default scrypt cost for V3 wallets, n = 2^18.
pub const DEFAULT_SCRYPT_LOG_N: u8 = 18;
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 1;

/// scrypt cost for V3 wallet files. Memory use is `128 * r * 2^log_n` bytes
/// per derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptParams {
    log_n: u8,
    r: u32,
    p: u32,
}

impl Default for ScryptParams {
    fn default() -> Self {
        Self {
            log_n: DEFAULT_SCRYPT_LOG_N,
            r: SCRYPT_R,
            p: SCRYPT_P,
        }
    }
}

impl ScryptParams {
    pub fn new(log_n: u8, r: u32, p: u32) -> Result<Self, Error> {
        let params = Self { log_n, r, p };
        params.validate()?;
        Ok(params)
    }

    /// `n` expressed as its power of two, r and p at their defaults.
    pub fn with_log_n(log_n: u8) -> Result<Self, Error> {
        Self::new(log_n, SCRYPT_R, SCRYPT_P)
    }

    /// Accepts only a power-of-two `n`.
    pub fn from_n(n: u64, r: u32, p: u32) -> Result<Self, Error> {
        if n < 2 || !n.is_power_of_two() {
            return Err(Error::Configuration(format!(
                "scrypt n must be a power of two > 1, got {n}"
            )));
        }
        Self::new(n.trailing_zeros() as u8, r, p)
    }

    pub fn log_n(&self) -> u8 {
        self.log_n
    }

    pub fn n(&self) -> u64 {
        1u64 << self.log_n
    }

    pub fn r(&self) -> u32 {
        self.r
    }

    pub fn p(&self) -> u32 {
        self.p
    }

    fn to_scrypt(self) -> Result<scrypt::Params, Error> {
        scrypt::Params::new(self.log_n, self.r, self.p, DK_LEN)
            .map_err(|e| Error::Configuration(format!("invalid scrypt parameters: {e}")))
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.log_n == 0 || self.log_n >= 64 {
            return Err(Error::Configuration(format!(
                "scrypt log2(n) must be in 1..=63, got {}",
                self.log_n
            )));
        }
        self.to_scrypt().map(|_| ())
    }
}

/// Derive the 32-byte wallet key with scrypt. The password is used as is.
pub fn derive_scrypt_key(
    password: &str,
    salt: &[u8],
    params: ScryptParams,
) -> Result<Zeroizing<[u8; DK_LEN]>, Error> {
    let scrypt_params = params.to_scrypt()?;
    let mut key = Zeroizing::new([0u8; DK_LEN]);
    scrypt::scrypt(password.as_bytes(), salt, &scrypt_params, &mut key[..])
        .map_err(|e| Error::Configuration(format!("scrypt output length: {e}")))?;
    Ok(key)
}
