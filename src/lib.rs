//! Batch key generation for remote signers.
//!
//! BLS keys are generated in memory, then either written as plaintext
//! descriptors, sealed into password-encrypted keystores, or submitted to a
//! remote secret store. Every key that makes it through gets one YAML
//! descriptor in the output directory. secp256k1 account keys for
//! transaction signers are sealed into V3 wallet files with a TOML config
//! each.

mod crypto;
pub mod descriptor;
mod error;
mod format;
pub mod keys;
pub mod keystore;
pub mod pipeline;
pub mod secp;
pub mod storage;
pub mod vault;
pub mod wallet;

pub use crate::crypto::{
    DEFAULT_ITERATIONS, DEFAULT_SCRYPT_LOG_N, KdfParams, ScryptParams, normalize_password,
};
pub use crate::descriptor::{Descriptor, SignerConfig, VaultLocation};
pub use crate::error::{Error, KeystoreError};
pub use crate::keys::KeyPair;
pub use crate::keystore::KeystoreRecord;
pub use crate::pipeline::{
    EthSignerRun, HashicorpRun, KeystoreRun, Mode, Outcome, RawRun, RunSummary, run_ethsigner,
    run_hashicorp, run_hashicorp_with, run_keystores, run_raw, successful,
};
pub use crate::secp::EthKeyPair;
pub use crate::storage::{Naming, OutputDir};
pub use crate::vault::VaultClient;
pub use crate::wallet::WalletFile;
