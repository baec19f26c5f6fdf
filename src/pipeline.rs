//! Batch orchestration.
//!
//! Every run is a single pass: validate, generate keys, encrypt or submit
//! them, then write one descriptor per key that made it through. Per-key
//! failures are logged and counted, never fatal.

use anyhow::Context;
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{KdfParams, ScryptParams};
use crate::descriptor::{self, Descriptor, SignerConfig, VaultLocation};
use crate::error::Error;
use crate::keys::{self, KeyPair};
use crate::keystore;
use crate::secp::{self, EthKeyPair};
use crate::storage::{Naming, OutputDir};
use crate::vault::VaultClient;
use crate::wallet;

/// Result of processing one key. Failures name the key by public key hex,
/// or by address for account keys.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure { public_key: String, reason: String },
}

impl<T> Outcome<T> {
    pub fn failure(public_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Outcome::Failure {
            public_key: public_key.into(),
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Splits outcomes into successes and the number of failures.
pub fn partition<T>(outcomes: Vec<Outcome<T>>) -> (Vec<T>, usize) {
    let mut successes = Vec::with_capacity(outcomes.len());
    let mut failures = 0;
    for outcome in outcomes {
        match outcome {
            Outcome::Success(v) => successes.push(v),
            Outcome::Failure { .. } => failures += 1,
        }
    }
    (successes, failures)
}

/// Keeps only the successful values, e.g. the public keys a store accepted.
pub fn successful<T>(outcomes: Vec<Outcome<T>>) -> Vec<T> {
    partition(outcomes).0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Raw,
    Keystores,
    Hashicorp,
    EthSigner,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Raw => "raw",
            Mode::Keystores => "keystores",
            Mode::Hashicorp => "hashicorp",
            Mode::EthSigner => "ethsigner",
        };
        f.write_str(name)
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: Mode,
    pub requested: usize,
    pub generated: usize,
    /// Keys that passed the encrypt/submit stage.
    pub succeeded: usize,
    /// Keys dropped by the encrypt/submit stage.
    pub failed: usize,
    pub descriptors_written: usize,
    pub descriptor_failures: usize,
    pub output_dir: PathBuf,
}

impl RunSummary {
    fn new(mode: Mode, requested: usize, output_dir: &Path) -> Self {
        Self {
            mode,
            requested,
            generated: 0,
            succeeded: 0,
            failed: 0,
            descriptors_written: 0,
            descriptor_failures: 0,
            output_dir: output_dir.to_path_buf(),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: requested {}, succeeded {}, failed {}, descriptors written {} in {}",
            self.mode,
            self.requested,
            self.succeeded,
            self.failed + self.descriptor_failures,
            self.descriptors_written,
            self.output_dir.display()
        )
    }
}

/// Plaintext descriptors.
#[derive(Debug, Clone)]
pub struct RawRun {
    pub output: PathBuf,
    pub count: usize,
}

/// Encrypted keystores plus descriptors pointing at them.
#[derive(Clone)]
pub struct KeystoreRun {
    pub output: PathBuf,
    pub count: usize,
    pub password: Zeroizing<String>,
    pub kdf_iterations: u32,
    /// Directory written into descriptors instead of `output`, for when the
    /// signer sees the files under a different path. Made absolute against
    /// the working directory.
    pub config_dir: Option<PathBuf>,
}

/// secp256k1 wallet files plus file-based-signer configs pointing at them.
#[derive(Clone)]
pub struct EthSignerRun {
    pub output: PathBuf,
    pub count: usize,
    pub password: Zeroizing<String>,
    /// scrypt cost as log2(n).
    pub scrypt_log_n: u8,
    /// Directory written into the TOML configs instead of `output`.
    pub config_dir: Option<PathBuf>,
}

/// Remote secrets plus descriptors pointing at them.
#[derive(Clone)]
pub struct HashicorpRun {
    pub output: PathBuf,
    pub count: usize,
    pub url: String,
    pub token: Zeroizing<String>,
    pub host_override: Option<String>,
    pub tls_known_servers_path: PathBuf,
}

fn validate_count(count: usize) -> Result<(), Error> {
    if count == 0 {
        return Err(Error::Configuration("key count must be positive".into()));
    }
    Ok(())
}

fn generate(count: usize) -> Result<Vec<KeyPair>, Error> {
    info!(count, "generating BLS keys");
    keys::generate(count)
}

/// Absolute directory that written configs refer to.
fn referenced_dir(config_dir: Option<&Path>, out: &OutputDir) -> Result<PathBuf, Error> {
    let dir = config_dir.unwrap_or(out.path());
    let absolute = std::path::absolute(dir)
        .with_context(|| format!("failed to resolve {}", dir.display()))?;
    Ok(absolute)
}

/// Runs `write` for every item on the rayon pool and counts the results.
/// A failed write is logged against its key and leaves the others alone.
fn emit_all<T, K, W>(summary: &mut RunSummary, items: &[T], key: K, write: W)
where
    T: Sync,
    K: Fn(&T) -> String + Sync,
    W: Fn(&T) -> anyhow::Result<PathBuf> + Sync,
{
    let outcomes = items
        .par_iter()
        .map(|item| written(key(item), write(item)))
        .collect();
    let (ok, failed) = partition(outcomes);
    summary.descriptors_written += ok.len();
    summary.descriptor_failures += failed;
}

/// Writes one `file-raw` descriptor per generated key.
pub fn run_raw(run: &RawRun) -> Result<RunSummary, Error> {
    validate_count(run.count)?;
    let out = OutputDir::create(&run.output)?;
    let mut summary = RunSummary::new(Mode::Raw, run.count, out.path());

    let pairs = generate(run.count)?;
    summary.generated = pairs.len();
    summary.succeeded = pairs.len();

    info!(dir = %out.path().display(), "creating raw signer configuration files");
    emit_all(&mut summary, &pairs, KeyPair::public_key_hex, |pair| {
        let naming = Naming::Sequential(pair.abbreviated());
        descriptor::emit(&out, &naming, &Descriptor::raw(pair))
    });

    Ok(summary)
}

struct Sealed {
    public_key: String,
    json: String,
}

/// Encrypts every key into a keystore and writes `<token>.json`,
/// `<token>.password` and `<token>.yaml` for each.
pub fn run_keystores(run: &KeystoreRun) -> Result<RunSummary, Error> {
    validate_count(run.count)?;
    let kdf = KdfParams::new(run.kdf_iterations)?;
    keystore::check_password(&run.password)?;
    let out = OutputDir::create(&run.output)?;
    let config_dir = referenced_dir(run.config_dir.as_deref(), &out)?;
    let mut summary = RunSummary::new(Mode::Keystores, run.count, out.path());

    let pairs = generate(run.count)?;
    summary.generated = pairs.len();

    info!(iterations = kdf.iterations(), "encrypting keystores");
    let outcomes = pairs.par_iter().map(|pair| seal(pair, &run.password, kdf)).collect();
    let (sealed, failed) = partition(outcomes);
    summary.succeeded = sealed.len();
    summary.failed = failed;
    drop(pairs);

    if sealed.is_empty() {
        warn!("no keystores to write to output directory");
        return Ok(summary);
    }

    info!(dir = %out.path().display(), "creating keystores and signer configuration files");
    emit_all(
        &mut summary,
        &sealed,
        |s| s.public_key.clone(),
        |s| write_keystore(&out, &config_dir, s, &run.password),
    );

    Ok(summary)
}

fn seal(pair: &KeyPair, password: &str, kdf: KdfParams) -> Outcome<Sealed> {
    let public_key = pair.public_key_hex();
    let json = keystore::encrypt(pair.secret_key(), pair.public_key(), password, kdf)
        .map_err(anyhow::Error::from)
        .and_then(|record| record.to_json());

    match json {
        Ok(json) => Outcome::Success(Sealed { public_key, json }),
        Err(e) => {
            error!(public_key = %public_key, error = %e, "keystore encryption failed");
            Outcome::failure(public_key, e.to_string())
        }
    }
}

fn write_keystore(
    out: &OutputDir,
    config_dir: &Path,
    sealed: &Sealed,
    password: &str,
) -> anyhow::Result<PathBuf> {
    let claim = out.claim(&Naming::Random, &["json", "password", descriptor::EXTENSION])?;
    let stem = claim.stem().to_owned();

    let descriptor = Descriptor::keystore(
        &config_dir.join(format!("{stem}.json")),
        &config_dir.join(format!("{stem}.password")),
    );
    let yaml = descriptor.to_yaml()?;

    let mut paths = claim.commit(&[sealed.json.as_bytes(), password.as_bytes(), yaml.as_bytes()])?;
    Ok(paths.swap_remove(2))
}

/// Stores every key in the remote store, then writes a `hashicorp`
/// descriptor for each one that was accepted.
///
/// # Errors
///
/// Returns [`Error::BackendUnavailable`] before any key is generated when the
/// store is not ready.
pub fn run_hashicorp(run: &HashicorpRun) -> Result<RunSummary, Error> {
    let client = VaultClient::new(&run.url, run.token.clone())?;
    run_hashicorp_with(run, &client)
}

/// Same as [`run_hashicorp`] with an existing client; `run.url` and
/// `run.token` are only used for the descriptors.
pub fn run_hashicorp_with(run: &HashicorpRun, client: &VaultClient) -> Result<RunSummary, Error> {
    validate_count(run.count)?;
    if !client.check_ready() {
        return Err(Error::BackendUnavailable(client.init_url().to_string()));
    }

    let pairs = generate(run.count)?;
    let mut summary = RunSummary::new(Mode::Hashicorp, run.count, &run.output);
    summary.generated = pairs.len();

    info!(url = %client.base(), "inserting keys into secret store");
    let (stored, failed) = partition(client.submit_batch(&pairs));
    drop(pairs);
    summary.succeeded = stored.len();
    summary.failed = failed;

    if stored.is_empty() {
        warn!("no keys to create in output directory");
        return Ok(summary);
    }

    let out = OutputDir::create(&run.output)?;
    let location = VaultLocation {
        host_override: run.host_override.clone(),
        tls_known_servers_path: run.tls_known_servers_path.clone(),
        token: run.token.to_string(),
    };

    info!(dir = %out.path().display(), "creating signer configuration files");
    emit_all(&mut summary, &stored, String::clone, |public_key| {
        let url = client.secret_url(public_key)?;
        let d = Descriptor::hashicorp(&url, &location)?;
        descriptor::emit(&out, &Naming::Sequential(keys::abbreviate(public_key)), &d)
    });

    Ok(summary)
}

struct SealedWallet {
    address: String,
    json: String,
}

/// Generates secp256k1 account keys, encrypts each into a V3 wallet file and
/// writes `<address>.json`, `<address>.password` and `<address>.toml`.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for a zero count, an invalid scrypt cost
/// or an empty password, before anything is written.
pub fn run_ethsigner(run: &EthSignerRun) -> Result<RunSummary, Error> {
    validate_count(run.count)?;
    let params = ScryptParams::with_log_n(run.scrypt_log_n)?;
    if run.password.is_empty() {
        return Err(Error::Configuration("wallet password must not be empty".into()));
    }
    let out = OutputDir::create(&run.output)?;
    let config_dir = referenced_dir(run.config_dir.as_deref(), &out)?;
    let mut summary = RunSummary::new(Mode::EthSigner, run.count, out.path());

    info!(count = run.count, "generating secp256k1 keys");
    let pairs = secp::generate(run.count)?;
    summary.generated = pairs.len();

    info!(n = params.n(), r = params.r(), p = params.p(), "encrypting wallet files");
    let outcomes = pairs
        .par_iter()
        .map(|pair| seal_wallet(pair, &run.password, params))
        .collect();
    let (sealed, failed) = partition(outcomes);
    summary.succeeded = sealed.len();
    summary.failed = failed;
    drop(pairs);

    if sealed.is_empty() {
        warn!("no wallet files to write to output directory");
        return Ok(summary);
    }

    info!(dir = %out.path().display(), "creating wallet files and signer configs");
    emit_all(
        &mut summary,
        &sealed,
        |s| s.address.clone(),
        |s| write_wallet(&out, &config_dir, s, &run.password),
    );

    Ok(summary)
}

fn seal_wallet(pair: &EthKeyPair, password: &str, params: ScryptParams) -> Outcome<SealedWallet> {
    let address = pair.address_hex();
    let json = wallet::encrypt(pair, password, params)
        .map_err(anyhow::Error::from)
        .and_then(|w| w.to_json());

    match json {
        Ok(json) => Outcome::Success(SealedWallet { address, json }),
        Err(e) => {
            error!(address = %address, error = %e, "wallet encryption failed");
            Outcome::failure(address, e.to_string())
        }
    }
}

fn write_wallet(
    out: &OutputDir,
    config_dir: &Path,
    sealed: &SealedWallet,
    password: &str,
) -> anyhow::Result<PathBuf> {
    let naming = Naming::Sequential(sealed.address.clone());
    let claim = out.claim(&naming, &["json", "password", descriptor::SIGNER_EXTENSION])?;
    let stem = claim.stem().to_owned();

    let config = SignerConfig::file_based(
        &config_dir.join(format!("{stem}.json")),
        &config_dir.join(format!("{stem}.password")),
    );
    let toml = config.to_toml()?;

    let mut paths = claim.commit(&[sealed.json.as_bytes(), password.as_bytes(), toml.as_bytes()])?;
    Ok(paths.swap_remove(2))
}

fn written(public_key: String, result: anyhow::Result<PathBuf>) -> Outcome<PathBuf> {
    match result {
        Ok(path) => Outcome::Success(path),
        Err(e) => {
            error!(public_key = %public_key, error = %format!("{e:#}"), "error creating configuration file");
            Outcome::failure(public_key, format!("{e:#}"))
        }
    }
}
