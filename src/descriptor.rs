//! Signer configuration files.
//!
//! Each successfully produced key gets one YAML document telling the signer
//! where its secret lives. Account keys for transaction signers get a TOML
//! file-based-signer config instead.

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::keys::KeyPair;
use crate::storage::{Naming, OutputDir};

pub const EXTENSION: &str = "yaml";
pub const SIGNER_EXTENSION: &str = "toml";
const FILE_BASED_SIGNER: &str = "file-based-signer";
pub const KEY_TYPE_BLS: &str = "BLS";
/// Field of the remote secret holding the key.
pub const VAULT_KEY_NAME: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Descriptor {
    #[serde(rename = "hashicorp", rename_all = "camelCase")]
    Hashicorp {
        key_path: String,
        key_name: String,
        tls_enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tls_known_servers_path: Option<String>,
        server_host: String,
        server_port: u16,
        token: String,
    },

    #[serde(rename = "file-raw", rename_all = "camelCase")]
    FileRaw { private_key: String },

    #[serde(rename = "file-keystore", rename_all = "camelCase")]
    FileKeystore {
        key_type: String,
        keystore_file: String,
        keystore_password_file: String,
    },
}

/// Where the signer reaches the remote store, as written into descriptors.
#[derive(Debug, Clone)]
pub struct VaultLocation {
    pub host_override: Option<String>,
    pub tls_known_servers_path: PathBuf,
    pub token: String,
}

impl Descriptor {
    /// Embeds the `0x`-prefixed secret.
    pub fn raw(pair: &KeyPair) -> Self {
        Descriptor::FileRaw {
            private_key: format!("0x{}", pair.secret_key_hex().as_str()),
        }
    }

    pub fn keystore(keystore_file: &Path, password_file: &Path) -> Self {
        Descriptor::FileKeystore {
            key_type: KEY_TYPE_BLS.into(),
            keystore_file: keystore_file.display().to_string(),
            keystore_password_file: password_file.display().to_string(),
        }
    }

    /// Points at the secret stored under `secret_url`.
    ///
    /// # Errors
    ///
    /// Fails if the URL has no host or no known port.
    pub fn hashicorp(secret_url: &Url, location: &VaultLocation) -> Result<Self> {
        let tls_enabled = secret_url.scheme().eq_ignore_ascii_case("https");

        let server_host = match &location.host_override {
            Some(host) if !host.is_empty() => host.clone(),
            _ => secret_url
                .host_str()
                .context("secret store URL has no host")?
                .to_owned(),
        };
        let server_port = secret_url
            .port_or_known_default()
            .context("secret store URL has no port")?;

        Ok(Descriptor::Hashicorp {
            key_path: secret_url.path().to_owned(),
            key_name: VAULT_KEY_NAME.into(),
            tls_enabled,
            tls_known_servers_path: tls_enabled
                .then(|| location.tls_known_servers_path.display().to_string()),
            server_host,
            server_port,
            token: location.token.clone(),
        })
    }

    /// Block-style YAML document.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to render descriptor")
    }
}

/// `[signing]` table of a transaction signer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerConfig {
    pub signing: FileBasedSigner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileBasedSigner {
    #[serde(rename = "type")]
    pub kind: String,
    pub key_file: String,
    pub password_file: String,
}

impl SignerConfig {
    pub fn file_based(key_file: &Path, password_file: &Path) -> Self {
        Self {
            signing: FileBasedSigner {
                kind: FILE_BASED_SIGNER.into(),
                key_file: key_file.display().to_string(),
                password_file: password_file.display().to_string(),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).context("failed to render signer config")
    }
}

/// Writes `descriptor` under a fresh name chosen by `naming`.
///
/// # Errors
///
/// Returns an error if rendering or writing fails; nothing is left behind.
pub fn emit(out: &OutputDir, naming: &Naming, descriptor: &Descriptor) -> Result<PathBuf> {
    let yaml = descriptor.to_yaml()?;
    let claim = out.claim(naming, &[EXTENSION])?;
    let mut paths = claim.commit(&[yaml.as_bytes()])?;
    paths.pop().context("descriptor path missing")
}
