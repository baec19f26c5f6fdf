//! HashiCorp Vault style remote secret store client.

use rayon::prelude::*;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::error::Error;
use crate::keys::KeyPair;
use crate::pipeline::Outcome;

pub const TOKEN_HEADER: &str = "X-Vault-Token";
pub const INIT_PATH: &str = "/v1/sys/init";

#[derive(Serialize)]
struct SecretBody<'a> {
    data: SecretData<'a>,
}

#[derive(Serialize)]
struct SecretData<'a> {
    value: &'a str,
}

/// Client for a KV secret engine mounted at `base`, e.g.
/// `http://localhost:8200/v1/secret`.
pub struct VaultClient {
    http: Client,
    base: Url,
    init_url: Url,
    token: Zeroizing<String>,
}

impl VaultClient {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `base` is not an absolute http(s)
    /// URL with a host, or if it carries a query or fragment.
    pub fn new(base: &str, token: Zeroizing<String>) -> Result<Self, Error> {
        let base = Url::parse(base.trim_end_matches('/'))
            .map_err(|e| Error::Configuration(format!("invalid secret store URL '{base}': {e}")))?;

        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(Error::Configuration(format!(
                "secret store URL must be http(s) with a host: {base}"
            )));
        }

        if base.query().is_some() || base.fragment().is_some() {
            return Err(Error::Configuration(format!(
                "secret store URL must not carry a query or fragment: {base}"
            )));
        }

        let mut init_url = base.clone();
        init_url.set_path(INIT_PATH);

        let http = Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            init_url,
            token,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn init_url(&self) -> &Url {
        &self.init_url
    }

    /// `<base>/data/<public key hex>`
    pub fn secret_url(&self, public_key_hex: &str) -> Result<Url, Error> {
        secret_url(&self.base, public_key_hex)
    }

    /// True only when the init endpoint answers 200. Every other outcome,
    /// including transport errors, is logged and reported as not ready.
    pub fn check_ready(&self) -> bool {
        info!(url = %self.init_url, "checking secret store status");

        match self.http.get(self.init_url.clone()).send() {
            Ok(resp) if resp.status() == StatusCode::OK => true,
            Ok(resp) => {
                let status = resp.status();
                debug!(%status, body = %resp.text().unwrap_or_default(), "secret store not ready");
                warn!(%status, url = %self.init_url, "secret store is not initialized");
                false
            }
            Err(e) => {
                error!(url = %self.init_url, error = %e, "error getting init status from secret store");
                false
            }
        }
    }

    /// Stores one secret. Success carries the public key hex.
    pub fn submit(&self, pair: &KeyPair) -> Outcome<String> {
        let public_key = pair.public_key_hex();

        let url = match self.secret_url(&public_key) {
            Ok(url) => url,
            Err(e) => return Outcome::failure(public_key, e.to_string()),
        };
        debug!(%url, "submitting secret");

        let secret = pair.secret_key_hex();
        let body = SecretBody {
            data: SecretData { value: &secret },
        };

        let response = self
            .http
            .post(url.clone())
            .header(TOKEN_HEADER, self.token.as_str())
            .json(&body)
            .send();

        match response {
            Ok(resp) if matches!(resp.status(), StatusCode::OK | StatusCode::NO_CONTENT) => {
                Outcome::Success(public_key)
            }
            Ok(resp) => {
                let status = resp.status();
                warn!(%url, %status, body = %resp.text().unwrap_or_default(), "secret store rejected secret");
                Outcome::failure(public_key, format!("unexpected status {status}"))
            }
            Err(e) => {
                error!(%url, error = %e, "posting secret failed");
                Outcome::failure(public_key, e.to_string())
            }
        }
    }

    /// Submits every key concurrently on the rayon pool. A failed key does
    /// not affect the others and is not retried.
    pub fn submit_batch(&self, keys: &[KeyPair]) -> Vec<Outcome<String>> {
        let done = AtomicUsize::new(0);
        let total = keys.len();

        let outcomes = keys
            .par_iter()
            .map(|pair| {
                let outcome = self.submit(pair);
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("inserted key {n}/{total}");
                outcome
            })
            .collect();

        info!(total, "secret submission finished");
        outcomes
    }
}

pub fn secret_url(base: &Url, public_key_hex: &str) -> Result<Url, Error> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| Error::Configuration(format!("secret store URL cannot be a base: {base}")))?
        .pop_if_empty()
        .push("data")
        .push(public_key_hex);
    Ok(url)
}
