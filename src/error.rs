use thiserror::Error;

/// Run-level failures. Only these reach the process boundary; per-key
/// failures are absorbed into [`crate::pipeline::Outcome`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("secret store at {0} is not initialized or unreachable")]
    BackendUnavailable(String),

    #[error("OS random generator unavailable")]
    Entropy,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error(transparent)]
    Output(#[from] anyhow::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeystoreError {
    #[error("Invalid password: keystore checksum does not match")]
    IncorrectPassword,

    #[error("malformed keystore: {0}")]
    Malformed(String),

    #[error("unsupported keystore {0}")]
    Unsupported(String),
}
