//! Error types for `relay-kernel`.
//!
//! [`ConfigError`] covers problems detected while loading or validating the
//! gateway configuration, before any socket is bound. [`StoreError`] and
//! [`AuthError`] are the failure modes of the external collaborators
//! (metadata/counter/cache stores and the credential verifier). Request-level
//! failures belong in the runtime crate (`relay-gateway`).

use thiserror::Error;

/// Configuration loading / validation error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The layered source (file, environment) could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    Load(String),

    /// A field holds a value the gateway cannot run with.
    #[error("invalid configuration field `{0}`: {1}")]
    Invalid(&'static str, String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Result alias for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Failure talking to a backing store (relational metadata, counter or cache).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// The store was reached but the command or query failed.
    #[error("store query failed: {0}")]
    Query(String),

    /// The store returned data that could not be decoded.
    #[error("store returned undecodable data: {0}")]
    Decode(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure verifying a bearer credential.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// No credential was presented.
    #[error("missing bearer credential")]
    MissingCredential,

    /// The credential is unknown, malformed or its signature does not verify.
    #[error("invalid bearer credential: {0}")]
    InvalidCredential(String),

    /// The credential was valid once but has expired.
    #[error("bearer credential has expired")]
    Expired,
}
