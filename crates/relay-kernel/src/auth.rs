//! Authentication contract.
//!
//! The gateway never issues credentials. It hands the bearer value to an
//! [`Authenticator`] and receives a [`Principal`] carrying the set of
//! channel names the caller is entitled to.

use crate::error::AuthError;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// A verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable subject (e-mail, user id, ...).
    pub subject: String,
    /// Channel names this principal may call.
    pub channels: BTreeSet<String>,
}

impl Principal {
    pub fn new(
        subject: impl Into<String>,
        channels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            subject: subject.into(),
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_entitled_to(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }
}

/// Kernel contract for bearer credential verification.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Stable identifier used in logs.
    fn name(&self) -> &str;

    /// Verify `credential` (the bearer value with any `Bearer ` prefix
    /// already removed).
    async fn authenticate(&self, credential: &str) -> Result<Principal, AuthError>;
}
