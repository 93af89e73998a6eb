//! Lazily resolved, explicitly invalidated facility credential.
//!
//! The credential is owned by the adapter that uses it, never held in a
//! process-wide global. It is fetched from its [`CredentialSource`] on first
//! use, reused afterwards, and dropped by [`CachedCredential::invalidate`] when
//! the facility refuses it, so the next call fetches a fresh one.

use async_trait::async_trait;
use league::FacilityError;
use thiserror::Error;
use tokio::sync::RwLock;

/// A bearer token for the trigger facility. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct FacilityToken(String);

impl FacilityToken {
    /// Wraps a token, returning `None` if it is empty or only whitespace.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.trim().is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns the token text for use in an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for FacilityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FacilityToken(<redacted>)")
    }
}

/// Failures while obtaining a credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The source has no credential to offer.
    #[error("Facility credential is not configured ({source_name})")]
    NotConfigured {
        /// Where the credential was looked up.
        source_name: String,
    },
}

impl From<CredentialError> for FacilityError {
    fn from(_: CredentialError) -> Self {
        FacilityError::Unauthorized
    }
}

/// Where a facility credential comes from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetches a fresh credential.
    async fn fetch(&self) -> Result<FacilityToken, CredentialError>;
}

/// A fixed credential supplied at construction.
#[derive(Debug, Clone)]
pub struct StaticCredential(FacilityToken);

impl StaticCredential {
    /// Creates a source that always yields `token`.
    pub fn new(token: FacilityToken) -> Self {
        Self(token)
    }
}

#[async_trait]
impl CredentialSource for StaticCredential {
    async fn fetch(&self) -> Result<FacilityToken, CredentialError> {
        Ok(self.0.clone())
    }
}

/// A credential read from an environment variable at fetch time.
///
/// Re-reading on every fetch lets a rotated token take effect after the cache
/// is invalidated without restarting the process.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    variable: String,
}

impl EnvCredential {
    /// Creates a source reading `variable`.
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for EnvCredential {
    async fn fetch(&self) -> Result<FacilityToken, CredentialError> {
        std::env::var(&self.variable)
            .ok()
            .and_then(FacilityToken::new)
            .ok_or_else(|| CredentialError::NotConfigured {
                source_name: self.variable.clone(),
            })
    }
}

/// A credential fetched on first use and cached until invalidated.
pub struct CachedCredential {
    source: Box<dyn CredentialSource>,
    cached: RwLock<Option<FacilityToken>>,
}

impl CachedCredential {
    /// Creates an empty cache over `source`.
    pub fn new(source: impl CredentialSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cached: RwLock::new(None),
        }
    }

    /// Returns the cached credential, fetching it if the cache is empty.
    pub async fn get(&self) -> Result<FacilityToken, CredentialError> {
        if let Some(token) = self.cached.read().await.as_ref() {
            return Ok(token.clone());
        }

        let mut slot = self.cached.write().await;
        // Another caller may have filled the slot while we waited for the lock.
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }
        let token = self.source.fetch().await?;
        tracing::debug!("Fetched facility credential");
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Drops the cached credential so the next [`get`](Self::get) refetches.
    pub async fn invalidate(&self) {
        if self.cached.write().await.take().is_some() {
            tracing::info!("Facility credential invalidated");
        }
    }
}

impl std::fmt::Debug for CachedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCredential").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn fetch(&self) -> Result<FacilityToken, CredentialError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(FacilityToken::new(format!("token-{n}")).unwrap())
        }
    }

    #[tokio::test]
    async fn credential_is_fetched_once_until_invalidated() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let cache = CachedCredential::new(CountingSource {
            fetches: fetches.clone(),
        });

        assert_eq!(cache.get().await.unwrap().expose(), "token-0");
        assert_eq!(cache.get().await.unwrap().expose(), "token-0");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        assert_eq!(cache.get().await.unwrap().expose(), "token-1");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_environment_variable_is_not_configured() {
        let cache = CachedCredential::new(EnvCredential::new("LEAGUE_TEST_TOKEN_THAT_IS_NEVER_SET"));
        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, CredentialError::NotConfigured { .. }));
        assert_eq!(FacilityError::from(err), FacilityError::Unauthorized);
    }

    #[test]
    fn tokens_are_redacted_in_debug_output() {
        let token = FacilityToken::new("very-secret").unwrap();
        assert!(!format!("{token:?}").contains("very-secret"));
        assert!(FacilityToken::new("  ").is_none());
    }
}
