//! Credential resolution for preference writes.
//!
//! A credential is resolved fresh for every flush. Deployments that have more
//! than one place a credential can live compose them with [`CredentialChain`].

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// An opaque auth token.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Source of an auth credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Resolve a credential, or `None` if this source has none right now.
    async fn resolve(&self) -> Option<Credential>;
}

/// Tries each provider in order and returns the first credential found.
#[derive(Clone, Default)]
pub struct CredentialChain {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider; earlier providers win.
    pub fn with(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl CredentialProvider for CredentialChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn resolve(&self) -> Option<Credential> {
        for provider in &self.providers {
            if let Some(credential) = provider.resolve().await {
                tracing::debug!(provider = provider.name(), "Credential resolved");
                return Some(credential);
            }
        }
        None
    }
}

/// A fixed credential (or the fixed absence of one).
#[derive(Debug, Clone)]
pub struct StaticCredential {
    name: String,
    credential: Option<Credential>,
}

impl StaticCredential {
    pub fn new(name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: Some(Credential::new(token)),
        }
    }

    /// A provider that never resolves.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: None,
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self) -> Option<Credential> {
        self.credential.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::new("sk-live-123");
        assert_eq!(format!("{:?}", credential), "Credential(***)");
        assert_eq!(credential.expose(), "sk-live-123");
    }

    #[tokio::test]
    async fn test_chain_returns_first_resolved() {
        let chain = CredentialChain::new()
            .with(Arc::new(StaticCredential::missing("session")))
            .with(Arc::new(StaticCredential::new("local_store", "from-store")))
            .with(Arc::new(StaticCredential::new("derived", "from-derived")));

        let resolved = chain.resolve().await.unwrap();
        assert_eq!(resolved.expose(), "from-store");
    }

    #[tokio::test]
    async fn test_chain_with_no_hits_resolves_none() {
        let chain = CredentialChain::new()
            .with(Arc::new(StaticCredential::missing("session")))
            .with(Arc::new(StaticCredential::missing("derived")));
        assert!(chain.resolve().await.is_none());
        assert!(CredentialChain::new().resolve().await.is_none());
    }
}
