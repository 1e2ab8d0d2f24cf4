//! Token and identity sources.
//!
//! The OAuth flow itself is external. The core only asks for the current token
//! and, once it has one, for the identity behind it. A missing token means
//! "not ready yet", never an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::store::ConfigStore;
use crate::foundation::TransportResult;

/// Who the auth token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub login: String,
    pub client_id: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        login: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            login: login.into(),
            client_id: client_id.into(),
        }
    }
}

/// Supplies the current auth token, if any.
pub trait TokenSource: Send + Sync {
    fn auth_token(&self) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn auth_token(&self) -> Option<String> {
        self()
    }
}

/// Resolves the identity (user id, login, client id) behind a token.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_identity(&self, token: &str) -> TransportResult<Identity>;
}

/// Resolver that always returns the same identity.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Identity);

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn resolve_identity(&self, _token: &str) -> TransportResult<Identity> {
        Ok(self.0.clone())
    }
}

/// Reads the cached token from the persisted configuration.
pub struct StoredTokenSource {
    store: Arc<dyn ConfigStore>,
}

impl StoredTokenSource {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }
}

impl TokenSource for StoredTokenSource {
    fn auth_token(&self) -> Option<String> {
        self.store
            .current()
            .auth_token
            .filter(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::store::{MemoryConfigStore, PersistedConfig};

    #[test]
    fn test_closure_token_source() {
        let source = || Some("abc".to_string());
        assert_eq!(source.auth_token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_stored_token_source_ignores_empty() {
        let store = Arc::new(MemoryConfigStore::new(PersistedConfig {
            auth_token: Some(String::new()),
            ..Default::default()
        }));
        let source = StoredTokenSource::new(store.clone());
        assert_eq!(source.auth_token(), None);

        store
            .save(&PersistedConfig {
                auth_token: Some("oauth:xyz".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(source.auth_token().as_deref(), Some("oauth:xyz"));
    }

    #[tokio::test]
    async fn test_static_identity() {
        let resolver = StaticIdentity(Identity::new("7", "bot", "cid"));
        let identity = resolver.resolve_identity("any").await.unwrap();
        assert_eq!(identity.user_id, "7");
    }
}
