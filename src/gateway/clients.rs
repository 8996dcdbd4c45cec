//! Upstream collaborator interfaces
//!
//! The gateway fronts two external services: the credential issuer (register,
//! login, token resolution) and the player-profile store. Each is modelled as
//! a narrow capability so transports can be swapped without touching the
//! handlers; the in-memory implementation backs tests and single-process
//! deployments.

use crate::types::{PlayerId, Profile, RegisterRequest, UserId};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Errors surfaced by the credential issuer
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("account already exists")]
    Duplicate,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid session token")]
    InvalidToken,

    #[error("credential issuer unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the profile store
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// Issues opaque bearer tokens bound to a subject id
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Create an account; fails with `Duplicate` when the email is taken
    async fn register(&self, request: RegisterRequest) -> Result<UserId, AuthError>;

    /// Exchange credentials for an opaque session token
    async fn login(&self, email: &str, password: &str) -> Result<String, AuthError>;

    /// Resolve a session token to the player id it is bound to
    async fn resolve_token(&self, token: &str) -> Result<PlayerId, AuthError>;
}

/// CRUD over player profile records, keyed by subject id
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<Profile>, ProfileError>;
}

#[derive(Debug, Clone)]
struct Account {
    user_id: UserId,
    username: String,
    password: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default)]
struct AccountsInner {
    by_email: HashMap<String, Account>,
    tokens: HashMap<String, UserId>,
}

/// In-memory credential issuer and profile store
///
/// Stands in for the external auth and profile services in tests and
/// single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    inner: Mutex<AccountsInner>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialIssuer for InMemoryAccounts {
    async fn register(&self, request: RegisterRequest) -> Result<UserId, AuthError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| AuthError::Unavailable("accounts lock poisoned".to_string()))?;

        if inner.by_email.contains_key(&request.email) {
            return Err(AuthError::Duplicate);
        }

        let account = Account {
            user_id: Uuid::new_v4(),
            username: request.username,
            password: request.password,
            created_at: current_timestamp(),
        };
        let user_id = account.user_id;
        inner.by_email.insert(request.email, account);

        Ok(user_id)
    }

    async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| AuthError::Unavailable("accounts lock poisoned".to_string()))?;

        let user_id = match inner.by_email.get(email) {
            Some(account) if account.password == password => account.user_id,
            _ => return Err(AuthError::InvalidCredentials),
        };

        let token = Uuid::new_v4().to_string();
        inner.tokens.insert(token.clone(), user_id);
        Ok(token)
    }

    async fn resolve_token(&self, token: &str) -> Result<PlayerId, AuthError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| AuthError::Unavailable("accounts lock poisoned".to_string()))?;

        inner
            .tokens
            .get(token)
            .map(|user_id| user_id.to_string())
            .ok_or(AuthError::InvalidToken)
    }
}

#[async_trait]
impl ProfileStore for InMemoryAccounts {
    async fn get(&self, user_id: UserId) -> Result<Option<Profile>, ProfileError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| ProfileError::Unavailable("accounts lock poisoned".to_string()))?;

        Ok(inner.by_email.values().find(|a| a.user_id == user_id).map(
            |account| Profile {
                user_id: account.user_id,
                username: account.username.clone(),
                created_at: account.created_at,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            username: "tester".to_string(),
            password: "correct-horse".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login_and_resolve() {
        let accounts = InMemoryAccounts::new();

        let user_id = accounts
            .register(register_request("a@example.com"))
            .await
            .unwrap();

        let token = accounts
            .login("a@example.com", "correct-horse")
            .await
            .unwrap();

        let player_id = accounts.resolve_token(&token).await.unwrap();
        assert_eq!(player_id, user_id.to_string());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let accounts = InMemoryAccounts::new();
        accounts
            .register(register_request("a@example.com"))
            .await
            .unwrap();

        let err = accounts
            .register(register_request("a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Duplicate));
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let accounts = InMemoryAccounts::new();
        accounts
            .register(register_request("a@example.com"))
            .await
            .unwrap();

        let err = accounts
            .login("a@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let accounts = InMemoryAccounts::new();
        let err = accounts.resolve_token("nope").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_profile_lookup() {
        let accounts = InMemoryAccounts::new();
        let user_id = accounts
            .register(register_request("a@example.com"))
            .await
            .unwrap();

        let profile = accounts.get(user_id).await.unwrap().unwrap();
        assert_eq!(profile.username, "tester");

        assert!(accounts.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
