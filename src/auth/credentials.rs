//! Username/password login with in-memory bearer tokens
//!
//! Accounts come from configuration and store SHA-256 password digests.
//! A successful login issues a random token; tokens live until logout or
//! process exit.

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::permissions::Role;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unknown or expired token")]
    UnknownToken,
}

/// Hex-encoded SHA-256 digest of a password
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// A configured login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UserAccount {
    #[garde(length(min = 1, max = 64))]
    pub username: String,
    #[garde(pattern(r"^[0-9a-fA-F]{64}$"))]
    pub password_sha256: String,
    #[garde(skip)]
    pub role: Role,
}

impl UserAccount {
    pub fn new(username: impl Into<String>, password: &str, role: Role) -> Self {
        Self {
            username: username.into(),
            password_sha256: hash_password(password),
            role,
        }
    }

    /// The two built-in accounts used when none are configured
    pub fn defaults() -> Vec<UserAccount> {
        vec![
            UserAccount::new("admin", "admin123", Role::Admin),
            UserAccount::new("user", "user123", Role::User),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub username: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub token: String,
    pub user: AuthenticatedUser,
}

#[derive(Debug, Clone)]
pub struct AuthService {
    accounts: Arc<HashMap<String, UserAccount>>,
    tokens: Arc<RwLock<HashMap<String, AuthenticatedUser>>>,
}

impl AuthService {
    pub fn new(accounts: Vec<UserAccount>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.username.clone(), account))
            .collect();
        Self {
            accounts: Arc::new(accounts),
            tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError> {
        let account = match self.accounts.get(username) {
            Some(account) if account.password_sha256.eq_ignore_ascii_case(&hash_password(password)) => {
                account
            }
            _ => {
                warn!(event = "LOGIN_FAILED", username = %username, "Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let token = Uuid::new_v4().to_string();
        let user = AuthenticatedUser {
            username: account.username.clone(),
            role: account.role,
            issued_at: Utc::now(),
        };
        self.tokens.write().await.insert(token.clone(), user.clone());

        info!(event = "LOGIN", username = %user.username, role = %user.role, "User logged in");
        Ok(LoginGrant { token, user })
    }

    pub async fn logout(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let user = self
            .tokens
            .write()
            .await
            .remove(token)
            .ok_or(AuthError::UnknownToken)?;

        info!(event = "LOGOUT", username = %user.username, "User logged out");
        Ok(user)
    }

    pub async fn resolve(&self, token: &str) -> Option<AuthenticatedUser> {
        self.tokens.read().await.get(token).cloned()
    }

    pub async fn active_sessions(&self) -> usize {
        self.tokens.read().await.len()
    }
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new(UserAccount::defaults())
    }
}
