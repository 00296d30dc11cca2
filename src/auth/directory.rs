//! User directories

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::authenticator::Authenticator;
use super::user::{User, UserOrigin};
use crate::config::UserConfig;
use crate::context::Shared;
use crate::error::Result;

/// Resolves credentials and identities to [`User`] records
pub trait UserDirectory: Send + Sync {
    /// Verify a clear-text secret; `Ok(None)` means rejected
    fn check(&self, username: &str, secret: &str) -> Result<Option<User>>;

    fn lookup_by_name(&self, username: &str) -> Result<Option<User>>;

    fn lookup_by_external(&self, external_id: &str) -> Result<Option<User>>;

    /// Authentication methods backed by this directory
    fn authenticators(self: Arc<Self>) -> Vec<Authenticator>;
}

struct LocalUser {
    user: User,
    password: String,
}

/// Users held in memory with clear-text secrets
#[derive(Default)]
pub struct LocalUserDirectory {
    users: RwLock<HashMap<String, LocalUser>>,
}

impl LocalUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(users: &[UserConfig]) -> Self {
        let directory = Self::new();
        for user in users {
            let added = directory.add(
                &user.username,
                &user.password,
                user.real_name.as_deref().unwrap_or(&user.username),
                user.email.clone(),
            );
            if added.is_none() {
                tracing::warn!("Ignoring duplicate user {}", user.username);
            }
        }
        directory
    }

    /// Register a user; `None` if the name is already taken
    pub fn add(&self, username: &str, password: &str, real_name: &str, email: Option<String>) -> Option<User> {
        let mut users = self.users.write();
        if users.contains_key(username) {
            return None;
        }
        let user = User::new(
            username,
            real_name,
            email,
            Some(username.to_string()),
            UserOrigin::Local,
        );
        users.insert(
            username.to_string(),
            LocalUser {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        Some(user)
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    /// Clear-text secret, needed by challenge-response verification
    pub(crate) fn secret(&self, username: &str) -> Option<(User, String)> {
        self.users
            .read()
            .get(username)
            .map(|local| (local.user.clone(), local.password.clone()))
    }
}

impl UserDirectory for LocalUserDirectory {
    fn check(&self, username: &str, secret: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .get(username)
            .filter(|local| local.password == secret)
            .map(|local| local.user.clone()))
    }

    fn lookup_by_name(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.read().get(username).map(|local| local.user.clone()))
    }

    fn lookup_by_external(&self, external_id: &str) -> Result<Option<User>> {
        self.lookup_by_name(external_id)
    }

    fn authenticators(self: Arc<Self>) -> Vec<Authenticator> {
        vec![Authenticator::ChallengeResponse(self)]
    }
}

#[async_trait]
impl Shared for LocalUserDirectory {
    fn name(&self) -> &'static str {
        "users"
    }
}
