//! State shared by every session of a server
//!
//! Everything here is read-only once the server runs: sessions hold an
//! `Arc<ServerState>` and never lock it. Mutable data lives further down
//! (branch tables, revision cache) behind `parking_lot` locks.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authenticator, AuthenticatorSet, LocalUserDirectory};
use crate::config::{Compression, Config};
use crate::context::SharedContext;
use crate::delta::{DeltaEncoder, SvnDiff0};
use crate::error::Result;
use crate::repository::RepositoryMapping;
use crate::wire::DEFAULT_MAX_STRING_LENGTH;

/// Capability words every session announces
const BASE_CAPABILITIES: &[&str] = &["depth", "edit-pipeline", "log-revprops", "absent-entries"];

/// Protocol-level settings taken from the configuration
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub realm: String,
    pub compression: Compression,
    pub allow_anonymous: bool,
    /// Offer PLAIN after the directory's own methods
    pub allow_plain: bool,
    pub max_string_length: usize,
    pub shutdown_grace: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            realm: "gitsvn".to_string(),
            compression: Compression::default(),
            allow_anonymous: false,
            allow_plain: false,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl ServerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            realm: config.realm.clone(),
            compression: config.compression,
            allow_anonymous: config.allow_anonymous,
            allow_plain: config.plain_auth,
            max_string_length: config.max_string_length,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }

    /// Capability words in announcement order
    pub fn capabilities(&self) -> Vec<&'static str> {
        let mut capabilities = self.compression.capabilities().to_vec();
        capabilities.extend_from_slice(BASE_CAPABILITIES);
        capabilities
    }
}

/// Services a session needs, resolved once from the shared context
pub struct ServerState {
    pub settings: ServerSettings,
    pub authenticators: AuthenticatorSet,
    pub mapping: Arc<RepositoryMapping>,
    pub delta: Arc<dyn DeltaEncoder>,
}

impl ServerState {
    pub fn new(settings: ServerSettings, shared: &SharedContext) -> Result<Self> {
        let users = shared.require::<LocalUserDirectory>()?;
        let mapping = shared.require::<RepositoryMapping>()?;
        let mut authenticators = AuthenticatorSet::new(settings.allow_anonymous, users.clone());
        if settings.allow_plain {
            authenticators.offer(Authenticator::ClearText(users));
        }
        Ok(Self::with_parts(settings, authenticators, mapping))
    }

    pub fn with_parts(
        settings: ServerSettings,
        authenticators: AuthenticatorSet,
        mapping: Arc<RepositoryMapping>,
    ) -> Self {
        Self {
            settings,
            authenticators,
            mapping,
            delta: Arc::new(SvnDiff0),
        }
    }
}
