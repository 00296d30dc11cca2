//! Server configuration
//!
//! Loaded from a TOML file. Every field has a default, so an empty or missing
//! file yields a server on `0.0.0.0:3690` with no repositories.
//!
//! ```toml
//! realm = "example"
//! allow_anonymous = false
//!
//! [[users]]
//! username = "jane"
//! password = "secret"
//! real_name = "Jane Doe"
//!
//! [repositories.project]
//! path = "/srv/git/project.git"
//! branch = "main"
//! readers = ["jane"]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SvnError};
use crate::wire::DEFAULT_MAX_STRING_LENGTH;

/// Default svn:// port
pub const DEFAULT_PORT: u16 = 3690;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Authentication realm announced to clients
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Delta compression level advertised in the capability list
    #[serde(default)]
    pub compression: Compression,

    /// Offer ANONYMOUS authentication
    #[serde(default)]
    pub allow_anonymous: bool,

    /// Also offer PLAIN, checking clear-text passwords against `users`
    #[serde(default)]
    pub plain_auth: bool,

    /// SQLite file for persisted revision data; defaults to the user cache dir
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// Seconds to wait for sessions to finish before closing their sockets
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Largest string token accepted from a client
    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,

    /// Percent of common lines for inexact rename detection; off when unset
    #[serde(default)]
    pub rename_similarity: Option<u8>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub users: Vec<UserConfig>,

    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryConfig>,
}

/// Delta compression advertised to clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Zlib,
    Lz4,
}

impl Compression {
    /// Capability words for this level
    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::Zlib => &["svndiff1"],
            Self::Lz4 => &["svndiff1", "accepts-svndiff2"],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for the gitsvn target (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Local user entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// One exported git repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub path: PathBuf,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Users allowed to read; everyone when unset
    #[serde(default)]
    pub readers: Option<Vec<String>>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_realm() -> String {
    "gitsvn".to_string()
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_max_string_length() -> usize {
    DEFAULT_MAX_STRING_LENGTH
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            realm: default_realm(),
            compression: Compression::default(),
            allow_anonymous: false,
            plain_auth: false,
            cache_path: None,
            shutdown_grace_secs: default_shutdown_grace(),
            max_string_length: default_max_string_length(),
            rename_similarity: None,
            logging: LoggingConfig::default(),
            users: Vec::new(),
            repositories: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SvnError::Config {
            message: format!("Failed to parse config: {}", e),
        })
    }

    /// Reject settings that would only fail later at runtime
    pub fn validate(&self) -> Result<()> {
        if let Some(percent) = self.rename_similarity {
            if percent == 0 || percent > 100 {
                return Err(SvnError::Config {
                    message: format!("rename_similarity must be 1-100, got {}", percent),
                });
            }
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if !seen.insert(user.username.as_str()) {
                return Err(SvnError::Config {
                    message: format!("Duplicate user: {}", user.username),
                });
            }
        }

        for (name, repository) in &self.repositories {
            if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
                return Err(SvnError::Config {
                    message: format!("Invalid repository name: {:?}", name),
                });
            }
            if repository.branch.is_empty() {
                return Err(SvnError::Config {
                    message: format!("Repository {} has an empty branch name", name),
                });
            }
        }
        Ok(())
    }

    /// Where the revision database lives
    pub fn cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("gitsvn")
                .join("cache.db")
        })
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
