//! Error types for the gitsvn server
//!
//! Every failure that can reach the wire maps to a Subversion error code so
//! command handlers can report it to the client as a failure frame.

use thiserror::Error;

/// Subversion error codes used on the wire
pub mod codes {
    pub const BAD_DATE: u64 = 125003;
    pub const ENTRY_NOT_FOUND: u64 = 150000;
    pub const FS_NOT_FOUND: u64 = 160013;
    pub const RA_NOT_AUTHORIZED: u64 = 170001;
    pub const CANCELLED: u64 = 200015;
    pub const BASE: u64 = 200000;
    pub const RA_SVN_UNKNOWN_CMD: u64 = 210001;
    pub const RA_SVN_MALFORMED_DATA: u64 = 210004;
    pub const RA_SVN_REPOS_NOT_FOUND: u64 = 210005;
    pub const RA_SVN_BAD_VERSION: u64 = 210006;
    pub const IO_WRITE_ERROR: u64 = 135001;
    pub const AUTHN_FAILED: u64 = 215004;
}

/// Main error type for gitsvn operations
#[derive(Error, Debug)]
pub enum SvnError {
    #[error("Malformed network data: {message}")]
    ProtocolSyntax { message: String },

    #[error("Client disconnected")]
    Disconnected,

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Operation cancelled: {message}")]
    Cancelled { message: String },

    #[error("Unsupported protocol version: {version} (expected: 2)")]
    VersionMismatch { version: u64 },

    #[error("Repository not found: {url}")]
    RepositoryNotFound { url: String },

    #[error("History of branch {branch} was rewritten: {message}")]
    HistoryRewritten { branch: String, message: String },

    #[error("Can't parse date '{date}'")]
    BadDate { date: String },

    #[error("Unsupported command: {command}")]
    UnknownCommand { command: String },

    #[error("Git error: {message}")]
    Git { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error("{message}")]
    Internal { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SvnError {
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::ProtocolSyntax {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Subversion error code reported in failure frames
    pub fn code(&self) -> u64 {
        match self {
            Self::ProtocolSyntax { .. } => codes::RA_SVN_MALFORMED_DATA,
            Self::Disconnected => codes::IO_WRITE_ERROR,
            Self::Authentication { .. } => codes::AUTHN_FAILED,
            Self::AccessDenied { .. } => codes::RA_NOT_AUTHORIZED,
            Self::NotFound { .. } => codes::FS_NOT_FOUND,
            Self::Cancelled { .. } => codes::CANCELLED,
            Self::VersionMismatch { .. } => codes::RA_SVN_BAD_VERSION,
            Self::RepositoryNotFound { .. } => codes::RA_SVN_REPOS_NOT_FOUND,
            Self::UnknownCommand { .. } => codes::RA_SVN_UNKNOWN_CMD,
            Self::BadDate { .. } => codes::BAD_DATE,
            Self::Io(_) => codes::IO_WRITE_ERROR,
            Self::HistoryRewritten { .. }
            | Self::Git { .. }
            | Self::Cache { .. }
            | Self::Config { .. }
            | Self::Internal { .. } => codes::BASE,
        }
    }

    /// Errors after which the session cannot continue.
    ///
    /// Framing is lost on a syntax error and the socket is gone on I/O
    /// errors, so neither can be answered with a failure frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolSyntax { .. } | Self::Disconnected | Self::Io(_)
        )
    }

    /// Errors that are part of normal operation and only logged as warnings
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AccessDenied { .. }
                | Self::Cancelled { .. }
                | Self::RepositoryNotFound { .. }
                | Self::UnknownCommand { .. }
                | Self::BadDate { .. }
                | Self::Authentication { .. }
                | Self::Disconnected
        )
    }
}

/// Result type alias for gitsvn operations
pub type Result<T> = std::result::Result<T, SvnError>;
