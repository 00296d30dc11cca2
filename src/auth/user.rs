//! User records

use std::fmt;

/// Name reported for sessions that authenticated anonymously
pub const ANONYMOUS_USERNAME: &str = "$anonymous";

/// Where a user record came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOrigin {
    Anonymous,
    Local,
    /// Tag of the external identity provider
    External(String),
}

/// Authenticated identity, immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    username: String,
    real_name: String,
    email: Option<String>,
    external_id: Option<String>,
    origin: UserOrigin,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        real_name: impl Into<String>,
        email: Option<String>,
        external_id: Option<String>,
        origin: UserOrigin,
    ) -> Self {
        Self {
            username: username.into(),
            real_name: real_name.into(),
            email,
            external_id,
            origin,
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_USERNAME, "Anonymous", None, None, UserOrigin::Anonymous)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn real_name(&self) -> &str {
        &self.real_name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn origin(&self) -> &UserOrigin {
        &self.origin
    }

    pub fn is_anonymous(&self) -> bool {
        self.origin == UserOrigin::Anonymous
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.real_name, email),
            None => write!(f, "{}", self.username),
        }
    }
}
