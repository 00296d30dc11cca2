//! Authentication methods offered during the handshake

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;

use super::directory::{LocalUserDirectory, UserDirectory};
use super::user::User;
use crate::error::{Result, SvnError};

/// Round trip to the client during a multi-step authentication
#[async_trait]
pub trait AuthChannel: Send {
    /// Send `challenge` as an auth step and return the client's reply
    async fn challenge(&mut self, challenge: &str) -> Result<Vec<u8>>;
}

/// One credential verification strategy, selected by method name
#[derive(Clone)]
pub enum Authenticator {
    /// `ANONYMOUS`: any token, yields the anonymous user
    Anonymous,
    /// `PLAIN`: base64 of `authzid\0user\0password`
    ClearText(Arc<dyn UserDirectory>),
    /// `CRAM-MD5` against clear-text secrets
    ChallengeResponse(Arc<LocalUserDirectory>),
    /// PLAIN-style token verified by an external identity provider
    ExternalProvider {
        method: String,
        directory: Arc<dyn UserDirectory>,
    },
}

impl Authenticator {
    /// Method name as advertised on the wire
    pub fn method(&self) -> &str {
        match self {
            Self::Anonymous => "ANONYMOUS",
            Self::ClearText(_) => "PLAIN",
            Self::ChallengeResponse(_) => "CRAM-MD5",
            Self::ExternalProvider { method, .. } => method,
        }
    }

    /// Verify credentials.
    ///
    /// `Ok(None)` means the credentials were rejected and the client may try
    /// again; `Err` means the request itself was malformed.
    pub async fn authenticate(&self, channel: &mut dyn AuthChannel, token: Option<&[u8]>) -> Result<Option<User>> {
        match self {
            Self::Anonymous => Ok(Some(User::anonymous())),
            Self::ClearText(directory) | Self::ExternalProvider { directory, .. } => {
                let Some((username, password)) = decode_plain(token.unwrap_or_default())? else {
                    return Ok(None);
                };
                directory.check(&username, &password)
            }
            Self::ChallengeResponse(directory) => {
                let challenge = new_challenge();
                let reply = channel.challenge(&challenge).await?;
                Ok(verify_cram_md5(directory, &challenge, &reply))
            }
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Authenticator({})", self.method())
    }
}

/// Ordered list of offered methods
#[derive(Debug, Clone, Default)]
pub struct AuthenticatorSet {
    authenticators: Vec<Authenticator>,
}

impl AuthenticatorSet {
    /// Anonymous first when permitted, then the directory's methods
    pub fn new(allow_anonymous: bool, directory: Arc<dyn UserDirectory>) -> Self {
        let mut authenticators = Vec::new();
        if allow_anonymous {
            authenticators.push(Authenticator::Anonymous);
        }
        authenticators.extend(directory.authenticators());
        Self { authenticators }
    }

    pub fn from_list(authenticators: Vec<Authenticator>) -> Self {
        Self { authenticators }
    }

    /// Append a method unless one with the same name is already offered
    pub fn offer(&mut self, authenticator: Authenticator) {
        if self.find(authenticator.method()).is_none() {
            self.authenticators.push(authenticator);
        }
    }

    pub fn methods(&self) -> Vec<&str> {
        self.authenticators.iter().map(Authenticator::method).collect()
    }

    pub fn find(&self, method: &str) -> Option<&Authenticator> {
        self.authenticators.iter().find(|a| a.method() == method)
    }
}

/// `authzid\0user\0password`, base64 encoded; fewer than three fields is a
/// rejection rather than an error
fn decode_plain(token: &[u8]) -> Result<Option<(String, String)>> {
    let cleaned: Vec<u8> = token
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let decoded = STANDARD.decode(cleaned).map_err(|e| SvnError::Authentication {
        message: format!("Invalid PLAIN token: {}", e),
    })?;

    let mut fields: Vec<&[u8]> = decoded.split(|b| *b == 0).collect();
    while fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    if fields.len() < 3 {
        return Ok(None);
    }
    let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
    Ok(Some((text(fields[1]), text(fields[2]))))
}

fn new_challenge() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("<{}.{}@gitsvn>", rand::random::<u64>(), nanos)
}

fn verify_cram_md5(directory: &LocalUserDirectory, challenge: &str, reply: &[u8]) -> Option<User> {
    let reply = std::str::from_utf8(reply).ok()?;
    let (username, digest) = reply.trim().rsplit_once(' ')?;
    let (user, secret) = directory.secret(username)?;
    let expected = decode_hex(digest)?;

    let mut mac = Hmac::<Md5>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(challenge.as_bytes());
    mac.verify_slice(&expected).ok()?;
    Some(user)
}

/// Client side of CRAM-MD5: `user hex(hmac-md5(password, challenge))`
pub fn cram_md5_response(username: &str, password: &str, challenge: &str) -> String {
    let digest = match Hmac::<Md5>::new_from_slice(password.as_bytes()) {
        Ok(mut mac) => {
            mac.update(challenge.as_bytes());
            mac.finalize().into_bytes()
        }
        // HMAC accepts keys of any length
        Err(_) => return format!("{} ", username),
    };
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{} {}", username, hex)
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
