//! One client connection
//!
//! A session walks through the handshake once and then serves commands
//! until the client hangs up:
//!
//! ```text
//! Connected ─► CapabilityExchanged ─► Authenticating ─► Active ─► Closed
//! ```
//!
//! Multi-part responses (log streams, update reports, editor drives) are
//! queued as [`Step`]s and resumed by the command loop, which always runs a
//! pending step before reading the next command.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use super::command::Command;
use super::state::ServerState;
use super::step::Step;
use crate::auth::{AuthChannel, User};
use crate::error::{Result, SvnError};
use crate::repository::{join_path, Branch, Resolved};
use crate::wire::{Token, WireReader, WireWriter};

/// Only protocol version spoken by current clients
pub const PROTOCOL_VERSION: u64 = 2;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    CapabilityExchanged,
    Authenticating,
    Active,
    Closed,
}

/// Client details sent right after the greeting
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub capabilities: Vec<String>,
    pub url: String,
    pub agent: Option<String>,
}

pub struct Session {
    pub(super) id: u64,
    pub(super) server: Arc<ServerState>,
    pub(super) reader: WireReader,
    pub(super) writer: WireWriter,
    pub(super) steps: VecDeque<Step>,
    state: SessionState,
    client: ClientInfo,
    user: Option<User>,
    target: Option<Resolved>,
}

impl Session {
    pub fn new(id: u64, server: Arc<ServerState>, reader: WireReader, writer: WireWriter) -> Self {
        Self {
            id,
            server,
            reader,
            writer,
            steps: VecDeque::new(),
            state: SessionState::Connected,
            client: ClientInfo::default(),
            user: None,
            target: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve the connection until the client disconnects or a fatal error.
    ///
    /// A client hanging up between commands is a normal close and yields
    /// `Ok(())`.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        self.state = SessionState::Closed;
        // the peer may already be gone
        let _ = self.writer.shutdown().await;

        match &result {
            Ok(()) | Err(SvnError::Disconnected) => {
                tracing::info!("Session {} closed", self.id);
            }
            Err(e) if e.is_expected() => {
                tracing::warn!("Session {} ended: {}", self.id, e);
            }
            Err(e) => {
                tracing::error!("Session {} failed: {}", self.id, e);
            }
        }
        match result {
            Err(SvnError::Disconnected) => Ok(()),
            other => other,
        }
    }

    async fn serve(&mut self) -> Result<()> {
        self.exchange_capabilities().await?;
        self.authenticate().await?;
        self.open_repository().await?;
        self.state = SessionState::Active;

        loop {
            let result = match self.steps.pop_front() {
                Some(step) => step.run(self).await,
                None => self.read_command().await,
            };
            self.finish(result).await?;
        }
    }

    async fn exchange_capabilities(&mut self) -> Result<()> {
        let capabilities = self.server.settings.capabilities();
        self.writer
            .list_begin()
            .word("success")
            .list_begin()
            .number(PROTOCOL_VERSION)
            .number(PROTOCOL_VERSION)
            .list_begin()
            .list_end()
            .list_begin();
        for capability in capabilities {
            self.writer.word(capability);
        }
        self.writer.list_end().list_end().list_end();
        self.writer.flush().await?;

        // ( version ( caps... ) url ( ? agent ) ... )
        self.reader.read_list_begin().await?;
        let version = self.reader.read_number().await?;
        let capabilities = self.reader.read_word_list().await?;
        let url = self.reader.read_text().await?;
        let agent = if self.reader.at_list_end().await? {
            None
        } else if matches!(self.reader.peek().await?, Token::ListBegin) {
            self.reader.read_optional_text().await?
        } else {
            Some(self.reader.read_text().await?)
        };
        self.reader.skip_to_list_end().await?;

        if version != PROTOCOL_VERSION {
            let error = SvnError::VersionMismatch { version };
            self.writer.failure_error(&error);
            self.writer.flush().await?;
            return Err(error);
        }

        tracing::debug!(
            "Session {}: client {} for {}",
            self.id,
            agent.as_deref().unwrap_or("unknown"),
            url
        );
        self.client = ClientInfo {
            capabilities,
            url,
            agent,
        };
        self.state = SessionState::CapabilityExchanged;
        Ok(())
    }

    /// Offer methods until the client presents valid credentials
    async fn authenticate(&mut self) -> Result<()> {
        self.state = SessionState::Authenticating;
        let server = self.server.clone();

        self.writer.list_begin().word("success").list_begin().list_begin();
        for method in server.authenticators.methods() {
            self.writer.word(method);
        }
        self.writer
            .list_end()
            .string(&server.settings.realm)
            .list_end()
            .list_end();
        self.writer.flush().await?;

        loop {
            // ( method ( ? token ) )
            self.reader.read_list_begin().await?;
            let method = self.reader.read_word().await?;
            let token = self.reader.read_optional_string().await?;
            self.reader.skip_to_list_end().await?;

            let Some(authenticator) = server.authenticators.find(&method) else {
                tracing::warn!("Session {}: unknown auth type {}", self.id, method);
                self.writer.failure_message(&format!("unknown auth type: {}", method));
                self.writer.flush().await?;
                continue;
            };

            let mut channel = Challenge {
                reader: &mut self.reader,
                writer: &mut self.writer,
            };
            match authenticator.authenticate(&mut channel, token.as_deref()).await {
                Ok(Some(user)) => {
                    tracing::info!("Session {}: authenticated {} via {}", self.id, user, method);
                    self.writer.success_empty();
                    self.writer.flush().await?;
                    self.user = Some(user);
                    return Ok(());
                }
                Ok(None) => {
                    tracing::warn!("Session {}: incorrect credentials for {}", self.id, method);
                    self.writer.failure_message("incorrect credentials");
                    self.writer.flush().await?;
                }
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Session {}: {}", self.id, e);
                    self.writer.failure_message(&e.to_string());
                    self.writer.flush().await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolve the handshake URL, scan for new commits and announce the repository
    async fn open_repository(&mut self) -> Result<()> {
        let url = self.client.url.clone();
        let resolved = match self.resolve_readable(&url).await {
            Ok(resolved) => resolved,
            Err(e) if !e.is_fatal() => {
                self.writer.failure_error(&e);
                self.writer.flush().await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.writer
            .list_begin()
            .word("success")
            .list_begin()
            .string(resolved.repository.branch().uuid())
            .string(&resolved.base_url)
            .list_begin()
            .list_end()
            .list_end()
            .list_end();
        self.writer.flush().await?;

        tracing::info!(
            "Session {}: opened {} at /{}",
            self.id,
            resolved.repository.name(),
            resolved.path
        );
        self.target = Some(resolved);
        Ok(())
    }

    /// Map a URL to a repository the session user may read, bringing its
    /// revision table up to date
    pub(super) async fn resolve_readable(&self, url: &str) -> Result<Resolved> {
        let resolved = self.server.mapping.resolve(url)?;
        resolved.repository.check_read(self.user()?)?;
        resolved.repository.branch().update_revisions().await?;
        Ok(resolved)
    }

    async fn read_command(&mut self) -> Result<()> {
        self.reader.read_list_begin().await?;
        let name = self.reader.read_word().await?;
        let Some(command) = Command::parse(&name, &mut self.reader).await? else {
            self.reader.skip_to_list_end().await?;
            return Err(SvnError::UnknownCommand { command: name });
        };
        self.reader.skip_to_list_end().await?;

        tracing::debug!("Session {}: {}", self.id, name);
        command.execute(self).await
    }

    /// Flush a successful response or turn a recoverable error into a failure frame
    async fn finish(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => self.writer.flush().await,
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                if e.is_expected() {
                    tracing::warn!("Session {}: {}", self.id, e);
                } else {
                    tracing::error!("Session {}: {}", self.id, e);
                }
                self.steps.clear();
                self.writer.discard();
                self.writer.failure_error(&e);
                self.writer.flush().await
            }
        }
    }

    /// Empty auth request sent before each command response
    pub(super) async fn send_auth_request(&mut self) -> Result<()> {
        self.writer
            .list_begin()
            .word("success")
            .list_begin()
            .list_begin()
            .list_end()
            .string("")
            .list_end()
            .list_end();
        self.writer.flush().await
    }

    pub(super) fn user(&self) -> Result<&User> {
        self.user
            .as_ref()
            .ok_or_else(|| SvnError::internal("session is not authenticated"))
    }

    pub(super) fn target(&self) -> Result<&Resolved> {
        self.target
            .as_ref()
            .ok_or_else(|| SvnError::internal("session has no repository"))
    }

    pub(super) fn set_target(&mut self, target: Resolved) {
        self.target = Some(target);
    }

    pub(super) fn branch(&self) -> Result<Arc<Branch>> {
        Ok(self.target()?.repository.branch().clone())
    }

    /// Repository path of a command argument, relative to the session URL
    pub(super) fn full_path(&self, path: &str) -> Result<String> {
        Ok(join_path(&self.target()?.path, path))
    }

    /// Requested revision, or the latest one when absent
    pub(super) fn resolve_revision(&self, revision: Option<u64>) -> Result<u64> {
        let latest = self.branch()?.revision_count();
        match revision {
            None => Ok(latest),
            Some(n) if n <= latest => Ok(n),
            Some(n) => Err(SvnError::not_found(format!("No such revision {}", n))),
        }
    }
}

/// Auth round trips over the session's own streams
struct Challenge<'a> {
    reader: &'a mut WireReader,
    writer: &'a mut WireWriter,
}

#[async_trait]
impl AuthChannel for Challenge<'_> {
    async fn challenge(&mut self, challenge: &str) -> Result<Vec<u8>> {
        self.writer
            .list_begin()
            .word("step")
            .list_begin()
            .string(challenge)
            .list_end()
            .list_end();
        self.writer.flush().await?;
        self.reader.read_string().await
    }
}
