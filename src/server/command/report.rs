//! `update`, `switch`, `status` and `diff`: reading the client's report
//!
//! The client describes its working copy with `set-path`, `delete-path` and
//! `link-path` relative to the operand (session path joined with the update
//! target), then sends `finish-report`. The server answers by driving an
//! editor that turns the reported state into the requested revision.

use super::editor::EditPlan;
use crate::error::{Result, SvnError};
use crate::repository::join_path;
use crate::server::session::Session;
use crate::server::step::Step;
use crate::wire::{Token, WireReader};

/// Which update-like command started the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Update,
    Switch,
    Status,
    Diff,
}

/// Arguments of an update-like command
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub kind: EditKind,
    pub revision: Option<u64>,
    pub target: String,
    /// Destination of `switch` and `diff`
    pub url: Option<String>,
    pub text_deltas: bool,
}

impl EditRequest {
    pub async fn parse(name: &str, reader: &mut WireReader) -> Result<Self> {
        reader.read_list_begin().await?;
        let request = match name {
            // ( ( ? rev ) target recurse ? depth send-copyfrom ignore-ancestry )
            "update" => Self {
                kind: EditKind::Update,
                revision: reader.read_optional_number().await?,
                target: read_target(reader).await?,
                url: None,
                text_deltas: true,
            },
            // ( ( ? rev ) target recurse url ? depth ... )
            "switch" => {
                let revision = reader.read_optional_number().await?;
                let target = read_target(reader).await?;
                Self {
                    kind: EditKind::Switch,
                    revision,
                    target,
                    url: Some(reader.read_text().await?),
                    text_deltas: true,
                }
            }
            // ( target recurse ( ? rev ) ? depth )
            "status" => {
                let target = read_target(reader).await?;
                Self {
                    kind: EditKind::Status,
                    revision: reader.read_optional_number().await?,
                    target,
                    url: None,
                    text_deltas: false,
                }
            }
            // ( ( ? rev ) target recurse ignore-ancestry url ? text-deltas ? depth )
            "diff" => {
                let revision = reader.read_optional_number().await?;
                let target = read_target(reader).await?;
                reader.read_bool().await?;
                let url = reader.read_text().await?;
                let explicit = matches!(
                    reader.peek().await?,
                    Token::Word(word) if word == "true" || word == "false"
                );
                let text_deltas = if explicit { reader.read_bool().await? } else { true };
                Self {
                    kind: EditKind::Diff,
                    revision,
                    target,
                    url: Some(url),
                    text_deltas,
                }
            }
            other => return Err(SvnError::internal(format!("{} is not an edit command", other))),
        };
        reader.skip_to_list_end().await?;
        Ok(request)
    }

    /// Resolve revisions and paths, then wait for the report
    pub async fn execute(self, session: &mut Session) -> Result<()> {
        let revision = session.resolve_revision(self.revision)?;
        let anchor = session.target()?.path.clone();
        let operand = join_path(&anchor, &self.target);

        let source = match &self.url {
            Some(url) => {
                let resolved = session.resolve_readable(url).await?;
                if resolved.repository.name() != session.target()?.repository.name() {
                    return Err(SvnError::RepositoryNotFound { url: url.clone() });
                }
                resolved.path
            }
            None => operand.clone(),
        };

        tracing::debug!(
            "Session {}: {:?} /{} to /{}@{}",
            session.id,
            self.kind,
            operand,
            source,
            revision
        );
        session.steps.push_front(Step::Report(Report {
            plan: EditPlan::new(self, revision, anchor, operand, source),
            failed: None,
        }));
        Ok(())
    }
}

/// `target recurse`; recursion is always full
async fn read_target(reader: &mut WireReader) -> Result<String> {
    let target = reader.read_text().await?;
    reader.read_bool().await?;
    Ok(target.trim_matches('/').to_string())
}

/// One statement of the client's working copy report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEntry {
    /// `path` is at `revision`, empty when `start_empty`
    Set {
        path: String,
        revision: u64,
        start_empty: bool,
    },
    /// `path` is missing from the working copy
    Delete { path: String },
    /// `path` mirrors repository path `source` at `revision`
    Link {
        path: String,
        source: String,
        revision: u64,
        start_empty: bool,
    },
}

/// Report being read; becomes the editor drive on `finish-report`
pub struct Report {
    plan: EditPlan,
    /// First error raised by a report command, answered once the report ends
    failed: Option<SvnError>,
}

impl Report {
    /// Keep the first recoverable error and go on draining the report
    fn record(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.failed.get_or_insert(e);
                Ok(())
            }
        }
    }
}

/// Read one report command and queue whatever follows it.
///
/// The client pipelines the whole report, so a failing entry does not end the
/// exchange: the remaining entries are read and the failure is sent in place
/// of the response to `finish-report` or `abort-report`.
pub async fn read_report_command(mut report: Report, session: &mut Session) -> Result<()> {
    let reader = &mut session.reader;
    reader.read_list_begin().await?;
    let name = reader.read_word().await?;
    reader.read_list_begin().await?;

    match name.as_str() {
        // ( path rev start-empty ( ? lock-token ) ? depth )
        "set-path" => {
            let path = reader.read_text().await?;
            let revision = reader.read_number().await?;
            let start_empty = reader.read_bool().await?;
            reader.skip_to_list_end().await?;
            reader.skip_to_list_end().await?;
            report.plan.push(ReportEntry::Set {
                path: path.trim_matches('/').to_string(),
                revision,
                start_empty,
            });
        }
        "delete-path" => {
            let path = reader.read_text().await?;
            reader.skip_to_list_end().await?;
            reader.skip_to_list_end().await?;
            report.plan.push(ReportEntry::Delete {
                path: path.trim_matches('/').to_string(),
            });
        }
        // ( path url rev start-empty ( ? lock-token ) ? depth )
        "link-path" => {
            let path = reader.read_text().await?;
            let url = reader.read_text().await?;
            let revision = reader.read_number().await?;
            let start_empty = reader.read_bool().await?;
            reader.skip_to_list_end().await?;
            reader.skip_to_list_end().await?;

            if report.failed.is_none() {
                let linked = link_source(session, url).await.map(|source| {
                    report.plan.push(ReportEntry::Link {
                        path: path.trim_matches('/').to_string(),
                        source,
                        revision,
                        start_empty,
                    });
                });
                report.record(linked)?;
            }
        }
        "finish-report" => {
            reader.skip_to_list_end().await?;
            reader.skip_to_list_end().await?;
            if let Some(e) = report.failed {
                return Err(e);
            }
            session.send_auth_request().await?;
            session.steps.push_front(Step::EditorDrive(report.plan));
            return Ok(());
        }
        "abort-report" => {
            reader.skip_to_list_end().await?;
            reader.skip_to_list_end().await?;
            tracing::debug!("Session {}: report aborted", session.id);
            if let Some(e) = report.failed {
                return Err(e);
            }
            session.writer.success_empty();
            return Ok(());
        }
        _ => {
            reader.skip_to_list_end().await?;
            reader.skip_to_list_end().await?;
            report.record(Err(SvnError::UnknownCommand { command: name }))?;
        }
    }

    session.steps.push_front(Step::Report(report));
    Ok(())
}

/// Repository path behind a `link-path` URL, which must name the session's repository
async fn link_source(session: &Session, url: String) -> Result<String> {
    let resolved = session.resolve_readable(&url).await?;
    if resolved.repository.name() != session.target()?.repository.name() {
        return Err(SvnError::RepositoryNotFound { url });
    }
    Ok(resolved.path)
}
