//! Command parsing and dispatch
//!
//! Every command is a tuple `( name ( args... ) )`. Parsers read the fields
//! they know and skip whatever newer clients append. Each known command is
//! answered with an empty auth request first, then its own response.

pub mod editor;
pub mod log;
mod node;
pub mod report;
mod revision;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};

use self::log::LogRequest;
use self::node::{GetDir, GetFile};
use self::report::EditRequest;
use super::session::Session;
use crate::error::Result;
use crate::git::{EntryKind, TreeEntry};
use crate::repository::Branch;
use crate::wire::{WireReader, WireWriter};

/// Largest string token used for file contents and text deltas
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A parsed client command
pub enum Command {
    Reparent { url: String },
    GetLatestRev,
    GetDatedRev { date: String },
    RevProplist { revision: u64 },
    RevProp { revision: u64, name: String },
    GetFile(GetFile),
    GetDir(GetDir),
    CheckPath { path: String, revision: Option<u64> },
    Stat { path: String, revision: Option<u64> },
    Log(LogRequest),
    Edit(EditRequest),
}

impl Command {
    /// Parse the argument tuple of `name`; `None` for commands this server
    /// does not implement, in which case nothing has been consumed
    pub async fn parse(name: &str, reader: &mut WireReader) -> Result<Option<Self>> {
        let command = match name {
            "reparent" => {
                reader.read_list_begin().await?;
                let url = reader.read_text().await?;
                reader.skip_to_list_end().await?;
                Self::Reparent { url }
            }
            "get-latest-rev" => {
                reader.skip_item().await?;
                Self::GetLatestRev
            }
            "get-dated-rev" => {
                reader.read_list_begin().await?;
                let date = reader.read_text().await?;
                reader.skip_to_list_end().await?;
                Self::GetDatedRev { date }
            }
            "rev-proplist" => {
                reader.read_list_begin().await?;
                let revision = reader.read_number().await?;
                reader.skip_to_list_end().await?;
                Self::RevProplist { revision }
            }
            "rev-prop" => {
                reader.read_list_begin().await?;
                let revision = reader.read_number().await?;
                let name = reader.read_text().await?;
                reader.skip_to_list_end().await?;
                Self::RevProp { revision, name }
            }
            "get-file" => Self::GetFile(GetFile::parse(reader).await?),
            "get-dir" => Self::GetDir(GetDir::parse(reader).await?),
            "check-path" | "stat" => {
                reader.read_list_begin().await?;
                let path = reader.read_text().await?;
                let revision = reader.read_optional_number().await?;
                reader.skip_to_list_end().await?;
                if name == "stat" {
                    Self::Stat { path, revision }
                } else {
                    Self::CheckPath { path, revision }
                }
            }
            "log" => Self::Log(LogRequest::parse(reader).await?),
            "update" | "switch" | "status" | "diff" => {
                Self::Edit(EditRequest::parse(name, reader).await?)
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    pub async fn execute(self, session: &mut Session) -> Result<()> {
        session.send_auth_request().await?;
        match self {
            Self::Reparent { url } => revision::reparent(session, &url).await,
            Self::GetLatestRev => revision::get_latest_rev(session).await,
            Self::GetDatedRev { date } => revision::get_dated_rev(session, &date).await,
            Self::RevProplist { revision } => revision::rev_proplist(session, revision).await,
            Self::RevProp { revision, name } => revision::rev_prop(session, revision, &name).await,
            Self::GetFile(request) => request.execute(session).await,
            Self::GetDir(request) => request.execute(session).await,
            Self::CheckPath { path, revision } => node::check_path(session, &path, revision).await,
            Self::Stat { path, revision } => node::stat(session, &path, revision).await,
            Self::Log(request) => request.execute(session).await,
            Self::Edit(request) => request.execute(session).await,
        }
    }
}

/// svn timestamp format, always UTC with microseconds
pub fn format_date(seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

pub fn md5_hex(data: &[u8]) -> String {
    Md5::digest(data).iter().map(|b| format!("{:02x}", b)).collect()
}

/// File bytes as svn sees them: symlinks become `link <target>`
pub async fn file_content(branch: &Branch, entry: &TreeEntry) -> Result<Vec<u8>> {
    let blob = branch.read_blob(entry).await?;
    Ok(match entry.kind {
        EntryKind::Symlink => {
            let mut content = b"link ".to_vec();
            content.extend_from_slice(&blob);
            content
        }
        EntryKind::File | EntryKind::Executable => blob,
    })
}

/// Versioned properties implied by the git file mode
pub fn file_props(kind: EntryKind) -> Vec<(&'static str, String)> {
    match kind {
        EntryKind::File => Vec::new(),
        EntryKind::Executable => vec![("svn:executable", "*".to_string())],
        EntryKind::Symlink => vec![("svn:special", "*".to_string())],
    }
}

/// `svn:entry:*` properties of a node last changed in `created_rev`
pub async fn entry_props(branch: &Branch, created_rev: u64) -> Result<Vec<(&'static str, String)>> {
    let mut props = vec![("svn:entry:committed-rev", created_rev.to_string())];
    if let Some(meta) = branch.commit_meta(created_rev).await? {
        props.push(("svn:entry:committed-date", format_date(meta.time)));
        props.push(("svn:entry:last-author", meta.author.clone()));
    }
    props.push(("svn:entry:uuid", branch.uuid().to_string()));
    Ok(props)
}

/// `( ( name value )... )`
pub fn write_proplist<V: AsRef<[u8]>>(writer: &mut WireWriter, props: &[(&str, V)]) {
    writer.list_begin();
    for (name, value) in props {
        writer.list_begin().string(name).string(value).list_end();
    }
    writer.list_end();
}
