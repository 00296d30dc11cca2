//! Node queries: file contents, directory listings, kinds and stat

use std::collections::BTreeSet;

use super::{entry_props, file_content, file_props, format_date, md5_hex, write_proplist, CHUNK_SIZE};
use crate::error::{Result, SvnError};
use crate::git::{EntryKind, NodeKind, Tree, TreeEntry};
use crate::repository::{join_path, Branch};
use crate::server::session::Session;
use crate::wire::{WireReader, WireWriter};

/// `get-file ( path ( ? rev ) want-props want-contents ... )`
pub struct GetFile {
    path: String,
    revision: Option<u64>,
    want_props: bool,
    want_contents: bool,
}

impl GetFile {
    pub async fn parse(reader: &mut WireReader) -> Result<Self> {
        reader.read_list_begin().await?;
        let request = Self {
            path: reader.read_text().await?,
            revision: reader.read_optional_number().await?,
            want_props: reader.read_bool().await?,
            want_contents: reader.read_bool().await?,
        };
        reader.skip_to_list_end().await?;
        Ok(request)
    }

    pub async fn execute(self, session: &mut Session) -> Result<()> {
        let revision = session.resolve_revision(self.revision)?;
        let path = session.full_path(&self.path)?;
        let branch = session.branch()?;
        let tree = branch.tree_at(revision).await?;

        let Some(entry) = tree.get(&path).copied() else {
            return Err(match tree.node_kind(&path) {
                NodeKind::Dir => SvnError::not_found(format!("'/{}' is not a file", path)),
                _ => SvnError::not_found(format!("'/{}' path not found in r{}", path, revision)),
            });
        };
        let content = file_content(&branch, &entry).await?;

        let mut props = Vec::new();
        if self.want_props {
            props.extend(file_props(entry.kind));
            let created = branch.last_change(&path, revision).await?;
            props.extend(entry_props(&branch, created).await?);
        }

        let writer = &mut session.writer;
        writer
            .list_begin()
            .word("success")
            .list_begin()
            .optional_string(Some(md5_hex(&content)))
            .number(revision);
        write_proplist(writer, &props);
        writer.list_end().list_end();

        if self.want_contents {
            for chunk in content.chunks(CHUNK_SIZE) {
                writer.string(chunk);
            }
            writer.string("").success_empty();
        }
        Ok(())
    }
}

/// `get-dir ( path ( ? rev ) want-props want-contents ( ? fields... ) ... )`
pub struct GetDir {
    path: String,
    revision: Option<u64>,
    want_props: bool,
    want_contents: bool,
}

impl GetDir {
    pub async fn parse(reader: &mut WireReader) -> Result<Self> {
        reader.read_list_begin().await?;
        let request = Self {
            path: reader.read_text().await?,
            revision: reader.read_optional_number().await?,
            want_props: reader.read_bool().await?,
            want_contents: reader.read_bool().await?,
        };
        // the requested dirent fields are ignored, all of them are sent
        reader.skip_to_list_end().await?;
        Ok(request)
    }

    pub async fn execute(self, session: &mut Session) -> Result<()> {
        let revision = session.resolve_revision(self.revision)?;
        let path = session.full_path(&self.path)?;
        let branch = session.branch()?;
        let tree = branch.tree_at(revision).await?;

        if tree.node_kind(&path) != NodeKind::Dir {
            return Err(SvnError::not_found(format!(
                "'/{}' is not a directory in r{}",
                path, revision
            )));
        }

        let props = if self.want_props {
            let created = branch.last_change(&path, revision).await?;
            entry_props(&branch, created).await?
        } else {
            Vec::new()
        };

        let children: Vec<(String, Dirent)> = if self.want_contents {
            let names: Vec<String> = tree.list_dir(&path).into_iter().map(|e| e.name).collect();
            let paths: Vec<String> = names.iter().map(|name| join_path(&path, name)).collect();
            let dirents = dirents(&branch, &tree, &paths, revision).await?;
            names.into_iter().zip(dirents).collect()
        } else {
            Vec::new()
        };

        let writer = &mut session.writer;
        writer
            .list_begin()
            .word("success")
            .list_begin()
            .number(revision);
        write_proplist(writer, &props);
        writer.list_begin();
        for (name, dirent) in &children {
            writer.list_begin().string(name);
            dirent.write(writer);
            writer.list_end();
        }
        writer.list_end().list_end().list_end();
        Ok(())
    }
}

pub async fn check_path(session: &mut Session, path: &str, revision: Option<u64>) -> Result<()> {
    let revision = session.resolve_revision(revision)?;
    let path = session.full_path(path)?;
    let kind = session.branch()?.tree_at(revision).await?.node_kind(&path);

    session
        .writer
        .list_begin()
        .word("success")
        .list_begin()
        .word(kind.as_str())
        .list_end()
        .list_end();
    Ok(())
}

pub async fn stat(session: &mut Session, path: &str, revision: Option<u64>) -> Result<()> {
    let revision = session.resolve_revision(revision)?;
    let path = session.full_path(path)?;
    let branch = session.branch()?;
    let tree = branch.tree_at(revision).await?;

    let dirent = if tree.node_kind(&path) == NodeKind::None {
        None
    } else {
        dirents(&branch, &tree, std::slice::from_ref(&path), revision)
            .await?
            .pop()
    };

    let writer = &mut session.writer;
    writer.list_begin().word("success").list_begin().list_begin();
    if let Some(dirent) = dirent {
        writer.list_begin();
        dirent.write(writer);
        writer.list_end();
    }
    writer.list_end().list_end().list_end();
    Ok(())
}

/// Directory entry attributes shared by `get-dir` and `stat`
struct Dirent {
    kind: NodeKind,
    size: u64,
    has_props: bool,
    created_rev: u64,
    date: Option<String>,
    author: Option<String>,
}

impl Dirent {
    /// `kind size has-props created-rev ( ? date ) ( ? author )`
    fn write(&self, writer: &mut WireWriter) {
        writer
            .word(self.kind.as_str())
            .number(self.size)
            .bool(self.has_props)
            .number(self.created_rev)
            .optional_string(self.date.as_deref())
            .optional_string(self.author.as_deref());
    }
}

/// Describe existing nodes, resolving their last changes in one walk
async fn dirents(branch: &Branch, tree: &Tree, paths: &[String], revision: u64) -> Result<Vec<Dirent>> {
    let wanted: BTreeSet<String> = paths.iter().cloned().collect();
    let created = branch.last_changes(&wanted, revision).await?;

    let mut dirents = Vec::with_capacity(paths.len());
    for path in paths {
        let entry = tree.get(path);
        let created_rev = created.get(path).copied().unwrap_or(0);
        let meta = branch.commit_meta(created_rev).await?;
        dirents.push(Dirent {
            kind: tree.node_kind(path),
            size: entry.map(content_size).unwrap_or(0),
            has_props: entry.is_some_and(|e| e.kind != EntryKind::File),
            created_rev,
            date: meta.as_ref().map(|m| format_date(m.time)),
            author: meta.as_ref().map(|m| m.author.clone()),
        });
    }
    Ok(dirents)
}

/// Size of the content served for an entry, counting the `link ` prefix of symlinks
fn content_size(entry: &TreeEntry) -> u64 {
    match entry.kind {
        EntryKind::Symlink => entry.size + 5,
        EntryKind::File | EntryKind::Executable => entry.size,
    }
}
