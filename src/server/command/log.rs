//! `log`: revision history streamed in batches

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use super::revision::revision_props;
use crate::cache::{CachedRevision, ChangeKind};
use crate::error::{Result, SvnError};
use crate::repository::Branch;
use crate::server::session::Session;
use crate::server::step::Step;
use crate::wire::{Token, WireReader, WireWriter};

/// Log entries written per command-loop iteration
pub const LOG_BATCH: usize = 64;

/// Which revision properties the client asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevProps {
    All,
    Only(Vec<String>),
}

impl RevProps {
    fn wants(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

/// `log ( ( paths... ) ( ? start ) ( ? end ) changed-paths strict ? limit ? merged revprops-word ( names... ) )`
#[derive(Debug)]
pub struct LogRequest {
    paths: Vec<String>,
    start: Option<u64>,
    end: Option<u64>,
    changed_paths: bool,
    limit: usize,
    revprops: RevProps,
}

impl LogRequest {
    pub async fn parse(reader: &mut WireReader) -> Result<Self> {
        reader.read_list_begin().await?;
        let paths = reader.read_text_list().await?;
        let start = reader.read_optional_number().await?;
        let end = reader.read_optional_number().await?;
        let changed_paths = reader.read_bool().await?;
        // strict-node: copies are never followed, so it changes nothing
        reader.read_bool().await?;

        let mut limit = 0;
        if matches!(reader.peek().await?, Token::Number(_)) {
            limit = reader.read_number().await? as usize;
        }
        // include-merged-revisions: history is linear
        if matches!(reader.peek().await?, Token::Word(word) if word == "true" || word == "false") {
            reader.read_bool().await?;
        }
        // `all-revprops` is the default and left to skip_to_list_end
        let revprops = if matches!(reader.peek().await?, Token::Word(word) if word == "revprops") {
            reader.read_word().await?;
            RevProps::Only(reader.read_text_list().await?)
        } else {
            RevProps::All
        };
        reader.skip_to_list_end().await?;

        Ok(Self {
            paths,
            start,
            end,
            changed_paths,
            limit,
            revprops,
        })
    }

    pub async fn execute(self, session: &mut Session) -> Result<()> {
        let branch = session.branch()?;
        let latest = branch.revision_count();
        let start = session.resolve_revision(self.start)?;
        let end = session.resolve_revision(self.end)?;
        let high = start.max(end);

        let mut paths = Vec::with_capacity(self.paths.len().max(1));
        for path in &self.paths {
            paths.push(session.full_path(path)?);
        }
        if paths.is_empty() {
            paths.push(session.full_path("")?);
        }

        let tree = branch.tree_at(high).await?;
        let mut touching = BTreeSet::new();
        for path in &paths {
            if !tree.is_dir(path) && tree.get(path).is_none() {
                return Err(SvnError::not_found(format!("File not found: r{}, /{}", high, path)));
            }
            touching.extend(branch.revisions_touching(path, start, end).await?);
        }

        let mut revisions: VecDeque<u64> = if start > end {
            touching.into_iter().rev().collect()
        } else {
            touching.into_iter().collect()
        };
        if self.limit > 0 {
            revisions.truncate(self.limit);
        }

        tracing::debug!(
            "Session {}: log of {} revisions in r{}:{} (latest r{})",
            session.id,
            revisions.len(),
            start,
            end,
            latest
        );
        session.steps.push_front(Step::Log(LogStream {
            branch,
            revisions,
            changed_paths: self.changed_paths,
            revprops: self.revprops,
        }));
        Ok(())
    }
}

/// Log entries still to be sent
pub struct LogStream {
    branch: Arc<Branch>,
    revisions: VecDeque<u64>,
    changed_paths: bool,
    revprops: RevProps,
}

impl LogStream {
    /// Write up to [`LOG_BATCH`] entries, then either requeue or finish the response
    pub async fn next_batch(mut self, session: &mut Session) -> Result<()> {
        for _ in 0..LOG_BATCH {
            let Some(revision) = self.revisions.pop_front() else {
                break;
            };
            self.write_entry(&mut session.writer, revision).await?;
        }

        if self.revisions.is_empty() {
            session.writer.word("done").success_empty();
        } else {
            session.steps.push_front(Step::Log(self));
        }
        Ok(())
    }

    /// `( ( changes... ) rev ( ? author ) ( ? date ) ( ? message ) false false 0 ( ) false )`
    async fn write_entry(&self, writer: &mut WireWriter, revision: u64) -> Result<()> {
        let changes = if self.changed_paths {
            changed_paths(&*self.branch.cached_revision(revision).await?, revision)
        } else {
            BTreeMap::new()
        };
        let props = revision_props(&self.branch, revision).await?;
        let prop = |name: &str| {
            props
                .iter()
                .find(|(prop, _)| *prop == name && self.revprops.wants(name))
                .map(|(_, value)| value.as_str())
        };

        writer.list_begin().list_begin();
        for (path, change) in &changes {
            writer
                .list_begin()
                .string(format!("/{}", path))
                .word(change.action);
            writer.list_begin();
            if let Some((from, from_rev)) = &change.copy_from {
                writer.string(format!("/{}", from)).number(*from_rev);
            }
            writer.list_end();
            writer.list_begin().word("file").list_end();
            writer.list_end();
        }
        writer
            .list_end()
            .number(revision)
            .optional_string(prop("svn:author"))
            .optional_string(prop("svn:date"))
            .optional_string(prop("svn:log"))
            .bool(false)
            .bool(false)
            .number(0)
            .list_begin()
            .list_end()
            .bool(false)
            .list_end();
        Ok(())
    }
}

/// One changed path of a log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath {
    pub action: &'static str,
    pub copy_from: Option<(String, u64)>,
}

/// Changed paths of `revision`; a rename is an add with copy source plus a delete
pub fn changed_paths(cached: &CachedRevision, revision: u64) -> BTreeMap<String, ChangedPath> {
    let mut changes: BTreeMap<String, ChangedPath> = cached
        .file_changes()
        .iter()
        .map(|(path, kind)| {
            (
                path.clone(),
                ChangedPath {
                    action: kind.action(),
                    copy_from: None,
                },
            )
        })
        .collect();

    for (new, old) in cached.renames() {
        changes.insert(
            new.clone(),
            ChangedPath {
                action: ChangeKind::Added.action(),
                copy_from: Some((old.clone(), revision.saturating_sub(1))),
            },
        );
        changes.entry(old.clone()).or_insert(ChangedPath {
            action: ChangeKind::Deleted.action(),
            copy_from: None,
        });
    }
    changes
}
