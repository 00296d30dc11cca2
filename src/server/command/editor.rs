//! Editor drive for update-like commands
//!
//! The reported working copy and the requested revision are both flattened
//! into a [`View`] keyed by path relative to the operand. Walking the two
//! views side by side yields the editor operations; the operations are then
//! written with entry properties and text deltas.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::report::{EditKind, EditRequest, ReportEntry};
use super::{entry_props, file_content, file_props, md5_hex, CHUNK_SIZE};
use crate::cache::is_same_or_below;
use crate::error::{Result, SvnError};
use crate::git::{EntryKind, NodeKind, Tree, TreeEntry};
use crate::repository::{join_path, split_path, Branch};
use crate::server::session::Session;
use crate::server::step::Step;
use crate::wire::WireWriter;

/// Pending output that triggers a flush in the middle of a drive
pub const FLUSH_THRESHOLD: usize = 256 * 1024;

/// Everything needed to drive the editor once the report is complete
pub struct EditPlan {
    request: EditRequest,
    revision: u64,
    /// Session path; editor paths are relative to it
    anchor: String,
    /// Anchor joined with the target; report paths are relative to it
    operand: String,
    /// Repository path whose state at `revision` the client should end up with
    source: String,
    entries: Vec<ReportEntry>,
}

impl EditPlan {
    pub fn new(request: EditRequest, revision: u64, anchor: String, operand: String, source: String) -> Self {
        Self {
            request,
            revision,
            anchor,
            operand,
            source,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    /// Base revision of a plain "everything at r" report, which allows the
    /// walk to be limited to paths changed between the two revisions
    fn single_base(&self) -> Option<u64> {
        match self.entries.as_slice() {
            [ReportEntry::Set {
                path,
                revision,
                start_empty: false,
            }] if path.is_empty() && self.source == self.operand => Some(*revision),
            _ => None,
        }
    }

    /// Revision the client reported for the operand itself
    fn root_revision(&self) -> Option<u64> {
        self.entries.iter().find_map(|entry| match entry {
            ReportEntry::Set { path, revision, .. } | ReportEntry::Link { path, revision, .. }
                if path.is_empty() =>
            {
                Some(*revision)
            }
            _ => None,
        })
    }

    /// Working copy state described by the report
    async fn client_view(&self, branch: &Branch) -> Result<View> {
        let mut trees: HashMap<u64, Tree> = HashMap::new();
        let mut view = View::default();
        for entry in &self.entries {
            let (path, source, revision, start_empty) = match entry {
                ReportEntry::Delete { path } => {
                    view.remove_under(path);
                    continue;
                }
                ReportEntry::Set {
                    path,
                    revision,
                    start_empty,
                } => (path, join_path(&self.operand, path), *revision, *start_empty),
                ReportEntry::Link {
                    path,
                    source,
                    revision,
                    start_empty,
                } => (path, source.clone(), *revision, *start_empty),
            };

            if !trees.contains_key(&revision) {
                trees.insert(revision, branch.tree_at(revision).await?);
            }
            let Some(tree) = trees.get(&revision) else {
                continue;
            };
            view.remove_under(path);
            if start_empty && tree.node_kind(&source) != NodeKind::File {
                view.insert_dir(path);
            } else {
                view.fill(tree, &source, path);
            }
        }
        Ok(view)
    }
}

/// Files and directories keyed by path relative to the operand
#[derive(Debug, Default)]
struct View {
    files: BTreeMap<String, TreeEntry>,
    dirs: BTreeSet<String>,
}

impl View {
    fn kind(&self, rel: &str) -> NodeKind {
        if self.files.contains_key(rel) {
            NodeKind::File
        } else if self.dirs.contains(rel) {
            NodeKind::Dir
        } else {
            NodeKind::None
        }
    }

    fn remove_under(&mut self, rel: &str) {
        self.files.retain(|path, _| !is_same_or_below(path, rel));
        self.dirs.retain(|path| !is_same_or_below(path, rel));
    }

    /// Add a directory together with its parents
    fn insert_dir(&mut self, rel: &str) {
        let mut current = rel;
        loop {
            if !self.dirs.insert(current.to_string()) || current.is_empty() {
                break;
            }
            current = split_path(current).0;
        }
    }

    fn insert_file(&mut self, rel: &str, entry: TreeEntry) {
        if !rel.is_empty() {
            self.insert_dir(split_path(rel).0);
        }
        self.files.insert(rel.to_string(), entry);
    }

    /// Copy the node at repository path `source` into `rel`
    fn fill(&mut self, tree: &Tree, source: &str, rel: &str) {
        match tree.node_kind(source) {
            NodeKind::File => {
                if let Some(entry) = tree.get(source) {
                    self.insert_file(rel, *entry);
                }
            }
            NodeKind::Dir => {
                self.insert_dir(rel);
                let skip = if source.is_empty() { 0 } else { source.len() + 1 };
                for (path, entry) in tree.files_under(source) {
                    self.insert_file(&join_path(rel, &path[skip..]), *entry);
                }
            }
            NodeKind::None => {}
        }
    }

    /// Names of the immediate children of a directory
    fn children(&self, rel: &str) -> BTreeSet<String> {
        let prefix = if rel.is_empty() { String::new() } else { format!("{}/", rel) };
        let names = self
            .files
            .range(prefix.clone()..)
            .map(|(path, _)| path)
            .take_while(|path| path.starts_with(&prefix))
            .chain(
                self.dirs
                    .range(prefix.clone()..)
                    .take_while(|path| path.starts_with(&prefix)),
            )
            .filter_map(|path| path[prefix.len()..].split('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        names.collect()
    }
}

/// One editor operation; tokens are assigned while planning
#[derive(Debug, Clone, PartialEq, Eq)]
enum EditOp {
    DeleteEntry {
        path: String,
        parent: String,
    },
    AddDir {
        rel: String,
        path: String,
        parent: String,
        token: String,
    },
    OpenDir {
        rel: String,
        path: String,
        parent: String,
        token: String,
    },
    CloseDir {
        token: String,
    },
    /// `add-file` without a base, `open-file` with one
    File {
        rel: String,
        path: String,
        parent: String,
        token: String,
        base: Option<TreeEntry>,
        entry: TreeEntry,
    },
}

/// Side-by-side walk of the client and target views
struct Planner<'a> {
    client: &'a View,
    target: &'a View,
    candidates: Option<&'a BTreeSet<String>>,
    editor_target: &'a str,
    ops: Vec<EditOp>,
    dirs: usize,
    files: usize,
}

impl<'a> Planner<'a> {
    fn new(client: &'a View, target: &'a View, editor_target: &'a str) -> Self {
        Self {
            client,
            target,
            candidates: None,
            editor_target,
            ops: Vec::new(),
            dirs: 0,
            files: 0,
        }
    }

    fn dir_token(&mut self) -> String {
        let token = format!("d{}", self.dirs);
        self.dirs += 1;
        token
    }

    fn file_token(&mut self) -> String {
        let token = format!("c{}", self.files);
        self.files += 1;
        token
    }

    /// Plan the edit below the root directory token
    fn plan(mut self, root: &str) -> Vec<EditOp> {
        if self.editor_target.is_empty() {
            self.visit_children("", root);
        } else if !self.pruned("") {
            self.visit("", root);
        }
        self.ops
    }

    fn pruned(&self, rel: &str) -> bool {
        self.candidates.is_some_and(|candidates| !has_candidate(candidates, rel))
    }

    fn visit_children(&mut self, rel: &str, token: &str) {
        let mut names = self.client.children(rel);
        names.extend(self.target.children(rel));
        for name in names {
            let child = join_path(rel, &name);
            if !self.pruned(&child) {
                self.visit(&child, token);
            }
        }
    }

    fn visit(&mut self, rel: &str, parent: &str) {
        let path = join_path(self.editor_target, rel);
        match (self.client.kind(rel), self.target.kind(rel)) {
            (NodeKind::None, NodeKind::None) => {}
            (_, NodeKind::None) => self.ops.push(EditOp::DeleteEntry {
                path,
                parent: parent.to_string(),
            }),
            (NodeKind::Dir, NodeKind::Dir) => {
                let token = self.dir_token();
                let mark = self.ops.len();
                self.ops.push(EditOp::OpenDir {
                    rel: rel.to_string(),
                    path,
                    parent: parent.to_string(),
                    token: token.clone(),
                });
                self.visit_children(rel, &token);
                if self.ops.len() == mark + 1 {
                    // nothing changed below
                    self.ops.truncate(mark);
                } else {
                    self.ops.push(EditOp::CloseDir { token });
                }
            }
            (NodeKind::File, NodeKind::File) => {
                let (Some(base), Some(entry)) = (self.client.files.get(rel), self.target.files.get(rel)) else {
                    return;
                };
                if base != entry {
                    let token = self.file_token();
                    self.ops.push(EditOp::File {
                        rel: rel.to_string(),
                        path,
                        parent: parent.to_string(),
                        token,
                        base: Some(*base),
                        entry: *entry,
                    });
                }
            }
            (client, _) => {
                if client != NodeKind::None {
                    self.ops.push(EditOp::DeleteEntry {
                        path,
                        parent: parent.to_string(),
                    });
                }
                self.add(rel, parent);
            }
        }
    }

    /// Add a node that the client does not have, recursively
    fn add(&mut self, rel: &str, parent: &str) {
        let path = join_path(self.editor_target, rel);
        match self.target.kind(rel) {
            NodeKind::Dir => {
                let token = self.dir_token();
                self.ops.push(EditOp::AddDir {
                    rel: rel.to_string(),
                    path,
                    parent: parent.to_string(),
                    token: token.clone(),
                });
                for name in self.target.children(rel) {
                    self.add(&join_path(rel, &name), &token);
                }
                self.ops.push(EditOp::CloseDir { token });
            }
            NodeKind::File => {
                if let Some(entry) = self.target.files.get(rel).copied() {
                    let token = self.file_token();
                    self.ops.push(EditOp::File {
                        rel: rel.to_string(),
                        path,
                        parent: parent.to_string(),
                        token,
                        base: None,
                        entry,
                    });
                }
            }
            NodeKind::None => {}
        }
    }
}

/// True if `rel` or anything below it is a candidate
fn has_candidate(candidates: &BTreeSet<String>, rel: &str) -> bool {
    if rel.is_empty() {
        return !candidates.is_empty();
    }
    if candidates.contains(rel) {
        return true;
    }
    let prefix = format!("{}/", rel);
    candidates
        .range(prefix.clone()..)
        .next()
        .is_some_and(|path| path.starts_with(&prefix))
}

/// `( name ( args... ) )` editor command framing
fn begin<'w>(writer: &'w mut WireWriter, command: &str) -> &'w mut WireWriter {
    writer.list_begin().word(command).list_begin()
}

fn end(writer: &mut WireWriter) {
    writer.list_end().list_end();
}

/// Send the editor commands of a finished report
pub async fn drive(plan: EditPlan, session: &mut Session) -> Result<()> {
    match drive_editor(&plan, session).await {
        Ok(()) => {
            session.steps.push_front(Step::AwaitEditResult);
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            session.writer.discard();
            begin(&mut session.writer, "abort-edit");
            end(&mut session.writer);
            session.writer.flush().await?;
            Err(e)
        }
    }
}

async fn drive_editor(plan: &EditPlan, session: &mut Session) -> Result<()> {
    let branch = session.branch()?;
    let delta = session.server.delta.clone();
    let revision = plan.revision;

    let client = plan.client_view(&branch).await?;
    let tree = branch.tree_at(revision).await?;
    let mut target = View::default();
    target.fill(&tree, &plan.source, "");
    if plan.request.kind == EditKind::Switch && target.kind("") == NodeKind::None {
        return Err(SvnError::not_found(format!(
            "'/{}' does not exist in r{}",
            plan.source, revision
        )));
    }

    let candidates = match plan.single_base() {
        Some(base) => {
            let changes = branch
                .changes_between(base.min(revision), base.max(revision))
                .await?;
            let touched = changes
                .file_changes
                .keys()
                .chain(changes.renames.keys())
                .chain(changes.renames.values());
            let prefix = if plan.operand.is_empty() { 0 } else { plan.operand.len() + 1 };
            Some(
                touched
                    .filter(|path| is_same_or_below(path, &plan.operand))
                    .map(|path| path.get(prefix..).unwrap_or_default().to_string())
                    .collect::<BTreeSet<String>>(),
            )
        }
        None => None,
    };

    let mut planner = Planner::new(&client, &target, &plan.request.target);
    planner.candidates = candidates.as_ref();
    let root = planner.dir_token();
    let ops = planner.plan(&root);

    // last-changed revisions for the entry props of every node sent
    let mut wanted: BTreeSet<String> = ops
        .iter()
        .filter_map(|op| match op {
            EditOp::AddDir { rel, .. } | EditOp::OpenDir { rel, .. } | EditOp::File { rel, .. } => {
                Some(join_path(&plan.source, rel))
            }
            EditOp::DeleteEntry { .. } | EditOp::CloseDir { .. } => None,
        })
        .collect();
    if plan.request.target.is_empty() {
        wanted.insert(plan.source.clone());
    }
    let created = branch.last_changes(&wanted, revision).await?;

    tracing::debug!(
        "Session {}: driving {} editor ops for /{} (anchor /{}) at r{}",
        session.id,
        ops.len(),
        plan.operand,
        plan.anchor,
        revision
    );

    let mut emitter = Emitter {
        branch: &branch,
        created: &created,
        props: HashMap::new(),
        source: &plan.source,
        text_deltas: plan.request.text_deltas,
        delta: delta.as_ref(),
    };
    let writer = &mut session.writer;

    begin(writer, "target-rev").number(revision);
    end(writer);
    begin(writer, "open-root")
        .optional_number(Some(plan.root_revision().unwrap_or(revision)))
        .string(&root);
    end(writer);
    if plan.request.target.is_empty() {
        emitter.entry_props(writer, "change-dir-prop", &root, "").await?;
    }

    for op in &ops {
        emitter.emit(writer, op).await?;
        if writer.pending().len() > FLUSH_THRESHOLD {
            writer.flush().await?;
        }
    }

    begin(writer, "close-dir").string(&root);
    end(writer);
    begin(writer, "close-edit");
    end(writer);
    Ok(())
}

/// Writes planned operations
struct Emitter<'a> {
    branch: &'a Branch,
    created: &'a HashMap<String, u64>,
    props: HashMap<u64, Vec<(&'static str, String)>>,
    source: &'a str,
    text_deltas: bool,
    delta: &'a dyn crate::delta::DeltaEncoder,
}

impl Emitter<'_> {
    async fn emit(&mut self, writer: &mut WireWriter, op: &EditOp) -> Result<()> {
        match op {
            EditOp::DeleteEntry { path, parent } => {
                begin(writer, "delete-entry")
                    .string(path)
                    .optional_number(None)
                    .string(parent);
                end(writer);
            }
            EditOp::AddDir {
                rel,
                path,
                parent,
                token,
            } => {
                begin(writer, "add-dir")
                    .string(path)
                    .string(parent)
                    .string(token)
                    .list_begin()
                    .list_end();
                end(writer);
                self.entry_props(writer, "change-dir-prop", token, rel).await?;
            }
            EditOp::OpenDir {
                rel,
                path,
                parent,
                token,
            } => {
                begin(writer, "open-dir")
                    .string(path)
                    .string(parent)
                    .string(token)
                    .optional_number(None);
                end(writer);
                self.entry_props(writer, "change-dir-prop", token, rel).await?;
            }
            EditOp::CloseDir { token } => {
                begin(writer, "close-dir").string(token);
                end(writer);
            }
            EditOp::File {
                rel,
                path,
                parent,
                token,
                base,
                entry,
            } => {
                let command = if base.is_some() { "open-file" } else { "add-file" };
                begin(writer, command)
                    .string(path)
                    .string(parent)
                    .string(token)
                    .list_begin()
                    .list_end();
                end(writer);

                let old_props = base.map(|b| file_props(b.kind)).unwrap_or_default();
                let new_props = file_props(entry.kind);
                for (name, value) in &new_props {
                    if !old_props.iter().any(|(n, v)| n == name && v == value) {
                        change_prop(writer, "change-file-prop", token, name, Some(value));
                    }
                }
                for (name, _) in &old_props {
                    if !new_props.iter().any(|(n, _)| n == name) {
                        change_prop(writer, "change-file-prop", token, name, None);
                    }
                }
                self.entry_props(writer, "change-file-prop", token, rel).await?;

                let checksum = if content_changed(base.as_ref(), entry) {
                    self.text_delta(writer, token, base.as_ref(), entry).await?
                } else {
                    None
                };
                begin(writer, "close-file")
                    .string(token)
                    .optional_string(checksum);
                end(writer);
            }
        }
        Ok(())
    }

    async fn entry_props(&mut self, writer: &mut WireWriter, command: &str, token: &str, rel: &str) -> Result<()> {
        let path = join_path(self.source, rel);
        let created = self.created.get(&path).copied().unwrap_or(0);
        if !self.props.contains_key(&created) {
            let props = entry_props(self.branch, created).await?;
            self.props.insert(created, props);
        }
        if let Some(props) = self.props.get(&created) {
            for (name, value) in props {
                change_prop(writer, command, token, name, Some(value));
            }
        }
        Ok(())
    }

    /// Send the content change of a file; returns the md5 of the new content
    /// when it was sent
    async fn text_delta(
        &self,
        writer: &mut WireWriter,
        token: &str,
        base: Option<&TreeEntry>,
        entry: &TreeEntry,
    ) -> Result<Option<String>> {
        if !self.text_deltas {
            begin(writer, "apply-textdelta").string(token).optional_number(None);
            end(writer);
            begin(writer, "textdelta-end").string(token);
            end(writer);
            return Ok(None);
        }

        let source = match base {
            Some(base) => file_content(self.branch, base).await?,
            None => Vec::new(),
        };
        let content = file_content(self.branch, entry).await?;
        let base_checksum = base.map(|_| md5_hex(&source));

        begin(writer, "apply-textdelta")
            .string(token)
            .optional_string(base_checksum);
        end(writer);
        for chunk in self.delta.delta(&source, &content).chunks(CHUNK_SIZE) {
            begin(writer, "textdelta-chunk").string(token).string(chunk);
            end(writer);
        }
        begin(writer, "textdelta-end").string(token);
        end(writer);
        Ok(Some(md5_hex(&content)))
    }
}

fn change_prop(writer: &mut WireWriter, command: &str, token: &str, name: &str, value: Option<&String>) {
    begin(writer, command)
        .string(token)
        .string(name)
        .optional_string(value);
    end(writer);
}

/// Served bytes differ: new blob, or a switch between symlink and regular file
fn content_changed(base: Option<&TreeEntry>, entry: &TreeEntry) -> bool {
    match base {
        None => true,
        Some(base) => {
            base.blob != entry.blob
                || (base.kind == EntryKind::Symlink) != (entry.kind == EntryKind::Symlink)
        }
    }
}

/// Read the client's verdict on the edit and answer the command
pub async fn await_edit_result(session: &mut Session) -> Result<()> {
    session.reader.read_list_begin().await?;
    let status = session.reader.read_word().await?;
    session.reader.skip_to_list_end().await?;

    if status == "success" {
        session.writer.success_empty();
        Ok(())
    } else {
        Err(SvnError::Cancelled {
            message: format!("client answered the edit with {}", status),
        })
    }
}
