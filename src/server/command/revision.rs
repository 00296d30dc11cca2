//! Session URL and revision-level commands

use std::sync::Arc;

use chrono::DateTime;

use super::{format_date, write_proplist};
use crate::error::{Result, SvnError};
use crate::repository::Branch;
use crate::server::session::Session;

/// Move the session to another URL inside the same repository
pub async fn reparent(session: &mut Session, url: &str) -> Result<()> {
    let target = session.resolve_readable(url).await?;
    if !Arc::ptr_eq(&target.repository, &session.target()?.repository) {
        return Err(SvnError::RepositoryNotFound { url: url.to_string() });
    }
    session.set_target(target);
    session.writer.success_empty();
    Ok(())
}

pub async fn get_latest_rev(session: &mut Session) -> Result<()> {
    let latest = session.branch()?.update_revisions().await?;
    write_number(session, latest);
    Ok(())
}

pub async fn get_dated_rev(session: &mut Session, date: &str) -> Result<()> {
    let timestamp = DateTime::parse_from_rfc3339(date)
        .map_err(|_| SvnError::BadDate { date: date.to_string() })?
        .timestamp();
    let revision = session.branch()?.revision_at_date(timestamp).await?;
    write_number(session, revision);
    Ok(())
}

pub async fn rev_proplist(session: &mut Session, revision: u64) -> Result<()> {
    let revision = session.resolve_revision(Some(revision))?;
    let branch = session.branch()?;
    let props = revision_props(&branch, revision).await?;

    session.writer.list_begin().word("success").list_begin();
    write_proplist(&mut session.writer, &props);
    session.writer.list_end().list_end();
    Ok(())
}

pub async fn rev_prop(session: &mut Session, revision: u64, name: &str) -> Result<()> {
    let revision = session.resolve_revision(Some(revision))?;
    let branch = session.branch()?;
    let props = revision_props(&branch, revision).await?;
    let value = props
        .into_iter()
        .find(|(prop, _)| *prop == name)
        .map(|(_, value)| value);

    session
        .writer
        .list_begin()
        .word("success")
        .list_begin()
        .optional_string(value)
        .list_end()
        .list_end();
    Ok(())
}

/// `svn:author`, `svn:date` and `svn:log` of a revision; revision 0 only has a date
pub async fn revision_props(branch: &Branch, revision: u64) -> Result<Vec<(&'static str, String)>> {
    Ok(match branch.commit_meta(revision).await? {
        Some(meta) => vec![
            ("svn:author", meta.author.clone()),
            ("svn:date", format_date(meta.time)),
            ("svn:log", meta.message.clone()),
        ],
        None => vec![("svn:date", format_date(0))],
    })
}

fn write_number(session: &mut Session, number: u64) {
    session
        .writer
        .list_begin()
        .word("success")
        .list_begin()
        .number(number)
        .list_end()
        .list_end();
}
