//! Suspended parts of multi-part command responses

use super::command::editor::{self, EditPlan};
use super::command::log::LogStream;
use super::command::report::{self, Report};
use super::session::Session;
use crate::error::Result;

/// Work resumed by the command loop before it reads the next command.
///
/// A step may queue its own continuation; the loop flushes the writer after
/// every step so long responses reach the client in pieces.
pub enum Step {
    /// Remaining entries of a `log` response
    Log(LogStream),
    /// Reading `set-path` / `delete-path` / `link-path` until `finish-report`
    Report(Report),
    /// Send the editor commands for a finished report
    EditorDrive(EditPlan),
    /// Wait for the client to acknowledge the edit
    AwaitEditResult,
}

impl Step {
    pub async fn run(self, session: &mut Session) -> Result<()> {
        match self {
            Self::Log(stream) => stream.next_batch(session).await,
            Self::Report(report) => report::read_report_command(report, session).await,
            Self::EditorDrive(plan) => editor::drive(plan, session).await,
            Self::AwaitEditResult => editor::await_edit_result(session).await,
        }
    }
}
