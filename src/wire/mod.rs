//! ra_svn wire codec
//!
//! The svn protocol is a stream of whitespace-separated tokens:
//!
//! ```text
//! word      [A-Za-z][A-Za-z0-9-]*
//! number    [0-9]+
//! string    [0-9]+:<bytes>
//! list      ( item... )
//! ```
//!
//! Lists nest arbitrarily and carry no type tags; callers know the expected
//! shape of every command. The reader reports any framing problem as
//! [`SvnError::ProtocolSyntax`](crate::error::SvnError::ProtocolSyntax),
//! which is always fatal to the session. The writer buffers a whole response
//! and only touches the socket on [`WireWriter::flush`].

mod reader;
mod token;
mod writer;

pub use reader::{WireReader, DEFAULT_MAX_STRING_LENGTH};
pub use token::Token;
pub use writer::WireWriter;
