//! Authentication
//!
//! The handshake offers an ordered [`AuthenticatorSet`]; the client picks a
//! method by name and the matching [`Authenticator`] verifies its token,
//! usually against a [`UserDirectory`].

mod authenticator;
mod directory;
mod user;

pub use authenticator::{cram_md5_response, AuthChannel, Authenticator, AuthenticatorSet};
pub use directory::{LocalUserDirectory, UserDirectory};
pub use user::{User, UserOrigin, ANONYMOUS_USERNAME};
