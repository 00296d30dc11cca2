//! Session tests
//!
//! Each test opens a session on an in-memory pipe, so the whole protocol
//! state machine runs without a socket.

pub mod command_tests;
pub mod handshake_tests;
pub mod log_tests;
