//! Server tests
//!
//! These bind real TCP listeners and read real git repositories.

pub mod git_tests;
