//! Shared plumbing for the `rtumod` command-line tools.

pub mod common;
