//! Shared plumbing for the tradeit binaries.

pub mod common;
