//! Implementations of the subcommands.
//!
//! Every command takes the resolved [`ProjectContext`](crate::config::ProjectContext), a
//! [`CommandRunner`](crate::utils::commands::CommandRunner) executing the shell commands and a
//! writer for the status lines. The returned `bool` tells whether every executed command succeeded.

pub(crate) mod cache_clear;
pub(crate) mod db_dump;
pub(crate) mod permissions;
